//! File name to response headers.
//!
//! Unity builds ship pre-compressed assets (`Build.wasm.br`,
//! `Build.data.gz`); those are served with the inner type and a
//! `Content-Encoding` so the browser decompresses them itself.

use serde::Serialize;

const DEFAULT_MIME: &str = "application/octet-stream";
const IMMUTABLE: &str = "public, max-age=31536000, immutable";
const NO_CACHE: &str = "no-cache";

/// Extensions (lowercase, no dot) and their MIME types.
const MIME_TABLE: &[(&str, &str)] = &[
    // documents
    ("html", "text/html; charset=utf-8"),
    ("htm", "text/html; charset=utf-8"),
    ("css", "text/css; charset=utf-8"),
    ("js", "application/javascript; charset=utf-8"),
    ("mjs", "application/javascript; charset=utf-8"),
    ("json", "application/json; charset=utf-8"),
    ("xml", "application/xml"),
    ("xsd", "application/xml"),
    ("dtd", "application/xml-dtd"),
    ("txt", "text/plain; charset=utf-8"),
    ("pdf", "application/pdf"),
    // unity / webgl
    ("wasm", "application/wasm"),
    ("data", DEFAULT_MIME),
    ("unityweb", DEFAULT_MIME),
    ("bundle", DEFAULT_MIME),
    ("mem", DEFAULT_MIME),
    ("symbols", DEFAULT_MIME),
    // 3d
    ("gltf", "model/gltf+json"),
    ("glb", "model/gltf-binary"),
    ("obj", "model/obj"),
    ("bin", DEFAULT_MIME),
    // images
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("svg", "image/svg+xml"),
    ("ico", "image/x-icon"),
    ("bmp", "image/bmp"),
    ("ktx2", "image/ktx2"),
    // fonts
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
    ("ttf", "font/ttf"),
    ("otf", "font/otf"),
    ("eot", "application/vnd.ms-fontobject"),
    // media
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("ogg", "audio/ogg"),
    ("m4a", "audio/mp4"),
    ("mp4", "video/mp4"),
    ("webm", "video/webm"),
    ("vtt", "text/vtt"),
    // containers
    ("zip", "application/zip"),
    ("gz", "application/gzip"),
    ("br", DEFAULT_MIME),
];

/// Inner extensions whose `.gz` variant is a transfer-compressed asset rather
/// than a gzip download.
const GZIP_ASSET_TYPES: &[&str] = &["wasm", "js", "data", "json", "unityweb", "symbols", "mem"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentEncoding {
    Brotli,
    Gzip,
}

impl ContentEncoding {
    pub fn header_value(&self) -> &'static str {
        match self {
            ContentEncoding::Brotli => "br",
            ContentEncoding::Gzip => "gzip",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Revalidate every time; used for entry documents.
    NoCache,
    /// Hashed build artifacts.
    Immutable,
}

impl CachePolicy {
    pub fn header_value(&self) -> &'static str {
        match self {
            CachePolicy::NoCache => NO_CACHE,
            CachePolicy::Immutable => IMMUTABLE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentDescriptor {
    pub mime: &'static str,
    pub encoding: Option<ContentEncoding>,
    pub cache: CachePolicy,
}

impl ContentDescriptor {
    pub fn is_html(&self) -> bool {
        self.mime.starts_with("text/html")
    }
}

pub struct ContentTypeResolver;

impl ContentTypeResolver {
    /// Headers for a served file, from its name alone.
    pub fn resolve(filename: &str) -> ContentDescriptor {
        let name = filename
            .rsplit('/')
            .next()
            .unwrap_or(filename)
            .to_lowercase();

        let (outer, stem) = split_extension(&name);
        let inner = stem.and_then(|s| split_extension(s).0);

        let (mime, encoding) = match (outer, inner) {
            (Some("br"), Some(inner)) => (mime_for(inner), Some(ContentEncoding::Brotli)),
            (Some("gz"), Some(inner)) if GZIP_ASSET_TYPES.contains(&inner) => {
                (mime_for(inner), Some(ContentEncoding::Gzip))
            }
            (Some(ext), _) => (mime_for(ext), None),
            (None, _) => (DEFAULT_MIME, None),
        };

        let cache = if mime.starts_with("text/html") {
            CachePolicy::NoCache
        } else {
            CachePolicy::Immutable
        };

        ContentDescriptor {
            mime,
            encoding,
            cache,
        }
    }
}

fn mime_for(ext: &str) -> &'static str {
    MIME_TABLE
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, mime)| *mime)
        .unwrap_or(DEFAULT_MIME)
}

/// `("br", Some("game.wasm"))` for `game.wasm.br`. Dotfiles have no extension.
fn split_extension(name: &str) -> (Option<&str>, Option<&str>) {
    match name.rfind('.') {
        Some(0) | None => (None, None),
        Some(idx) => (Some(&name[idx + 1..]), Some(&name[..idx])),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brotli_variants() {
        let wasm = ContentTypeResolver::resolve("Build/Build.wasm.br");
        assert_eq!(wasm.mime, "application/wasm");
        assert_eq!(wasm.encoding, Some(ContentEncoding::Brotli));
        assert_eq!(wasm.cache, CachePolicy::Immutable);

        let js = ContentTypeResolver::resolve("Build.framework.js.br");
        assert_eq!(js.mime, "application/javascript; charset=utf-8");
        assert_eq!(js.encoding.map(|e| e.header_value()), Some("br"));

        let data = ContentTypeResolver::resolve("Build.data.br");
        assert_eq!(data.mime, "application/octet-stream");
        assert_eq!(data.encoding, Some(ContentEncoding::Brotli));

        let json = ContentTypeResolver::resolve("settings.JSON.BR");
        assert_eq!(json.mime, "application/json; charset=utf-8");
    }

    #[test]
    fn test_gzip_assets_versus_downloads() {
        let wasm = ContentTypeResolver::resolve("Build.wasm.gz");
        assert_eq!(wasm.mime, "application/wasm");
        assert_eq!(wasm.encoding, Some(ContentEncoding::Gzip));

        let tarball = ContentTypeResolver::resolve("backup.tar.gz");
        assert_eq!(tarball.mime, "application/gzip");
        assert_eq!(tarball.encoding, None);
    }

    #[test]
    fn test_static_table() {
        assert_eq!(ContentTypeResolver::resolve("a.wasm").mime, "application/wasm");
        assert_eq!(
            ContentTypeResolver::resolve("a.unityweb").mime,
            "application/octet-stream"
        );
        assert_eq!(ContentTypeResolver::resolve("m.gltf").mime, "model/gltf+json");
        assert_eq!(ContentTypeResolver::resolve("m.glb").mime, "model/gltf-binary");
        assert_eq!(
            ContentTypeResolver::resolve("imsmanifest.xml").mime,
            "application/xml"
        );
        assert_eq!(ContentTypeResolver::resolve("f.woff2").mime, "font/woff2");
        assert_eq!(ContentTypeResolver::resolve("clip.mp4").mime, "video/mp4");
    }

    #[test]
    fn test_unknown_and_extensionless() {
        let unknown = ContentTypeResolver::resolve("blob.xyz");
        assert_eq!(unknown.mime, "application/octet-stream");
        assert_eq!(unknown.encoding, None);
        assert_eq!(ContentTypeResolver::resolve("LICENSE").mime, "application/octet-stream");
        assert_eq!(ContentTypeResolver::resolve(".htaccess").mime, "application/octet-stream");
        // A bare `.br` file has nothing to decode into.
        assert_eq!(ContentTypeResolver::resolve("x.br").encoding, None);
    }

    #[test]
    fn test_cache_policy() {
        let html = ContentTypeResolver::resolve("index.html");
        assert!(html.is_html());
        assert_eq!(html.cache.header_value(), "no-cache");
        assert_eq!(
            ContentTypeResolver::resolve("Build/Build.loader.js").cache.header_value(),
            "public, max-age=31536000, immutable"
        );
    }
}
