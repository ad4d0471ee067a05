pub mod archive;
pub mod archive_store;
pub mod config;
pub mod content_type;
pub mod core;
pub mod entry_point;
pub mod fs_utils;
pub mod gateway;
pub mod lifecycle;
