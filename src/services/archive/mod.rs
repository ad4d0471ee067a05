//! ZIP extraction for uploaded demo packages.
//!
//! Analysis never touches the disk; extraction stages every package next to
//! its destination and swaps it into place in one rename.

mod analyze;
mod extract;
mod types;

pub use analyze::analyze_archive;
pub use extract::ExtractionEngine;
pub use types::{
    ArchiveAnalysis, ArchiveEntryInfo, CancelFlag, ExtractionLimits, ExtractionResult,
    SourceFormat,
};

#[cfg(test)]
#[path = "tests/archive_tests.rs"]
mod tests;
