//! Log extraction from zipped CI run archives.
//!
//! Entries are located through the central directory, so archives whose
//! local headers defer sizes to a trailing data descriptor (the usual shape
//! of zips produced on the fly) read the same as any other. Each entry is
//! decompressed on its own: memory use is bounded by the matching entries,
//! not by the archive.

use std::io::{Read, Seek};

use thiserror::Error;
use tracing::debug;
use zip::ZipArchive;

/// Failure reading a log archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The archive structure could not be read.
    #[error("read archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    /// A matching entry failed to decompress.
    #[error("read archive entry {name}: {source}")]
    Entry {
        /// Path of the entry inside the archive.
        name: String,
        /// Underlying decompression or read failure.
        #[source]
        source: std::io::Error,
    },
}

/// Concatenates the text of every file entry whose path contains `target`.
///
/// Every entry is visited in archive order. Returns an empty string when
/// nothing matched.
pub fn extract_matching_entries<R: Read + Seek>(reader: R, target: &str) -> Result<String, ArchiveError> {
    let mut archive = ZipArchive::new(reader)?;
    let mut corpus = String::new();
    let mut matched = 0usize;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.is_dir() || !entry.name().contains(target) {
            continue;
        }
        let name = entry.name().to_string();
        let mut bytes = Vec::new();
        entry
            .read_to_end(&mut bytes)
            .map_err(|source| ArchiveError::Entry {
                name: name.clone(),
                source,
            })?;
        corpus.push_str(&String::from_utf8_lossy(&bytes));
        matched += 1;
        debug!(entry = %name, bytes = bytes.len(), "collected log entry");
    }

    debug!(visited = archive.len(), matched, target, "archive scan complete");
    Ok(corpus)
}
