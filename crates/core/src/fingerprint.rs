//! Content fingerprints and the log membership check.
//!
//! The membership check is a plain substring search: a fingerprint counts as
//! attested if its hex form appears anywhere in the log corpus, regardless of
//! the surrounding line. Any step that echoes the hash attests the image.

use base64::Engine;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Image content that is not standard base64.
#[derive(Debug, Error)]
#[error("image content is not valid base64: {0}")]
pub struct DecodeError(#[from] base64::DecodeError);

/// SHA-256 of `bytes` as lowercase hex.
pub fn content_fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// True if `fingerprint` occurs anywhere in `corpus`.
pub fn corpus_contains(corpus: &str, fingerprint: &str) -> bool {
    !fingerprint.is_empty() && corpus.contains(fingerprint)
}

/// Decodes standard base64, tolerating line breaks inserted by CI tooling.
pub fn decode_content(content: &str) -> Result<Vec<u8>, DecodeError> {
    let compact: String = content.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    Ok(base64::engine::general_purpose::STANDARD.decode(compact)?)
}
