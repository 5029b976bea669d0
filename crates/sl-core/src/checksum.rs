//! SHA-256 checksum utility for drift detection.

use sha2::{Digest, Sha256};

/// Compute SHA256 checksum of a string
pub fn compute_checksum(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    let result = hasher.finalize();
    format!("{:x}", result)
}

/// Compute the checksum of a migration script.
///
/// Line endings are normalised to `\n` first so a checkout with CRLF endings
/// does not register as drift.
pub fn compute_script_checksum(content: &str) -> String {
    if content.contains("\r\n") {
        compute_checksum(&content.replace("\r\n", "\n"))
    } else {
        compute_checksum(content)
    }
}
