//! Whole-file content digests.

use std::fmt::Write as _;
use std::fs::File;
use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of a file's bytes.
pub fn file_digest(path: impl AsRef<Path>) -> io::Result<String> {
    let mut hasher = Sha256::new();
    io::copy(&mut File::open(path.as_ref())?, &mut hasher)?;
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(hex, "{byte:02x}");
    }
    Ok(hex)
}
