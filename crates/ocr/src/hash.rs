use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::recognizer::RecognitionMode;

/// Compute SHA-256 of an in-memory byte slice.
pub fn sha256_bytes(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Encode a raw 32-byte hash as a lowercase hex string (64 chars).
pub fn to_hex(hash: &[u8; 32]) -> String {
    hash.iter().map(|b| format!("{b:02x}")).collect()
}

/// Per-document artifact directory.
/// Layout: `<base>/<first_2_hex_chars>/<full_hex>/`
pub fn artifact_dir(base: &Path, hash_hex: &str) -> PathBuf {
    base.join(&hash_hex[..2]).join(hash_hex)
}

/// Transcript file for one pass inside [`artifact_dir`].
pub fn artifact_file_name(iteration: u8, mode: RecognitionMode) -> String {
    format!("scenario_{iteration}_mode_{}.txt", mode.psm())
}
