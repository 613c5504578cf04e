//! Secure random source.
//!
//! Every call goes to the OS entropy source. Failures are returned as
//! `GoteError::Crypto` and never replaced with a weaker fallback.

use crate::error::{GoteError, Result};

/// Length of a note id in bytes (rendered as 8 lowercase hex characters).
const NOTE_ID_BYTES: usize = 4;

/// Fill `buf` from the OS random source.
pub fn fill_random(buf: &mut [u8]) -> Result<()> {
    getrandom::getrandom(buf)
        .map_err(|e| GoteError::Crypto(format!("Secure random source failed: {}", e)))
}

/// Return `N` random bytes.
pub fn random_bytes<const N: usize>() -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    fill_random(&mut buf)?;
    Ok(buf)
}

/// Generate a candidate note id: 8 lowercase hex characters.
///
/// Uniqueness is not guaranteed here; the store checks for collisions.
pub fn random_note_id() -> Result<String> {
    Ok(hex::encode(random_bytes::<NOTE_ID_BYTES>()?))
}
