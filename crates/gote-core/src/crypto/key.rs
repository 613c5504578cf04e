//! Symmetric note key.

use subtle::ConstantTimeEq;
use zeroize::ZeroizeOnDrop;

use crate::error::{GoteError, Result};

/// Length of the note encryption key in bytes (AES-256).
pub const KEY_LENGTH: usize = 32;

/// A symmetric key derived from the user's password.
///
/// Key material is zeroized from memory when the last owner drops it. The
/// session shares one key through `Arc<NoteKey>`; the key is never mutated.
/// Equality is constant-time.
#[derive(Clone, ZeroizeOnDrop)]
pub struct NoteKey {
    key: [u8; KEY_LENGTH],
}

impl NoteKey {
    /// Wrap raw key bytes.
    ///
    /// The caller is responsible for ensuring the bytes come from a key
    /// derivation function or a secure random source.
    pub fn from_bytes(bytes: [u8; KEY_LENGTH]) -> Self {
        Self { key: bytes }
    }

    /// Wrap a slice, rejecting anything that is not exactly `KEY_LENGTH` bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let key: [u8; KEY_LENGTH] = bytes.try_into().map_err(|_| {
            GoteError::Crypto(format!(
                "Key must be {} bytes (got {})",
                KEY_LENGTH,
                bytes.len()
            ))
        })?;
        Ok(Self::from_bytes(key))
    }

    /// Raw key bytes. Avoid storing or logging this value.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }
}

impl PartialEq for NoteKey {
    fn eq(&self, other: &Self) -> bool {
        self.key[..].ct_eq(&other.key[..]).into()
    }
}

impl Eq for NoteKey {}

impl std::fmt::Debug for NoteKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoteKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}
