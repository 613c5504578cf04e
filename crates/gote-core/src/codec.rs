//! Note envelope encryption.
//!
//! Content is sealed with AES-256-GCM. Every call to [`encode`] draws a
//! fresh 96-bit nonce from the OS random source and stores it in front of
//! the ciphertext, so neither the key nor the note id ever determines a
//! nonce. `encrypted_data` is `base64(nonce || ciphertext || tag)`.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::crypto::key::NoteKey;
use crate::crypto::random::random_bytes;
use crate::error::{GoteError, Result};
use crate::storage::types::{EncryptedNote, Note};

/// AES-GCM nonce length in bytes.
const NONCE_LENGTH: usize = 12;

/// AES-GCM authentication tag length in bytes.
const TAG_LENGTH: usize = 16;

fn cipher(key: &NoteKey) -> Result<Aes256Gcm> {
    Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| GoteError::Crypto(format!("Invalid key: {}", e)))
}

/// Encrypt `content`, returning the `encrypted_data` field of an envelope.
///
/// # Errors
///
/// Returns `GoteError::Crypto` if the nonce cannot be generated.
pub fn encode(content: &str, key: &NoteKey) -> Result<String> {
    let nonce_bytes = random_bytes::<NONCE_LENGTH>()?;
    let ciphertext = cipher(key)?
        .encrypt(Nonce::from_slice(&nonce_bytes), content.as_bytes())
        .map_err(|e| GoteError::Crypto(format!("Encryption failed: {}", e)))?;

    let mut payload = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
    payload.extend_from_slice(&nonce_bytes);
    payload.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(payload))
}

/// Decrypt an envelope's content.
///
/// # Errors
///
/// - `GoteError::Authentication` if the tag does not verify (wrong key or
///   tampered ciphertext); altered plaintext is never returned
/// - `GoteError::Corruption` if the payload is not valid base64, is too
///   short to hold a nonce and tag, or decrypts to invalid UTF-8
pub fn decode(envelope: &EncryptedNote, key: &NoteKey) -> Result<String> {
    let payload = STANDARD
        .decode(envelope.encrypted_data.trim())
        .map_err(|e| GoteError::corruption(&envelope.id, format!("invalid base64: {}", e)))?;
    if payload.len() < NONCE_LENGTH + TAG_LENGTH {
        return Err(GoteError::corruption(
            &envelope.id,
            "encrypted payload is truncated",
        ));
    }

    let (nonce_bytes, ciphertext) = payload.split_at(NONCE_LENGTH);
    let plaintext = cipher(key)?
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| GoteError::Authentication)?;

    String::from_utf8(plaintext)
        .map_err(|_| GoteError::corruption(&envelope.id, "content is not valid UTF-8"))
}

/// Seal a plaintext note into its on-disk envelope.
pub fn seal(note: &Note, key: &NoteKey) -> Result<EncryptedNote> {
    Ok(EncryptedNote {
        id: note.id.clone(),
        encrypted_data: encode(&note.content, key)?,
        created_at: note.created_at,
        updated_at: note.updated_at,
    })
}

/// Open an envelope into a plaintext note.
pub fn open(envelope: &EncryptedNote, key: &NoteKey) -> Result<Note> {
    Ok(Note {
        id: envelope.id.clone(),
        content: decode(envelope, key)?,
        created_at: envelope.created_at,
        updated_at: envelope.updated_at,
    })
}
