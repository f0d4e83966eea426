//! Masks the module cipher key for the module configuration file.
//!
//! The cipher key is encrypted with AES-256-GCM under a key derived from the
//! obfuscation password with PBKDF2-HMAC-SHA256. The result is the base64
//! encoding of `salt || nonce || ciphertext`.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use sha2::Sha256;

use crate::domain::Secret;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const ROUNDS: u32 = 100_000;

/// Errors raised while masking or unmasking a key.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    /// The cipher rejected the input.
    #[error("failed to encrypt the key")]
    Encrypt,

    /// The masked key is not valid base64.
    #[error("masked key is not valid base64")]
    Decode(#[from] base64::DecodeError),

    /// The masked key is too short to hold a salt and nonce.
    #[error("masked key is truncated")]
    Truncated,

    /// Wrong password, or the masked key was altered.
    #[error("failed to decrypt the key; the password may be wrong")]
    Decrypt,

    /// The decrypted key is not UTF-8.
    #[error("decrypted key is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

fn derive_key(password: &str, salt: &[u8]) -> [u8; 32] {
    pbkdf2::pbkdf2_hmac_array::<Sha256, 32>(password.as_bytes(), salt, ROUNDS)
}

/// Encrypts `key` with `password`, for the `CipherKey` line of a module
/// configuration file.
///
/// A fresh salt and nonce are drawn on every call, so masking the same key
/// twice gives different text.
///
/// # Errors
///
/// Returns [`KeyError::Encrypt`] if the cipher fails.
pub fn obfuscate_key(key: &Secret, password: &Secret) -> Result<String, KeyError> {
    let mut salt = [0u8; SALT_LEN];
    let mut nonce = [0u8; NONCE_LEN];
    rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut salt);
    rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut nonce);

    let cipher = Aes256Gcm::new(&derive_key(password.expose(), &salt).into());
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), key.expose().as_bytes())
        .map_err(|_| KeyError::Encrypt)?;

    let mut masked = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
    masked.extend_from_slice(&salt);
    masked.extend_from_slice(&nonce);
    masked.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(masked))
}

/// Recovers a key masked by [`obfuscate_key`].
///
/// # Errors
///
/// Fails if `masked` is not base64, is truncated, or does not decrypt under
/// `password`.
pub fn reveal_key(masked: &str, password: &Secret) -> Result<String, KeyError> {
    let bytes = STANDARD.decode(masked.trim())?;
    if bytes.len() < SALT_LEN + NONCE_LEN {
        return Err(KeyError::Truncated);
    }
    let (salt, rest) = bytes.split_at(SALT_LEN);
    let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

    let cipher = Aes256Gcm::new(&derive_key(password.expose(), salt).into());
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| KeyError::Decrypt)?;
    Ok(String::from_utf8(plaintext)?)
}
