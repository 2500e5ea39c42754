//! Per-file symmetric key and CTR derivation from a BIP39 mnemonic.
//!
//! Grounded in `generate_bucket_key`/`generate_file_key`/`get_deterministic_key`
//! and the inline derivation in `storj_bridge_resolve_file` (both in
//! `examples/original_source/src/{crypto,downloader}.c`):
//!
//! ```text
//! seed        = bip39_seed(mnemonic, "")                     // 64 bytes
//! bucket_key  = deterministic_key(hex(seed), bucket_id)      // 64 hex chars
//! file_key    = deterministic_key(bucket_key, file_id)       // 64 hex chars
//! decrypt_key = sha256(file_key.as_bytes())                  // 32 bytes
//! decrypt_ctr = ripemd160(file_id.as_bytes())[..16]          // 16 bytes
//! ```
//!
//! `deterministic_key(key, id)` treats `key || id` as an ASCII hex string,
//! hex-decodes it, SHA-512s the decoded bytes, and keeps the first 64 hex
//! characters (32 bytes) of the digest's hex encoding.

use bip39::Mnemonic;
use ripemd::Ripemd160;
use sha2::{Digest, Sha256, Sha512};
use thiserror::Error;

/// Key derivation failed: a bad mnemonic, or a malformed id.
#[derive(Debug, Error)]
pub enum KeyDerivationError {
    /// The mnemonic failed BIP39 validation.
    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),
    /// `key || id` was not valid hex (odd length or non-hex characters).
    #[error("deterministic key input was not valid hex")]
    NotHex,
}

/// Decryption material for one file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileKeyMaterial {
    /// 32-byte AES-256 key.
    pub decrypt_key: [u8; 32],
    /// 16-byte initial CTR/IV.
    pub decrypt_ctr: [u8; 16],
}

/// `deterministic_key(key, id) = first_64_hex_chars(sha512(hex_decode(key || id)))`.
fn deterministic_key(key: &str, id: &str) -> Result<String, KeyDerivationError> {
    let combined = format!("{key}{id}");
    let decoded = hex::decode(&combined).map_err(|_| KeyDerivationError::NotHex)?;
    let digest = Sha512::digest(&decoded);
    let hex_digest = hex::encode(digest);
    Ok(hex_digest[..64].to_string())
}

/// Derive the per-file decryption key and initial CTR for `bucket_id`/`file_id`
/// under `mnemonic`, per specification §4.6.
pub fn derive_file_key_material(
    mnemonic: &str,
    bucket_id: &str,
    file_id: &str,
) -> Result<FileKeyMaterial, KeyDerivationError> {
    let mnemonic: Mnemonic = mnemonic
        .parse()
        .map_err(|e: bip39::Error| KeyDerivationError::InvalidMnemonic(e.to_string()))?;
    let seed = mnemonic.to_seed("");
    let seed_hex = hex::encode(seed);

    let bucket_key = deterministic_key(&seed_hex, bucket_id)?;
    let file_key = deterministic_key(&bucket_key, file_id)?;

    let decrypt_key: [u8; 32] = Sha256::digest(file_key.as_bytes()).into();

    let file_id_ripemd = Ripemd160::digest(file_id.as_bytes());
    let mut decrypt_ctr = [0u8; 16];
    decrypt_ctr.copy_from_slice(&file_id_ripemd[..16]);

    Ok(FileKeyMaterial {
        decrypt_key,
        decrypt_ctr,
    })
}
