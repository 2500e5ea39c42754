//! AES-256-CTR decryption of one shard, keyed to its position in the file.
//!
//! Grounded in `decrypt_read_buffer` (`examples/original_source/src/crypto.c`),
//! translated from nettle's `CTR_CRYPT` to RustCrypto's `aes`/`ctr` pair. The
//! farmer client calls [`decrypt_shard`] in place on the worker thread that
//! fetched the shard (specification §4.4), after deriving the shard's CTR
//! with [`super::ctr::ctr_for_shard`].

use aes::Aes256;
use ctr::Ctr128BE;
use ctr::cipher::{KeyIvInit, StreamCipher};

type Aes256Ctr = Ctr128BE<Aes256>;

/// Decrypt `buffer` in place with AES-256-CTR under `key`/`ctr`.
///
/// CTR is its own inverse: the same operation also encrypts, which is what
/// the HMAC round-trip property in specification §8 relies on.
pub fn decrypt_shard(key: &[u8; 32], ctr: &[u8; 16], buffer: &mut [u8]) {
    let mut cipher = Aes256Ctr::new(key.into(), ctr.into());
    cipher.apply_keystream(buffer);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::ctr::ctr_for_shard;

    #[test]
    fn decrypt_is_its_own_inverse() {
        let key = [0x42u8; 32];
        let ctr = [0x11u8; 16];
        let plaintext = b"the quick brown fox jumps over the lazy dog!!!!".to_vec();

        let mut ciphertext = plaintext.clone();
        decrypt_shard(&key, &ctr, &mut ciphertext);
        assert_ne!(ciphertext, plaintext);

        let mut round_tripped = ciphertext.clone();
        decrypt_shard(&key, &ctr, &mut round_tripped);
        assert_eq!(round_tripped, plaintext);
    }

    #[test]
    fn shard_ctr_differs_by_index_so_does_keystream() {
        let key = [0x01u8; 32];
        let initial_ctr = [0x00u8; 16];
        let shard_size = 16u64 * 1024 * 1024;

        let ctr0 = ctr_for_shard(initial_ctr, 0, shard_size).unwrap();
        let ctr1 = ctr_for_shard(initial_ctr, 1, shard_size).unwrap();

        let mut a = vec![0u8; 32];
        let mut b = vec![0u8; 32];
        decrypt_shard(&key, &ctr0, &mut a);
        decrypt_shard(&key, &ctr1, &mut b);
        assert_ne!(a, b);
    }
}
