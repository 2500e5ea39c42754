//! Key derivation, CTR stepping, and the HMAC accumulator.
//!
//! Pure math: no network, no file I/O. Grounded directly in
//! `examples/original_source/src/crypto.c`, translated from the nettle-based
//! C implementation to `sha2`/`ripemd`/`hmac`/`aes`/`ctr`.

pub mod ctr;
pub mod hmac_acc;
pub mod keys;
pub mod stream;

pub use ctr::{ctr_for_shard, increment_ctr};
pub use hmac_acc::HmacAccumulator;
pub use keys::{FileKeyMaterial, derive_file_key_material};
pub use stream::decrypt_shard;
