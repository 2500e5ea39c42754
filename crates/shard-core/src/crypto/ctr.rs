//! Big-endian CTR/IV stepping.
//!
//! Grounded in `increment_ctr_aes_iv` (`examples/original_source/src/crypto.c`):
//! advances a 16-byte counter by `bytes_position / AES_BLOCK_SIZE` blocks,
//! carrying from the last byte backwards.

/// AES block size in bytes.
pub const AES_BLOCK_SIZE: usize = 16;

/// A `bytes_position` that is not a whole number of AES blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("byte position {0} is not a multiple of the AES block size (16)")]
pub struct NotBlockAligned(pub u64);

/// Advance `iv` by `bytes_position / AES_BLOCK_SIZE` big-endian counter
/// increments. `bytes_position` must be a multiple of [`AES_BLOCK_SIZE`];
/// any caller that violates this fails with [`NotBlockAligned`] rather than
/// silently truncating, per specification §4.6.
///
/// `increment_ctr(iv, 0) == iv` and the operation is a monoid under
/// addition of block-aligned byte positions: incrementing by `a` then `b`
/// is the same as incrementing once by `a + b`.
pub fn increment_ctr(iv: [u8; 16], bytes_position: u64) -> Result<[u8; 16], NotBlockAligned> {
    if bytes_position % AES_BLOCK_SIZE as u64 != 0 {
        return Err(NotBlockAligned(bytes_position));
    }
    let mut iv = iv;
    let mut times = bytes_position / AES_BLOCK_SIZE as u64;
    while times > 0 {
        let mut i = AES_BLOCK_SIZE - 1;
        loop {
            iv[i] = iv[i].wrapping_add(1);
            if iv[i] != 0 || i == 0 {
                break;
            }
            i -= 1;
        }
        times -= 1;
    }
    Ok(iv)
}

/// The CTR for shard `index`, given the download's initial CTR and uniform
/// shard size: `increment_ctr(initial_ctr, index * shard_size)`
/// (specification §4.4).
pub fn ctr_for_shard(
    initial_ctr: [u8; 16],
    index: u32,
    shard_size: u64,
) -> Result<[u8; 16], NotBlockAligned> {
    increment_ctr(initial_ctr, u64::from(index) * shard_size)
}
