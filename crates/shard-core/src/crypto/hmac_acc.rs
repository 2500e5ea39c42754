//! Streaming HMAC-SHA512 accumulator over plaintext shards.

use hmac::{Hmac, Mac};
use sha2::Sha512;

type HmacSha512 = Hmac<Sha512>;

/// Accumulates HMAC-SHA512 over plaintext shard bytes fed in ascending
/// index order by the writer, finalized once and compared against the
/// bridge-reported HMAC (specification §4.5, §4.6).
pub struct HmacAccumulator {
    mac: HmacSha512,
}

impl HmacAccumulator {
    /// Start an accumulator keyed by `key`. An empty key is valid (used for
    /// unencrypted downloads, which still run the accumulator but accept a
    /// missing `info.hmac`).
    #[must_use]
    pub fn new(key: &[u8]) -> Self {
        Self {
            // A variable-key MAC never rejects a key of any length, including empty.
            mac: HmacSha512::new_from_slice(key).expect("HMAC accepts any key length"),
        }
    }

    /// Feed the next chunk of plaintext. Caller is responsible for ordering.
    pub fn update(&mut self, plaintext: &[u8]) {
        self.mac.update(plaintext);
    }

    /// Finalize and return the lowercase hex digest.
    #[must_use]
    pub fn finalize_hex(self) -> String {
        hex::encode(self.mac.finalize().into_bytes())
    }
}
