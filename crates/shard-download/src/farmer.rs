//! The farmer shard-fetch adapter (specification §4.4, §4.6), built on
//! `reqwest`'s streaming body and cooperatively cancelled via
//! `tokio_util::sync::CancellationToken`. The chunk/cancel-select pattern is
//! grounded in the corpus's file-client streaming downloads.

use futures_util::StreamExt;
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use shard_core::ports::{FarmerClientPort, ShardFetchOutcome, ShardProgressSink};
use shard_core::{DownloadError, DownloadResult};

/// `reqwest`-backed [`FarmerClientPort`]. Stateless beyond the HTTP client —
/// farmers are addressed per-call via `host`/`port` straight off the
/// pointer, so one instance serves every farmer a download touches.
pub struct ReqwestFarmerClient {
    http: reqwest::Client,
}

impl ReqwestFarmerClient {
    #[must_use]
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for ReqwestFarmerClient {
    fn default() -> Self {
        Self::new()
    }
}

/// `hex(ripemd160(sha256(body)))`, the farmer's shard content hash
/// (specification §4.4, §4.6). Completes the hash check the original C
/// client left as a `// TODO` and never implemented.
fn shard_hash_hex(body: &[u8]) -> String {
    let sha = Sha256::digest(body);
    let ripe = Ripemd160::digest(sha);
    hex::encode(ripe)
}

#[async_trait::async_trait]
impl FarmerClientPort for ReqwestFarmerClient {
    async fn fetch_shard(
        &self,
        host: &str,
        port: u16,
        hash: &str,
        token: &str,
        expected_size: u64,
        progress: &dyn ShardProgressSink,
        cancel: &CancellationToken,
    ) -> DownloadResult<ShardFetchOutcome> {
        let url = format!("http://{host}:{port}/shards/{hash}?token={token}");

        let resp = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(DownloadError::TransferCanceled),
            result = self.http.get(&url).send() => {
                result.map_err(|e| DownloadError::farmer_request(e.to_string()))?
            }
        };

        let status = resp.status().as_u16();
        if let Some(err) = DownloadError::from_farmer_status(status, String::new()) {
            return Err(err);
        }

        let mut buffer = Vec::with_capacity(expected_size as usize);
        let mut stream = resp.bytes_stream();
        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(DownloadError::TransferCanceled),
                next = stream.next() => next,
            };
            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(|e| DownloadError::farmer_request(e.to_string()))?;
            buffer.extend_from_slice(&chunk);
            progress.on_chunk(buffer.len() as u64);
        }

        if buffer.len() as u64 != expected_size {
            return Err(DownloadError::farmer_integrity(format!(
                "expected {expected_size} bytes, received {}",
                buffer.len()
            )));
        }

        let actual_hash = shard_hash_hex(&buffer);
        if actual_hash != hash {
            return Err(DownloadError::farmer_integrity(format!(
                "shard hash mismatch: expected {hash}, computed {actual_hash}"
            )));
        }

        Ok(ShardFetchOutcome { body: buffer })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_hash_matches_ripemd160_of_sha256() {
        let body = b"farmer shard contents";
        let expected = {
            let sha = Sha256::digest(body);
            hex::encode(Ripemd160::digest(sha))
        };
        assert_eq!(shard_hash_hex(body), expected);
    }

    #[test]
    fn different_bodies_hash_differently() {
        assert_ne!(shard_hash_hex(b"one"), shard_hash_hex(b"two"));
    }
}
