//! The farmer HTTP surface (specification §4.4).

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::DownloadResult;

/// Where a fetch reports incremental progress. Implemented by the engine's
/// pointer-table bookkeeping; the farmer client never aggregates across
/// pointers itself.
pub trait ShardProgressSink: Send + Sync {
    /// Called from the I/O task on each body chunk with the cumulative byte
    /// count received so far for this one shard.
    fn on_chunk(&self, cumulative_bytes: u64);
}

/// The raw (still encrypted, if applicable) shard body, plus the farmer
/// that served it — the engine decrypts and verifies separately so the
/// port stays a thin transport boundary.
#[derive(Clone, Debug)]
pub struct ShardFetchOutcome {
    /// Exactly `pointer.size` bytes, as declared by the bridge.
    pub body: Vec<u8>,
}

/// `GET http://{host}:{port}/shards/{hash}?token={token}` against one
/// farmer (specification §4.4). No range requests: the entire shard is
/// always read.
#[async_trait]
pub trait FarmerClientPort: Send + Sync {
    /// Fetch one shard. `expected_size` pre-sizes the receive buffer;
    /// a body shorter than `expected_size` is a
    /// [`crate::error::DownloadError::FarmerIntegrity`] error, not success.
    async fn fetch_shard(
        &self,
        host: &str,
        port: u16,
        hash: &str,
        token: &str,
        expected_size: u64,
        progress: &dyn ShardProgressSink,
        cancel: &CancellationToken,
    ) -> DownloadResult<ShardFetchOutcome>;
}
