//! The pointer table: one descriptor per shard, with its own lifecycle.

use serde::{Deserialize, Serialize};

use crate::report::ExchangeReport;

/// Lifecycle state of a single pointer, per specification §3.
///
/// ```text
/// CREATED -> BEING_DOWNLOADED -> { DOWNLOADED | ERROR }
///          -> { BEING_WRITTEN | ERROR_REPORTED } -> { WRITTEN | BEING_REPLACED }
///          -> CREATED (if replaced)
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerStatus {
    /// Freshly created (or reset after a replacement), not yet dispatched.
    Created,
    /// A farmer fetch is in flight for this pointer.
    BeingDownloaded,
    /// The shard body was fetched and verified, awaiting its turn to write.
    Downloaded,
    /// The farmer fetch failed; an exchange report is pending/in flight.
    Error,
    /// The exchange report for a failed fetch was sent (or retries
    /// exhausted); the pointer may now be replaced.
    ErrorReported,
    /// The writer owns this pointer's buffer right now.
    BeingWritten,
    /// A replacement pointer request is in flight for this index.
    BeingReplaced,
    /// Terminal: the shard has been written to the sink.
    Written,
}

impl PointerStatus {
    /// True once a pointer will never be touched again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Written)
    }
}

/// One shard descriptor.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Pointer {
    /// Position in the reconstructed file; determines byte offset and CTR
    /// increment.
    pub index: u32,
    /// Shard size in bytes.
    pub size: u64,
    /// Bytes received so far during the current fetch attempt (monotonic
    /// within one attempt, reset to 0 on replacement).
    pub downloaded_size: u64,
    /// Hex-encoded content hash, used both as the farmer URL path and for
    /// post-fetch integrity verification.
    pub hash: String,
    /// Farmer node id (the `nodeID` field from the bridge).
    pub farmer_id: String,
    /// Farmer host/address.
    pub farmer_host: String,
    /// Farmer port.
    pub farmer_port: u16,
    /// Bridge-issued, single-use access token for this shard.
    pub token: String,
    /// Number of times this index has been re-fetched from a new farmer.
    pub replace_count: u32,
    /// Current lifecycle state.
    pub status: PointerStatus,
    /// The exchange report for the current (or most recent) fetch attempt.
    pub report: Option<ExchangeReport>,
    /// Shard bytes, owned only between "downloaded" and "written".
    #[serde(skip)]
    pub buffer: Option<Vec<u8>>,
}

/// Maximum number of times a pointer index may be replaced before the
/// download fails with `FarmerExhausted` (specification §3/§4.3).
pub const MAX_REPLACE_COUNT: u32 = 3;

impl Pointer {
    /// Construct a freshly created pointer from bridge-supplied fields.
    #[must_use]
    pub fn new(
        index: u32,
        size: u64,
        hash: String,
        farmer_id: String,
        farmer_host: String,
        farmer_port: u16,
        token: String,
    ) -> Self {
        Self {
            index,
            size,
            downloaded_size: 0,
            hash,
            farmer_id,
            farmer_host,
            farmer_port,
            token,
            replace_count: 0,
            status: PointerStatus::Created,
            report: None,
            buffer: None,
        }
    }

    /// The byte offset in the reconstructed file at which this shard's
    /// content begins, given a uniform shard size.
    #[must_use]
    pub const fn offset(&self, shard_size: u64) -> u64 {
        self.index as u64 * shard_size
    }

    /// Rewrite this pointer in place with a replacement descriptor,
    /// incrementing `replace_count` and resetting fetch-local state.
    /// Returns `Err` once the replacement cap (3) would be exceeded.
    pub fn apply_replacement(
        &mut self,
        size: u64,
        hash: String,
        farmer_id: String,
        farmer_host: String,
        farmer_port: u16,
        token: String,
    ) -> Result<(), u32> {
        if self.replace_count >= MAX_REPLACE_COUNT {
            return Err(self.replace_count);
        }
        self.size = size;
        self.hash = hash;
        self.farmer_id = farmer_id;
        self.farmer_host = farmer_host;
        self.farmer_port = farmer_port;
        self.token = token;
        self.downloaded_size = 0;
        self.replace_count += 1;
        self.status = PointerStatus::Created;
        self.report = None;
        self.buffer = None;
        Ok(())
    }
}
