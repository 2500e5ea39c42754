//! Resume-snapshot DTOs (specification §4.8, §6).
//!
//! Pure serde types; reading/writing the `.json` sidecar file is
//! `shard_download::snapshot_io`'s job, since that needs filesystem access.

use serde::{Deserialize, Serialize};

use crate::ids::{BucketId, FileId};
use crate::pointer::{Pointer, PointerStatus};
use crate::report::{ExchangeReport, SendStatus};
use crate::state::DownloadState;

/// Current on-disk schema version. Bump when the document shape changes so
/// a future reader can detect an incompatible snapshot instead of guessing.
pub const SCHEMA_VERSION: u32 = 1;

/// One pointer's persisted fields (specification §4.8).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SnapshotPointer {
    /// Bridge-assigned index.
    pub index: u32,
    /// Shard size in bytes.
    pub size: u64,
    /// Hex content hash.
    pub hash: String,
    /// Farmer node id.
    pub farmer_id: String,
    /// Farmer host.
    pub farmer_host: String,
    /// Farmer port.
    pub farmer_port: u16,
    /// Bridge-issued token.
    pub token: String,
    /// Lifecycle state at snapshot time.
    pub status: PointerStatus,
    /// Bytes received in the attempt active at snapshot time.
    pub downloaded_size: u64,
    /// Replacement count.
    pub replace_count: u32,
    /// The most recent exchange report, if any.
    pub report: Option<ExchangeReport>,
}

impl From<&Pointer> for SnapshotPointer {
    fn from(p: &Pointer) -> Self {
        Self {
            index: p.index,
            size: p.size,
            hash: p.hash.clone(),
            farmer_id: p.farmer_id.clone(),
            farmer_host: p.farmer_host.clone(),
            farmer_port: p.farmer_port,
            token: p.token.clone(),
            status: p.status,
            downloaded_size: p.downloaded_size,
            replace_count: p.replace_count,
            report: p.report.clone(),
        }
    }
}

impl SnapshotPointer {
    /// Restore into an engine `Pointer`. Per specification §4.8, any
    /// pointer whose status was not `Written` is reset to `Created` so the
    /// next run re-fetches its shard; `Written` pointers are preserved.
    #[must_use]
    pub fn into_pointer(self) -> Pointer {
        let resumed_status = if self.status == PointerStatus::Written {
            PointerStatus::Written
        } else {
            PointerStatus::Created
        };
        let downloaded_size = if resumed_status == PointerStatus::Written {
            self.downloaded_size
        } else {
            0
        };
        let report = if resumed_status == PointerStatus::Written {
            self.report
        } else {
            self.report.map(|mut r| {
                r.send_status = SendStatus::Unsent;
                r
            })
        };
        Pointer {
            index: self.index,
            size: self.size,
            downloaded_size,
            hash: self.hash,
            farmer_id: self.farmer_id,
            farmer_host: self.farmer_host,
            farmer_port: self.farmer_port,
            token: self.token,
            replace_count: self.replace_count,
            status: resumed_status,
            report,
            buffer: None,
        }
    }
}

/// The full resume document persisted alongside the sink.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SnapshotDocument {
    /// Schema version, for forward compatibility.
    pub schema_version: u32,
    /// Target bucket.
    pub bucket_id: BucketId,
    /// Target file.
    pub file_id: FileId,
    /// Uniform shard size, if known at snapshot time.
    pub shard_size: Option<u64>,
    /// Every pointer known at snapshot time.
    pub pointers: Vec<SnapshotPointer>,
    /// Whether the bridge had signaled no more pages.
    pub pointers_completed: bool,
}

impl SnapshotDocument {
    /// Capture a snapshot of `state`.
    #[must_use]
    pub fn capture(state: &DownloadState) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            bucket_id: state.bucket_id.clone(),
            file_id: state.file_id.clone(),
            shard_size: state.shard_size,
            pointers: state.pointers.iter().map(SnapshotPointer::from).collect(),
            pointers_completed: state.pointers_completed,
        }
    }

    /// Restored pointer table and completed-shard count, ready to splice
    /// into a fresh `DownloadState`.
    #[must_use]
    pub fn restore_pointers(self) -> (Vec<Pointer>, u32) {
        let pointers: Vec<Pointer> = self
            .pointers
            .into_iter()
            .map(SnapshotPointer::into_pointer)
            .collect();
        let completed = pointers
            .iter()
            .filter(|p| p.status == PointerStatus::Written)
            .count() as u32;
        (pointers, completed)
    }
}
