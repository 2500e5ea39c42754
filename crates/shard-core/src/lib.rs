//! Pure domain types, error taxonomy, port traits, and crypto math for the
//! shard-download engine.
//!
//! No async runtime and no network dependency lives here — this crate only
//! describes *what* a download is and *how* its crypto works. The tokio-driven
//! implementation (bridge/farmer HTTP clients, the dispatch loop, the writer)
//! lives in `shard-download`.

pub mod config;
pub mod crypto;
pub mod error;
pub mod events;
pub mod file_info;
pub mod ids;
pub mod pointer;
pub mod ports;
pub mod report;
pub mod snapshot;
pub mod state;

pub use config::EngineConfig;
pub use error::{DownloadError, DownloadResult};
pub use events::{DownloadOutcome, DownloadProgress};
pub use file_info::{FileInfo, HmacInfo};
pub use ids::{BucketId, FileId};
pub use pointer::{Pointer, PointerStatus};
pub use ports::{BridgeClientPort, DownloadEventEmitterPort, FarmerClientPort, NoopEmitter};
pub use report::{ExchangeReport, ReportResultCode, SendStatus};
pub use state::{DownloadState, DownloadSummary};
