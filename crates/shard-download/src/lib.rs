//! Tokio-driven shard-download engine: bridge/farmer HTTP clients, the
//! actor-style dispatch loop, the positioned-write sink, and snapshot
//! persistence (specification §4, §5).
//!
//! `shard_core` owns the pure domain types and crypto math; this crate owns
//! every concern that needs an async runtime or touches the filesystem or
//! the network.

pub mod bridge;
pub mod engine;
pub mod farmer;
pub mod sink;
pub mod snapshot_io;

pub use bridge::ReqwestBridgeClient;
pub use engine::{DownloadHandle, EngineDeps, resume, start};
pub use farmer::ReqwestFarmerClient;
pub use sink::{FileSink, ShardSink};
pub use snapshot_io::{read_snapshot, snapshot_exists, snapshot_path_for, write_snapshot};

pub use shard_core::{
    BridgeClientPort, BucketId, DownloadError, DownloadEventEmitterPort, DownloadOutcome,
    DownloadProgress, DownloadResult, DownloadState, DownloadSummary, EngineConfig, FarmerClientPort,
    FileId, FileInfo, NoopEmitter, Pointer, PointerStatus,
};
