//! Port traits the engine drives against: the bridge, the farmer, and the
//! caller's event sink. Concrete adapters (reqwest-backed clients) live in
//! `shard_download`; tests provide in-memory fakes implementing the same
//! traits.

mod bridge;
mod event_emitter;
mod farmer;

pub use bridge::{
    BridgeClientPort, PointerDescriptor, PointerPage, ReplacementRequest, TokenOperation,
};
pub use event_emitter::{DownloadEventEmitterPort, FnEventEmitter, NoopEmitter};
pub use farmer::{FarmerClientPort, ShardFetchOutcome, ShardProgressSink};
