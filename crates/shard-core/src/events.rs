//! Progress and completion events handed back to the caller.

use crate::error::DownloadError;

/// A progress tick, emitted at most once per `EngineConfig::progress_interval`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DownloadProgress {
    /// `downloaded_bytes / total_bytes`, or 0.0 before `total_bytes` is known.
    pub fraction: f64,
    /// Bytes received across all pointers so far (encrypted-on-wire count).
    pub downloaded_bytes: u64,
    /// Sum of every pointer's declared size, once known.
    pub total_bytes: u64,
}

/// The terminal outcome of a download, handed to `on_finished` exactly once.
///
/// Unlike the C source this is distilled from — which threads an opaque
/// `void *handle` through every callback so C's closures-via-userdata can
/// find their context again — a Rust caller's closure already captures
/// whatever state it needs, so `on_finished` only carries the outcome
/// itself plus the ids it completed.
#[derive(Clone, Debug)]
pub enum DownloadOutcome {
    /// Every shard was written and the HMAC (if any) matched.
    Completed(crate::state::DownloadSummary),
    /// `cancel()` was called before completion.
    Canceled,
    /// A fatal or promoted error aborted the download.
    Failed(DownloadError),
}

impl DownloadOutcome {
    /// The stable status code handed to logs and user-facing reporting.
    #[must_use]
    pub fn status_code(&self) -> &'static str {
        match self {
            Self::Completed(_) => "complete",
            Self::Canceled => "transfer_canceled",
            Self::Failed(err) => err.status_code(),
        }
    }
}
