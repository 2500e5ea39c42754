//! The caller's progress/completion sink (specification §4.1 `start`, §9
//! "dynamic dispatch / callbacks").

use crate::events::{DownloadOutcome, DownloadProgress};

/// Two caller-supplied callbacks, modeled as a trait so the engine can hold
/// one behind a type parameter or a `dyn` reference without caring which.
///
/// `on_progress` may be called many times; `on_finished` fires exactly once,
/// only once `pending_work_count` has drained to zero (specification §4.1
/// step 1/3).
pub trait DownloadEventEmitterPort: Send + Sync {
    /// A throttled progress tick.
    fn on_progress(&self, progress: DownloadProgress);

    /// The terminal outcome. Always called exactly once per download.
    fn on_finished(&self, outcome: DownloadOutcome);
}

/// An emitter that discards every event, for callers that only want the
/// final `Result` from the engine's returned future/join handle.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopEmitter;

impl DownloadEventEmitterPort for NoopEmitter {
    fn on_progress(&self, _progress: DownloadProgress) {}
    fn on_finished(&self, _outcome: DownloadOutcome) {}
}

/// Adapts two plain closures to [`DownloadEventEmitterPort`], matching the
/// distilled spec's `start(..., on_progress, on_finished)` call shape
/// without forcing every caller to name a struct.
pub struct FnEventEmitter<P, F>
where
    P: Fn(DownloadProgress) + Send + Sync,
    F: Fn(DownloadOutcome) + Send + Sync,
{
    on_progress: P,
    on_finished: F,
}

impl<P, F> FnEventEmitter<P, F>
where
    P: Fn(DownloadProgress) + Send + Sync,
    F: Fn(DownloadOutcome) + Send + Sync,
{
    /// Wrap two closures as an emitter.
    pub const fn new(on_progress: P, on_finished: F) -> Self {
        Self {
            on_progress,
            on_finished,
        }
    }
}

impl<P, F> DownloadEventEmitterPort for FnEventEmitter<P, F>
where
    P: Fn(DownloadProgress) + Send + Sync,
    F: Fn(DownloadOutcome) + Send + Sync,
{
    fn on_progress(&self, progress: DownloadProgress) {
        (self.on_progress)(progress);
    }

    fn on_finished(&self, outcome: DownloadOutcome) {
        (self.on_finished)(outcome);
    }
}
