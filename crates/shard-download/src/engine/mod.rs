//! The download dispatch loop (specification §4.1, §5): a single task owns
//! `DownloadState` exclusively; every bridge call, farmer fetch, positioned
//! write, and report send runs as a spawned task that reports its result
//! back over an `mpsc` channel. The dispatch task never awaits I/O itself —
//! it only inspects state and decides what to spawn next, the same
//! single-owner/worker-pool split as the teacher's `manager/worker.rs`.

mod replace;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use shard_core::crypto::{HmacAccumulator, ctr_for_shard, decrypt_shard, derive_file_key_material};
use shard_core::ports::{
    BridgeClientPort, FarmerClientPort, PointerDescriptor, ReplacementRequest, ShardProgressSink,
    TokenOperation,
};
use shard_core::report::{ExchangeReport, ReportResultCode, SendStatus};
use shard_core::state::DecryptMaterial;
use shard_core::{
    BucketId, DownloadError, DownloadEventEmitterPort, DownloadOutcome, DownloadProgress,
    DownloadResult, DownloadState, EngineConfig, FileId, Pointer, PointerStatus,
};

use crate::sink::ShardSink;
use crate::snapshot_io;
use replace::PointerRequestAction;

/// Results fed back to the dispatch loop. Every variant but `ShardProgress`
/// and `Cancel` represents the completion of exactly one spawned work unit
/// and is paired with a `pending_work_count` decrement.
enum WorkEvent {
    TokenReceived(DownloadResult<String>),
    PointersReceived {
        result: DownloadResult<Vec<PointerDescriptor>>,
    },
    ReplacementReceived {
        index: u32,
        result: DownloadResult<PointerDescriptor>,
    },
    FileInfoReceived(DownloadResult<shard_core::FileInfo>),
    ShardFetched {
        index: u32,
        result: DownloadResult<Vec<u8>>,
    },
    ShardProgress {
        index: u32,
        cumulative_bytes: u64,
    },
    ShardWritten {
        index: u32,
        result: DownloadResult<()>,
    },
    ReportSent {
        index: u32,
        result: DownloadResult<()>,
    },
    Cancel,
}

/// Relays farmer progress chunks back onto the dispatch loop without
/// letting the fetch worker touch `DownloadState` directly.
struct ProgressRelay {
    index: u32,
    tx: mpsc::UnboundedSender<WorkEvent>,
}

impl ShardProgressSink for ProgressRelay {
    fn on_chunk(&self, cumulative_bytes: u64) {
        let _ = self.tx.send(WorkEvent::ShardProgress {
            index: self.index,
            cumulative_bytes,
        });
    }
}

/// A live handle to a running download. Dropping it does not cancel the
/// download — call [`DownloadHandle::cancel`] explicitly, matching the
/// teacher's explicit-cancel-token convention over drop-to-cancel.
pub struct DownloadHandle {
    events_tx: mpsc::UnboundedSender<WorkEvent>,
    cancel_token: CancellationToken,
    join: JoinHandle<()>,
}

impl DownloadHandle {
    /// Idempotent cancellation (specification §4.1 `cancel`).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
        let _ = self.events_tx.send(WorkEvent::Cancel);
    }

    /// Wait for the engine's dispatch task to exit. The terminal outcome was
    /// already delivered to the caller's [`DownloadEventEmitterPort`] by
    /// this point.
    pub async fn join(self) {
        let _ = self.join.await;
    }
}

/// Everything the engine needs to drive one download, gathered so
/// `start`/`resume` don't take an unreadable parameter list.
pub struct EngineDeps {
    pub config: EngineConfig,
    pub bridge: Arc<dyn BridgeClientPort>,
    pub farmer: Arc<dyn FarmerClientPort>,
    pub sink: Arc<dyn ShardSink>,
    pub emitter: Arc<dyn DownloadEventEmitterPort>,
}

/// Start a fresh download (specification §4.1 `start`).
#[must_use]
pub fn start(deps: EngineDeps, bucket_id: BucketId, file_id: FileId) -> DownloadHandle {
    let decrypt = match &deps.config.mnemonic {
        Some(mnemonic) => match derive_file_key_material(mnemonic, bucket_id.as_ref(), file_id.as_ref()) {
            Ok(material) => Some(DecryptMaterial {
                key: material.decrypt_key,
                initial_ctr: material.decrypt_ctr,
            }),
            Err(e) => {
                let engine = Engine::failed(deps, bucket_id, file_id, DownloadError::memory(e.to_string()));
                return engine.spawn();
            }
        },
        None => None,
    };
    let state = DownloadState::new(bucket_id, file_id, decrypt);
    Engine::new(deps, state).spawn()
}

/// Resume a download from its `.json` snapshot sidecar (specification §4.1
/// `deserialize`, §4.8). The decrypt material is re-derived rather than
/// persisted, since the mnemonic (not the derived key) is the long-lived
/// secret the caller holds.
pub fn resume(deps: EngineDeps, bucket_id: BucketId, file_id: FileId) -> DownloadResult<DownloadHandle> {
    let doc = snapshot_io::read_snapshot(deps.sink.path())?;
    let decrypt = match &deps.config.mnemonic {
        Some(mnemonic) => {
            let material = derive_file_key_material(mnemonic, bucket_id.as_ref(), file_id.as_ref())
                .map_err(|e| DownloadError::memory(e.to_string()))?;
            Some(DecryptMaterial {
                key: material.decrypt_key,
                initial_ctr: material.decrypt_ctr,
            })
        }
        None => None,
    };
    let mut state = DownloadState::new(bucket_id, file_id, decrypt);
    let (pointers, completed) = doc.restore_pointers();
    state.shard_size = doc.shard_size;
    state.pointers = pointers;
    state.completed_shards = completed;
    state.pointers_completed = true;

    let shard_size = state.shard_size.unwrap_or(0);
    let engine = Engine::new(deps, state);
    engine.replay_hmac(shard_size)?;
    Ok(engine.spawn())
}

/// Owns one in-flight download's state and the collaborators it dispatches
/// work against.
struct Engine {
    state: DownloadState,
    config: EngineConfig,
    bridge: Arc<dyn BridgeClientPort>,
    farmer: Arc<dyn FarmerClientPort>,
    sink: Arc<dyn ShardSink>,
    emitter: Arc<dyn DownloadEventEmitterPort>,
    hmac: Arc<Mutex<Option<HmacAccumulator>>>,
    events_tx: mpsc::UnboundedSender<WorkEvent>,
    events_rx: mpsc::UnboundedReceiver<WorkEvent>,
    cancel_root: CancellationToken,
    fetch_cancels: HashMap<u32, CancellationToken>,
    last_progress_at: Option<Instant>,
}

impl Engine {
    fn new(deps: EngineDeps, state: DownloadState) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let hmac_key = state
            .decrypt
            .as_ref()
            .map_or_else(Vec::new, |d| d.key.to_vec());
        Self {
            state,
            config: deps.config,
            bridge: deps.bridge,
            farmer: deps.farmer,
            sink: deps.sink,
            emitter: deps.emitter,
            hmac: Arc::new(Mutex::new(Some(HmacAccumulator::new(&hmac_key)))),
            events_tx,
            events_rx,
            cancel_root: CancellationToken::new(),
            fetch_cancels: HashMap::new(),
            last_progress_at: None,
        }
    }

    /// Construct an engine that immediately fails — used when `start` hits
    /// a synchronous precondition error (a bad mnemonic) before any state
    /// exists to dispatch from.
    fn failed(deps: EngineDeps, bucket_id: BucketId, file_id: FileId, err: DownloadError) -> Self {
        let mut state = DownloadState::new(bucket_id, file_id, None);
        state.error = Some(err);
        Self::new(deps, state)
    }

    /// Feed the plaintext of every already-`Written` pointer back through the
    /// HMAC accumulator, in ascending index order, before the dispatch loop
    /// starts. The accumulator from the interrupted run is gone, but its
    /// input is sitting in the sink (specification §4.1 `deserialize`).
    fn replay_hmac(&self, shard_size: u64) -> DownloadResult<()> {
        let mut written: Vec<&Pointer> = self
            .state
            .pointers
            .iter()
            .filter(|p| p.status == PointerStatus::Written)
            .collect();
        written.sort_by_key(|p| p.index);

        let mut guard = self.hmac.lock().expect("hmac mutex poisoned");
        let Some(acc) = guard.as_mut() else {
            return Ok(());
        };
        for pointer in written {
            let bytes = self.sink.read_at(pointer.offset(shard_size), pointer.size)?;
            acc.update(&bytes);
        }
        Ok(())
    }

    fn spawn(mut self) -> DownloadHandle {
        let events_tx = self.events_tx.clone();
        let cancel_token = self.cancel_root.clone();
        self.dispatch();
        let join = tokio::spawn(async move { self.run().await });
        DownloadHandle {
            events_tx,
            cancel_token,
            join,
        }
    }

    async fn run(mut self) {
        while let Some(event) = self.events_rx.recv().await {
            self.apply_event(event);
            if self.state.finished {
                break;
            }
        }
    }

    fn apply_event(&mut self, event: WorkEvent) {
        match event {
            WorkEvent::TokenReceived(result) => self.on_token_received(result),
            WorkEvent::PointersReceived { result } => self.on_pointers_received(result),
            WorkEvent::ReplacementReceived { index, result } => {
                self.on_replacement_received(index, result);
            }
            WorkEvent::FileInfoReceived(result) => self.on_file_info_received(result),
            WorkEvent::ShardFetched { index, result } => self.on_shard_fetched(index, result),
            WorkEvent::ShardProgress {
                index,
                cumulative_bytes,
            } => {
                if self.state.canceled {
                    return;
                }
                if let Some(p) = self.state.pointer_by_index_mut(index) {
                    p.downloaded_size = cumulative_bytes;
                }
                self.maybe_emit_progress();
                return;
            }
            WorkEvent::ShardWritten { index, result } => self.on_shard_written(index, result),
            WorkEvent::ReportSent { index, result } => self.on_report_sent(index, result),
            WorkEvent::Cancel => self.on_cancel(),
        }
        self.dispatch();
    }

    // ---- event handlers -------------------------------------------------

    fn on_token_received(&mut self, result: DownloadResult<String>) {
        self.state.requesting_token = false;
        self.state.pending_work_count -= 1;
        match result {
            Ok(token) => {
                self.state.token = Some(token);
                self.state.transient.token_fail = 0;
            }
            Err(err) => self.fail_or_retry_transient(err, |t| &mut t.token_fail, DownloadError::bridge_token),
        }
    }

    fn on_pointers_received(&mut self, result: DownloadResult<Vec<PointerDescriptor>>) {
        self.state.requesting_pointers = false;
        self.state.pending_work_count -= 1;
        match result {
            Ok(descriptors) => {
                self.state.transient.pointer_fail = 0;
                if descriptors.is_empty() {
                    self.state.pointers_completed = true;
                    return;
                }
                for d in descriptors {
                    if self.state.shard_size.is_none() {
                        self.state.shard_size = Some(d.size);
                    }
                    self.state.pointers.push(Pointer::new(
                        d.index,
                        d.size,
                        d.hash,
                        d.farmer_node_id,
                        d.farmer_host,
                        d.farmer_port,
                        d.token,
                    ));
                }
            }
            Err(err) => self.fail_or_retry_transient(err, |t| &mut t.pointer_fail, DownloadError::bridge_pointer),
        }
    }

    fn on_replacement_received(&mut self, index: u32, result: DownloadResult<PointerDescriptor>) {
        self.state.requesting_pointers = false;
        self.state.pending_work_count -= 1;
        match result {
            Ok(d) => {
                self.state.transient.pointer_fail = 0;
                let Some(pointer) = self.state.pointer_by_index_mut(index) else {
                    return;
                };
                if let Err(replace_count) =
                    pointer.apply_replacement(d.size, d.hash, d.farmer_node_id, d.farmer_host, d.farmer_port, d.token)
                {
                    self.state.error = Some(DownloadError::FarmerExhausted {
                        index,
                        attempts: replace_count + 1,
                    });
                }
            }
            Err(err) => {
                if let Some(pointer) = self.state.pointer_by_index_mut(index) {
                    pointer.status = PointerStatus::ErrorReported;
                }
                self.fail_or_retry_transient(err, |t| &mut t.pointer_fail, DownloadError::bridge_repointer);
            }
        }
    }

    fn on_file_info_received(&mut self, result: DownloadResult<shard_core::FileInfo>) {
        self.state.requesting_info = false;
        self.state.pending_work_count -= 1;
        match result {
            Ok(info) => {
                self.state.info = Some(info);
                self.state.transient.info_fail = 0;
            }
            Err(err) => self.fail_or_retry_transient(err, |t| &mut t.info_fail, DownloadError::bridge_file_info),
        }
    }

    fn on_shard_fetched(&mut self, index: u32, result: DownloadResult<Vec<u8>>) {
        self.state.resolving_shards = self.state.resolving_shards.saturating_sub(1);
        self.state.pending_work_count -= 1;
        self.fetch_cancels.remove(&index);
        let now = now_ms();
        let Some(pointer) = self.state.pointer_by_index_mut(index) else {
            return;
        };
        match result {
            Ok(body) => {
                if let Some(report) = &mut pointer.report {
                    report.finish(now, ReportResultCode::Success, "download-ok");
                }
                pointer.buffer = Some(body);
                pointer.status = PointerStatus::Downloaded;
            }
            Err(err) => {
                let message = if matches!(err, DownloadError::FarmerIntegrity { .. }) {
                    "integrity-failed"
                } else {
                    "download-error"
                };
                if let Some(report) = &mut pointer.report {
                    report.finish(now, ReportResultCode::Failure, message);
                }
                pointer.status = PointerStatus::Error;
                debug!(target: "shard_download::engine", index, %err, "shard fetch failed");
            }
        }
    }

    fn on_shard_written(&mut self, index: u32, result: DownloadResult<()>) {
        self.state.writing = false;
        self.state.pending_work_count -= 1;
        match result {
            Ok(()) => {
                if let Some(pointer) = self.state.pointer_by_index_mut(index) {
                    pointer.status = PointerStatus::Written;
                    pointer.buffer = None;
                }
                self.state.completed_shards += 1;
                self.checkpoint();
            }
            Err(err) => self.state.error = Some(err),
        }
    }

    fn on_report_sent(&mut self, index: u32, result: DownloadResult<()>) {
        self.state.pending_work_count -= 1;
        let Some(pointer) = self.state.pointer_by_index_mut(index) else {
            return;
        };
        let Some(report) = &mut pointer.report else {
            return;
        };
        match result {
            Ok(()) => report.send_status = SendStatus::Sent,
            Err(_) => report.send_status = SendStatus::Unsent,
        }
        if report.is_done() && pointer.status == PointerStatus::Error {
            pointer.status = PointerStatus::ErrorReported;
        }
    }

    fn on_cancel(&mut self) {
        if self.state.canceled {
            return;
        }
        self.state.canceled = true;
        self.state.error = Some(DownloadError::TransferCanceled);
        self.cancel_root.cancel();
        for pointer in &mut self.state.pointers {
            if pointer.status == PointerStatus::Downloaded {
                pointer.buffer = None;
            }
        }
    }

    /// Promote a transient bridge failure to fatal once its per-kind
    /// counter reaches the configured budget; otherwise leave the in-flight
    /// flag clear so the next `dispatch()` retries (specification §4.1
    /// "Error policy").
    fn fail_or_retry_transient(
        &mut self,
        err: DownloadError,
        counter: impl FnOnce(&mut shard_core::state::TransientCounters) -> &mut u32,
        promote: fn(String) -> DownloadError,
    ) {
        if !err.is_recoverable() {
            self.state.error = Some(err);
            return;
        }
        let slot = counter(&mut self.state.transient);
        *slot += 1;
        if *slot >= self.config.max_transient_tries {
            self.state.error = Some(promote(err.to_string()));
        }
    }

    // ---- the transition function (specification §4.1) -------------------

    /// Run steps 1–8 once. Called after `start()` and after every event.
    fn dispatch(&mut self) {
        if self.finalize_if_done() {
            return;
        }
        self.dispatch_write();
        if self.finalize_if_complete() {
            return;
        }
        if self.state.canceled {
            return;
        }
        self.dispatch_token();
        self.dispatch_pointers();
        self.dispatch_info();
        self.dispatch_shards();
        self.dispatch_reports();
    }

    /// Step 1: a terminal error with no outstanding work ends the download.
    fn finalize_if_done(&mut self) -> bool {
        if self.state.finished {
            return true;
        }
        let Some(err) = self.state.error.clone() else {
            return false;
        };
        if self.state.pending_work_count != 0 {
            return false;
        }
        self.state.finished = true;
        let outcome = if err.is_canceled() {
            DownloadOutcome::Canceled
        } else {
            DownloadOutcome::Failed(err)
        };
        info!(target: "shard_download::engine", bucket = %self.state.bucket_id, file = %self.state.file_id, status = outcome.status_code(), "download finished");
        self.emitter.on_finished(outcome);
        true
    }

    /// Step 2: write the lowest-index `Downloaded` pointer, enforcing
    /// strictly ascending write order.
    fn dispatch_write(&mut self) {
        if self.state.writing || self.state.canceled {
            return;
        }
        let shard_size = self.state.shard_size.unwrap_or(0);
        let Some(pointer) = self.state.first_unwritten_pointer_mut() else {
            return;
        };
        if pointer.status != PointerStatus::Downloaded {
            return;
        }
        let index = pointer.index;
        let offset = pointer.offset(shard_size);
        let buffer = pointer.buffer.take().expect("downloaded pointer owns its buffer");
        pointer.status = PointerStatus::BeingWritten;
        self.state.writing = true;
        self.state.pending_work_count += 1;

        let sink = Arc::clone(&self.sink);
        let hmac = Arc::clone(&self.hmac);
        let tx = self.events_tx.clone();
        tokio::task::spawn_blocking(move || {
            if let Some(acc) = hmac.lock().expect("hmac mutex poisoned").as_mut() {
                acc.update(&buffer);
            }
            let result = sink.write_at(offset, &buffer);
            let _ = tx.send(WorkEvent::ShardWritten { index, result });
        });
    }

    /// Step 3: once every pointer is written and no more pages remain,
    /// finalize the HMAC and compare against the bridge-reported value.
    fn finalize_if_complete(&mut self) -> bool {
        if self.state.finished || self.state.error.is_some() {
            return false;
        }
        if !self.state.all_written() || self.state.pending_work_count != 0 {
            return false;
        }
        let accumulated = self
            .hmac
            .lock()
            .expect("hmac mutex poisoned")
            .take()
            .map(HmacAccumulator::finalize_hex);
        let hmac_hex = accumulated.unwrap_or_default();

        if let Some(info) = &self.state.info {
            if let Some(expected) = &info.hmac {
                if expected.value.to_lowercase() != hmac_hex {
                    self.state.error = Some(DownloadError::FileDecryption {
                        expected: expected.value.clone(),
                        actual: hmac_hex.clone(),
                    });
                    return self.finalize_if_done();
                }
            } else {
                warn!(target: "shard_download::engine", "file info has no hmac; accepting unverified");
            }
        }

        self.state.finished = true;
        let summary = shard_core::DownloadSummary {
            bucket_id: self.state.bucket_id.clone(),
            file_id: self.state.file_id.clone(),
            total_bytes: self.state.total_bytes(),
            shard_count: self.state.total_pointers(),
            hmac_hex,
        };
        info!(target: "shard_download::engine", bucket = %self.state.bucket_id, file = %self.state.file_id, "download complete");
        self.emitter.on_finished(DownloadOutcome::Completed(summary));
        true
    }

    /// Step 4: at most one token request in flight.
    fn dispatch_token(&mut self) {
        if self.state.token.is_some() || self.state.requesting_token {
            return;
        }
        self.state.requesting_token = true;
        self.state.pending_work_count += 1;
        let bridge = Arc::clone(&self.bridge);
        let bucket_id = self.state.bucket_id.clone();
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let result = bridge.post_token(&bucket_id, TokenOperation::Pull).await;
            let _ = tx.send(WorkEvent::TokenReceived(result));
        });
    }

    /// Step 5: pointer replacement takes priority over paging fresh
    /// pointers (specification §4.3); at most one such request in flight.
    fn dispatch_pointers(&mut self) {
        let Some(token) = self.state.token.clone() else {
            return;
        };
        match replace::next_pointer_request(&self.state) {
            Some(PointerRequestAction::Replace { index }) => self.dispatch_replacement(index, token),
            Some(PointerRequestAction::Page { skip, limit }) => self.dispatch_pointer_page(skip, limit, token),
            None => {}
        }
    }

    fn dispatch_pointer_page(&mut self, skip: u32, limit: u32, token: String) {
        self.state.requesting_pointers = true;
        self.state.pending_work_count += 1;
        let bridge = Arc::clone(&self.bridge);
        let bucket_id = self.state.bucket_id.clone();
        let file_id = self.state.file_id.clone();
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let result = bridge
                .get_pointers(&bucket_id, &file_id, skip, limit, &token)
                .await
                .map(|page| page.pointers);
            let _ = tx.send(WorkEvent::PointersReceived { result });
        });
    }

    fn dispatch_replacement(&mut self, index: u32, token: String) {
        let Some(pointer) = self.state.pointer_by_index_mut(index) else {
            return;
        };
        if !self.state.excluded_farmer_ids.contains(&pointer.farmer_id) {
            self.state.excluded_farmer_ids.push(pointer.farmer_id.clone());
        }
        self.state.pointer_by_index_mut(index).unwrap().status = PointerStatus::BeingReplaced;
        self.state.requesting_pointers = true;
        self.state.pending_work_count += 1;

        let bridge = Arc::clone(&self.bridge);
        let bucket_id = self.state.bucket_id.clone();
        let file_id = self.state.file_id.clone();
        let exclude_csv = self.state.excluded_farmers_csv();
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let request = ReplacementRequest {
                index,
                exclude_farmer_ids_csv: &exclude_csv,
            };
            let result = bridge
                .get_replacement_pointer(&bucket_id, &file_id, request, &token)
                .await;
            let _ = tx.send(WorkEvent::ReplacementReceived { index, result });
        });
    }

    /// Step 6: at most one file-info request in flight.
    fn dispatch_info(&mut self) {
        if self.state.info.is_some() || self.state.requesting_info {
            return;
        }
        self.state.requesting_info = true;
        self.state.pending_work_count += 1;
        let bridge = Arc::clone(&self.bridge);
        let bucket_id = self.state.bucket_id.clone();
        let file_id = self.state.file_id.clone();
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let result = bridge.get_file_info(&bucket_id, &file_id).await;
            let _ = tx.send(WorkEvent::FileInfoReceived(result));
        });
    }

    /// Step 7: dispatch farmer fetches for every `Created` pointer up to
    /// the concurrency cap.
    fn dispatch_shards(&mut self) {
        if self.state.canceled {
            return;
        }
        let shard_size = self.state.shard_size.unwrap_or(0);
        let decrypt = self.state.decrypt.clone();
        let reporter_id = self.config.client_id.clone();

        let candidates: Vec<u32> = self
            .state
            .pointers
            .iter()
            .filter(|p| p.status == PointerStatus::Created)
            .map(|p| p.index)
            .collect();

        for index in candidates {
            if self.state.resolving_shards as usize >= self.config.shard_concurrency {
                break;
            }
            let Some(pointer) = self.state.pointer_by_index_mut(index) else {
                continue;
            };
            pointer.status = PointerStatus::BeingDownloaded;
            pointer.downloaded_size = 0;
            pointer.report = Some(ExchangeReport::started(
                pointer.hash.clone(),
                reporter_id.clone(),
                pointer.farmer_id.clone(),
                now_ms(),
            ));
            self.state.resolving_shards += 1;
            self.state.pending_work_count += 1;

            let host = pointer.farmer_host.clone();
            let port = pointer.farmer_port;
            let hash = pointer.hash.clone();
            let token = pointer.token.clone();
            let size = pointer.size;

            let farmer = Arc::clone(&self.farmer);
            let tx = self.events_tx.clone();
            let child_cancel = self.cancel_root.child_token();
            self.fetch_cancels.insert(index, child_cancel.clone());
            let decrypt = decrypt.clone();

            tokio::spawn(async move {
                let relay = ProgressRelay {
                    index,
                    tx: tx.clone(),
                };
                let outcome = farmer
                    .fetch_shard(&host, port, &hash, &token, size, &relay, &child_cancel)
                    .await;
                let result = outcome.map(|fetched| {
                    let mut body = fetched.body;
                    if let Some(material) = decrypt {
                        if let Ok(ctr) = ctr_for_shard(material.initial_ctr, index, shard_size) {
                            decrypt_shard(&material.key, &ctr, &mut body);
                        }
                    }
                    body
                });
                let _ = tx.send(WorkEvent::ShardFetched { index, result });
            });
        }
    }

    /// Step 8: dispatch any exchange report whose fetch attempt has
    /// finished and has not yet been sent (or exhausted its retry budget).
    fn dispatch_reports(&mut self) {
        let reportable: Vec<u32> = self
            .state
            .pointers
            .iter()
            .filter(|p| {
                p.report.as_ref().is_some_and(|r| {
                    r.is_ready_to_send() && r.send_status == SendStatus::Unsent && !r.is_done()
                })
            })
            .map(|p| p.index)
            .collect();

        for index in reportable {
            let Some(pointer) = self.state.pointer_by_index_mut(index) else {
                continue;
            };
            let Some(report) = &mut pointer.report else {
                continue;
            };
            report.send_status = SendStatus::InFlight;
            report.send_count += 1;
            let report_clone = report.clone();
            self.state.pending_work_count += 1;

            let bridge = Arc::clone(&self.bridge);
            let tx = self.events_tx.clone();
            tokio::spawn(async move {
                let result = bridge.post_exchange_report(&report_clone).await;
                let _ = tx.send(WorkEvent::ReportSent { index, result });
            });
        }
    }

    fn checkpoint(&self) {
        if let Err(e) = snapshot_io::write_snapshot(self.sink.path(), &self.state) {
            warn!(target: "shard_download::engine", %e, "failed to write resume snapshot");
        }
    }

    fn maybe_emit_progress(&mut self) {
        let interval = self.config.progress_interval;
        let now = Instant::now();
        if let Some(last) = self.last_progress_at {
            if now.duration_since(last) < interval {
                return;
            }
        }
        self.last_progress_at = Some(now);
        let total_bytes = self.state.total_bytes();
        let downloaded_bytes = self.state.downloaded_bytes();
        let fraction = if total_bytes == 0 {
            0.0
        } else {
            downloaded_bytes as f64 / total_bytes as f64
        };
        self.emitter.on_progress(DownloadProgress {
            fraction,
            downloaded_bytes,
            total_bytes,
        });
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use shard_core::ports::{
        BridgeClientPort, FarmerClientPort, FnEventEmitter, PointerPage, ShardFetchOutcome,
    };

    use super::*;

    /// Never invoked: these tests drive `apply_event` directly rather than
    /// through `dispatch`, so no bridge or farmer call is ever spawned.
    struct UnusedBridge;

    #[async_trait]
    impl BridgeClientPort for UnusedBridge {
        async fn post_token(&self, _bucket_id: &BucketId, _operation: TokenOperation) -> DownloadResult<String> {
            unreachable!("not exercised by this test")
        }

        async fn get_pointers(
            &self,
            _bucket_id: &BucketId,
            _file_id: &FileId,
            _skip: u32,
            _limit: u32,
            _token: &str,
        ) -> DownloadResult<PointerPage> {
            unreachable!("not exercised by this test")
        }

        async fn get_replacement_pointer(
            &self,
            _bucket_id: &BucketId,
            _file_id: &FileId,
            _request: ReplacementRequest<'_>,
            _token: &str,
        ) -> DownloadResult<PointerDescriptor> {
            unreachable!("not exercised by this test")
        }

        async fn get_file_info(&self, _bucket_id: &BucketId, _file_id: &FileId) -> DownloadResult<shard_core::FileInfo> {
            unreachable!("not exercised by this test")
        }

        async fn post_exchange_report(&self, _report: &ExchangeReport) -> DownloadResult<()> {
            unreachable!("not exercised by this test")
        }
    }

    struct UnusedFarmer;

    #[async_trait]
    impl FarmerClientPort for UnusedFarmer {
        async fn fetch_shard(
            &self,
            _host: &str,
            _port: u16,
            _hash: &str,
            _token: &str,
            _expected_size: u64,
            _progress: &dyn ShardProgressSink,
            _cancel: &CancellationToken,
        ) -> DownloadResult<ShardFetchOutcome> {
            unreachable!("not exercised by this test")
        }
    }

    fn test_engine(on_progress_count: Arc<AtomicU32>) -> (Engine, tempfile::TempDir) {
        let emitter = FnEventEmitter::new(
            move |_p| {
                on_progress_count.fetch_add(1, Ordering::SeqCst);
            },
            |_o| {},
        );
        let dir = tempfile::tempdir().expect("tempdir");
        let sink = crate::sink::FileSink::open(dir.path().join("out.bin")).expect("open sink");
        let deps = EngineDeps {
            config: EngineConfig::new("https://bridge.test", "user@test", "deadbeef", "test-client"),
            bridge: Arc::new(UnusedBridge),
            farmer: Arc::new(UnusedFarmer),
            sink: Arc::new(sink),
            emitter: Arc::new(emitter),
        };
        let bucket_id = BucketId::new("368be0816766b28fd5f43af5").unwrap();
        let file_id = FileId::new("998960317b6725a3f8080c2b").unwrap();
        let state = DownloadState::new(bucket_id, file_id, None);
        (Engine::new(deps, state), dir)
    }

    #[test]
    fn shard_progress_after_cancel_does_not_reach_the_emitter() {
        let progress_count = Arc::new(AtomicU32::new(0));
        let (mut engine, _dir) = test_engine(progress_count.clone());

        engine.apply_event(WorkEvent::Cancel);
        assert!(engine.state.canceled);

        engine.apply_event(WorkEvent::ShardProgress {
            index: 0,
            cumulative_bytes: 16,
        });

        assert_eq!(
            progress_count.load(Ordering::SeqCst),
            0,
            "a progress tick enqueued after cancel must never reach the emitter"
        );
    }

    #[test]
    fn shard_progress_before_cancel_does_reach_the_emitter() {
        let progress_count = Arc::new(AtomicU32::new(0));
        let (mut engine, _dir) = test_engine(progress_count.clone());

        engine.apply_event(WorkEvent::ShardProgress {
            index: 0,
            cumulative_bytes: 16,
        });

        assert_eq!(progress_count.load(Ordering::SeqCst), 1);
    }
}
