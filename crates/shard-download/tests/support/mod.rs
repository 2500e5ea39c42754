//! Hand-rolled port fakes shared by the scenario tests. Each fake implements
//! exactly one `shard_core::ports` trait with behavior scripted by the test
//! that builds it — there is no shared "one true fake" configuration knob.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use shard_core::file_info::FileInfo;
use shard_core::ids::{BucketId, FileId};
use shard_core::ports::{
    BridgeClientPort, FarmerClientPort, PointerDescriptor, PointerPage, ReplacementRequest,
    ShardFetchOutcome, ShardProgressSink, TokenOperation,
};
use shard_core::report::ExchangeReport;
use shard_core::{DownloadError, DownloadResult};

/// A bridge fake that serves one fixed page of pointers, an empty page
/// after that, a fixed [`FileInfo`], and manufactures a fresh replacement
/// descriptor on every `get_replacement_pointer` call (the replacement cap
/// itself lives in `Pointer::apply_replacement`, not the bridge, so the
/// fake never needs to refuse one).
pub struct FakeBridge {
    first_page: Mutex<Option<Vec<PointerDescriptor>>>,
    info: FileInfo,
    reports: Mutex<Vec<ExchangeReport>>,
    replacement_calls: AtomicU32,
}

impl FakeBridge {
    pub fn new(pointers: Vec<PointerDescriptor>, info: FileInfo) -> Self {
        Self {
            first_page: Mutex::new(Some(pointers)),
            info,
            reports: Mutex::new(Vec::new()),
            replacement_calls: AtomicU32::new(0),
        }
    }

    pub fn reports(&self) -> Vec<ExchangeReport> {
        self.reports.lock().expect("reports mutex poisoned").clone()
    }
}

#[async_trait]
impl BridgeClientPort for FakeBridge {
    async fn post_token(&self, _bucket_id: &BucketId, _operation: TokenOperation) -> DownloadResult<String> {
        Ok("test-token".to_string())
    }

    async fn get_pointers(
        &self,
        _bucket_id: &BucketId,
        _file_id: &FileId,
        _skip: u32,
        _limit: u32,
        _token: &str,
    ) -> DownloadResult<PointerPage> {
        let page = self
            .first_page
            .lock()
            .expect("first_page mutex poisoned")
            .take()
            .unwrap_or_default();
        Ok(PointerPage { pointers: page })
    }

    async fn get_replacement_pointer(
        &self,
        _bucket_id: &BucketId,
        _file_id: &FileId,
        request: ReplacementRequest<'_>,
        _token: &str,
    ) -> DownloadResult<PointerDescriptor> {
        let attempt = self.replacement_calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(PointerDescriptor {
            index: request.index,
            size: 0, // overwritten by the caller's own size bookkeeping in these tests
            hash: format!("replacement-hash-{}-{attempt}", request.index),
            token: format!("shard-{}-attempt-{attempt}", request.index),
            farmer_host: "127.0.0.1".to_string(),
            farmer_port: 9000 + attempt as u16,
            farmer_node_id: format!("farmer-{}-{attempt}", request.index),
        })
    }

    async fn get_file_info(&self, _bucket_id: &BucketId, _file_id: &FileId) -> DownloadResult<FileInfo> {
        Ok(self.info.clone())
    }

    async fn post_exchange_report(&self, report: &ExchangeReport) -> DownloadResult<()> {
        self.reports.lock().expect("reports mutex poisoned").push(report.clone());
        Ok(())
    }
}

/// A farmer fake keyed by the shard index encoded into each pointer's
/// token (`shard-{index}-attempt-{n}`, matching `FakeBridge`'s convention).
/// `fail_first_n[index]` attempts return a scripted error before the
/// `index`'s body is served; omitted indices never fail.
pub struct FakeFarmer {
    bodies: HashMap<u32, Vec<u8>>,
    fail_first_n: HashMap<u32, u32>,
    attempts: Mutex<HashMap<u32, u32>>,
}

impl FakeFarmer {
    pub fn new(bodies: HashMap<u32, Vec<u8>>, fail_first_n: HashMap<u32, u32>) -> Self {
        Self {
            bodies,
            fail_first_n,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    fn index_from_token(token: &str) -> u32 {
        token
            .split('-')
            .nth(1)
            .and_then(|s| s.parse().ok())
            .expect("test tokens are always `shard-{index}-attempt-{n}`")
    }

    pub fn attempts_for(&self, index: u32) -> u32 {
        *self.attempts.lock().expect("attempts mutex poisoned").get(&index).unwrap_or(&0)
    }
}

#[async_trait]
impl FarmerClientPort for FakeFarmer {
    async fn fetch_shard(
        &self,
        _host: &str,
        _port: u16,
        _hash: &str,
        token: &str,
        _expected_size: u64,
        _progress: &dyn ShardProgressSink,
        _cancel: &CancellationToken,
    ) -> DownloadResult<ShardFetchOutcome> {
        let index = Self::index_from_token(token);
        let attempt = {
            let mut attempts = self.attempts.lock().expect("attempts mutex poisoned");
            let slot = attempts.entry(index).or_insert(0);
            *slot += 1;
            *slot
        };
        let fail_budget = *self.fail_first_n.get(&index).unwrap_or(&0);
        if attempt <= fail_budget {
            return Err(DownloadError::farmer_integrity(format!(
                "scripted failure for index {index}, attempt {attempt}"
            )));
        }
        let body = self
            .bodies
            .get(&index)
            .unwrap_or_else(|| panic!("no scripted body for index {index}"))
            .clone();
        Ok(ShardFetchOutcome { body })
    }
}

/// A farmer fake whose fetches for every index but `fast_index` block until
/// canceled (or a short delay elapses), used to make mid-flight cancellation
/// deterministic in a test without a real network.
pub struct DelayedFarmer {
    fast_index: u32,
    bodies: HashMap<u32, Vec<u8>>,
}

impl DelayedFarmer {
    pub fn new(fast_index: u32, bodies: HashMap<u32, Vec<u8>>) -> Self {
        Self { fast_index, bodies }
    }
}

#[async_trait]
impl FarmerClientPort for DelayedFarmer {
    async fn fetch_shard(
        &self,
        _host: &str,
        _port: u16,
        _hash: &str,
        token: &str,
        _expected_size: u64,
        _progress: &dyn ShardProgressSink,
        cancel: &CancellationToken,
    ) -> DownloadResult<ShardFetchOutcome> {
        let index = FakeFarmer::index_from_token(token);
        if index != self.fast_index {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(DownloadError::TransferCanceled),
                () = tokio::time::sleep(std::time::Duration::from_millis(200)) => {}
            }
        }
        let body = self
            .bodies
            .get(&index)
            .unwrap_or_else(|| panic!("no scripted body for index {index}"))
            .clone();
        Ok(ShardFetchOutcome { body })
    }
}

/// Captures the single terminal [`shard_core::DownloadOutcome`] a download
/// emits, for the test to inspect after `DownloadHandle::join`.
#[derive(Clone, Default)]
pub struct CapturingEmitter {
    outcome: Arc<Mutex<Option<shard_core::DownloadOutcome>>>,
}

impl CapturingEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outcome(&self) -> shard_core::DownloadOutcome {
        self.outcome
            .lock()
            .expect("outcome mutex poisoned")
            .clone()
            .expect("on_finished was never called")
    }
}

impl shard_core::DownloadEventEmitterPort for CapturingEmitter {
    fn on_progress(&self, _progress: shard_core::DownloadProgress) {}

    fn on_finished(&self, outcome: shard_core::DownloadOutcome) {
        *self.outcome.lock().expect("outcome mutex poisoned") = Some(outcome);
    }
}

pub fn descriptor(
    index: u32,
    size: u64,
    hash: impl Into<String>,
    node_id: impl Into<String>,
) -> PointerDescriptor {
    PointerDescriptor {
        index,
        size,
        hash: hash.into(),
        token: format!("shard-{index}-attempt-0"),
        farmer_host: "127.0.0.1".to_string(),
        farmer_port: 8080,
        farmer_node_id: node_id.into(),
    }
}
