//! End-to-end scenario tests for the download engine (specification §8).
//!
//! Each test drives `shard_download::engine::start`/`resume` against the
//! in-memory port fakes in `support`, with tiny (byte-scale, not
//! megabyte-scale) shards so the scenarios run in milliseconds while still
//! exercising the real dispatch loop, writer, and HMAC accumulator.

mod support;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use shard_core::crypto::HmacAccumulator;
use shard_core::file_info::{FileInfo, HmacInfo};
use shard_core::ids::{BucketId, FileId};
use shard_core::pointer::{Pointer, PointerStatus};
use shard_core::{DownloadError, DownloadOutcome, DownloadState, EngineConfig};

use shard_download::sink::ShardSink;
use shard_download::{EngineDeps, FileSink};

use support::{CapturingEmitter, FakeBridge, FakeFarmer, descriptor};

fn bucket() -> BucketId {
    BucketId::new("368be0816766b28fd5f43af5").unwrap()
}

fn file() -> FileId {
    FileId::new("998960317b6725a3f8080c2b").unwrap()
}

fn config() -> EngineConfig {
    EngineConfig::new("https://bridge.test", "user@test", "deadbeef", "test-client")
}

/// Byte `0x61 + index`, repeated `shard_size` times — the plaintext
/// convention from specification §8 scenario 1, scaled down from 16 MiB to
/// a handful of bytes.
fn shard_plaintext(index: u32, shard_size: usize) -> Vec<u8> {
    vec![0x61 + index as u8; shard_size]
}

fn expected_hmac_hex(plaintexts: &[Vec<u8>]) -> String {
    let mut acc = HmacAccumulator::new(&[]);
    for p in plaintexts {
        acc.update(p);
    }
    acc.finalize_hex()
}

#[tokio::test(flavor = "multi_thread")]
async fn happy_path_writes_shards_in_order_and_matches_hmac() {
    const SHARD_SIZE: usize = 16;
    const TOTAL: u32 = 4;

    let plaintexts: Vec<Vec<u8>> = (0..TOTAL).map(|i| shard_plaintext(i, SHARD_SIZE)).collect();
    let descriptors = (0..TOTAL)
        .map(|i| descriptor(i, SHARD_SIZE as u64, format!("hash{i}"), format!("farmer{i}")))
        .collect();
    let info = FileInfo {
        hmac: Some(HmacInfo {
            hmac_type: "sha512".into(),
            value: expected_hmac_hex(&plaintexts),
        }),
    };
    let bridge = Arc::new(FakeBridge::new(descriptors, info));
    let bodies: HashMap<u32, Vec<u8>> = plaintexts.iter().cloned().enumerate().map(|(i, b)| (i as u32, b)).collect();
    let farmer = Arc::new(FakeFarmer::new(bodies, HashMap::new()));

    let dir = tempfile::tempdir().unwrap();
    let sink_path = dir.path().join("out.bin");
    let sink = Arc::new(FileSink::open(&sink_path).unwrap());
    let emitter = CapturingEmitter::new();

    let deps = EngineDeps {
        config: config(),
        bridge: bridge.clone(),
        farmer,
        sink: sink.clone(),
        emitter: Arc::new(emitter.clone()),
    };
    let handle = shard_download::start(deps, bucket(), file());
    handle.join().await;

    match emitter.outcome() {
        DownloadOutcome::Completed(summary) => {
            assert_eq!(summary.shard_count, TOTAL);
            assert_eq!(summary.total_bytes, (TOTAL as u64) * SHARD_SIZE as u64);
        }
        other => panic!("expected Completed, got {other:?}"),
    }

    let written = std::fs::read(&sink_path).unwrap();
    assert_eq!(written.len(), TOTAL as usize * SHARD_SIZE);
    for (i, chunk) in written.chunks(SHARD_SIZE).enumerate() {
        assert_eq!(chunk, shard_plaintext(i as u32, SHARD_SIZE).as_slice(), "offset block {i}");
    }

    let reports = bridge.reports();
    assert_eq!(reports.len(), TOTAL as usize);
    assert!(reports.iter().all(|r| matches!(r.result_code, Some(shard_core::ReportResultCode::Success))));
}

#[tokio::test(flavor = "multi_thread")]
async fn flaky_shard_is_replaced_once_and_still_completes() {
    const SHARD_SIZE: usize = 16;
    const TOTAL: u32 = 4;
    const FLAKY_INDEX: u32 = 1;

    let plaintexts: Vec<Vec<u8>> = (0..TOTAL).map(|i| shard_plaintext(i, SHARD_SIZE)).collect();
    let descriptors = (0..TOTAL)
        .map(|i| descriptor(i, SHARD_SIZE as u64, format!("hash{i}"), format!("farmer{i}")))
        .collect();
    let info = FileInfo {
        hmac: Some(HmacInfo {
            hmac_type: "sha512".into(),
            value: expected_hmac_hex(&plaintexts),
        }),
    };
    let bridge = Arc::new(FakeBridge::new(descriptors, info));
    let bodies: HashMap<u32, Vec<u8>> = plaintexts.iter().cloned().enumerate().map(|(i, b)| (i as u32, b)).collect();
    let mut fail_first_n = HashMap::new();
    fail_first_n.insert(FLAKY_INDEX, 1);
    let farmer = Arc::new(FakeFarmer::new(bodies, fail_first_n));

    let dir = tempfile::tempdir().unwrap();
    let sink_path = dir.path().join("out.bin");
    let sink = Arc::new(FileSink::open(&sink_path).unwrap());
    let emitter = CapturingEmitter::new();

    let deps = EngineDeps {
        config: config(),
        bridge: bridge.clone(),
        farmer,
        sink: sink.clone(),
        emitter: Arc::new(emitter.clone()),
    };
    let handle = shard_download::start(deps, bucket(), file());
    handle.join().await;

    match emitter.outcome() {
        DownloadOutcome::Completed(summary) => assert_eq!(summary.shard_count, TOTAL),
        other => panic!("expected Completed, got {other:?}"),
    }

    let written = std::fs::read(&sink_path).unwrap();
    for (i, chunk) in written.chunks(SHARD_SIZE).enumerate() {
        assert_eq!(chunk, shard_plaintext(i as u32, SHARD_SIZE).as_slice(), "offset block {i}");
    }

    // One failed attempt plus four eventual successes, one report each.
    let reports = bridge.reports();
    assert_eq!(reports.len(), TOTAL as usize + 1);
    let failures = reports
        .iter()
        .filter(|r| matches!(r.result_code, Some(shard_core::ReportResultCode::Failure)))
        .count();
    assert_eq!(failures, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn farmer_exhausted_after_three_replacements_never_writes_the_index() {
    const SHARD_SIZE: usize = 16;
    const TOTAL: u32 = 3;
    const DOOMED_INDEX: u32 = 1;

    let plaintexts: Vec<Vec<u8>> = (0..TOTAL).map(|i| shard_plaintext(i, SHARD_SIZE)).collect();
    let descriptors = (0..TOTAL)
        .map(|i| descriptor(i, SHARD_SIZE as u64, format!("hash{i}"), format!("farmer{i}")))
        .collect();
    let info = FileInfo {
        hmac: Some(HmacInfo {
            hmac_type: "sha512".into(),
            value: expected_hmac_hex(&plaintexts),
        }),
    };
    let bridge = Arc::new(FakeBridge::new(descriptors, info));
    let bodies: HashMap<u32, Vec<u8>> = plaintexts.iter().cloned().enumerate().map(|(i, b)| (i as u32, b)).collect();
    let mut fail_first_n = HashMap::new();
    fail_first_n.insert(DOOMED_INDEX, 100);
    let farmer = Arc::new(FakeFarmer::new(bodies, fail_first_n));

    let dir = tempfile::tempdir().unwrap();
    let sink_path = dir.path().join("out.bin");
    let sink = Arc::new(FileSink::open(&sink_path).unwrap());
    let emitter = CapturingEmitter::new();

    let deps = EngineDeps {
        config: config(),
        bridge,
        farmer,
        sink: sink.clone(),
        emitter: Arc::new(emitter.clone()),
    };
    let handle = shard_download::start(deps, bucket(), file());
    handle.join().await;

    match emitter.outcome() {
        DownloadOutcome::Failed(DownloadError::FarmerExhausted { index, attempts }) => {
            assert_eq!(index, DOOMED_INDEX);
            assert_eq!(attempts, 4);
        }
        other => panic!("expected FarmerExhausted, got {other:?}"),
    }

    // The doomed index's offset (and everything after it, since the writer
    // enforces strict ascending order) was never pwritten.
    let written = std::fs::read(&sink_path).unwrap_or_default();
    assert!(
        written.len() <= (DOOMED_INDEX as usize) * SHARD_SIZE,
        "no bytes should have been written at or past the doomed index's offset"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn hmac_mismatch_fails_after_every_shard_is_written() {
    const SHARD_SIZE: usize = 16;
    const TOTAL: u32 = 3;

    let plaintexts: Vec<Vec<u8>> = (0..TOTAL).map(|i| shard_plaintext(i, SHARD_SIZE)).collect();
    let descriptors = (0..TOTAL)
        .map(|i| descriptor(i, SHARD_SIZE as u64, format!("hash{i}"), format!("farmer{i}")))
        .collect();
    let mut wrong_hmac = expected_hmac_hex(&plaintexts);
    // Flip one hex nibble so it still parses as hex but no longer matches.
    let flipped = if wrong_hmac.starts_with('0') { '1' } else { '0' };
    wrong_hmac.replace_range(0..1, &flipped.to_string());
    let info = FileInfo {
        hmac: Some(HmacInfo {
            hmac_type: "sha512".into(),
            value: wrong_hmac,
        }),
    };
    let bridge = Arc::new(FakeBridge::new(descriptors, info));
    let bodies: HashMap<u32, Vec<u8>> = plaintexts.iter().cloned().enumerate().map(|(i, b)| (i as u32, b)).collect();
    let farmer = Arc::new(FakeFarmer::new(bodies, HashMap::new()));

    let dir = tempfile::tempdir().unwrap();
    let sink_path = dir.path().join("out.bin");
    let sink = Arc::new(FileSink::open(&sink_path).unwrap());
    let emitter = CapturingEmitter::new();

    let deps = EngineDeps {
        config: config(),
        bridge,
        farmer,
        sink: sink.clone(),
        emitter: Arc::new(emitter.clone()),
    };
    let handle = shard_download::start(deps, bucket(), file());
    handle.join().await;

    match emitter.outcome() {
        DownloadOutcome::Failed(DownloadError::FileDecryption { .. }) => {}
        other => panic!("expected FileDecryption, got {other:?}"),
    }

    // Every shard was still written before the final HMAC comparison ran.
    let written = std::fs::read(&sink_path).unwrap();
    assert_eq!(written.len(), TOTAL as usize * SHARD_SIZE);
}

#[tokio::test(flavor = "multi_thread")]
async fn cancel_after_first_write_stops_progress_and_emits_canceled() {
    const SHARD_SIZE: usize = 16;
    const TOTAL: u32 = 4;
    const FAST_INDEX: u32 = 0;

    let plaintexts: Vec<Vec<u8>> = (0..TOTAL).map(|i| shard_plaintext(i, SHARD_SIZE)).collect();
    let descriptors = (0..TOTAL)
        .map(|i| descriptor(i, SHARD_SIZE as u64, format!("hash{i}"), format!("farmer{i}")))
        .collect();
    let info = FileInfo {
        hmac: Some(HmacInfo {
            hmac_type: "sha512".into(),
            value: expected_hmac_hex(&plaintexts),
        }),
    };
    let bridge = Arc::new(FakeBridge::new(descriptors, info));
    let bodies: HashMap<u32, Vec<u8>> = plaintexts.iter().cloned().enumerate().map(|(i, b)| (i as u32, b)).collect();
    let farmer = Arc::new(support::DelayedFarmer::new(FAST_INDEX, bodies));

    let dir = tempfile::tempdir().unwrap();
    let sink_path = dir.path().join("out.bin");
    let sink = Arc::new(FileSink::open(&sink_path).unwrap());
    let emitter = CapturingEmitter::new();

    let deps = EngineDeps {
        config: config(),
        bridge,
        farmer,
        sink: sink.clone(),
        emitter: Arc::new(emitter.clone()),
    };
    let handle = shard_download::start(deps, bucket(), file());

    // Give the fast index time to fetch and write before canceling.
    tokio::time::sleep(Duration::from_millis(60)).await;
    handle.cancel();
    handle.join().await;

    match emitter.outcome() {
        DownloadOutcome::Canceled => {}
        other => panic!("expected Canceled, got {other:?}"),
    }

    let written = std::fs::read(&sink_path).unwrap_or_default();
    assert!(
        written.len() <= SHARD_SIZE,
        "only the fast shard (if any) should have been written before cancellation"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn resume_skips_written_shards_and_refetches_the_rest() {
    const SHARD_SIZE: usize = 8;
    const TOTAL: u32 = 4;
    const ALREADY_WRITTEN: u32 = 2;

    let plaintexts: Vec<Vec<u8>> = (0..TOTAL).map(|i| shard_plaintext(i, SHARD_SIZE)).collect();

    let dir = tempfile::tempdir().unwrap();
    let sink_path = dir.path().join("out.bin");
    {
        let sink = FileSink::open(&sink_path).unwrap();
        for i in 0..ALREADY_WRITTEN {
            sink.write_at(i as u64 * SHARD_SIZE as u64, &plaintexts[i as usize]).unwrap();
        }
    }

    // Build the resume snapshot: the first two pointers already `Written`,
    // the rest `Created` so the engine re-fetches them.
    let mut state = DownloadState::new(bucket(), file(), None);
    state.shard_size = Some(SHARD_SIZE as u64);
    state.pointers_completed = true;
    for i in 0..TOTAL {
        let mut p = Pointer::new(
            i,
            SHARD_SIZE as u64,
            format!("hash{i}"),
            format!("farmer{i}"),
            "127.0.0.1".into(),
            8080,
            format!("shard-{i}-attempt-0"),
        );
        if i < ALREADY_WRITTEN {
            p.status = PointerStatus::Written;
            p.downloaded_size = SHARD_SIZE as u64;
        }
        state.pointers.push(p);
    }
    shard_download::write_snapshot(&sink_path, &state).unwrap();
    assert!(shard_download::snapshot_exists(&sink_path));

    let descriptors = (0..TOTAL)
        .map(|i| descriptor(i, SHARD_SIZE as u64, format!("hash{i}"), format!("farmer{i}")))
        .collect();
    let info = FileInfo {
        hmac: Some(HmacInfo {
            hmac_type: "sha512".into(),
            value: expected_hmac_hex(&plaintexts),
        }),
    };
    let bridge = Arc::new(FakeBridge::new(descriptors, info));
    let bodies: HashMap<u32, Vec<u8>> = plaintexts.iter().cloned().enumerate().map(|(i, b)| (i as u32, b)).collect();
    let farmer = Arc::new(FakeFarmer::new(bodies, HashMap::new()));

    let sink = Arc::new(FileSink::open(&sink_path).unwrap());
    let emitter = CapturingEmitter::new();
    let deps = EngineDeps {
        config: config(),
        bridge,
        farmer,
        sink: sink.clone(),
        emitter: Arc::new(emitter.clone()),
    };

    let handle = shard_download::resume(deps, bucket(), file()).unwrap();
    handle.join().await;

    match emitter.outcome() {
        DownloadOutcome::Completed(summary) => assert_eq!(summary.shard_count, TOTAL),
        other => panic!("expected Completed, got {other:?}"),
    }

    let written = std::fs::read(&sink_path).unwrap();
    assert_eq!(written.len(), TOTAL as usize * SHARD_SIZE);
    for (i, chunk) in written.chunks(SHARD_SIZE).enumerate() {
        assert_eq!(chunk, shard_plaintext(i as u32, SHARD_SIZE).as_slice(), "offset block {i}");
    }
}
