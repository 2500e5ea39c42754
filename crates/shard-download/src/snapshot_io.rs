//! Reads and writes the JSON resume sidecar next to a download's sink
//! (specification §4.8, §6). `shard_core::snapshot` owns the document
//! shape; this module owns the filesystem access the pure crate can't have.

use std::path::{Path, PathBuf};

use shard_core::snapshot::SnapshotDocument;
use shard_core::{DownloadError, DownloadResult, DownloadState};

/// The sidecar path for a given sink path: `{sink_path}.json`.
#[must_use]
pub fn snapshot_path_for(sink_path: &Path) -> PathBuf {
    let mut name = sink_path.as_os_str().to_owned();
    name.push(".json");
    PathBuf::from(name)
}

/// Capture and persist `state` alongside `sink_path` (specification §4.1
/// `serialize`).
pub fn write_snapshot(sink_path: &Path, state: &DownloadState) -> DownloadResult<()> {
    let doc = SnapshotDocument::capture(state);
    let path = snapshot_path_for(sink_path);
    let json = serde_json::to_vec_pretty(&doc)
        .map_err(|e| DownloadError::memory(format!("snapshot serialize: {e}")))?;
    std::fs::write(&path, json)
        .map_err(|e| DownloadError::file_write(format!("write snapshot {}: {e}", path.display())))
}

/// Read the resume document alongside `sink_path`, if present
/// (specification §4.1 `deserialize`).
pub fn read_snapshot(sink_path: &Path) -> DownloadResult<SnapshotDocument> {
    let path = snapshot_path_for(sink_path);
    let bytes = std::fs::read(&path)
        .map_err(|e| DownloadError::file_write(format!("read snapshot {}: {e}", path.display())))?;
    serde_json::from_slice(&bytes).map_err(|e| DownloadError::memory(format!("snapshot parse: {e}")))
}

/// True if a resume sidecar exists for `sink_path`. The CLI front end uses
/// this to decide whether to prompt for resume (specification §6) — the
/// core never prompts.
#[must_use]
pub fn snapshot_exists(sink_path: &Path) -> bool {
    snapshot_path_for(sink_path).is_file()
}
