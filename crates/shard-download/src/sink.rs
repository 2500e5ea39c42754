//! The download's output sink: a positioned-write target plus the path its
//! resume snapshot lives alongside (specification §3 "output sink handle",
//! §4.5, §4.8).

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use shard_core::{DownloadError, DownloadResult};

/// Where the writer positions its pwrites. Exclusively owned by one
/// [`crate::engine::Engine`] per download; only its writer task ever calls
/// [`Self::write_at`] (specification §5).
pub trait ShardSink: Send + Sync {
    /// Write `data` at `offset`, growing the file as needed. Blocking —
    /// callers invoke this from `spawn_blocking`.
    fn write_at(&self, offset: u64, data: &[u8]) -> DownloadResult<()>;

    /// Read back `len` bytes at `offset`. Used only on resume, to replay
    /// already-written shards' plaintext through a fresh HMAC accumulator
    /// (specification §4.1 `deserialize`, §4.8) — the in-memory accumulator
    /// from the interrupted run is gone, but its input is sitting in the
    /// sink.
    fn read_at(&self, offset: u64, len: u64) -> DownloadResult<Vec<u8>>;

    /// The sink's path, used to derive the `.json` resume sidecar
    /// (specification §4.8, §6).
    fn path(&self) -> &Path;
}

/// A plain-file sink, opened read-write so a resumed download can pwrite
/// into the middle of a partially-written file without truncating it
/// (specification §4.8: "the sink is re-opened in read-write mode and the
/// file pointer is ignored").
pub struct FileSink {
    file: File,
    path: PathBuf,
}

impl FileSink {
    /// Open (creating if absent) the file at `path` for positioned writes.
    pub fn open(path: impl Into<PathBuf>) -> DownloadResult<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .map_err(|e| DownloadError::file_write(format!("open sink {}: {e}", path.display())))?;
        Ok(Self { file, path })
    }
}

impl ShardSink for FileSink {
    fn write_at(&self, offset: u64, data: &[u8]) -> DownloadResult<()> {
        self.file
            .write_all_at(data, offset)
            .map_err(|e| DownloadError::file_write(format!("pwrite at offset {offset}: {e}")))
    }

    fn read_at(&self, offset: u64, len: u64) -> DownloadResult<Vec<u8>> {
        let mut buf = vec![0u8; len as usize];
        self.file
            .read_exact_at(&mut buf, offset)
            .map_err(|e| DownloadError::file_write(format!("pread at offset {offset}: {e}")))?;
        Ok(buf)
    }

    fn path(&self) -> &Path {
        &self.path
    }
}
