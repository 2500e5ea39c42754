//! The caller-supplied configuration record.
//!
//! The engine never reads environment variables directly (specification
//! §6): every credential, tuning knob, and derived key lives in this record,
//! built by whatever external collaborator owns configuration (CLI flags,
//! env file, GUI settings store — all out of scope here), matching the
//! teacher's `DownloadManagerConfig` precedent.

use std::time::Duration;

/// Default cap on concurrent in-flight shard fetches (specification §3).
pub const DEFAULT_SHARD_CONCURRENCY: usize = 4;

/// Default per-kind transient-bridge-error budget before promotion to fatal
/// (specification §4.1 "Error policy").
pub const DEFAULT_MAX_TRANSIENT_TRIES: u32 = 3;

/// Configuration for one engine instance.
///
/// One `EngineConfig` is shared (read-only) across every download the
/// caller drives through the same bridge account.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Bridge base URL, e.g. `https://api.storj.io`.
    pub bridge_base_url: String,
    /// Bridge account user (email).
    pub bridge_user: String,
    /// SHA-256 hex digest of the bridge account password — the engine never
    /// sees the plaintext password (specification §4.2).
    pub bridge_password_sha256_hex: String,
    /// Client id attached to every exchange report as `reporterId`.
    pub client_id: String,
    /// BIP39 mnemonic used to derive per-file decryption material. `None`
    /// downloads are not decrypted (and the HMAC accumulator runs with an
    /// empty key, per specification §4.6).
    pub mnemonic: Option<String>,
    /// Cap on concurrent in-flight shard fetches.
    pub shard_concurrency: usize,
    /// Transient-bridge-error budget (per kind: token/pointer/info) before
    /// promotion to fatal.
    pub max_transient_tries: u32,
    /// Per-request network timeout, applied to both bridge and farmer
    /// clients.
    pub request_timeout: Duration,
    /// Minimum interval between `on_progress` callbacks.
    pub progress_interval: Duration,
}

impl EngineConfig {
    /// Construct a config with the engine's defaults for concurrency, retry
    /// budget, and timeouts; only the bridge identity is required.
    #[must_use]
    pub fn new(
        bridge_base_url: impl Into<String>,
        bridge_user: impl Into<String>,
        bridge_password_sha256_hex: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            bridge_base_url: bridge_base_url.into(),
            bridge_user: bridge_user.into(),
            bridge_password_sha256_hex: bridge_password_sha256_hex.into(),
            client_id: client_id.into(),
            mnemonic: None,
            shard_concurrency: DEFAULT_SHARD_CONCURRENCY,
            max_transient_tries: DEFAULT_MAX_TRANSIENT_TRIES,
            request_timeout: Duration::from_secs(30),
            progress_interval: Duration::from_millis(100),
        }
    }

    /// Attach a mnemonic, enabling per-file decryption.
    #[must_use]
    pub fn with_mnemonic(mut self, mnemonic: impl Into<String>) -> Self {
        self.mnemonic = Some(mnemonic.into());
        self
    }
}
