//! The download error taxonomy.
//!
//! Mirrors the kinds named in the specification §7 one-for-one. Each variant
//! is serializable (so it can cross an FFI or IPC boundary the way a CLI
//! front end would need) but never wraps a non-serializable type like
//! `std::io::Error` directly — I/O failures are captured as kind + message.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for the download engine.
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum DownloadError {
    /// Allocation or invariant failure inside the engine itself.
    #[error("internal memory error: {message}")]
    Memory {
        /// Detail.
        message: String,
    },

    /// A work item could not be scheduled (semaphore closed, channel dropped).
    #[error("queue scheduling error: {message}")]
    QueueScheduling {
        /// Detail.
        message: String,
    },

    /// Generic bridge request failure (network error, or a non-2xx/4xx/5xx
    /// status the bridge should never send).
    #[error("bridge request error: {message}")]
    BridgeRequest {
        /// Detail.
        message: String,
    },

    /// Bridge responded 400 (malformed/invalid bucket or file id). Fatal —
    /// distinct from [`Self::BridgeRequest`], which covers the transient
    /// transport/`other`-status case and is retried before promotion.
    #[error("bridge invalid request: {message}")]
    BridgeInvalidRequest {
        /// Detail.
        message: String,
    },

    /// Bridge responded 401/403.
    #[error("bridge auth error: {message}")]
    BridgeAuth {
        /// Detail.
        message: String,
    },

    /// Bridge responded 404.
    #[error("bridge not found: {message}")]
    BridgeNotFound {
        /// Detail.
        message: String,
    },

    /// Bridge responded 500 (transient, counted before promotion).
    #[error("bridge internal error: {message}")]
    BridgeInternal {
        /// Detail.
        message: String,
    },

    /// Bridge response body did not parse, or was missing/mistyped a
    /// required field.
    #[error("bridge json error: {message}")]
    BridgeJson {
        /// Detail.
        message: String,
    },

    /// Token request failed after exhausting its transient-error budget.
    #[error("bridge token error: {message}")]
    BridgeToken {
        /// Detail.
        message: String,
    },

    /// Pointer page request failed after exhausting its transient-error
    /// budget.
    #[error("bridge pointer error: {message}")]
    BridgePointer {
        /// Detail.
        message: String,
    },

    /// Replacement pointer request failed after exhausting its
    /// transient-error budget.
    #[error("bridge repointer error: {message}")]
    BridgeRepointer {
        /// Detail.
        message: String,
    },

    /// File info request failed after exhausting its transient-error budget.
    #[error("bridge file info error: {message}")]
    BridgeFileInfo {
        /// Detail.
        message: String,
    },

    /// Farmer responded 401/403.
    #[error("farmer auth error: {message}")]
    FarmerAuth {
        /// Detail.
        message: String,
    },

    /// Farmer request timed out (504, or the HTTP client's own timeout).
    #[error("farmer timeout: {message}")]
    FarmerTimeout {
        /// Detail.
        message: String,
    },

    /// Generic farmer request failure (network error, non-2xx status).
    #[error("farmer request error: {message}")]
    FarmerRequest {
        /// Detail.
        message: String,
    },

    /// Shard body was short or its hash did not match.
    #[error("farmer integrity error: {message}")]
    FarmerIntegrity {
        /// Detail.
        message: String,
    },

    /// A pointer index has been replaced 3 times and still fails.
    #[error("farmer exhausted: pointer index {index} failed after {attempts} attempts")]
    FarmerExhausted {
        /// The pointer index that could not be fetched.
        index: u32,
        /// Number of attempts made (always 4: the original plus 3 replacements).
        attempts: u32,
    },

    /// Positioned write to the sink failed.
    #[error("file write error: {message}")]
    FileWrite {
        /// Detail.
        message: String,
    },

    /// The final HMAC did not match the bridge-reported value.
    #[error("file decryption error: HMAC mismatch (expected {expected}, got {actual})")]
    FileDecryption {
        /// The bridge-reported HMAC hex value.
        expected: String,
        /// The locally accumulated HMAC hex value.
        actual: String,
    },

    /// `cancel()` was called.
    #[error("transfer canceled")]
    TransferCanceled,
}

impl DownloadError {
    /// Construct a [`Self::Memory`] error.
    pub fn memory(message: impl Into<String>) -> Self {
        Self::Memory {
            message: message.into(),
        }
    }

    /// Construct a [`Self::QueueScheduling`] error.
    pub fn queue_scheduling(message: impl Into<String>) -> Self {
        Self::QueueScheduling {
            message: message.into(),
        }
    }

    /// Construct a [`Self::BridgeRequest`] error.
    pub fn bridge_request(message: impl Into<String>) -> Self {
        Self::BridgeRequest {
            message: message.into(),
        }
    }

    /// Construct a [`Self::BridgeInvalidRequest`] error.
    pub fn bridge_invalid_request(message: impl Into<String>) -> Self {
        Self::BridgeInvalidRequest {
            message: message.into(),
        }
    }

    /// Construct a [`Self::BridgeAuth`] error.
    pub fn bridge_auth(message: impl Into<String>) -> Self {
        Self::BridgeAuth {
            message: message.into(),
        }
    }

    /// Construct a [`Self::BridgeNotFound`] error.
    pub fn bridge_not_found(message: impl Into<String>) -> Self {
        Self::BridgeNotFound {
            message: message.into(),
        }
    }

    /// Construct a [`Self::BridgeInternal`] error.
    pub fn bridge_internal(message: impl Into<String>) -> Self {
        Self::BridgeInternal {
            message: message.into(),
        }
    }

    /// Construct a [`Self::BridgeJson`] error.
    pub fn bridge_json(message: impl Into<String>) -> Self {
        Self::BridgeJson {
            message: message.into(),
        }
    }

    /// Construct a [`Self::BridgeToken`] error.
    pub fn bridge_token(message: impl Into<String>) -> Self {
        Self::BridgeToken {
            message: message.into(),
        }
    }

    /// Construct a [`Self::BridgePointer`] error.
    pub fn bridge_pointer(message: impl Into<String>) -> Self {
        Self::BridgePointer {
            message: message.into(),
        }
    }

    /// Construct a [`Self::BridgeRepointer`] error.
    pub fn bridge_repointer(message: impl Into<String>) -> Self {
        Self::BridgeRepointer {
            message: message.into(),
        }
    }

    /// Construct a [`Self::BridgeFileInfo`] error.
    pub fn bridge_file_info(message: impl Into<String>) -> Self {
        Self::BridgeFileInfo {
            message: message.into(),
        }
    }

    /// Construct a [`Self::FarmerAuth`] error.
    pub fn farmer_auth(message: impl Into<String>) -> Self {
        Self::FarmerAuth {
            message: message.into(),
        }
    }

    /// Construct a [`Self::FarmerTimeout`] error.
    pub fn farmer_timeout(message: impl Into<String>) -> Self {
        Self::FarmerTimeout {
            message: message.into(),
        }
    }

    /// Construct a [`Self::FarmerRequest`] error.
    pub fn farmer_request(message: impl Into<String>) -> Self {
        Self::FarmerRequest {
            message: message.into(),
        }
    }

    /// Construct a [`Self::FarmerIntegrity`] error.
    pub fn farmer_integrity(message: impl Into<String>) -> Self {
        Self::FarmerIntegrity {
            message: message.into(),
        }
    }

    /// Construct a [`Self::FileWrite`] error.
    pub fn file_write(message: impl Into<String>) -> Self {
        Self::FileWrite {
            message: message.into(),
        }
    }

    /// Promote a bridge status code to the matching taxonomy member, per
    /// the mapping table in specification §4.2. Returns `None` for success
    /// codes (200/201/204/304).
    #[must_use]
    pub fn from_bridge_status(status: u16, message: impl Into<String>) -> Option<Self> {
        let message = message.into();
        match status {
            200 | 201 | 204 | 304 => None,
            400 => Some(Self::bridge_invalid_request(message)),
            401 | 403 => Some(Self::bridge_auth(message)),
            404 => Some(Self::bridge_not_found(message)),
            500 => Some(Self::bridge_internal(message)),
            _ => Some(Self::bridge_request(message)),
        }
    }

    /// Map a farmer HTTP status code to the matching taxonomy member, per
    /// specification §4.4. Returns `None` for 200.
    #[must_use]
    pub fn from_farmer_status(status: u16, message: impl Into<String>) -> Option<Self> {
        let message = message.into();
        match status {
            200 => None,
            401 | 403 => Some(Self::farmer_auth(message)),
            504 => Some(Self::farmer_timeout(message)),
            _ => Some(Self::farmer_request(message)),
        }
    }

    /// True for errors that are recovered internally (bridge-transient
    /// before promotion, or any farmer error, which always routes through
    /// pointer replacement rather than failing the download directly).
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::BridgeInternal { .. }
                | Self::BridgeRequest { .. }
                | Self::FarmerAuth { .. }
                | Self::FarmerTimeout { .. }
                | Self::FarmerRequest { .. }
                | Self::FarmerIntegrity { .. }
        )
    }

    /// True only for [`Self::TransferCanceled`].
    #[must_use]
    pub const fn is_canceled(&self) -> bool {
        matches!(self, Self::TransferCanceled)
    }

    /// A short, stable machine-readable status code, used as the terminal
    /// status handed to `on_finished` and stored in logs.
    #[must_use]
    pub const fn status_code(&self) -> &'static str {
        match self {
            Self::Memory { .. } => "memory_error",
            Self::QueueScheduling { .. } => "queue_scheduling_error",
            Self::BridgeRequest { .. } => "bridge_request_error",
            Self::BridgeInvalidRequest { .. } => "bridge_invalid_request_error",
            Self::BridgeAuth { .. } => "bridge_auth_error",
            Self::BridgeNotFound { .. } => "bridge_not_found_error",
            Self::BridgeInternal { .. } => "bridge_internal_error",
            Self::BridgeJson { .. } => "bridge_json_error",
            Self::BridgeToken { .. } => "bridge_token_error",
            Self::BridgePointer { .. } => "bridge_pointer_error",
            Self::BridgeRepointer { .. } => "bridge_repointer_error",
            Self::BridgeFileInfo { .. } => "bridge_fileinfo_error",
            Self::FarmerAuth { .. } => "farmer_auth_error",
            Self::FarmerTimeout { .. } => "farmer_timeout_error",
            Self::FarmerRequest { .. } => "farmer_request_error",
            Self::FarmerIntegrity { .. } => "farmer_integrity_error",
            Self::FarmerExhausted { .. } => "farmer_exhausted",
            Self::FileWrite { .. } => "file_write_error",
            Self::FileDecryption { .. } => "file_decryption_error",
            Self::TransferCanceled => "transfer_canceled",
        }
    }
}

/// Convenience result alias used throughout the engine.
pub type DownloadResult<T> = Result<T, DownloadError>;
