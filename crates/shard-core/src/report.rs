//! Exchange reports: the client's per-attempt account of a farmer
//! interaction, filed back to the bridge for reputation purposes.

use serde::{Deserialize, Serialize};

/// Maximum number of times the dispatcher will retry sending one report
/// before giving up and unlocking replacement anyway (specification §4.7).
pub const MAX_REPORT_TRIES: u32 = 3;

/// The outcome of a farmer interaction, as filed to the bridge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportResultCode {
    /// The shard was fetched (and verified) successfully.
    Success,
    /// The fetch failed for any reason.
    Failure,
}

/// Send state of one exchange report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendStatus {
    /// Not yet sent, and no send attempt currently in flight.
    Unsent,
    /// A POST to `/reports/exchanges` is currently in flight.
    InFlight,
    /// The bridge accepted the report (201).
    Sent,
}

/// A per-attempt record of one farmer interaction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExchangeReport {
    /// Hex content hash of the shard (matches `Pointer::hash`).
    pub data_hash: String,
    /// The reporting client's id (equal to the bridge user's client id).
    pub reporter_id: String,
    /// The farmer node's id.
    pub farmer_id: String,
    /// Attempt start time, milliseconds since the Unix epoch.
    pub start_ms: Option<i64>,
    /// Attempt end time, milliseconds since the Unix epoch.
    pub end_ms: Option<i64>,
    /// Success or failure.
    pub result_code: Option<ReportResultCode>,
    /// `download-ok` / `download-error` / `integrity-failed`.
    pub message: Option<String>,
    /// Current send state.
    pub send_status: SendStatus,
    /// Number of send attempts made so far.
    pub send_count: u32,
}

impl ExchangeReport {
    /// Start a new, unsent report for a farmer fetch about to begin.
    #[must_use]
    pub fn started(data_hash: String, reporter_id: String, farmer_id: String, start_ms: i64) -> Self {
        Self {
            data_hash,
            reporter_id,
            farmer_id,
            start_ms: Some(start_ms),
            end_ms: None,
            result_code: None,
            message: None,
            send_status: SendStatus::Unsent,
            send_count: 0,
        }
    }

    /// Record the outcome of the fetch attempt this report describes.
    pub fn finish(&mut self, end_ms: i64, result_code: ReportResultCode, message: impl Into<String>) {
        self.end_ms = Some(end_ms);
        self.result_code = Some(result_code);
        self.message = Some(message.into());
    }

    /// True once both `start_ms` and `end_ms` are recorded — the precondition
    /// for queuing this report to the dispatcher (specification §4.1 step 8).
    #[must_use]
    pub const fn is_ready_to_send(&self) -> bool {
        self.start_ms.is_some() && self.end_ms.is_some()
    }

    /// True once the dispatcher should stop retrying: either the bridge
    /// accepted the report, or the retry budget is exhausted.
    #[must_use]
    pub fn is_done(&self) -> bool {
        matches!(self.send_status, SendStatus::Sent) || self.send_count >= MAX_REPORT_TRIES
    }
}
