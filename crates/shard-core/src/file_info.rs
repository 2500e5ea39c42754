//! File info: the authoritative HMAC used for final integrity comparison.

use serde::{Deserialize, Serialize};

/// The HMAC descriptor nested under `file_info.hmac` on the bridge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HmacInfo {
    /// Must be `"sha512"`; any other value is a bridge-json error.
    #[serde(rename = "type")]
    pub hmac_type: String,
    /// Lowercase hex digest expected of the concatenated plaintext shards.
    pub value: String,
}

/// Bridge metadata for one file, keyed by file id, fetched once per download.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Present for every encrypted file; absent only for files uploaded
    /// without client-side encryption.
    pub hmac: Option<HmacInfo>,
}

impl FileInfo {
    /// True if `hmac.hmac_type` is anything other than `"sha512"`, which is
    /// a bridge-json error per specification §3.
    #[must_use]
    pub fn has_unsupported_hmac_type(&self) -> bool {
        self.hmac
            .as_ref()
            .is_some_and(|h| h.hmac_type != "sha512")
    }
}
