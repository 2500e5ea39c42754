//! The bridge REST surface (specification §4.2, §6).

use async_trait::async_trait;

use crate::error::DownloadResult;
use crate::file_info::FileInfo;
use crate::ids::{BucketId, FileId};
use crate::report::ExchangeReport;

/// The operation named on a token request. The engine only ever requests
/// `Pull` (upload is out of scope — specification §1).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenOperation {
    /// Read access to a bucket's shards.
    Pull,
}

/// One pointer as returned by the bridge, before it is folded into the
/// engine's `Pointer` state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PointerDescriptor {
    /// Position in the reconstructed file.
    pub index: u32,
    /// Shard size in bytes.
    pub size: u64,
    /// Hex content hash.
    pub hash: String,
    /// Single-use access token for this shard.
    pub token: String,
    /// Farmer host/address.
    pub farmer_host: String,
    /// Farmer port.
    pub farmer_port: u16,
    /// Farmer node id.
    pub farmer_node_id: String,
}

/// One page of pointers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PointerPage {
    /// Pointers in this page, in bridge-returned order. An empty page means
    /// pointers are exhausted (specification §4.2).
    pub pointers: Vec<PointerDescriptor>,
}

/// Parameters for a replacement-pointer request (specification §4.3).
#[derive(Clone, Debug)]
pub struct ReplacementRequest<'a> {
    /// The pointer index to replace.
    pub index: u32,
    /// Comma-separated farmer ids to exclude from the replacement.
    pub exclude_farmer_ids_csv: &'a str,
}

/// The bridge's REST surface, as the engine needs it.
///
/// Implementations are expected to apply HTTP Basic auth (`user` +
/// SHA-256 of the password) and, for reads other than the token endpoint,
/// an additional `x-token` header — specification §4.2. Status-code mapping
/// to [`crate::error::DownloadError`] is also the adapter's job; this trait
/// only ever returns success values or a fully classified error.
#[async_trait]
pub trait BridgeClientPort: Send + Sync {
    /// `POST /buckets/{bucket}/tokens`.
    async fn post_token(
        &self,
        bucket_id: &BucketId,
        operation: TokenOperation,
    ) -> DownloadResult<String>;

    /// `GET /buckets/{bucket}/files/{file}?limit=6&skip=N`.
    async fn get_pointers(
        &self,
        bucket_id: &BucketId,
        file_id: &FileId,
        skip: u32,
        limit: u32,
        token: &str,
    ) -> DownloadResult<PointerPage>;

    /// `GET /buckets/{bucket}/files/{file}?limit=1&skip=I&exclude=csv`.
    async fn get_replacement_pointer(
        &self,
        bucket_id: &BucketId,
        file_id: &FileId,
        request: ReplacementRequest<'_>,
        token: &str,
    ) -> DownloadResult<PointerDescriptor>;

    /// `GET /buckets/{bucket}/files/{file}/info`.
    async fn get_file_info(&self, bucket_id: &BucketId, file_id: &FileId) -> DownloadResult<FileInfo>;

    /// `POST /reports/exchanges`.
    async fn post_exchange_report(&self, report: &ExchangeReport) -> DownloadResult<()>;
}
