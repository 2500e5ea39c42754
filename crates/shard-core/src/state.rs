//! The download state machine's root entity.
//!
//! Pure data: no I/O, no runtime handle. `shard_download::engine` owns one
//! of these per in-flight download on its single dispatch task and mutates
//! it directly; nothing else is allowed to touch it (specification §5).

use crate::file_info::FileInfo;
use crate::ids::{BucketId, FileId};
use crate::pointer::{Pointer, PointerStatus};

/// Per-kind transient-bridge-error counters, promoted to fatal at the
/// configured budget (specification §4.1 "Error policy").
#[derive(Clone, Copy, Debug, Default)]
pub struct TransientCounters {
    /// Consecutive (or total — the spec does not require resetting on
    /// success, since a successful request retires the flag entirely)
    /// token-request failures.
    pub token_fail: u32,
    /// Pointer-page request failures.
    pub pointer_fail: u32,
    /// File-info request failures.
    pub info_fail: u32,
}

/// Decryption material derived once at `start()`, absent for unencrypted
/// downloads.
#[derive(Clone, Debug)]
pub struct DecryptMaterial {
    /// 32-byte AES-256 key.
    pub key: [u8; 32],
    /// 16-byte initial CTR/IV.
    pub initial_ctr: [u8; 16],
}

/// The root entity for one in-flight file download.
#[derive(Debug)]
pub struct DownloadState {
    /// Target bucket.
    pub bucket_id: BucketId,
    /// Target file.
    pub file_id: FileId,
    /// Decryption material, or `None` for a plaintext download.
    pub decrypt: Option<DecryptMaterial>,
    /// Uniform shard size, set by the first pointer seen.
    pub shard_size: Option<u64>,
    /// Ordered pointer table; `Pointer::index` determines byte offset, not
    /// position in this vector (specification §9, open question).
    pub pointers: Vec<Pointer>,
    /// Number of shards the writer has finished writing.
    pub completed_shards: u32,
    /// Number of in-flight farmer fetches.
    pub resolving_shards: u32,
    /// The bridge has returned an empty page: no more pointers exist.
    pub pointers_completed: bool,
    /// The writer currently owns the sink.
    pub writing: bool,
    /// A token request is in flight.
    pub requesting_token: bool,
    /// A pointer-page or replacement-pointer request is in flight.
    pub requesting_pointers: bool,
    /// A file-info request is in flight.
    pub requesting_info: bool,
    /// Single-use bridge token for this download's pointer requests.
    pub token: Option<String>,
    /// Bridge file metadata (authoritative HMAC).
    pub info: Option<FileInfo>,
    /// Farmer ids excluded from future replacement requests, comma-joined
    /// lazily by `excluded_farmers()`.
    pub excluded_farmer_ids: Vec<String>,
    /// Transient-error counters.
    pub transient: TransientCounters,
    /// Terminal error, set once and never cleared.
    pub error: Option<crate::error::DownloadError>,
    /// `cancel()` was called.
    pub canceled: bool,
    /// `on_finished` has fired; never reverts to `false`.
    pub finished: bool,
    /// Count of outstanding work units (fetches + bridge calls + writes +
    /// report sends). `on_finished` may not fire while this is nonzero.
    pub pending_work_count: u32,
}

impl DownloadState {
    /// Construct state for a download that has not yet issued any request.
    #[must_use]
    pub fn new(bucket_id: BucketId, file_id: FileId, decrypt: Option<DecryptMaterial>) -> Self {
        Self {
            bucket_id,
            file_id,
            decrypt,
            shard_size: None,
            pointers: Vec::new(),
            completed_shards: 0,
            resolving_shards: 0,
            pointers_completed: false,
            writing: false,
            requesting_token: false,
            requesting_pointers: false,
            requesting_info: false,
            token: None,
            info: None,
            excluded_farmer_ids: Vec::new(),
            transient: TransientCounters::default(),
            error: None,
            canceled: false,
            finished: false,
            pending_work_count: 0,
        }
    }

    /// Total pointer count as currently known (grows as pages arrive).
    #[must_use]
    pub fn total_pointers(&self) -> u32 {
        self.pointers.len() as u32
    }

    /// `excluded_farmer_ids` joined as the bridge's comma-separated query
    /// parameter (specification §4.3, §9 "bounded string builder").
    #[must_use]
    pub fn excluded_farmers_csv(&self) -> String {
        self.excluded_farmer_ids.join(",")
    }

    /// Sum of declared sizes across every known pointer.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.pointers.iter().map(|p| p.size).sum()
    }

    /// Sum of `downloaded_size` across every known pointer, for progress.
    #[must_use]
    pub fn downloaded_bytes(&self) -> u64 {
        self.pointers.iter().map(|p| p.downloaded_size).sum()
    }

    /// Find a pointer by its bridge-assigned index (not array position —
    /// specification §9 fixes the "assumes contiguity" bug in the source).
    #[must_use]
    pub fn pointer_by_index(&self, index: u32) -> Option<&Pointer> {
        self.pointers.iter().find(|p| p.index == index)
    }

    /// Mutable variant of [`Self::pointer_by_index`].
    pub fn pointer_by_index_mut(&mut self, index: u32) -> Option<&mut Pointer> {
        self.pointers.iter_mut().find(|p| p.index == index)
    }

    /// True once every known pointer has reached [`PointerStatus::Written`]
    /// and no more pages remain.
    #[must_use]
    pub fn all_written(&self) -> bool {
        self.pointers_completed
            && self.total_pointers() > 0
            && self.completed_shards == self.total_pointers()
    }

    /// First pointer, in ascending index order, that is not yet `Written`.
    /// `queue_write_next_shard` (specification §4.1 step 2) uses this to
    /// enforce strictly ascending write order.
    #[must_use]
    pub fn first_unwritten_pointer_mut(&mut self) -> Option<&mut Pointer> {
        let min_index = self
            .pointers
            .iter()
            .filter(|p| p.status != PointerStatus::Written)
            .map(|p| p.index)
            .min()?;
        self.pointers.iter_mut().find(|p| p.index == min_index)
    }

    /// Any pointer sitting in `ErrorReported`, the trigger for a replacement
    /// request (specification §4.3).
    #[must_use]
    pub fn next_replaceable_pointer(&self) -> Option<&Pointer> {
        self.pointers
            .iter()
            .filter(|p| p.status == PointerStatus::ErrorReported)
            .min_by_key(|p| p.index)
    }
}

/// A terminal snapshot of a completed download, returned to the caller and
/// useful as a structured log field.
#[derive(Clone, Debug)]
pub struct DownloadSummary {
    /// Target bucket.
    pub bucket_id: BucketId,
    /// Target file.
    pub file_id: FileId,
    /// Total bytes written to the sink.
    pub total_bytes: u64,
    /// Number of shards written.
    pub shard_count: u32,
    /// Final HMAC-SHA512 digest, lowercase hex (present even for
    /// unencrypted downloads, where the HMAC key is empty).
    pub hmac_hex: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket() -> BucketId {
        BucketId::new("368be0816766b28fd5f43af5").unwrap()
    }

    fn file() -> FileId {
        FileId::new("998960317b6725a3f8080c2b").unwrap()
    }

    fn push_pointer(state: &mut DownloadState, index: u32, status: PointerStatus) {
        let mut p = Pointer::new(
            index,
            16 * 1024 * 1024,
            format!("hash{index}"),
            "farmer".into(),
            "127.0.0.1".into(),
            8080,
            "tok".into(),
        );
        p.status = status;
        state.pointers.push(p);
    }

    #[test]
    fn first_unwritten_pointer_is_by_index_not_position() {
        let mut state = DownloadState::new(bucket(), file(), None);
        // Pushed out of index order to exercise the "not array position" rule.
        push_pointer(&mut state, 1, PointerStatus::Written);
        push_pointer(&mut state, 0, PointerStatus::Downloaded);
        let next = state.first_unwritten_pointer_mut().unwrap();
        assert_eq!(next.index, 0);
    }

    #[test]
    fn all_written_requires_pages_exhausted() {
        let mut state = DownloadState::new(bucket(), file(), None);
        push_pointer(&mut state, 0, PointerStatus::Written);
        state.completed_shards = 1;
        assert!(!state.all_written(), "pages not yet exhausted");
        state.pointers_completed = true;
        assert!(state.all_written());
    }

    #[test]
    fn excluded_farmers_csv_joins_with_commas() {
        let mut state = DownloadState::new(bucket(), file(), None);
        state.excluded_farmer_ids.push("farmer-a".into());
        state.excluded_farmer_ids.push("farmer-b".into());
        assert_eq!(state.excluded_farmers_csv(), "farmer-a,farmer-b");
    }

    #[test]
    fn next_replaceable_pointer_picks_lowest_index() {
        let mut state = DownloadState::new(bucket(), file(), None);
        push_pointer(&mut state, 5, PointerStatus::ErrorReported);
        push_pointer(&mut state, 2, PointerStatus::ErrorReported);
        push_pointer(&mut state, 3, PointerStatus::Downloaded);
        assert_eq!(state.next_replaceable_pointer().unwrap().index, 2);
    }
}
