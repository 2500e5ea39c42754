//! Pointer replacement policy (specification §4.3): decide, given the
//! current state, whether the next bridge pointer request should be a
//! replacement for a failed index or the next page of fresh pointers.

use shard_core::DownloadState;

/// Number of pointers requested per page (`downloader.c`'s pagination
/// constant, specification §10).
pub const POINTER_PAGE_LIMIT: u32 = 6;

/// What the next pointer-table request should be, or `None` if one is
/// already in flight or there is nothing left to request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerRequestAction {
    /// Ask for a single replacement pointer at `index`, excluding the
    /// farmers already on the exclude list.
    Replace { index: u32 },
    /// Ask for the next page of fresh pointers.
    Page { skip: u32, limit: u32 },
}

/// The next action, per §4.3: a pointer sitting in `ErrorReported` always
/// takes priority over requesting a fresh page, and only one pointer
/// request (replacement or page) may be in flight at a time.
#[must_use]
pub fn next_pointer_request(state: &DownloadState) -> Option<PointerRequestAction> {
    if state.requesting_pointers {
        return None;
    }
    if let Some(pointer) = state.next_replaceable_pointer() {
        return Some(PointerRequestAction::Replace {
            index: pointer.index,
        });
    }
    if state.pointers_completed {
        return None;
    }
    Some(PointerRequestAction::Page {
        skip: state.total_pointers(),
        limit: POINTER_PAGE_LIMIT,
    })
}
