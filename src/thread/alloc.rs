//! Thread identifier allocation.
//!
//! Thread IDs are opaque 16-hex-digit renderings of a 64-bit counter.
//! The last allocated value is persisted in index metadata, inside
//! whatever transaction is open, so a restart resumes from the
//! high-water mark and never re-issues an ID.

use crate::error::{IndexError, Result};
use crate::store::index::Index;

/// Reserved metadata key holding the allocation high-water mark.
pub const LAST_THREAD_ID_KEY: &str = "last_thread_id";

/// Allocate the next thread identifier and persist the new high-water
/// mark.
pub fn allocate(index: &mut Index) -> Result<String> {
    let last = match index.metadata(LAST_THREAD_ID_KEY) {
        Some(v) => u64::from_str_radix(v, 16).map_err(|e| {
            IndexError::Backend(format!("invalid {LAST_THREAD_ID_KEY} value '{v}': {e}"))
        })?,
        None => 0,
    };
    let next = last
        .checked_add(1)
        .ok_or_else(|| IndexError::Backend("thread ID counter exhausted".into()))?;

    let id = format!("{next:016x}");
    index.set_metadata(LAST_THREAD_ID_KEY, &id)?;
    Ok(id)
}
