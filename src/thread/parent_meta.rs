//! Legacy per-message-ID thread memoization.
//!
//! Indexes without ghost records cannot store a placeholder document
//! for a message that is only referenced, so they remember the thread
//! assignment in index metadata instead, keyed by the referenced
//! message-ID. The entry lives until the referenced message is finally
//! ingested, at which point it is consumed.

use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::store::index::Index;

/// Namespace prefix for the memoization keys.
const KEY_PREFIX: &str = "thread_id_";

/// Build the metadata key for a message-ID.
///
/// Message-IDs longer than `cap` are projected through SHA-256 so the
/// key stays within the index's key-length ceiling; the projection is
/// used only here, never as a stored message-ID.
fn metadata_key(message_id: &str, cap: usize) -> String {
    if message_id.len() > cap {
        let digest = Sha256::digest(message_id.as_bytes());
        format!("{KEY_PREFIX}sha256-{digest:x}")
    } else {
        format!("{KEY_PREFIX}{message_id}")
    }
}

/// Read the memoized thread-ID for a message-ID, if any.
pub fn get(index: &Index, message_id: &str, cap: usize) -> Option<String> {
    index
        .metadata(&metadata_key(message_id, cap))
        .map(String::from)
}

/// Memoize a thread-ID for a not-yet-seen message-ID.
pub fn put(index: &mut Index, message_id: &str, thread_id: &str, cap: usize) -> Result<()> {
    index.set_metadata(&metadata_key(message_id, cap), thread_id)
}

/// Fetch and clear the memoized thread-ID for a message-ID.
pub fn consume(index: &mut Index, message_id: &str, cap: usize) -> Result<Option<String>> {
    let key = metadata_key(message_id, cap);
    match index.metadata(&key).map(String::from) {
        Some(stored) => {
            index.set_metadata(&key, "")?;
            Ok(Some(stored))
        }
        None => Ok(None),
    }
}
