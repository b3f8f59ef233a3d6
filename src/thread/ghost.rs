//! Ghost records: first-class placeholders for referenced messages.
//!
//! When a message references a parent that has not been ingested yet,
//! the index stores a ghost document carrying just the message-ID and a
//! thread term. Ghosts participate in thread merges like any other
//! document, and are promoted to real messages when their file finally
//! arrives.

use tracing::debug;

use crate::error::{IndexError, Result};
use crate::store::document::{DocId, FIELD_THREAD, FIELD_TYPE, TYPE_GHOST, TYPE_MAIL};
use crate::store::index::Index;

use super::alloc;

/// What a message-ID lookup found (or didn't).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindStatus {
    /// A real, already-ingested message exists for this ID.
    Real,
    /// A ghost placeholder exists for this ID.
    Ghost,
    /// Nothing existed; a blank document was created, with no thread
    /// assignment yet.
    Created,
}

/// Look up the document for a message-ID, creating a blank one if the
/// ID has never been seen.
pub fn find_or_create(index: &mut Index, message_id: &str) -> Result<(DocId, FindStatus)> {
    if let Some(id) = index.find_message(message_id) {
        let doc = index
            .document(id)
            .ok_or_else(|| IndexError::Backend(format!("no document with id {id}")))?;
        let status = if doc.is_ghost() {
            FindStatus::Ghost
        } else {
            FindStatus::Real
        };
        return Ok((id, status));
    }
    let id = index.create_document(message_id)?;
    Ok((id, FindStatus::Created))
}

/// Promote a ghost to a real message.
///
/// The thread term already on the ghost is preserved; only the `type`
/// term changes.
pub fn promote(index: &mut Index, doc: DocId) -> Result<()> {
    index.add_term(doc, FIELD_TYPE, TYPE_MAIL)?;
    index.remove_term(doc, FIELD_TYPE, TYPE_GHOST)
}

/// Create a ghost document for a referenced-but-unseen message-ID,
/// giving it a freshly allocated thread. Returns the thread-ID.
pub fn materialise_ghost(index: &mut Index, message_id: &str) -> Result<String> {
    let doc = index.create_document(message_id)?;
    let thread_id = alloc::allocate(index)?;
    index.add_term(doc, FIELD_TYPE, TYPE_GHOST)?;
    index.add_term(doc, FIELD_THREAD, &thread_id)?;
    debug!(message_id = message_id, thread = %thread_id, "Created ghost");
    Ok(thread_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_index() -> (tempfile::TempDir, Index) {
        let dir = tempfile::tempdir().unwrap();
        let index = Index::create(dir.path().join("t.idx"), true).unwrap();
        (dir, index)
    }

    #[test]
    fn test_find_or_create_states() {
        let (_dir, mut index) = temp_index();

        let (a, status) = find_or_create(&mut index, "a@x").unwrap();
        assert_eq!(status, FindStatus::Created);

        // Same ID again: same document, still no type terms
        let (a2, status) = find_or_create(&mut index, "a@x").unwrap();
        assert_eq!(a2, a);
        assert_eq!(status, FindStatus::Real);
    }

    #[test]
    fn test_materialise_then_find_reports_ghost() {
        let (_dir, mut index) = temp_index();

        let thread_id = materialise_ghost(&mut index, "parent@x").unwrap();
        let (doc, status) = find_or_create(&mut index, "parent@x").unwrap();
        assert_eq!(status, FindStatus::Ghost);
        assert_eq!(
            index.document(doc).unwrap().thread_id(),
            Some(thread_id.as_str())
        );
    }

    #[test]
    fn test_promote_swaps_type_and_keeps_thread() {
        let (_dir, mut index) = temp_index();

        let thread_id = materialise_ghost(&mut index, "parent@x").unwrap();
        let doc = index.find_message("parent@x").unwrap();
        promote(&mut index, doc).unwrap();

        let d = index.document(doc).unwrap();
        assert!(d.has_term(FIELD_TYPE, TYPE_MAIL));
        assert!(!d.is_ghost());
        assert_eq!(d.thread_id(), Some(thread_id.as_str()));
    }
}
