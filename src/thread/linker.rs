//! Top-level message ingestion: assign a thread to a newly discovered
//! message and reconcile it with everything already indexed.
//!
//! Messages arrive in arbitrary order. A reply can land before the
//! message it answers; two threads can turn out to be one conversation
//! only when a later message references both. `add` handles all of it
//! inside one atomic transaction: resolve each referenced parent to a
//! thread (creating placeholders for parents never seen), adopt the
//! first thread found, and merge every further thread into it.

use std::path::Path;

use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{IndexError, Result};
use crate::model::message::MessageFile;
use crate::parser::msgid;
use crate::store::document::{
    DocId, FIELD_REFERENCE, FIELD_REPLYTO, FIELD_THREAD, FIELD_TYPE, TYPE_MAIL,
};
use crate::store::fulltext;
use crate::store::index::Index;

use super::ghost::{self, FindStatus};
use super::{alloc, parent_meta};

/// Non-error outcome of [`Linker::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// The message was new and is now indexed and threaded.
    Indexed(DocId),
    /// A real message with this message-ID already existed. The new
    /// filename was recorded on it; nothing else changed.
    Duplicate(DocId),
}

impl AddOutcome {
    /// The document the outcome refers to.
    pub fn doc_id(&self) -> DocId {
        match self {
            AddOutcome::Indexed(id) | AddOutcome::Duplicate(id) => *id,
        }
    }
}

/// Ingests message files into an index.
///
/// The linker assumes exclusive write access to the index for the
/// duration of each `add` call.
pub struct Linker<'a> {
    index: &'a mut Index,
    message_id_cap: usize,
}

impl<'a> Linker<'a> {
    pub fn new(index: &'a mut Index, config: &Config) -> Self {
        Self {
            index,
            message_id_cap: config.index.message_id_cap,
        }
    }

    /// Ingest one message file.
    ///
    /// Everything (document creation, parent placeholders, thread
    /// merges, term posting) happens inside a single atomic
    /// transaction. On any backend error the transaction is aborted,
    /// the error is reported sticky on the index, and the on-disk state
    /// is exactly what the last successful commit left.
    pub fn add(&mut self, path: &Path) -> Result<AddOutcome> {
        self.index.ensure_writable()?;

        let file = MessageFile::open(path)?;

        self.index.begin_atomic()?;
        match self.add_parsed(path, &file) {
            Ok(outcome) => match self.index.end_atomic() {
                Ok(()) => Ok(outcome),
                Err(commit_err) => {
                    // A failed commit outranks a successful link
                    self.index.note_exception();
                    self.index.abort_atomic();
                    Err(commit_err)
                }
            },
            Err(err) => {
                if matches!(err, IndexError::Backend(_)) {
                    self.index.note_exception();
                }
                self.index.abort_atomic();
                Err(err)
            }
        }
    }

    fn add_parsed(&mut self, path: &Path, file: &MessageFile) -> Result<AddOutcome> {
        // Cheap guard before any hashing or indexing work: a file with
        // none of From, Subject, To is not a mail message.
        let from = file.header_decoded("from").unwrap_or_default();
        let subject = file.header_decoded("subject").unwrap_or_default();
        let to = file.header_decoded("to").unwrap_or_default();
        if from.trim().is_empty() && subject.trim().is_empty() && to.trim().is_empty() {
            return Err(IndexError::NotAnEmail(path.to_path_buf()));
        }

        let message_id = self.identify(file);
        debug!(message_id = %message_id, path = %path.display(), "Adding message");

        let (doc, status) = ghost::find_or_create(self.index, &message_id)?;
        self.index.add_filename(doc, path)?;

        if status == FindStatus::Real {
            // Duplicate delivery: same message-ID in a second file
            debug!(message_id = %message_id, "Duplicate message-ID");
            return Ok(AddOutcome::Duplicate(doc));
        }

        let is_ghost = status == FindStatus::Ghost;
        if is_ghost {
            ghost::promote(self.index, doc)?;
        } else {
            self.index.add_term(doc, FIELD_TYPE, TYPE_MAIL)?;
        }

        self.link_message(doc, file, &message_id, is_ghost)?;

        self.index.set_header_values(doc, file.date(), &from, &subject)?;
        fulltext::index_message(self.index, doc, file)?;

        Ok(AddOutcome::Indexed(doc))
    }

    /// Determine the message-ID for a file.
    ///
    /// A `Message-ID` header that exists but won't parse is used
    /// verbatim: stability across re-ingest of the same file matters
    /// more than RFC compliance. Only a missing header falls back to
    /// the content hash.
    fn identify(&self, file: &MessageFile) -> String {
        if let Some(header) = file.header("message-id") {
            if !header.is_empty() {
                let (id, _) = msgid::parse_one(header);
                if let Some(id) = id {
                    return id;
                }
                warn!(header = header, "Unparsable Message-ID header, using verbatim");
                return header.to_string();
            }
        }
        file.content_hash_id()
    }

    /// Link a blank or freshly promoted message into existing threads,
    /// assigning a new thread only if nothing connects it to one.
    fn link_message(
        &mut self,
        doc: DocId,
        file: &MessageFile,
        message_id: &str,
        is_ghost: bool,
    ) -> Result<()> {
        // A ghost was already placed in a thread by whoever referenced it
        let mut thread_id: Option<String> = if self.index.has_ghost_records() && is_ghost {
            self.index
                .document(doc)
                .and_then(|d| d.thread_id().map(String::from))
        } else {
            None
        };

        self.link_to_parents(doc, file, message_id, &mut thread_id)?;

        if !self.index.has_ghost_records() {
            self.link_to_children(doc, message_id, &mut thread_id)?;

            // A previously ingested reply may have memoized a thread for
            // this message-ID. The memo is cleared either way, and
            // adopted only when parent and child linking both came up
            // empty.
            if let Some(stored) =
                parent_meta::consume(self.index, message_id, self.message_id_cap)?
            {
                if thread_id.is_none() {
                    self.index.add_term(doc, FIELD_THREAD, &stored)?;
                    thread_id = Some(stored);
                }
            }
        }

        // Top-level message with no one referring to it: start a thread
        if thread_id.is_none() {
            let fresh = alloc::allocate(self.index)?;
            self.index.add_term(doc, FIELD_THREAD, &fresh)?;
            debug!(message_id = message_id, thread = %fresh, "Started new thread");
        }

        Ok(())
    }

    /// Resolve every referenced parent to a thread, adopting the first
    /// and merging the rest.
    fn link_to_parents(
        &mut self,
        doc: DocId,
        file: &MessageFile,
        message_id: &str,
        thread_id: &mut Option<String>,
    ) -> Result<()> {
        let (mut parents, last_ref) =
            msgid::parse_all(file.header("references").unwrap_or_default(), message_id);
        let (reply_parents, in_reply_to) =
            msgid::parse_all(file.header("in-reply-to").unwrap_or_default(), message_id);
        for p in reply_parents {
            if !parents.contains(&p) {
                parents.push(p);
            }
        }

        // The designated direct parent is the last entry of References,
        // falling back to In-Reply-To
        if let Some(parent) = last_ref.as_deref().or(in_reply_to.as_deref()) {
            self.index.add_term(doc, FIELD_REPLYTO, parent)?;
        }

        for parent in &parents {
            self.index.add_term(doc, FIELD_REFERENCE, parent)?;

            let parent_thread = self.resolve_thread_id(parent)?;
            match thread_id {
                None => {
                    self.index.add_term(doc, FIELD_THREAD, &parent_thread)?;
                    *thread_id = Some(parent_thread);
                }
                Some(current) if *current != parent_thread => {
                    let winner = current.clone();
                    self.merge_threads(&winner, &parent_thread)?;
                }
                Some(_) => {}
            }
        }

        Ok(())
    }

    /// Find the thread a referenced message-ID belongs to, creating
    /// whatever placeholder the index format calls for when the message
    /// has never been seen.
    fn resolve_thread_id(&mut self, parent_id: &str) -> Result<String> {
        if let Some(doc) = self.index.find_message(parent_id) {
            return self
                .index
                .document(doc)
                .and_then(|d| d.thread_id().map(String::from))
                .ok_or_else(|| {
                    IndexError::Backend(format!("document for '{parent_id}' has no thread"))
                });
        }

        if self.index.has_ghost_records() {
            ghost::materialise_ghost(self.index, parent_id)
        } else {
            if let Some(stored) = parent_meta::get(self.index, parent_id, self.message_id_cap) {
                return Ok(stored);
            }
            let fresh = alloc::allocate(self.index)?;
            parent_meta::put(self.index, parent_id, &fresh, self.message_id_cap)?;
            Ok(fresh)
        }
    }

    /// Legacy formats only: pull in messages that were ingested before
    /// this one and reference it.
    ///
    /// With ghost records this pass is unnecessary: those children
    /// already placed this message's ID in the right thread, and merges
    /// rewrite ghosts along with everything else. Without ghosts, the
    /// memoized thread IDs were never rewritten by merges, so children
    /// may sit in a thread that no longer matches and must be pulled
    /// back.
    fn link_to_children(
        &mut self,
        doc: DocId,
        message_id: &str,
        thread_id: &mut Option<String>,
    ) -> Result<()> {
        for child in self.index.find_doc_ids(FIELD_REFERENCE, message_id) {
            let child_thread = self
                .index
                .document(child)
                .and_then(|d| d.thread_id().map(String::from))
                .ok_or_else(|| {
                    IndexError::Backend(format!("child document {child} has no thread"))
                })?;

            match thread_id {
                None => {
                    self.index.add_term(doc, FIELD_THREAD, &child_thread)?;
                    *thread_id = Some(child_thread);
                }
                Some(current) if *current != child_thread => {
                    // The child's edge pointed at a stale placeholder
                    // thread; drop it and merge the child's thread in
                    self.index.remove_term(child, FIELD_REFERENCE, message_id)?;
                    let winner = current.clone();
                    self.merge_threads(&winner, &child_thread)?;
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Rewrite every document (real and ghost) in the losing thread to
    /// the winning one.
    fn merge_threads(&mut self, winner: &str, loser: &str) -> Result<()> {
        debug!(winner = winner, loser = loser, "Merging threads");
        for doc in self.index.find_doc_ids(FIELD_THREAD, loser) {
            self.index.remove_term(doc, FIELD_THREAD, loser)?;
            self.index.add_term(doc, FIELD_THREAD, winner)?;
        }
        Ok(())
    }
}
