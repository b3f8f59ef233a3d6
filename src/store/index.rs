//! The persistent document index.
//!
//! Documents carry `(field, value)` terms; the index maintains term
//! postings (term → document IDs), a message-ID uniqueness map, and a
//! metadata key/value area where the empty string means "absent".
//!
//! Mutations happen in memory and reach disk only at the outermost
//! `end_atomic`, via a serialize-to-temp-then-rename commit, so a crash
//! mid-ingest leaves the previously committed index intact.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::{IndexError, Result};

use super::document::{DocId, Document, Term};
use super::format::{IndexHeader, FLAG_GHOST_RECORDS, HEADER_SIZE, MAGIC, VERSION};

/// How to open an existing index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    ReadOnly,
    ReadWrite,
}

/// Everything that is persisted. Cloned wholesale for the transaction
/// snapshot; postings and the message-ID map are derived and rebuilt.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct State {
    documents: BTreeMap<DocId, Document>,
    metadata: BTreeMap<String, String>,
    next_doc_id: DocId,
}

/// A writable (or read-only) handle on one index file.
///
/// The index permits exactly one writer; callers are expected to hold
/// exclusive access for the duration of each ingest.
pub struct Index {
    path: PathBuf,
    flags: u32,
    read_only: bool,
    state: State,
    postings: HashMap<Term, BTreeSet<DocId>>,
    by_message_id: HashMap<String, DocId>,
    atomic_depth: u32,
    snapshot: Option<State>,
    exception_reported: bool,
}

impl Index {
    /// Create a new, empty index file.
    ///
    /// `ghost_records` selects the linking scheme recorded in the file
    /// header; it cannot be changed after creation.
    pub fn create(path: impl AsRef<Path>, ghost_records: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            return Err(IndexError::Corrupt {
                path,
                reason: "index file already exists".into(),
            });
        }

        let flags = if ghost_records { FLAG_GHOST_RECORDS } else { 0 };
        let index = Self {
            path: path.clone(),
            flags,
            read_only: false,
            state: State {
                next_doc_id: 1,
                ..State::default()
            },
            postings: HashMap::new(),
            by_message_id: HashMap::new(),
            atomic_depth: 0,
            snapshot: None,
            exception_reported: false,
        };
        index.persist()?;
        info!(path = %path.display(), ghost_records, "Created index");
        Ok(index)
    }

    /// Open an existing index file.
    pub fn open(path: impl AsRef<Path>, mode: OpenMode) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data = std::fs::read(&path).map_err(|e| IndexError::io(&path, e))?;

        if data.len() < HEADER_SIZE {
            return Err(IndexError::Corrupt {
                path,
                reason: "file too small for index header".into(),
            });
        }

        let header: IndexHeader =
            bincode::deserialize(&data[..HEADER_SIZE]).map_err(|e| IndexError::Corrupt {
                path: path.clone(),
                reason: format!("Header deserialization failed: {e}"),
            })?;

        if let Err(reason) = header.validate() {
            return Err(IndexError::Corrupt { path, reason });
        }

        let state: State =
            bincode::deserialize(&data[HEADER_SIZE..]).map_err(|e| IndexError::Corrupt {
                path: path.clone(),
                reason: format!("State deserialization failed: {e}"),
            })?;

        if state.documents.len() as u64 != header.document_count {
            return Err(IndexError::Corrupt {
                path,
                reason: format!(
                    "Document count mismatch: header says {}, found {}",
                    header.document_count,
                    state.documents.len()
                ),
            });
        }

        let mut index = Self {
            path,
            flags: header.flags,
            read_only: mode == OpenMode::ReadOnly,
            state,
            postings: HashMap::new(),
            by_message_id: HashMap::new(),
            atomic_depth: 0,
            snapshot: None,
            exception_reported: false,
        };
        index.rebuild_derived();
        debug!(
            path = %index.path.display(),
            documents = index.state.documents.len(),
            "Opened index"
        );
        Ok(index)
    }

    /// Whether this index stores ghost records (vs. the legacy
    /// per-message-ID metadata scheme).
    pub fn has_ghost_records(&self) -> bool {
        self.flags & FLAG_GHOST_RECORDS != 0
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Whether a backend error has been reported on this handle.
    /// Once set, every further write attempt fails until reopen.
    pub fn exception_reported(&self) -> bool {
        self.exception_reported
    }

    /// Record that a backend error escaped to the caller.
    pub(crate) fn note_exception(&mut self) {
        self.exception_reported = true;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn document_count(&self) -> usize {
        self.state.documents.len()
    }

    pub(crate) fn ensure_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(IndexError::ReadOnly);
        }
        if self.exception_reported {
            return Err(IndexError::Backend(
                "a previous backend error was reported; reopen the index".into(),
            ));
        }
        Ok(())
    }

    // ── Atomic transactions ─────────────────────────────────────────

    /// Enter an atomic section. Nestable: only the outermost pair
    /// delimits the commit.
    pub fn begin_atomic(&mut self) -> Result<()> {
        self.ensure_writable()?;
        if self.atomic_depth == 0 {
            self.snapshot = Some(self.state.clone());
        }
        self.atomic_depth += 1;
        Ok(())
    }

    /// Leave an atomic section. The outermost `end_atomic` serializes
    /// the state and renames it over the index file.
    pub fn end_atomic(&mut self) -> Result<()> {
        if self.atomic_depth == 0 {
            return Err(IndexError::Backend(
                "end_atomic without matching begin_atomic".into(),
            ));
        }
        self.atomic_depth -= 1;
        if self.atomic_depth == 0 {
            self.persist()?;
            self.snapshot = None;
        }
        Ok(())
    }

    /// Abandon every mutation staged since the outermost `begin_atomic`.
    pub fn abort_atomic(&mut self) {
        if let Some(saved) = self.snapshot.take() {
            self.state = saved;
            self.rebuild_derived();
        }
        self.atomic_depth = 0;
    }

    /// Whether an atomic section is currently open.
    pub fn in_atomic(&self) -> bool {
        self.atomic_depth > 0
    }

    // ── Metadata ────────────────────────────────────────────────────

    /// Read a metadata value. An empty stored value means "absent".
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.state
            .metadata
            .get(key)
            .map(|v| v.as_str())
            .filter(|v| !v.is_empty())
    }

    /// Write a metadata value. Setting the empty string clears the key.
    pub fn set_metadata(&mut self, key: &str, value: &str) -> Result<()> {
        self.ensure_writable()?;
        if value.is_empty() {
            self.state.metadata.remove(key);
        } else {
            self.state.metadata.insert(key.to_string(), value.to_string());
        }
        Ok(())
    }

    // ── Lookup ──────────────────────────────────────────────────────

    /// Document IDs carrying the given term, in ascending ID order.
    pub fn find_doc_ids(&self, field: &str, value: &str) -> Vec<DocId> {
        self.postings
            .get(&Term::new(field, value))
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// The document for a message-ID, if one exists (real or ghost).
    pub fn find_message(&self, message_id: &str) -> Option<DocId> {
        self.by_message_id.get(message_id).copied()
    }

    pub fn document(&self, id: DocId) -> Option<&Document> {
        self.state.documents.get(&id)
    }

    /// Iterate over every document in the index.
    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.state.documents.values()
    }

    fn doc_mut(&mut self, id: DocId) -> Result<&mut Document> {
        self.state
            .documents
            .get_mut(&id)
            .ok_or_else(|| IndexError::Backend(format!("no document with id {id}")))
    }

    // ── Mutation ────────────────────────────────────────────────────

    /// Create a blank document for a message-ID.
    ///
    /// At most one document may exist per message-ID; a second create is
    /// a backend error (callers look up before creating).
    pub fn create_document(&mut self, message_id: &str) -> Result<DocId> {
        self.ensure_writable()?;
        if self.by_message_id.contains_key(message_id) {
            return Err(IndexError::Backend(format!(
                "document already exists for message-ID '{message_id}'"
            )));
        }
        let id = self.state.next_doc_id;
        self.state.next_doc_id += 1;
        self.state
            .documents
            .insert(id, Document::new(id, message_id));
        self.by_message_id.insert(message_id.to_string(), id);
        Ok(id)
    }

    /// Post a term on a document. Posting an already-present term is a
    /// no-op.
    pub fn add_term(&mut self, id: DocId, field: &str, value: &str) -> Result<()> {
        self.ensure_writable()?;
        let term = Term::new(field, value);
        let doc = self.doc_mut(id)?;
        if !doc.terms.contains(&term) {
            doc.terms.push(term.clone());
            self.postings.entry(term).or_default().insert(id);
        }
        Ok(())
    }

    /// Remove a term from a document. Removing an absent term is a no-op.
    pub fn remove_term(&mut self, id: DocId, field: &str, value: &str) -> Result<()> {
        self.ensure_writable()?;
        let term = Term::new(field, value);
        let doc = self.doc_mut(id)?;
        doc.terms.retain(|t| *t != term);
        if let Some(set) = self.postings.get_mut(&term) {
            set.remove(&id);
            if set.is_empty() {
                self.postings.remove(&term);
            }
        }
        Ok(())
    }

    /// Record a filename for a document (duplicates are ignored).
    pub fn add_filename(&mut self, id: DocId, filename: &Path) -> Result<()> {
        self.ensure_writable()?;
        let name = filename.to_string_lossy().into_owned();
        let doc = self.doc_mut(id)?;
        if !doc.filenames.contains(&name) {
            doc.filenames.push(name);
        }
        Ok(())
    }

    /// Set the stored header fields on a document.
    pub fn set_header_values(
        &mut self,
        id: DocId,
        date: DateTime<Utc>,
        from: &str,
        subject: &str,
    ) -> Result<()> {
        self.ensure_writable()?;
        let doc = self.doc_mut(id)?;
        doc.date = date;
        doc.from = from.to_string();
        doc.subject = subject.to_string();
        Ok(())
    }

    // ── Persistence ─────────────────────────────────────────────────

    /// Rebuild postings and the message-ID map from the documents.
    fn rebuild_derived(&mut self) {
        self.postings.clear();
        self.by_message_id.clear();
        for (id, doc) in &self.state.documents {
            self.by_message_id.insert(doc.message_id.clone(), *id);
            for term in &doc.terms {
                self.postings.entry(term.clone()).or_default().insert(*id);
            }
        }
    }

    /// Serialize header + state and rename over the index file.
    fn persist(&self) -> Result<()> {
        let header = IndexHeader {
            magic: *MAGIC,
            version: VERSION,
            flags: self.flags,
            document_count: self.state.documents.len() as u64,
        };

        let header_bytes = bincode::serialize(&header)
            .map_err(|e| IndexError::Backend(format!("header serialization failed: {e}")))?;
        let body_bytes = bincode::serialize(&self.state)
            .map_err(|e| IndexError::Backend(format!("state serialization failed: {e}")))?;

        // Pad header to HEADER_SIZE
        let mut out = vec![0u8; HEADER_SIZE];
        let copy_len = header_bytes.len().min(HEADER_SIZE);
        out[..copy_len].copy_from_slice(&header_bytes[..copy_len]);
        out.extend_from_slice(&body_bytes);

        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, &out)
            .map_err(|e| IndexError::Backend(format!("commit write failed: {e}")))?;
        std::fs::rename(&tmp_path, &self.path)
            .map_err(|e| IndexError::Backend(format!("commit rename failed: {e}")))?;

        debug!(
            path = %self.path.display(),
            documents = self.state.documents.len(),
            "Index committed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::document::{FIELD_THREAD, FIELD_TYPE, TYPE_MAIL};

    fn temp_index() -> (tempfile::TempDir, Index) {
        let dir = tempfile::tempdir().unwrap();
        let index = Index::create(dir.path().join("test.idx"), true).unwrap();
        (dir, index)
    }

    #[test]
    fn test_create_and_reopen_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.idx");
        {
            let index = Index::create(&path, true).unwrap();
            assert!(index.has_ghost_records());
            assert_eq!(index.document_count(), 0);
        }
        let reopened = Index::open(&path, OpenMode::ReadOnly).unwrap();
        assert!(reopened.has_ghost_records());
        assert!(reopened.is_read_only());
    }

    #[test]
    fn test_create_over_existing_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.idx");
        Index::create(&path, true).unwrap();
        assert!(matches!(
            Index::create(&path, true),
            Err(IndexError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_open_garbage_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.idx");
        std::fs::write(&path, b"not an index at all, nowhere near long enough").unwrap();
        assert!(matches!(
            Index::open(&path, OpenMode::ReadWrite),
            Err(IndexError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_metadata_empty_means_absent() {
        let (_dir, mut index) = temp_index();
        assert_eq!(index.metadata("k"), None);
        index.set_metadata("k", "v").unwrap();
        assert_eq!(index.metadata("k"), Some("v"));
        index.set_metadata("k", "").unwrap();
        assert_eq!(index.metadata("k"), None);
    }

    #[test]
    fn test_terms_and_postings() {
        let (_dir, mut index) = temp_index();
        let a = index.create_document("a@x").unwrap();
        let b = index.create_document("b@x").unwrap();
        index.add_term(a, FIELD_THREAD, "t1").unwrap();
        index.add_term(b, FIELD_THREAD, "t1").unwrap();
        assert_eq!(index.find_doc_ids(FIELD_THREAD, "t1"), vec![a, b]);

        index.remove_term(a, FIELD_THREAD, "t1").unwrap();
        assert_eq!(index.find_doc_ids(FIELD_THREAD, "t1"), vec![b]);

        // Double add is a no-op
        index.add_term(b, FIELD_THREAD, "t1").unwrap();
        index.add_term(b, FIELD_THREAD, "t1").unwrap();
        assert_eq!(
            index.document(b).unwrap().terms_in_field(FIELD_THREAD).count(),
            1
        );
    }

    #[test]
    fn test_duplicate_message_id_rejected() {
        let (_dir, mut index) = temp_index();
        index.create_document("a@x").unwrap();
        assert!(matches!(
            index.create_document("a@x"),
            Err(IndexError::Backend(_))
        ));
    }

    #[test]
    fn test_commit_persists_and_abort_discards() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.idx");
        let mut index = Index::create(&path, true).unwrap();

        index.begin_atomic().unwrap();
        let a = index.create_document("a@x").unwrap();
        index.add_term(a, FIELD_TYPE, TYPE_MAIL).unwrap();
        index.end_atomic().unwrap();

        index.begin_atomic().unwrap();
        index.create_document("discarded@x").unwrap();
        index.abort_atomic();
        assert_eq!(index.document_count(), 1);
        assert_eq!(index.find_message("discarded@x"), None);

        let reopened = Index::open(&path, OpenMode::ReadOnly).unwrap();
        assert_eq!(reopened.document_count(), 1);
        assert!(reopened.find_message("a@x").is_some());
    }

    #[test]
    fn test_nested_atomic_commits_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.idx");
        let mut index = Index::create(&path, true).unwrap();

        index.begin_atomic().unwrap();
        index.begin_atomic().unwrap();
        index.create_document("a@x").unwrap();
        index.end_atomic().unwrap();
        assert!(index.in_atomic());
        // Inner end did not commit: reopening now sees the old state
        let peek = Index::open(&path, OpenMode::ReadOnly).unwrap();
        assert_eq!(peek.document_count(), 0);

        index.end_atomic().unwrap();
        let peek = Index::open(&path, OpenMode::ReadOnly).unwrap();
        assert_eq!(peek.document_count(), 1);
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.idx");
        Index::create(&path, true).unwrap();
        let mut index = Index::open(&path, OpenMode::ReadOnly).unwrap();
        assert!(matches!(index.begin_atomic(), Err(IndexError::ReadOnly)));
        assert!(matches!(
            index.create_document("a@x"),
            Err(IndexError::ReadOnly)
        ));
    }

    #[test]
    fn test_exception_flag_is_sticky() {
        let (_dir, mut index) = temp_index();
        index.note_exception();
        assert!(index.exception_reported());
        assert!(matches!(index.begin_atomic(), Err(IndexError::Backend(_))));
    }
}
