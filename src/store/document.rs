//! Document records stored in the index.

use chrono::{DateTime, Utc};

/// Identifier of a document within one index.
pub type DocId = u64;

/// Term field carrying the document type (`mail` or `ghost`).
pub const FIELD_TYPE: &str = "type";
/// Term field carrying the thread identifier.
pub const FIELD_THREAD: &str = "thread";
/// Term field naming every referenced parent message-ID.
pub const FIELD_REFERENCE: &str = "reference";
/// Term field naming the single designated parent message-ID.
pub const FIELD_REPLYTO: &str = "replyto";

/// `type` value for a real, ingested message.
pub const TYPE_MAIL: &str = "mail";
/// `type` value for a placeholder record.
pub const TYPE_GHOST: &str = "ghost";

/// A `(field, value)` term posted on a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Term {
    pub field: String,
    pub value: String,
}

impl Term {
    pub fn new(field: &str, value: &str) -> Self {
        Self {
            field: field.to_string(),
            value: value.to_string(),
        }
    }
}

/// One indexed message (real or ghost).
///
/// Exactly one document exists per message-ID. A ghost carries only its
/// message-ID and a `thread` term; promotion to a real message fills in
/// the header fields and filenames.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Document {
    /// Document identifier, unique within the index.
    pub id: DocId,

    /// The message-ID this document represents (angle brackets stripped).
    pub message_id: String,

    /// Every file this message has been seen in. Duplicate delivery of
    /// the same message-ID appends here rather than creating a document.
    pub filenames: Vec<String>,

    /// Posted terms: `type`, `thread`, `reference`, `replyto`, plus
    /// tokenized text terms.
    pub terms: Vec<Term>,

    /// Parsed `Date:` header (Unix epoch when absent or unparsable).
    pub date: DateTime<Utc>,

    /// Decoded `From:` header.
    pub from: String,

    /// Decoded `Subject:` header.
    pub subject: String,
}

impl Document {
    pub(crate) fn new(id: DocId, message_id: &str) -> Self {
        Self {
            id,
            message_id: message_id.to_string(),
            filenames: Vec::new(),
            terms: Vec::new(),
            date: DateTime::UNIX_EPOCH,
            from: String::new(),
            subject: String::new(),
        }
    }

    /// Whether a given term is posted on this document.
    pub fn has_term(&self, field: &str, value: &str) -> bool {
        self.terms
            .iter()
            .any(|t| t.field == field && t.value == value)
    }

    /// The first value posted under `field`, if any.
    pub fn first_term(&self, field: &str) -> Option<&str> {
        self.terms
            .iter()
            .find(|t| t.field == field)
            .map(|t| t.value.as_str())
    }

    /// All values posted under `field`, in posting order.
    pub fn terms_in_field<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a str> {
        self.terms
            .iter()
            .filter(move |t| t.field == field)
            .map(|t| t.value.as_str())
    }

    /// The thread identifier, if one has been assigned.
    pub fn thread_id(&self) -> Option<&str> {
        self.first_term(FIELD_THREAD)
    }

    /// Whether this document is a ghost (placeholder) record.
    pub fn is_ghost(&self) -> bool {
        self.has_term(FIELD_TYPE, TYPE_GHOST)
    }
}
