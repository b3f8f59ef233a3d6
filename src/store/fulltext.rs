//! Minimal text-term indexing for ingested messages.
//!
//! Posts lowercase word terms from the subject and the plain-text body,
//! plus the sender, on the message document. This is a tokenizer, not a
//! query engine; retrieval lives elsewhere.

use crate::error::Result;
use crate::model::message::MessageFile;

use super::document::DocId;
use super::index::Index;

/// Longest token worth indexing; longer runs are almost always encoded
/// blobs or URLs.
const MAX_TOKEN_LEN: usize = 40;

/// Tokenize and post the text terms for one message.
pub fn index_message(index: &mut Index, doc: DocId, file: &MessageFile) -> Result<()> {
    if let Some(subject) = file.header_decoded("subject") {
        for token in tokenize(&subject) {
            index.add_term(doc, "subject", &token)?;
        }
    }

    if let Some(from) = file.header_decoded("from") {
        for token in tokenize(&from) {
            index.add_term(doc, "from", &token)?;
        }
    }

    let body = file.body_text();
    for token in tokenize(&body) {
        index.add_term(doc, "body", &token)?;
    }

    Ok(())
}

/// Split text into lowercase alphanumeric tokens.
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty() && w.len() <= MAX_TOKEN_LEN)
        .map(|w| w.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_basic() {
        let tokens: Vec<String> = tokenize("Hello, World! re-test").collect();
        assert_eq!(tokens, vec!["hello", "world", "re", "test"]);
    }

    #[test]
    fn test_tokenize_skips_oversize() {
        let long = "a".repeat(MAX_TOKEN_LEN + 1);
        let text = format!("ok {long} fine");
        let tokens: Vec<String> = tokenize(&text).collect();
        assert_eq!(tokens, vec!["ok", "fine"]);
    }
}
