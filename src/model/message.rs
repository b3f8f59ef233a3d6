//! A single on-disk message file.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sha1::{Digest, Sha1};

use crate::error::{IndexError, Result};
use crate::parser::header::{self, HeaderBlock};

/// One RFC 5322 message read from disk (maildir-style: one message per
/// file).
///
/// The raw bytes are retained for the lifetime of the value: they are
/// needed for the content-hash fallback identifier and for body
/// indexing, and message files are small enough that re-reading would
/// only add failure paths.
#[derive(Debug)]
pub struct MessageFile {
    path: PathBuf,
    raw: Vec<u8>,
    headers: HeaderBlock,
    /// Byte offset where the body starts (past the blank line).
    body_offset: usize,
}

impl MessageFile {
    /// Read and parse a message file.
    ///
    /// Only the header section is parsed; the body is kept as raw bytes.
    /// Parsing never fails on malformed headers (bad lines are skipped),
    /// so the only error here is I/O.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let raw = std::fs::read(&path).map_err(|e| IndexError::io(&path, e))?;

        let body_offset = find_body_offset(&raw);
        let headers = HeaderBlock::parse(&raw[..body_offset]);

        Ok(Self {
            path,
            raw,
            headers,
            body_offset,
        })
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw value of the first header with this (lowercase) name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Header value with RFC 2047 encoded-words resolved.
    pub fn header_decoded(&self, name: &str) -> Option<String> {
        self.header(name).map(header::decode_rfc2047)
    }

    /// Parsed `Date:` header, falling back to the Unix epoch.
    pub fn date(&self) -> DateTime<Utc> {
        self.header("date")
            .and_then(header::parse_date)
            .unwrap_or(DateTime::UNIX_EPOCH)
    }

    /// The message body as lossy text.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.raw[self.body_offset..]).into_owned()
    }

    /// Deterministic fallback identifier for messages without a usable
    /// `Message-ID` header: a SHA-1 over the entire file content.
    ///
    /// The `notmuch-sha1-` prefix is a stable on-disk format: the same
    /// file must map to the same identifier across re-ingests and across
    /// implementations.
    pub fn content_hash_id(&self) -> String {
        let mut hasher = Sha1::new();
        hasher.update(&self.raw);
        format!("notmuch-sha1-{:x}", hasher.finalize())
    }
}

/// Find the byte offset just past the header/body separator (the first
/// blank line). If there is none, the whole file is headers.
fn find_body_offset(raw: &[u8]) -> usize {
    let mut i = 0;
    while i < raw.len() {
        // At start of a line: blank line ends the headers
        if raw[i] == b'\n' {
            if raw[i + 1..].starts_with(b"\r\n") {
                return i + 3;
            }
            if raw[i + 1..].starts_with(b"\n") {
                return i + 2;
            }
        }
        i += 1;
    }
    raw.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_message(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("msg.eml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn test_open_and_read_headers() {
        let (_dir, path) = write_message(
            "From: User One <u1@example.com>\n\
             To: u2@example.com\n\
             Subject: Hello\n\
             Message-ID: <msg001@example.com>\n\
             Date: Thu, 04 Jan 2024 10:00:00 +0000\n\
             \n\
             Body text here.\n",
        );
        let msg = MessageFile::open(&path).unwrap();
        assert_eq!(msg.header("subject"), Some("Hello"));
        assert_eq!(msg.header("message-id"), Some("<msg001@example.com>"));
        assert_eq!(msg.date().format("%Y-%m-%d").to_string(), "2024-01-04");
        assert!(msg.body_text().contains("Body text here"));
    }

    #[test]
    fn test_folded_header() {
        let (_dir, path) = write_message(
            "From: u@x\nSubject: part one\n\tpart two\n\nbody\n",
        );
        let msg = MessageFile::open(&path).unwrap();
        assert_eq!(msg.header("subject"), Some("part one part two"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = MessageFile::open("/nonexistent/msg.eml").unwrap_err();
        assert!(matches!(err, IndexError::Io { .. }));
    }

    #[test]
    fn test_no_body_separator() {
        let (_dir, path) = write_message("From: u@x\nSubject: s");
        let msg = MessageFile::open(&path).unwrap();
        assert_eq!(msg.header("from"), Some("u@x"));
        assert!(msg.body_text().is_empty());
    }

    #[test]
    fn test_content_hash_is_stable() {
        let (_dir, path) = write_message("From: u@x\n\nsame body\n");
        let a = MessageFile::open(&path).unwrap().content_hash_id();
        let b = MessageFile::open(&path).unwrap().content_hash_id();
        assert_eq!(a, b);
        assert!(a.starts_with("notmuch-sha1-"));
        // SHA-1 hex digest is 40 characters
        assert_eq!(a.len(), "notmuch-sha1-".len() + 40);
    }

    #[test]
    fn test_crlf_body_separator() {
        let (_dir, path) = write_message("From: u@x\r\nSubject: s\r\n\r\nbody\r\n");
        let msg = MessageFile::open(&path).unwrap();
        assert_eq!(msg.header("subject"), Some("s"));
        assert!(msg.body_text().contains("body"));
    }
}
