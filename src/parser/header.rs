//! Header-section parsing: RFC 5322 folding, RFC 2047 encoded words,
//! and the many date shapes found in real mail.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use tracing::warn;

/// The parsed header section of one message: ordered `(name, value)`
/// fields with lowercased names and folding already undone.
#[derive(Debug, Default)]
pub struct HeaderBlock {
    fields: Vec<(String, String)>,
}

impl HeaderBlock {
    /// Parse a raw header section.
    ///
    /// Folded continuation lines are joined onto their field with a
    /// single space. Lines that are neither a field nor a continuation
    /// are skipped.
    pub fn parse(raw: &[u8]) -> Self {
        let text = bytes_to_text(raw);
        let mut fields: Vec<(String, String)> = Vec::new();
        let mut current: Option<(String, String)> = None;

        for line in text.lines() {
            if line.starts_with([' ', '\t']) {
                if let Some((_, value)) = current.as_mut() {
                    value.push(' ');
                    value.push_str(line.trim());
                }
                continue;
            }
            if let Some(field) = current.take() {
                fields.push(field);
            }
            if let Some((name, value)) = line.split_once(':') {
                current = Some((name.trim().to_ascii_lowercase(), value.trim().to_string()));
            }
        }
        fields.extend(current);

        Self { fields }
    }

    /// First value for a field name. Lookup names must be lowercase.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find_map(|(k, v)| (k.as_str() == name).then_some(v.as_str()))
    }
}

/// Header bytes are usually UTF-8; anything else is read as
/// Windows-1252, which maps every byte to something.
fn bytes_to_text(raw: &[u8]) -> String {
    let raw = raw.strip_prefix(b"\xef\xbb\xbf".as_slice()).unwrap_or(raw); // UTF-8 BOM
    match std::str::from_utf8(raw) {
        Ok(text) => text.to_owned(),
        Err(_) => encoding_rs::WINDOWS_1252.decode(raw).0.into_owned(),
    }
}

// ── RFC 2047 encoded words ──────────────────────────────────────────

/// Resolve `=?charset?enc?payload?=` encoded words in a header value.
///
/// Tokens that fail to decode are left as they appeared; whitespace
/// that only separates two encoded words is dropped, per the RFC's
/// folding rule.
pub fn decode_rfc2047(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    let mut after_word = false;

    while let Some(at) = rest.find("=?") {
        let (plain, tail) = rest.split_at(at);
        match take_encoded_word(&tail[2..]) {
            Some((decoded, remainder)) => {
                if !(after_word && plain.chars().all(char::is_whitespace)) {
                    out.push_str(plain);
                }
                out.push_str(&decoded);
                rest = remainder;
                after_word = true;
            }
            None => {
                out.push_str(plain);
                out.push_str("=?");
                rest = &tail[2..];
                after_word = false;
            }
        }
    }

    out.push_str(rest);
    out
}

/// Decode one encoded word whose text starts right after the leading
/// `=?`. Returns the decoded string and the input past the closing
/// `?=`.
fn take_encoded_word(s: &str) -> Option<(String, &str)> {
    let mut parts = s.splitn(3, '?');
    let charset = parts.next()?;
    let encoding = parts.next()?;
    let tail = parts.next()?;

    let close = tail.find("?=")?;
    let payload = &tail[..close];
    let rest = &tail[close + 2..];

    let raw = match encoding {
        "B" | "b" => b64_decode(payload)?,
        "Q" | "q" => q_decode(payload),
        _ => return None,
    };

    Some((charset_decode(charset, &raw), rest))
}

/// Minimal base64 decoder, tolerant of embedded whitespace.
fn b64_decode(payload: &str) -> Option<Vec<u8>> {
    fn val(c: u8) -> Option<u8> {
        match c {
            b'A'..=b'Z' => Some(c - b'A'),
            b'a'..=b'z' => Some(c - b'a' + 26),
            b'0'..=b'9' => Some(c - b'0' + 52),
            b'+' => Some(62),
            b'/' => Some(63),
            _ => None,
        }
    }

    let mut out = Vec::with_capacity(payload.len() * 3 / 4);
    let mut quad = [0u8; 4];
    let mut qi = 0;
    let mut pad = 0;

    for &b in payload.as_bytes() {
        if b.is_ascii_whitespace() {
            continue;
        }
        if b == b'=' {
            quad[qi] = 0;
            pad += 1;
        } else {
            quad[qi] = val(b)?;
        }
        qi += 1;
        if qi == 4 {
            out.push((quad[0] << 2) | (quad[1] >> 4));
            out.push((quad[1] << 4) | (quad[2] >> 2));
            out.push((quad[2] << 6) | quad[3]);
            out.truncate(out.len() - pad.min(2));
            qi = 0;
            pad = 0;
        }
    }

    Some(out)
}

/// Q-encoding: `_` is a space, `=XX` is a byte, everything else is
/// itself.
fn q_decode(payload: &str) -> Vec<u8> {
    fn hex_val(b: u8) -> Option<u8> {
        (b as char).to_digit(16).map(|v| v as u8)
    }

    let mut out = Vec::with_capacity(payload.len());
    let mut bytes = payload.bytes();
    while let Some(b) = bytes.next() {
        match b {
            b'_' => out.push(b' '),
            b'=' => match (
                bytes.next().and_then(hex_val),
                bytes.next().and_then(hex_val),
            ) {
                (Some(hi), Some(lo)) => out.push(hi << 4 | lo),
                // Broken escape: keep the literal '='
                _ => out.push(b'='),
            },
            other => out.push(other),
        }
    }
    out
}

/// Decode a byte payload according to its declared charset label.
fn charset_decode(label: &str, raw: &[u8]) -> String {
    match encoding_rs::Encoding::for_label(label.trim().as_bytes()) {
        Some(encoding) => encoding.decode(raw).0.into_owned(),
        None => {
            warn!(charset = label, "Unrecognized charset in encoded word");
            String::from_utf8_lossy(raw).into_owned()
        }
    }
}

// ── Date parsing ────────────────────────────────────────────────────

/// Formats seen in the wild once RFC 2822 / RFC 3339 parsing has
/// already failed.
const DATE_FORMATS: &[&str] = &[
    "%d %b %Y %H:%M:%S %z",
    "%d %b %Y %H:%M:%S %Z",
    "%d %b %Y %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%d %H:%M:%S %z",
    "%Y-%m-%d %H:%M:%S",
    "%b %d %H:%M:%S %Y",
    "%d/%m/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];

/// Parse a `Date:` header value, trying progressively sloppier
/// interpretations before giving up.
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    let bare = strip_weekday(value);
    if let Some(dt) = known_format_date(bare) {
        return Some(dt);
    }
    if let Some(renumbered) = numeric_timezone(bare) {
        if let Some(dt) = known_format_date(&renumbered) {
            return Some(dt);
        }
    }

    let fallback = mail_parser_fallback(value);
    if fallback.is_none() {
        warn!(value = value, "Unparsable date header");
    }
    fallback
}

fn known_format_date(s: &str) -> Option<DateTime<Utc>> {
    for fmt in DATE_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
        // No offset in the format: read as UTC
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}

/// Drop a leading `Thu, ` / `Thu ` day name.
fn strip_weekday(s: &str) -> &str {
    const DAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
    for day in DAYS {
        if let Some(rest) = s.strip_prefix(day) {
            if let Some(rest) = rest.strip_prefix(',').or_else(|| rest.strip_prefix(' ')) {
                return rest.trim_start();
            }
        }
    }
    s
}

/// Swap a trailing timezone abbreviation for its UTC offset, so the
/// `%z` formats get another chance.
fn numeric_timezone(s: &str) -> Option<String> {
    let (head, tail) = s.rsplit_once(' ')?;
    let offset = match tail {
        "UT" | "GMT" | "UTC" => "+0000",
        "EST" => "-0500",
        "EDT" => "-0400",
        "CST" => "-0600",
        "CDT" => "-0500",
        "MST" => "-0700",
        "MDT" => "-0600",
        "PST" => "-0800",
        "PDT" => "-0700",
        "CET" => "+0100",
        "CEST" => "+0200",
        "JST" => "+0900",
        _ => return None,
    };
    Some(format!("{head} {offset}"))
}

/// Last resort: wrap the value in a one-header message and let
/// `mail-parser` have a go at it.
fn mail_parser_fallback(value: &str) -> Option<DateTime<Utc>> {
    let synthetic = format!("Date: {value}\r\n\r\n");
    let parsed = mail_parser::MessageParser::new().parse(synthetic.as_bytes())?;
    let seconds = parsed.date()?.to_timestamp();
    Utc.timestamp_opt(seconds, 0).single()
}
