//! RFC 822 message-ID scanning for `Message-ID`, `References`, and
//! `In-Reply-To` header values.
//!
//! Real-world headers are messy: parenthesized comments (which nest and
//! carry backslash escapes), stray unstructured text, whitespace inside
//! the angle brackets, and brackets that never close. The scanner never
//! fails; malformed input simply yields fewer identifiers.

/// Advance past whitespace and RFC 822 comments, returning the new byte
/// position.
///
/// A comment is a parenthesized sequence that nests on `(` and treats
/// `\x` as a literal `x` for any `x`, including parentheses and
/// backslashes. An unterminated comment consumes the rest of the input.
fn skip_space_and_comments(input: &str, mut pos: usize) -> usize {
    let bytes = input.as_bytes();
    while pos < bytes.len() && (bytes[pos].is_ascii_whitespace() || bytes[pos] == b'(') {
        while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        if pos < bytes.len() && bytes[pos] == b'(' {
            let mut nesting = 1;
            pos += 1;
            while pos < bytes.len() && nesting > 0 {
                match bytes[pos] {
                    b'(' => nesting += 1,
                    b')' => nesting -= 1,
                    b'\\' => {
                        // Escaped character: skip it (a trailing backslash
                        // at end of input has nothing to escape)
                        if pos + 1 < bytes.len() {
                            pos += 1;
                        }
                    }
                    _ => {}
                }
                pos += 1;
            }
        }
    }
    pos
}

/// Parse a single message-ID from the front of `input`.
///
/// Skips whitespace, comments, and any unstructured text before the next
/// `<`. The identifier is the content between `<` and the following `>`,
/// with internal spaces and tabs removed and the delimiters discarded.
///
/// Returns the identifier (if one was found) and the unparsed remainder.
/// An unterminated `<` yields the rest of the input as the identifier;
/// an empty `<>` yields nothing.
pub fn parse_one(input: &str) -> (Option<String>, &str) {
    if input.is_empty() {
        return (None, input);
    }

    let bytes = input.as_bytes();
    let mut pos = skip_space_and_comments(input, 0);

    // Skip any unstructured text before the opening bracket.
    while pos < bytes.len() && bytes[pos] != b'<' {
        pos += 1;
    }

    if pos >= bytes.len() {
        return (None, &input[pos..]);
    }
    pos += 1; // consume '<'

    let start = skip_space_and_comments(input, pos);

    let mut end = start;
    while end < bytes.len() && bytes[end] != b'>' {
        end += 1;
    }

    let rest = if end < bytes.len() {
        &input[end + 1..] // past the '>'
    } else {
        &input[end..] // unterminated: stop at end of input
    };

    let body = &input[start..end];
    if body.is_empty() {
        return (None, rest);
    }

    // Collapse whitespace that is within the message-id itself.
    let id: String = body.chars().filter(|c| *c != ' ' && *c != '\t').collect();
    if id.is_empty() {
        return (None, rest);
    }

    (Some(id), rest)
}

/// Parse every message-ID in `input`, dropping any identifier equal to
/// `self_id`.
///
/// A message must never become its own parent (messages that reference
/// themselves cyclically exist in the wild), so self-references are
/// filtered here, before the caller ever sees them.
///
/// Returns the identifiers in first-seen order with duplicates
/// suppressed, plus the last identifier parsed (which may duplicate an
/// earlier one). The last identifier is what designates the direct
/// parent when this value came from a `References` header.
pub fn parse_all(input: &str, self_id: &str) -> (Vec<String>, Option<String>) {
    let mut ids: Vec<String> = Vec::new();
    let mut last: Option<String> = None;

    let mut rest = input;
    while !rest.is_empty() {
        let (id, next) = parse_one(rest);
        if let Some(id) = id {
            if id != self_id {
                if !ids.contains(&id) {
                    ids.push(id.clone());
                }
                last = Some(id);
            }
        }
        rest = next;
    }

    (ids, last)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_id() {
        let (id, rest) = parse_one("<a@example.com>");
        assert_eq!(id.as_deref(), Some("a@example.com"));
        assert!(rest.is_empty());
    }

    #[test]
    fn test_parse_leading_whitespace() {
        let (id, _) = parse_one("   \t <a@x>");
        assert_eq!(id.as_deref(), Some("a@x"));
    }

    #[test]
    fn test_parse_skips_comment() {
        let (id, _) = parse_one("(a comment) <a@x>");
        assert_eq!(id.as_deref(), Some("a@x"));
    }

    #[test]
    fn test_parse_nested_comment() {
        let (id, _) = parse_one("(some(nested)comment)<a@x>");
        assert_eq!(id.as_deref(), Some("a@x"));
    }

    #[test]
    fn test_comment_with_escaped_paren() {
        let (id, _) = parse_one(r"(look \) still a comment) <a@x>");
        assert_eq!(id.as_deref(), Some("a@x"));
    }

    #[test]
    fn test_comment_with_escaped_backslash() {
        let (id, _) = parse_one(r"(c:\\) <a@x>");
        assert_eq!(id.as_deref(), Some("a@x"));
    }

    #[test]
    fn test_trailing_backslash_in_comment() {
        // A backslash at end of input has nothing to escape; the comment
        // is simply unterminated and consumes the remainder.
        let (id, rest) = parse_one("(oops \\");
        assert_eq!(id, None);
        assert!(rest.is_empty());
    }

    #[test]
    fn test_unstructured_text_before_bracket() {
        let (id, _) = parse_one("some text then <a@x>");
        assert_eq!(id.as_deref(), Some("a@x"));
    }

    #[test]
    fn test_no_bracket_yields_nothing() {
        let (id, rest) = parse_one("not a valid id");
        assert_eq!(id, None);
        assert!(rest.is_empty());
    }

    #[test]
    fn test_empty_input() {
        let (id, rest) = parse_one("");
        assert_eq!(id, None);
        assert!(rest.is_empty());
    }

    #[test]
    fn test_empty_brackets_yield_nothing() {
        let (id, rest) = parse_one("<> <b@x>");
        assert_eq!(id, None);
        // Parsing continues after the empty pair
        let (id2, _) = parse_one(rest);
        assert_eq!(id2.as_deref(), Some("b@x"));
    }

    #[test]
    fn test_unterminated_bracket_yields_remainder() {
        let (id, rest) = parse_one("<a@x");
        assert_eq!(id.as_deref(), Some("a@x"));
        assert!(rest.is_empty());
    }

    #[test]
    fn test_internal_whitespace_removed() {
        let (id, _) = parse_one("<a @ x\t.com>");
        assert_eq!(id.as_deref(), Some("a@x.com"));
    }

    #[test]
    fn test_roundtrip_arbitrary_id() {
        // Any identifier without spaces or brackets survives a bracketed
        // round trip unchanged.
        for id in ["a@x", "no-at-sign", "ümlaut@ïd", "a..b@@c", "x"] {
            let wrapped = format!("<{id}>");
            let (parsed, _) = parse_one(&wrapped);
            assert_eq!(parsed.as_deref(), Some(id), "round-trip failed for {id}");
        }
    }

    #[test]
    fn test_parse_all_multiple() {
        let (ids, last) = parse_all("<a@x> <b@x> <c@x>", "self@x");
        assert_eq!(ids, vec!["a@x", "b@x", "c@x"]);
        assert_eq!(last.as_deref(), Some("c@x"));
    }

    #[test]
    fn test_parse_all_drops_self() {
        let (ids, last) = parse_all("<a@x> <self@x> <b@x>", "self@x");
        assert_eq!(ids, vec!["a@x", "b@x"]);
        assert_eq!(last.as_deref(), Some("b@x"));
    }

    #[test]
    fn test_parse_all_only_self_yields_nothing() {
        let (ids, last) = parse_all("<m@x>", "m@x");
        assert!(ids.is_empty());
        assert_eq!(last, None);
    }

    #[test]
    fn test_parse_all_dedups_but_tracks_last() {
        let (ids, last) = parse_all("<a@x> <b@x> <a@x>", "self@x");
        assert_eq!(ids, vec!["a@x", "b@x"]);
        // The duplicate still counts as the last reference parsed
        assert_eq!(last.as_deref(), Some("a@x"));
    }

    #[test]
    fn test_parse_all_with_comments_between() {
        let (ids, last) = parse_all("(some(nested)comment)<a@x> <b@x>", "self@x");
        assert_eq!(ids, vec!["a@x", "b@x"]);
        assert_eq!(last.as_deref(), Some("b@x"));
    }

    #[test]
    fn test_parse_all_empty() {
        let (ids, last) = parse_all("", "self@x");
        assert!(ids.is_empty());
        assert_eq!(last, None);
    }

    #[test]
    fn test_parse_all_garbage_between_ids() {
        let (ids, _) = parse_all("junk <a@x> more junk <b@x> trailing", "s");
        assert_eq!(ids, vec!["a@x", "b@x"]);
    }
}
