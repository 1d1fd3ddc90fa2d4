// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Markup stripping for user-supplied form text.
//!
//! Submissions are plain text. Every tag is removed; elements that carry
//! executable or hidden content are removed together with that content.

use serde_json::{Map, Value};
use std::ops::Range;

/// Elements removed along with everything up to their closing tag.
const DROP_WITH_CONTENT: &[&str] = &[
    "script", "style", "iframe", "object", "embed", "noscript", "template",
];

/// URL schemes removed wherever they appear.
const BLOCKED_SCHEMES: &[&str] = &["javascript:", "vbscript:"];

/// Strip markup and scriptable content from `input`.
pub fn sanitize_text(input: &str) -> String {
    // Control characters go first so they cannot split a tag or scheme
    // that would reassemble once they are removed.
    let cleaned: String = input
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
        .collect();
    let stripped = strip_markup(&cleaned);
    strip_schemes(&stripped).trim().to_string()
}

/// Sanitize every string value in a field map. Numbers pass through.
pub fn sanitize_fields(fields: &Map<String, Value>) -> Map<String, Value> {
    fields
        .iter()
        .map(|(k, v)| {
            let v = match v {
                Value::String(s) => Value::String(sanitize_text(s)),
                other => other.clone(),
            };
            (k.clone(), v)
        })
        .collect()
}

fn strip_markup(input: &str) -> String {
    // ASCII lowercasing keeps byte offsets identical to `input`.
    let lower = input.to_ascii_lowercase();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;

    while i < input.len() {
        let rest = &input[i..];
        if !rest.starts_with('<') {
            if let Some(c) = rest.chars().next() {
                out.push(c);
                i += c.len_utf8();
            }
            continue;
        }

        let lrest = &lower[i..];

        if lrest.starts_with("<!--") {
            match lrest[4..].find("-->") {
                Some(end) => {
                    i += 4 + end + 3;
                    continue;
                }
                None => break,
            }
        }

        if !starts_tag(lrest) {
            out.push('<');
            i += 1;
            continue;
        }

        // Unterminated tag: nothing after it can be trusted.
        let Some(gt) = find_tag_end(lrest) else {
            break;
        };
        let closing = lrest[1..].starts_with('/');
        let name = tag_name(lrest);
        i += gt + 1;

        if !closing && DROP_WITH_CONTENT.contains(&name) {
            let end_tag = format!("</{}", name);
            match lower[i..].find(&end_tag) {
                Some(pos) => {
                    let after = i + pos;
                    match find_tag_end(&lower[after..]) {
                        Some(gt) => i = after + gt + 1,
                        None => break,
                    }
                }
                None => break,
            }
        }
    }

    out
}

/// `<` followed by a letter, `/letter`, `!` or `?` opens a tag; anything
/// else (`1 < 2`) is literal text.
fn starts_tag(s: &str) -> bool {
    let mut chars = s.chars().skip(1);
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '!' || c == '?' => true,
        Some('/') => chars.next().is_some_and(|c| c.is_ascii_alphabetic()),
        _ => false,
    }
}

/// Byte offset of the `>` closing the tag at the start of `s`, skipping
/// quoted attribute values.
fn find_tag_end(s: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (idx, c) in s.char_indices().skip(1) {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(c),
            (None, '>') => return Some(idx),
            _ => {}
        }
    }
    None
}

fn tag_name(s: &str) -> &str {
    let body = s[1..].trim_start_matches('/');
    let end = body
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(body.len());
    &body[..end]
}

fn strip_schemes(input: &str) -> String {
    let mut current = input.to_string();
    // Repeat so that "javajavascript:script:" cannot reassemble.
    while let Some(range) = find_scheme(&current) {
        current.replace_range(range, "");
    }
    current
}

/// Byte range of the first blocked scheme in `s`. Tabs and line breaks
/// inside the scheme are skipped, as URL parsers drop them.
fn find_scheme(s: &str) -> Option<Range<usize>> {
    let bytes = s.as_bytes();
    (0..bytes.len()).find_map(|start| {
        BLOCKED_SCHEMES.iter().find_map(|scheme| {
            let mut pos = start;
            for expected in scheme.bytes() {
                while pos > start && matches!(bytes.get(pos), Some(b'\t' | b'\n' | b'\r')) {
                    pos += 1;
                }
                if !bytes.get(pos).is_some_and(|b| b.eq_ignore_ascii_case(&expected)) {
                    return None;
                }
                pos += 1;
            }
            Some(start..pos)
        })
    })
}
