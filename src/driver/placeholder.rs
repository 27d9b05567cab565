//! Rewriting of backend-neutral `$[n]` parameter markers
//!
//! Test descriptions number their parameters as `$[1]`, `$[2]`, ... so the
//! same query text works against any driver. Each driver declares the
//! marker syntax it binds with; [`adjust_placeholders`] rewrites the query
//! accordingly. Markers inside single-quoted string literals are data, not
//! parameters, and are left alone.

use std::borrow::Cow;

/// Positional marker syntax understood by a driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaceholderStyle {
    /// `$1`, `$2`, ... keeping the written ordinal
    #[default]
    Dollar,
    /// `%s` for every marker; binding follows textual order
    Format,
}

/// Rewrite every `$[n]` outside string literals into the driver's syntax
pub fn adjust_placeholders(query: &str, style: PlaceholderStyle) -> Cow<'_, str> {
    if !query.contains("$[") {
        return Cow::Borrowed(query);
    }

    let bytes = query.as_bytes();
    let mut out = String::with_capacity(query.len());
    let mut copied = 0;
    let mut in_literal = false;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            // A doubled quote inside a literal toggles twice and stays inside
            b'\'' => {
                in_literal = !in_literal;
                i += 1;
            }
            b'$' if !in_literal => match marker_at(bytes, i) {
                Some((digits_end, end)) => {
                    out.push_str(&query[copied..i]);
                    match style {
                        PlaceholderStyle::Dollar => {
                            out.push('$');
                            out.push_str(&query[i + 2..digits_end]);
                        }
                        PlaceholderStyle::Format => out.push_str("%s"),
                    }
                    copied = end;
                    i = end;
                }
                None => i += 1,
            },
            _ => i += 1,
        }
    }

    if copied == 0 {
        return Cow::Borrowed(query);
    }
    out.push_str(&query[copied..]);
    Cow::Owned(out)
}

/// If a `$[digits]` marker starts at `start`, return the index where the
/// digits end and the index just past the closing bracket
fn marker_at(bytes: &[u8], start: usize) -> Option<(usize, usize)> {
    if bytes.get(start + 1) != Some(&b'[') {
        return None;
    }
    let digits_start = start + 2;
    let mut j = digits_start;
    while j < bytes.len() && bytes[j].is_ascii_digit() {
        j += 1;
    }
    if j == digits_start || bytes.get(j) != Some(&b']') {
        return None;
    }
    Some((j, j + 1))
}
