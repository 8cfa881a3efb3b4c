//! Path-segment escaping for tag and value names.
//!
//! A name may contain `/` or `\`, neither of which can appear in a path
//! segment as-is. Each is rendered as a zero-width space followed by a
//! look-alike character.

const ZERO_WIDTH_SPACE: char = '\u{200B}';
const DIVISION_SLASH: char = '\u{2215}';
const SET_MINUS: char = '\u{2216}';

/// Render a tag or value name as a path segment.
#[must_use]
pub fn escape(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '/' => {
                out.push(ZERO_WIDTH_SPACE);
                out.push(DIVISION_SLASH);
            }
            '\\' => {
                out.push(ZERO_WIDTH_SPACE);
                out.push(SET_MINUS);
            }
            other => out.push(other),
        }
    }
    out
}

/// Recover the name a path segment was rendered from.
#[must_use]
pub fn unescape(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    let mut chars = segment.chars().peekable();
    while let Some(c) = chars.next() {
        if c == ZERO_WIDTH_SPACE {
            match chars.peek() {
                Some(&DIVISION_SLASH) => {
                    chars.next();
                    out.push('/');
                    continue;
                }
                Some(&SET_MINUS) => {
                    chars.next();
                    out.push('\\');
                    continue;
                }
                _ => {}
            }
        }
        out.push(c);
    }
    out
}
