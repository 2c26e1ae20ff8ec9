use std::borrow::Cow;

use unicode_width::UnicodeWidthChar;

const ELLIPSIS: &str = "...";
const ELLIPSIS_WIDTH: usize = 3;

/// Flatten feed-supplied text into a single printable line.
///
/// Runs of whitespace (including newlines) become one space, and control
/// characters and ANSI escape sequences are dropped so remote content cannot
/// drive the terminal. Returns `Cow::Borrowed` when nothing changes.
pub fn one_line(s: &str) -> Cow<'_, str> {
    let clean = !s.contains("  ")
        && s == s.trim()
        && !s.chars().any(|c| c.is_control() || (c.is_whitespace() && c != ' '));
    if clean {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    let mut pending_space = false;

    while let Some(c) = chars.next() {
        if c == '\x1b' {
            skip_escape(&mut chars);
            continue;
        }
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if c.is_control() {
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.push(c);
    }

    Cow::Owned(out)
}

/// Consume the rest of an escape sequence after ESC.
///
/// CSI (`ESC [`) ends at a byte in `@..=~`; OSC (`ESC ]`) ends at BEL or
/// `ESC \`. A bare ESC swallows nothing else.
fn skip_escape(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) {
    match chars.peek() {
        Some('[') => {
            chars.next();
            for c in chars.by_ref() {
                if ('@'..='~').contains(&c) {
                    break;
                }
            }
        }
        Some(']') => {
            chars.next();
            while let Some(c) = chars.next() {
                if c == '\x07' {
                    break;
                }
                if c == '\x1b' && chars.peek() == Some(&'\\') {
                    chars.next();
                    break;
                }
            }
        }
        _ => {}
    }
}

/// Cut `s` to at most `max_width` terminal columns, marking the cut with `...`.
///
/// Wide characters (CJK, emoji) count as two columns. Widths too narrow for
/// the ellipsis get a plain cut.
pub fn truncate_to_width(s: &str, max_width: usize) -> Cow<'_, str> {
    let mut width = 0;
    let mut fits_with_ellipsis = 0;
    let budget = max_width.saturating_sub(ELLIPSIS_WIDTH);

    for (idx, c) in s.char_indices() {
        let w = c.width().unwrap_or(0);
        if width + w > max_width {
            if max_width <= ELLIPSIS_WIDTH {
                return Cow::Owned(s[..idx].to_string());
            }
            return Cow::Owned(format!("{}{}", &s[..fits_with_ellipsis], ELLIPSIS));
        }
        width += w;
        if width <= budget {
            fits_with_ellipsis = idx + c.len_utf8();
        }
    }

    Cow::Borrowed(s)
}
