//! Scanner for template actions.
//!
//! Recognizes `{{ ... }}`, `{{- ... -}}` and `{{/* ... */}}` (or the configured
//! delimiters) and keeps byte ranges. Inside an action it respects `"..."`,
//! `'.'` and `` `...` `` literals so a closing delimiter inside a literal does
//! not terminate the action.

use crate::{Delimiters, Span};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionBlock {
    pub start: usize,       // byte offset of the left delimiter
    pub end: usize,         // byte offset AFTER the right delimiter
    pub inner_start: usize, // first byte after the delimiter and trim marker
    pub inner_end: usize,   // first byte of the trim marker or right delimiter
    pub trim_left: bool,
    pub trim_right: bool,
    pub comment: bool,
}

impl ActionBlock {
    pub fn span(&self) -> Span {
        Span::new(self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanFailure {
    UnterminatedAction,
    UnterminatedString,
    UnclosedComment,
    CommentWithoutDelimiter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scanned {
    Block(ActionBlock),
    Malformed { span: Span, reason: ScanFailure },
}

fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n')
}

fn find_raw(b: &[u8], from: usize, pat: &[u8]) -> Option<usize> {
    if pat.is_empty() || from > b.len() {
        return None;
    }
    b[from..]
        .windows(pat.len())
        .position(|w| w == pat)
        .map(|i| from + i)
}

/// Finds the right delimiter, skipping over string and character literals.
fn find_close(b: &[u8], from: usize, right: &[u8]) -> Option<usize> {
    let mut i = from;
    let mut quote: Option<u8> = None;
    let mut esc = false;
    while i < b.len() {
        let c = b[i];
        match quote {
            Some(b'`') => {
                if c == b'`' {
                    quote = None;
                }
            }
            Some(q) => {
                if esc {
                    esc = false;
                } else if c == b'\\' {
                    esc = true;
                } else if c == q {
                    quote = None;
                } else if c == b'\n' {
                    // interpreted literals cannot span lines
                    return None;
                }
            }
            None => {
                if matches!(c, b'"' | b'\'' | b'`') {
                    quote = Some(c);
                } else if b[i..].starts_with(right) {
                    return Some(i);
                }
            }
        }
        i += 1;
    }
    None
}

pub fn scan_actions(src: &str, delims: &Delimiters) -> Vec<Scanned> {
    let b = src.as_bytes();
    let left = delims.left.as_bytes();
    let right = delims.right.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;

    while let Some(start) = find_raw(b, i, left) {
        let mut j = start + left.len();
        let mut trim_left = false;
        if b.get(j) == Some(&b'-') && b.get(j + 1).copied().is_some_and(is_space) {
            trim_left = true;
            j += 1;
        }
        let inner_start = j;

        let mut body = j;
        if trim_left {
            while body < b.len() && is_space(b[body]) {
                body += 1;
            }
        }

        if b[body..].starts_with(b"/*") {
            let Some(close_comment) = find_raw(b, body + 2, b"*/") else {
                out.push(Scanned::Malformed {
                    span: Span::new(start, b.len()),
                    reason: ScanFailure::UnclosedComment,
                });
                break;
            };
            let after = close_comment + 2;
            let (inner_end, trim_right, close) = if b[after..].starts_with(b" -")
                && b[after + 2..].starts_with(right)
            {
                (after, true, after + 2)
            } else if b[after..].starts_with(right) {
                (after, false, after)
            } else {
                out.push(Scanned::Malformed {
                    span: Span::new(start, after),
                    reason: ScanFailure::CommentWithoutDelimiter,
                });
                i = after;
                continue;
            };
            let end = close + right.len();
            out.push(Scanned::Block(ActionBlock {
                start,
                end,
                inner_start,
                inner_end,
                trim_left,
                trim_right,
                comment: true,
            }));
            i = end;
            continue;
        }

        match find_close(b, inner_start, right) {
            Some(close) => {
                let trim_right = close >= 2
                    && close - 1 > inner_start
                    && b[close - 1] == b'-'
                    && is_space(b[close - 2]);
                let inner_end = if trim_right { close - 1 } else { close };
                let end = close + right.len();
                out.push(Scanned::Block(ActionBlock {
                    start,
                    end,
                    inner_start,
                    inner_end,
                    trim_left,
                    trim_right,
                    comment: false,
                }));
                i = end;
            }
            None => match find_raw(b, inner_start, right) {
                Some(close) => {
                    let end = close + right.len();
                    out.push(Scanned::Malformed {
                        span: Span::new(start, end),
                        reason: ScanFailure::UnterminatedString,
                    });
                    i = end;
                }
                None => {
                    out.push(Scanned::Malformed {
                        span: Span::new(start, b.len()),
                        reason: ScanFailure::UnterminatedAction,
                    });
                    break;
                }
            },
        }
    }
    out
}
