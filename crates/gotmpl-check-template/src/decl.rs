use serde::{Deserialize, Serialize};

use crate::path::{is_ident_continue, is_ident_start};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclOp {
    /// `$x := ...`
    Declare,
    /// `$x = ...`
    Assign,
}

/// Variable binding at the head of a pipeline, e.g. `$i, $v :=` in
/// `range $i, $v := .Items`. Names are stored without the `$`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Declaration {
    pub vars: Vec<String>,
    pub op: DeclOp,
}

fn take_var(s: &str) -> Option<(&str, &str)> {
    let after = s.strip_prefix('$')?;
    let mut chars = after.char_indices();
    match chars.next() {
        Some((_, c)) if is_ident_start(c) => {}
        _ => return None,
    }
    let end = chars
        .find(|(_, c)| !is_ident_continue(*c))
        .map_or(after.len(), |(i, _)| i);
    Some((&after[..end], &after[end..]))
}

/// Splits a leading declaration off `text`.
///
/// Returns the declaration (if any) and the remaining pipeline text.
pub fn split_declaration(text: &str) -> (Option<Declaration>, &str) {
    fn parse(text: &str) -> Option<(Declaration, &str)> {
        let (first, rest) = take_var(text.trim_start())?;
        let mut vars = vec![first.to_string()];
        let mut rest = rest.trim_start();
        if let Some(after) = rest.strip_prefix(',') {
            let (second, tail) = take_var(after.trim_start())?;
            vars.push(second.to_string());
            rest = tail.trim_start();
        }
        if let Some(tail) = rest.strip_prefix(":=") {
            Some((
                Declaration {
                    vars,
                    op: DeclOp::Declare,
                },
                tail,
            ))
        } else if rest.starts_with('=') && !rest.starts_with("==") {
            Some((
                Declaration {
                    vars,
                    op: DeclOp::Assign,
                },
                &rest[1..],
            ))
        } else {
            None
        }
    }

    match parse(text) {
        Some((decl, rest)) => (Some(decl), rest.trim()),
        None => (None, text.trim()),
    }
}

/// Parses a leading `"..."` or `` `...` `` literal.
///
/// Returns the unquoted value and the text following the literal.
pub fn split_string_literal(text: &str) -> Option<(String, &str)> {
    let text = text.trim_start();
    if let Some(after) = text.strip_prefix('`') {
        let close = after.find('`')?;
        return Some((after[..close].to_string(), &after[close + 1..]));
    }
    let after = text.strip_prefix('"')?;
    let mut out = String::new();
    let mut chars = after.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Some((out, &after[i + 1..])),
            '\\' => {
                let (_, escaped) = chars.next()?;
                out.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '0' => '\0',
                    other => other,
                });
            }
            other => out.push(other),
        }
    }
    None
}
