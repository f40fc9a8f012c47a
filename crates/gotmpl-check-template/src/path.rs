use serde::{Deserialize, Serialize};

/// What the first segment of a [`Path`] is looked up in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "name", rename_all = "snake_case")]
pub enum PathRoot {
    /// `.`: the current dot context.
    Dot,
    /// `$`: the permanent root context.
    Root,
    /// `$name`: a local binding.
    Var(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Segment {
    Field(String),
    /// `[0]` or `["key"]`, raw key text without brackets.
    Index(String),
}

impl Segment {
    pub fn as_str(&self) -> &str {
        match self {
            Segment::Field(name) | Segment::Index(name) => name,
        }
    }
}

/// A dotted/indexed access chain such as `.User.Orders[0].Total` or `$x.Name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Path {
    pub root: PathRoot,
    pub segments: Vec<Segment>,
}

impl Path {
    pub fn new(root: PathRoot, segments: Vec<Segment>) -> Self {
        Self { root, segments }
    }

    pub fn dot() -> Self {
        Self::new(PathRoot::Dot, Vec::new())
    }

    /// Name of the first identifier the path depends on: the first field for
    /// `.A.B`, the variable for `$x.A`.
    pub fn leading_identifier(&self) -> Option<&str> {
        match &self.root {
            PathRoot::Var(name) => Some(name),
            PathRoot::Dot | PathRoot::Root => self.segments.first().map(Segment::as_str),
        }
    }

    /// The first `n` segments of this path.
    #[must_use]
    pub fn prefix(&self, n: usize) -> Self {
        Self::new(
            self.root.clone(),
            self.segments.iter().take(n).cloned().collect(),
        )
    }
}

impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.root {
            PathRoot::Dot => {
                if self.segments.is_empty() {
                    return f.write_str(".");
                }
            }
            PathRoot::Root => f.write_str("$")?,
            PathRoot::Var(name) => write!(f, "${name}")?,
        }
        for seg in &self.segments {
            match seg {
                Segment::Field(name) => write!(f, ".{name}")?,
                Segment::Index(key) => write!(f, "[{key}]")?,
            }
        }
        Ok(())
    }
}

pub(crate) fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

pub(crate) fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn take_ident(s: &str) -> (&str, &str) {
    let end = s
        .char_indices()
        .find(|(i, c)| {
            if *i == 0 {
                !is_ident_start(*c)
            } else {
                !is_ident_continue(*c)
            }
        })
        .map_or(s.len(), |(i, _)| i);
    s.split_at(end)
}

/// Parses `text` as a single path, or `None` if it is anything else
/// (a call, a pipeline, a literal, ...).
pub fn parse_path(text: &str) -> Option<Path> {
    let text = text.trim();
    let (root, mut rest) = if let Some(after) = text.strip_prefix('$') {
        let (name, rest) = take_ident(after);
        if name.is_empty() {
            (PathRoot::Root, after)
        } else {
            (PathRoot::Var(name.to_string()), rest)
        }
    } else if text.starts_with('.') {
        (PathRoot::Dot, text)
    } else {
        return None;
    };

    if root == PathRoot::Dot && rest == "." {
        return Some(Path::dot());
    }

    let mut segments = Vec::new();
    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('.') {
            let (name, tail) = take_ident(after);
            if name.is_empty() {
                return None;
            }
            segments.push(Segment::Field(name.to_string()));
            rest = tail;
        } else if let Some(after) = rest.strip_prefix('[') {
            let close = index_close(after)?;
            let key = after[..close].trim();
            if key.is_empty() {
                return None;
            }
            segments.push(Segment::Index(key.to_string()));
            rest = &after[close + 1..];
        } else {
            return None;
        }
    }
    Some(Path::new(root, segments))
}

/// Position of the `]` closing an index, skipping a quoted key.
fn index_close(s: &str) -> Option<usize> {
    let mut quote = None;
    let mut esc = false;
    for (i, c) in s.char_indices() {
        match quote {
            Some(q) => {
                if esc {
                    esc = false;
                } else if c == '\\' {
                    esc = true;
                } else if c == q {
                    quote = None;
                }
            }
            None if c == '"' || c == '`' => quote = Some(c),
            None if c == ']' => return Some(i),
            None => {}
        }
    }
    None
}
