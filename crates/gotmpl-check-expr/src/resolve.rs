use std::borrow::Cow;

use gotmpl_check_template::{Path, PathRoot, Segment};
use gotmpl_check_types::{STRING, TypeNode};

/// Name lookup context for path resolution.
pub trait Scope {
    /// Type currently addressed by `.`.
    fn dot(&self) -> &TypeNode;
    /// Type addressed by `$`, fixed for the whole walk.
    fn root(&self) -> &TypeNode;
    /// Type bound to `$name`, searching enclosing frames.
    fn lookup_var(&self, name: &str) -> Option<&TypeNode>;
}

/// A lone type tree is a scope where dot and root coincide and no locals exist.
impl Scope for TypeNode {
    fn dot(&self) -> &TypeNode {
        self
    }

    fn root(&self) -> &TypeNode {
        self
    }

    fn lookup_var(&self, _name: &str) -> Option<&TypeNode> {
        None
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("undefined variable `${name}`")]
    UndefinedVariable { name: String },

    #[error("`{field}` is not a field of `{on}`")]
    UndefinedField {
        field: String,
        on: String,
        /// Index of the failing segment within the path.
        depth: usize,
    },

    #[error("cannot index `{on}` with `{key}`")]
    NotIndexable {
        key: String,
        on: String,
        depth: usize,
    },
}

impl ResolveError {
    /// Index of the failing segment, `None` for an unbound variable.
    pub fn depth(&self) -> Option<usize> {
        match self {
            Self::UndefinedVariable { .. } => None,
            Self::UndefinedField { depth, .. } | Self::NotIndexable { depth, .. } => Some(*depth),
        }
    }
}

enum Step<'t> {
    Node(&'t TypeNode),
    Unknown,
    Owned(TypeNode),
}

fn step<'t>(node: &'t TypeNode, segment: &Segment, depth: usize) -> Result<Step<'t>, ResolveError> {
    if node.is_unknown() {
        return Ok(Step::Unknown);
    }
    let element = || node.element().map_or(Step::Unknown, Step::Node);
    match segment {
        Segment::Field(name) => {
            if let Some(field) = node.field(name) {
                Ok(Step::Node(field))
            } else if node.is_map {
                // `.key` on a map reads the entry
                Ok(element())
            } else {
                Err(ResolveError::UndefinedField {
                    field: name.clone(),
                    on: node.type_label.clone(),
                    depth,
                })
            }
        }
        Segment::Index(key) => {
            if node.is_iterable() {
                Ok(element())
            } else if node.type_label == STRING {
                Ok(Step::Owned(TypeNode::scalar("", "uint8")))
            } else {
                Err(ResolveError::NotIndexable {
                    key: key.clone(),
                    on: node.type_label.clone(),
                    depth,
                })
            }
        }
    }
}

/// Walks `segments` one at a time starting at `base`.
///
/// Once an unknown type is reached every further segment resolves to unknown.
///
/// # Errors
///
/// Returns the first segment that does not exist on its parent type.
pub fn descend<'t>(
    base: Cow<'t, TypeNode>,
    segments: &[Segment],
) -> Result<Cow<'t, TypeNode>, ResolveError> {
    let mut current = base;
    for (depth, segment) in segments.iter().enumerate() {
        current = match current {
            Cow::Borrowed(node) => match step(node, segment, depth)? {
                Step::Node(next) => Cow::Borrowed(next),
                Step::Unknown => Cow::Owned(TypeNode::unknown()),
                Step::Owned(next) => Cow::Owned(next),
            },
            Cow::Owned(node) => match step(&node, segment, depth)? {
                Step::Node(next) => Cow::Owned(next.clone()),
                Step::Unknown => Cow::Owned(TypeNode::unknown()),
                Step::Owned(next) => Cow::Owned(next),
            },
        };
    }
    Ok(current)
}

/// Resolves `path` against `scope`. `$` always addresses the scope's root.
///
/// # Errors
///
/// Returns an error for unbound variables and missing fields.
pub fn resolve_path<'t, S: Scope + ?Sized>(
    path: &Path,
    scope: &'t S,
) -> Result<Cow<'t, TypeNode>, ResolveError> {
    let base = match &path.root {
        PathRoot::Dot => scope.dot(),
        PathRoot::Root => scope.root(),
        PathRoot::Var(name) => scope
            .lookup_var(name)
            .ok_or_else(|| ResolveError::UndefinedVariable { name: name.clone() })?,
    };
    descend(Cow::Borrowed(base), &path.segments)
}
