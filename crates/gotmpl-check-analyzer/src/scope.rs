//! Scope stack tracking dot, `$` and local variables during a walk.

use std::borrow::Cow;
use std::collections::HashMap;

use gotmpl_check_expr::{ResolveError, Scope, descend};
use gotmpl_check_template::{Path, PathRoot};
use gotmpl_check_types::TypeNode;
use tracing::trace;

/// Construct that pushed a [`ScopeFrame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Root,
    Range,
    With,
    /// Only pushed for `if $x := ...`, so the binding ends at `end`.
    If,
    Define,
    Block,
}

#[derive(Debug, Clone)]
pub struct ScopeFrame<'t> {
    pub kind: FrameKind,
    pub dot: Cow<'t, TypeNode>,
    pub locals: HashMap<String, Cow<'t, TypeNode>>,
    /// Locals of enclosing frames are not visible from a detached frame.
    pub detached: bool,
    /// Dot of the enclosing frame, taken over by `else` branches of
    /// `with` and `range`.
    outer: Option<Cow<'t, TypeNode>>,
}

impl<'t> ScopeFrame<'t> {
    fn new(kind: FrameKind, dot: Cow<'t, TypeNode>) -> Self {
        Self {
            kind,
            dot,
            locals: HashMap::new(),
            detached: false,
            outer: None,
        }
    }
}

/// Copies a cow without cloning borrowed data.
pub(crate) fn reborrow<'t>(ty: &Cow<'t, TypeNode>) -> Cow<'t, TypeNode> {
    match ty {
        Cow::Borrowed(node) => Cow::Borrowed(*node),
        Cow::Owned(node) => Cow::Owned(node.clone()),
    }
}

/// Ordered stack of frames plus the permanent root addressed by `$`.
///
/// The bottom frame is created once and never popped. `$` does not read it:
/// the root is kept as its own reference so replacing the bottom frame's dot
/// (partial re-entry) cannot change what `$` means.
#[derive(Debug, Clone)]
pub struct ScopeStack<'t> {
    root: &'t TypeNode,
    frames: Vec<ScopeFrame<'t>>,
}

impl<'t> ScopeStack<'t> {
    pub fn new(root: &'t TypeNode) -> Self {
        Self::with_dot(root, Cow::Borrowed(root))
    }

    /// Starts the walk with a dot other than the root.
    pub fn with_dot(root: &'t TypeNode, dot: Cow<'t, TypeNode>) -> Self {
        Self {
            root,
            frames: vec![ScopeFrame::new(FrameKind::Root, dot)],
        }
    }

    pub fn permanent_root(&self) -> &'t TypeNode {
        self.root
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn top(&self) -> &ScopeFrame<'t> {
        // the root frame is never popped
        &self.frames[self.frames.len() - 1]
    }

    fn top_mut(&mut self) -> &mut ScopeFrame<'t> {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    pub fn frames(&self) -> &[ScopeFrame<'t>] {
        &self.frames
    }

    /// True while `.` addresses the permanent root.
    pub fn dot_is_root(&self) -> bool {
        std::ptr::eq(&*self.top().dot, self.root)
    }

    pub fn push(&mut self, kind: FrameKind, dot: Cow<'t, TypeNode>) {
        let outer = matches!(kind, FrameKind::Range | FrameKind::With)
            .then(|| reborrow(&self.top().dot));
        trace!(?kind, dot = %dot, depth = self.frames.len() + 1, "push frame");
        self.frames.push(ScopeFrame {
            outer,
            ..ScopeFrame::new(kind, dot)
        });
    }

    pub fn push_detached(&mut self, kind: FrameKind, dot: Cow<'t, TypeNode>) {
        trace!(?kind, dot = %dot, depth = self.frames.len() + 1, "push detached frame");
        self.frames.push(ScopeFrame {
            detached: true,
            ..ScopeFrame::new(kind, dot)
        });
    }

    /// Pops the innermost frame. The root frame stays.
    pub fn pop(&mut self) -> Option<ScopeFrame<'t>> {
        if self.frames.len() <= 1 {
            return None;
        }
        let frame = self.frames.pop();
        trace!(kind = ?frame.as_ref().map(|f| f.kind), depth = self.frames.len(), "pop frame");
        frame
    }

    /// Switches the innermost `with`/`range` frame to its `else` branch,
    /// where `.` is the enclosing dot again. No frame is pushed.
    pub fn enter_else(&mut self) {
        let top = self.top_mut();
        if let Some(outer) = &top.outer {
            top.dot = reborrow(outer);
        }
    }

    /// Declares `$name` in the innermost frame.
    pub fn bind(&mut self, name: impl Into<String>, ty: Cow<'t, TypeNode>) {
        let name = name.into();
        trace!(name = %name, ty = %ty, "bind variable");
        self.top_mut().locals.insert(name, ty);
    }

    fn visible_frames(&self) -> impl Iterator<Item = &ScopeFrame<'t>> {
        let cutoff = self
            .frames
            .iter()
            .rposition(|frame| frame.detached)
            .unwrap_or(0);
        self.frames[cutoff..].iter().rev()
    }

    fn lookup(&self, name: &str) -> Option<&Cow<'t, TypeNode>> {
        self.visible_frames()
            .find_map(|frame| frame.locals.get(name))
    }

    pub fn is_visible(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// All visible locals, inner declarations shadowing outer ones, sorted by name.
    pub fn visible_locals(&self) -> Vec<(&str, &TypeNode)> {
        let mut seen: HashMap<&str, &TypeNode> = HashMap::new();
        for frame in self.visible_frames() {
            for (name, ty) in &frame.locals {
                seen.entry(name.as_str()).or_insert(&**ty);
            }
        }
        let mut locals: Vec<_> = seen.into_iter().collect();
        locals.sort_by_key(|(name, _)| *name);
        locals
    }

    /// Resolves `path`, keeping borrows into the type tree where possible.
    ///
    /// # Errors
    ///
    /// Returns the first segment that does not resolve.
    pub fn resolve(&self, path: &Path) -> Result<Cow<'t, TypeNode>, ResolveError> {
        let base = match &path.root {
            PathRoot::Dot => reborrow(&self.top().dot),
            PathRoot::Root => Cow::Borrowed(self.root),
            PathRoot::Var(name) => reborrow(self.lookup(name).ok_or_else(|| {
                ResolveError::UndefinedVariable { name: name.clone() }
            })?),
        };
        descend(base, &path.segments)
    }
}

impl Scope for ScopeStack<'_> {
    fn dot(&self) -> &TypeNode {
        &self.top().dot
    }

    fn root(&self) -> &TypeNode {
        self.root
    }

    fn lookup_var(&self, name: &str) -> Option<&TypeNode> {
        self.lookup(name).map(|ty| &**ty)
    }
}
