use std::borrow::Cow;

use gotmpl_check_expr::{ExprError, Inferencer, ResolveError, parse_expr};
use gotmpl_check_template::{
    Action, BlockClose, BlockKind, BlockOpen, DeclOp, Declaration, ParseError, ParseIssue,
    ParsedTemplate, Path, PathRoot, Position, TemplateNode,
};
use gotmpl_check_types::{INT, TypeNode};
use tracing::{debug, trace};

use crate::scope::{FrameKind, ScopeStack, reborrow};
use crate::{
    Analysis, AnalyzerOptions, BlockContext, Context, DependencyEdge, DependencyKind,
    DependencySink, Diagnostic, DiagnosticKind, Severity,
};

pub(crate) fn run(
    options: &AnalyzerOptions,
    parsed: &ParsedTemplate,
    ctx: &Context<'_>,
    sink: &mut dyn DependencySink,
) -> Analysis {
    let mut walker = Walker::new(options, ctx, sink);
    walker.issues(&parsed.issues);
    walker.walk(&parsed.nodes, None);
    walker.finish()
}

fn unknown<'t>() -> Cow<'t, TypeNode> {
    Cow::Owned(TypeNode::unknown())
}

// ---------------------------------------------------------------------------

/// A construct with a body that has not seen its `end` yet.
#[derive(Debug, Clone, Copy)]
struct OpenGroup {
    kind: BlockKind,
    /// Whether the construct pushed a frame that `end` has to pop.
    pushed: bool,
}

pub(crate) struct Walker<'t, 'a> {
    options: &'a AnalyzerOptions,
    file: &'a str,
    stack: ScopeStack<'t>,
    groups: Vec<OpenGroup>,
    diagnostics: Vec<Diagnostic>,
    sink: &'a mut dyn DependencySink,
    actions_checked: usize,
}

impl<'t, 'a> Walker<'t, 'a> {
    pub(crate) fn new(
        options: &'a AnalyzerOptions,
        ctx: &'a Context<'t>,
        sink: &'a mut dyn DependencySink,
    ) -> Self {
        let mut stack = match ctx.dot {
            Some(dot) => ScopeStack::with_dot(ctx.root, Cow::Borrowed(dot)),
            None => ScopeStack::new(ctx.root),
        };
        for (name, ty) in &ctx.locals {
            stack.bind(name.clone(), Cow::Owned(ty.clone()));
        }
        Self {
            options,
            file: &ctx.file,
            stack,
            groups: Vec::new(),
            diagnostics: Vec::new(),
            sink,
            actions_checked: 0,
        }
    }

    pub(crate) fn stack(&self) -> &ScopeStack<'t> {
        &self.stack
    }

    /// Walks `nodes` in order. With `stop`, the walk ends right before that
    /// node, leaving the scope exactly as the node itself would see it.
    pub(crate) fn walk(&mut self, nodes: &[TemplateNode], stop: Option<usize>) {
        for (index, node) in nodes.iter().enumerate() {
            if stop == Some(index) {
                if matches!(node, TemplateNode::BlockOpen(open) if open.kind.is_branch()) {
                    self.enter_branch();
                }
                return;
            }
            match node {
                TemplateNode::Action(action) => self.action(action),
                TemplateNode::BlockOpen(open) => self.open(open),
                TemplateNode::BlockClose(close) => self.close(close),
                TemplateNode::Text(_)
                | TemplateNode::Comment(_)
                | TemplateNode::LoopControl(_)
                | TemplateNode::Malformed(_) => {}
            }
        }
    }

    pub(crate) fn finish(mut self) -> Analysis {
        self.diagnostics.sort_by_key(|d| (d.line, d.col));
        debug!(
            file = self.file,
            diagnostics = self.diagnostics.len(),
            actions = self.actions_checked,
            depth = self.stack.depth(),
            "template analyzed"
        );
        Analysis {
            diagnostics: self.diagnostics,
            edges: Vec::new(),
            actions_checked: self.actions_checked,
        }
    }

    fn issues(&mut self, issues: &[ParseIssue]) {
        for issue in issues {
            let severity = match issue.error {
                ParseError::UnsupportedElse { .. } => Severity::Warning,
                _ => Severity::Error,
            };
            self.report(
                DiagnosticKind::MalformedExpression,
                severity,
                issue.error.to_string(),
                issue.raw.trim().to_string(),
                issue.pos,
                &issue.raw,
            );
        }
    }

    // -----------------------------------------------------------------------
    // Nodes
    // -----------------------------------------------------------------------

    fn action(&mut self, action: &Action) {
        if action.expr.trim().is_empty() {
            return;
        }
        let ty = self.pipeline(&action.expr, action.path.as_ref(), action.pos, &action.raw);
        if let Some(decl) = &action.decl {
            self.declare(decl, ty, action.pos, &action.raw);
        }
    }

    fn open(&mut self, open: &BlockOpen) {
        match open.kind {
            BlockKind::Range => {
                let elem = match self.header(open) {
                    Some(ty) => self.element_of(ty, open),
                    None => unknown(),
                };
                self.stack.push(FrameKind::Range, reborrow(&elem));
                self.groups.push(OpenGroup {
                    kind: open.kind,
                    pushed: true,
                });
                if let Some(decl) = &open.decl {
                    self.declare_range(decl, elem, open);
                }
            }
            BlockKind::With => {
                let ty = self.header(open).unwrap_or_else(unknown);
                self.stack.push(FrameKind::With, reborrow(&ty));
                self.groups.push(OpenGroup {
                    kind: open.kind,
                    pushed: true,
                });
                if let Some(decl) = &open.decl {
                    self.declare(decl, Some(ty), open.pos, &open.raw);
                }
            }
            BlockKind::If => {
                let ty = self.header(open);
                self.groups.push(OpenGroup {
                    kind: open.kind,
                    pushed: false,
                });
                if let Some(decl) = &open.decl {
                    self.ensure_frame();
                    self.declare(decl, ty, open.pos, &open.raw);
                }
            }
            BlockKind::ElseIf | BlockKind::Else => {
                if open.group.is_none() {
                    return;
                }
                self.enter_branch();
                if open.kind == BlockKind::ElseIf {
                    let ty = self.header(open);
                    if let Some(decl) = &open.decl {
                        self.ensure_frame();
                        self.declare(decl, ty, open.pos, &open.raw);
                    }
                }
            }
            BlockKind::Define => {
                self.edge(open, DependencyKind::Define, None);
                let root = self.stack.permanent_root();
                self.stack.push_detached(FrameKind::Define, Cow::Borrowed(root));
                self.groups.push(OpenGroup {
                    kind: open.kind,
                    pushed: true,
                });
            }
            BlockKind::Block => {
                let dot = if open.expr.trim().is_empty() {
                    match self.options.block_context {
                        BlockContext::Root => Cow::Borrowed(self.stack.permanent_root()),
                        BlockContext::Inherit => reborrow(&self.stack.top().dot),
                    }
                } else {
                    self.header(open).unwrap_or_else(unknown)
                };
                self.edge(open, DependencyKind::Block, Some(&dot));
                self.stack.push_detached(FrameKind::Block, dot);
                self.groups.push(OpenGroup {
                    kind: open.kind,
                    pushed: true,
                });
            }
            BlockKind::Template => {
                let ty = if open.expr.trim().is_empty() {
                    None
                } else {
                    self.header(open)
                };
                self.edge(open, DependencyKind::Template, ty.as_deref());
            }
        }
    }

    fn close(&mut self, close: &BlockClose) {
        if close.open.is_none() {
            return;
        }
        let Some(group) = self.groups.pop() else {
            return;
        };
        trace!(kind = %group.kind, pushed = group.pushed, "close construct");
        if group.pushed {
            self.stack.pop();
        }
    }

    /// Switches to a sibling branch. Never pushes.
    fn enter_branch(&mut self) {
        if matches!(
            self.groups.last(),
            Some(OpenGroup {
                kind: BlockKind::Range | BlockKind::With,
                pushed: true,
            })
        ) {
            self.stack.enter_else();
        }
    }

    /// Gives the innermost `if` group its own frame for declared variables.
    fn ensure_frame(&mut self) {
        let Some(group) = self.groups.last_mut() else {
            return;
        };
        if !group.pushed {
            group.pushed = true;
            let dot = reborrow(&self.stack.top().dot);
            self.stack.push(FrameKind::If, dot);
        }
    }

    fn header(&mut self, open: &BlockOpen) -> Option<Cow<'t, TypeNode>> {
        if open.expr.trim().is_empty() {
            return None;
        }
        self.pipeline(&open.expr, open.path.as_ref(), open.pos, &open.raw)
    }

    fn element_of(&mut self, ty: Cow<'t, TypeNode>, open: &BlockOpen) -> Cow<'t, TypeNode> {
        if ty.is_unknown() {
            return unknown();
        }
        if !ty.is_iterable() {
            self.report(
                DiagnosticKind::NotIterable,
                Severity::Error,
                format!("cannot range over `{}` of type `{ty}`", open.expr.trim()),
                open.expr.trim().to_string(),
                open.pos,
                &open.raw,
            );
            return unknown();
        }
        match ty {
            Cow::Borrowed(node) => node.element().map_or_else(unknown, Cow::Borrowed),
            Cow::Owned(node) => node
                .element()
                .map_or_else(unknown, |elem| Cow::Owned(elem.clone())),
        }
    }

    fn edge(&mut self, open: &BlockOpen, kind: DependencyKind, context: Option<&TypeNode>) {
        let Some(name) = &open.name else {
            return;
        };
        self.sink.edge(DependencyEdge {
            file: self.file.to_string(),
            name: name.clone(),
            kind,
            context: open.expr.trim().to_string(),
            context_type: context.map(|ty| ty.type_label.clone()),
            line: open.pos.line,
            col: open.pos.col,
        });
    }

    // -----------------------------------------------------------------------
    // Declarations
    // -----------------------------------------------------------------------

    fn declare(
        &mut self,
        decl: &Declaration,
        ty: Option<Cow<'t, TypeNode>>,
        pos: Position,
        raw: &str,
    ) {
        match decl.op {
            DeclOp::Declare => {
                let ty = ty.unwrap_or_else(unknown);
                for var in &decl.vars {
                    self.stack.bind(var.clone(), reborrow(&ty));
                }
            }
            DeclOp::Assign => self.check_assigned(decl, pos, raw),
        }
    }

    /// `range $v := X` binds the element, `range $i, $v := X` the position
    /// and the element.
    fn declare_range(&mut self, decl: &Declaration, elem: Cow<'t, TypeNode>, open: &BlockOpen) {
        if decl.op == DeclOp::Assign {
            self.check_assigned(decl, open.pos, &open.raw);
            return;
        }
        match decl.vars.as_slice() {
            [value] => self.stack.bind(value.clone(), elem),
            [index, value] => {
                self.stack.bind(index.clone(), Cow::Owned(TypeNode::scalar("", INT)));
                self.stack.bind(value.clone(), elem);
            }
            vars => {
                for var in vars {
                    self.stack.bind(var.clone(), unknown());
                }
            }
        }
    }

    fn check_assigned(&mut self, decl: &Declaration, pos: Position, raw: &str) {
        for var in &decl.vars {
            if !self.stack.is_visible(var) {
                self.report(
                    DiagnosticKind::UndefinedVariable,
                    Severity::Error,
                    format!("undefined variable `${var}`"),
                    format!("${var}"),
                    pos,
                    raw,
                );
            }
        }
    }

    // -----------------------------------------------------------------------
    // Pipelines
    // -----------------------------------------------------------------------

    /// Checks one pipeline and returns its type if it resolved.
    fn pipeline(
        &mut self,
        expr: &str,
        path: Option<&Path>,
        pos: Position,
        raw: &str,
    ) -> Option<Cow<'t, TypeNode>> {
        self.actions_checked += 1;
        if let Some(path) = path {
            return match self.stack.resolve(path) {
                Ok(ty) => Some(ty),
                Err(err) => {
                    // a missing leading identifier is never rescued by inference
                    if err.depth().is_some_and(|depth| depth > 0) {
                        if let Ok(ty) =
                            Inferencer::new(&self.stack, &self.options.funcs).infer_text(expr)
                        {
                            debug!(expr, ty = %ty, "path resolved by inference");
                            return Some(Cow::Owned(ty.as_type_node()));
                        }
                    }
                    self.report_resolve(&err, path, pos, raw);
                    None
                }
            };
        }

        let parsed = match parse_expr(expr) {
            Ok(parsed) => parsed,
            Err(err) => {
                self.report(
                    DiagnosticKind::MalformedExpression,
                    Severity::Error,
                    err.to_string(),
                    expr.trim().to_string(),
                    pos,
                    raw,
                );
                return None;
            }
        };

        let mut resolved = true;
        for (path, _) in parsed.paths() {
            if let Err(err) = self.stack.resolve(path) {
                self.report_resolve(&err, path, pos, raw);
                resolved = false;
            }
        }
        if self.options.report_unknown_functions {
            for (func, _) in parsed.calls() {
                if !self.options.funcs.contains(func) {
                    self.report(
                        DiagnosticKind::UnknownFunction,
                        Severity::Warning,
                        format!("function `{func}` is not in the function table"),
                        func.to_string(),
                        pos,
                        raw,
                    );
                }
            }
        }
        if !resolved {
            return None;
        }

        match Inferencer::new(&self.stack, &self.options.funcs).infer(&parsed) {
            Ok(ty) => {
                trace!(expr, ty = %ty, "inferred");
                Some(Cow::Owned(ty.as_type_node()))
            }
            // field chains on sub-expressions and `index` on non-containers
            Err(ExprError::Resolve(
                err @ (ResolveError::UndefinedField { .. } | ResolveError::NotIndexable { .. }),
            )) => {
                let variable = match &err {
                    ResolveError::UndefinedField { field, .. } => format!(".{field}"),
                    _ => expr.trim().to_string(),
                };
                self.report(
                    DiagnosticKind::UndefinedField,
                    Severity::Error,
                    err.to_string(),
                    variable,
                    pos,
                    raw,
                );
                None
            }
            Err(err @ ExprError::NotIndexable { .. }) => {
                self.report(
                    DiagnosticKind::UndefinedField,
                    Severity::Error,
                    err.to_string(),
                    expr.trim().to_string(),
                    pos,
                    raw,
                );
                None
            }
            Err(err) => {
                trace!(expr, %err, "not resolved");
                None
            }
        }
    }

    fn report_resolve(&mut self, err: &ResolveError, path: &Path, pos: Position, raw: &str) {
        let (kind, message) = match err {
            ResolveError::UndefinedVariable { .. } => {
                (DiagnosticKind::UndefinedVariable, err.to_string())
            }
            ResolveError::UndefinedField { depth: 0, .. }
                if path.root == PathRoot::Root
                    || (path.root == PathRoot::Dot && self.stack.dot_is_root()) =>
            {
                let ident = path.leading_identifier().unwrap_or_default();
                (
                    DiagnosticKind::UndefinedVariable,
                    format!("undefined variable `{ident}`"),
                )
            }
            ResolveError::UndefinedField { .. } | ResolveError::NotIndexable { .. } => {
                (DiagnosticKind::UndefinedField, err.to_string())
            }
        };
        self.report(kind, Severity::Error, message, path.to_string(), pos, raw);
    }

    fn report(
        &mut self,
        kind: DiagnosticKind,
        severity: Severity,
        message: String,
        variable: String,
        pos: Position,
        raw: &str,
    ) {
        trace!(?kind, %message, line = pos.line, col = pos.col, "diagnostic");
        self.diagnostics.push(Diagnostic {
            kind,
            message,
            file: self.file.to_string(),
            line: pos.line,
            col: pos.col,
            severity,
            variable,
            raw: raw.to_string(),
        });
    }
}
