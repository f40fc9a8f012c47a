//! Static validation of variable references in Go templates.
//!
//! A single left-to-right walk over the parsed node sequence maintains a
//! [`ScopeStack`] mirroring the template's block structure and checks every
//! path and pipeline against the caller-supplied type tree. Problems become
//! [`Diagnostic`]s; nothing aborts the walk.

mod query;
pub mod scope;
mod validator;

pub use query::{Completion, CompletionKind, Hover};
pub use scope::{FrameKind, ScopeFrame, ScopeStack};

use serde::{Deserialize, Serialize};

use gotmpl_check_expr::FuncTable;
use gotmpl_check_template::{ParseOptions, ParsedTemplate, Position};
use gotmpl_check_types::TypeNode;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Dot of a `block` that passes no pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockContext {
    /// `{{ block "x" }}` sees the root type.
    #[default]
    Root,
    /// `{{ block "x" }}` sees the enclosing dot.
    Inherit,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerOptions {
    pub parse: ParseOptions,
    pub block_context: BlockContext,
    /// Warn about calls to functions missing from `funcs`.
    pub report_unknown_functions: bool,
    pub funcs: FuncTable,
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => f.write_str("error"),
            Self::Warning => f.write_str("warning"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Leading identifier not found in any reachable scope.
    UndefinedVariable,
    /// Valid base, invalid field or method segment.
    UndefinedField,
    /// `range` over something that is neither slice nor map.
    NotIterable,
    /// Syntax error inside or around an action.
    MalformedExpression,
    /// `template` call without a matching `define`/`block`. Only produced by
    /// whole-project checks, never by a single-template walk.
    UnresolvedTemplateCall,
    /// Call to a function outside the function table.
    UnknownFunction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub file: String,
    pub line: usize,
    pub col: usize,
    pub severity: Severity,
    /// The offending path or identifier, e.g. `.User.Nmae`.
    pub variable: String,
    /// Raw text of the whole action, delimiters included.
    pub raw: String,
}

impl Diagnostic {
    pub fn pos(&self) -> Position {
        Position::new(self.line, self.col)
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}: {}",
            self.file, self.line, self.col, self.severity, self.message
        )
    }
}

// ---------------------------------------------------------------------------
// Dependency edges
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    Define,
    Block,
    Template,
}

/// One `define`, `block` or `template` occurrence.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub file: String,
    pub name: String,
    pub kind: DependencyKind,
    /// Pipeline text passed as the new dot, empty if none.
    pub context: String,
    /// Type label of the passed context when it resolved.
    pub context_type: Option<String>,
    pub line: usize,
    pub col: usize,
}

/// Receives dependency edges as the walk encounters them.
pub trait DependencySink {
    fn edge(&mut self, edge: DependencyEdge);
}

impl DependencySink for Vec<DependencyEdge> {
    fn edge(&mut self, edge: DependencyEdge) {
        self.push(edge);
    }
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

/// Type context a template is checked in.
#[derive(Debug, Clone)]
pub struct Context<'t> {
    pub file: String,
    pub root: &'t TypeNode,
    /// Initial dot, the root if `None`.
    pub dot: Option<&'t TypeNode>,
    /// Variables already bound when the template starts.
    pub locals: Vec<(String, TypeNode)>,
}

impl<'t> Context<'t> {
    pub fn new(file: impl Into<String>, root: &'t TypeNode) -> Self {
        Self {
            file: file.into(),
            root,
            dot: None,
            locals: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_dot(mut self, dot: &'t TypeNode) -> Self {
        self.dot = Some(dot);
        self
    }

    #[must_use]
    pub fn with_local(mut self, name: impl Into<String>, ty: TypeNode) -> Self {
        self.locals.push((name.into(), ty));
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    /// Ordered by position.
    pub diagnostics: Vec<Diagnostic>,
    pub edges: Vec<DependencyEdge>,
    /// Actions and block headers whose pipeline was checked.
    pub actions_checked: usize,
}

impl Analysis {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Analyzer {
    options: AnalyzerOptions,
}

impl Analyzer {
    pub fn new(options: AnalyzerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &AnalyzerOptions {
        &self.options
    }

    pub fn parse(&self, source: &str) -> ParsedTemplate {
        gotmpl_check_template::parse_with_options(source, &self.options.parse)
    }

    /// Parses and analyzes `source`.
    pub fn check(&self, source: &str, ctx: &Context<'_>) -> Analysis {
        self.analyze(&self.parse(source), ctx)
    }

    /// Analyzes a parsed template, collecting edges into the result.
    pub fn analyze(&self, parsed: &ParsedTemplate, ctx: &Context<'_>) -> Analysis {
        let mut edges = Vec::new();
        let mut analysis = self.analyze_with_sink(parsed, ctx, &mut edges);
        analysis.edges = edges;
        analysis
    }

    /// Analyzes a parsed template, handing edges to `sink` instead of the
    /// result.
    pub fn analyze_with_sink(
        &self,
        parsed: &ParsedTemplate,
        ctx: &Context<'_>,
        sink: &mut dyn DependencySink,
    ) -> Analysis {
        validator::run(&self.options, parsed, ctx, sink)
    }

    /// Diagnostics for `parsed` rendered against `root`.
    pub fn validate(&self, parsed: &ParsedTemplate, root: &TypeNode, file: &str) -> Vec<Diagnostic> {
        self.analyze(parsed, &Context::new(file, root)).diagnostics
    }
}

/// Validates with default options.
pub fn validate(parsed: &ParsedTemplate, root: &TypeNode, file: &str) -> Vec<Diagnostic> {
    Analyzer::default().validate(parsed, root, file)
}

#[cfg(test)]
mod tests;
