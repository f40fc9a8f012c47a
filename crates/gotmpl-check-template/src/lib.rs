//! Go `text/template` / `html/template` parser for static analysis.
//!
//! Unlike the runtime parser this one never aborts: the template is turned into
//! a flat sequence of [`TemplateNode`]s, opening and closing constructs are
//! paired by nesting depth, and every problem is recorded as a [`ParseIssue`]
//! next to the node it concerns.

mod decl;
mod parse;
mod path;
mod position;
pub mod scan;

pub use decl::{DeclOp, Declaration, split_declaration, split_string_literal};
pub use parse::{parse, parse_with_options};
pub use path::{Path, PathRoot, Segment, parse_path};
pub use position::{LineIndex, Position, Span};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Delimiters {
    pub left: String,
    pub right: String,
}

impl Default for Delimiters {
    fn default() -> Self {
        Self {
            left: "{{".to_string(),
            right: "}}".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseOptions {
    #[serde(default)]
    pub delimiters: Delimiters,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParseError {
    #[error("unterminated action")]
    UnterminatedAction,

    #[error("unterminated quoted string in action")]
    UnterminatedString,

    #[error("unclosed comment")]
    UnclosedComment,

    #[error("comment ends before closing delimiter")]
    CommentWithoutDelimiter,

    #[error("empty action")]
    EmptyAction,

    #[error("missing value for `{keyword}`")]
    MissingPipeline { keyword: String },

    #[error("missing template name for `{keyword}`")]
    MissingTemplateName { keyword: String },

    #[error("unexpected `{clause}` outside of if/with/range")]
    UnexpectedElse { clause: String },

    #[error("`else` after `else` in the same construct")]
    DuplicateElse,

    #[error("unsupported else clause `else {clause}`")]
    UnsupportedElse { clause: String },

    #[error("unexpected `end`")]
    UnexpectedEnd,

    #[error("unexpected tokens after `{keyword}`")]
    TrailingTokens { keyword: String },

    #[error("`{keyword}` is never closed")]
    UnclosedBlock { keyword: String },
}

impl From<scan::ScanFailure> for ParseError {
    fn from(failure: scan::ScanFailure) -> Self {
        match failure {
            scan::ScanFailure::UnterminatedAction => Self::UnterminatedAction,
            scan::ScanFailure::UnterminatedString => Self::UnterminatedString,
            scan::ScanFailure::UnclosedComment => Self::UnclosedComment,
            scan::ScanFailure::CommentWithoutDelimiter => Self::CommentWithoutDelimiter,
        }
    }
}

/// A local, non-fatal parse problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseIssue {
    pub error: ParseError,
    pub raw: String,
    pub span: Span,
    pub pos: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Range,
    With,
    If,
    ElseIf,
    Else,
    Define,
    Block,
    Template,
}

impl BlockKind {
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Range => "range",
            Self::With => "with",
            Self::If => "if",
            Self::ElseIf => "else if",
            Self::Else => "else",
            Self::Define => "define",
            Self::Block => "block",
            Self::Template => "template",
        }
    }

    /// Constructs that have a body terminated by `end`.
    pub fn has_body(self) -> bool {
        matches!(
            self,
            Self::Range | Self::With | Self::If | Self::Define | Self::Block
        )
    }

    /// Sibling branches of an already open construct.
    pub fn is_branch(self) -> bool {
        matches!(self, Self::ElseIf | Self::Else)
    }

    /// Constructs that may be followed by `else` branches.
    pub fn accepts_else(self) -> bool {
        matches!(self, Self::Range | Self::With | Self::If)
    }
}

impl std::fmt::Display for BlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.keyword())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Text {
    pub text: String,
    pub span: Span,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub text: String,
    pub raw: String,
    pub span: Span,
    pub pos: Position,
}

/// A plain `{{ pipeline }}` action, possibly with a variable declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Pipeline text, without delimiters, trim markers or declaration.
    pub expr: String,
    pub raw: String,
    pub decl: Option<Declaration>,
    /// Set when `expr` is a single path, the fast path of validation.
    pub path: Option<Path>,
    pub trim_left: bool,
    pub trim_right: bool,
    pub span: Span,
    pub pos: Position,
}

/// An opening construct or a sibling branch (`else`, `else if`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockOpen {
    pub kind: BlockKind,
    /// Everything after the keyword.
    pub args: String,
    /// Template name of `define`, `block` and `template`.
    pub name: Option<String>,
    /// Pipeline text after name and declaration. May be empty.
    pub expr: String,
    pub decl: Option<Declaration>,
    pub path: Option<Path>,
    /// For branches: node index of the construct they belong to.
    pub group: Option<usize>,
    /// For constructs with a body: node index of the matching `end`.
    pub close: Option<usize>,
    pub raw: String,
    pub span: Span,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockClose {
    /// Node index of the construct this `end` terminates, `None` if unmatched.
    pub open: Option<usize>,
    pub raw: String,
    pub span: Span,
    pub pos: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopKeyword {
    Break,
    Continue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopControl {
    pub keyword: LoopKeyword,
    pub raw: String,
    pub span: Span,
    pub pos: Position,
}

/// Source range skipped because of a [`ParseIssue`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Malformed {
    pub error: ParseError,
    pub raw: String,
    pub span: Span,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum TemplateNode {
    Text(Text),
    Comment(Comment),
    Action(Action),
    BlockOpen(BlockOpen),
    BlockClose(BlockClose),
    LoopControl(LoopControl),
    Malformed(Malformed),
}

impl TemplateNode {
    pub fn span(&self) -> Span {
        match self {
            Self::Text(n) => n.span,
            Self::Comment(n) => n.span,
            Self::Action(n) => n.span,
            Self::BlockOpen(n) => n.span,
            Self::BlockClose(n) => n.span,
            Self::LoopControl(n) => n.span,
            Self::Malformed(n) => n.span,
        }
    }

    pub fn pos(&self) -> Position {
        match self {
            Self::Text(n) => n.pos,
            Self::Comment(n) => n.pos,
            Self::Action(n) => n.pos,
            Self::BlockOpen(n) => n.pos,
            Self::BlockClose(n) => n.pos,
            Self::LoopControl(n) => n.pos,
            Self::Malformed(n) => n.pos,
        }
    }

    /// Source text covered by this node.
    pub fn raw(&self) -> &str {
        match self {
            Self::Text(n) => &n.text,
            Self::Comment(n) => &n.raw,
            Self::Action(n) => &n.raw,
            Self::BlockOpen(n) => &n.raw,
            Self::BlockClose(n) => &n.raw,
            Self::LoopControl(n) => &n.raw,
            Self::Malformed(n) => &n.raw,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedTemplate {
    pub nodes: Vec<TemplateNode>,
    pub issues: Vec<ParseIssue>,
}

impl ParsedTemplate {
    /// Concatenates the raw text of all nodes, which reproduces the source.
    pub fn reconstruct(&self) -> String {
        self.nodes.iter().map(TemplateNode::raw).collect()
    }

    /// The non-text node whose span contains `offset`.
    pub fn node_at(&self, offset: usize) -> Option<(usize, &TemplateNode)> {
        self.nodes
            .iter()
            .enumerate()
            .find(|(_, node)| !node.is_text() && node.span().contains(offset))
    }

    pub fn actions(&self) -> impl Iterator<Item = &TemplateNode> {
        self.nodes.iter().filter(|node| !node.is_text())
    }

    /// Names of all `define` and `block` constructs.
    pub fn definitions(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().filter_map(|node| match node {
            TemplateNode::BlockOpen(open)
                if matches!(open.kind, BlockKind::Define | BlockKind::Block) =>
            {
                open.name.as_deref()
            }
            _ => None,
        })
    }
}
