use tracing::{debug, trace};

use crate::decl::{split_declaration, split_string_literal};
use crate::path::{is_ident_continue, parse_path};
use crate::scan::{ActionBlock, Scanned, scan_actions};
use crate::{
    Action, BlockClose, BlockKind, BlockOpen, Comment, LineIndex, LoopControl, LoopKeyword,
    Malformed, ParseError, ParseIssue, ParseOptions, ParsedTemplate, Span, TemplateNode, Text,
};

/// Parses `source` with the default `{{` / `}}` delimiters.
pub fn parse(source: &str) -> ParsedTemplate {
    parse_with_options(source, &ParseOptions::default())
}

pub fn parse_with_options(source: &str, options: &ParseOptions) -> ParsedTemplate {
    let mut parser = Parser {
        source,
        index: LineIndex::new(source),
        nodes: Vec::new(),
        issues: Vec::new(),
        open: Vec::new(),
    };

    let mut cursor = 0;
    for item in scan_actions(source, &options.delimiters) {
        let span = match &item {
            Scanned::Block(block) => block.span(),
            Scanned::Malformed { span, .. } => *span,
        };
        if span.start > cursor {
            parser.text(Span::new(cursor, span.start));
        }
        match item {
            Scanned::Block(block) => parser.action(&block),
            Scanned::Malformed { span, reason } => parser.malformed(span, reason.into()),
        }
        cursor = span.end;
    }
    if cursor < source.len() {
        parser.text(Span::new(cursor, source.len()));
    }
    parser.finish()
}

#[derive(Debug)]
struct OpenConstruct {
    node: usize,
    kind: BlockKind,
    else_seen: bool,
}

struct Parser<'a> {
    source: &'a str,
    index: LineIndex<'a>,
    nodes: Vec<TemplateNode>,
    issues: Vec<ParseIssue>,
    open: Vec<OpenConstruct>,
}

/// Splits the leading keyword-like word off an action body.
fn split_word(text: &str) -> (&str, &str) {
    let end = text
        .char_indices()
        .find(|(_, c)| !is_ident_continue(*c))
        .map_or(text.len(), |(i, _)| i);
    (&text[..end], text[end..].trim())
}

impl Parser<'_> {
    fn raw(&self, span: Span) -> String {
        self.source[span.start..span.end].to_string()
    }

    fn issue(&mut self, error: ParseError, span: Span) {
        trace!(%error, ?span, "parse issue");
        self.issues.push(ParseIssue {
            error,
            raw: self.raw(span),
            span,
            pos: self.index.position(span.start),
        });
    }

    fn push(&mut self, node: TemplateNode) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn text(&mut self, span: Span) {
        let pos = self.index.position(span.start);
        let text = self.raw(span);
        self.push(TemplateNode::Text(Text { text, span, pos }));
    }

    fn malformed(&mut self, span: Span, error: ParseError) {
        self.issue(error.clone(), span);
        let pos = self.index.position(span.start);
        let raw = self.raw(span);
        self.push(TemplateNode::Malformed(Malformed {
            error,
            raw,
            span,
            pos,
        }));
    }

    fn action(&mut self, block: &ActionBlock) {
        let span = block.span();
        let pos = self.index.position(span.start);
        let raw = self.raw(span);
        let source = self.source;
        let inner = source[block.inner_start..block.inner_end].trim();

        if block.comment {
            let text = inner
                .trim_start_matches("/*")
                .trim_end_matches("*/")
                .trim()
                .to_string();
            self.push(TemplateNode::Comment(Comment {
                text,
                raw,
                span,
                pos,
            }));
            return;
        }
        if inner.is_empty() {
            self.malformed(span, ParseError::EmptyAction);
            return;
        }

        let (word, rest) = split_word(inner);
        match word {
            "if" => self.open_construct(BlockKind::If, rest, span),
            "range" => self.open_construct(BlockKind::Range, rest, span),
            "with" => self.open_construct(BlockKind::With, rest, span),
            "define" => self.named(BlockKind::Define, rest, span),
            "block" => self.named(BlockKind::Block, rest, span),
            "template" => self.named(BlockKind::Template, rest, span),
            "else" => self.branch(rest, span),
            "end" => self.close(rest, span),
            "break" | "continue" => {
                if !rest.is_empty() {
                    self.issue(
                        ParseError::TrailingTokens {
                            keyword: word.to_string(),
                        },
                        span,
                    );
                }
                let keyword = if word == "break" {
                    LoopKeyword::Break
                } else {
                    LoopKeyword::Continue
                };
                self.push(TemplateNode::LoopControl(LoopControl {
                    keyword,
                    raw,
                    span,
                    pos,
                }));
            }
            _ => {
                let (decl, expr) = split_declaration(inner);
                if decl.is_some() && expr.is_empty() {
                    self.issue(
                        ParseError::MissingPipeline {
                            keyword: ":=".to_string(),
                        },
                        span,
                    );
                }
                self.push(TemplateNode::Action(Action {
                    expr: expr.to_string(),
                    raw,
                    decl,
                    path: parse_path(expr),
                    trim_left: block.trim_left,
                    trim_right: block.trim_right,
                    span,
                    pos,
                }));
            }
        }
    }

    fn block_open(&self, kind: BlockKind, args: &str, span: Span) -> BlockOpen {
        BlockOpen {
            kind,
            args: args.to_string(),
            name: None,
            expr: String::new(),
            decl: None,
            path: None,
            group: None,
            close: None,
            raw: self.raw(span),
            span,
            pos: self.index.position(span.start),
        }
    }

    fn with_pipeline(&mut self, open: &mut BlockOpen, text: &str) {
        let (decl, expr) = split_declaration(text);
        if expr.is_empty() {
            self.issue(
                ParseError::MissingPipeline {
                    keyword: open.kind.keyword().to_string(),
                },
                open.span,
            );
        }
        open.path = parse_path(expr);
        open.expr = expr.to_string();
        open.decl = decl;
    }

    fn open_construct(&mut self, kind: BlockKind, rest: &str, span: Span) {
        let mut open = self.block_open(kind, rest, span);
        self.with_pipeline(&mut open, rest);
        let node = self.push(TemplateNode::BlockOpen(open));
        self.open.push(OpenConstruct {
            node,
            kind,
            else_seen: false,
        });
    }

    fn named(&mut self, kind: BlockKind, rest: &str, span: Span) {
        let mut open = self.block_open(kind, rest, span);
        match split_string_literal(rest) {
            Some((name, tail)) => {
                let tail = tail.trim();
                if kind == BlockKind::Define && !tail.is_empty() {
                    self.issue(
                        ParseError::TrailingTokens {
                            keyword: kind.keyword().to_string(),
                        },
                        span,
                    );
                }
                if kind != BlockKind::Define {
                    open.path = parse_path(tail);
                    open.expr = tail.to_string();
                }
                open.name = Some(name);
            }
            None => {
                self.issue(
                    ParseError::MissingTemplateName {
                        keyword: kind.keyword().to_string(),
                    },
                    span,
                );
            }
        }
        let node = self.push(TemplateNode::BlockOpen(open));
        if kind.has_body() {
            self.open.push(OpenConstruct {
                node,
                kind,
                else_seen: false,
            });
        }
    }

    fn branch(&mut self, rest: &str, span: Span) {
        let (word, tail) = split_word(rest);
        let kind = if word == "if" {
            BlockKind::ElseIf
        } else {
            if !rest.is_empty() {
                self.issue(
                    ParseError::UnsupportedElse {
                        clause: rest.to_string(),
                    },
                    span,
                );
            }
            BlockKind::Else
        };
        let mut open = self.block_open(kind, rest, span);
        if kind == BlockKind::ElseIf {
            self.with_pipeline(&mut open, tail);
        }

        let mut duplicate = false;
        let accepts_else = self.open.last().is_some_and(|top| top.kind.accepts_else());
        if accepts_else {
            if let Some(top) = self.open.last_mut() {
                open.group = Some(top.node);
                duplicate = top.else_seen;
                if kind == BlockKind::Else {
                    top.else_seen = true;
                }
            }
        } else {
            self.issue(
                ParseError::UnexpectedElse {
                    clause: kind.keyword().to_string(),
                },
                span,
            );
        }
        if duplicate {
            self.issue(ParseError::DuplicateElse, span);
        }
        self.push(TemplateNode::BlockOpen(open));
    }

    fn close(&mut self, rest: &str, span: Span) {
        if !rest.is_empty() {
            self.issue(
                ParseError::TrailingTokens {
                    keyword: "end".to_string(),
                },
                span,
            );
        }
        let index = self.nodes.len();
        let open = match self.open.pop() {
            Some(construct) => {
                if let Some(TemplateNode::BlockOpen(open)) = self.nodes.get_mut(construct.node) {
                    open.close = Some(index);
                }
                Some(construct.node)
            }
            None => {
                self.issue(ParseError::UnexpectedEnd, span);
                None
            }
        };
        let raw = self.raw(span);
        let pos = self.index.position(span.start);
        self.push(TemplateNode::BlockClose(BlockClose {
            open,
            raw,
            span,
            pos,
        }));
    }

    fn finish(mut self) -> ParsedTemplate {
        let unclosed: Vec<OpenConstruct> = self.open.drain(..).collect();
        for construct in unclosed {
            let span = self.nodes[construct.node].span();
            self.issue(
                ParseError::UnclosedBlock {
                    keyword: construct.kind.keyword().to_string(),
                },
                span,
            );
        }
        debug!(
            nodes = self.nodes.len(),
            issues = self.issues.len(),
            "parsed template"
        );
        ParsedTemplate {
            nodes: self.nodes,
            issues: self.issues,
        }
    }
}
