use gotmpl_check_template::{Path, PathRoot, Segment, Span};

use crate::ast::{Expr, ExprKind, Literal};
use crate::lex::{Token, TokenKind, tokenize};
use crate::ExprError;

/// Parses the body of an action (without delimiters or declaration) into an
/// expression tree.
///
/// # Errors
///
/// Returns [`ExprError::Malformed`] with the byte offset of the offending token.
pub fn parse_expr(text: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(text)?;
    if tokens.is_empty() {
        return Err(ExprError::Malformed {
            message: "empty expression".to_string(),
            offset: 0,
        });
    }
    let mut parser = ExprParser {
        tokens: &tokens,
        index: 0,
        len: text.len(),
    };
    let expr = parser.pipeline()?;
    if let Some(token) = parser.peek() {
        return Err(parser.error_at(format!("unexpected {}", describe(&token.kind)), token.span));
    }
    Ok(expr)
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Field(name) => format!("field `.{name}`"),
        TokenKind::Dot => "`.`".to_string(),
        TokenKind::Variable(name) => format!("variable `${name}`"),
        TokenKind::Ident(name) => format!("identifier `{name}`"),
        TokenKind::Bool(v) => format!("`{v}`"),
        TokenKind::Nil => "`nil`".to_string(),
        TokenKind::Int(v) => format!("number `{v}`"),
        TokenKind::Float(v) => format!("number `{v}`"),
        TokenKind::Imaginary(v) => format!("number `{v}i`"),
        TokenKind::Str(v) => format!("string {v:?}"),
        TokenKind::Char(v) => format!("character {v:?}"),
        TokenKind::Index(key) => format!("index `[{key}]`"),
        TokenKind::LeftParen => "`(`".to_string(),
        TokenKind::RightParen => "`)`".to_string(),
        TokenKind::Pipe => "`|`".to_string(),
    }
}

struct ExprParser<'a> {
    tokens: &'a [Token],
    index: usize,
    len: usize,
}

impl<'a> ExprParser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.index)
    }

    fn next(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.index)?;
        self.index += 1;
        Some(token)
    }

    fn error_at(&self, message: impl Into<String>, span: Span) -> ExprError {
        ExprError::Malformed {
            message: message.into(),
            offset: span.start,
        }
    }

    fn end_offset(&self) -> usize {
        self.index
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map_or(self.len, |t| t.span.end)
    }

    fn pipeline(&mut self) -> Result<Expr, ExprError> {
        let mut stages = vec![self.command()?];
        while matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Pipe)) {
            self.index += 1;
            let stage = self.command()?;
            if !matches!(
                stage.kind,
                ExprKind::Call { .. } | ExprKind::Method { .. } | ExprKind::Path(_)
            ) {
                return Err(self.error_at("non executable command in pipeline stage", stage.span));
            }
            stages.push(stage);
        }
        if stages.len() == 1 {
            return Ok(stages.remove(0));
        }
        let span = Span::new(stages[0].span.start, self.end_offset());
        Ok(Expr::new(ExprKind::Pipeline(stages), span))
    }

    fn command(&mut self) -> Result<Expr, ExprError> {
        let mut operands: Vec<(Expr, bool)> = Vec::new();
        while let Some(token) = self.peek() {
            if matches!(token.kind, TokenKind::Pipe | TokenKind::RightParen) {
                break;
            }
            operands.push(self.operand()?);
        }
        let Some(((first, bare_ident), rest)) = split_first(operands) else {
            let offset = self.peek().map_or(self.len, |t| t.span.start);
            return Err(ExprError::Malformed {
                message: "missing value for command".to_string(),
                offset,
            });
        };
        if rest.is_empty() {
            return Ok(first);
        }
        let args: Vec<Expr> = rest.into_iter().map(|(expr, _)| expr).collect();
        let span = Span::new(first.span.start, self.end_offset());
        match first.kind {
            ExprKind::Call { func, .. } if bare_ident => {
                Ok(Expr::new(ExprKind::Call { func, args }, span))
            }
            ExprKind::Path(path) if !path.segments.is_empty() => {
                let method = match path.segments.last() {
                    Some(Segment::Field(name)) => name.clone(),
                    _ => {
                        return Err(self.error_at(
                            format!("can't give argument to non-function `{path}`"),
                            first.span,
                        ));
                    }
                };
                let receiver = path.prefix(path.segments.len() - 1);
                Ok(Expr::new(
                    ExprKind::Method {
                        receiver,
                        method,
                        args,
                    },
                    span,
                ))
            }
            _ => Err(self.error_at("can't give argument to non-function", first.span)),
        }
    }

    /// Parses one operand. The flag is set for a bare identifier, which may
    /// take arguments.
    fn operand(&mut self) -> Result<(Expr, bool), ExprError> {
        let Some(token) = self.next() else {
            return Err(ExprError::Malformed {
                message: "unexpected end of expression".to_string(),
                offset: self.len,
            });
        };
        let span = token.span;
        let literal = |lit: Literal| -> Result<(Expr, bool), ExprError> {
            Ok((Expr::new(ExprKind::Literal(lit), span), false))
        };
        match &token.kind {
            TokenKind::Field(name) => {
                let path = Path::new(PathRoot::Dot, vec![Segment::Field(name.clone())]);
                Ok((self.extend_path(path, span), false))
            }
            TokenKind::Dot => Ok((self.extend_path(Path::dot(), span), false)),
            TokenKind::Variable(name) => {
                let root = if name.is_empty() {
                    PathRoot::Root
                } else {
                    PathRoot::Var(name.clone())
                };
                Ok((self.extend_path(Path::new(root, Vec::new()), span), false))
            }
            TokenKind::Ident(name) => {
                if self.adjacent_segment(span).is_some() {
                    return Err(self.error_at(
                        format!("unexpected field access on function `{name}`"),
                        span,
                    ));
                }
                let call = ExprKind::Call {
                    func: name.clone(),
                    args: Vec::new(),
                };
                Ok((Expr::new(call, span), true))
            }
            TokenKind::Bool(v) => literal(Literal::Bool(*v)),
            TokenKind::Nil => literal(Literal::Nil),
            TokenKind::Int(v) => literal(Literal::Int(*v)),
            TokenKind::Float(v) => literal(Literal::Float(*v)),
            TokenKind::Imaginary(v) => literal(Literal::Imaginary(*v)),
            TokenKind::Str(v) => literal(Literal::Str(v.clone())),
            TokenKind::Char(v) => literal(Literal::Char(*v)),
            TokenKind::LeftParen => {
                let inner = self.pipeline()?;
                let Some(close) = self.next() else {
                    return Err(self.error_at("unclosed left paren", span));
                };
                if close.kind != TokenKind::RightParen {
                    return Err(self.error_at("expected `)`", close.span));
                }
                let mut end = close.span;
                let mut segments = Vec::new();
                while let Some(segment) = self.adjacent_segment(end) {
                    segments.push(segment);
                    end = self.tokens[self.index].span;
                    self.index += 1;
                }
                let span = Span::new(span.start, end.end);
                if segments.is_empty() {
                    Ok((Expr::new(inner.kind, span), false))
                } else {
                    let chain = ExprKind::Chain {
                        base: Box::new(inner),
                        segments,
                    };
                    Ok((Expr::new(chain, span), false))
                }
            }
            other => Err(self.error_at(format!("unexpected {}", describe(other)), span)),
        }
    }

    /// The field or index token directly following `prev` without whitespace.
    fn adjacent_segment(&self, prev: Span) -> Option<Segment> {
        let token = self.peek()?;
        if token.span.start != prev.end {
            return None;
        }
        match &token.kind {
            TokenKind::Field(name) => Some(Segment::Field(name.clone())),
            TokenKind::Index(key) => Some(Segment::Index(key.clone())),
            _ => None,
        }
    }

    fn extend_path(&mut self, mut path: Path, start: Span) -> Expr {
        let mut end = start;
        while let Some(segment) = self.adjacent_segment(end) {
            path.segments.push(segment);
            end = self.tokens[self.index].span;
            self.index += 1;
        }
        Expr::new(ExprKind::Path(path), Span::new(start.start, end.end))
    }
}

fn split_first<T>(mut items: Vec<T>) -> Option<(T, Vec<T>)> {
    if items.is_empty() {
        return None;
    }
    let first = items.remove(0);
    Some((first, items))
}
