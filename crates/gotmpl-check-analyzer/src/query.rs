//! Cursor queries: hover types and completion candidates.

use gotmpl_check_expr::{Inferencer, parse_expr};
use gotmpl_check_template::{ParsedTemplate, Path, PathRoot, Span, TemplateNode, parse_path};
use gotmpl_check_types::InferredType;
use serde::{Deserialize, Serialize};

use crate::scope::ScopeStack;
use crate::validator::Walker;
use crate::{Analyzer, Context, DependencyEdge};

/// Type of the path segment or expression under the cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hover {
    /// Source text the type belongs to, e.g. `.User.Name` for a cursor on `Name`.
    pub text: String,
    pub ty: InferredType,
    /// Byte range of `text` in the template.
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionKind {
    Field,
    Variable,
    Function,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub label: String,
    /// Type label for fields and variables, arity for functions.
    pub detail: String,
    pub kind: CompletionKind,
}

fn is_path_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '$')
}

impl Analyzer {
    /// Runs `f` on the scope in effect at node `stop`.
    fn scope_at<R>(
        &self,
        parsed: &ParsedTemplate,
        ctx: &Context<'_>,
        stop: Option<usize>,
        f: impl FnOnce(&ScopeStack<'_>, &Analyzer) -> R,
    ) -> R {
        let mut edges: Vec<DependencyEdge> = Vec::new();
        let mut walker = Walker::new(&self.options, ctx, &mut edges);
        walker.walk(&parsed.nodes, stop);
        f(walker.stack(), self)
    }

    /// Type of whatever sits under `offset` in `source`.
    pub fn hover(&self, source: &str, ctx: &Context<'_>, offset: usize) -> Option<Hover> {
        let parsed = self.parse(source);
        let (index, node) = parsed.node_at(offset)?;
        let text = match node {
            TemplateNode::Action(action) => &action.expr,
            TemplateNode::BlockOpen(open) => &open.expr,
            _ => return None,
        };
        if text.trim().is_empty() {
            return None;
        }
        let base = node.span().start + node.raw().rfind(text.as_str())?;
        let expr = parse_expr(text).ok()?;
        let target = expr.at(offset.checked_sub(base)?)?;

        self.scope_at(&parsed, ctx, Some(index), |stack, analyzer| {
            if let Some(path) = target.as_path() {
                let path = segment_under_cursor(path, offset - base - target.span.start);
                let ty = stack.resolve(&path).ok()?;
                let text = path.to_string();
                let start = base + target.span.start;
                return Some(Hover {
                    span: Span::new(start, start + text.len()),
                    text,
                    ty: (&*ty).into(),
                });
            }
            let ty = Inferencer::new(stack, &analyzer.options.funcs)
                .infer(target)
                .ok()?;
            Some(Hover {
                text: text.get(target.span.start..target.span.end)?.to_string(),
                ty,
                span: Span::new(base + target.span.start, base + target.span.end),
            })
        })
    }

    /// Infers `text` as if it were written at `offset` in `source`.
    pub fn infer_at(
        &self,
        source: &str,
        ctx: &Context<'_>,
        offset: usize,
        text: &str,
    ) -> Option<InferredType> {
        let parsed = self.parse(source);
        let stop = parsed
            .nodes
            .iter()
            .position(|node| node.span().end > offset);
        let expr = parse_expr(text).ok()?;
        self.scope_at(&parsed, ctx, stop, |stack, analyzer| {
            Inferencer::new(stack, &analyzer.options.funcs)
                .infer(&expr)
                .ok()
        })
    }

    /// Candidates for the partially typed identifier ending at `offset`.
    pub fn complete(&self, source: &str, ctx: &Context<'_>, offset: usize) -> Vec<Completion> {
        let Some(before) = source.get(..offset) else {
            return Vec::new();
        };
        let parsed = self.parse(source);
        let Some((index, _)) = parsed.node_at(offset) else {
            return Vec::new();
        };
        let start = before
            .char_indices()
            .rev()
            .find(|(_, c)| !is_path_char(*c))
            .map_or(0, |(i, c)| i + c.len_utf8());
        let partial = &before[start..];

        self.scope_at(&parsed, ctx, Some(index), |stack, analyzer| {
            if let Some(dot) = partial.rfind('.') {
                let (base, prefix) = (&partial[..dot], &partial[dot + 1..]);
                let base = if base.is_empty() {
                    Some(Path::dot())
                } else {
                    parse_path(base)
                };
                let Some(ty) = base.and_then(|path| stack.resolve(&path).ok()) else {
                    return Vec::new();
                };
                return ty
                    .fields
                    .iter()
                    .filter(|field| field.name.starts_with(prefix))
                    .map(|field| Completion {
                        label: field.name.clone(),
                        detail: field.type_label.clone(),
                        kind: CompletionKind::Field,
                    })
                    .collect();
            }
            if let Some(prefix) = partial.strip_prefix('$') {
                return stack
                    .visible_locals()
                    .into_iter()
                    .filter(|(name, _)| name.starts_with(prefix))
                    .map(|(name, ty)| Completion {
                        label: format!("${name}"),
                        detail: ty.type_label.clone(),
                        kind: CompletionKind::Variable,
                    })
                    .collect();
            }
            analyzer
                .options
                .funcs
                .names()
                .filter(|name| name.starts_with(partial))
                .filter_map(|name| {
                    let signature = analyzer.options.funcs.get(name)?;
                    Some(Completion {
                        label: name.to_string(),
                        detail: format!("arity {}", signature.arity),
                        kind: CompletionKind::Function,
                    })
                })
                .collect()
        })
    }
}

/// Shortest prefix of `path` whose text reaches past `rel`, so hovering `User`
/// in `.User.Name` yields `.User`.
fn segment_under_cursor(path: &Path, rel: usize) -> Path {
    let first = usize::from(path.root == PathRoot::Dot && !path.segments.is_empty());
    (first..=path.segments.len())
        .map(|n| path.prefix(n))
        .find(|prefix| rel < prefix.to_string().len())
        .unwrap_or_else(|| path.clone())
}
