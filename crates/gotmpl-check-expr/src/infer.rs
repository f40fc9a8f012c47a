use std::borrow::Cow;

use gotmpl_check_types::{BOOL, FLOAT, INT, InferredType, NIL, STRING, TypeNode};
use tracing::trace;

use crate::ast::{Expr, ExprKind, Literal};
use crate::funcs::{FuncTable, ReturnRule};
use crate::resolve::{Scope, descend, resolve_path};
use crate::{ExprError, parse_expr};

/// Infers result types of expressions within one scope.
pub struct Inferencer<'a, S: Scope + ?Sized> {
    scope: &'a S,
    funcs: &'a FuncTable,
}

impl<'a, S: Scope + ?Sized> Inferencer<'a, S> {
    pub fn new(scope: &'a S, funcs: &'a FuncTable) -> Self {
        Self { scope, funcs }
    }

    /// # Errors
    ///
    /// Fails on malformed syntax, unresolvable paths, indexing of
    /// non-containers and arity mismatches.
    pub fn infer_text(&self, text: &str) -> Result<InferredType, ExprError> {
        let expr = parse_expr(text)?;
        self.infer(&expr)
    }

    /// # Errors
    ///
    /// See [`Self::infer_text`].
    pub fn infer(&self, expr: &Expr) -> Result<InferredType, ExprError> {
        Ok(self.node(expr)?.into_owned().into())
    }

    fn node(&self, expr: &Expr) -> Result<Cow<'a, TypeNode>, ExprError> {
        match &expr.kind {
            ExprKind::Path(path) => Ok(resolve_path(path, self.scope)?),
            ExprKind::Literal(lit) => Ok(Cow::Owned(literal_type(lit))),
            ExprKind::Call { func, args } => {
                let args = args
                    .iter()
                    .map(|arg| self.node(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call(func, args)
            }
            ExprKind::Method { receiver, args, .. } => {
                resolve_path(receiver, self.scope)?;
                for arg in args {
                    self.node(arg)?;
                }
                Ok(Cow::Owned(TypeNode::unknown()))
            }
            ExprKind::Chain { base, segments } => Ok(descend(self.node(base)?, segments)?),
            ExprKind::Pipeline(stages) => {
                let mut stages = stages.iter();
                let Some(first) = stages.next() else {
                    return Ok(Cow::Owned(TypeNode::unknown()));
                };
                let mut input = self.node(first)?;
                for stage in stages {
                    input = self.stage(stage, input)?;
                }
                Ok(input)
            }
        }
    }

    /// Applies a pipeline stage with `input` prepended to its arguments.
    fn stage(&self, stage: &Expr, input: Cow<'a, TypeNode>) -> Result<Cow<'a, TypeNode>, ExprError> {
        match &stage.kind {
            ExprKind::Call { func, args } => {
                let mut values = vec![input];
                for arg in args {
                    values.push(self.node(arg)?);
                }
                self.call(func, values)
            }
            ExprKind::Method { receiver, args, .. } => {
                resolve_path(receiver, self.scope)?;
                for arg in args {
                    self.node(arg)?;
                }
                Ok(Cow::Owned(TypeNode::unknown()))
            }
            ExprKind::Path(path) => {
                resolve_path(&path.prefix(path.segments.len().saturating_sub(1)), self.scope)?;
                Ok(Cow::Owned(TypeNode::unknown()))
            }
            _ => Err(ExprError::Malformed {
                message: "non executable command in pipeline stage".to_string(),
                offset: stage.span.start,
            }),
        }
    }

    fn call(
        &self,
        func: &str,
        args: Vec<Cow<'a, TypeNode>>,
    ) -> Result<Cow<'a, TypeNode>, ExprError> {
        let Some(signature) = self.funcs.get(func) else {
            trace!(func, "call to function outside the table");
            return Ok(Cow::Owned(TypeNode::unknown()));
        };
        if !signature.arity.accepts(args.len()) {
            return Err(ExprError::Arity {
                func: func.to_string(),
                expected: signature.arity,
                found: args.len(),
            });
        }
        let mut args = args.into_iter();
        match &signature.returns {
            ReturnRule::Fixed(label) => Ok(Cow::Owned(TypeNode::scalar("", label.clone()))),
            ReturnRule::Unknown => Ok(Cow::Owned(TypeNode::unknown())),
            ReturnRule::FirstArg => Ok(args.next().unwrap_or_else(|| Cow::Owned(TypeNode::unknown()))),
            ReturnRule::IndexElement => {
                let Some(mut container) = args.next() else {
                    return Ok(Cow::Owned(TypeNode::unknown()));
                };
                for key in args {
                    container = index_into(container, &key)?;
                }
                Ok(container)
            }
        }
    }
}

fn index_into<'a>(
    container: Cow<'a, TypeNode>,
    key: &TypeNode,
) -> Result<Cow<'a, TypeNode>, ExprError> {
    if container.is_unknown() {
        return Ok(container);
    }
    if container.type_label == STRING {
        return Ok(Cow::Owned(TypeNode::scalar("", "uint8")));
    }
    if !container.is_iterable() {
        return Err(ExprError::NotIndexable {
            on: container.type_label.clone(),
            key: key.type_label.clone(),
        });
    }
    Ok(match container {
        Cow::Borrowed(node) => node
            .element()
            .map_or_else(|| Cow::Owned(TypeNode::unknown()), Cow::Borrowed),
        Cow::Owned(node) => Cow::Owned(node.element().cloned().unwrap_or_else(TypeNode::unknown)),
    })
}

fn literal_type(lit: &Literal) -> TypeNode {
    let label = match lit {
        Literal::Int(_) | Literal::Char(_) => INT,
        Literal::Float(_) => FLOAT,
        Literal::Imaginary(_) => "complex128",
        Literal::Str(_) => STRING,
        Literal::Bool(_) => BOOL,
        Literal::Nil => NIL,
    };
    TypeNode::scalar("", label)
}

/// Infers the type of `text` in `scope` using `funcs`.
///
/// # Errors
///
/// Any failure means "not resolved"; callers decide how to report it.
pub fn infer<S: Scope + ?Sized>(
    text: &str,
    scope: &S,
    funcs: &FuncTable,
) -> Result<InferredType, ExprError> {
    Inferencer::new(scope, funcs).infer_text(text)
}
