//! Expression parsing and type inference for template actions.
//!
//! The grammar is the prefix/pipe form of Go templates: paths, literals,
//! parenthesised pipelines, function calls and `|` pipelines. Result types
//! come from path resolution against a [`Scope`] plus a [`FuncTable`] of
//! function signatures.

pub mod ast;
mod funcs;
mod infer;
mod lex;
mod parse;
mod resolve;

pub use ast::{Expr, ExprKind, Literal};
pub use funcs::{Arity, FuncSignature, FuncTable, InvalidArity, ReturnRule};
pub use infer::{Inferencer, infer};
pub use parse::parse_expr;
pub use resolve::{ResolveError, Scope, descend, resolve_path};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ExprError {
    #[error("malformed expression at offset {offset}: {message}")]
    Malformed { message: String, offset: usize },

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("wrong number of args for {func}: want {expected} got {found}")]
    Arity {
        func: String,
        expected: Arity,
        found: usize,
    },

    #[error("cannot index `{on}` with a `{key}` value")]
    NotIndexable { on: String, key: String },
}

#[cfg(test)]
mod tests;
