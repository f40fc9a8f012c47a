use gotmpl_check_template::{Path, PathRoot, Segment, Span};

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Imaginary(f64),
    Str(String),
    Char(char),
    Bool(bool),
    Nil,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// `.A.B`, `$x.A`, `$.A`, `.`
    Path(Path),
    Literal(Literal),
    /// Call of a named function. A bare identifier is a call without arguments.
    Call { func: String, args: Vec<Expr> },
    /// `.Receiver.Method arg...`, a method call on a value. `receiver` is the
    /// path up to, but excluding, the method name.
    Method {
        receiver: Path,
        method: String,
        args: Vec<Expr>,
    },
    /// `(pipeline).Field[key]`
    Chain {
        base: Box<Expr>,
        segments: Vec<Segment>,
    },
    /// `stage | stage | ...`. Every stage after the first receives the
    /// previous result as its first argument.
    Pipeline(Vec<Expr>),
}

/// Parsed action body. Spans are byte offsets into the parsed text.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }

    pub fn as_path(&self) -> Option<&Path> {
        match &self.kind {
            ExprKind::Path(path) => Some(path),
            _ => None,
        }
    }

    /// All path operands in source order, including method receivers.
    pub fn paths(&self) -> Vec<(&Path, Span)> {
        let mut out = Vec::new();
        self.visit(&mut |expr| match &expr.kind {
            ExprKind::Path(path) => out.push((path, expr.span)),
            ExprKind::Method { receiver, .. }
                if !receiver.segments.is_empty() || receiver.root != PathRoot::Dot =>
            {
                let len = receiver.to_string().len();
                out.push((receiver, Span::new(expr.span.start, expr.span.start + len)));
            }
            _ => {}
        });
        out
    }

    /// Names of all called functions in source order.
    pub fn calls(&self) -> Vec<(&str, Span)> {
        let mut out = Vec::new();
        self.visit(&mut |expr| {
            if let ExprKind::Call { func, .. } = &expr.kind {
                out.push((func.as_str(), expr.span));
            }
        });
        out
    }

    /// Innermost sub-expression whose span contains `offset`.
    pub fn at(&self, offset: usize) -> Option<&Expr> {
        let mut found = None;
        self.visit(&mut |expr| {
            if expr.span.contains(offset) {
                found = Some(expr);
            }
        });
        found
    }

    fn visit<'a>(&'a self, f: &mut impl FnMut(&'a Expr)) {
        f(self);
        match &self.kind {
            ExprKind::Path(_) | ExprKind::Literal(_) => {}
            ExprKind::Call { args, .. } | ExprKind::Method { args, .. } => {
                for arg in args {
                    arg.visit(f);
                }
            }
            ExprKind::Chain { base, .. } => base.visit(f),
            ExprKind::Pipeline(stages) => {
                for stage in stages {
                    stage.visit(f);
                }
            }
        }
    }
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Imaginary(v) => write!(f, "{v}i"),
            Self::Str(v) => write!(f, "{v:?}"),
            Self::Char(v) => write!(f, "{v:?}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Nil => f.write_str("nil"),
        }
    }
}
