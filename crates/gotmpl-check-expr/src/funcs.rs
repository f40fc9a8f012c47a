//! Signature table of the functions a template may call.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use gotmpl_check_types::{BOOL, INT, STRING};

/// Number of arguments a function accepts, counting a piped-in value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "ArityRepr", into = "String")]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    Any,
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Self::Exact(n) => count == n,
            Self::AtLeast(n) => count >= n,
            Self::Any => true,
        }
    }
}

impl std::fmt::Display for Arity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact(n) => write!(f, "{n}"),
            Self::AtLeast(n) => write!(f, "{n}+"),
            Self::Any => f.write_str("any"),
        }
    }
}

impl From<Arity> for String {
    fn from(arity: Arity) -> Self {
        arity.to_string()
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid arity `{0}`, expected `N`, `N+` or `any`")]
pub struct InvalidArity(String);

impl std::str::FromStr for Arity {
    type Err = InvalidArity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("any") {
            return Ok(Self::Any);
        }
        let invalid = || InvalidArity(s.to_string());
        match s.strip_suffix('+') {
            Some(n) => n.trim().parse().map(Self::AtLeast).map_err(|_| invalid()),
            None => s.parse().map(Self::Exact).map_err(|_| invalid()),
        }
    }
}

/// Accepts both `arity: 2` and `arity: "2+"` in configuration files.
#[derive(Deserialize)]
#[serde(untagged)]
enum ArityRepr {
    Count(usize),
    Text(String),
}

impl TryFrom<ArityRepr> for Arity {
    type Error = InvalidArity;

    fn try_from(repr: ArityRepr) -> Result<Self, Self::Error> {
        match repr {
            ArityRepr::Count(n) => Ok(Self::Exact(n)),
            ArityRepr::Text(s) => s.parse(),
        }
    }
}

/// How the result type of a call is derived.
///
/// Serialized as a plain string: `element`, `first_arg`, `unknown`, or any
/// other text, which is taken as a fixed type label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ReturnRule {
    Fixed(String),
    /// Element type reached by indexing the first argument with the others.
    IndexElement,
    /// Same type as the first argument.
    FirstArg,
    Unknown,
}

impl From<String> for ReturnRule {
    fn from(value: String) -> Self {
        match value.trim() {
            "element" => Self::IndexElement,
            "first_arg" => Self::FirstArg,
            "unknown" | "" => Self::Unknown,
            label => Self::Fixed(label.to_string()),
        }
    }
}

impl From<ReturnRule> for String {
    fn from(rule: ReturnRule) -> Self {
        match rule {
            ReturnRule::Fixed(label) => label,
            ReturnRule::IndexElement => "element".to_string(),
            ReturnRule::FirstArg => "first_arg".to_string(),
            ReturnRule::Unknown => "unknown".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FuncSignature {
    pub arity: Arity,
    pub returns: ReturnRule,
}

impl FuncSignature {
    pub fn new(arity: Arity, returns: ReturnRule) -> Self {
        Self { arity, returns }
    }

    pub fn fixed(arity: Arity, label: &str) -> Self {
        Self::new(arity, ReturnRule::Fixed(label.to_string()))
    }
}

/// Injectable mapping from function name to signature.
///
/// [`FuncTable::default`] holds the builtins; callers add project-specific
/// functions with [`FuncTable::register`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FuncTable {
    funcs: BTreeMap<String, FuncSignature>,
}

impl Default for FuncTable {
    fn default() -> Self {
        let mut table = Self::empty();
        table.register("len", FuncSignature::fixed(Arity::Exact(1), INT));
        table.register(
            "index",
            FuncSignature::new(Arity::AtLeast(1), ReturnRule::IndexElement),
        );
        table.register("printf", FuncSignature::fixed(Arity::AtLeast(1), STRING));
        for escaper in ["html", "js", "urlquery"] {
            table.register(escaper, FuncSignature::fixed(Arity::Any, STRING));
        }
        table.register("eq", FuncSignature::fixed(Arity::AtLeast(2), BOOL));
        for cmp in ["ne", "lt", "le", "gt", "ge"] {
            table.register(cmp, FuncSignature::fixed(Arity::Exact(2), BOOL));
        }
        for logic in ["and", "or"] {
            table.register(logic, FuncSignature::fixed(Arity::AtLeast(1), BOOL));
        }
        table.register("not", FuncSignature::fixed(Arity::Exact(1), BOOL));
        table
    }
}

impl FuncTable {
    pub fn empty() -> Self {
        Self {
            funcs: BTreeMap::new(),
        }
    }

    /// Adds or replaces a function.
    pub fn register(&mut self, name: impl Into<String>, signature: FuncSignature) -> &mut Self {
        self.funcs.insert(name.into(), signature);
        self
    }

    pub fn extend(&mut self, other: impl IntoIterator<Item = (String, FuncSignature)>) {
        self.funcs.extend(other);
    }

    pub fn get(&self, name: &str) -> Option<&FuncSignature> {
        self.funcs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.funcs.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.funcs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.funcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.funcs.is_empty()
    }
}
