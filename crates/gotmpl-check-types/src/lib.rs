//! Declared and computed type shapes that template paths are resolved against.
//!
//! A [`TypeNode`] tree is supplied by the caller (usually built from struct
//! reflection in the host program) and is never mutated by the analyzer.

mod manifest;

pub use manifest::TypeManifest;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const INT: &str = "int";
pub const FLOAT: &str = "float64";
pub const STRING: &str = "string";
pub const BOOL: &str = "bool";
pub const NIL: &str = "nil";
pub const UNKNOWN: &str = "unknown";
pub const ROOT: &str = "root";

/// Labels that carry no structural information. Any access on them is accepted.
const PERMISSIVE_LABELS: &[&str] = &[UNKNOWN, "any", "interface{}"];

#[derive(thiserror::Error, Debug)]
pub enum TypeTreeError {
    #[error("type `{label}` ({name:?}) is marked as both slice and map")]
    SliceAndMap { name: String, label: String },

    #[error("type `{label}` ({name:?}) is a container but declares fields")]
    ContainerWithFields { name: String, label: String },

    #[error("type `{label}` ({name:?}) declares a key type but is not a map")]
    KeyOnNonMap { name: String, label: String },

    #[error("type `{label}` declares field `{field}` more than once")]
    DuplicateField { label: String, field: String },

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Structural category of a [`TypeNode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Scalar,
    Slice,
    Map,
    Struct,
    Unknown,
}

/// One named or anonymous type-bearing position in the data shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeNode {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub type_label: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_slice: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_map: bool,
    #[serde(rename = "elem", default, skip_serializing_if = "Option::is_none")]
    pub elem_type: Option<Box<TypeNode>>,
    #[serde(rename = "key", default, skip_serializing_if = "Option::is_none")]
    pub key_type: Option<Box<TypeNode>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<TypeNode>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(value: &bool) -> bool {
    !*value
}

impl TypeNode {
    pub fn scalar(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_label: label.into(),
            ..Self::default()
        }
    }

    pub fn structure(
        name: impl Into<String>,
        label: impl Into<String>,
        fields: impl IntoIterator<Item = TypeNode>,
    ) -> Self {
        Self {
            name: name.into(),
            type_label: label.into(),
            fields: fields.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn slice(name: impl Into<String>, elem: TypeNode) -> Self {
        Self {
            name: name.into(),
            type_label: format!("[]{}", elem.type_label),
            is_slice: true,
            elem_type: Some(Box::new(elem.with_name(""))),
            ..Self::default()
        }
    }

    pub fn map(name: impl Into<String>, key: TypeNode, value: TypeNode) -> Self {
        Self {
            name: name.into(),
            type_label: format!("map[{}]{}", key.type_label, value.type_label),
            is_map: true,
            key_type: Some(Box::new(key.with_name(""))),
            elem_type: Some(Box::new(value.with_name(""))),
            ..Self::default()
        }
    }

    pub fn unknown() -> Self {
        Self::scalar("", UNKNOWN)
    }

    /// Anonymous struct whose fields are the named top-level variables.
    pub fn root(vars: impl IntoIterator<Item = TypeNode>) -> Self {
        Self::structure("", ROOT, vars)
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn kind(&self) -> TypeKind {
        if self.is_slice {
            TypeKind::Slice
        } else if self.is_map {
            TypeKind::Map
        } else if !self.fields.is_empty() {
            TypeKind::Struct
        } else if self.is_unknown() {
            TypeKind::Unknown
        } else {
            TypeKind::Scalar
        }
    }

    /// True for positions whose shape is not statically known.
    pub fn is_unknown(&self) -> bool {
        !self.is_slice
            && !self.is_map
            && self.fields.is_empty()
            && PERMISSIVE_LABELS.contains(&self.type_label.trim_start_matches('*'))
    }

    pub fn is_iterable(&self) -> bool {
        self.is_slice || self.is_map
    }

    pub fn field(&self, name: &str) -> Option<&TypeNode> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Element type of a slice, value type of a map.
    pub fn element(&self) -> Option<&TypeNode> {
        if self.is_iterable() {
            self.elem_type.as_deref()
        } else {
            None
        }
    }

    pub fn key(&self) -> Option<&TypeNode> {
        if self.is_map {
            self.key_type.as_deref()
        } else {
            None
        }
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Checks the structural invariants of the whole tree.
    ///
    /// # Errors
    ///
    /// Returns the first violation found in depth-first order.
    pub fn validate(&self) -> Result<(), TypeTreeError> {
        let name = || self.name.clone();
        let label = || self.type_label.clone();
        if self.is_slice && self.is_map {
            return Err(TypeTreeError::SliceAndMap {
                name: name(),
                label: label(),
            });
        }
        if self.is_iterable() && !self.fields.is_empty() {
            return Err(TypeTreeError::ContainerWithFields {
                name: name(),
                label: label(),
            });
        }
        if !self.is_map && self.key_type.is_some() {
            return Err(TypeTreeError::KeyOnNonMap {
                name: name(),
                label: label(),
            });
        }
        let mut seen = HashSet::new();
        for field in &self.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(TypeTreeError::DuplicateField {
                    label: self.type_label.clone(),
                    field: field.name.clone(),
                });
            }
            field.validate()?;
        }
        if let Some(elem) = &self.elem_type {
            elem.validate()?;
        }
        if let Some(key) = &self.key_type {
            key.validate()?;
        }
        Ok(())
    }

    /// Parses a single type tree from JSON and validates it.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or the tree violates an invariant.
    pub fn from_json_str(raw: &str) -> Result<Self, TypeTreeError> {
        let node: Self = serde_json::from_str(raw)?;
        node.validate()?;
        Ok(node)
    }
}

impl std::fmt::Display for TypeNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.type_label)
    }
}

/// Result of inferring the type of a template expression.
///
/// Same shape as [`TypeNode`] but computed rather than declared, e.g. the
/// `bool` returned by `gt` or the `string` returned by `printf`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferredType {
    #[serde(rename = "type")]
    pub type_label: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<TypeNode>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_slice: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_map: bool,
    #[serde(rename = "elem", default, skip_serializing_if = "Option::is_none")]
    pub elem_type: Option<Box<TypeNode>>,
    #[serde(rename = "key", default, skip_serializing_if = "Option::is_none")]
    pub key_type: Option<Box<TypeNode>>,
}

impl InferredType {
    pub fn is_unknown(&self) -> bool {
        self.as_type_node().is_unknown()
    }

    pub fn as_type_node(&self) -> TypeNode {
        TypeNode {
            name: String::new(),
            type_label: self.type_label.clone(),
            is_slice: self.is_slice,
            is_map: self.is_map,
            elem_type: self.elem_type.clone(),
            key_type: self.key_type.clone(),
            fields: self.fields.clone(),
        }
    }
}

impl From<TypeNode> for InferredType {
    fn from(node: TypeNode) -> Self {
        Self {
            type_label: node.type_label,
            fields: node.fields,
            is_slice: node.is_slice,
            is_map: node.is_map,
            elem_type: node.elem_type,
            key_type: node.key_type,
        }
    }
}

impl From<&TypeNode> for InferredType {
    fn from(node: &TypeNode) -> Self {
        node.clone().into()
    }
}

impl std::fmt::Display for InferredType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.type_label)
    }
}
