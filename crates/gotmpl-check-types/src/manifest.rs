use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{TypeNode, TypeTreeError};

/// Top-level variables made available to templates.
///
/// ```yaml
/// globals:
///   - { name: Company, type: Company, fields: [{ name: Name, type: string }] }
/// templates:
///   views/drugs.html:
///     - name: Drugs
///       type: "[]Drug"
///       is_slice: true
///       elem: { type: Drug, fields: [{ name: Name, type: string }] }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeManifest {
    #[serde(default)]
    pub globals: Vec<TypeNode>,
    #[serde(default)]
    pub templates: BTreeMap<String, Vec<TypeNode>>,
}

impl TypeManifest {
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or a type tree is invalid.
    pub fn from_json_str(raw: &str) -> Result<Self, TypeTreeError> {
        let manifest: Self = serde_json::from_str(raw)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// # Errors
    ///
    /// Returns an error if the YAML is malformed or a type tree is invalid.
    pub fn from_yaml_str(raw: &str) -> Result<Self, TypeTreeError> {
        let manifest: Self = serde_yaml::from_str(raw)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// # Errors
    ///
    /// Returns the first invariant violation of any contained type tree.
    pub fn validate(&self) -> Result<(), TypeTreeError> {
        self.globals
            .iter()
            .chain(self.templates.values().flatten())
            .try_for_each(TypeNode::validate)
    }

    /// Variables bound to the template at `path`.
    ///
    /// Keys match either exactly or as a trailing path suffix, so
    /// `views/a.html` applies to `/srv/app/views/a.html`.
    pub fn template_vars(&self, path: &str) -> Option<&[TypeNode]> {
        let path = path.replace('\\', "/");
        self.templates
            .iter()
            .filter(|(key, _)| {
                let key = key.trim_start_matches("./");
                path == key || path.ends_with(&format!("/{key}"))
            })
            .max_by_key(|(key, _)| key.len())
            .map(|(_, vars)| vars.as_slice())
    }

    /// Root type for the template at `path`.
    ///
    /// Template-specific variables shadow globals of the same name.
    pub fn root_for(&self, path: &str) -> TypeNode {
        let mut vars: Vec<TypeNode> = Vec::new();
        let specific = self.template_vars(path).unwrap_or_default();
        for global in &self.globals {
            if !specific.iter().any(|v| v.name == global.name) {
                vars.push(global.clone());
            }
        }
        vars.extend(specific.iter().cloned());
        TypeNode::root(vars)
    }
}
