use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use gotmpl_check_analyzer::{AnalyzerOptions, BlockContext};
use gotmpl_check_expr::{FuncSignature, FuncTable};
use gotmpl_check_template::{Delimiters, ParseOptions};
use serde::{Deserialize, Serialize};

use crate::error::{CliError, CliResult};

pub const CONFIG_FILE_NAME: &str = ".gotmpl-check.yaml";

/// Project configuration, usually read from `.gotmpl-check.yaml`.
///
/// ```yaml
/// extensions: [html, tmpl]
/// delimiters: { left: "[[", right: "]]" }
/// block_context: inherit
/// report_unknown_functions: true
/// funcs:
///   upper: { arity: 1, returns: string }
///   default: { arity: 2, returns: first_arg }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// File extensions treated as templates, without the leading dot.
    pub extensions: Vec<String>,
    pub delimiters: Delimiters,
    pub block_context: BlockContext,
    pub report_unknown_functions: bool,
    /// Functions registered on top of the builtins.
    pub funcs: BTreeMap<String, FuncSignature>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            extensions: ["tmpl", "gohtml", "gotmpl", "html", "tpl"]
                .into_iter()
                .map(String::from)
                .collect(),
            delimiters: Delimiters::default(),
            block_context: BlockContext::default(),
            report_unknown_functions: false,
            funcs: BTreeMap::new(),
        }
    }
}

impl Config {
    /// # Errors
    ///
    /// Fails if the file cannot be read or is not a valid config.
    pub fn load(path: &Path) -> CliResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| CliError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&raw).map_err(|source| CliError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    /// # Errors
    ///
    /// Fails on malformed YAML or unknown arity/return specs.
    pub fn from_yaml_str(raw: &str) -> Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }

    /// Looks for [`CONFIG_FILE_NAME`] in `dir` and its ancestors.
    pub fn find(dir: &Path) -> Option<PathBuf> {
        dir.ancestors()
            .map(|dir| dir.join(CONFIG_FILE_NAME))
            .find(|candidate| candidate.is_file())
    }

    pub fn is_template(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|allowed| allowed == ext))
    }

    pub fn analyzer_options(&self) -> AnalyzerOptions {
        let mut funcs = FuncTable::default();
        funcs.extend(self.funcs.clone());
        AnalyzerOptions {
            parse: ParseOptions {
                delimiters: self.delimiters.clone(),
            },
            block_context: self.block_context,
            report_unknown_functions: self.report_unknown_functions,
            funcs,
        }
    }
}
