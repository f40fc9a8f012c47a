use std::collections::{BTreeMap, BTreeSet};

use gotmpl_check_analyzer::{DependencyEdge, DependencyKind, Diagnostic, DiagnosticKind, Severity};

/// Which templates define and call which named templates, across a batch.
#[derive(Debug, Clone, Default)]
pub struct TemplateGraph {
    /// Name to the files defining it.
    definitions: BTreeMap<String, BTreeSet<String>>,
    calls: Vec<DependencyEdge>,
}

impl TemplateGraph {
    pub fn new(edges: impl IntoIterator<Item = DependencyEdge>) -> Self {
        let mut graph = Self::default();
        for edge in edges {
            graph.add(edge);
        }
        graph
    }

    pub fn add(&mut self, edge: DependencyEdge) {
        match edge.kind {
            DependencyKind::Define | DependencyKind::Block => {
                self.definitions
                    .entry(edge.name)
                    .or_default()
                    .insert(edge.file);
            }
            DependencyKind::Template => self.calls.push(edge),
        }
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    /// Files that define `name`.
    pub fn defined_in(&self, name: &str) -> impl Iterator<Item = &str> {
        self.definitions
            .get(name)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    pub fn callers<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a DependencyEdge> {
        self.calls.iter().filter(move |call| call.name == name)
    }

    /// One error per `template` call whose name has no `define` or `block`.
    pub fn unresolved(&self) -> Vec<Diagnostic> {
        self.calls
            .iter()
            .filter(|call| !self.is_defined(&call.name))
            .map(|call| {
                let raw = if call.context.is_empty() {
                    format!("template {:?}", call.name)
                } else {
                    format!("template {:?} {}", call.name, call.context)
                };
                Diagnostic {
                    kind: DiagnosticKind::UnresolvedTemplateCall,
                    message: format!("no template named {:?} is defined", call.name),
                    file: call.file.clone(),
                    line: call.line,
                    col: call.col,
                    severity: Severity::Error,
                    variable: call.name.clone(),
                    raw,
                }
            })
            .collect()
    }
}
