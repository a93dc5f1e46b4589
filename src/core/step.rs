//! Step domain model

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// A step as built by the document parser: a named block of cells plus its
/// declared predecessors
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepNode {
    /// Unique step name (from the `block:` tag)
    pub name: String,

    /// Cell sources belonging to this step, in document order
    pub code: Vec<String>,

    /// Steps named by `prev:` tags, in declaration order
    pub declared_deps: Vec<String>,
}

impl StepNode {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            code: Vec::new(),
            declared_deps: Vec::new(),
        }
    }

    /// Append a cell to the step
    pub fn push_cell(&mut self, source: &str) {
        self.code.push(source.to_string());
    }

    /// Declare a predecessor (ignoring repeats)
    pub fn declare_dep(&mut self, name: &str) {
        if !self.declared_deps.iter().any(|d| d == name) {
            self.declared_deps.push(name.to_string());
        }
    }

    /// The step body as one source text
    pub fn source(&self) -> String {
        join_cells(&self.code)
    }
}

/// A step after dependency resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedStep {
    pub name: String,

    pub code: Vec<String>,

    pub declared_deps: Vec<String>,

    /// Variables supplied by upstream steps
    pub ins: BTreeSet<String>,

    /// Variables consumed by downstream steps
    pub outs: BTreeSet<String>,

    /// Pipeline parameters the step references
    pub parameters: BTreeSet<String>,

    /// Which upstream step supplies each of `ins`
    pub producers: BTreeMap<String, String>,
}

impl ResolvedStep {
    pub(crate) fn from_node(node: &StepNode) -> Self {
        Self {
            name: node.name.clone(),
            code: node.code.clone(),
            declared_deps: node.declared_deps.clone(),
            ins: BTreeSet::new(),
            outs: BTreeSet::new(),
            parameters: BTreeSet::new(),
            producers: BTreeMap::new(),
        }
    }

    pub fn source(&self) -> String {
        join_cells(&self.code)
    }
}

/// Concatenate cells, making sure each starts on its own line
pub fn join_cells(cells: &[String]) -> String {
    let mut out = String::new();
    for cell in cells {
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(cell);
    }
    out
}
