//! Notebook to step skeleton

use crate::core::config::{CompileOptions, UntaggedCellPolicy};
use crate::core::error::{CompileError, CompileResult};
use crate::core::graph::SkeletonGraph;
use crate::core::notebook::Notebook;
use crate::core::step::{join_cells, StepNode};
use crate::core::tags::{classify_cell, CellRole};
use indexmap::IndexMap;
use tracing::debug;

/// Output of the document parser
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDocument {
    pub graph: SkeletonGraph,
    /// Source of the pipeline-parameters cell, if any
    pub parameters_block: Option<String>,
    /// Import and function cells shared by every step
    pub prelude: Vec<String>,
    /// Pipeline-metrics cells, joined
    pub metrics_block: Option<String>,
}

/// Group tagged cells into steps and collect the special cells
pub fn parse(notebook: &Notebook, options: &CompileOptions) -> CompileResult<ParsedDocument> {
    let mut steps: IndexMap<String, StepNode> = IndexMap::new();
    let mut current: Option<String> = None;
    let mut parameters: Option<(usize, String)> = None;
    let mut prelude = Vec::new();
    let mut metrics = Vec::new();

    for (idx, cell) in notebook.cells.iter().enumerate() {
        if !cell.is_code() || cell.is_blank() {
            continue;
        }

        match classify_cell(idx, &cell.tags())? {
            CellRole::Skip => {}
            CellRole::Parameters => {
                if let Some((first, _)) = &parameters {
                    return Err(CompileError::DuplicateParametersBlock {
                        first: *first,
                        second: idx,
                    });
                }
                parameters = Some((idx, cell.source.clone()));
            }
            CellRole::Metrics => metrics.push(cell.source.clone()),
            CellRole::Prelude => prelude.push(cell.source.clone()),
            CellRole::Block { name, prev } => {
                let step = steps
                    .entry(name.clone())
                    .or_insert_with(|| StepNode::new(&name));
                step.push_cell(&cell.source);
                for dep in &prev {
                    step.declare_dep(dep);
                }
                current = Some(name);
            }
            CellRole::Untagged { prev } => {
                if options.untagged_cells == UntaggedCellPolicy::Reject {
                    return Err(CompileError::UntaggedCell {
                        cell: idx,
                        reason: "untagged cells are not allowed".to_string(),
                    });
                }
                let step = current
                    .as_ref()
                    .and_then(|name| steps.get_mut(name))
                    .ok_or_else(|| CompileError::UntaggedCell {
                        cell: idx,
                        reason: "no block precedes it".to_string(),
                    })?;
                step.push_cell(&cell.source);
                for dep in &prev {
                    step.declare_dep(dep);
                }
            }
        }
    }

    for step in steps.values() {
        debug!(step = %step.name, cells = step.code.len(), prev = ?step.declared_deps, "parsed step");
    }

    Ok(ParsedDocument {
        graph: SkeletonGraph::new(steps)?,
        parameters_block: parameters.map(|(_, source)| source),
        prelude,
        metrics_block: (!metrics.is_empty()).then(|| join_cells(&metrics)),
    })
}
