//! Cross-step dependency resolution

use crate::analysis::scope::{analyze_cells, StepScope};
use crate::core::config::ProducerScope;
use crate::core::error::{CompileError, CompileResult};
use crate::core::graph::{MetricBinding, ResolvedGraph, SkeletonGraph, StepGraph};
use crate::core::parameters::ParameterSet;
use crate::core::step::ResolvedStep;
use indexmap::IndexMap;
use rayon::prelude::*;
use std::collections::BTreeSet;
use tracing::{debug, trace};

/// Step name reported for errors in the shared prelude cells
pub const PRELUDE_STEP: &str = "imports";

/// Step name reported for unresolved metrics
pub const METRICS_STEP: &str = "pipeline_metrics";

/// Everything the analyzer needs besides the skeleton
#[derive(Debug, Clone, Copy)]
pub struct AnalysisContext<'a> {
    pub parameters: &'a ParameterSet,
    pub prelude: &'a [String],
    /// Metric key to variable name
    pub metrics: &'a IndexMap<String, String>,
    pub producer_scope: ProducerScope,
}

/// Infer each step's inputs and outputs and add the data edges they imply
pub fn analyze(skeleton: &SkeletonGraph, ctx: AnalysisContext<'_>) -> CompileResult<ResolvedGraph> {
    let prelude = analyze_cells(ctx.prelude).map_err(|e| CompileError::Syntax {
        step: PRELUDE_STEP.to_string(),
        line: e.line + 1,
        message: e.message,
    })?;
    let globals: BTreeSet<String> = prelude.bound.union(&prelude.writes).cloned().collect();

    let scopes = local_pass(skeleton)?;
    let mut graph = skeleton.graph().clone();
    let mut steps: Vec<ResolvedStep> = skeleton.steps().map(ResolvedStep::from_node).collect();

    let mut pass = 0;
    loop {
        pass += 1;
        let order = graph
            .topological_order()
            .map_err(|idx| CompileError::CycleDetected {
                step: graph.name(idx).to_string(),
            })?;

        let mut added = 0;
        for (position, &consumer) in order.iter().enumerate() {
            for var in &scopes[consumer].reads {
                if ctx.parameters.contains(var) {
                    steps[consumer].parameters.insert(var.clone());
                    continue;
                }
                if globals.contains(var) || steps[consumer].producers.contains_key(var) {
                    continue;
                }

                let producer = find_producer(&graph, &scopes, &order[..position], consumer, var, ctx.producer_scope)
                    .ok_or_else(|| CompileError::UnresolvedVariable {
                        step: steps[consumer].name.clone(),
                        variable: var.clone(),
                    })?;

                if graph.add_edge(producer, consumer) {
                    added += 1;
                }
                let producer_name = steps[producer].name.clone();
                trace!(var = %var, from = %producer_name, to = %steps[consumer].name, "resolved");
                steps[producer].outs.insert(var.clone());
                steps[consumer].ins.insert(var.clone());
                steps[consumer].producers.insert(var.clone(), producer_name);
            }
        }

        debug!(pass, edges_added = added, "dependency pass complete");
        if added == 0 {
            break;
        }
    }

    let metrics = bind_metrics(&graph, &scopes, &mut steps, ctx)?;
    let steps: IndexMap<String, ResolvedStep> =
        steps.into_iter().map(|s| (s.name.clone(), s)).collect();
    ResolvedGraph::from_parts(steps, graph, metrics)
}

/// Analyze every step on its own, in parallel
fn local_pass(skeleton: &SkeletonGraph) -> CompileResult<Vec<StepScope>> {
    let nodes: Vec<_> = skeleton.steps().collect();
    let results: Vec<CompileResult<StepScope>> = nodes
        .par_iter()
        .map(|node| {
            analyze_cells(&node.code).map_err(|e| CompileError::Syntax {
                step: node.name.clone(),
                line: e.line + 1,
                message: e.message,
            })
        })
        .collect();

    // Report the first failing step in document order
    results.into_iter().collect()
}

/// Nearest ancestor writing `var` (earliest-declared among equals), then,
/// when allowed, the closest step already ordered before the consumer
fn find_producer(
    graph: &StepGraph,
    scopes: &[StepScope],
    preceding: &[usize],
    consumer: usize,
    var: &str,
    producer_scope: ProducerScope,
) -> Option<usize> {
    let from_ancestors = graph
        .ancestors_by_distance(consumer)
        .into_iter()
        .map(|(idx, _)| idx)
        .find(|&idx| scopes[idx].writes.contains(var));

    match (from_ancestors, producer_scope) {
        (Some(idx), _) => Some(idx),
        (None, ProducerScope::Preceding) => preceding
            .iter()
            .rev()
            .copied()
            .find(|&idx| scopes[idx].writes.contains(var)),
        (None, ProducerScope::Ancestors) => None,
    }
}

/// Each metric comes from the last step, in execution order, that writes it.
/// A parameter is reported as the pipeline argument, like any other read of it.
fn bind_metrics(
    graph: &StepGraph,
    scopes: &[StepScope],
    steps: &mut [ResolvedStep],
    ctx: AnalysisContext<'_>,
) -> CompileResult<Vec<MetricBinding>> {
    let order = graph.topological_order().unwrap_or_default();
    let mut bindings = Vec::with_capacity(ctx.metrics.len());

    for (key, variable) in ctx.metrics {
        if ctx.parameters.contains(variable) {
            bindings.push(MetricBinding {
                key: key.clone(),
                variable: variable.clone(),
                producer: None,
            });
            continue;
        }

        let producer = order
            .iter()
            .rev()
            .copied()
            .find(|&idx| scopes[idx].writes.contains(variable))
            .ok_or_else(|| CompileError::UnresolvedVariable {
                step: METRICS_STEP.to_string(),
                variable: variable.clone(),
            })?;

        steps[producer].outs.insert(variable.clone());
        bindings.push(MetricBinding {
            key: key.clone(),
            variable: variable.clone(),
            producer: Some(steps[producer].name.clone()),
        });
    }
    Ok(bindings)
}
