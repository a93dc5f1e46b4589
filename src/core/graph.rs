//! Step dependency graph
//!
//! Nodes are indexed by first-appearance order in the document, and that
//! index is the tie-break everywhere an order has to be chosen.

use crate::core::error::{CompileError, CompileResult};
use crate::core::step::{ResolvedStep, StepNode};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{json, Value};
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, VecDeque};

/// Directed graph over step indices
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepGraph {
    names: Vec<String>,
    predecessors: Vec<BTreeSet<usize>>,
    successors: Vec<BTreeSet<usize>>,
}

impl StepGraph {
    /// Create a graph with the given nodes and no edges
    pub fn with_nodes<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let n = names.len();
        Self {
            names,
            predecessors: vec![BTreeSet::new(); n],
            successors: vec![BTreeSet::new(); n],
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, idx: usize) -> &str {
        &self.names[idx]
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Add edge `from -> to`; returns false if it was already present
    pub fn add_edge(&mut self, from: usize, to: usize) -> bool {
        self.successors[from].insert(to);
        self.predecessors[to].insert(from)
    }

    pub fn has_edge(&self, from: usize, to: usize) -> bool {
        self.predecessors[to].contains(&from)
    }

    pub fn predecessors(&self, idx: usize) -> impl Iterator<Item = usize> + '_ {
        self.predecessors[idx].iter().copied()
    }

    pub fn successors(&self, idx: usize) -> impl Iterator<Item = usize> + '_ {
        self.successors[idx].iter().copied()
    }

    /// All edges as `(from, to)`, sorted
    pub fn edges(&self) -> Vec<(usize, usize)> {
        let mut edges = Vec::new();
        for (to, preds) in self.predecessors.iter().enumerate() {
            for &from in preds {
                edges.push((from, to));
            }
        }
        edges.sort();
        edges
    }

    /// Topological order with ties broken by first appearance.
    ///
    /// On a cycle, returns the lowest-indexed node left unordered.
    pub fn topological_order(&self) -> Result<Vec<usize>, usize> {
        let mut in_degree: Vec<usize> = self.predecessors.iter().map(|p| p.len()).collect();
        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut order = Vec::with_capacity(self.len());
        while let Some(Reverse(idx)) = ready.pop() {
            order.push(idx);
            for succ in self.successors(idx) {
                in_degree[succ] -= 1;
                if in_degree[succ] == 0 {
                    ready.push(Reverse(succ));
                }
            }
        }

        if order.len() == self.len() {
            Ok(order)
        } else {
            let placed: BTreeSet<usize> = order.into_iter().collect();
            Err((0..self.len()).find(|i| !placed.contains(i)).unwrap_or(0))
        }
    }

    /// Ancestors of `idx` with their hop distance, nearest first, ties by index
    pub fn ancestors_by_distance(&self, idx: usize) -> Vec<(usize, usize)> {
        let mut distance: Vec<Option<usize>> = vec![None; self.len()];
        let mut queue = VecDeque::new();
        distance[idx] = Some(0);
        queue.push_back(idx);

        while let Some(node) = queue.pop_front() {
            let d = distance[node].unwrap_or(0);
            for pred in self.predecessors(node) {
                if distance[pred].is_none() {
                    distance[pred] = Some(d + 1);
                    queue.push_back(pred);
                }
            }
        }

        let mut found: Vec<(usize, usize)> = distance
            .into_iter()
            .enumerate()
            .filter_map(|(i, d)| d.filter(|_| i != idx).map(|d| (i, d)))
            .collect();
        found.sort_by_key(|&(i, d)| (d, i));
        found
    }

    /// Whether `ancestor` reaches `idx`
    pub fn is_ancestor(&self, ancestor: usize, idx: usize) -> bool {
        self.ancestors_by_distance(idx).iter().any(|&(i, _)| i == ancestor)
    }
}

/// The parser's output: steps and their declared edges, checked acyclic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkeletonGraph {
    steps: IndexMap<String, StepNode>,
    graph: StepGraph,
}

impl SkeletonGraph {
    /// Build from parsed steps, resolving `prev:` names and rejecting cycles
    pub fn new(steps: IndexMap<String, StepNode>) -> CompileResult<Self> {
        let mut graph = StepGraph::with_nodes(steps.keys().cloned());

        for (to, step) in steps.values().enumerate() {
            for dep in &step.declared_deps {
                let from = steps.get_index_of(dep).ok_or_else(|| {
                    CompileError::UnresolvedReference {
                        step: step.name.clone(),
                        target: dep.clone(),
                    }
                })?;
                graph.add_edge(from, to);
            }
        }

        graph
            .topological_order()
            .map_err(|idx| CompileError::CycleDetected {
                step: graph.name(idx).to_string(),
            })?;

        Ok(Self { steps, graph })
    }

    pub fn steps(&self) -> impl Iterator<Item = &StepNode> {
        self.steps.values()
    }

    pub fn step(&self, name: &str) -> Option<&StepNode> {
        self.steps.get(name)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn graph(&self) -> &StepGraph {
        &self.graph
    }

    /// Step names in deterministic topological order
    pub fn execution_order(&self) -> Vec<String> {
        self.graph
            .topological_order()
            .map(|order| order.into_iter().map(|i| self.graph.name(i).to_string()).collect())
            .unwrap_or_default()
    }
}

/// A pipeline metric and the step whose output feeds it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricBinding {
    /// Name shown in the pipeline UI
    pub key: String,
    pub variable: String,
    /// `None` when the metric reports a pipeline parameter
    pub producer: Option<String>,
}

/// The analyzer's output: every step annotated with its inputs, outputs and
/// the producer of each input. Only the dependency analyzer builds one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedGraph {
    steps: IndexMap<String, ResolvedStep>,
    graph: StepGraph,
    order: Vec<usize>,
    metrics: Vec<MetricBinding>,
}

impl ResolvedGraph {
    pub(crate) fn from_parts(
        steps: IndexMap<String, ResolvedStep>,
        graph: StepGraph,
        metrics: Vec<MetricBinding>,
    ) -> CompileResult<Self> {
        let order = graph
            .topological_order()
            .map_err(|idx| CompileError::CycleDetected {
                step: graph.name(idx).to_string(),
            })?;
        Ok(Self {
            steps,
            graph,
            order,
            metrics,
        })
    }

    /// Steps in declaration order
    pub fn steps(&self) -> impl Iterator<Item = &ResolvedStep> {
        self.steps.values()
    }

    pub fn step(&self, name: &str) -> Option<&ResolvedStep> {
        self.steps.get(name)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn graph(&self) -> &StepGraph {
        &self.graph
    }

    pub fn metrics(&self) -> &[MetricBinding] {
        &self.metrics
    }

    /// Steps in deterministic topological order
    pub fn ordered_steps(&self) -> impl Iterator<Item = &ResolvedStep> {
        self.order.iter().filter_map(move |&i| self.steps.get_index(i).map(|(_, s)| s))
    }

    pub fn execution_order(&self) -> Vec<String> {
        self.ordered_steps().map(|s| s.name.clone()).collect()
    }

    /// Names of the direct predecessors of a step, in declaration order
    pub fn predecessors(&self, name: &str) -> Vec<&str> {
        match self.graph.index_of(name) {
            Some(idx) => self.graph.predecessors(idx).map(|p| self.graph.name(p)).collect(),
            None => Vec::new(),
        }
    }

    /// Steps nothing depends on
    pub fn sinks(&self) -> Vec<&str> {
        self.order
            .iter()
            .filter(|&&i| self.graph.successors(i).next().is_none())
            .map(|&i| self.graph.name(i))
            .collect()
    }

    /// All edges as `(from, to)` step names
    pub fn named_edges(&self) -> Vec<(&str, &str)> {
        self.graph
            .edges()
            .into_iter()
            .map(|(from, to)| (self.graph.name(from), self.graph.name(to)))
            .collect()
    }

    /// Annotated graph as JSON, steps in execution order
    pub fn to_json(&self) -> Value {
        let steps: Vec<Value> = self
            .ordered_steps()
            .map(|step| {
                json!({
                    "name": step.name,
                    "predecessors": self.predecessors(&step.name),
                    "parameters": step.parameters,
                    "ins": step.ins,
                    "outs": step.outs,
                    "producers": step.producers,
                })
            })
            .collect();
        json!({ "steps": steps, "metrics": self.metrics })
    }
}
