//! Shared fixtures for the compile scenarios

#![allow(dead_code)]

use nbflow::compiler::{Analysis, Compilation, Compiler};
use nbflow::core::{Cell, CompileOptions, CompileResult, Notebook, PipelineMetadata, ResolvedGraph};

/// A code cell with the given tags
pub fn code(source: &str, tags: &[&str]) -> Cell {
    Cell::code(source, tags)
}

pub fn notebook(cells: Vec<Cell>) -> Notebook {
    Notebook::new(cells)
}

pub fn metadata(pipeline_name: &str) -> PipelineMetadata {
    PipelineMetadata {
        experiment_name: "scenarios".to_string(),
        pipeline_name: pipeline_name.to_string(),
        pipeline_description: "Scenario pipeline".to_string(),
        docker_image: "python:3.7".to_string(),
        volumes: Vec::new(),
        upload_pipeline: false,
        run_pipeline: false,
        kfp_host: None,
    }
}

pub fn analyze(notebook: &Notebook) -> CompileResult<Analysis> {
    Compiler::default().analyze(notebook)
}

pub fn analyze_with(notebook: &Notebook, options: CompileOptions) -> CompileResult<Analysis> {
    Compiler::new(options).analyze(notebook)
}

pub fn compile(notebook: &Notebook) -> CompileResult<Compilation> {
    Compiler::default().compile(notebook, &metadata("scenario"))
}

pub fn ins(graph: &ResolvedGraph, step: &str) -> Vec<String> {
    graph.step(step).map(|s| s.ins.iter().cloned().collect()).unwrap_or_default()
}

pub fn outs(graph: &ResolvedGraph, step: &str) -> Vec<String> {
    graph.step(step).map(|s| s.outs.iter().cloned().collect()).unwrap_or_default()
}

pub fn params_of(graph: &ResolvedGraph, step: &str) -> Vec<String> {
    graph
        .step(step)
        .map(|s| s.parameters.iter().cloned().collect())
        .unwrap_or_default()
}

pub fn preds(graph: &ResolvedGraph, step: &str) -> Vec<String> {
    graph.predecessors(step).into_iter().map(str::to_string).collect()
}

/// Assert the script defines each step function and its task, in order
pub fn assert_tasks_in_order(script: &str, steps: &[&str]) {
    let mut last = 0;
    for step in steps {
        let task = format!("{}_task = {}_op(", step, step);
        let pos = script
            .find(&task)
            .unwrap_or_else(|| panic!("task for '{}' not found in script", step));
        assert!(pos >= last, "task for '{}' is out of order", step);
        last = pos;
    }
}
