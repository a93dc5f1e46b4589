//! Variables flowing between steps

use crate::helpers::*;
use nbflow::core::config::{CompileOptions, ProducerScope};

#[test]
fn test_variable_flows_from_producer_to_consumer() {
    let nb = notebook(vec![
        code("import numpy as np", &["imports"]),
        code("x = np.zeros(3)", &["block:load"]),
        code("y = x + 1", &["block:transform", "prev:load"]),
        code("print(y)", &["block:report", "prev:transform"]),
    ]);
    let analysis = analyze(&nb).unwrap();
    let graph = &analysis.graph;

    assert_eq!(graph.execution_order(), vec!["load", "transform", "report"]);
    assert_eq!(outs(graph, "load"), vec!["x"]);
    assert_eq!(ins(graph, "transform"), vec!["x"]);
    assert_eq!(outs(graph, "transform"), vec!["y"]);
    assert_eq!(ins(graph, "report"), vec!["y"]);
    assert!(outs(graph, "report").is_empty());
    assert_eq!(graph.step("transform").unwrap().producers["x"], "load");
}

#[test]
fn test_prelude_names_never_become_inputs() {
    let nb = notebook(vec![
        code("import os\nscale = 3", &["imports"]),
        code("def helper(v):\n    return v * scale", &["functions"]),
        code("x = helper(2)\nroot = os.getcwd()", &["block:a"]),
        code("y = x * scale + len(root)", &["block:b", "prev:a"]),
    ]);
    let analysis = analyze(&nb).unwrap();
    let graph = &analysis.graph;

    assert_eq!(ins(graph, "b"), vec!["root", "x"]);
    assert!(ins(graph, "a").is_empty());
    assert_eq!(analysis.prelude.len(), 2);
}

#[test]
fn test_untagged_cells_join_previous_block() {
    let nb = notebook(vec![
        code("x = 1", &["block:a"]),
        code("x = x + 1", &[]),
        code("y = x", &["block:b", "prev:a"]),
    ]);
    let analysis = analyze(&nb).unwrap();

    assert_eq!(analysis.graph.step("a").unwrap().code.len(), 2);
    assert_eq!(ins(&analysis.graph, "b"), vec!["x"]);
}

#[test]
fn test_inferred_edge_with_preceding_scope() {
    let nb = notebook(vec![
        code("x = 1", &["block:a"]),
        code("y = x + 1", &["block:b"]),
    ]);

    assert!(analyze(&nb).is_err());

    let options = CompileOptions {
        producer_scope: ProducerScope::Preceding,
        ..Default::default()
    };
    let analysis = analyze_with(&nb, options).unwrap();
    assert_eq!(preds(&analysis.graph, "b"), vec!["a"]);
    assert_eq!(ins(&analysis.graph, "b"), vec!["x"]);
}

#[test]
fn test_nearest_producer_wins_in_diamond() {
    let nb = notebook(vec![
        code("data = [1, 2]", &["block:source"]),
        code("data = [d * 2 for d in data]", &["block:left", "prev:source"]),
        code("other = 1", &["block:right", "prev:source"]),
        code("total = sum(data) + other", &["block:sink", "prev:left", "prev:right"]),
    ]);
    let analysis = analyze(&nb).unwrap();
    let sink = analysis.graph.step("sink").unwrap();

    assert_eq!(sink.producers["data"], "left");
    assert_eq!(sink.producers["other"], "right");
    assert_eq!(ins(&analysis.graph, "left"), vec!["data"]);
}

#[test]
fn test_generated_script_wires_tasks() {
    let nb = notebook(vec![
        code("x = 1", &["block:a"]),
        code("y = x + 1", &["block:b", "prev:a"]),
    ]);
    let compilation = compile(&nb).unwrap();
    let script = &compilation.pipeline.script;

    assert_tasks_in_order(script, &["a", "b"]);
    assert!(script.contains("b_task = b_op(x=a_task.outputs['x']) \\"));
    assert!(script.contains("@dsl.pipeline("));
    assert!(script.contains("compiler.Compiler().compile(auto_generated_pipeline, pipeline_filename)"));
}

#[test]
fn test_compilation_is_deterministic() {
    let nb = notebook(vec![
        code("import math", &["imports"]),
        code("a1 = 1\nb1 = 2\nc1 = 3", &["block:first"]),
        code("d = math.sqrt(a1 + b1)", &["block:second", "prev:first"]),
        code("e = c1 + a1", &["block:third", "prev:first"]),
        code("f = d + e", &["block:fourth", "prev:second", "prev:third"]),
    ]);

    let first = compile(&nb).unwrap();
    for _ in 0..5 {
        let again = compile(&nb).unwrap();
        assert_eq!(again.pipeline.script, first.pipeline.script);
        assert_eq!(again.analysis.graph.to_json(), first.analysis.graph.to_json());
    }
}
