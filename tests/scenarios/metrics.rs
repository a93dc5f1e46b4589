//! Pipeline metrics

use crate::helpers::*;
use nbflow::CompileError;

#[test]
fn test_metrics_bind_to_producing_step() {
    let nb = notebook(vec![
        code("model = 'fit'", &["block:train"]),
        code("test_acc = 0.9\nloss = 0.1", &["block:evaluate", "prev:train"]),
        code("print(test_acc)\nprint(loss)", &["pipeline-metrics"]),
    ]);
    let compilation = compile(&nb).unwrap();
    let metrics = compilation.analysis.graph.metrics();

    assert_eq!(metrics.len(), 2);
    assert_eq!(metrics[0].key, "test-acc");
    assert_eq!(metrics[0].producer.as_deref(), Some("evaluate"));
    assert_eq!(outs(&compilation.analysis.graph, "evaluate"), vec!["loss", "test_acc"]);

    let script = &compilation.pipeline.script;
    assert!(script.contains("def pipeline_metrics(test_acc: str, loss: str)"));
    assert!(script.contains("('test-acc', _nbflow_load(test_acc)),"));
    assert!(script.contains(".after(evaluate_task)"));
}

#[test]
fn test_unproduced_metric() {
    let nb = notebook(vec![
        code("x = 1", &["block:a"]),
        code("print(accuracy)", &["pipeline-metrics"]),
    ]);
    assert_eq!(
        analyze(&nb).unwrap_err(),
        CompileError::UnresolvedVariable {
            step: "pipeline_metrics".to_string(),
            variable: "accuracy".to_string(),
        }
    );
}

#[test]
fn test_metrics_block_only_prints_names() {
    let nb = notebook(vec![
        code("x = 1", &["block:a"]),
        code("print(x + 1)", &["pipeline-metrics"]),
    ]);
    assert!(matches!(analyze(&nb), Err(CompileError::Metrics { line: 1, .. })));
}

#[test]
fn test_parameter_metric_reports_pipeline_argument() {
    let nb = notebook(vec![
        code("n = 3", &["pipeline-parameters"]),
        code("n = n + 1\nx = n", &["block:a"]),
        code("print(n)", &["pipeline-metrics"]),
    ]);
    let compilation = compile(&nb).unwrap();
    let graph = &compilation.analysis.graph;

    assert_eq!(graph.metrics()[0].producer, None);
    assert_eq!(outs(graph, "a"), Vec::<String>::new());

    let script = &compilation.pipeline.script;
    assert!(script.contains("def pipeline_metrics(n: int)"));
    assert!(script.contains("('n', n),"));
    assert!(script.contains("pipeline_metrics_task = pipeline_metrics_op(n=n) \\"));
    assert!(!script.contains(".after("));
}
