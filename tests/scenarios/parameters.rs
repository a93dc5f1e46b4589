//! Pipeline parameters

use crate::helpers::*;
use nbflow::CompileError;

#[test]
fn test_parameters_are_arguments_not_data() {
    let nb = notebook(vec![
        code("n = 5\nrate = 0.1\nlabel = 'run'", &["pipeline-parameters"]),
        code("x = n * 2", &["block:a"]),
        code("y = x * rate", &["block:b", "prev:a"]),
    ]);
    let compilation = compile(&nb).unwrap();
    let graph = &compilation.analysis.graph;

    assert_eq!(params_of(graph, "a"), vec!["n"]);
    assert_eq!(params_of(graph, "b"), vec!["rate"]);
    assert_eq!(ins(graph, "b"), vec!["x"]);
    for step in graph.steps() {
        assert!(!step.ins.contains("n") && !step.outs.contains("n"));
    }

    let script = &compilation.pipeline.script;
    assert!(script.contains("def auto_generated_pipeline(n: int = 5, rate: float = 0.1, label: str = 'run'):"));
    assert!(script.contains("def a(n: int) -> "));
    assert!(script.contains("def b(rate: float, x: str):"));
    assert!(script.contains("a_task = a_op(n=n) \\"));
}

#[test]
fn test_later_assignment_overrides_default() {
    let nb = notebook(vec![
        code("n = 1\nn = 7", &["pipeline-parameters"]),
        code("x = n", &["block:a"]),
    ]);
    let analysis = analyze(&nb).unwrap();
    assert_eq!(analysis.parameters.len(), 1);
    assert_eq!(analysis.parameters.get("n").unwrap().default.to_python(), "7");
}

#[test]
fn test_non_literal_parameter_rejected() {
    let nb = notebook(vec![
        code("n = 5\nm = n * 2", &["pipeline-parameters"]),
        code("x = m", &["block:a"]),
    ]);
    assert!(matches!(
        analyze(&nb),
        Err(CompileError::NonLiteralParameter { line: 2, .. })
    ));
}
