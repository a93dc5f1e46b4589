//! Documents the compiler rejects

use crate::helpers::*;
use nbflow::core::config::{CompileOptions, UntaggedCellPolicy};
use nbflow::CompileError;

#[test]
fn test_unresolved_variable_names_step_and_variable() {
    let nb = notebook(vec![
        code("x = 1", &["block:a"]),
        code("y = z + x", &["block:b", "prev:a"]),
    ]);
    let err = analyze(&nb).unwrap_err();

    assert_eq!(
        err,
        CompileError::UnresolvedVariable {
            step: "b".to_string(),
            variable: "z".to_string(),
        }
    );
    assert_eq!(err.step(), Some("b"));
}

#[test]
fn test_declared_cycle() {
    let nb = notebook(vec![
        code("x = 1", &["block:a", "prev:b"]),
        code("y = 2", &["block:b", "prev:a"]),
    ]);
    assert!(matches!(analyze(&nb), Err(CompileError::CycleDetected { .. })));
}

#[test]
fn test_unknown_predecessor() {
    let nb = notebook(vec![code("x = 1", &["block:a", "prev:missing"])]);
    assert!(matches!(
        analyze(&nb),
        Err(CompileError::UnresolvedReference { ref target, .. }) if target == "missing"
    ));
}

#[test]
fn test_syntax_error_is_attributed_to_step() {
    let nb = notebook(vec![
        code("x = 1", &["block:a"]),
        code("y = (x +", &["block:b", "prev:a"]),
    ]);
    assert!(matches!(analyze(&nb), Err(CompileError::Syntax { ref step, .. }) if step == "b"));
}

#[test]
fn test_bad_tags() {
    let nb = notebook(vec![code("x = 1", &["block:Not-Valid"])]);
    assert!(matches!(analyze(&nb), Err(CompileError::TagGrammar { cell: 0, .. })));

    let nb = notebook(vec![code("x = 1", &["stage:a"])]);
    assert!(matches!(analyze(&nb), Err(CompileError::TagGrammar { .. })));
}

#[test]
fn test_duplicate_parameters_block() {
    let nb = notebook(vec![
        code("n = 1", &["pipeline-parameters"]),
        code("x = n", &["block:a"]),
        code("m = 2", &["pipeline-parameters"]),
    ]);
    assert_eq!(
        analyze(&nb).unwrap_err(),
        CompileError::DuplicateParametersBlock { first: 0, second: 2 }
    );
}

#[test]
fn test_untagged_cells_rejected_by_policy() {
    let nb = notebook(vec![code("x = 1", &["block:a"]), code("y = x", &[])]);
    let options = CompileOptions {
        untagged_cells: UntaggedCellPolicy::Reject,
        ..Default::default()
    };
    assert!(matches!(
        analyze_with(&nb, options),
        Err(CompileError::UntaggedCell { cell: 1, .. })
    ));
}

#[test]
fn test_skipped_cells_are_ignored() {
    let nb = notebook(vec![
        code("x = 1", &["block:a"]),
        code("this is not python (", &["skip"]),
        code("y = x", &["block:b", "prev:a"]),
    ]);
    let analysis = analyze(&nb).unwrap();
    assert_eq!(analysis.graph.len(), 2);
}
