//! Parameter sweeps

use crate::helpers::*;
use nbflow::compiler::Compiler;
use nbflow::SweepExpander;

#[test]
fn test_each_combination_compiles_with_its_values() {
    let nb = notebook(vec![
        code("n = 1\nlr = 0.01", &["pipeline-parameters"]),
        code("x = n * lr", &["block:train"]),
    ]);
    let sweep = SweepExpander::from_yaml("n: [2, 3]\nlr: [0.1, 0.5]").unwrap();
    let documents = sweep.expand(&nb);
    assert_eq!(documents.len(), 4);

    let compiler = Compiler::default();
    let base = metadata("train");
    let mut names = Vec::new();
    for document in &documents {
        let meta = base.with_suffix(&document.suffix);
        meta.validate().unwrap();
        let compilation = compiler.compile(&document.notebook, &meta).unwrap();

        let n = compilation.analysis.parameters.get("n").unwrap().default.to_python();
        assert!(compilation
            .pipeline
            .script
            .contains(&format!("def auto_generated_pipeline(n: int = {}, ", n)));
        names.push(meta.pipeline_name);
    }

    assert_eq!(
        names,
        vec!["train-n-2-lr-0-1", "train-n-2-lr-0-5", "train-n-3-lr-0-1", "train-n-3-lr-0-5"]
    );
}

#[test]
fn test_sweep_adds_parameters_cell() {
    let nb = notebook(vec![code("x = seed + 1", &["block:a"])]);
    let documents = SweepExpander::from_yaml("seed: 42").unwrap().expand(&nb);
    let analysis = analyze(&documents[0].notebook).unwrap();

    assert_eq!(params_of(&analysis.graph, "a"), vec!["seed"]);
    assert!(ins(&analysis.graph, "a").is_empty());
}
