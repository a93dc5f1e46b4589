//! Notebook magics and shell escapes

use crate::helpers::*;

#[test]
fn test_magics_do_not_affect_analysis() {
    let nb = notebook(vec![
        code("%matplotlib inline\nx = 1", &["block:a"]),
        code("!pip list\ny = x", &["block:b", "prev:a"]),
    ]);
    let analysis = analyze(&nb).unwrap();
    assert_eq!(ins(&analysis.graph, "b"), vec!["x"]);
}

#[test]
fn test_magics_disabled_in_generated_code() {
    let nb = notebook(vec![
        code("%matplotlib inline\nx = 1", &["block:a"]),
        code("%%bash\necho $HOME", &["block:b", "prev:a"]),
    ]);
    let compilation = compile(&nb).unwrap();
    let script = &compilation.pipeline.script;

    assert!(script.contains("    pass  # %matplotlib inline\n"));
    assert!(script.contains("    # %%bash\n"));
    assert!(script.contains("    # echo $HOME\n"));
    assert!(ins(&compilation.analysis.graph, "b").is_empty());
}
