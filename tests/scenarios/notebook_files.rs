//! Notebooks read from and written to disk

use crate::helpers::*;
use nbflow::core::MetadataOverrides;
use nbflow::Notebook;

const NOTEBOOK: &str = r##"{
  "cells": [
    {
      "cell_type": "markdown",
      "metadata": {},
      "source": ["# Training\n"]
    },
    {
      "cell_type": "code",
      "execution_count": 1,
      "metadata": {"tags": ["pipeline-parameters"]},
      "outputs": [],
      "source": ["epochs = 3\n"]
    },
    {
      "cell_type": "code",
      "execution_count": 2,
      "metadata": {"tags": ["block:prepare"]},
      "outputs": [],
      "source": ["data = list(range(10))\n"]
    },
    {
      "cell_type": "code",
      "execution_count": 3,
      "metadata": {"tags": ["block:fit", "prev:prepare"]},
      "outputs": [],
      "source": ["weights = [d * epochs for d in data]\n"]
    }
  ],
  "metadata": {
    "kubeflow_notebook": {
      "experiment_name": "fit-experiment",
      "pipeline_name": "fit-pipeline",
      "docker_image": "python:3.8",
      "volumes": [
        {"mount_point": "/data", "name": "data-claim", "type": "pvc"}
      ]
    }
  },
  "nbformat": 4,
  "nbformat_minor": 4
}"##;

#[test]
fn test_compile_notebook_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fit.ipynb");
    std::fs::write(&path, NOTEBOOK).unwrap();

    let nb = Notebook::from_file(&path).unwrap();
    let meta = MetadataOverrides::from_notebook_value(nb.pipeline_metadata().unwrap())
        .unwrap()
        .resolve()
        .unwrap();
    assert_eq!(meta.pipeline_name, "fit-pipeline");
    assert_eq!(meta.volumes.len(), 1);

    let compilation = nbflow::Compiler::default().compile(&nb, &meta).unwrap();
    assert_eq!(ins(&compilation.analysis.graph, "fit"), vec!["data"]);
    assert!(compilation
        .pipeline
        .script
        .contains("pvolumes_dict['/data'] = dsl.PipelineVolume(pvc='data-claim')"));
    assert!(compilation.pipeline.script.contains("BASE_IMAGE = 'python:3.8'"));
}

#[test]
fn test_notebook_survives_rewrite() {
    let dir = tempfile::tempdir().unwrap();
    let nb = Notebook::from_json(NOTEBOOK).unwrap();
    let path = dir.path().join("copy.ipynb");
    std::fs::write(&path, nb.to_json().unwrap()).unwrap();

    let reread = Notebook::from_file(&path).unwrap();
    assert_eq!(reread.cells.len(), nb.cells.len());
    assert_eq!(reread.cells[3].source, nb.cells[3].source);
    assert_eq!(reread.cells[3].tags(), vec!["block:fit", "prev:prepare"]);

    let before = analyze(&nb).unwrap();
    let after = analyze(&reread).unwrap();
    assert_eq!(before.graph.to_json(), after.graph.to_json());
}
