//! nbflow - compile annotated Jupyter notebooks into Kubeflow pipelines

pub mod analysis;
pub mod backend;
pub mod cli;
pub mod compiler;
pub mod core;

// Re-export commonly used types
pub use backend::{Deployer, PythonDeployer, SnapshotCommand, StaticVolumes, SweepExpander, VolumeResolver};
pub use compiler::{Compilation, CompileEvent, Compiler, GeneratedPipeline};
pub use core::{CompileError, CompileOptions, CompileResult, Notebook, PipelineMetadata, ResolvedGraph, ToolConfig};
