//! Core domain models for nbflow
//!
//! This module defines the notebook document, the step graph in its
//! successive states, pipeline parameters and configuration.

pub mod config;
pub mod error;
pub mod graph;
pub mod notebook;
pub mod parameters;
pub mod step;
pub mod tags;

pub use config::{CompileOptions, MetadataOverrides, PipelineMetadata, ToolConfig, VolumeSpec};
pub use error::{CompileError, CompileResult};
pub use graph::{MetricBinding, ResolvedGraph, SkeletonGraph, StepGraph};
pub use notebook::{Cell, Notebook};
pub use parameters::{ParamType, ParamValue, Parameter, ParameterSet};
pub use step::{ResolvedStep, StepNode};
