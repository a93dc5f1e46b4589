//! Compile error taxonomy

use thiserror::Error;

/// Errors raised while compiling a notebook into a pipeline.
///
/// Every variant is fatal for the document being compiled; nothing is
/// retried or partially recovered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("Invalid tag '{tag}' on cell {cell}: {reason}")]
    TagGrammar {
        cell: usize,
        tag: String,
        reason: String,
    },

    #[error("Cell {cell} has no block tag and {reason}")]
    UntaggedCell { cell: usize, reason: String },

    #[error("Step '{step}' declares unknown predecessor '{target}'")]
    UnresolvedReference { step: String, target: String },

    #[error("Found more than one pipeline-parameters cell (cells {first} and {second})")]
    DuplicateParametersBlock { first: usize, second: usize },

    #[error("Cycle detected in dependency graph involving step '{step}'")]
    CycleDetected { step: String },

    #[error("Parameter on line {line} is not a literal assignment: {source_line}")]
    NonLiteralParameter { line: usize, source_line: String },

    #[error("Parameter on line {line} does not fit in a 64-bit integer: {source_line}")]
    ParameterOutOfRange { line: usize, source_line: String },

    #[error("Invalid metrics statement on line {line}: {source_line}")]
    Metrics { line: usize, source_line: String },

    #[error("Syntax error in step '{step}' at line {line}: {message}")]
    Syntax {
        step: String,
        line: usize,
        message: String,
    },

    #[error("Step '{step}' reads variable '{variable}' which no upstream step produces")]
    UnresolvedVariable { step: String, variable: String },

    #[error("Code generation failed for step '{step}': {reason}")]
    CodeGen { step: String, reason: String },

    #[error("Invalid pipeline metadata: {0}")]
    InvalidMetadata(String),
}

impl CompileError {
    /// Name of the step the error is attached to, if any
    pub fn step(&self) -> Option<&str> {
        match self {
            CompileError::UnresolvedReference { step, .. }
            | CompileError::CycleDetected { step }
            | CompileError::Syntax { step, .. }
            | CompileError::UnresolvedVariable { step, .. }
            | CompileError::CodeGen { step, .. } => Some(step),
            _ => None,
        }
    }
}

pub type CompileResult<T> = Result<T, CompileError>;
