//! Static analysis of step source code
//!
//! A lightweight Python tokenizer feeds a name-scope walker; the resolver
//! turns per-step reads and writes into data edges between steps.

pub mod builtins;
pub mod extract;
pub mod lexer;
pub mod resolver;
pub mod scope;

pub use extract::{extract_metrics, extract_parameters};
pub use resolver::{analyze, AnalysisContext};
pub use scope::{analyze_cells, StepScope};
