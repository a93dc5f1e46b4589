//! Notebook to pipeline compilation
//!
//! The parser builds a step skeleton from tagged cells, the analyzer infers
//! data dependencies, and the generator renders the pipeline script.

pub mod codegen;
pub mod parser;
pub mod session;

pub use codegen::{generate, GenerateInput, GeneratedPipeline};
pub use parser::{parse, ParsedDocument};
pub use session::{Analysis, Compilation, CompileEvent, Compiler, EventHandler};
