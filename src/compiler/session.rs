//! Compilation session - runs the parser, analyzer and generator in turn

use crate::analysis::{analyze, extract_metrics, extract_parameters, AnalysisContext};
use crate::compiler::codegen::{generate, GenerateInput, GeneratedPipeline};
use crate::compiler::parser::parse;
use crate::core::{CompileOptions, CompileResult, Notebook, ParameterSet, PipelineMetadata, ResolvedGraph};
use chrono::Utc;
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Events emitted while a document is compiled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileEvent {
    CompileStarted {
        pipeline_name: String,
    },
    DocumentParsed {
        steps: usize,
        prelude_cells: usize,
    },
    ParametersExtracted {
        names: Vec<String>,
    },
    DependenciesResolved {
        edges: usize,
        order: Vec<String>,
    },
    CodeGenerated {
        pipeline_name: String,
        bytes: usize,
    },
    CompileFailed {
        error: String,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(CompileEvent) + Send + Sync>;

/// Result of the analysis stages
#[derive(Debug, Clone)]
pub struct Analysis {
    pub parameters: ParameterSet,
    pub prelude: Vec<String>,
    pub graph: ResolvedGraph,
}

/// Result of a full compilation
#[derive(Debug, Clone)]
pub struct Compilation {
    pub analysis: Analysis,
    pub pipeline: GeneratedPipeline,
}

/// Compiles notebooks into pipeline scripts
#[derive(Clone, Default)]
pub struct Compiler {
    options: CompileOptions,
    event_handlers: Vec<EventHandler>,
}

impl Compiler {
    pub fn new(options: CompileOptions) -> Self {
        Self {
            options,
            event_handlers: Vec::new(),
        }
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(CompileEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
    }

    fn emit_event(&self, event: CompileEvent) {
        for handler in &self.event_handlers {
            handler(event.clone());
        }
    }

    /// Parse the notebook and resolve step dependencies
    pub fn analyze(&self, notebook: &Notebook) -> CompileResult<Analysis> {
        let result = self.run_analysis(notebook);
        if let Err(e) = &result {
            self.emit_event(CompileEvent::CompileFailed { error: e.to_string() });
        }
        result
    }

    fn run_analysis(&self, notebook: &Notebook) -> CompileResult<Analysis> {
        let parsed = parse(notebook, &self.options)?;
        self.emit_event(CompileEvent::DocumentParsed {
            steps: parsed.graph.len(),
            prelude_cells: parsed.prelude.len(),
        });
        if parsed.graph.is_empty() {
            warn!("Notebook has no block-tagged cells; the pipeline will have no steps");
        }

        let parameters = match &parsed.parameters_block {
            Some(block) => extract_parameters(block)?,
            None => ParameterSet::new(),
        };
        debug!(parameters = parameters.len(), "extracted pipeline parameters");
        self.emit_event(CompileEvent::ParametersExtracted {
            names: parameters.names().map(str::to_string).collect(),
        });

        let metrics = match &parsed.metrics_block {
            Some(block) => extract_metrics(block)?,
            None => IndexMap::new(),
        };

        let graph = analyze(
            &parsed.graph,
            AnalysisContext {
                parameters: &parameters,
                prelude: &parsed.prelude,
                metrics: &metrics,
                producer_scope: self.options.producer_scope,
            },
        )?;
        self.emit_event(CompileEvent::DependenciesResolved {
            edges: graph.graph().edges().len(),
            order: graph.execution_order(),
        });

        Ok(Analysis {
            parameters,
            prelude: parsed.prelude,
            graph,
        })
    }

    /// Compile a notebook into a pipeline script
    pub fn compile(&self, notebook: &Notebook, metadata: &PipelineMetadata) -> CompileResult<Compilation> {
        let started = Utc::now();
        info!("Compiling pipeline: {}", metadata.pipeline_name);
        self.emit_event(CompileEvent::CompileStarted {
            pipeline_name: metadata.pipeline_name.clone(),
        });

        let analysis = self.analyze(notebook)?;
        let pipeline = generate(GenerateInput {
            graph: &analysis.graph,
            parameters: &analysis.parameters,
            prelude: &analysis.prelude,
            volumes: &metadata.volumes,
            metadata,
        })
        .inspect_err(|e| self.emit_event(CompileEvent::CompileFailed { error: e.to_string() }))?;

        self.emit_event(CompileEvent::CodeGenerated {
            pipeline_name: pipeline.pipeline_name.clone(),
            bytes: pipeline.script.len(),
        });
        info!(
            "Compiled pipeline {} ({} steps) in {}ms",
            pipeline.pipeline_name,
            pipeline.step_order.len(),
            (Utc::now() - started).num_milliseconds()
        );

        Ok(Compilation { analysis, pipeline })
    }
}
