//! Kubeflow Pipelines (v1 SDK) script generation
//!
//! Emits one lightweight component function per step, a pipeline driver
//! wiring them together, and a `__main__` block that compiles the package
//! and optionally uploads and runs it.

use crate::analysis::lexer::tokenize;
use crate::core::config::{PipelineMetadata, VolumeSpec, VolumeType};
use crate::core::error::{CompileError, CompileResult};
use crate::core::graph::ResolvedGraph;
use crate::core::parameters::{python_str, ParameterSet};
use crate::core::step::ResolvedStep;
use crate::core::tags::validate_step_name;
use serde::Serialize;
use std::collections::HashSet;

/// Name of the generated pipeline function
pub const PIPELINE_FUNCTION: &str = "auto_generated_pipeline";

/// Name of the generated metrics component
pub const METRICS_FUNCTION: &str = "pipeline_metrics";

/// Module-level names the generated script defines or imports
const SCRIPT_GLOBALS: &[&str] = &[
    "dsl",
    "comp",
    "kfp",
    "compiler",
    "OrderedDict",
    "NamedTuple",
    "BASE_IMAGE",
    "pvolumes_dict",
];

/// Generated pipeline script
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedPipeline {
    pub pipeline_name: String,
    /// Steps in the order their tasks are created
    pub step_order: Vec<String>,
    pub script: String,
}

impl GeneratedPipeline {
    /// File name of the package produced by the script's `__main__`
    pub fn package_file_name(&self) -> String {
        format!("{}.pipeline.tar.gz", self.pipeline_name)
    }
}

/// Everything code generation reads
#[derive(Debug, Clone, Copy)]
pub struct GenerateInput<'a> {
    pub graph: &'a ResolvedGraph,
    pub parameters: &'a ParameterSet,
    pub prelude: &'a [String],
    pub volumes: &'a [VolumeSpec],
    pub metadata: &'a PipelineMetadata,
}

/// Render the pipeline script
pub fn generate(input: GenerateInput<'_>) -> CompileResult<GeneratedPipeline> {
    check_invariants(&input)?;

    let mut w = CodeWriter::default();
    w.line(0, "import kfp.dsl as dsl");
    w.line(0, "import kfp.components as comp");
    w.line(0, "from collections import OrderedDict");
    w.line(0, "from typing import NamedTuple");
    w.blank();
    w.line(0, format!("BASE_IMAGE = {}", python_str(&input.metadata.docker_image)));

    for step in input.graph.ordered_steps() {
        w.blank();
        w.blank();
        step_function(&mut w, step, &input)?;
    }

    if !input.graph.metrics().is_empty() {
        w.blank();
        w.blank();
        metrics_function(&mut w, &input);
    }

    w.blank();
    w.blank();
    pipeline_function(&mut w, &input);
    w.blank();
    w.blank();
    main_block(&mut w, input.metadata);

    Ok(GeneratedPipeline {
        pipeline_name: input.metadata.pipeline_name.clone(),
        step_order: input.graph.execution_order(),
        script: w.finish(),
    })
}

#[derive(Default)]
struct CodeWriter {
    buf: String,
}

impl CodeWriter {
    fn line(&mut self, depth: usize, text: impl AsRef<str>) {
        let text = text.as_ref();
        if !text.is_empty() {
            for _ in 0..depth {
                self.buf.push_str("    ");
            }
            self.buf.push_str(text);
        }
        self.buf.push('\n');
    }

    /// A line copied verbatim, without indentation
    fn raw(&mut self, text: &str) {
        self.buf.push_str(text);
        self.buf.push('\n');
    }

    fn blank(&mut self) {
        self.buf.push('\n');
    }

    fn finish(self) -> String {
        self.buf
    }
}

fn codegen_error(step: &str, reason: impl Into<String>) -> CompileError {
    CompileError::CodeGen {
        step: step.to_string(),
        reason: reason.into(),
    }
}

/// Locals the pipeline function assigns: operator and task handles, volume
/// and snapshot ops
fn generated_locals(input: &GenerateInput<'_>) -> HashSet<String> {
    let mut functions: Vec<&str> = input.graph.steps().map(|s| s.name.as_str()).collect();
    if !input.graph.metrics().is_empty() {
        functions.push(METRICS_FUNCTION);
    }

    let mut names: HashSet<String> = functions
        .into_iter()
        .flat_map(|f| [format!("{}_op", f), format!("{}_task", f)])
        .collect();
    for n in 1..=input.volumes.len() {
        names.insert(format!("vop{}", n));
        names.insert(format!("snapshot{}", n));
    }
    names
}

/// Verify the resolved graph is one the generator can faithfully render
fn check_invariants(input: &GenerateInput<'_>) -> CompileResult<()> {
    let graph = input.graph;
    let step_names: HashSet<&str> = graph.steps().map(|s| s.name.as_str()).collect();
    let locals = generated_locals(input);

    for step in graph.steps() {
        validate_step_name(&step.name).map_err(|reason| codegen_error(&step.name, reason))?;
        if SCRIPT_GLOBALS.contains(&step.name.as_str()) {
            return Err(codegen_error(&step.name, "step name shadows a name the pipeline script uses"));
        }
        if locals.contains(&step.name) {
            return Err(codegen_error(
                &step.name,
                format!("step name '{}' collides with a generated pipeline name", step.name),
            ));
        }

        let predecessors = graph.predecessors(&step.name);
        for var in &step.ins {
            let producer = step
                .producers
                .get(var)
                .ok_or_else(|| codegen_error(&step.name, format!("input '{}' has no producer", var)))?;
            if !predecessors.contains(&producer.as_str()) {
                return Err(codegen_error(
                    &step.name,
                    format!("producer '{}' of '{}' is not a predecessor", producer, var),
                ));
            }
            let exported = graph.step(producer).map_or(false, |p| p.outs.contains(var));
            if !exported {
                return Err(codegen_error(
                    &step.name,
                    format!("producer '{}' does not export '{}'", producer, var),
                ));
            }
        }
        if step.producers.len() != step.ins.len() {
            return Err(codegen_error(&step.name, "producers do not match inputs"));
        }

        for var in step.ins.iter().chain(step.outs.iter()) {
            if input.parameters.contains(var) {
                return Err(codegen_error(
                    &step.name,
                    format!("pipeline parameter '{}' cannot flow between steps", var),
                ));
            }
        }
    }

    for param in input.parameters.names() {
        let clashes = step_names.contains(param) || SCRIPT_GLOBALS.contains(&param) || locals.contains(param);
        if clashes {
            return Err(codegen_error(
                PIPELINE_FUNCTION,
                format!("pipeline parameter '{}' clashes with a generated name", param),
            ));
        }
    }

    for metric in graph.metrics() {
        let fed = match &metric.producer {
            Some(producer) => graph.step(producer).map_or(false, |p| p.outs.contains(&metric.variable)),
            None => input.parameters.contains(&metric.variable),
        };
        if !fed {
            return Err(codegen_error(
                METRICS_FUNCTION,
                format!("metric '{}' has no source for '{}'", metric.key, metric.variable),
            ));
        }
    }

    for volume in input.volumes {
        if volume.volume_type == VolumeType::Clone {
            return Err(codegen_error(
                PIPELINE_FUNCTION,
                format!("volume '{}' must be cloned before code generation", volume.name),
            ));
        }
        if volume.volume_type != VolumeType::Pvc && volume.size.is_none() {
            return Err(codegen_error(
                PIPELINE_FUNCTION,
                format!("volume '{}' has no size", volume.name),
            ));
        }
    }

    Ok(())
}

/// `load_data` becomes `LoadData`
fn camel_case(name: &str) -> String {
    name.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

fn outputs_annotation(tuple_name: &str, fields: &[(String, String)]) -> String {
    let fields: Vec<String> = fields
        .iter()
        .map(|(name, ty)| format!("({}, {})", python_str(name), ty))
        .collect();
    format!("NamedTuple({}, [{}])", python_str(tuple_name), fields.join(", "))
}

fn serialization_helpers(w: &mut CodeWriter) {
    w.line(1, "import base64 as _nbflow_base64");
    w.line(1, "import pickle as _nbflow_pickle");
    w.blank();
    w.line(1, "def _nbflow_load(value):");
    w.line(2, "return _nbflow_pickle.loads(_nbflow_base64.b64decode(value.encode('ascii')))");
    w.blank();
    w.line(1, "def _nbflow_dump(value):");
    w.line(2, "return _nbflow_base64.b64encode(_nbflow_pickle.dumps(value)).decode('ascii')");
}

fn step_function(w: &mut CodeWriter, step: &ResolvedStep, input: &GenerateInput<'_>) -> CompileResult<()> {
    let mut args: Vec<String> = input
        .parameters
        .iter()
        .filter(|p| step.parameters.contains(&p.name))
        .map(|p| format!("{}: {}", p.name, p.param_type.python_name()))
        .collect();
    args.extend(step.ins.iter().map(|var| format!("{}: str", var)));

    let tuple_name = format!("{}Outputs", camel_case(&step.name));
    let fields: Vec<(String, String)> = step
        .outs
        .iter()
        .map(|var| (var.clone(), "str".to_string()))
        .collect();

    let signature = format!("def {}({})", step.name, args.join(", "));
    if fields.is_empty() {
        w.line(0, format!("{}:", signature));
    } else {
        w.line(0, format!("{} -> {}:", signature, outputs_annotation(&tuple_name, &fields)));
    }

    serialization_helpers(w);
    if !step.ins.is_empty() {
        w.blank();
        for var in &step.ins {
            w.line(1, format!("{} = _nbflow_load({})", var, var));
        }
    }

    for (label, cells) in [("shared", input.prelude), ("step", step.code.as_slice())] {
        if cells.is_empty() {
            continue;
        }
        w.blank();
        w.line(1, format!("# {} code", label));
        for cell in cells {
            emit_cell(w, &step.name, cell)?;
        }
    }

    if !fields.is_empty() {
        let names: Vec<String> = step.outs.iter().map(|v| python_str(v)).collect();
        let values: Vec<String> = step.outs.iter().map(|v| format!("_nbflow_dump({})", v)).collect();
        w.blank();
        w.line(1, "from collections import namedtuple as _nbflow_namedtuple");
        w.line(
            1,
            format!(
                "_nbflow_outputs = _nbflow_namedtuple({}, [{}])",
                python_str(&tuple_name),
                names.join(", ")
            ),
        );
        w.line(1, format!("return _nbflow_outputs({})", values.join(", ")));
    }
    Ok(())
}

/// Copy a cell into a function body. Lines that continue a multi-line
/// string stay as they are; magics are disabled.
fn emit_cell(w: &mut CodeWriter, step: &str, cell: &str) -> CompileResult<()> {
    let lexed = tokenize(cell).map_err(|e| codegen_error(step, e.to_string()))?;

    for (idx, line) in cell.replace("\r\n", "\n").lines().enumerate() {
        if lexed.opaque {
            w.line(1, format!("# {}", line).trim_end());
        } else if lexed.string_lines.contains(&idx) {
            w.raw(line);
        } else if lexed.magic_lines.contains(&idx) {
            let trimmed = line.trim_start();
            let lead = &line[..line.len() - trimmed.len()];
            w.line(1, format!("{}pass  # {}", lead, trimmed));
        } else if lexed.string_lines.contains(&(idx + 1)) {
            // Opens a multi-line string; trailing spaces belong to its value
            w.line(1, line);
        } else {
            w.line(1, line.trim_end());
        }
    }
    Ok(())
}

fn metrics_function(w: &mut CodeWriter, input: &GenerateInput<'_>) {
    let metrics = input.graph.metrics();
    let args: Vec<String> = metrics
        .iter()
        .map(|m| {
            let ty = match (&m.producer, input.parameters.get(&m.variable)) {
                (None, Some(param)) => param.param_type.python_name(),
                _ => "str",
            };
            format!("{}: {}", m.variable, ty)
        })
        .collect();
    let fields = vec![("mlpipeline_metrics".to_string(), "'Metrics'".to_string())];

    w.line(
        0,
        format!(
            "def {}({}) -> {}:",
            METRICS_FUNCTION,
            args.join(", "),
            outputs_annotation("PipelineMetricsOutputs", &fields)
        ),
    );
    w.line(1, "import json as _nbflow_json");
    serialization_helpers(w);
    w.blank();
    w.line(1, "_nbflow_metrics = [");
    for metric in metrics {
        let value = match metric.producer {
            Some(_) => format!("_nbflow_load({})", metric.variable),
            None => metric.variable.clone(),
        };
        w.line(2, format!("({}, {}),", python_str(&metric.key), value));
    }
    w.line(1, "]");
    w.line(1, "metrics = {");
    w.line(2, "'metrics': [");
    w.line(3, "{'name': name, 'numberValue': float(value), 'format': 'RAW'}");
    w.line(3, "for name, value in _nbflow_metrics");
    w.line(2, "]");
    w.line(1, "}");
    w.blank();
    w.line(1, "from collections import namedtuple as _nbflow_namedtuple");
    w.line(1, "_nbflow_outputs = _nbflow_namedtuple('PipelineMetricsOutputs', ['mlpipeline_metrics'])");
    w.line(1, "return _nbflow_outputs(_nbflow_json.dumps(metrics))");
}

fn volume_ops(w: &mut CodeWriter, volumes: &[VolumeSpec]) {
    for (i, volume) in volumes.iter().enumerate() {
        let n = i + 1;
        let mount = python_str(&volume.mount_point);
        let size = python_str(&volume.size_with_unit().unwrap_or_default());

        match volume.volume_type {
            VolumeType::Pvc => {
                w.line(
                    1,
                    format!("pvolumes_dict[{}] = dsl.PipelineVolume(pvc={})", mount, python_str(&volume.name)),
                );
            }
            VolumeType::NewPvc | VolumeType::Pv | VolumeType::Clone => {
                w.line(1, format!("vop{} = dsl.VolumeOp(", n));
                if volume.volume_type == VolumeType::Pv {
                    w.line(2, format!("name='pvc-data{}',", n));
                    w.line(2, format!("resource_name={},", python_str(&format!("pvc-{}", volume.name))));
                    w.line(2, format!("volume_name={},", python_str(&volume.name)));
                } else {
                    w.line(2, format!("name='create-volume-{}',", n));
                    w.line(2, format!("resource_name={},", python_str(&volume.name)));
                }
                w.line(2, format!("size={},", size));
                if let Some(annotation) = &volume.annotation {
                    w.line(
                        2,
                        format!(
                            "annotations={{{}: {}}},",
                            python_str(&annotation.key),
                            python_str(&annotation.value)
                        ),
                    );
                }
                w.line(2, "modes=dsl.VOLUME_MODE_RWM,");
                w.line(1, ")");
                w.line(1, format!("pvolumes_dict[{}] = vop{}.volume", mount, n));
            }
        }
        w.blank();
    }
}

fn task_call(
    w: &mut CodeWriter,
    name: &str,
    kwargs: &[String],
    predecessors: &[String],
) {
    w.line(1, format!("{}_op = comp.func_to_container_op({}, base_image=BASE_IMAGE)", name, name));
    w.line(1, format!("{}_task = {}_op({}) \\", name, name, kwargs.join(", ")));
    if predecessors.is_empty() {
        w.line(2, ".add_pvolumes(pvolumes_dict)");
    } else {
        w.line(2, ".add_pvolumes(pvolumes_dict) \\");
        w.line(2, format!(".after({})", predecessors.join(", ")));
    }
    w.blank();
}

fn pipeline_function(w: &mut CodeWriter, input: &GenerateInput<'_>) {
    let metadata = input.metadata;
    let graph = input.graph;

    w.line(0, "@dsl.pipeline(");
    w.line(1, format!("name={},", python_str(&metadata.pipeline_name)));
    w.line(1, format!("description={}", python_str(&metadata.pipeline_description)));
    w.line(0, ")");

    let params: Vec<String> = input
        .parameters
        .iter()
        .map(|p| format!("{}: {} = {}", p.name, p.param_type.python_name(), p.default.to_python()))
        .collect();
    w.line(0, format!("def {}({}):", PIPELINE_FUNCTION, params.join(", ")));
    w.line(1, "pvolumes_dict = OrderedDict()");
    w.blank();
    volume_ops(w, input.volumes);

    for step in graph.ordered_steps() {
        let mut kwargs: Vec<String> = input
            .parameters
            .names()
            .filter(|p| step.parameters.contains(*p))
            .map(|p| format!("{}={}", p, p))
            .collect();
        kwargs.extend(step.ins.iter().map(|var| {
            let producer = &step.producers[var];
            format!("{}={}_task.outputs[{}]", var, producer, python_str(var))
        }));
        let predecessors: Vec<String> = graph
            .predecessors(&step.name)
            .into_iter()
            .map(|p| format!("{}_task", p))
            .collect();
        task_call(w, &step.name, &kwargs, &predecessors);
    }

    for (i, volume) in input.volumes.iter().enumerate().filter(|(_, v)| v.snapshot) {
        let sinks: Vec<String> = graph.sinks().iter().map(|s| format!("{}_task", s)).collect();
        let n = i + 1;
        w.line(1, format!("snapshot{} = dsl.VolumeSnapshotOp(", n));
        w.line(2, format!("name='snapshot-volume-{}',", n));
        w.line(2, format!("resource_name={},", python_str(volume.snapshot_name.as_deref().unwrap_or(&volume.name))));
        w.line(2, format!("volume=pvolumes_dict[{}],", python_str(&volume.mount_point)));
        if sinks.is_empty() {
            w.line(1, ")");
        } else {
            w.line(1, format!(").after({})", sinks.join(", ")));
        }
        w.blank();
    }

    let metrics = graph.metrics();
    if !metrics.is_empty() {
        let kwargs: Vec<String> = metrics
            .iter()
            .map(|m| match &m.producer {
                Some(producer) => format!("{}={}_task.outputs[{}]", m.variable, producer, python_str(&m.variable)),
                None => format!("{}={}", m.variable, m.variable),
            })
            .collect();
        let mut producers: Vec<String> = Vec::new();
        for producer in metrics.iter().filter_map(|m| m.producer.as_ref()) {
            let task = format!("{}_task", producer);
            if !producers.contains(&task) {
                producers.push(task);
            }
        }
        task_call(w, METRICS_FUNCTION, &kwargs, &producers);
    }

    // Trim the trailing blank line inside the function body
    if w.buf.ends_with("\n\n") {
        w.buf.pop();
    }
}

fn main_block(w: &mut CodeWriter, metadata: &PipelineMetadata) {
    let package = python_str(&format!("{}.pipeline.tar.gz", metadata.pipeline_name));

    w.line(0, "if __name__ == '__main__':");
    w.line(1, "import kfp.compiler as compiler");
    w.blank();
    w.line(1, format!("pipeline_filename = {}", package));
    w.line(1, format!("compiler.Compiler().compile({}, pipeline_filename)", PIPELINE_FUNCTION));

    if !metadata.upload_pipeline && !metadata.run_pipeline {
        return;
    }

    w.blank();
    // The pipeline service is exposed under /pipeline of the given host
    let endpoint = metadata
        .kfp_host
        .as_ref()
        .map(|host| python_str(&format!("http://{}/pipeline", host)));

    w.line(1, "import kfp");
    match &endpoint {
        Some(endpoint) => w.line(1, format!("client = kfp.Client(host={})", endpoint)),
        None => w.line(1, "client = kfp.Client()"),
    }

    if metadata.upload_pipeline {
        w.line(
            1,
            format!(
                "client.upload_pipeline(pipeline_filename, pipeline_name={})",
                python_str(&metadata.pipeline_name)
            ),
        );
    }

    if metadata.run_pipeline {
        w.line(1, format!("experiment = client.create_experiment({})", python_str(&metadata.experiment_name)));
        w.line(1, format!("run_name = {}", python_str(&format!("{}_run", metadata.pipeline_name))));
        w.line(1, "run = client.run_pipeline(experiment.id, run_name, pipeline_filename, {})");
        match &endpoint {
            Some(endpoint) => w.line(
                1,
                format!("print('Pipeline run at ' + {} + '/#/runs/details/' + run.id)", endpoint),
            ),
            None => w.line(1, "print('Pipeline run id: ' + run.id)"),
        }
    }
}
