//! CLI output formatting

use crate::backend::DeploymentReport;
use crate::compiler::CompileEvent;
use crate::core::{ParameterSet, ResolvedGraph};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeSet;
use std::time::Duration;

// Re-export style
pub use console::style;

pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Create a progress bar for a parameter sweep
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    progress.set_style(style);
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Format a compile event for display
pub fn format_compile_event(event: &CompileEvent) -> String {
    match event {
        CompileEvent::CompileStarted { pipeline_name } => {
            format!("{} Compiling pipeline {}", ROCKET, style(pipeline_name).bold())
        }
        CompileEvent::DocumentParsed { steps, prelude_cells } => format!(
            "{} Found {} step(s) and {} shared cell(s)",
            INFO,
            style(steps).cyan(),
            style(prelude_cells).cyan()
        ),
        CompileEvent::ParametersExtracted { names } if names.is_empty() => {
            format!("{} No pipeline parameters", INFO)
        }
        CompileEvent::ParametersExtracted { names } => {
            format!("{} Pipeline parameters: {}", INFO, style(names.join(", ")).cyan())
        }
        CompileEvent::DependenciesResolved { edges, order } => format!(
            "{} Resolved {} dependenc{}: {}",
            INFO,
            style(edges).cyan(),
            if *edges == 1 { "y" } else { "ies" },
            style(order.join(" → ")).dim()
        ),
        CompileEvent::CodeGenerated { pipeline_name, bytes } => format!(
            "{} Generated {} ({} bytes)",
            CHECK,
            style(pipeline_name).green(),
            bytes
        ),
        CompileEvent::CompileFailed { error } => {
            format!("{} {}", CROSS, style(error).red())
        }
    }
}

fn join_or_dash<'a, I: IntoIterator<Item = &'a String>>(names: I) -> String {
    let joined: Vec<&str> = names.into_iter().map(String::as_str).collect();
    if joined.is_empty() {
        "-".to_string()
    } else {
        joined.join(", ")
    }
}

/// List every step with its predecessors and data flow, in execution order
pub fn format_step_listing(graph: &ResolvedGraph, parameters: &ParameterSet) -> String {
    let mut lines = Vec::new();
    if !parameters.is_empty() {
        let rendered: Vec<String> = parameters
            .iter()
            .map(|p| format!("{}: {} = {}", p.name, p.param_type.python_name(), p.default.to_python()))
            .collect();
        lines.push(format!("{}", style("Pipeline parameters").bold()));
        lines.extend(rendered.into_iter().map(|r| format!("  {}", r)));
        lines.push(String::new());
    }

    for step in graph.ordered_steps() {
        let previous: BTreeSet<String> =
            graph.predecessors(&step.name).into_iter().map(str::to_string).collect();
        lines.push(format!("Block: {}", style(&step.name).bold()));
        lines.push(format!("  Previous Blocks: {}", join_or_dash(&previous)));
        lines.push(format!("  Ins: {}", join_or_dash(&step.ins)));
        lines.push(format!("  Outs: {}", join_or_dash(&step.outs)));
        if !step.parameters.is_empty() {
            lines.push(format!("  Parameters: {}", join_or_dash(&step.parameters)));
        }
    }

    for metric in graph.metrics() {
        let source = metric.producer.as_deref().unwrap_or("pipeline parameter");
        lines.push(format!(
            "Metric: {} ({} from {})",
            style(&metric.key).bold(),
            metric.variable,
            source
        ));
    }
    lines.join("\n")
}

/// Format a finished deployment
pub fn format_deployment(report: &DeploymentReport) -> String {
    let action = match (report.uploaded, report.run_started) {
        (true, true) => "uploaded and started",
        (false, true) => "started",
        _ => "uploaded",
    };
    let mut text = format!(
        "{} Pipeline {} {} in {}",
        CHECK,
        style(&report.pipeline_name).bold(),
        action,
        style(format_duration(report.duration_ms())).dim()
    );
    if !report.output.is_empty() {
        text.push('\n');
        text.push_str(&report.output);
    }
    text
}

fn format_duration(ms: i64) -> String {
    let secs = ms / 1000;
    if secs < 1 {
        format!("{}ms", ms)
    } else if secs < 60 {
        format!("{}s", secs)
    } else {
        format!("{}m {}s", secs / 60, secs % 60)
    }
}
