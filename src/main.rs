use anyhow::{Context, Result};
use nbflow::backend::{
    Deployer, DeploymentReport, PythonDeployer, SnapshotCommand, StaticVolumes, SweepExpander, VolumeResolver,
};
use nbflow::cli::commands::{CompileCommand, ValidateCommand};
use nbflow::cli::output::*;
use nbflow::cli::{Cli, Command};
use nbflow::compiler::Compiler;
use nbflow::core::{MetadataOverrides, Notebook, PipelineMetadata, ToolConfig};
use std::path::{Path, PathBuf};
use tracing::{debug, error, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    let config = match &cli.config {
        Some(path) => ToolConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path))?,
        None => ToolConfig::default(),
    };

    let succeeded = match &cli.command {
        Command::Compile(cmd) => compile_notebook(cmd, &config).await?,
        Command::Validate(cmd) => validate_notebook(cmd, &config)?,
    };

    if !succeeded {
        std::process::exit(1);
    }
    Ok(())
}

fn load_notebook(path: &Path) -> Result<Notebook> {
    Notebook::from_file(path).with_context(|| format!("Failed to load notebook {}", path.display()))
}

/// Notebook metadata, then the config file, then the command line
fn resolve_metadata(notebook: &Notebook, cmd: &CompileCommand, config: &ToolConfig) -> Result<PipelineMetadata> {
    let notebook_layer = match notebook.pipeline_metadata() {
        Some(value) => MetadataOverrides::from_notebook_value(value)
            .context("Invalid pipeline metadata in notebook")?,
        None => MetadataOverrides::default(),
    };
    Ok(notebook_layer
        .merge(config.pipeline.clone())
        .merge(cmd.overrides())
        .resolve()?)
}

async fn compile_notebook(cmd: &CompileCommand, config: &ToolConfig) -> Result<bool> {
    let notebook = load_notebook(&cmd.notebook)?;
    let mut metadata = resolve_metadata(&notebook, cmd, config)?;

    let resolver: Box<dyn VolumeResolver> = match SnapshotCommand::from_config(&config.storage) {
        Some(snapshot) => Box::new(snapshot),
        None => Box::new(StaticVolumes),
    };
    metadata.volumes = resolver.resolve_volumes(metadata.volumes.clone()).await?;

    let deployer = PythonDeployer::from_config(&config.deploy);
    let out_dir = cmd.output_dir();

    let Some(sweep_file) = &cmd.jupyter_args else {
        let mut compiler = Compiler::new(config.options);
        compiler.add_event_handler(|event| println!("{}", format_compile_event(&event)));

        return match compile_document(&compiler, &deployer, &notebook, &metadata, &out_dir).await {
            Ok((script, report)) => {
                println!("{} Pipeline script written to {}", CHECK, style(script.display()).bold());
                if let Some(report) = report {
                    println!("{}", format_deployment(&report));
                }
                Ok(true)
            }
            Err(e) => {
                println!("{} Compilation failed:", CROSS);
                println!("  {}", style(format!("{:#}", e)).red());
                Ok(false)
            }
        };
    };

    let sweep = SweepExpander::from_file(sweep_file)?;
    let documents = sweep.expand(&notebook);
    println!(
        "{} Sweeping {} parameter combination(s) of {}",
        INFO,
        style(documents.len()).cyan(),
        style(&metadata.pipeline_name).bold()
    );

    let compiler = Compiler::new(config.options);
    let progress = create_progress_bar(documents.len());
    let mut failures = 0;

    for document in &documents {
        let doc_metadata = metadata.with_suffix(&document.suffix);
        progress.set_message(doc_metadata.pipeline_name.clone());
        debug!("Compiling sweep document {}", doc_metadata.pipeline_name);

        match compile_document(&compiler, &deployer, &document.notebook, &doc_metadata, &out_dir).await {
            Ok((script, report)) => {
                progress.println(format!("{} {}", CHECK, style(script.display()).dim()));
                if let Some(report) = report {
                    progress.println(format_deployment(&report));
                }
            }
            Err(e) => {
                failures += 1;
                error!("{} failed: {:#}", doc_metadata.pipeline_name, e);
                progress.println(format!(
                    "{} {}: {}",
                    CROSS,
                    style(&doc_metadata.pipeline_name).bold(),
                    style(format!("{:#}", e)).red()
                ));
            }
        }
        progress.inc(1);
    }
    progress.finish_and_clear();

    if failures > 0 {
        println!(
            "{} {} of {} document(s) failed",
            WARN,
            style(failures).red(),
            documents.len()
        );
        return Ok(false);
    }
    println!("{} Compiled {} document(s)", CHECK, style(documents.len()).green());
    Ok(true)
}

/// Compile one document, write its script and deploy it if asked to
async fn compile_document(
    compiler: &Compiler,
    deployer: &dyn Deployer,
    notebook: &Notebook,
    metadata: &PipelineMetadata,
    out_dir: &Path,
) -> Result<(PathBuf, Option<DeploymentReport>)> {
    metadata.validate()?;
    let compilation = compiler.compile(notebook, metadata)?;

    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;
    let script = out_dir.join(metadata.script_file_name());
    std::fs::write(&script, &compilation.pipeline.script)
        .with_context(|| format!("Failed to write {}", script.display()))?;

    let report = if metadata.upload_pipeline || metadata.run_pipeline {
        Some(deployer.deploy(&script, metadata).await?)
    } else {
        None
    };
    Ok((script, report))
}

fn validate_notebook(cmd: &ValidateCommand, config: &ToolConfig) -> Result<bool> {
    let notebook = load_notebook(&cmd.notebook)?;
    let compiler = Compiler::new(config.options);

    match compiler.analyze(&notebook) {
        Ok(analysis) => {
            if cmd.json {
                println!("{}", serde_json::to_string_pretty(&analysis.graph.to_json())?);
            } else {
                println!("{} Notebook is valid", CHECK);
                println!("{}", format_step_listing(&analysis.graph, &analysis.parameters));
            }
            Ok(true)
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(e).red());
            Ok(false)
        }
    }
}
