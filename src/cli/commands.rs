//! CLI command definitions

use crate::core::config::MetadataOverrides;
use clap::Args;
use std::path::PathBuf;

/// Compile a notebook
#[derive(Debug, Args, Clone)]
pub struct CompileCommand {
    /// Path to the source notebook
    #[arg(long = "nb")]
    pub notebook: PathBuf,

    /// Experiment the pipeline runs under
    #[arg(long)]
    pub experiment_name: Option<String>,

    /// Name of the deployed pipeline
    #[arg(long)]
    pub pipeline_name: Option<String>,

    /// Description of the deployed pipeline
    #[arg(long)]
    pub pipeline_description: Option<String>,

    /// Image every step runs in
    #[arg(long)]
    pub docker_image: Option<String>,

    /// Upload the compiled pipeline
    #[arg(long)]
    pub upload_pipeline: bool,

    /// Start a run of the compiled pipeline
    #[arg(long)]
    pub run_pipeline: bool,

    /// Pipeline service host, as host:port
    #[arg(long)]
    pub kfp_host: Option<String>,

    /// YAML file of parameter values to sweep over
    #[arg(long)]
    pub jupyter_args: Option<PathBuf>,

    /// Directory for the generated script (defaults to the notebook's)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl CompileCommand {
    /// The command-line metadata layer; flags left off do not override
    pub fn overrides(&self) -> MetadataOverrides {
        MetadataOverrides {
            experiment_name: self.experiment_name.clone(),
            pipeline_name: self.pipeline_name.clone(),
            pipeline_description: self.pipeline_description.clone(),
            docker_image: self.docker_image.clone(),
            volumes: None,
            upload_pipeline: self.upload_pipeline.then_some(true),
            run_pipeline: self.run_pipeline.then_some(true),
            kfp_host: self.kfp_host.clone(),
        }
    }

    /// Where the generated script goes
    pub fn output_dir(&self) -> PathBuf {
        if let Some(dir) = &self.output {
            return dir.clone();
        }
        match self.notebook.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

/// Validate a notebook
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to the source notebook
    #[arg(long = "nb")]
    pub notebook: PathBuf,

    /// Output the step graph as JSON
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(notebook: &str) -> CompileCommand {
        CompileCommand {
            notebook: PathBuf::from(notebook),
            experiment_name: None,
            pipeline_name: Some("cli-name".to_string()),
            pipeline_description: None,
            docker_image: None,
            upload_pipeline: false,
            run_pipeline: true,
            kfp_host: None,
            jupyter_args: None,
            output: None,
        }
    }

    #[test]
    fn test_unset_flags_do_not_override() {
        let overrides = command("nb.ipynb").overrides();
        assert_eq!(overrides.pipeline_name.as_deref(), Some("cli-name"));
        assert_eq!(overrides.upload_pipeline, None);
        assert_eq!(overrides.run_pipeline, Some(true));
    }

    #[test]
    fn test_output_dir() {
        assert_eq!(command("work/nb.ipynb").output_dir(), PathBuf::from("work"));
        assert_eq!(command("nb.ipynb").output_dir(), PathBuf::from("."));

        let mut cmd = command("work/nb.ipynb");
        cmd.output = Some(PathBuf::from("/tmp/out"));
        assert_eq!(cmd.output_dir(), PathBuf::from("/tmp/out"));
    }
}
