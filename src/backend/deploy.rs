//! Deployment - runs the generated script so it compiles, uploads and runs
//! the pipeline

use crate::backend::subprocess::CommandRunner;
use crate::backend::{DeployError, Deployer};
use crate::core::config::{DeployConfig, PipelineMetadata};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// What a deployment did
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentReport {
    pub pipeline_name: String,
    /// Compiled pipeline package
    pub package: PathBuf,
    pub uploaded: bool,
    pub run_started: bool,
    /// Script output (run links and the like)
    pub output: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl DeploymentReport {
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

/// Runs the generated script with a Python interpreter from the script's
/// directory
#[derive(Debug, Clone)]
pub struct PythonDeployer {
    python: String,
    runner: CommandRunner,
}

impl PythonDeployer {
    pub fn new(python: String, timeout_secs: u64) -> Self {
        Self {
            python,
            runner: CommandRunner::new(timeout_secs),
        }
    }

    pub fn from_config(config: &DeployConfig) -> Self {
        Self::new(config.python.clone(), config.timeout_secs)
    }
}

fn package_path(dir: &Path, metadata: &PipelineMetadata) -> PathBuf {
    dir.join(format!("{}.pipeline.tar.gz", metadata.pipeline_name))
}

#[async_trait]
impl Deployer for PythonDeployer {
    async fn deploy(&self, script: &Path, metadata: &PipelineMetadata) -> Result<DeploymentReport, DeployError> {
        let started_at = Utc::now();
        if !script.is_file() {
            return Err(DeployError::MissingScript(script.to_path_buf()));
        }

        let dir = match script.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file_name = script
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .ok_or_else(|| DeployError::MissingScript(script.to_path_buf()))?;
        let package = package_path(&dir, metadata);

        info!("Deploying pipeline {} with {}", metadata.pipeline_name, self.python);
        match self.runner.run(&self.python, &[file_name], Some(&dir)).await {
            Ok(output) => {
                let finished_at = Utc::now();
                info!(
                    "Deployed pipeline {} in {}ms",
                    metadata.pipeline_name,
                    (finished_at - started_at).num_milliseconds()
                );
                Ok(DeploymentReport {
                    pipeline_name: metadata.pipeline_name.clone(),
                    package,
                    uploaded: metadata.upload_pipeline,
                    run_started: metadata.run_pipeline,
                    output: output.stdout.trim().to_string(),
                    started_at,
                    finished_at,
                })
            }
            Err(e) => {
                // The script stays; only the half-built package goes
                if package.exists() {
                    if let Err(rm) = std::fs::remove_file(&package) {
                        warn!("Could not remove {}: {}", package.display(), rm);
                    }
                }
                Err(DeployError::Command(e))
            }
        }
    }
}
