//! Collaborators outside the compiler: volume snapshots, deployment and
//! parameter sweeps

pub mod deploy;
pub mod subprocess;
pub mod sweep;
pub mod volumes;

use crate::core::config::{PipelineMetadata, VolumeSpec};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use deploy::{DeploymentReport, PythonDeployer};
pub use subprocess::{CommandError, CommandOutput, CommandRunner};
pub use sweep::{ExpandedDocument, SweepExpander};
pub use volumes::{SnapshotCommand, StaticVolumes};

/// Errors from resolving volumes
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Snapshot command failed: {0}")]
    Command(#[from] CommandError),

    #[error("Snapshot command returned unexpected output: {0}")]
    InvalidOutput(String),

    #[error("Volume '{0}' is not part of the notebook snapshot")]
    VolumeNotFound(String),

    #[error("Volume '{0}' is a clone but no snapshot command is configured")]
    CloneUnsupported(String),
}

/// Errors from deploying a generated script
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("Deployment failed: {0}")]
    Command(#[from] CommandError),

    #[error("Generated script not found: {}", .0.display())]
    MissingScript(PathBuf),
}

/// Turns requested volumes into volumes the pipeline can mount
#[async_trait]
pub trait VolumeResolver: Send + Sync {
    async fn resolve_volumes(&self, requests: Vec<VolumeSpec>) -> Result<Vec<VolumeSpec>, StorageError>;
}

/// Compiles, uploads and optionally runs a generated script
#[async_trait]
pub trait Deployer: Send + Sync {
    async fn deploy(&self, script: &Path, metadata: &PipelineMetadata) -> Result<DeploymentReport, DeployError>;
}
