//! Pipeline metadata and tool configuration
//!
//! Metadata comes from three layers, later ones winning: the notebook's
//! `kubeflow_notebook` metadata, the YAML config file, and the command line.

use crate::core::error::{CompileError, CompileResult};
use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::OnceLock;

/// How cells without a `block:` tag are handled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UntaggedCellPolicy {
    /// Append to the most recently opened block
    #[default]
    Append,
    /// Reject the document
    Reject,
}

/// Where the analyzer may look for the producer of a variable
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProducerScope {
    /// Only steps that already reach the consumer
    #[default]
    Ancestors,
    /// Ancestors first, then any step earlier in topological order
    Preceding,
}

/// Options that change how a document is compiled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileOptions {
    #[serde(default)]
    pub untagged_cells: UntaggedCellPolicy,

    #[serde(default)]
    pub producer_scope: ProducerScope,
}

/// Kind of a pipeline volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeType {
    /// Existing persistent volume, bound through a new claim
    Pv,
    /// Existing persistent volume claim
    Pvc,
    /// Claim created by the pipeline
    NewPvc,
    /// Clone of a notebook volume; must be resolved before code generation
    Clone,
}

/// Key/value annotation attached to a created claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeAnnotation {
    pub key: String,
    pub value: String,
}

/// A volume mounted into every step of the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSpec {
    #[serde(alias = "mount_path")]
    pub mount_point: String,

    pub name: String,

    #[serde(rename = "type")]
    pub volume_type: VolumeType,

    #[serde(default, deserialize_with = "string_or_number")]
    pub size: Option<String>,

    #[serde(default)]
    pub size_type: Option<String>,

    #[serde(default)]
    pub snapshot: bool,

    #[serde(default)]
    pub snapshot_name: Option<String>,

    #[serde(default)]
    pub annotation: Option<VolumeAnnotation>,
}

/// Sizes show up both as `5` and as `"5"`
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Size {
        Text(String),
        Int(u64),
        Float(f64),
    }

    Ok(Option::<Size>::deserialize(deserializer)?.map(|size| match size {
        Size::Text(s) => s,
        Size::Int(i) => i.to_string(),
        Size::Float(f) => f.to_string(),
    }))
}

impl VolumeSpec {
    /// Size with its unit, e.g. `5Gi`
    pub fn size_with_unit(&self) -> Option<String> {
        self.size.as_ref().map(|size| {
            format!("{}{}", size, self.size_type.as_deref().unwrap_or(""))
        })
    }
}

/// Partial metadata as found in one configuration layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataOverrides {
    #[serde(default)]
    pub experiment_name: Option<String>,

    #[serde(default)]
    pub pipeline_name: Option<String>,

    #[serde(default)]
    pub pipeline_description: Option<String>,

    #[serde(default)]
    pub docker_image: Option<String>,

    #[serde(default)]
    pub volumes: Option<Vec<VolumeSpec>>,

    #[serde(default)]
    pub upload_pipeline: Option<bool>,

    #[serde(default)]
    pub run_pipeline: Option<bool>,

    #[serde(default)]
    pub kfp_host: Option<String>,
}

impl MetadataOverrides {
    /// Read the layer embedded in notebook metadata
    pub fn from_notebook_value(value: &Value) -> Result<Self> {
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Overlay `other` on top of `self`; fields set in `other` win
    pub fn merge(self, other: MetadataOverrides) -> Self {
        Self {
            experiment_name: other.experiment_name.or(self.experiment_name),
            pipeline_name: other.pipeline_name.or(self.pipeline_name),
            pipeline_description: other.pipeline_description.or(self.pipeline_description),
            docker_image: other.docker_image.or(self.docker_image),
            volumes: other.volumes.or(self.volumes),
            upload_pipeline: other.upload_pipeline.or(self.upload_pipeline),
            run_pipeline: other.run_pipeline.or(self.run_pipeline),
            kfp_host: other.kfp_host.or(self.kfp_host),
        }
    }

    /// Turn the merged layers into complete metadata
    pub fn resolve(self) -> CompileResult<PipelineMetadata> {
        let required = |field: Option<String>, name: &str| {
            field.ok_or_else(|| {
                CompileError::InvalidMetadata(format!("required argument not found: {}", name))
            })
        };

        let metadata = PipelineMetadata {
            experiment_name: required(self.experiment_name, "experiment_name")?,
            pipeline_name: required(self.pipeline_name, "pipeline_name")?,
            pipeline_description: self.pipeline_description.unwrap_or_default(),
            docker_image: required(self.docker_image, "docker_image")?,
            volumes: self.volumes.unwrap_or_default(),
            upload_pipeline: self.upload_pipeline.unwrap_or(false),
            run_pipeline: self.run_pipeline.unwrap_or(false),
            kfp_host: self.kfp_host,
        };
        metadata.validate()?;
        Ok(metadata)
    }
}

/// Complete, validated pipeline metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineMetadata {
    pub experiment_name: String,
    pub pipeline_name: String,
    pub pipeline_description: String,
    pub docker_image: String,
    pub volumes: Vec<VolumeSpec>,
    pub upload_pipeline: bool,
    pub run_pipeline: bool,
    pub kfp_host: Option<String>,
}

fn pipeline_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("valid regex"))
}

fn resource_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[\.\-a-z0-9]+$").expect("valid regex"))
}

impl PipelineMetadata {
    /// Validate names against what the pipeline service accepts
    pub fn validate(&self) -> CompileResult<()> {
        let invalid = |msg: String| Err(CompileError::InvalidMetadata(msg));
        const NAME_RULE: &str = "must consist of lower case alphanumeric characters or '-', \
                                 and must start and end with an alphanumeric character";

        if !pipeline_name_regex().is_match(&self.pipeline_name) {
            return invalid(format!("pipeline name '{}' {}", self.pipeline_name, NAME_RULE));
        }
        if self.experiment_name.trim().is_empty() {
            return invalid("experiment name must not be empty".to_string());
        }
        if self.docker_image.trim().is_empty() {
            return invalid("docker image must not be empty".to_string());
        }

        let mut mounts = std::collections::HashSet::new();
        for volume in &self.volumes {
            if !resource_name_regex().is_match(&volume.name) {
                return invalid(format!(
                    "volume name '{}' must consist of lower case alphanumeric characters, '-' or '.'",
                    volume.name
                ));
            }
            if !volume.mount_point.starts_with('/') {
                return invalid(format!(
                    "volume '{}' mount point '{}' must be an absolute path",
                    volume.name, volume.mount_point
                ));
            }
            if !mounts.insert(volume.mount_point.as_str()) {
                return invalid(format!("mount point '{}' is used twice", volume.mount_point));
            }
            if matches!(volume.volume_type, VolumeType::NewPvc | VolumeType::Pv) && volume.size.is_none() {
                return invalid(format!("volume '{}' needs a size", volume.name));
            }
            if volume.snapshot {
                match &volume.snapshot_name {
                    Some(name) if resource_name_regex().is_match(name) => {}
                    _ => {
                        return invalid(format!(
                            "volume '{}' is snapshotted but has no valid snapshot_name",
                            volume.name
                        ))
                    }
                }
            }
        }
        Ok(())
    }

    /// Apply the per-document suffix of a parameter sweep
    pub fn with_suffix(&self, suffix: &str) -> Self {
        let mut metadata = self.clone();
        if !suffix.is_empty() {
            metadata.experiment_name = format!("{}{}", self.experiment_name, suffix);
            metadata.pipeline_name = format!("{}{}", self.pipeline_name, suffix);
            metadata.pipeline_description =
                format!("{} params{}", self.pipeline_description, suffix);
        }
        metadata
    }

    /// File name of the generated script
    pub fn script_file_name(&self) -> String {
        format!("kfp_{}.kfp.py", self.pipeline_name)
    }
}

/// Storage collaborator settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Command (program followed by arguments) that snapshots the notebook volumes
    #[serde(default)]
    pub snapshot_command: Option<Vec<String>>,

    #[serde(default = "default_storage_timeout")]
    pub timeout_secs: u64,
}

fn default_storage_timeout() -> u64 {
    300
}

/// Deployment collaborator settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Python interpreter used to run the generated script
    #[serde(default = "default_python")]
    pub python: String,

    #[serde(default = "default_deploy_timeout")]
    pub timeout_secs: u64,
}

fn default_python() -> String {
    "python3".to_string()
}

fn default_deploy_timeout() -> u64 {
    600
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            python: default_python(),
            timeout_secs: default_deploy_timeout(),
        }
    }
}

/// Top-level tool configuration loaded from YAML
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolConfig {
    #[serde(default)]
    pub pipeline: MetadataOverrides,

    #[serde(default)]
    pub options: CompileOptions,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub deploy: DeployConfig,
}

impl ToolConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: ToolConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(command) = &self.storage.snapshot_command {
            if command.is_empty() {
                anyhow::bail!("storage.snapshot_command must name a program");
            }
        }
        if self.deploy.python.trim().is_empty() {
            anyhow::bail!("deploy.python must name an interpreter");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> MetadataOverrides {
        MetadataOverrides {
            experiment_name: Some("exp".to_string()),
            pipeline_name: Some("my-pipeline".to_string()),
            docker_image: Some("python:3.7".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_later_layer_wins() {
        let notebook = MetadataOverrides {
            pipeline_name: Some("from-notebook".to_string()),
            pipeline_description: Some("notebook description".to_string()),
            ..base()
        };
        let cli = MetadataOverrides {
            pipeline_name: Some("from-cli".to_string()),
            ..Default::default()
        };
        let merged = notebook.merge(cli).resolve().unwrap();
        assert_eq!(merged.pipeline_name, "from-cli");
        assert_eq!(merged.pipeline_description, "notebook description");
    }

    #[test]
    fn test_missing_required_field() {
        let err = MetadataOverrides {
            docker_image: None,
            ..base()
        }
        .resolve()
        .unwrap_err();
        assert!(err.to_string().contains("docker_image"));
    }

    #[test]
    fn test_invalid_pipeline_name() {
        let err = MetadataOverrides {
            pipeline_name: Some("My_Pipeline".to_string()),
            ..base()
        }
        .resolve()
        .unwrap_err();
        assert!(matches!(err, CompileError::InvalidMetadata(_)));
    }

    #[test]
    fn test_snapshot_requires_name() {
        let volume = VolumeSpec {
            mount_point: "/data".to_string(),
            name: "data-vol".to_string(),
            volume_type: VolumeType::Pvc,
            size: None,
            size_type: None,
            snapshot: true,
            snapshot_name: None,
            annotation: None,
        };
        let result = MetadataOverrides {
            volumes: Some(vec![volume]),
            ..base()
        }
        .resolve();
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_tool_config() {
        let yaml = r#"
pipeline:
  experiment_name: "exp"
  volumes:
    - mount_point: "/data"
      name: "workspace"
      type: new_pvc
      size: "5"
      size_type: "Gi"
options:
  untagged_cells: reject
  producer_scope: preceding
deploy:
  python: "/usr/bin/python3"
"#;
        let config = ToolConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.options.untagged_cells, UntaggedCellPolicy::Reject);
        assert_eq!(config.options.producer_scope, ProducerScope::Preceding);
        assert_eq!(config.deploy.python, "/usr/bin/python3");
        assert_eq!(config.deploy.timeout_secs, 600);
        let volumes = config.pipeline.volumes.unwrap();
        assert_eq!(volumes[0].volume_type, VolumeType::NewPvc);
        assert_eq!(volumes[0].size_with_unit().as_deref(), Some("5Gi"));
    }

    #[test]
    fn test_empty_config_is_default() {
        assert_eq!(ToolConfig::from_yaml("").unwrap(), ToolConfig::default());
    }

    #[test]
    fn test_suffix_applies_to_names() {
        let metadata = base().resolve().unwrap().with_suffix("-n-5");
        assert_eq!(metadata.pipeline_name, "my-pipeline-n-5");
        assert_eq!(metadata.experiment_name, "exp-n-5");
        assert_eq!(metadata.script_file_name(), "kfp_my-pipeline-n-5.kfp.py");
    }
}
