//! Volume resolution - turns `clone` requests into concrete claims

use crate::backend::subprocess::CommandRunner;
use crate::backend::{StorageError, VolumeResolver};
use crate::core::config::{StorageConfig, VolumeAnnotation, VolumeSpec, VolumeType};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

/// Annotation key recording which snapshot a cloned claim came from
pub const ORIGIN_ANNOTATION: &str = "snapshot/origin";

/// Passes volumes through unchanged; cloning is not available
#[derive(Debug, Clone, Default)]
pub struct StaticVolumes;

#[async_trait]
impl VolumeResolver for StaticVolumes {
    async fn resolve_volumes(&self, requests: Vec<VolumeSpec>) -> Result<Vec<VolumeSpec>, StorageError> {
        if let Some(clone) = requests.iter().find(|v| v.volume_type == VolumeType::Clone) {
            return Err(StorageError::CloneUnsupported(clone.name.clone()));
        }
        Ok(requests)
    }
}

#[derive(Debug, Deserialize)]
struct SnapshotOutput {
    group_members: Vec<SnapshotMember>,
}

#[derive(Debug, Deserialize)]
struct SnapshotMember {
    object_name: String,
    #[serde(alias = "rok_url")]
    url: String,
}

/// Snapshots the notebook's volumes with an external command and replaces
/// each `clone` request with a new claim restored from the snapshot
#[derive(Debug, Clone)]
pub struct SnapshotCommand {
    command: Vec<String>,
    runner: CommandRunner,
}

impl SnapshotCommand {
    pub fn new(command: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            command,
            runner: CommandRunner::new(timeout_secs),
        }
    }

    /// Build from configuration; `None` when no snapshot command is set
    pub fn from_config(config: &StorageConfig) -> Option<Self> {
        config
            .snapshot_command
            .as_ref()
            .filter(|c| !c.is_empty())
            .map(|c| Self::new(c.clone(), config.timeout_secs))
    }

    async fn snapshot(&self) -> Result<Vec<SnapshotMember>, StorageError> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| StorageError::InvalidOutput("snapshot command is empty".to_string()))?;

        info!("Snapshotting notebook volumes with {}", program);
        let output = self.runner.run(program, args, None).await?;
        let parsed: SnapshotOutput = serde_json::from_str(&output.stdout)
            .map_err(|e| StorageError::InvalidOutput(e.to_string()))?;
        debug!("Snapshot has {} member(s)", parsed.group_members.len());
        Ok(parsed.group_members)
    }
}

#[async_trait]
impl VolumeResolver for SnapshotCommand {
    async fn resolve_volumes(&self, requests: Vec<VolumeSpec>) -> Result<Vec<VolumeSpec>, StorageError> {
        if !requests.iter().any(|v| v.volume_type == VolumeType::Clone) {
            return Ok(requests);
        }

        let members = self.snapshot().await?;
        requests
            .into_iter()
            .map(|volume| {
                if volume.volume_type != VolumeType::Clone {
                    return Ok(volume);
                }
                let member = members
                    .iter()
                    .find(|m| m.object_name == volume.name)
                    .ok_or_else(|| StorageError::VolumeNotFound(volume.name.clone()))?;
                Ok(VolumeSpec {
                    volume_type: VolumeType::NewPvc,
                    annotation: Some(VolumeAnnotation {
                        key: ORIGIN_ANNOTATION.to_string(),
                        value: member.url.clone(),
                    }),
                    ..volume
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volume(name: &str, volume_type: VolumeType) -> VolumeSpec {
        VolumeSpec {
            mount_point: format!("/mnt/{}", name),
            name: name.to_string(),
            volume_type,
            size: Some("1".to_string()),
            size_type: Some("Gi".to_string()),
            snapshot: false,
            snapshot_name: None,
            annotation: None,
        }
    }

    #[tokio::test]
    async fn test_static_passes_through() {
        let requests = vec![volume("data", VolumeType::Pvc), volume("scratch", VolumeType::NewPvc)];
        let resolved = StaticVolumes.resolve_volumes(requests.clone()).await.unwrap();
        assert_eq!(resolved, requests);
    }

    #[tokio::test]
    async fn test_static_rejects_clone() {
        let err = StaticVolumes
            .resolve_volumes(vec![volume("home", VolumeType::Clone)])
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::CloneUnsupported(name) if name == "home"));
    }

    #[tokio::test]
    async fn test_snapshot_not_run_without_clones() {
        let resolver = SnapshotCommand::new(vec!["nbflow-no-such-binary".to_string()], 5);
        let requests = vec![volume("data", VolumeType::Pvc)];
        assert_eq!(resolver.resolve_volumes(requests.clone()).await.unwrap(), requests);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_snapshot_rewrites_clones() {
        let json = r#"{"group_members": [{"object_name": "home", "url": "snap://bucket/home"}]}"#;
        let resolver = SnapshotCommand::new(
            vec!["sh".to_string(), "-c".to_string(), format!("echo '{}'", json)],
            10,
        );
        let resolved = resolver
            .resolve_volumes(vec![volume("home", VolumeType::Clone), volume("data", VolumeType::Pvc)])
            .await
            .unwrap();

        assert_eq!(resolved[0].volume_type, VolumeType::NewPvc);
        assert_eq!(
            resolved[0].annotation,
            Some(VolumeAnnotation {
                key: ORIGIN_ANNOTATION.to_string(),
                value: "snap://bucket/home".to_string()
            })
        );
        assert_eq!(resolved[1].volume_type, VolumeType::Pvc);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_snapshot_missing_member() {
        let resolver = SnapshotCommand::new(
            vec!["sh".to_string(), "-c".to_string(), "echo '{\"group_members\": []}'".to_string()],
            10,
        );
        let err = resolver
            .resolve_volumes(vec![volume("home", VolumeType::Clone)])
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::VolumeNotFound(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_snapshot_bad_output() {
        let resolver = SnapshotCommand::new(
            vec!["sh".to_string(), "-c".to_string(), "echo not-json".to_string()],
            10,
        );
        let err = resolver
            .resolve_volumes(vec![volume("home", VolumeType::Clone)])
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidOutput(_)));
    }
}
