//! Downstream publisher adapters (§4.6 step 5, §9 "Polymorphic artifact
//! descriptor"). Deliberately narrow: out of the core's scope per §1.

use async_trait::async_trait;
use relay_core::error::{RelayError, Result};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

#[async_trait]
pub trait ArtifactPublisher: Send + Sync {
    async fn publish(&self, local_path: &Path) -> Result<()>;

    /// Invoked after a terminal-success state: clean up any local scratch
    /// state the publisher kept around.
    async fn deploy_cleanup(&self) -> Result<()>;
}

/// Loads a container image tar via `docker load`, grounded on the original
/// implementation's `deploy/deploy-utils.go` image-load flow.
pub struct ImagePublisher;

#[async_trait]
impl ArtifactPublisher for ImagePublisher {
    async fn publish(&self, local_path: &Path) -> Result<()> {
        let status = Command::new("docker")
            .args(["load", "-i"])
            .arg(local_path)
            .stdout(Stdio::null())
            .status()
            .await
            .map_err(|e| RelayError::PublishFailed(format!("docker load: {e}")))?;
        if !status.success() {
            return Err(RelayError::PublishFailed(format!(
                "docker load {local_path:?} exited with {status}"
            )));
        }
        Ok(())
    }

    async fn deploy_cleanup(&self) -> Result<()> {
        Ok(())
    }
}

/// Uploads a Python package via `twine`, grounded on
/// `common/pypi-artifact.go::IsTwineInstalled`'s exec-based tool check.
pub struct PackagePublisher {
    pub nexus_repo_url: String,
    pub login: String,
    pub password: String,
}

#[async_trait]
impl ArtifactPublisher for PackagePublisher {
    async fn publish(&self, local_path: &Path) -> Result<()> {
        let status = Command::new("twine")
            .args([
                "upload",
                "--repository-url",
                &self.nexus_repo_url,
                "-u",
                &self.login,
                "-p",
                &self.password,
            ])
            .arg(local_path)
            .status()
            .await
            .map_err(|e| RelayError::PublishFailed(format!("twine upload: {e}")))?;
        if !status.success() {
            return Err(RelayError::PublishFailed(format!(
                "twine upload {local_path:?} exited with {status}"
            )));
        }
        Ok(())
    }

    async fn deploy_cleanup(&self) -> Result<()> {
        Ok(())
    }
}

/// Publishes a model bundle via an HTTP PUT to the configured repo,
/// mirroring `common/hf-artifact.go`'s Nexus-backed upload shape.
pub struct ModelPublisher {
    pub upload_url: String,
    pub login: String,
    pub password: String,
    pub client: reqwest::Client,
}

#[async_trait]
impl ArtifactPublisher for ModelPublisher {
    async fn publish(&self, local_path: &Path) -> Result<()> {
        let bytes = tokio::fs::read(local_path).await?;
        let response = self
            .client
            .put(&self.upload_url)
            .basic_auth(&self.login, Some(&self.password))
            .body(bytes)
            .send()
            .await
            .map_err(|e| RelayError::PublishFailed(format!("model upload: {e}")))?;
        if !response.status().is_success() {
            return Err(RelayError::PublishFailed(format!(
                "model upload returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn deploy_cleanup(&self) -> Result<()> {
        Ok(())
    }
}

/// Check whether `twine` is on PATH, per `IsTwineInstalled`; used at
/// startup to fail fast (§6 "Exit codes": "missing required external tool
/// for package publishing") when package publishing is enabled.
pub async fn is_twine_installed() -> bool {
    Command::new("twine")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}
