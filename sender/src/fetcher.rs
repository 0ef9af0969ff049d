//! Upstream fetcher adapters. Deliberately narrow: fetching is an edge
//! concern, kept out of the core's scope.

use async_trait::async_trait;
use futures_util::StreamExt as _;
use relay_core::error::{RelayError, Result};
use std::process::Stdio;
use tokio::io::AsyncRead;
use tokio::process::Command;

#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    /// Returns the suggested on-disk name and a byte stream of the artifact.
    async fn fetch(&self) -> Result<(String, Box<dyn AsyncRead + Send + Unpin>)>;

    /// Invoked after a terminal-success state: remove the upstream-local
    /// cached copy, if any.
    async fn deliver_cleanup(&self) -> Result<()>;
}

/// Pulls a container image via the `docker` CLI and streams the `docker
/// save` tar output.
pub struct ImageFetcher {
    pub image_name: String,
}

#[async_trait]
impl ArtifactFetcher for ImageFetcher {
    async fn fetch(&self) -> Result<(String, Box<dyn AsyncRead + Send + Unpin>)> {
        let status = Command::new("docker")
            .args(["pull", &self.image_name])
            .stdout(Stdio::null())
            .status()
            .await
            .map_err(|e| RelayError::UpstreamFetchFailed(format!("docker pull: {e}")))?;
        if !status.success() {
            return Err(RelayError::UpstreamFetchFailed(format!(
                "docker pull {} exited with {status}",
                self.image_name
            )));
        }

        let mut child = Command::new("docker")
            .args(["save", &self.image_name])
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|e| RelayError::UpstreamFetchFailed(format!("docker save: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RelayError::UpstreamFetchFailed("docker save: no stdout".into()))?;

        let name = download_file_name(&self.image_name);
        Ok((name, Box::new(stdout)))
    }

    async fn deliver_cleanup(&self) -> Result<()> {
        let _ = Command::new("docker")
            .args(["image", "rm", "-f", &self.image_name])
            .status()
            .await;
        Ok(())
    }
}

/// `repo/name:tag` -> `repo--name-vtag.image`, per
/// `DockerArtifact.GetDownloadFileName`.
fn download_file_name(image_name: &str) -> String {
    image_name
        .replace('/', "--")
        .replace(':', "-v")
        + ".image"
}

/// Fetches a Python package via a Nexus search-then-download, mirroring
/// `common/pypi-artifact.go`.
pub struct PackageFetcher {
    pub package_name: String,
    pub version: String,
    pub nexus_url: String,
    pub repo: String,
    pub login: String,
    pub password: String,
    pub client: reqwest::Client,
}

#[async_trait]
impl ArtifactFetcher for PackageFetcher {
    async fn fetch(&self) -> Result<(String, Box<dyn AsyncRead + Send + Unpin>)> {
        let search_url = format!(
            "{}/service/rest/v1/search?repository={}&name={}&version={}",
            self.nexus_url, self.repo, self.package_name, self.version
        );

        let search: serde_json::Value = self
            .client
            .get(&search_url)
            .basic_auth(&self.login, Some(&self.password))
            .send()
            .await
            .map_err(|e| RelayError::UpstreamFetchFailed(format!("nexus search: {e}")))?
            .json()
            .await
            .map_err(|e| RelayError::UpstreamFetchFailed(format!("nexus search body: {e}")))?;

        let download_url = search["items"][0]["assets"][0]["downloadUrl"]
            .as_str()
            .ok_or_else(|| {
                RelayError::UpstreamFetchFailed(format!(
                    "no asset found for {}=={}",
                    self.package_name, self.version
                ))
            })?
            .to_string();

        let response = self
            .client
            .get(&download_url)
            .basic_auth(&self.login, Some(&self.password))
            .send()
            .await
            .map_err(|e| RelayError::UpstreamFetchFailed(format!("nexus download: {e}")))?;

        let name = format!("{}-{}.tar.gz", self.package_name, self.version);
        let stream = response
            .bytes_stream()
            .map(|r| r.map_err(std::io::Error::other));
        Ok((name, Box::new(tokio_util::io::StreamReader::new(stream))))
    }

    async fn deliver_cleanup(&self) -> Result<()> {
        Ok(())
    }
}

/// Fetches a model bundle via a Nexus search-then-download, mirroring
/// `common/hf-artifact.go`.
pub struct ModelFetcher {
    pub model_name: String,
    pub nexus_url: String,
    pub repo: String,
    pub login: String,
    pub password: String,
    pub client: reqwest::Client,
}

#[async_trait]
impl ArtifactFetcher for ModelFetcher {
    async fn fetch(&self) -> Result<(String, Box<dyn AsyncRead + Send + Unpin>)> {
        let search_url = format!(
            "{}/service/rest/v1/search?repository={}&group=/{}",
            self.nexus_url, self.repo, self.model_name
        );

        let search: serde_json::Value = self
            .client
            .get(&search_url)
            .basic_auth(&self.login, Some(&self.password))
            .send()
            .await
            .map_err(|e| RelayError::UpstreamFetchFailed(format!("nexus search: {e}")))?
            .json()
            .await
            .map_err(|e| RelayError::UpstreamFetchFailed(format!("nexus search body: {e}")))?;

        let download_url = search["items"][0]["assets"][0]["downloadUrl"]
            .as_str()
            .ok_or_else(|| {
                RelayError::UpstreamFetchFailed(format!(
                    "no asset found for model {}",
                    self.model_name
                ))
            })?
            .to_string();

        let response = self
            .client
            .get(&download_url)
            .basic_auth(&self.login, Some(&self.password))
            .send()
            .await
            .map_err(|e| RelayError::UpstreamFetchFailed(format!("nexus download: {e}")))?;

        let name = format!("{}.model", self.model_name);
        let stream = response
            .bytes_stream()
            .map(|r| r.map_err(std::io::Error::other));
        Ok((name, Box::new(tokio_util::io::StreamReader::new(stream))))
    }

    async fn deliver_cleanup(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_file_name_matches_original_scheme() {
        assert_eq!(
            download_file_name("registry.example.com/lib/app:1.2.3"),
            "registry.example.com--lib--app-v1.2.3.image"
        );
    }
}
