// /////////////////////////////////////////////////////////////////////////////
// Channel Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Asset Publisher
//!
//! §6.1's video-clip generator contract takes `--image <public URL>`, not
//! a local path: the composite produced by the Composites stage has to be
//! reachable over HTTP before the Video stage can hand it to the
//! generator. Neither §4 nor §6 names the mechanism, only the
//! requirement — this is the seam that fills it in, keyed off
//! `Channel.config.storage_strategy` the same way the domain layer keeps
//! that field opaque (see DESIGN.md).

use async_trait::async_trait;
use channel_pipeline_domain::PipelineError;
use std::path::Path;

/// Publishes a locally-produced composite image so the Video stage's
/// generator can fetch it by URL.
#[async_trait]
pub trait AssetPublisher: Send + Sync {
    async fn publish(&self, local_path: &Path) -> Result<String, PipelineError>;
}

/// Publishes by exposing the workspace root at a configured base URL —
/// the deployment is expected to serve `workspace_root` from a static
/// file server (nginx, an S3-backed CDN origin, or similar) reachable at
/// `public_asset_base_url`. The published URL is just that base joined
/// with the file's path relative to the workspace root.
pub struct LocalAssetPublisher {
    workspace_root: std::path::PathBuf,
    base_url: String,
}

impl LocalAssetPublisher {
    pub fn new(workspace_root: impl Into<std::path::PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl AssetPublisher for LocalAssetPublisher {
    async fn publish(&self, local_path: &Path) -> Result<String, PipelineError> {
        let relative = local_path.strip_prefix(&self.workspace_root).map_err(|_| {
            PipelineError::InvalidIdentifier(format!(
                "asset path {} is not under the workspace root, cannot publish",
                local_path.display()
            ))
        })?;
        let mut url = self.base_url.trim_end_matches('/').to_string();
        for component in relative.components() {
            url.push('/');
            url.push_str(&component.as_os_str().to_string_lossy());
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn joins_relative_path_onto_base_url() {
        let publisher = LocalAssetPublisher::new("/workspace", "https://cdn.example.com/assets");
        let url = publisher
            .publish(Path::new("/workspace/channels/c1/projects/p1/assets/composites/0.png"))
            .await
            .unwrap();
        assert_eq!(url, "https://cdn.example.com/assets/channels/c1/projects/p1/assets/composites/0.png");
    }

    #[tokio::test]
    async fn rejects_path_outside_workspace_root() {
        let publisher = LocalAssetPublisher::new("/workspace", "https://cdn.example.com");
        let result = publisher.publish(Path::new("/etc/passwd")).await;
        assert!(result.is_err());
    }
}
