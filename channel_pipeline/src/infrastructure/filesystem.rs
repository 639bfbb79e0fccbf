// /////////////////////////////////////////////////////////////////////////////
// Channel Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Filesystem Layout Helper
//!
//! Resolves the per-task directory layout (§6.3):
//! `<workspace>/channels/<channel_id>/projects/<project_id>/{assets,assets/composites,videos,audio,sfx}`
//! plus the final assembled MP4 at the project root. Every path this
//! helper returns has been checked to resolve strictly within the
//! workspace root; a channel or project identifier outside
//! `^[a-zA-Z0-9_-]+$` is rejected before any path is built.

use std::path::{Path, PathBuf};

use channel_pipeline_domain::PipelineError;

fn is_safe_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn validate_identifier(kind: &str, value: &str) -> Result<(), PipelineError> {
    if !is_safe_identifier(value) {
        return Err(PipelineError::InvalidIdentifier(format!(
            "{kind} '{value}' must match ^[a-zA-Z0-9_-]+$"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageDirectory {
    Assets,
    Composites,
    Videos,
    Audio,
    Sfx,
}

impl StageDirectory {
    fn component(self) -> &'static str {
        match self {
            StageDirectory::Assets => "assets",
            StageDirectory::Composites => "assets/composites",
            StageDirectory::Videos => "videos",
            StageDirectory::Audio => "audio",
            StageDirectory::Sfx => "sfx",
        }
    }
}

/// Resolves project and stage directories under a fixed workspace root,
/// rejecting any identifier or resulting path that would escape it.
#[derive(Debug, Clone)]
pub struct WorkspaceLayout {
    root: PathBuf,
}

impl WorkspaceLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `<workspace>/channels/<channel_id>/projects/<project_id>/`
    pub fn project_root(&self, channel_id: &str, project_id: &str) -> Result<PathBuf, PipelineError> {
        validate_identifier("channel id", channel_id)?;
        validate_identifier("project id", project_id)?;
        let path = self.root.join("channels").join(channel_id).join("projects").join(project_id);
        self.verify_within_root(&path)?;
        Ok(path)
    }

    pub fn stage_dir(&self, channel_id: &str, project_id: &str, stage: StageDirectory) -> Result<PathBuf, PipelineError> {
        let path = self.project_root(channel_id, project_id)?.join(stage.component());
        self.verify_within_root(&path)?;
        Ok(path)
    }

    /// The final assembled MP4's path, at the project root (§6.3).
    pub fn final_output_path(&self, channel_id: &str, project_id: &str) -> Result<PathBuf, PipelineError> {
        Ok(self.project_root(channel_id, project_id)?.join("final.mp4"))
    }

    /// Creates every stage subdirectory for a project if missing.
    pub async fn ensure_project_dirs(&self, channel_id: &str, project_id: &str) -> Result<(), PipelineError> {
        for stage in [
            StageDirectory::Assets,
            StageDirectory::Composites,
            StageDirectory::Videos,
            StageDirectory::Audio,
            StageDirectory::Sfx,
        ] {
            let dir = self.stage_dir(channel_id, project_id, stage)?;
            tokio::fs::create_dir_all(&dir).await?;
        }
        Ok(())
    }

    /// Path-traversal guard: a validated identifier can only ever produce
    /// `root/...` given the fixed join pattern above, but this is checked
    /// explicitly rather than trusted, since `root` itself may be relative
    /// and lexical joins don't by themselves prove containment.
    fn verify_within_root(&self, path: &Path) -> Result<(), PipelineError> {
        let root_components: Vec<_> = self.root.components().collect();
        let path_components: Vec<_> = path.components().collect();
        if path_components.len() < root_components.len() || path_components[..root_components.len()] != root_components[..] {
            return Err(PipelineError::PathTraversal(path.display().to_string()));
        }
        Ok(())
    }

    /// A sub-item's output file counts as "already done" only once it
    /// exists on storage and is non-empty (§4.3, §3 invariant 2).
    pub async fn output_verified(path: &Path) -> bool {
        match tokio::fs::metadata(path).await {
            Ok(meta) => meta.is_file() && meta.len() > 0,
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_channel_id_with_path_traversal() {
        let layout = WorkspaceLayout::new("/workspace");
        assert!(layout.project_root("../etc", "p1").is_err());
    }

    #[test]
    fn rejects_project_id_with_slash() {
        let layout = WorkspaceLayout::new("/workspace");
        assert!(layout.project_root("c1", "a/b").is_err());
    }

    #[test]
    fn builds_expected_stage_directory() {
        let layout = WorkspaceLayout::new("/workspace");
        let dir = layout.stage_dir("c1", "p1", StageDirectory::Composites).unwrap();
        assert_eq!(dir, PathBuf::from("/workspace/channels/c1/projects/p1/assets/composites"));
    }

    #[test]
    fn final_output_lives_at_project_root() {
        let layout = WorkspaceLayout::new("/workspace");
        let path = layout.final_output_path("c1", "p1").unwrap();
        assert_eq!(path, PathBuf::from("/workspace/channels/c1/projects/p1/final.mp4"));
    }

    #[tokio::test]
    async fn unverified_output_reports_false_for_missing_file() {
        let missing = PathBuf::from("/nonexistent/path/should/not/exist.mp4");
        assert!(!WorkspaceLayout::output_verified(&missing).await);
    }
}
