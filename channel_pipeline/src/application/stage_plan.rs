// /////////////////////////////////////////////////////////////////////////////
// Channel Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Stage Sub-item Planning
//!
//! Turns one stage of one Task into the concrete list of sub-items to run
//! and the exact argv each one needs (§6.1). Sub-item cardinality is
//! driven by `Channel.config.assets_per_video` / `shots_per_video`; a
//! rejection's `failed_audio_clip_numbers` narrows an Audio/Sfx replan
//! down to just the flagged clips (§4.3: "regenerates exactly the flagged
//! sub-items, preserves others").

use std::path::PathBuf;

use channel_pipeline_domain::entities::{Channel, Task};
use channel_pipeline_domain::value_objects::StageKind;

use crate::infrastructure::config::GeneratorBinaries;
use crate::infrastructure::filesystem::{StageDirectory, WorkspaceLayout};
use crate::infrastructure::stage_driver::{AssemblyClip, AssemblyManifest};

/// Identifies one sub-item within a stage: either a manifest index
/// (Assets/Composites) or a narrated clip number (Video/Audio/Sfx).
/// Assets and Composites use the same numbering (one composite per
/// generated asset); Video/Audio/Sfx share clip numbering since they are
/// all driven by the same shot list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SubItemId {
    Index(u32),
    Clip(u32),
}

impl SubItemId {
    pub fn number(self) -> u32 {
        match self {
            SubItemId::Index(n) | SubItemId::Clip(n) => n,
        }
    }
}

/// One planned subprocess invocation: program, argv, and the output path
/// the Stage Driver will verify after the process exits.
pub struct PlannedInvocation {
    pub id: SubItemId,
    pub program: String,
    pub args: Vec<String>,
    pub output_path: PathBuf,
}

/// All sub-item numbers a stage is responsible for, before subtracting
/// whatever the Resume Ledger already reports as done.
fn full_range(stage: StageKind, channel: &Channel) -> Vec<u32> {
    match stage {
        StageKind::Assets | StageKind::Composites => (0..channel.config.assets_per_video).collect(),
        StageKind::Video | StageKind::Audio | StageKind::Sfx => (0..channel.config.shots_per_video).collect(),
        StageKind::Assembly => Vec::new(),
    }
}

/// The sub-items still outstanding for `stage` on `task`: the full range
/// minus whatever the Ledger already has recorded, except for Audio/Sfx
/// after a rejection, where only the clips flagged in
/// `failed_audio_clip_numbers` are replanned (§4.3).
pub fn outstanding_sub_items(stage: StageKind, task: &Task, channel: &Channel) -> Vec<SubItemId> {
    let entry = task.ledger.entry(stage);
    let done_indices = &entry.progress.completed_indices;
    let done_clips = &entry.progress.completed_clip_numbers;

    let targeted_clips = match stage {
        StageKind::Audio if !task.ledger.failed_audio_clip_numbers.narration.is_empty() => {
            Some(task.ledger.failed_audio_clip_numbers.narration.clone())
        }
        StageKind::Sfx if !task.ledger.failed_audio_clip_numbers.sfx.is_empty() => {
            Some(task.ledger.failed_audio_clip_numbers.sfx.clone())
        }
        _ => None,
    };

    match stage {
        StageKind::Assets | StageKind::Composites => full_range(stage, channel)
            .into_iter()
            .filter(|n| !done_indices.contains(n))
            .map(SubItemId::Index)
            .collect(),
        StageKind::Video | StageKind::Audio | StageKind::Sfx => {
            let candidates = targeted_clips.unwrap_or_else(|| full_range(stage, channel));
            candidates.into_iter().filter(|n| !done_clips.contains(n)).map(SubItemId::Clip).collect()
        }
        StageKind::Assembly => Vec::new(),
    }
}

fn stage_directory(stage: StageKind) -> StageDirectory {
    match stage {
        StageKind::Assets => StageDirectory::Assets,
        StageKind::Composites => StageDirectory::Composites,
        StageKind::Video => StageDirectory::Videos,
        StageKind::Audio => StageDirectory::Audio,
        StageKind::Sfx => StageDirectory::Sfx,
        StageKind::Assembly => unreachable!("assembly has no per-subitem directory"),
    }
}

fn extension(stage: StageKind) -> &'static str {
    match stage {
        StageKind::Assets | StageKind::Composites => "png",
        StageKind::Video => "mp4",
        StageKind::Audio | StageKind::Sfx => "mp3",
        StageKind::Assembly => "mp4",
    }
}

/// Resolves the output path for one sub-item under the project's
/// workspace layout.
pub fn output_path_for(
    layout: &WorkspaceLayout,
    channel_id: &str,
    project_id: &str,
    stage: StageKind,
    id: SubItemId,
) -> Result<PathBuf, channel_pipeline_domain::PipelineError> {
    let dir = layout.stage_dir(channel_id, project_id, stage_directory(stage))?;
    Ok(dir.join(format!("{}.{}", id.number(), extension(stage))))
}

/// Builds the exact argv for one sub-item invocation (§6.1). `image_url`
/// is required and only consulted for `Video`; it is the Composites
/// output published via [`crate::application::asset_publisher::AssetPublisher`].
pub fn plan_invocation(
    stage: StageKind,
    id: SubItemId,
    task: &Task,
    output_path: PathBuf,
    generators: &GeneratorBinaries,
    image_url: Option<&str>,
) -> PlannedInvocation {
    let prompt = format!("{} — {} (shot {})", task.title, task.narrative_direction, id.number());

    let (program, args) = match stage {
        StageKind::Assets | StageKind::Composites => (
            generators.image.clone(),
            vec![
                "--prompt".to_string(),
                prompt,
                "--output".to_string(),
                output_path.display().to_string(),
            ],
        ),
        StageKind::Video => (
            generators.video_clip.clone(),
            vec![
                "--image".to_string(),
                image_url.unwrap_or_default().to_string(),
                "--prompt".to_string(),
                prompt,
                "--output".to_string(),
                output_path.display().to_string(),
            ],
        ),
        StageKind::Audio => (
            generators.narration.clone(),
            vec![
                "--text".to_string(),
                task.narrative_direction.clone(),
                "--output".to_string(),
                output_path.display().to_string(),
            ],
        ),
        StageKind::Sfx => (
            generators.sfx.clone(),
            vec![
                "--text".to_string(),
                task.topic.clone(),
                "--output".to_string(),
                output_path.display().to_string(),
                "--format".to_string(),
                "mp3_44100_128".to_string(),
            ],
        ),
        StageKind::Assembly => unreachable!("assembly is planned via plan_assembly_manifest"),
    };

    PlannedInvocation {
        id,
        program,
        args,
        output_path,
    }
}

/// Builds the `--manifest` JSON for the Assembly stage from the paths
/// every prior stage already produced (§6.1 manifest shape). Narration
/// duration is read from the narration file's own metadata by the caller
/// and passed in, since computing it is a filesystem/codec concern the
/// planner itself has no business owning.
pub fn plan_assembly_manifest(
    layout: &WorkspaceLayout,
    channel_id: &str,
    project_id: &str,
    channel: &Channel,
    narration_durations: &std::collections::BTreeMap<u32, f64>,
) -> Result<AssemblyManifest, channel_pipeline_domain::PipelineError> {
    let mut clips = Vec::with_capacity(channel.config.shots_per_video as usize);
    for clip_number in 0..channel.config.shots_per_video {
        let video_path = layout.stage_dir(channel_id, project_id, StageDirectory::Videos)?.join(format!("{clip_number}.mp4"));
        let narration_path = layout.stage_dir(channel_id, project_id, StageDirectory::Audio)?.join(format!("{clip_number}.mp3"));
        let sfx_path = layout.stage_dir(channel_id, project_id, StageDirectory::Sfx)?.join(format!("{clip_number}.mp3"));
        clips.push(AssemblyClip {
            clip_number,
            video_path: video_path.display().to_string(),
            narration_path: narration_path.display().to_string(),
            sfx_path: sfx_path.display().to_string(),
            narration_duration: narration_durations.get(&clip_number).copied().unwrap_or(0.0),
        });
    }
    Ok(AssemblyManifest { clips })
}

#[cfg(test)]
mod tests {
    use super::*;
    use channel_pipeline_domain::value_objects::{BoardPageId, ChannelId, Priority, TaskId};
    use chrono::Utc;

    fn sample_task() -> Task {
        Task::new_from_board(
            TaskId::new(),
            ChannelId::parse("c1").unwrap(),
            BoardPageId::new("page-1"),
            "Title",
            "Topic",
            "Direction",
            Priority::Normal,
            Utc::now(),
        )
    }

    fn sample_channel() -> Channel {
        let mut channel = Channel::new(ChannelId::parse("c1").unwrap(), "Test", Priority::Normal, Utc::now());
        channel.config.assets_per_video = 3;
        channel.config.shots_per_video = 2;
        channel
    }

    #[test]
    fn fresh_task_has_full_outstanding_range() {
        let task = sample_task();
        let channel = sample_channel();
        let items = outstanding_sub_items(StageKind::Assets, &task, &channel);
        assert_eq!(items.len(), 3);
    }

    #[test]
    fn completed_indices_are_excluded() {
        let mut task = sample_task();
        task.ledger.assets.progress.completed_indices.insert(0);
        let channel = sample_channel();
        let items = outstanding_sub_items(StageKind::Assets, &task, &channel);
        assert_eq!(items.len(), 2);
        assert!(!items.contains(&SubItemId::Index(0)));
    }

    #[test]
    fn rejection_narrows_audio_replan_to_flagged_clips() {
        let mut task = sample_task();
        task.ledger.failed_audio_clip_numbers.narration = vec![1];
        let channel = sample_channel();
        let items = outstanding_sub_items(StageKind::Audio, &task, &channel);
        assert_eq!(items, vec![SubItemId::Clip(1)]);
    }

    #[test]
    fn video_argv_carries_the_published_image_url() {
        let task = sample_task();
        let generators = GeneratorBinaries::default();
        let invocation = plan_invocation(
            StageKind::Video,
            SubItemId::Clip(0),
            &task,
            PathBuf::from("/workspace/out/0.mp4"),
            &generators,
            Some("https://cdn.example.com/0.png"),
        );
        assert!(invocation.args.contains(&"--image".to_string()));
        assert!(invocation.args.contains(&"https://cdn.example.com/0.png".to_string()));
    }

    #[test]
    fn assembly_manifest_covers_every_shot() {
        let layout = WorkspaceLayout::new("/workspace");
        let channel = sample_channel();
        let manifest = plan_assembly_manifest(&layout, "c1", "p1", &channel, &std::collections::BTreeMap::new()).unwrap();
        assert_eq!(manifest.clips.len(), 2);
    }
}
