// /////////////////////////////////////////////////////////////////////////////
// Channel Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Concurrency Governor
//!
//! Worker-local admission control (§4.4): one counting semaphore per
//! concurrency class (asset, video, audio; assembly is unbounded — gated
//! only by whole-task serialization). Admission is non-blocking:
//! `try_acquire` either returns a permit immediately or the candidate is
//! skipped without mutating its status, exactly as §4.5's admission
//! filter requires. The permit's `Drop` guarantees release on every exit
//! path, including panics and cancellation.

use std::sync::Arc;

use channel_pipeline_domain::value_objects::stage_kind::ConcurrencyClass;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};

use crate::infrastructure::config::GovernorConfig;

/// An admitted slot. Dropping it releases the semaphore permit, if the
/// concurrency class had one (assembly has no configured cap). Holds an
/// owned permit rather than one borrowed from the `Governor` so a
/// sub-item's invocation can carry it across an `.await` without pinning
/// the `Governor` itself behind a lock for the invocation's whole
/// duration (only `try_admit`/`reload` need brief exclusive access).
pub enum GovernorPermit {
    Bounded(OwnedSemaphorePermit),
    Unbounded,
}

struct Caps {
    asset: Arc<Semaphore>,
    video: Arc<Semaphore>,
    audio: Arc<Semaphore>,
}

/// Tracks current occupancy via `available_permits()`, which is exact
/// because every admitted permit is eventually dropped and nothing else
/// touches these semaphores.
pub struct Governor {
    caps: Caps,
    reload_rx: watch::Receiver<GovernorConfig>,
}

impl Governor {
    /// Builds semaphores sized to the initial config, and subscribes to
    /// `reload_rx` for runtime cap changes (§4.4: "reloadable at runtime
    /// without restart"). A cap change rebuilds the semaphore for that
    /// class from scratch — in-flight permits from the old semaphore
    /// remain valid until released, so no task is force-cancelled by a
    /// reload.
    pub fn new(reload_rx: watch::Receiver<GovernorConfig>) -> Self {
        let initial = reload_rx.borrow().clone();
        Self {
            caps: Caps {
                asset: Arc::new(Semaphore::new(initial.max_concurrent_asset_gen)),
                video: Arc::new(Semaphore::new(initial.max_concurrent_video_gen)),
                audio: Arc::new(Semaphore::new(initial.max_concurrent_audio_gen)),
            },
            reload_rx,
        }
    }

    fn semaphore_for(&self, class: ConcurrencyClass) -> Option<&Arc<Semaphore>> {
        match class {
            ConcurrencyClass::Asset => Some(&self.caps.asset),
            ConcurrencyClass::Video => Some(&self.caps.video),
            ConcurrencyClass::Audio => Some(&self.caps.audio),
            ConcurrencyClass::Assembly => None,
        }
    }

    /// Attempts non-blocking admission for `class`. `None` means the
    /// class is at its cap and the caller must skip this candidate
    /// without mutating it (§4.5). Assembly has no configured cap and is
    /// always admitted.
    pub fn try_admit(&self, class: ConcurrencyClass) -> Option<GovernorPermit> {
        match self.semaphore_for(class) {
            None => Some(GovernorPermit::Unbounded),
            Some(sem) => sem.clone().try_acquire_owned().ok().map(GovernorPermit::Bounded),
        }
    }

    pub fn active(&self, class: ConcurrencyClass) -> usize {
        match self.semaphore_for(class) {
            None => 0,
            Some(sem) => {
                let cap = match class {
                    ConcurrencyClass::Asset => self.reload_rx.borrow().max_concurrent_asset_gen,
                    ConcurrencyClass::Video => self.reload_rx.borrow().max_concurrent_video_gen,
                    ConcurrencyClass::Audio => self.reload_rx.borrow().max_concurrent_audio_gen,
                    ConcurrencyClass::Assembly => 0,
                };
                cap.saturating_sub(sem.available_permits())
            }
        }
    }

    /// Rebuilds semaphore capacity from the latest value on the reload
    /// channel. Called by the worker runtime on SIGHUP (§4.8).
    pub fn reload(&mut self) {
        if self.reload_rx.has_changed().unwrap_or(false) {
            let config = self.reload_rx.borrow_and_update().clone();
            self.caps.asset = Arc::new(Semaphore::new(config.max_concurrent_asset_gen));
            self.caps.video = Arc::new(Semaphore::new(config.max_concurrent_video_gen));
            self.caps.audio = Arc::new(Semaphore::new(config.max_concurrent_audio_gen));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_governor(cap: usize) -> (Governor, watch::Sender<GovernorConfig>) {
        let config = GovernorConfig {
            max_concurrent_asset_gen: cap,
            max_concurrent_video_gen: cap,
            max_concurrent_audio_gen: cap,
        };
        let (tx, rx) = watch::channel(config);
        (Governor::new(rx), tx)
    }

    #[test]
    fn admits_up_to_cap_then_skips() {
        let (governor, _tx) = test_governor(2);
        let p1 = governor.try_admit(ConcurrencyClass::Video);
        let p2 = governor.try_admit(ConcurrencyClass::Video);
        let p3 = governor.try_admit(ConcurrencyClass::Video);
        assert!(p1.is_some());
        assert!(p2.is_some());
        assert!(p3.is_none());
    }

    #[test]
    fn dropping_a_permit_frees_capacity() {
        let (governor, _tx) = test_governor(1);
        {
            let _p1 = governor.try_admit(ConcurrencyClass::Asset).unwrap();
            assert!(governor.try_admit(ConcurrencyClass::Asset).is_none());
        }
        assert!(governor.try_admit(ConcurrencyClass::Asset).is_some());
    }

    #[test]
    fn assembly_is_always_admitted() {
        let (governor, _tx) = test_governor(0);
        assert!(governor.try_admit(ConcurrencyClass::Assembly).is_some());
        assert!(governor.try_admit(ConcurrencyClass::Assembly).is_some());
    }

    #[test]
    fn reload_rebuilds_capacity() {
        let (mut governor, tx) = test_governor(1);
        let _p1 = governor.try_admit(ConcurrencyClass::Video).unwrap();
        assert!(governor.try_admit(ConcurrencyClass::Video).is_none());

        tx.send_modify(|c| c.max_concurrent_video_gen = 3);
        governor.reload();
        assert!(governor.try_admit(ConcurrencyClass::Video).is_some());
    }

    #[test]
    fn classes_are_independent() {
        let (governor, _tx) = test_governor(1);
        let _asset = governor.try_admit(ConcurrencyClass::Asset).unwrap();
        assert!(governor.try_admit(ConcurrencyClass::Video).is_some());
        assert!(governor.try_admit(ConcurrencyClass::Audio).is_some());
    }
}
