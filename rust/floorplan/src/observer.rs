// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Progress notifications for a detection run.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline stage reported to a [`DetectionObserver`]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Preprocess,
    Likelihood,
    LineExtraction,
    Consolidation,
    PostProcess,
    Perimeter,
    Corners,
    RoomBox,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Preprocess => "preprocess",
            Stage::Likelihood => "likelihood",
            Stage::LineExtraction => "line extraction",
            Stage::Consolidation => "consolidation",
            Stage::PostProcess => "post-process",
            Stage::Perimeter => "perimeter",
            Stage::Corners => "corners",
            Stage::RoomBox => "room box",
        };
        f.write_str(name)
    }
}

/// Receives stage boundaries of a detection run.
///
/// `items` is the stage's output size: ink pixels, segments, vertices or
/// corners depending on the stage. Both methods default to no-ops.
pub trait DetectionObserver: Send + Sync {
    fn stage_started(&self, _stage: Stage) {}

    fn stage_finished(&self, _stage: Stage, _items: usize) {}
}
