// Motion interpolator: animates marker moves instead of snapping

mod clock;
mod task;

pub use clock::{Clock, ManualClock, SystemClock};
pub use task::{initial_bearing, AnimationTask};

use crate::state::Position;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Motion configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Length of one marker move (milliseconds)
    pub duration_ms: u64,
    /// Frame period of the render loop (milliseconds)
    pub frame_interval_ms: u64,
}

impl MotionConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            duration_ms: 1000,
            frame_interval_ms: 16,
        }
    }
}

/// Position of one marker for the current frame
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub entity_id: String,
    pub position: Position,
    pub bearing: Option<f64>,
    /// Last frame of this animation; the task has been retired
    pub finished: bool,
}

/// Active animation tasks, at most one per marker
pub struct Animator {
    tasks: HashMap<String, AnimationTask>,
    duration: Duration,
    /// Cleared on teardown; a halted animator never emits frames again
    mounted: bool,
}

impl Animator {
    pub fn new(duration: Duration) -> Self {
        Self {
            tasks: HashMap::new(),
            duration,
            mounted: true,
        }
    }

    /// Start moving `entity_id` towards `to`.
    ///
    /// If the marker is already animating, the new task starts from where
    /// that animation currently has it, otherwise from `rendered`.
    /// Returns false when there is nothing to animate.
    pub fn start(&mut self, entity_id: &str, rendered: Position, to: Position, now: Instant) -> bool {
        if !self.mounted {
            return false;
        }

        let from = self
            .tasks
            .get(entity_id)
            .map(|task| task.position_at(now))
            .unwrap_or(rendered);

        if from == to {
            self.tasks.remove(entity_id);
            return false;
        }

        self.tasks.insert(
            entity_id.to_string(),
            AnimationTask::new(from, to, now, self.duration),
        );
        true
    }

    /// Current interpolated position, if animating
    pub fn position_of(&self, entity_id: &str, now: Instant) -> Option<Position> {
        self.tasks.get(entity_id).map(|task| task.position_at(now))
    }

    pub fn cancel(&mut self, entity_id: &str) -> bool {
        self.tasks.remove(entity_id).is_some()
    }

    /// Positions for this frame, ordered by entity id; finished tasks are retired
    pub fn tick(&mut self, now: Instant) -> Vec<Frame> {
        if !self.mounted {
            return Vec::new();
        }

        let mut frames: Vec<Frame> = self
            .tasks
            .iter()
            .map(|(id, task)| Frame {
                entity_id: id.clone(),
                position: task.position_at(now),
                bearing: task.bearing(),
                finished: task.is_finished(now),
            })
            .collect();

        self.tasks.retain(|_, task| !task.is_finished(now));
        frames.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        frames
    }

    /// Stop every animation for good
    pub fn halt(&mut self) {
        self.mounted = false;
        self.tasks.clear();
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub fn active_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_idle(&self) -> bool {
        self.tasks.is_empty()
    }
}
