use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tracing::warn;

use crate::scene::SceneState;

static POISON_REPORTED: AtomicBool = AtomicBool::new(false);

fn report_poison_once(operation: &'static str) {
    if !POISON_REPORTED.swap(true, Ordering::Relaxed) {
        warn!(operation, "frame_metrics_lock_poisoned");
    }
}

/// One reporting interval of the dual-view loop. A frame presents both
/// views; scene counts are taken from the last frame of the interval.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameMetrics {
    pub fps: f32,
    pub frame_time_ms: f32,
    pub slowest_frame_ms: f32,
    pub tokens: usize,
    pub drawings: usize,
    pub fogged_cells: usize,
}

/// Shared read side of the loop metrics, cheap to clone.
#[derive(Clone, Debug, Default)]
pub struct MetricsHandle {
    latest: Arc<RwLock<FrameMetrics>>,
}

impl MetricsHandle {
    pub fn latest(&self) -> FrameMetrics {
        *self.latest.read().unwrap_or_else(|poisoned| {
            report_poison_once("read");
            poisoned.into_inner()
        })
    }

    pub(crate) fn store(&self, metrics: FrameMetrics) {
        let mut slot = self.latest.write().unwrap_or_else(|poisoned| {
            report_poison_once("write");
            poisoned.into_inner()
        });
        *slot = metrics;
    }
}

#[derive(Debug)]
pub(crate) struct IntervalStats {
    opened_at: Instant,
    length: Duration,
    frames: u32,
    busy: Duration,
    worst: Duration,
    scene_counts: (usize, usize, usize),
}

impl IntervalStats {
    pub(crate) fn new(length: Duration) -> Self {
        Self::opened(Instant::now(), length)
    }

    fn opened(opened_at: Instant, length: Duration) -> Self {
        Self {
            opened_at,
            length,
            frames: 0,
            busy: Duration::ZERO,
            worst: Duration::ZERO,
            scene_counts: (0, 0, 0),
        }
    }

    pub(crate) fn frame(&mut self, frame_dt: Duration, scene: &SceneState) {
        self.frames = self.frames.saturating_add(1);
        self.busy = self.busy.saturating_add(frame_dt);
        self.worst = self.worst.max(frame_dt);
        self.scene_counts = (
            scene.tokens.len(),
            scene.drawings.len(),
            scene.fog.hidden_count(),
        );
    }

    /// Returns the finished interval once `now` passes its end and reopens.
    pub(crate) fn close_if_due(&mut self, now: Instant) -> Option<FrameMetrics> {
        let elapsed = now.saturating_duration_since(self.opened_at);
        if elapsed < self.length {
            return None;
        }

        let average_ms = match self.frames {
            0 => 0.0,
            frames => self.busy.as_secs_f32() * 1000.0 / frames as f32,
        };
        let (tokens, drawings, fogged_cells) = self.scene_counts;
        let metrics = FrameMetrics {
            fps: self.frames as f32 / elapsed.as_secs_f32().max(f32::EPSILON),
            frame_time_ms: average_ms,
            slowest_frame_ms: self.worst.as_secs_f32() * 1000.0,
            tokens,
            drawings,
            fogged_cells,
        };
        *self = Self::opened(now, self.length);
        Some(metrics)
    }
}
