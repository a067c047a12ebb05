// inertia.rs — pointer history and the post-drag deceleration

use std::collections::VecDeque;

use glam::DVec2;

use crate::animation::{AnimationOptions, AnimationTask};
use crate::easing::Easing;
use crate::viewport::ViewState;

/// Milliseconds of pointer history used to estimate the release velocity.
pub const INERTIA_WINDOW: f64 = 300.0;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Sample {
    time: f64,
    point: DVec2,
}

/// Rolling `(time, x, y)` history of the current drag.
#[derive(Debug, Default)]
pub struct InertiaController {
    samples: VecDeque<Sample>,
}

impl InertiaController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the previous drag and start a new history.
    pub fn start(&mut self, now: f64, x: f64, y: f64) {
        self.samples.clear();
        self.record(now, x, y);
    }

    pub fn record(&mut self, now: f64, x: f64, y: f64) {
        let point = DVec2::new(x, y);
        match self.samples.back_mut() {
            Some(last) if last.point == point => last.time = now,
            Some(last) if last.time == now => last.point = point,
            _ => self.samples.push_back(Sample { time: now, point }),
        }
        self.prune(now);
    }

    fn prune(&mut self, now: f64) {
        while self
            .samples
            .front()
            .is_some_and(|s| s.time < now - INERTIA_WINDOW)
        {
            self.samples.pop_front();
        }

        // a pause means the drag restarted: older samples say nothing about the release speed
        let restart = (1..self.samples.len())
            .rev()
            .find(|&i| self.samples[i].time - self.samples[i - 1].time > INERTIA_WINDOW / 10.0);
        if let Some(i) = restart {
            self.samples.drain(..i);
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Build the deceleration for a release at `(x, y)`.
    ///
    /// The task replays the pointer from the release point along the recent drag
    /// direction through [`ViewState::drag_to`]. A release without movement yields a
    /// zero-length task that settles on its first tick.
    pub fn release(&mut self, now: f64, x: f64, y: f64) -> AnimationTask<ViewState> {
        self.record(now, x, y);
        let current = DVec2::new(x, y);
        let oldest = self.samples.front().map_or(current, |s| s.point);
        self.samples.clear();

        let direction = current - oldest;
        let distance = direction.length();
        log::debug!("inertia over {:.1}px", distance);

        let options = AnimationOptions::new(distance * INERTIA_WINDOW / 100.0)
            .property("x", current.x, current.x + direction.x)
            .property("y", current.y, current.y + direction.y)
            .easing(Easing::OutCirc);

        AnimationTask::new(options, |state: &mut ViewState, values, _| {
            if let (Some(x), Some(y)) = (values.get("x"), values.get("y")) {
                state.drag_to(x, y);
            }
        })
    }
}
