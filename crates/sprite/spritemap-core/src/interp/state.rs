use serde::{Deserialize, Serialize};

use super::easing::Easing;
use super::functions::Interpolant;

/// How a new command on an animating channel picks its target.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InterpolationMode {
    /// Restart from the on-screen value toward the new target.
    #[default]
    Feedback,
    /// Overshoot the new target by the last commanded step while animating.
    Feedforward,
}

/// User-facing interpolation options for one channel.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterpolationOptions {
    pub duration_ms: f64,
    #[serde(default)]
    pub easing: Easing,
    #[serde(default)]
    pub mode: InterpolationMode,
}

impl InterpolationOptions {
    pub fn new(duration_ms: f64) -> Self {
        Self {
            duration_ms,
            easing: Easing::Linear,
            mode: InterpolationMode::Feedback,
        }
    }

    pub fn with_easing(mut self, easing: Easing) -> Self {
        self.easing = easing;
        self
    }

    pub fn with_mode(mut self, mode: InterpolationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn animates(&self) -> bool {
        self.duration_ms.is_finite() && self.duration_ms > 0.0
    }
}

/// One in-flight transition. Never mutated: fixing the start timestamp
/// produces a new value via [`InterpolationState::started_at`].
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InterpolationState<T> {
    pub from: T,
    /// Value the easing curve travels to (may differ from `final_value` for
    /// angular and feed-forward paths).
    pub path_target: T,
    /// Value the channel snaps to on completion.
    pub final_value: T,
    /// Fixed lazily on the first evaluation.
    pub start_ms: Option<f64>,
    pub duration_ms: f64,
    pub easing: Easing,
}

/// Result of evaluating a state at one timestamp.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Evaluation<T> {
    pub value: T,
    pub completed: bool,
    pub effective_start_ms: f64,
}

impl<T: Interpolant> InterpolationState<T> {
    pub fn started_at(&self, start_ms: f64) -> Self {
        Self {
            start_ms: Some(start_ms),
            ..*self
        }
    }

    /// Pure evaluation at `now_ms`.
    pub fn evaluate(&self, now_ms: f64) -> Evaluation<T> {
        let effective_start_ms = self.start_ms.unwrap_or(now_ms);
        let mut value = self.final_value;
        let mut completed = true;

        if self.duration_ms > 0.0 && self.from.differs(&self.path_target) {
            let raw = (now_ms - effective_start_ms) / self.duration_ms;
            let raw = if raw.is_finite() { raw } else { 1.0 };
            completed = raw >= 1.0;
            if !completed {
                let eased = self.easing.apply(raw);
                value = T::lerp(&self.from, &self.path_target, eased);
            }
        }

        Evaluation {
            value: value.settle(),
            completed,
            effective_start_ms,
        }
    }
}
