use super::functions::Interpolant;
use super::state::{Evaluation, InterpolationMode, InterpolationOptions, InterpolationState};

/// An animatable attribute: the value on screen, the last commanded target
/// and the transition (if any) between them.
#[derive(Clone, Debug, PartialEq)]
pub struct Channel<T> {
    current: T,
    commanded: T,
    state: Option<InterpolationState<T>>,
}

impl<T: Interpolant> Channel<T> {
    pub fn new(value: T) -> Self {
        Self {
            current: value,
            commanded: value,
            state: None,
        }
    }

    /// Value as of the last applied evaluation.
    pub fn value(&self) -> T {
        self.current
    }

    /// Last commanded target.
    pub fn target(&self) -> T {
        self.commanded
    }

    pub fn state(&self) -> Option<&InterpolationState<T>> {
        self.state.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.state.is_some()
    }

    /// Command a new target. Without animating options the value jumps.
    pub fn set(&mut self, target: T, options: Option<&InterpolationOptions>) {
        let Some(options) = options.filter(|o| o.animates()) else {
            self.current = target.settle();
            self.commanded = target;
            self.state = None;
            return;
        };

        let aimed = match options.mode {
            InterpolationMode::Feedforward if self.state.is_some() => {
                T::extrapolate(&self.commanded, &target)
            }
            _ => target,
        };

        self.state = Some(InterpolationState {
            from: self.current,
            path_target: T::path_target(&self.current, &aimed),
            final_value: target,
            start_ms: None,
            duration_ms: options.duration_ms,
            easing: options.easing,
        });
        self.commanded = target;
    }

    /// Apply an evaluation of the current state: fix the start, or snap and
    /// clear on completion.
    pub fn apply(&mut self, evaluation: Evaluation<T>) {
        self.current = evaluation.value;
        if evaluation.completed {
            self.state = None;
        } else if let Some(state) = self.state {
            if state.start_ms.is_none() {
                self.state = Some(state.started_at(evaluation.effective_start_ms));
            }
        }
    }

    /// Evaluate and apply locally. Returns whether the channel is still animating.
    pub fn step(&mut self, now_ms: f64) -> bool {
        if let Some(state) = self.state {
            self.apply(state.evaluate(now_ms));
        }
        self.is_active()
    }

    /// Drop any transition and jump to the commanded target.
    pub fn finish(&mut self) {
        self.current = self.commanded.settle();
        self.state = None;
    }
}
