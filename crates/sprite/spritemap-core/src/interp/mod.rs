//! Time-based interpolation of sprite attributes.
//!
//! Channels hold the on-screen value and an optional `InterpolationState`;
//! states are evaluated purely from `(state, timestamp)` so a whole frame's
//! worth can be shipped to the compute module as one batch.

pub mod batch;
pub mod channel;
pub mod easing;
pub mod functions;
pub mod state;

pub use batch::{evaluate_batch, InterpolationBatch, InterpolationBatchResult};
#[cfg(feature = "parallel")]
pub use batch::evaluate_batch_in;
pub use channel::Channel;
pub use easing::{Easing, EasingMode};
pub use functions::{normalize_degrees, shortest_delta_degrees, Degrees, Interpolant};
pub use state::{Evaluation, InterpolationMode, InterpolationOptions, InterpolationState};
