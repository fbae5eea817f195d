//! Execution strategies.
//!
//! A `CalculationHost` runs the two pure phases of a frame (interpolation
//! evaluation and render preparation). `LocalCalculationHost` calls them
//! directly; `NativeCalculationHost` ships them to a compute module through
//! the buffer protocol and falls back to local execution for good on the
//! first failure.

pub mod local;
pub mod native;
pub mod pool;

pub use local::LocalCalculationHost;
pub use native::{ComputeModule, InProcessModule, NativeCalculationHost};
pub use pool::BufferPool;

use serde::{Deserialize, Serialize};

use crate::host::{FrameOutput, RenderHost};
use crate::interp::{InterpolationBatch, InterpolationBatchResult};
use crate::prepare::{FrameInput, PreparedFrame};
use crate::projection::ProjectionHost;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CalculationKind {
    Local,
    Native,
    /// A native delegate that failed and now runs locally.
    NativeFallback,
}

pub trait CalculationHost {
    fn kind(&self) -> CalculationKind;

    /// Called once at the start of every frame.
    fn begin_frame(&mut self, _now_ms: f64) {}

    fn evaluate_interpolations(&mut self, batch: &InterpolationBatch) -> InterpolationBatchResult;

    fn prepare(&mut self, input: &FrameInput) -> PreparedFrame;

    /// Free everything the strategy holds (pooled buffers, module handles).
    fn release(&mut self);

    /// Run one frame of `render` through this strategy.
    fn process_frame(
        &mut self,
        render: &mut RenderHost,
        projection: &dyn ProjectionHost,
        now_ms: f64,
    ) -> FrameOutput {
        render.process(self, projection, now_ms)
    }
}
