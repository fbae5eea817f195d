use super::{CalculationHost, CalculationKind};
use crate::config::Features;
use crate::interp::{InterpolationBatch, InterpolationBatchResult};
use crate::kernel::ComputeKernel;
use crate::prepare::{prepare_frame, FrameInput, PreparedFrame};

/// Runs both phases in process, on the caller's thread (or the kernel's
/// worker pool for large batches with the `parallel` feature).
#[derive(Default)]
pub struct LocalCalculationHost {
    kernel: ComputeKernel,
}

impl LocalCalculationHost {
    pub fn new(features: Features) -> Self {
        Self {
            kernel: ComputeKernel::new(features),
        }
    }
}

impl CalculationHost for LocalCalculationHost {
    fn kind(&self) -> CalculationKind {
        CalculationKind::Local
    }

    fn evaluate_interpolations(&mut self, batch: &InterpolationBatch) -> InterpolationBatchResult {
        self.kernel.evaluate(batch)
    }

    fn prepare(&mut self, input: &FrameInput) -> PreparedFrame {
        prepare_frame(input)
    }

    fn release(&mut self) {}
}
