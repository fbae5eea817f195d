//! Delegation to a sandboxed compute module over flat buffers.

use super::{BufferPool, CalculationHost, CalculationKind, LocalCalculationHost};
use crate::config::{Features, PoolConfig};
use crate::error::{CalcError, ModuleError};
use crate::interp::{InterpolationBatch, InterpolationBatchResult};
use crate::kernel::ComputeKernel;
use crate::prepare::{FrameInput, PreparedFrame};
use crate::protocol::{
    decode_interpolation_result, decode_prepared_frame, encode_frame_input,
    encode_interpolation_batch, frame_input_len, interpolation_input_len,
    interpolation_result_len, result_capacity,
};

/// The two entry points a compute module exports. Both read a complete input
/// buffer and fill `output`; any failure is reported, never panicked.
pub trait ComputeModule {
    fn process_interpolations(&mut self, input: &[f64], output: &mut [f64])
        -> Result<(), ModuleError>;

    fn process_frame(&mut self, input: &[f64], output: &mut [f64]) -> Result<(), ModuleError>;
}

/// Runs the compute kernel without leaving the process.
#[derive(Default)]
pub struct InProcessModule {
    kernel: ComputeKernel,
}

impl InProcessModule {
    pub fn new(features: Features) -> Self {
        Self {
            kernel: ComputeKernel::new(features),
        }
    }
}

impl ComputeModule for InProcessModule {
    fn process_interpolations(
        &mut self,
        input: &[f64],
        output: &mut [f64],
    ) -> Result<(), ModuleError> {
        self.kernel
            .process_interpolations(input, output)
            .map(|_| ())
            .map_err(|err| ModuleError::CallFailed {
                call: "process_interpolations",
                reason: err.to_string(),
            })
    }

    fn process_frame(&mut self, input: &[f64], output: &mut [f64]) -> Result<(), ModuleError> {
        self.kernel
            .process_frame(input, output)
            .map(|_| ())
            .map_err(|err| ModuleError::CallFailed {
                call: "process_frame",
                reason: err.to_string(),
            })
    }
}

/// Ships each phase to `M`. The first module or protocol error drops the
/// module and its buffers; that call and every later one run locally.
/// `release` drops the module too, so a released host reports `Local`.
pub struct NativeCalculationHost<M> {
    module: Option<M>,
    released: bool,
    pool: BufferPool,
    features: Features,
    fallback: Option<LocalCalculationHost>,
    now_ms: f64,
}

impl<M: ComputeModule> NativeCalculationHost<M> {
    pub fn new(module: M, pool: PoolConfig, features: Features) -> Self {
        Self {
            module: Some(module),
            released: false,
            pool: BufferPool::new(pool),
            features,
            fallback: None,
            now_ms: 0.0,
        }
    }

    pub fn has_failed(&self) -> bool {
        self.module.is_none() && !self.released
    }

    pub fn module(&self) -> Option<&M> {
        self.module.as_ref()
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    fn fail(&mut self, err: CalcError) {
        log::error!("native compute module failed, continuing with local calculation: {err}");
        self.module = None;
        self.pool.clear();
    }

    fn fallback(&mut self) -> &mut LocalCalculationHost {
        let features = &self.features;
        self.fallback
            .get_or_insert_with(|| LocalCalculationHost::new(features.clone()))
    }

    fn try_interpolations(
        &mut self,
        batch: &InterpolationBatch,
    ) -> Option<Result<InterpolationBatchResult, CalcError>> {
        let module = self.module.as_mut()?;
        let counts = (batch.scalars.len(), batch.degrees.len(), batch.locations.len());
        let mut input = self
            .pool
            .acquire(interpolation_input_len(counts.0, counts.1, counts.2));
        let mut output = self
            .pool
            .acquire(interpolation_result_len(counts.0, counts.1, counts.2));

        let result = encode_interpolation_batch(batch, &mut input)
            .map_err(CalcError::from)
            .and_then(|written| {
                module.process_interpolations(&input[..written], &mut output)?;
                Ok(decode_interpolation_result(&output, batch)?)
            });

        self.pool.release(input, self.now_ms);
        self.pool.release(output, self.now_ms);
        Some(result)
    }

    fn try_prepare(&mut self, frame: &FrameInput) -> Option<Result<PreparedFrame, CalcError>> {
        let module = self.module.as_mut()?;
        let mut input = self.pool.acquire(frame_input_len(
            frame.resources.len(),
            frame.sprites.len(),
            frame.items.len(),
        ));
        let mut output = self.pool.acquire(result_capacity(frame.items.len()));

        let result = encode_frame_input(frame, &mut input)
            .map_err(CalcError::from)
            .and_then(|written| {
                module.process_frame(&input[..written], &mut output)?;
                Ok(decode_prepared_frame(&output, frame)?)
            });

        self.pool.release(input, self.now_ms);
        self.pool.release(output, self.now_ms);
        Some(result)
    }
}

impl<M: ComputeModule> CalculationHost for NativeCalculationHost<M> {
    fn kind(&self) -> CalculationKind {
        if self.module.is_some() {
            CalculationKind::Native
        } else if self.released {
            CalculationKind::Local
        } else {
            CalculationKind::NativeFallback
        }
    }

    fn begin_frame(&mut self, now_ms: f64) {
        self.now_ms = now_ms;
        if self.module.is_some() {
            self.pool.maybe_sweep(now_ms);
        }
    }

    fn evaluate_interpolations(&mut self, batch: &InterpolationBatch) -> InterpolationBatchResult {
        if batch.is_empty() {
            return InterpolationBatchResult::default();
        }
        match self.try_interpolations(batch) {
            Some(Ok(result)) => return result,
            Some(Err(err)) => self.fail(err),
            None => {}
        }
        self.fallback().evaluate_interpolations(batch)
    }

    fn prepare(&mut self, input: &FrameInput) -> PreparedFrame {
        match self.try_prepare(input) {
            Some(Ok(frame)) => return frame,
            Some(Err(err)) => self.fail(err),
            None => {}
        }
        self.fallback().prepare(input)
    }

    fn release(&mut self) {
        if self.module.take().is_some() {
            log::debug!("native compute module released");
            self.released = true;
        }
        self.pool.clear();
        if let Some(fallback) = self.fallback.as_mut() {
            fallback.release();
        }
    }
}
