//! Buffer-in / buffer-out compute kernel.
//!
//! This is the code a native compute module runs: decode a flat input
//! buffer, run the same pure functions the local path uses, encode the
//! result. `spritemap-wasm` exports it directly; `InProcessModule` calls it
//! without leaving the process.

use crate::config::Features;
use crate::error::ProtocolError;
use crate::interp::{evaluate_batch, InterpolationBatch, InterpolationBatchResult};
use crate::prepare::prepare_frame;
use crate::protocol::{
    decode_frame_input, decode_interpolation_batch, encode_interpolation_result,
    encode_prepared_frame,
};

/// Decode a frame input, prepare it and encode the draw items into `out`.
/// Returns the number of slots written.
pub fn process_frame_buffers(input: &[f64], out: &mut [f64]) -> Result<usize, ProtocolError> {
    let frame = decode_frame_input(input)?;
    let prepared = prepare_frame(&frame);
    encode_prepared_frame(&prepared, out)
}

/// Decode an interpolation batch, evaluate it and encode the results into `out`.
pub fn process_interpolation_buffers(
    input: &[f64],
    out: &mut [f64],
) -> Result<usize, ProtocolError> {
    let batch = decode_interpolation_batch(input)?;
    let result = evaluate_batch(&batch);
    encode_interpolation_result(&result, batch.timestamp_ms, out)
}

/// Kernel with an optional worker pool for large interpolation batches.
pub struct ComputeKernel {
    features: Features,
    #[cfg(feature = "parallel")]
    pool: Option<rayon::ThreadPool>,
}

impl ComputeKernel {
    pub fn new(features: Features) -> Self {
        let mut kernel = Self {
            features,
            #[cfg(feature = "parallel")]
            pool: None,
        };
        kernel.rebuild_pool();
        kernel
    }

    pub fn features(&self) -> &Features {
        &self.features
    }

    /// Resize the worker pool. `None` sizes it from the hardware.
    pub fn set_thread_pool_size(&mut self, size: Option<usize>) {
        self.features.thread_pool_size = size;
        self.rebuild_pool();
    }

    /// Worker threads actually available (1 without the `parallel` feature).
    pub fn thread_count(&self) -> usize {
        #[cfg(feature = "parallel")]
        let threads = self.pool.as_ref().map_or(1, |pool| pool.current_num_threads());
        #[cfg(not(feature = "parallel"))]
        let threads = 1;
        threads
    }

    #[cfg(feature = "parallel")]
    fn rebuild_pool(&mut self) {
        let threads = self
            .features
            .thread_pool_size
            .unwrap_or_else(num_cpus::get)
            .max(1);
        self.pool = if threads > 1 {
            match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
                Ok(pool) => Some(pool),
                Err(err) => {
                    log::debug!("kernel worker pool unavailable: {err}");
                    None
                }
            }
        } else {
            None
        };
    }

    #[cfg(not(feature = "parallel"))]
    fn rebuild_pool(&mut self) {}

    pub fn evaluate(&self, batch: &InterpolationBatch) -> InterpolationBatchResult {
        #[cfg(feature = "parallel")]
        let result = match &self.pool {
            Some(pool) => {
                crate::interp::evaluate_batch_in(pool, batch, self.features.min_parallel_items)
            }
            None => evaluate_batch(batch),
        };
        #[cfg(not(feature = "parallel"))]
        let result = evaluate_batch(batch);
        result
    }

    pub fn process_frame(&self, input: &[f64], out: &mut [f64]) -> Result<usize, ProtocolError> {
        process_frame_buffers(input, out)
    }

    pub fn process_interpolations(
        &self,
        input: &[f64],
        out: &mut [f64],
    ) -> Result<usize, ProtocolError> {
        let batch = decode_interpolation_batch(input)?;
        let result = self.evaluate(&batch);
        encode_interpolation_result(&result, batch.timestamp_ms, out)
    }
}

impl Default for ComputeKernel {
    fn default() -> Self {
        Self::new(Features::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::{Easing, InterpolationState};
    use crate::protocol::{
        decode_interpolation_result, encode_interpolation_batch, interpolation_input_len,
        interpolation_result_len, PROTOCOL_VERSION,
    };

    #[test]
    fn interpolation_buffers_match_local_evaluation() {
        let mut batch = InterpolationBatch::new(25.0);
        batch.scalars.push(InterpolationState {
            from: 0.0,
            path_target: 8.0,
            final_value: 8.0,
            start_ms: Some(0.0),
            duration_ms: 100.0,
            easing: Easing::Linear,
        });
        let mut input = vec![0.0; interpolation_input_len(1, 0, 0)];
        encode_interpolation_batch(&batch, &mut input).expect("encode");
        let mut out = vec![0.0; interpolation_result_len(1, 0, 0)];
        let kernel = ComputeKernel::default();
        kernel
            .process_interpolations(&input, &mut out)
            .expect("kernel");
        let decoded = decode_interpolation_result(&out, &batch).expect("decode");
        assert_eq!(decoded, evaluate_batch(&batch));
        assert!((decoded.scalars[0].value - 2.0).abs() < 1e-12);
    }

    #[test]
    fn wrong_version_is_rejected() {
        let mut input = vec![0.0; interpolation_input_len(0, 0, 0)];
        input[0] = (PROTOCOL_VERSION + 1) as f64;
        let mut out = vec![0.0; 16];
        assert!(matches!(
            process_interpolation_buffers(&input, &mut out),
            Err(ProtocolError::VersionMismatch { .. })
        ));
    }

    #[test]
    fn explicit_thread_count_is_honoured() {
        let mut kernel = ComputeKernel::default();
        kernel.set_thread_pool_size(Some(1));
        assert_eq!(kernel.thread_count(), 1);
        assert_eq!(kernel.features().thread_pool_size, Some(1));
    }
}
