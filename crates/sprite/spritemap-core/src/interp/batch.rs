//! Pure batch evaluation over the three channel kinds.

use serde::{Deserialize, Serialize};

use super::functions::Degrees;
use super::state::{Evaluation, InterpolationState};
use crate::geo::SpriteLocation;

/// Every active transition of a frame, grouped by kind. Order inside each
/// array is the caller's re-association key.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InterpolationBatch {
    pub timestamp_ms: f64,
    pub scalars: Vec<InterpolationState<f64>>,
    pub degrees: Vec<InterpolationState<Degrees>>,
    pub locations: Vec<InterpolationState<SpriteLocation>>,
}

impl InterpolationBatch {
    pub fn new(timestamp_ms: f64) -> Self {
        Self {
            timestamp_ms,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.scalars.len() + self.degrees.len() + self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InterpolationBatchResult {
    pub scalars: Vec<Evaluation<f64>>,
    pub degrees: Vec<Evaluation<Degrees>>,
    pub locations: Vec<Evaluation<SpriteLocation>>,
}

pub fn evaluate_batch(batch: &InterpolationBatch) -> InterpolationBatchResult {
    let now = batch.timestamp_ms;
    InterpolationBatchResult {
        scalars: batch.scalars.iter().map(|s| s.evaluate(now)).collect(),
        degrees: batch.degrees.iter().map(|s| s.evaluate(now)).collect(),
        locations: batch.locations.iter().map(|s| s.evaluate(now)).collect(),
    }
}

/// Same as [`evaluate_batch`] but spread across `pool` once the batch holds
/// at least `min_items` transitions.
#[cfg(feature = "parallel")]
pub fn evaluate_batch_in(
    pool: &rayon::ThreadPool,
    batch: &InterpolationBatch,
    min_items: usize,
) -> InterpolationBatchResult {
    use rayon::prelude::*;

    if batch.len() < min_items {
        return evaluate_batch(batch);
    }
    let now = batch.timestamp_ms;
    pool.install(|| InterpolationBatchResult {
        scalars: batch.scalars.par_iter().map(|s| s.evaluate(now)).collect(),
        degrees: batch.degrees.par_iter().map(|s| s.evaluate(now)).collect(),
        locations: batch.locations.par_iter().map(|s| s.evaluate(now)).collect(),
    })
}
