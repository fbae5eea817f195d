//! Core configuration for spritemap-core.
//!
//! Every section deserializes with defaults, so hosts can pass a partial JSON
//! object (`{"pool": {"ttl_ms": 8000}}`) and get sensible values for the rest.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Engine configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub spatial: SpatialConfig,
    pub hit_test: HitTestConfig,
    pub scaling: ScalingConfig,
    pub depth: DepthConfig,
    pub shader: ShaderConfig,
    pub pool: PoolConfig,
    pub features: Features,
}

impl Config {
    /// Parse a (possibly partial) JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let cfg: Config = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values that would break tree construction or pixel clamping.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.spatial.looseness >= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "spatial.looseness must be >= 1.0, got {}",
                self.spatial.looseness
            )));
        }
        if self.spatial.max_items_per_node == 0 {
            return Err(ConfigError::Invalid(
                "spatial.max_items_per_node must be > 0".into(),
            ));
        }
        if self.scaling.sprite_max_pixel > 0.0
            && self.scaling.sprite_min_pixel > self.scaling.sprite_max_pixel
        {
            return Err(ConfigError::Invalid(format!(
                "scaling.sprite_min_pixel ({}) exceeds sprite_max_pixel ({})",
                self.scaling.sprite_min_pixel, self.scaling.sprite_max_pixel
            )));
        }
        if !(self.pool.slack_ratio >= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "pool.slack_ratio must be >= 1.0, got {}",
                self.pool.slack_ratio
            )));
        }
        Ok(())
    }
}

/// Loose quadtree tuning.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpatialConfig {
    /// Loose bounds = tight bounds scaled by this factor around the node center.
    pub looseness: f64,
    /// Leaf item count that triggers subdivision.
    pub max_items_per_node: usize,
    pub max_depth: u32,
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self {
            looseness: 1.5,
            max_items_per_node: 16,
            max_depth: 20,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HitTestConfig {
    pub enabled: bool,
    /// Screen-space margin (pixels) unprojected around a pointer to build the world query.
    pub query_margin_px: f64,
    /// Cross products within this magnitude count as "on the edge".
    pub quad_epsilon: f64,
}

impl Default for HitTestConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            query_margin_px: 32.0,
            quad_epsilon: 1e-7,
        }
    }
}

/// How image pixels map to world meters and how large a sprite may get on screen.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalingConfig {
    /// World meters covered by one image pixel at scale 1.
    pub meters_per_pixel: f64,
    pub zoom_min: f64,
    pub zoom_max: f64,
    /// Scale factor applied at `zoom_min`; interpolated linearly up to `scale_max` at `zoom_max`.
    pub scale_min: f64,
    pub scale_max: f64,
    /// Minimum on-screen size of the largest sprite dimension (0 disables).
    pub sprite_min_pixel: f64,
    /// Maximum on-screen size of the largest sprite dimension (0 disables).
    pub sprite_max_pixel: f64,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            meters_per_pixel: 1.0,
            zoom_min: 0.0,
            zoom_max: 24.0,
            scale_min: 1.0,
            scale_max: 1.0,
            sprite_min_pixel: 0.0,
            sprite_max_pixel: 2048.0,
        }
    }
}

impl ScalingConfig {
    /// Zoom-dependent scale multiplier.
    pub fn zoom_scale_factor(&self, zoom: f64) -> f64 {
        if !zoom.is_finite() || self.zoom_max <= self.zoom_min {
            return self.scale_max;
        }
        let t = ((zoom - self.zoom_min) / (self.zoom_max - self.zoom_min)).clamp(0.0, 1.0);
        self.scale_min + (self.scale_max - self.scale_min) * t
    }
}

/// Depth ordering of surface sprites.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthConfig {
    /// NDC bias per (sub layer, order) step; 0 disables biasing.
    pub surface_bias: f64,
    /// Order slots reserved per sub layer when flattening (sub layer, order) into one index.
    pub order_stride: f64,
    /// Keeps biased clip z strictly in front of the near plane.
    pub min_clip_z_epsilon: f64,
}

impl Default for DepthConfig {
    fn default() -> Self {
        Self {
            surface_bias: 1e-7,
            order_stride: 1024.0,
            min_clip_z_epsilon: 1e-7,
        }
    }
}

/// Emit reduced shader inputs instead of fully precomputed vertices.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    pub billboard: bool,
    pub surface: bool,
}

/// Scratch buffer pooling for the native delegate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub sweep_interval_ms: f64,
    pub ttl_ms: f64,
    /// A request may reuse a pooled buffer up to this many times larger.
    pub slack_ratio: f64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: 3000.0,
            ttl_ms: 5000.0,
            slack_ratio: 2.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Features {
    /// Worker threads for the kernel's interpolation batches (`None` = hardware concurrency).
    pub thread_pool_size: Option<usize>,
    /// Batches smaller than this are evaluated on the calling thread.
    pub min_parallel_items: usize,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            thread_pool_size: None,
            min_parallel_items: 512,
        }
    }
}
