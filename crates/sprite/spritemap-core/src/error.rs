//! Error types shared across the engine.
//!
//! Projection failures are not errors: they surface as `None` and the affected
//! item is skipped for the frame.

use thiserror::Error;

use crate::ids::{ImageKey, SpriteHandle};
use crate::spatial::Rect;

/// Configuration parsing or validation failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config json parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Misuse of the spatial index.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpatialError {
    /// Items must lie within the root bounds; anything else is a configuration bug.
    #[error("rect {rect:?} lies outside the index root bounds {root:?}")]
    OutOfBounds { rect: Rect, root: Rect },
}

/// Store commands addressing sprites or images that do not exist (or already do).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpriteError {
    #[error("sprite id already registered: {0}")]
    DuplicateSprite(String),
    #[error("unknown sprite handle: {0:?}")]
    UnknownSprite(SpriteHandle),
    #[error("image {key:?} already attached to sprite {sprite:?}")]
    DuplicateImage { sprite: SpriteHandle, key: ImageKey },
    #[error("image {key:?} not attached to sprite {sprite:?}")]
    UnknownImage { sprite: SpriteHandle, key: ImageKey },
    #[error("no {0} handles left; clear the table before adding more")]
    HandlesExhausted(&'static str),
}

/// Violations of the flat buffer layout shared with the compute module.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    #[error("buffer overflow: need {needed} slots, capacity {capacity}")]
    Overflow { needed: usize, capacity: usize },
    #[error("buffer truncated: need {needed} slots, have {available}")]
    Truncated { needed: usize, available: usize },
    #[error("protocol version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: f64 },
    #[error("invalid count for {field}: {value}")]
    InvalidCount { field: &'static str, value: f64 },
    #[error("invalid index for {field}: {value} (len {len})")]
    InvalidIndex {
        field: &'static str,
        value: f64,
        len: usize,
    },
    #[error("layout mismatch for {field}: expected {expected}, found {found}")]
    LayoutMismatch {
        field: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("length mismatch: header declares {declared} slots, wrote/read {actual}")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("{field} {found} does not match the input item (expected {expected})")]
    HandleMismatch {
        field: &'static str,
        expected: u32,
        found: u32,
    },
}

/// Failure reported by (or while calling) a native compute module.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModuleError {
    #[error("native module call `{call}` failed: {reason}")]
    CallFailed { call: &'static str, reason: String },
    #[error("native module rejected the buffers for `{call}`")]
    Rejected { call: &'static str },
}

/// Errors caught at the execution-strategy boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalcError {
    #[error(transparent)]
    Module(#[from] ModuleError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
