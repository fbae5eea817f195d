//! Spritemap Core (engine-agnostic)
//!
//! Per-frame computation for map sprite overlays: placement of billboard and
//! surface images, depth ordering, pointer hit-testing and time-based
//! interpolation of sprite attributes. The pure phases can run in process or
//! be delegated to a compute module through a versioned flat `f64` buffer
//! protocol (see [`protocol`] and [`kernel`]).

pub mod calc;
pub mod config;
pub mod engine;
pub mod error;
pub mod geo;
pub mod hit_test;
pub mod host;
pub mod ids;
pub mod interp;
pub mod kernel;
pub mod prepare;
pub mod projection;
pub mod protocol;
pub mod spatial;
pub mod sprite;

// Re-exports for consumers (adapters)
pub use calc::{
    BufferPool, CalculationHost, CalculationKind, ComputeModule, InProcessModule,
    LocalCalculationHost, NativeCalculationHost,
};
pub use config::Config;
pub use engine::SpriteEngine;
pub use error::{CalcError, ConfigError, ModuleError, ProtocolError, SpatialError, SpriteError};
pub use geo::{MercatorCoordinate, SpriteLocation};
pub use hit_test::{HitTestController, HitTestEntry, HitTestResult};
pub use host::{FrameOutput, RenderHost};
pub use ids::{ImageHandle, ImageKey, ResourceHandle, SpriteHandle};
pub use interp::{
    Channel, Degrees, Easing, EasingMode, InterpolationBatch, InterpolationBatchResult,
    InterpolationMode, InterpolationOptions, InterpolationState,
};
pub use kernel::{process_frame_buffers, process_interpolation_buffers, ComputeKernel};
pub use prepare::{prepare_frame, FrameInput, PreparedDrawItem, PreparedFrame};
pub use projection::{MatrixProjection, ProjectionHost, ScreenPoint, TransformSnapshot};
pub use protocol::PROTOCOL_VERSION;
pub use spatial::{LooseQuadTree, Rect, SpatialKey};
pub use sprite::{
    Anchor, AtlasRegion, ImageDefinition, ImageOffset, OriginReference, PlacementMode,
    ShaderInputs, SpriteDefinition,
};
