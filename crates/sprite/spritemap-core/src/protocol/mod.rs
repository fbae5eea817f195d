//! Flat `f64` buffer protocol shared with the compute module.
//!
//! Every buffer opens with a header whose first slot is `PROTOCOL_VERSION`.
//! The layouts below are the module ABI; changing any of them requires a
//! version bump.
//!
//! Frame input:
//! ```text
//! [header 16][frame constants 16][matrices 48][resources 9*R][sprites 9*S][items 15*I]
//! ```
//! Frame result:
//! ```text
//! [header 8][item (14 common + 36 vertex + 8 hit-test + 28 shader) * N]
//! ```
//! Interpolation input / result:
//! ```text
//! [header 5][scalars 9*A][degrees 9*B][locations 18*C]
//! [header 5][scalars 3*A][degrees 3*B][locations 6*C]
//! ```

pub mod cursor;
pub mod frame;
pub mod interp;

pub use cursor::{BufferReader, BufferWriter};
pub use frame::{decode_frame_input, decode_prepared_frame, encode_frame_input, encode_prepared_frame};
pub use interp::{
    decode_interpolation_batch, decode_interpolation_result, encode_interpolation_batch,
    encode_interpolation_result,
};

use crate::error::ProtocolError;

pub const PROTOCOL_VERSION: u32 = 1;

pub const INPUT_HEADER_LENGTH: usize = 16;
pub const FRAME_CONSTANT_LENGTH: usize = 16;
pub const MATRIX_LENGTH: usize = 48;
pub const RESOURCE_STRIDE: usize = 9;
pub const SPRITE_STRIDE: usize = 9;
pub const ITEM_STRIDE: usize = 15;

pub const FLAG_BILLBOARD_SHADER: u32 = 1;
pub const FLAG_SURFACE_SHADER: u32 = 1 << 1;
pub const FLAG_APPLY_BIAS: u32 = 1 << 2;

pub const RESULT_HEADER_LENGTH: usize = 8;
pub const RESULT_COMMON_LENGTH: usize = 14;
pub const RESULT_VERTEX_LENGTH: usize = 36;
pub const RESULT_HIT_TEST_LENGTH: usize = 8;
pub const RESULT_SHADER_LENGTH: usize = 28;
pub const RESULT_ITEM_STRIDE: usize =
    RESULT_COMMON_LENGTH + RESULT_VERTEX_LENGTH + RESULT_HIT_TEST_LENGTH + RESULT_SHADER_LENGTH;

pub const SHADER_NONE: f64 = 0.0;
pub const SHADER_BILLBOARD: f64 = 1.0;
pub const SHADER_SURFACE: f64 = 2.0;

pub const INTERPOLATION_HEADER_LENGTH: usize = 5;
pub const SCALAR_ITEM_LENGTH: usize = 9;
pub const SCALAR_RESULT_LENGTH: usize = 3;
pub const LOCATION_ITEM_LENGTH: usize = 18;
pub const LOCATION_RESULT_LENGTH: usize = 6;

/// Slots needed for a frame input.
pub fn frame_input_len(resources: usize, sprites: usize, items: usize) -> usize {
    INPUT_HEADER_LENGTH
        + FRAME_CONSTANT_LENGTH
        + MATRIX_LENGTH
        + resources * RESOURCE_STRIDE
        + sprites * SPRITE_STRIDE
        + items * ITEM_STRIDE
}

/// Slots a frame result may need: every input item can produce one draw item.
pub fn result_capacity(items: usize) -> usize {
    RESULT_HEADER_LENGTH + items * RESULT_ITEM_STRIDE
}

pub fn interpolation_input_len(scalars: usize, degrees: usize, locations: usize) -> usize {
    INTERPOLATION_HEADER_LENGTH
        + (scalars + degrees) * SCALAR_ITEM_LENGTH
        + locations * LOCATION_ITEM_LENGTH
}

pub fn interpolation_result_len(scalars: usize, degrees: usize, locations: usize) -> usize {
    INTERPOLATION_HEADER_LENGTH
        + (scalars + degrees) * SCALAR_RESULT_LENGTH
        + locations * LOCATION_RESULT_LENGTH
}

/// Read and check the version slot.
pub(crate) fn expect_version(reader: &mut BufferReader<'_>) -> Result<(), ProtocolError> {
    let found = reader.read()?;
    if found != PROTOCOL_VERSION as f64 {
        return Err(ProtocolError::VersionMismatch {
            expected: PROTOCOL_VERSION,
            found,
        });
    }
    Ok(())
}

/// Read a layout slot that must hold a known constant.
pub(crate) fn expect_layout(
    reader: &mut BufferReader<'_>,
    field: &'static str,
    expected: usize,
) -> Result<(), ProtocolError> {
    let found = reader.read_count(field)?;
    if found != expected {
        return Err(ProtocolError::LayoutMismatch {
            field,
            expected,
            found,
        });
    }
    Ok(())
}
