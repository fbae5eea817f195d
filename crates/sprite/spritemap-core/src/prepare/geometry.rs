//! Quad geometry for billboard and surface images.
//!
//! Corner order is always [top-left, top-right, bottom-right, bottom-left]
//! and the two triangles are (0, 1, 2) and (0, 2, 3).

use serde::{Deserialize, Serialize};

use crate::geo::{apply_surface_displacement, heading_to_east_north, SpriteLocation, DEG2RAD};
use crate::projection::ScreenPoint;
use crate::sprite::{Anchor, AtlasRegion};

pub const TRIANGLE_INDICES: [usize; 6] = [0, 1, 2, 0, 2, 3];

/// Corner template used when the shader does the placement.
pub const UNIT_QUAD: [[f64; 2]; 4] = [[-1.0, 1.0], [1.0, 1.0], [1.0, -1.0], [-1.0, -1.0]];

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    /// Clip-space position.
    pub position: [f64; 4],
    pub uv: [f64; 2],
}

/// Affine screen-pixel → clip transform: `clip = screen * scale + offset`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScreenToClip {
    pub scale_x: f64,
    pub scale_y: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl ScreenToClip {
    pub fn for_viewport(width: f64, height: f64) -> Self {
        Self {
            scale_x: 2.0 / width,
            scale_y: -2.0 / height,
            offset_x: -1.0,
            offset_y: 1.0,
        }
    }

    #[inline]
    pub fn apply(&self, p: ScreenPoint) -> [f64; 4] {
        [
            p.x * self.scale_x + self.offset_x,
            p.y * self.scale_y + self.offset_y,
            0.0,
            1.0,
        ]
    }
}

/// Factor bringing the largest on-screen dimension into `[min_px, max_px]`.
/// A zero bound is disabled.
pub fn pixel_scale_adjustment(width_px: f64, height_px: f64, min_px: f64, max_px: f64) -> f64 {
    let largest = width_px.max(height_px);
    if !largest.is_finite() || largest <= 0.0 {
        return 1.0;
    }
    if max_px > 0.0 && largest > max_px {
        max_px / largest
    } else if min_px > 0.0 && largest < min_px {
        min_px / largest
    } else {
        1.0
    }
}

/// Rotate a y-down screen vector clockwise by `deg`.
#[inline]
pub fn rotate_screen(x: f64, y: f64, deg: f64) -> (f64, f64) {
    let (sin, cos) = (deg * DEG2RAD).sin_cos();
    (x * cos - y * sin, x * sin + y * cos)
}

/// Rotate an (east, north) vector clockwise by `deg`.
#[inline]
pub fn rotate_ground(east: f64, north: f64, deg: f64) -> (f64, f64) {
    let (sin, cos) = (deg * DEG2RAD).sin_cos();
    (east * cos + north * sin, -east * sin + north * cos)
}

/// Corners relative to the anchor, y-up.
pub fn local_corners(half_width: f64, half_height: f64, anchor: Anchor) -> [(f64, f64); 4] {
    let ax = anchor.x * half_width;
    let ay = anchor.y * half_height;
    [
        (-half_width - ax, half_height - ay),
        (half_width - ax, half_height - ay),
        (half_width - ax, -half_height - ay),
        (-half_width - ax, -half_height - ay),
    ]
}

pub fn uv_corners(region: &AtlasRegion) -> [[f64; 2]; 4] {
    [
        [region.u0, region.v0],
        [region.u1, region.v0],
        [region.u1, region.v1],
        [region.u0, region.v1],
    ]
}

pub fn triangulate(positions: &[[f64; 4]; 4], uvs: &[[f64; 2]; 4]) -> [Vertex; 6] {
    TRIANGLE_INDICES.map(|corner| Vertex {
        position: positions[corner],
        uv: uvs[corner],
    })
}

pub fn unit_quad_positions() -> [[f64; 4]; 4] {
    UNIT_QUAD.map(|[x, y]| [x, y, 0.0, 1.0])
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BillboardGeometry {
    /// Anchor after the pixel offset; the rotation pivot.
    pub anchor: ScreenPoint,
    pub center: ScreenPoint,
    pub corners: [ScreenPoint; 4],
    pub half_width: f64,
    pub half_height: f64,
}

impl BillboardGeometry {
    pub fn is_finite(&self) -> bool {
        self.anchor.is_finite()
            && self.center.is_finite()
            && self.corners.iter().all(ScreenPoint::is_finite)
    }
}

/// Screen rectangle around `base`, shifted by `offset_px` along the heading
/// and rotated clockwise around the shifted anchor.
pub fn billboard_geometry(
    base: ScreenPoint,
    width_px: f64,
    height_px: f64,
    anchor: Anchor,
    offset_px: f64,
    heading_deg: f64,
    rotation_deg: f64,
) -> BillboardGeometry {
    let (east, north) = heading_to_east_north(offset_px, heading_deg);
    let pivot = base.offset(east, -north);
    let half_width = width_px * 0.5;
    let half_height = height_px * 0.5;

    let corners = local_corners(half_width, half_height, anchor).map(|(lx, ly)| {
        let (dx, dy) = rotate_screen(lx, -ly, rotation_deg);
        pivot.offset(dx, dy)
    });
    let (cx, cy) = rotate_screen(
        -anchor.x * half_width,
        anchor.y * half_height,
        rotation_deg,
    );

    BillboardGeometry {
        anchor: pivot,
        center: pivot.offset(cx, cy),
        corners,
        half_width,
        half_height,
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SurfaceGeometry {
    pub anchor: SpriteLocation,
    pub center: SpriteLocation,
    /// (east, north) meters of each corner from the base point.
    pub displacements: [[f64; 2]; 4],
    pub corners: [SpriteLocation; 4],
}

/// Ground rectangle in meters: offset from `base` along the heading, then
/// rotated clockwise around the offset anchor.
pub fn surface_geometry(
    base: &SpriteLocation,
    width_m: f64,
    height_m: f64,
    anchor: Anchor,
    offset_m: f64,
    heading_deg: f64,
    rotation_deg: f64,
) -> SurfaceGeometry {
    let (oe, on) = heading_to_east_north(offset_m, heading_deg);
    let half_width = width_m * 0.5;
    let half_height = height_m * 0.5;

    let displacements = local_corners(half_width, half_height, anchor).map(|(le, ln)| {
        let (e, n) = rotate_ground(le, ln, rotation_deg);
        [oe + e, on + n]
    });
    let corners = displacements.map(|[e, n]| apply_surface_displacement(base, e, n));
    let (ce, cn) = rotate_ground(
        -anchor.x * half_width,
        -anchor.y * half_height,
        rotation_deg,
    );

    SurfaceGeometry {
        anchor: apply_surface_displacement(base, oe, on),
        center: apply_surface_displacement(base, oe + ce, on + cn),
        displacements,
        corners,
    }
}
