//! Camera/projection boundary.
//!
//! The map camera is an external collaborator. The engine only needs the
//! `ProjectionHost` operations below; `MatrixProjection` implements them from a
//! 16-element transform snapshot so the exact same math can run on either side
//! of the compute-module boundary.

use serde::{Deserialize, Serialize};

use crate::geo::{
    lat_from_mercator_y, lng_from_mercator_x, mercator_from_location, mercator_x_from_lng,
    mercator_y_from_lat, pixels_per_meter, world_size_for_zoom, SpriteLocation,
    MAX_MERCATOR_LATITUDE,
};

/// Column-major 4x4 matrix (gl-matrix layout).
pub type Mat4 = [f64; 16];

pub const IDENTITY: Mat4 = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

/// Clip-space w below this is treated as behind the camera.
pub const MIN_CLIP_W: f64 = 1e-6;

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

#[inline]
pub fn multiply_mat4_vec4(m: &Mat4, v: [f64; 4]) -> [f64; 4] {
    [
        m[0] * v[0] + m[4] * v[1] + m[8] * v[2] + m[12] * v[3],
        m[1] * v[0] + m[5] * v[1] + m[9] * v[2] + m[13] * v[3],
        m[2] * v[0] + m[6] * v[1] + m[10] * v[2] + m[14] * v[3],
        m[3] * v[0] + m[7] * v[1] + m[11] * v[2] + m[15] * v[3],
    ]
}

/// `a * b` for column-major matrices.
pub fn multiply_mat4(a: &Mat4, b: &Mat4) -> Mat4 {
    let mut out = [0.0; 16];
    for col in 0..4 {
        for row in 0..4 {
            out[col * 4 + row] = (0..4).map(|k| a[k * 4 + row] * b[col * 4 + k]).sum();
        }
    }
    out
}

fn translation(x: f64, y: f64, z: f64) -> Mat4 {
    let mut m = IDENTITY;
    m[12] = x;
    m[13] = y;
    m[14] = z;
    m
}

fn scaling(x: f64, y: f64, z: f64) -> Mat4 {
    let mut m = IDENTITY;
    m[0] = x;
    m[5] = y;
    m[10] = z;
    m
}

fn rotation_x(rad: f64) -> Mat4 {
    let (sin, cos) = rad.sin_cos();
    let mut m = IDENTITY;
    m[5] = cos;
    m[6] = sin;
    m[9] = -sin;
    m[10] = cos;
    m
}

fn rotation_z(rad: f64) -> Mat4 {
    let (sin, cos) = rad.sin_cos();
    let mut m = IDENTITY;
    m[0] = cos;
    m[1] = sin;
    m[4] = -sin;
    m[5] = cos;
    m
}

/// OpenGL-style perspective projection (clip w = distance along the view axis).
fn perspective(fov_y: f64, aspect: f64, near: f64, far: f64) -> Mat4 {
    let f = 1.0 / (fov_y / 2.0).tan();
    let nf = 1.0 / (near - far);
    let mut m = [0.0; 16];
    m[0] = f / aspect;
    m[5] = f;
    m[10] = (far + near) * nf;
    m[11] = -1.0;
    m[14] = 2.0 * far * near * nf;
    m
}

/// Invert a 4x4 matrix; `None` when singular or non-finite.
pub fn invert_mat4(a: &Mat4) -> Option<Mat4> {
    let (a00, a01, a02, a03) = (a[0], a[1], a[2], a[3]);
    let (a10, a11, a12, a13) = (a[4], a[5], a[6], a[7]);
    let (a20, a21, a22, a23) = (a[8], a[9], a[10], a[11]);
    let (a30, a31, a32, a33) = (a[12], a[13], a[14], a[15]);

    let b00 = a00 * a11 - a01 * a10;
    let b01 = a00 * a12 - a02 * a10;
    let b02 = a00 * a13 - a03 * a10;
    let b03 = a01 * a12 - a02 * a11;
    let b04 = a01 * a13 - a03 * a11;
    let b05 = a02 * a13 - a03 * a12;
    let b06 = a20 * a31 - a21 * a30;
    let b07 = a20 * a32 - a22 * a30;
    let b08 = a20 * a33 - a23 * a30;
    let b09 = a21 * a32 - a22 * a31;
    let b10 = a21 * a33 - a23 * a31;
    let b11 = a22 * a33 - a23 * a32;

    let det = b00 * b11 - b01 * b10 + b02 * b09 + b03 * b08 - b04 * b07 + b05 * b06;
    if det == 0.0 || !det.is_finite() {
        return None;
    }
    let inv = 1.0 / det;

    Some([
        (a11 * b11 - a12 * b10 + a13 * b09) * inv,
        (a02 * b10 - a01 * b11 - a03 * b09) * inv,
        (a31 * b05 - a32 * b04 + a33 * b03) * inv,
        (a22 * b04 - a21 * b05 - a23 * b03) * inv,
        (a12 * b08 - a10 * b11 - a13 * b07) * inv,
        (a00 * b11 - a02 * b08 + a03 * b07) * inv,
        (a32 * b02 - a30 * b05 - a33 * b01) * inv,
        (a20 * b05 - a22 * b02 + a23 * b01) * inv,
        (a10 * b10 - a11 * b08 + a13 * b06) * inv,
        (a01 * b08 - a00 * b10 - a03 * b06) * inv,
        (a30 * b04 - a31 * b02 + a33 * b00) * inv,
        (a21 * b02 - a20 * b04 - a23 * b00) * inv,
        (a11 * b07 - a10 * b09 - a12 * b06) * inv,
        (a00 * b09 - a01 * b07 + a02 * b06) * inv,
        (a31 * b01 - a30 * b03 - a32 * b00) * inv,
        (a20 * b03 - a21 * b01 + a22 * b00) * inv,
    ])
}

/// Clip-space position of a location; `None` when non-finite or behind the camera.
pub fn clip_with_mercator_matrix(m: &Mat4, loc: &SpriteLocation) -> Option<[f64; 4]> {
    let mc = mercator_from_location(loc);
    let clip = multiply_mat4_vec4(m, [mc.x, mc.y, mc.z, 1.0]);
    if clip.iter().all(|c| c.is_finite()) && clip[3] > MIN_CLIP_W {
        Some(clip)
    } else {
        None
    }
}

/// Project through a pixel matrix (world pixels + altitude in meters).
pub fn project_with_pixel_matrix(
    m: &Mat4,
    world_size: f64,
    loc: &SpriteLocation,
) -> Option<ScreenPoint> {
    if !world_size.is_finite() || world_size <= 0.0 {
        return None;
    }
    let mc = mercator_from_location(loc);
    let altitude = if loc.altitude().is_finite() {
        loc.altitude()
    } else {
        0.0
    };
    let clip = multiply_mat4_vec4(m, [mc.x * world_size, mc.y * world_size, altitude, 1.0]);
    if !clip[0].is_finite() || !clip[1].is_finite() || !clip[3].is_finite() || clip[3] <= 0.0 {
        return None;
    }
    Some(ScreenPoint::new(clip[0] / clip[3], clip[1] / clip[3]))
}

/// Ground-plane location under a screen point, using the inverse pixel matrix
/// at z = 0 and z = 1 to build the view ray. `None` when the ray never
/// reaches the ground in front of the camera (above the horizon).
pub fn unproject_with_inverse(
    inv: &Mat4,
    world_size: f64,
    point: ScreenPoint,
) -> Option<SpriteLocation> {
    if !world_size.is_finite() || world_size <= 0.0 {
        return None;
    }
    let x = if point.x.is_finite() { point.x } else { 0.0 };
    let y = if point.y.is_finite() { point.y } else { 0.0 };
    let c0 = multiply_mat4_vec4(inv, [x, y, 0.0, 1.0]);
    let c1 = multiply_mat4_vec4(inv, [x, y, 1.0, 1.0]);
    if !c0[3].is_finite() || !c1[3].is_finite() || c0[3] == 0.0 || c1[3] == 0.0 {
        return None;
    }
    let w0 = [c0[0] / c0[3], c0[1] / c0[3], c0[2] / c0[3]];
    let w1 = [c1[0] / c1[3], c1[1] / c1[3], c1[2] / c1[3]];
    if w0.iter().chain(w1.iter()).any(|v| !v.is_finite()) {
        return None;
    }
    let denominator = w1[2] - w0[2];
    // Perspective cameras sit at a finite point; the ray must head toward the ground.
    let camera = multiply_mat4_vec4(inv, [0.0, 0.0, 1.0, 0.0]);
    if camera[3] != 0.0 {
        let camera_z = camera[2] / camera[3];
        if !camera_z.is_finite() || camera_z * denominator >= 0.0 {
            return None;
        }
    }
    let t = if denominator == 0.0 {
        0.0
    } else {
        -w0[2] / denominator
    };
    let world_x = w0[0] + (w1[0] - w0[0]) * t;
    let world_y = w0[1] + (w1[1] - w0[1]) * t;
    let lng = lng_from_mercator_x(world_x / world_size);
    let lat = lat_from_mercator_y(world_y / world_size)
        .clamp(-MAX_MERCATOR_LATITUDE, MAX_MERCATOR_LATITUDE);
    if lng.is_finite() && lat.is_finite() {
        Some(SpriteLocation::new(lng, lat))
    } else {
        None
    }
}

/// Camera-to-center distance over the clip w at `loc`.
pub fn perspective_ratio_with(
    m: &Mat4,
    camera_to_center_distance: f64,
    loc: &SpriteLocation,
) -> Option<f64> {
    let clip = clip_with_mercator_matrix(m, loc)?;
    let ratio = camera_to_center_distance / clip[3];
    (ratio.is_finite() && ratio > 0.0).then_some(ratio)
}

/// Clip position to screen pixels for a viewport.
#[inline]
pub fn clip_to_screen(clip: &[f64; 4], width: f64, height: f64) -> ScreenPoint {
    let ndc_x = clip[0] / clip[3];
    let ndc_y = clip[1] / clip[3];
    ScreenPoint::new((ndc_x + 1.0) * 0.5 * width, (1.0 - ndc_y) * 0.5 * height)
}

/// Camera state captured once per frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransformSnapshot {
    /// World pixels (mercator × world size, altitude in meters) → screen pixels.
    pub pixel_matrix: Mat4,
    pub pixel_matrix_inverse: Mat4,
    /// Mercator coordinate → clip space.
    pub mercator_matrix: Mat4,
    pub world_size: f64,
    pub zoom: f64,
    pub camera_to_center_distance: f64,
    pub width: f64,
    pub height: f64,
}

/// Operations the engine needs from the map camera. Every projection may fail
/// per call (behind the camera, degenerate matrix); failures are never fatal.
pub trait ProjectionHost {
    fn project(&self, loc: &SpriteLocation) -> Option<ScreenPoint>;
    /// Ground-plane (z = 0) location under a screen point.
    fn unproject(&self, point: ScreenPoint) -> Option<SpriteLocation>;
    fn zoom(&self) -> f64;
    /// Camera-to-center distance divided by the clip w at `loc` (1 at the view center).
    fn perspective_ratio(&self, loc: &SpriteLocation) -> Option<f64>;
    fn camera_distance_meters(&self, loc: &SpriteLocation) -> Option<f64>;
    fn snapshot(&self) -> TransformSnapshot;
}

/// Projection driven entirely by a `TransformSnapshot`.
#[derive(Clone, Debug, PartialEq)]
pub struct MatrixProjection {
    snapshot: TransformSnapshot,
}

impl MatrixProjection {
    pub fn new(snapshot: TransformSnapshot) -> Self {
        Self { snapshot }
    }

    /// North-up orthographic camera centered on `center`.
    ///
    /// The mercator matrix keeps clip w equal to the camera distance so the
    /// perspective ratio is 1 everywhere, and elevation moves clip z toward the
    /// camera.
    pub fn top_down(center: SpriteLocation, zoom: f64, width: f64, height: f64) -> Self {
        let world_size = world_size_for_zoom(zoom);
        let cx = mercator_x_from_lng(center.lng) * world_size;
        let cy = mercator_y_from_lat(center.lat) * world_size;
        let camera = 1.5 * height;

        let mut pixel_matrix = IDENTITY;
        pixel_matrix[12] = width / 2.0 - cx;
        pixel_matrix[13] = height / 2.0 - cy;

        let mut pixel_matrix_inverse = IDENTITY;
        pixel_matrix_inverse[12] = cx - width / 2.0;
        pixel_matrix_inverse[13] = cy - height / 2.0;

        let sx = camera * 2.0 / width;
        let sy = -camera * 2.0 / height;
        let mut mercator_matrix = [0.0; 16];
        mercator_matrix[0] = sx * world_size;
        mercator_matrix[5] = sy * world_size;
        mercator_matrix[10] = -world_size;
        mercator_matrix[12] = -sx * cx;
        mercator_matrix[13] = -sy * cy;
        mercator_matrix[15] = camera;

        Self::new(TransformSnapshot {
            pixel_matrix,
            pixel_matrix_inverse,
            mercator_matrix,
            world_size,
            zoom,
            camera_to_center_distance: camera,
            width,
            height,
        })
    }

    /// Perspective camera orbiting `center`: `pitch_deg` tilts away from
    /// straight down (toward the north at zero bearing), `bearing_deg` turns
    /// the map clockwise. The vertical field of view keeps the camera
    /// `1.5 * height` pixels from the center, so at zero pitch x/y match
    /// [`MatrixProjection::top_down`]. `None` for a pitch outside [0°, 85°).
    pub fn pitched(
        center: SpriteLocation,
        zoom: f64,
        pitch_deg: f64,
        bearing_deg: f64,
        width: f64,
        height: f64,
    ) -> Option<Self> {
        if !(0.0..85.0).contains(&pitch_deg) || !bearing_deg.is_finite() {
            return None;
        }
        if !(width > 0.0 && height > 0.0) {
            return None;
        }
        let world_size = world_size_for_zoom(zoom);
        let cx = mercator_x_from_lng(center.lng) * world_size;
        let cy = mercator_y_from_lat(center.lat) * world_size;
        let fov = 2.0 * (1.0f64 / 3.0).atan();
        let camera = 0.5 * height / (fov / 2.0).tan();
        let pitch = pitch_deg.to_radians();

        // farthest visible ground point along the top edge of the view
        let top = pitch + fov / 2.0;
        let far = if top < std::f64::consts::FRAC_PI_2 - 0.01 {
            (1.01 * camera * pitch.cos() / top.cos()).max(2.0 * camera)
        } else {
            100.0 * camera
        };
        let near = height / 50.0;

        let view = [
            translation(0.0, 0.0, -camera),
            rotation_x(-pitch),
            rotation_z(bearing_deg.to_radians()),
            scaling(1.0, -1.0, 1.0),
            translation(-cx, -cy, 0.0),
        ]
        .iter()
        .fold(IDENTITY, |acc, m| multiply_mat4(&acc, m));
        let view_projection = multiply_mat4(&perspective(fov, width / height, near, far), &view);

        let mut viewport = IDENTITY;
        viewport[0] = width / 2.0;
        viewport[5] = -height / 2.0;
        viewport[12] = width / 2.0;
        viewport[13] = height / 2.0;

        let altitude_scale = scaling(1.0, 1.0, pixels_per_meter(world_size, center.lat));
        let pixel_matrix = multiply_mat4(
            &multiply_mat4(&viewport, &view_projection),
            &altitude_scale,
        );
        let pixel_matrix_inverse = invert_mat4(&pixel_matrix)?;
        let mercator_matrix = multiply_mat4(
            &view_projection,
            &scaling(world_size, world_size, world_size),
        );

        Some(Self::new(TransformSnapshot {
            pixel_matrix,
            pixel_matrix_inverse,
            mercator_matrix,
            world_size,
            zoom,
            camera_to_center_distance: camera,
            width,
            height,
        }))
    }

    pub fn transform(&self) -> &TransformSnapshot {
        &self.snapshot
    }

    /// Clip-space position of a location through the mercator matrix.
    pub fn clip_from_location(&self, loc: &SpriteLocation) -> Option<[f64; 4]> {
        clip_with_mercator_matrix(&self.snapshot.mercator_matrix, loc)
    }

    /// Screen position through the pixel matrix.
    pub fn project_location(&self, loc: &SpriteLocation) -> Option<ScreenPoint> {
        project_with_pixel_matrix(&self.snapshot.pixel_matrix, self.snapshot.world_size, loc)
    }

    /// Intersect the view ray under `point` with the ground plane.
    pub fn unproject_point(&self, point: ScreenPoint) -> Option<SpriteLocation> {
        unproject_with_inverse(
            &self.snapshot.pixel_matrix_inverse,
            self.snapshot.world_size,
            point,
        )
    }

    pub fn perspective_ratio_at(&self, loc: &SpriteLocation) -> Option<f64> {
        perspective_ratio_with(
            &self.snapshot.mercator_matrix,
            self.snapshot.camera_to_center_distance,
            loc,
        )
    }

    pub fn camera_distance_meters_at(&self, loc: &SpriteLocation) -> Option<f64> {
        let ratio = self.perspective_ratio_at(loc)?;
        let ppm = pixels_per_meter(self.snapshot.world_size, loc.lat);
        if ppm <= 0.0 {
            return None;
        }
        let distance_px = self.snapshot.camera_to_center_distance / ratio;
        let meters = distance_px / ppm + loc.altitude().abs();
        meters.is_finite().then_some(meters)
    }
}

impl ProjectionHost for MatrixProjection {
    fn project(&self, loc: &SpriteLocation) -> Option<ScreenPoint> {
        self.project_location(loc)
    }

    fn unproject(&self, point: ScreenPoint) -> Option<SpriteLocation> {
        self.unproject_point(point)
    }

    fn zoom(&self) -> f64 {
        self.snapshot.zoom
    }

    fn perspective_ratio(&self, loc: &SpriteLocation) -> Option<f64> {
        self.perspective_ratio_at(loc)
    }

    fn camera_distance_meters(&self, loc: &SpriteLocation) -> Option<f64> {
        self.camera_distance_meters_at(loc)
    }

    fn snapshot(&self) -> TransformSnapshot {
        self.snapshot.clone()
    }
}
