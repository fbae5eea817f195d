//! Depth keys. Items are drawn in ascending key order; a key is the negated
//! NDC z, so nearer geometry sorts later.

use crate::geo::mercator_from_location;
use crate::ids::ImageKey;
use crate::projection::{multiply_mat4_vec4, unproject_with_inverse, Mat4, ScreenPoint};

/// NDC offset separating surfaces that share a depth: later (sub layer, order)
/// pairs move toward the camera.
#[inline]
pub fn bias_ndc(key: ImageKey, order_stride: f64, surface_bias: f64) -> f64 {
    -(key.sub_layer as f64 * order_stride + key.order as f64) * surface_bias
}

/// Shift clip z by `bias_ndc` (scaled by w), never past the near plane.
#[inline]
pub fn apply_clip_bias(clip: [f64; 4], bias_ndc: f64, min_clip_z_epsilon: f64) -> [f64; 4] {
    let [x, y, z, w] = clip;
    let biased = z + bias_ndc * w;
    let min_z = -w + min_clip_z_epsilon;
    [x, y, biased.max(min_z), w]
}

#[inline]
pub fn depth_from_clip(clip: &[f64; 4]) -> Option<f64> {
    let [_, _, z, w] = *clip;
    let ndc_z = if w != 0.0 { z / w } else { z };
    ndc_z.is_finite().then_some(-ndc_z)
}

/// Billboard key: the ground point under the screen anchor, through the
/// mercator matrix.
pub fn billboard_depth_key(
    anchor: ScreenPoint,
    world_size: f64,
    pixel_inverse: &Mat4,
    mercator: &Mat4,
) -> Option<f64> {
    let ground = unproject_with_inverse(pixel_inverse, world_size, anchor)?;
    let m = mercator_from_location(&ground);
    let clip = multiply_mat4_vec4(mercator, [m.x, m.y, m.z, 1.0]);
    if !clip.iter().all(|c| c.is_finite()) {
        return None;
    }
    depth_from_clip(&clip)
}

/// Surface key: the nearest of the (already biased) corner clips.
pub fn surface_depth_key(corner_clips: &[[f64; 4]]) -> Option<f64> {
    corner_clips
        .iter()
        .map(depth_from_clip)
        .try_fold(f64::NEG_INFINITY, |acc, depth| depth.map(|d| acc.max(d)))
        .filter(|d| d.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_order_is_nearer() {
        let a = bias_ndc(ImageKey::new(0, 0), 1024.0, 1e-5);
        let b = bias_ndc(ImageKey::new(0, 1), 1024.0, 1e-5);
        let c = bias_ndc(ImageKey::new(1, 0), 1024.0, 1e-5);
        assert!(b < a && c < b);
    }

    #[test]
    fn bias_moves_depth_by_full_amount() {
        let clip = [0.0, 0.0, 0.2, 2.0];
        let base = depth_from_clip(&clip).expect("depth");
        let biased = depth_from_clip(&apply_clip_bias(clip, -0.01, 1e-7)).expect("depth");
        assert!((biased - base - 0.01).abs() < 1e-12);
    }

    #[test]
    fn bias_never_crosses_near_plane() {
        let clip = [0.0, 0.0, -1.9, 2.0];
        let biased = apply_clip_bias(clip, -1.0, 1e-7);
        assert!((biased[2] - (-2.0 + 1e-7)).abs() < 1e-12);
    }

    #[test]
    fn surface_takes_nearest_corner() {
        let clips = [
            [0.0, 0.0, 0.5, 1.0],
            [0.0, 0.0, 0.1, 1.0],
            [0.0, 0.0, 0.3, 1.0],
            [0.0, 0.0, 0.4, 1.0],
        ];
        let d = surface_depth_key(&clips).expect("depth");
        assert!((d + 0.1).abs() < 1e-12);
        assert!(surface_depth_key(&[]).is_none());
    }
}
