//! Pure per-frame render preparation.
//!
//! `prepare_frame` turns a self-contained `FrameInput` snapshot into sorted
//! draw items. It touches no engine state, which is what lets the same
//! function run locally or inside the compute module behind the buffer
//! protocol.

pub mod depth;
pub mod geometry;
pub mod origin;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::geo::{
    apply_surface_displacement, circumference_at_latitude, mercator_from_location,
    pixels_per_meter, MercatorCoordinate, SpriteLocation,
};
use crate::ids::{ImageHandle, ImageKey, ResourceHandle, SpriteHandle};
use crate::projection::{
    clip_to_screen, clip_with_mercator_matrix, perspective_ratio_with, project_with_pixel_matrix,
    unproject_with_inverse, Mat4, ScreenPoint, TransformSnapshot,
};
use crate::sprite::{
    Anchor, BillboardShaderInputs, ImageOffset, ImageResource, PlacementMode, ShaderInputs,
    SurfaceShaderInputs,
};

use depth::{apply_clip_bias, bias_ndc, billboard_depth_key, surface_depth_key};
use geometry::{
    billboard_geometry, pixel_scale_adjustment, surface_geometry, triangulate,
    unit_quad_positions, uv_corners,
};
pub use geometry::{ScreenToClip, Vertex};

/// Scalars shared by every item of a frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameConstants {
    pub zoom: f64,
    pub world_size: f64,
    pub camera_to_center_distance: f64,
    pub viewport_width: f64,
    pub viewport_height: f64,
    pub meters_per_pixel: f64,
    pub zoom_scale_factor: f64,
    pub sprite_min_pixel: f64,
    pub sprite_max_pixel: f64,
    pub surface_bias: f64,
    pub order_stride: f64,
    pub min_clip_z_epsilon: f64,
    pub billboard_shader: bool,
    pub surface_shader: bool,
    pub apply_bias: bool,
}

impl FrameConstants {
    pub fn new(config: &Config, transform: &TransformSnapshot) -> Self {
        Self {
            zoom: transform.zoom,
            world_size: transform.world_size,
            camera_to_center_distance: transform.camera_to_center_distance,
            viewport_width: transform.width,
            viewport_height: transform.height,
            meters_per_pixel: config.scaling.meters_per_pixel,
            zoom_scale_factor: config.scaling.zoom_scale_factor(transform.zoom),
            sprite_min_pixel: config.scaling.sprite_min_pixel,
            sprite_max_pixel: config.scaling.sprite_max_pixel,
            surface_bias: config.depth.surface_bias,
            order_stride: config.depth.order_stride,
            min_clip_z_epsilon: config.depth.min_clip_z_epsilon,
            billboard_shader: config.shader.billboard,
            surface_shader: config.shader.surface,
            apply_bias: config.depth.surface_bias != 0.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameMatrices {
    pub pixel: Mat4,
    pub pixel_inverse: Mat4,
    pub mercator: Mat4,
}

impl From<&TransformSnapshot> for FrameMatrices {
    fn from(t: &TransformSnapshot) -> Self {
        Self {
            pixel: t.pixel_matrix,
            pixel_inverse: t.pixel_matrix_inverse,
            mercator: t.mercator_matrix,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpriteEntry {
    pub handle: SpriteHandle,
    /// Lexicographic rank of the sprite id.
    pub rank: u32,
    pub location: SpriteLocation,
    pub mercator: MercatorCoordinate,
}

impl SpriteEntry {
    pub fn new(handle: SpriteHandle, rank: u32, location: SpriteLocation) -> Self {
        Self {
            handle,
            rank,
            location,
            mercator: mercator_from_location(&location),
        }
    }
}

/// One image of the frame bucket, with indices into the frame tables.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemEntry {
    pub sprite_index: usize,
    /// `None` when the image's resource is unknown.
    pub resource_index: Option<usize>,
    pub image: ImageHandle,
    pub key: ImageKey,
    pub mode: PlacementMode,
    pub scale: f64,
    pub opacity: f64,
    pub anchor: Anchor,
    pub offset: ImageOffset,
    pub rotation_deg: f64,
    /// Bucket index of the origin item.
    pub origin_index: Option<usize>,
    pub origin_use_anchor: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameInput {
    pub constants: FrameConstants,
    pub matrices: FrameMatrices,
    pub resources: Vec<ImageResource>,
    pub sprites: Vec<SpriteEntry>,
    pub items: Vec<ItemEntry>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PreparedDrawItem {
    pub sprite: SpriteHandle,
    pub image: ImageHandle,
    pub resource: ResourceHandle,
    /// Index into `FrameInput::items`.
    pub item_index: usize,
    pub key: ImageKey,
    pub mode: PlacementMode,
    pub opacity: f64,
    pub depth: f64,
    pub scale_adjustment: f64,
    pub center: ScreenPoint,
    pub screen_to_clip: ScreenToClip,
    pub vertices: [Vertex; 6],
    /// Hit-test quad, [TL, TR, BR, BL].
    pub screen_corners: [ScreenPoint; 4],
    pub shader: Option<ShaderInputs>,
}

/// Draw items in draw order (ascending depth key).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PreparedFrame {
    pub items: Vec<PreparedDrawItem>,
}

/// Where an item ended up; dependents read this through their origin.
struct Placement {
    anchor: ScreenPoint,
    center: ScreenPoint,
    anchor_location: SpriteLocation,
    center_location: SpriteLocation,
    item: PreparedDrawItem,
}

pub fn prepare_frame(input: &FrameInput) -> PreparedFrame {
    let eligible: Vec<bool> = input.items.iter().map(|item| is_drawable(input, item)).collect();

    let placements = origin::resolve_in_passes(
        &eligible,
        |i| {
            let item = &input.items[i];
            let origin = item.origin_index?;
            let target = input.items.get(origin)?;
            (target.sprite_index == item.sprite_index).then_some(origin)
        },
        |i, origin| {
            let placed = place_item(input, i, origin);
            if placed.is_none() {
                log::trace!("item {i} dropped: projection failed");
            }
            placed
        },
    );

    let mut ranked: Vec<(u32, PreparedDrawItem)> = placements
        .into_iter()
        .flatten()
        .map(|placement| {
            let sprite_index = input.items[placement.item.item_index].sprite_index;
            (input.sprites[sprite_index].rank, placement.item)
        })
        .collect();

    ranked.sort_by(|(rank_a, a), (rank_b, b)| {
        a.depth
            .total_cmp(&b.depth)
            .then(a.key.cmp(&b.key))
            .then(rank_a.cmp(rank_b))
            .then(a.image.cmp(&b.image))
    });

    PreparedFrame {
        items: ranked.into_iter().map(|(_, item)| item).collect(),
    }
}

fn is_drawable(input: &FrameInput, item: &ItemEntry) -> bool {
    if !(item.opacity.is_finite() && item.opacity > 0.0) {
        return false;
    }
    if item.sprite_index >= input.sprites.len() {
        return false;
    }
    match item.resource_index.and_then(|r| input.resources.get(r)) {
        Some(resource) => resource.ready && resource.width > 0.0 && resource.height > 0.0,
        None => false,
    }
}

fn place_item(input: &FrameInput, index: usize, origin: Option<&Placement>) -> Option<Placement> {
    let c = &input.constants;
    let m = &input.matrices;
    let item = &input.items[index];
    let sprite = &input.sprites[item.sprite_index];
    let resource = input.resources.get(item.resource_index?)?;

    let ratio = perspective_ratio_with(&m.mercator, c.camera_to_center_distance, &sprite.location)?;
    let ppm = pixels_per_meter(c.world_size, sprite.location.lat) * ratio;
    if !(ppm.is_finite() && ppm > 0.0) {
        return None;
    }
    let meters_per_image_pixel = c.meters_per_pixel * item.scale * c.zoom_scale_factor;
    let width_m = resource.width * meters_per_image_pixel;
    let height_m = resource.height * meters_per_image_pixel;
    let scale_adjustment =
        pixel_scale_adjustment(width_m * ppm, height_m * ppm, c.sprite_min_pixel, c.sprite_max_pixel);
    let uvs = uv_corners(&resource.region);
    let screen_to_clip = ScreenToClip::for_viewport(c.viewport_width, c.viewport_height);

    let draw = |depth: f64,
                center: ScreenPoint,
                positions: [[f64; 4]; 4],
                screen_corners: [ScreenPoint; 4],
                shader: Option<ShaderInputs>| PreparedDrawItem {
        sprite: sprite.handle,
        image: item.image,
        resource: resource.handle,
        item_index: index,
        key: item.key,
        mode: item.mode,
        opacity: item.opacity,
        depth,
        scale_adjustment,
        center,
        screen_to_clip,
        vertices: triangulate(&positions, &uvs),
        screen_corners,
        shader,
    };

    match item.mode {
        PlacementMode::Billboard => {
            let base = match origin {
                Some(o) if item.origin_use_anchor => o.anchor,
                Some(o) => o.center,
                None => project_with_pixel_matrix(&m.pixel, c.world_size, &sprite.location)?,
            };
            let width_px = width_m * ppm * scale_adjustment;
            let height_px = height_m * ppm * scale_adjustment;
            let g = billboard_geometry(
                base,
                width_px,
                height_px,
                item.anchor,
                item.offset.meters * ppm,
                item.offset.heading_deg,
                item.rotation_deg,
            );
            if !g.is_finite() {
                return None;
            }
            let depth = billboard_depth_key(g.anchor, c.world_size, &m.pixel_inverse, &m.mercator)?;

            let (positions, shader) = if c.billboard_shader {
                let (sin, cos) = item.rotation_deg.to_radians().sin_cos();
                let inputs = BillboardShaderInputs {
                    pivot: g.anchor,
                    half_width: g.half_width,
                    half_height: g.half_height,
                    anchor: item.anchor,
                    sin,
                    cos,
                };
                (unit_quad_positions(), Some(ShaderInputs::Billboard(inputs)))
            } else {
                (g.corners.map(|p| screen_to_clip.apply(p)), None)
            };

            let ground = |p: ScreenPoint| {
                unproject_with_inverse(&m.pixel_inverse, c.world_size, p)
                    .map(|loc| SpriteLocation {
                        z: sprite.location.z,
                        ..loc
                    })
                    .unwrap_or(sprite.location)
            };

            Some(Placement {
                anchor: g.anchor,
                center: g.center,
                anchor_location: ground(g.anchor),
                center_location: ground(g.center),
                item: draw(depth, g.center, positions, g.corners, shader),
            })
        }
        PlacementMode::Surface => {
            let base = match origin {
                Some(o) if item.origin_use_anchor => o.anchor_location,
                Some(o) => o.center_location,
                None => sprite.location,
            };
            let g = surface_geometry(
                &base,
                width_m * scale_adjustment,
                height_m * scale_adjustment,
                item.anchor,
                item.offset.meters,
                item.offset.heading_deg,
                item.rotation_deg,
            );

            let bias = if c.apply_bias {
                bias_ndc(item.key, c.order_stride, c.surface_bias)
            } else {
                0.0
            };
            let mut clips = [[0.0; 4]; 4];
            for (clip, corner) in clips.iter_mut().zip(g.corners.iter()) {
                let raw = clip_with_mercator_matrix(&m.mercator, corner)?;
                *clip = if c.apply_bias {
                    apply_clip_bias(raw, bias, c.min_clip_z_epsilon)
                } else {
                    raw
                };
            }
            let depth = surface_depth_key(&clips)?;
            let screen_corners =
                clips.map(|clip| clip_to_screen(&clip, c.viewport_width, c.viewport_height));
            let anchor = project_with_pixel_matrix(&m.pixel, c.world_size, &g.anchor)?;
            let center = project_with_pixel_matrix(&m.pixel, c.world_size, &g.center)?;

            let (positions, shader) = if c.surface_shader {
                let inputs = surface_shader_inputs(input, &base, &g, bias)?;
                (unit_quad_positions(), Some(ShaderInputs::Surface(inputs)))
            } else {
                (clips, None)
            };

            Some(Placement {
                anchor,
                center,
                anchor_location: g.anchor,
                center_location: g.center,
                item: draw(depth, center, positions, screen_corners, shader),
            })
        }
    }
}

fn surface_shader_inputs(
    input: &FrameInput,
    base: &SpriteLocation,
    g: &geometry::SurfaceGeometry,
    bias: f64,
) -> Option<SurfaceShaderInputs> {
    let m = &input.matrices.mercator;
    let center = clip_with_mercator_matrix(m, &g.center)?;
    let east = clip_with_mercator_matrix(m, &apply_surface_displacement(&g.center, 1.0, 0.0))?;
    let north = clip_with_mercator_matrix(m, &apply_surface_displacement(&g.center, 0.0, 1.0))?;
    let delta = |p: [f64; 4]| [p[0] - center[0], p[1] - center[1], p[2] - center[2], p[3] - center[3]];
    let mc = mercator_from_location(base);
    let circumference = circumference_at_latitude(base.lat);
    Some(SurfaceShaderInputs {
        base_mercator: [mc.x, mc.y, mc.z],
        meters_to_mercator: if circumference > 0.0 {
            1.0 / circumference
        } else {
            0.0
        },
        corner_displacements: g.displacements,
        clip_center: center,
        clip_east: delta(east),
        clip_north: delta(north),
        bias_ndc: bias,
    })
}
