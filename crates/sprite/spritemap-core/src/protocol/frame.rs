//! Frame input and prepared-frame codecs.

use super::cursor::{BufferReader, BufferWriter, Result};
use super::*;
use crate::error::ProtocolError;
use crate::geo::{MercatorCoordinate, SpriteLocation};
use crate::ids::{ImageHandle, ImageKey, ResourceHandle, SpriteHandle};
use crate::prepare::{
    FrameConstants, FrameInput, FrameMatrices, ItemEntry, PreparedDrawItem, PreparedFrame,
    ScreenToClip, SpriteEntry, Vertex,
};
use crate::projection::{Mat4, ScreenPoint};
use crate::sprite::{
    Anchor, AtlasRegion, BillboardShaderInputs, ImageOffset, ImageResource, PlacementMode,
    ShaderInputs, SurfaceShaderInputs,
};

struct InputLayout {
    matrix: usize,
    resources: usize,
    sprites: usize,
    items: usize,
    total: usize,
}

impl InputLayout {
    fn new(resources: usize, sprites: usize, items: usize) -> Self {
        let matrix = INPUT_HEADER_LENGTH + FRAME_CONSTANT_LENGTH;
        let resource_offset = matrix + MATRIX_LENGTH;
        let sprite_offset = resource_offset + resources * RESOURCE_STRIDE;
        let item_offset = sprite_offset + sprites * SPRITE_STRIDE;
        Self {
            matrix,
            resources: resource_offset,
            sprites: sprite_offset,
            items: item_offset,
            total: frame_input_len(resources, sprites, items),
        }
    }
}

fn mode_code(mode: PlacementMode) -> f64 {
    match mode {
        PlacementMode::Billboard => 0.0,
        PlacementMode::Surface => 1.0,
    }
}

fn read_mode(r: &mut BufferReader<'_>) -> Result<PlacementMode> {
    let value = r.read()?;
    match super::cursor::slot_to_count(value) {
        Some(0) => Ok(PlacementMode::Billboard),
        Some(1) => Ok(PlacementMode::Surface),
        _ => Err(ProtocolError::InvalidCount {
            field: "mode",
            value,
        }),
    }
}

fn read_mat4(r: &mut BufferReader<'_>) -> Result<Mat4> {
    r.read_array::<16>()
}

/// Encode a frame snapshot; returns the number of slots written.
pub fn encode_frame_input(input: &FrameInput, buf: &mut [f64]) -> Result<usize> {
    let layout = InputLayout::new(input.resources.len(), input.sprites.len(), input.items.len());
    let c = &input.constants;
    let mut flags = 0;
    if c.billboard_shader {
        flags |= FLAG_BILLBOARD_SHADER;
    }
    if c.surface_shader {
        flags |= FLAG_SURFACE_SHADER;
    }
    if c.apply_bias {
        flags |= FLAG_APPLY_BIAS;
    }

    let mut w = BufferWriter::new(buf);
    w.push_u32(PROTOCOL_VERSION)?;
    w.push_count(layout.total)?;
    w.push_count(FRAME_CONSTANT_LENGTH)?;
    w.push_count(layout.matrix)?;
    w.push_count(input.resources.len())?;
    w.push_count(layout.resources)?;
    w.push_count(input.sprites.len())?;
    w.push_count(layout.sprites)?;
    w.push_count(input.items.len())?;
    w.push_count(layout.items)?;
    w.push_u32(flags)?;
    w.pad_to(INPUT_HEADER_LENGTH)?;

    w.push_slice(&[
        c.zoom,
        c.world_size,
        c.camera_to_center_distance,
        c.viewport_width,
        c.viewport_height,
        c.meters_per_pixel,
        c.zoom_scale_factor,
        c.sprite_min_pixel,
        c.sprite_max_pixel,
        c.surface_bias,
        c.order_stride,
        c.min_clip_z_epsilon,
    ])?;
    w.pad_to(layout.matrix)?;

    w.push_slice(&input.matrices.pixel)?;
    w.push_slice(&input.matrices.pixel_inverse)?;
    w.push_slice(&input.matrices.mercator)?;

    for res in &input.resources {
        w.push_u32(res.handle.0)?;
        w.push(res.width)?;
        w.push(res.height)?;
        w.push_bool(res.ready)?;
        w.push_u32(res.region.page)?;
        w.push_slice(&[res.region.u0, res.region.v0, res.region.u1, res.region.v1])?;
    }

    for sprite in &input.sprites {
        w.push_u32(sprite.handle.0)?;
        w.push_u32(sprite.rank)?;
        w.push(sprite.location.lng)?;
        w.push(sprite.location.lat)?;
        w.push(sprite.location.z.unwrap_or(0.0))?;
        w.push_bool(sprite.location.z.is_some())?;
        w.push_slice(&[sprite.mercator.x, sprite.mercator.y, sprite.mercator.z])?;
    }

    for item in &input.items {
        w.push_count(item.sprite_index)?;
        w.push_index(item.resource_index)?;
        w.push_u32(item.image.0)?;
        w.push(item.key.sub_layer as f64)?;
        w.push(item.key.order as f64)?;
        w.push(mode_code(item.mode))?;
        w.push(item.scale)?;
        w.push(item.opacity)?;
        w.push(item.anchor.x)?;
        w.push(item.anchor.y)?;
        w.push(item.offset.meters)?;
        w.push(item.offset.heading_deg)?;
        w.push(item.rotation_deg)?;
        w.push_index(item.origin_index)?;
        w.push_bool(item.origin_use_anchor)?;
    }

    w.finish(layout.total)
}

pub fn decode_frame_input(buf: &[f64]) -> Result<FrameInput> {
    let mut r = BufferReader::new(buf);
    expect_version(&mut r)?;
    let total = r.read_count("total_length")?;
    if total > buf.len() {
        return Err(ProtocolError::Truncated {
            needed: total,
            available: buf.len(),
        });
    }
    expect_layout(&mut r, "frame_constant_count", FRAME_CONSTANT_LENGTH)?;
    let matrix_offset = r.read_count("matrix_offset")?;
    let resource_count = r.read_count("resource_count")?;
    let resource_offset = r.read_count("resource_offset")?;
    let sprite_count = r.read_count("sprite_count")?;
    let sprite_offset = r.read_count("sprite_offset")?;
    let item_count = r.read_count("item_count")?;
    let item_offset = r.read_count("item_offset")?;
    let flags = r.read_u32("flags")?;

    let layout = InputLayout::new(resource_count, sprite_count, item_count);
    for (field, expected, found) in [
        ("matrix_offset", layout.matrix, matrix_offset),
        ("resource_offset", layout.resources, resource_offset),
        ("sprite_offset", layout.sprites, sprite_offset),
        ("item_offset", layout.items, item_offset),
    ] {
        if expected != found {
            return Err(ProtocolError::LayoutMismatch {
                field,
                expected,
                found,
            });
        }
    }
    if layout.total != total {
        return Err(ProtocolError::LengthMismatch {
            declared: total,
            actual: layout.total,
        });
    }
    r.skip_to(INPUT_HEADER_LENGTH)?;

    let [
        zoom,
        world_size,
        camera_to_center_distance,
        viewport_width,
        viewport_height,
        meters_per_pixel,
        zoom_scale_factor,
        sprite_min_pixel,
        sprite_max_pixel,
        surface_bias,
        order_stride,
        min_clip_z_epsilon,
    ] = r.read_array::<12>()?;
    let constants = FrameConstants {
        zoom,
        world_size,
        camera_to_center_distance,
        viewport_width,
        viewport_height,
        meters_per_pixel,
        zoom_scale_factor,
        sprite_min_pixel,
        sprite_max_pixel,
        surface_bias,
        order_stride,
        min_clip_z_epsilon,
        billboard_shader: flags & FLAG_BILLBOARD_SHADER != 0,
        surface_shader: flags & FLAG_SURFACE_SHADER != 0,
        apply_bias: flags & FLAG_APPLY_BIAS != 0,
    };
    r.skip_to(layout.matrix)?;

    let matrices = FrameMatrices {
        pixel: read_mat4(&mut r)?,
        pixel_inverse: read_mat4(&mut r)?,
        mercator: read_mat4(&mut r)?,
    };

    let mut resources = Vec::with_capacity(resource_count);
    for _ in 0..resource_count {
        let handle = ResourceHandle(r.read_u32("resource_handle")?);
        let [width, height] = r.read_array::<2>()?;
        let ready = r.read_bool()?;
        let page = r.read_u32("atlas_page")?;
        let [u0, v0, u1, v1] = r.read_array::<4>()?;
        resources.push(ImageResource {
            handle,
            width,
            height,
            ready,
            region: AtlasRegion { page, u0, v0, u1, v1 },
        });
    }

    let mut sprites = Vec::with_capacity(sprite_count);
    for _ in 0..sprite_count {
        let handle = SpriteHandle(r.read_u32("sprite_handle")?);
        let rank = r.read_u32("sprite_rank")?;
        let [lng, lat, z] = r.read_array::<3>()?;
        let has_z = r.read_bool()?;
        let [mx, my, mz] = r.read_array::<3>()?;
        sprites.push(SpriteEntry {
            handle,
            rank,
            location: SpriteLocation {
                lng,
                lat,
                z: has_z.then_some(z),
            },
            mercator: MercatorCoordinate {
                x: mx,
                y: my,
                z: mz,
            },
        });
    }

    let mut items = Vec::with_capacity(item_count);
    for _ in 0..item_count {
        let sprite_index = r.read_index("sprite_index", sprite_count)?;
        let resource_index = r.read_optional_index("resource_index", resource_count)?;
        let image = ImageHandle(r.read_u32("image_handle")?);
        let sub_layer = r.read_i32("sub_layer")?;
        let order = r.read_i32("order")?;
        let mode = read_mode(&mut r)?;
        let [scale, opacity, anchor_x, anchor_y, offset_meters, offset_heading, rotation_deg] =
            r.read_array::<7>()?;
        let origin_index = r.read_optional_index("origin_index", item_count)?;
        let origin_use_anchor = r.read_bool()?;
        items.push(ItemEntry {
            sprite_index,
            resource_index,
            image,
            key: ImageKey::new(sub_layer, order),
            mode,
            scale,
            opacity,
            anchor: Anchor::new(anchor_x, anchor_y),
            offset: ImageOffset {
                meters: offset_meters,
                heading_deg: offset_heading,
            },
            rotation_deg,
            origin_index,
            origin_use_anchor,
        });
    }

    if r.position() != total {
        return Err(ProtocolError::LengthMismatch {
            declared: total,
            actual: r.position(),
        });
    }

    Ok(FrameInput {
        constants,
        matrices,
        resources,
        sprites,
        items,
    })
}

fn write_shader(w: &mut BufferWriter<'_>, shader: &Option<ShaderInputs>) -> Result<()> {
    let end = w.position() + RESULT_SHADER_LENGTH;
    match shader {
        None => {}
        Some(ShaderInputs::Billboard(b)) => {
            w.push_slice(&[
                b.pivot.x,
                b.pivot.y,
                b.half_width,
                b.half_height,
                b.anchor.x,
                b.anchor.y,
                b.sin,
                b.cos,
            ])?;
        }
        Some(ShaderInputs::Surface(s)) => {
            w.push_slice(&s.base_mercator)?;
            w.push(s.meters_to_mercator)?;
            for d in &s.corner_displacements {
                w.push_slice(d)?;
            }
            w.push_slice(&s.clip_center)?;
            w.push_slice(&s.clip_east)?;
            w.push_slice(&s.clip_north)?;
            w.push(s.bias_ndc)?;
        }
    }
    w.pad_to(end)
}

fn read_shader(r: &mut BufferReader<'_>, kind: f64) -> Result<Option<ShaderInputs>> {
    let end = r.position() + RESULT_SHADER_LENGTH;
    let shader = if kind == SHADER_NONE {
        None
    } else if kind == SHADER_BILLBOARD {
        let [px, py, half_width, half_height, ax, ay, sin, cos] = r.read_array::<8>()?;
        Some(ShaderInputs::Billboard(BillboardShaderInputs {
            pivot: ScreenPoint::new(px, py),
            half_width,
            half_height,
            anchor: Anchor::new(ax, ay),
            sin,
            cos,
        }))
    } else if kind == SHADER_SURFACE {
        let base_mercator = r.read_array::<3>()?;
        let meters_to_mercator = r.read()?;
        let mut corner_displacements = [[0.0; 2]; 4];
        for d in corner_displacements.iter_mut() {
            *d = r.read_array::<2>()?;
        }
        Some(ShaderInputs::Surface(SurfaceShaderInputs {
            base_mercator,
            meters_to_mercator,
            corner_displacements,
            clip_center: r.read_array::<4>()?,
            clip_east: r.read_array::<4>()?,
            clip_north: r.read_array::<4>()?,
            bias_ndc: r.read()?,
        }))
    } else {
        return Err(ProtocolError::InvalidCount {
            field: "shader_kind",
            value: kind,
        });
    };
    r.skip_to(end)?;
    Ok(shader)
}

fn shader_kind(shader: &Option<ShaderInputs>) -> f64 {
    match shader {
        None => SHADER_NONE,
        Some(ShaderInputs::Billboard(_)) => SHADER_BILLBOARD,
        Some(ShaderInputs::Surface(_)) => SHADER_SURFACE,
    }
}

/// Encode prepared draw items in draw order; returns slots written.
pub fn encode_prepared_frame(frame: &PreparedFrame, buf: &mut [f64]) -> Result<usize> {
    let total = RESULT_HEADER_LENGTH + frame.items.len() * RESULT_ITEM_STRIDE;
    let mut w = BufferWriter::new(buf);
    w.push_u32(PROTOCOL_VERSION)?;
    w.push_count(frame.items.len())?;
    w.push_count(RESULT_ITEM_STRIDE)?;
    w.push_count(RESULT_VERTEX_LENGTH)?;
    w.push_count(RESULT_HIT_TEST_LENGTH)?;
    w.push_count(RESULT_SHADER_LENGTH)?;
    w.pad_to(RESULT_HEADER_LENGTH)?;

    for item in &frame.items {
        w.push_u32(item.sprite.0)?;
        w.push_u32(item.image.0)?;
        w.push_u32(item.resource.0)?;
        w.push_count(item.item_index)?;
        w.push(item.opacity)?;
        w.push(item.depth)?;
        w.push(item.scale_adjustment)?;
        w.push(item.center.x)?;
        w.push(item.center.y)?;
        let s2c = &item.screen_to_clip;
        w.push_slice(&[s2c.scale_x, s2c.scale_y, s2c.offset_x, s2c.offset_y])?;
        w.push(shader_kind(&item.shader))?;
        for v in &item.vertices {
            w.push_slice(&v.position)?;
            w.push_slice(&v.uv)?;
        }
        for corner in &item.screen_corners {
            w.push(corner.x)?;
            w.push(corner.y)?;
        }
        write_shader(&mut w, &item.shader)?;
    }
    w.finish(total)
}

/// Decode a prepared frame. Key and placement mode come back from `input`
/// through each item's index.
/// A result item must describe the input item it points at; a module that
/// echoes other handles is treated as broken.
fn check_item_handles(
    input: &FrameInput,
    source: &ItemEntry,
    sprite: SpriteHandle,
    image: ImageHandle,
    resource: ResourceHandle,
) -> Result<()> {
    let expected_sprite = input
        .sprites
        .get(source.sprite_index)
        .ok_or(ProtocolError::InvalidIndex {
            field: "sprite_index",
            value: source.sprite_index as f64,
            len: input.sprites.len(),
        })?
        .handle;
    let expected_resource = source
        .resource_index
        .and_then(|index| input.resources.get(index))
        .map(|res| res.handle);
    let checks = [
        ("sprite_handle", Some(expected_sprite.0), sprite.0),
        ("image_handle", Some(source.image.0), image.0),
        ("resource_handle", expected_resource.map(|h| h.0), resource.0),
    ];
    for (field, expected, found) in checks {
        match expected {
            Some(expected) if expected != found => {
                return Err(ProtocolError::HandleMismatch {
                    field,
                    expected,
                    found,
                })
            }
            _ => {}
        }
    }
    Ok(())
}

pub fn decode_prepared_frame(buf: &[f64], input: &FrameInput) -> Result<PreparedFrame> {
    let mut r = BufferReader::new(buf);
    expect_version(&mut r)?;
    let count = r.read_count("result_count")?;
    if count > input.items.len() {
        return Err(ProtocolError::InvalidCount {
            field: "result_count",
            value: count as f64,
        });
    }
    expect_layout(&mut r, "result_item_stride", RESULT_ITEM_STRIDE)?;
    expect_layout(&mut r, "vertex_length", RESULT_VERTEX_LENGTH)?;
    expect_layout(&mut r, "hit_test_length", RESULT_HIT_TEST_LENGTH)?;
    expect_layout(&mut r, "shader_length", RESULT_SHADER_LENGTH)?;
    r.skip_to(RESULT_HEADER_LENGTH)?;
    let total = RESULT_HEADER_LENGTH + count * RESULT_ITEM_STRIDE;
    if total > buf.len() {
        return Err(ProtocolError::Truncated {
            needed: total,
            available: buf.len(),
        });
    }

    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        let sprite = SpriteHandle(r.read_u32("sprite_handle")?);
        let image = ImageHandle(r.read_u32("image_handle")?);
        let resource = ResourceHandle(r.read_u32("resource_handle")?);
        let item_index = r.read_index("item_index", input.items.len())?;
        let [opacity, depth, scale_adjustment, cx, cy, sx, sy, ox, oy, kind] =
            r.read_array::<10>()?;

        let mut vertices = [Vertex::default(); 6];
        for v in vertices.iter_mut() {
            v.position = r.read_array::<4>()?;
            v.uv = r.read_array::<2>()?;
        }
        let mut screen_corners = [ScreenPoint::default(); 4];
        for corner in screen_corners.iter_mut() {
            let [x, y] = r.read_array::<2>()?;
            *corner = ScreenPoint::new(x, y);
        }
        let shader = read_shader(&mut r, kind)?;

        let source = &input.items[item_index];
        check_item_handles(input, source, sprite, image, resource)?;
        items.push(PreparedDrawItem {
            sprite,
            image,
            resource,
            item_index,
            key: source.key,
            mode: source.mode,
            opacity,
            depth,
            scale_adjustment,
            center: ScreenPoint::new(cx, cy),
            screen_to_clip: ScreenToClip {
                scale_x: sx,
                scale_y: sy,
                offset_x: ox,
                offset_y: oy,
            },
            vertices,
            screen_corners,
            shader,
        });
    }
    Ok(PreparedFrame { items })
}
