//! Sprite/image state and the minimal store that owns it.
//!
//! The store is handle-addressed: sprites by `SpriteHandle` (with a string id
//! index for callers), images by `(SpriteHandle, ImageKey)`. Per-frame caches
//! live on the image and are rewritten by render preparation.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::SpriteError;
use crate::geo::SpriteLocation;
use crate::ids::{Handle, HandleAllocator, ImageHandle, ImageKey, ResourceHandle, SpriteHandle};
use crate::interp::{Channel, Degrees, InterpolationOptions};
use crate::projection::ScreenPoint;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlacementMode {
    /// Screen-aligned, sized in pixels.
    #[default]
    Billboard,
    /// Lies on the ground plane, sized in meters.
    Surface,
}

/// Anchor inside the image rectangle: (-1,-1) bottom-left, (1,1) top-right.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub x: f64,
    pub y: f64,
}

impl Anchor {
    pub const CENTER: Anchor = Anchor { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Displacement of an image from its anchor point.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageOffset {
    pub meters: f64,
    /// Degrees clockwise from north.
    pub heading_deg: f64,
}

/// Place an image relative to another image of the same sprite.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginReference {
    pub key: ImageKey,
    /// Follow the origin's anchor point (true) or its rendered center (false).
    #[serde(default)]
    pub use_resolved_anchor: bool,
}

/// Billboard inputs for the reduced shader path.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillboardShaderInputs {
    /// Screen point the quad rotates around (the resolved anchor).
    pub pivot: ScreenPoint,
    pub half_width: f64,
    pub half_height: f64,
    pub anchor: Anchor,
    pub sin: f64,
    pub cos: f64,
}

/// Surface inputs for the reduced shader path. The clip basis vectors are
/// the clip-space deltas of one meter east/north at the surface center.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceShaderInputs {
    pub base_mercator: [f64; 3],
    pub meters_to_mercator: f64,
    /// East/north meters of each corner relative to the base point, [TL, TR, BR, BL].
    pub corner_displacements: [[f64; 2]; 4],
    pub clip_center: [f64; 4],
    pub clip_east: [f64; 4],
    pub clip_north: [f64; 4],
    pub bias_ndc: f64,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ShaderInputs {
    Billboard(BillboardShaderInputs),
    Surface(SurfaceShaderInputs),
}

/// Per-frame output cached on the image after preparation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ImageCache {
    pub screen_corners: Option<[ScreenPoint; 4]>,
    pub shader: Option<ShaderInputs>,
}

impl ImageCache {
    pub fn clear(&mut self) {
        self.screen_corners = None;
        self.shader = None;
    }
}

/// Everything needed to attach an image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ImageDefinition {
    pub resource: ResourceHandle,
    pub mode: PlacementMode,
    pub anchor: Anchor,
    pub scale: f64,
    pub rotation_deg: f64,
    pub offset: ImageOffset,
    pub opacity: f64,
    pub origin: Option<OriginReference>,
    pub rotation_interpolation: Option<InterpolationOptions>,
    pub offset_interpolation: Option<InterpolationOptions>,
    pub opacity_interpolation: Option<InterpolationOptions>,
}

impl Default for ImageDefinition {
    fn default() -> Self {
        Self {
            resource: ResourceHandle(0),
            mode: PlacementMode::Billboard,
            anchor: Anchor::CENTER,
            scale: 1.0,
            rotation_deg: 0.0,
            offset: ImageOffset::default(),
            opacity: 1.0,
            origin: None,
            rotation_interpolation: None,
            offset_interpolation: None,
            opacity_interpolation: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ImageState {
    pub handle: ImageHandle,
    pub key: ImageKey,
    pub resource: ResourceHandle,
    pub mode: PlacementMode,
    pub anchor: Anchor,
    pub scale: f64,
    pub rotation: Channel<Degrees>,
    pub offset_meters: Channel<f64>,
    pub offset_heading: Channel<Degrees>,
    pub opacity: Channel<f64>,
    /// User opacity before visibility-distance fading.
    pub base_opacity: f64,
    /// Set while the sprite is beyond its visibility distance.
    pub lod_hidden: bool,
    pub origin: Option<OriginReference>,
    pub rotation_interpolation: Option<InterpolationOptions>,
    pub offset_interpolation: Option<InterpolationOptions>,
    pub opacity_interpolation: Option<InterpolationOptions>,
    pub cache: ImageCache,
}

impl ImageState {
    pub fn new(handle: ImageHandle, key: ImageKey, def: &ImageDefinition) -> Self {
        Self {
            handle,
            key,
            resource: def.resource,
            mode: def.mode,
            anchor: def.anchor,
            scale: def.scale,
            rotation: Channel::new(Degrees(def.rotation_deg)),
            offset_meters: Channel::new(def.offset.meters),
            offset_heading: Channel::new(Degrees(def.offset.heading_deg)),
            opacity: Channel::new(def.opacity),
            base_opacity: def.opacity,
            lod_hidden: false,
            origin: def.origin,
            rotation_interpolation: def.rotation_interpolation,
            offset_interpolation: def.offset_interpolation,
            opacity_interpolation: def.opacity_interpolation,
            cache: ImageCache::default(),
        }
    }

    pub fn set_rotation(&mut self, deg: f64) {
        self.rotation
            .set(Degrees(deg), self.rotation_interpolation.as_ref());
    }

    pub fn set_offset(&mut self, offset: ImageOffset) {
        let options = self.offset_interpolation.as_ref();
        self.offset_meters.set(offset.meters, options);
        self.offset_heading.set(Degrees(offset.heading_deg), options);
    }

    /// Set the user opacity. While hidden by distance the value is only
    /// remembered and applied on return.
    pub fn set_opacity(&mut self, opacity: f64) {
        self.base_opacity = opacity;
        if !self.lod_hidden {
            self.opacity.set(opacity, self.opacity_interpolation.as_ref());
        }
    }

    /// Fade out (hidden) or back to the user opacity.
    pub fn set_lod_hidden(&mut self, hidden: bool) {
        if self.lod_hidden == hidden {
            return;
        }
        self.lod_hidden = hidden;
        let target = if hidden { 0.0 } else { self.base_opacity };
        self.opacity.set(target, self.opacity_interpolation.as_ref());
    }

    pub fn offset(&self) -> ImageOffset {
        ImageOffset {
            meters: self.offset_meters.value(),
            heading_deg: self.offset_heading.value().0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpriteDefinition {
    pub location: SpriteLocation,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub location_interpolation: Option<InterpolationOptions>,
    #[serde(default)]
    pub visibility_distance_m: Option<f64>,
}

fn default_enabled() -> bool {
    true
}

impl SpriteDefinition {
    pub fn at(location: SpriteLocation) -> Self {
        Self {
            location,
            enabled: true,
            location_interpolation: None,
            visibility_distance_m: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SpriteState {
    pub handle: SpriteHandle,
    pub id: String,
    pub enabled: bool,
    pub location: Channel<SpriteLocation>,
    pub location_interpolation: Option<InterpolationOptions>,
    pub visibility_distance_m: Option<f64>,
    pub images: BTreeMap<ImageKey, ImageState>,
}

impl SpriteState {
    pub fn set_location(&mut self, location: SpriteLocation) {
        self.location
            .set(location, self.location_interpolation.as_ref());
    }
}

fn allocate<H: Handle>(handles: &mut HandleAllocator<H>) -> Result<H, SpriteError> {
    handles
        .allocate()
        .ok_or(SpriteError::HandlesExhausted(H::KIND))
}

#[derive(Debug, Default)]
pub struct SpriteStore {
    sprite_handles: HandleAllocator<SpriteHandle>,
    image_handles: HandleAllocator<ImageHandle>,
    sprites: HashMap<SpriteHandle, SpriteState>,
    by_id: HashMap<String, SpriteHandle>,
}

impl SpriteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sprites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sprites.is_empty()
    }

    pub fn add_sprite(
        &mut self,
        id: &str,
        def: &SpriteDefinition,
    ) -> Result<SpriteHandle, SpriteError> {
        if self.by_id.contains_key(id) {
            return Err(SpriteError::DuplicateSprite(id.to_string()));
        }
        let handle = allocate(&mut self.sprite_handles)?;
        self.sprites.insert(
            handle,
            SpriteState {
                handle,
                id: id.to_string(),
                enabled: def.enabled,
                location: Channel::new(def.location),
                location_interpolation: def.location_interpolation,
                visibility_distance_m: def.visibility_distance_m,
                images: BTreeMap::new(),
            },
        );
        self.by_id.insert(id.to_string(), handle);
        Ok(handle)
    }

    pub fn remove_sprite(&mut self, handle: SpriteHandle) -> Result<SpriteState, SpriteError> {
        let sprite = self
            .sprites
            .remove(&handle)
            .ok_or(SpriteError::UnknownSprite(handle))?;
        self.by_id.remove(&sprite.id);
        Ok(sprite)
    }

    pub fn handle_of(&self, id: &str) -> Option<SpriteHandle> {
        self.by_id.get(id).copied()
    }

    pub fn get(&self, handle: SpriteHandle) -> Option<&SpriteState> {
        self.sprites.get(&handle)
    }

    pub fn sprite(&self, handle: SpriteHandle) -> Result<&SpriteState, SpriteError> {
        self.sprites
            .get(&handle)
            .ok_or(SpriteError::UnknownSprite(handle))
    }

    pub fn sprite_mut(&mut self, handle: SpriteHandle) -> Result<&mut SpriteState, SpriteError> {
        self.sprites
            .get_mut(&handle)
            .ok_or(SpriteError::UnknownSprite(handle))
    }

    pub fn attach_image(
        &mut self,
        sprite: SpriteHandle,
        key: ImageKey,
        def: &ImageDefinition,
    ) -> Result<ImageHandle, SpriteError> {
        let state = self
            .sprites
            .get_mut(&sprite)
            .ok_or(SpriteError::UnknownSprite(sprite))?;
        if state.images.contains_key(&key) {
            return Err(SpriteError::DuplicateImage { sprite, key });
        }
        let handle = allocate(&mut self.image_handles)?;
        state.images.insert(key, ImageState::new(handle, key, def));
        Ok(handle)
    }

    pub fn detach_image(
        &mut self,
        sprite: SpriteHandle,
        key: ImageKey,
    ) -> Result<ImageState, SpriteError> {
        self.sprite_mut(sprite)?
            .images
            .remove(&key)
            .ok_or(SpriteError::UnknownImage { sprite, key })
    }

    pub fn image_mut(
        &mut self,
        sprite: SpriteHandle,
        key: ImageKey,
    ) -> Result<&mut ImageState, SpriteError> {
        self.sprite_mut(sprite)?
            .images
            .get_mut(&key)
            .ok_or(SpriteError::UnknownImage { sprite, key })
    }

    /// Sprite handles in ascending order.
    pub fn handles(&self) -> Vec<SpriteHandle> {
        let mut handles: Vec<_> = self.sprites.keys().copied().collect();
        handles.sort_unstable();
        handles
    }

    /// Lexicographic rank of every sprite id; the last depth tie-breaker.
    pub fn id_ranks(&self) -> HashMap<SpriteHandle, u32> {
        let mut ids: Vec<(&str, SpriteHandle)> = self
            .by_id
            .iter()
            .map(|(id, handle)| (id.as_str(), *handle))
            .collect();
        ids.sort_unstable();
        ids.into_iter()
            .enumerate()
            .map(|(rank, (_, handle))| (handle, rank as u32))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SpriteState> {
        self.sprites.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut SpriteState> {
        self.sprites.values_mut()
    }

    pub fn clear(&mut self) {
        self.sprites.clear();
        self.by_id.clear();
        self.sprite_handles.reset();
        self.image_handles.reset();
    }
}

/// Atlas placement of a texture.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AtlasRegion {
    pub page: u32,
    pub u0: f64,
    pub v0: f64,
    pub u1: f64,
    pub v1: f64,
}

impl Default for AtlasRegion {
    fn default() -> Self {
        Self {
            page: 0,
            u0: 0.0,
            v0: 0.0,
            u1: 1.0,
            v1: 1.0,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageResource {
    pub handle: ResourceHandle,
    pub width: f64,
    pub height: f64,
    pub ready: bool,
    pub region: AtlasRegion,
}

/// Image sizes and texture readiness, filled in by the asset loader.
#[derive(Debug, Default)]
pub struct ResourceTable {
    handles: HandleAllocator<ResourceHandle>,
    resources: HashMap<ResourceHandle, ImageResource>,
}

impl ResourceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource whose texture is not uploaded yet.
    pub fn register(&mut self, width: f64, height: f64) -> Result<ResourceHandle, SpriteError> {
        let handle = allocate(&mut self.handles)?;
        self.resources.insert(
            handle,
            ImageResource {
                handle,
                width,
                height,
                ready: false,
                region: AtlasRegion::default(),
            },
        );
        Ok(handle)
    }

    /// Mark the texture uploaded at `region`. Unknown handles are ignored.
    pub fn mark_ready(&mut self, handle: ResourceHandle, region: AtlasRegion) -> bool {
        match self.resources.get_mut(&handle) {
            Some(resource) => {
                resource.ready = true;
                resource.region = region;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, handle: ResourceHandle) -> Option<ImageResource> {
        self.resources.remove(&handle)
    }

    pub fn get(&self, handle: ResourceHandle) -> Option<&ImageResource> {
        self.resources.get(&handle)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn clear(&mut self) {
        self.resources.clear();
        self.handles.reset();
    }
}
