//! Stateful side of a frame.
//!
//! `RenderHost` owns the sprite store, the resource table and the hit-test
//! controller. Per frame it applies distance LOD, gathers every active
//! channel into one interpolation batch, snapshots the store into a
//! self-contained `FrameInput`, hands both to a `CalculationHost` and writes
//! the results back (channel values, image caches, hit-test structures).

use hashbrown::HashMap;

use crate::calc::CalculationHost;
use crate::config::Config;
use crate::error::SpriteError;
use crate::hit_test::{BoundsContext, HitTestController};
use crate::ids::{ImageHandle, ImageKey, ResourceHandle, SpriteHandle};
use crate::interp::{InterpolationBatch, InterpolationBatchResult};
use crate::prepare::{
    FrameConstants, FrameInput, FrameMatrices, ItemEntry, PreparedDrawItem, SpriteEntry,
};
use crate::projection::ProjectionHost;
use crate::sprite::{
    ImageDefinition, ImageState, ResourceTable, SpriteDefinition, SpriteState, SpriteStore,
};

/// Result of one frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameOutput {
    /// Draw items in draw order.
    pub items: Vec<PreparedDrawItem>,
    /// Some channel is still animating; the caller should schedule another frame.
    pub active: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum ScalarRef {
    OffsetMeters(SpriteHandle, ImageKey),
    Opacity(SpriteHandle, ImageKey),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum DegreeRef {
    Rotation(SpriteHandle, ImageKey),
    OffsetHeading(SpriteHandle, ImageKey),
}

/// Which channel each batch slot came from.
#[derive(Debug, Default)]
struct ChannelRefs {
    scalars: Vec<ScalarRef>,
    degrees: Vec<DegreeRef>,
    locations: Vec<SpriteHandle>,
}

pub struct RenderHost {
    config: Config,
    store: SpriteStore,
    resources: ResourceTable,
    hit_test: HitTestController,
}

impl RenderHost {
    pub fn new(config: Config) -> Self {
        Self {
            hit_test: HitTestController::new(&config),
            config,
            store: SpriteStore::new(),
            resources: ResourceTable::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &SpriteStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut SpriteStore {
        &mut self.store
    }

    pub fn resources(&self) -> &ResourceTable {
        &self.resources
    }

    pub fn resources_mut(&mut self) -> &mut ResourceTable {
        &mut self.resources
    }

    pub fn hit_test(&self) -> &HitTestController {
        &self.hit_test
    }

    pub fn hit_test_mut(&mut self) -> &mut HitTestController {
        &mut self.hit_test
    }

    pub fn add_sprite(
        &mut self,
        id: &str,
        def: &SpriteDefinition,
    ) -> Result<SpriteHandle, SpriteError> {
        self.store.add_sprite(id, def)
    }

    /// Remove a sprite together with its spatial bounds.
    pub fn remove_sprite(&mut self, handle: SpriteHandle) -> Result<SpriteState, SpriteError> {
        let sprite = self.store.remove_sprite(handle)?;
        self.hit_test.remove_sprite_bounds(handle);
        Ok(sprite)
    }

    pub fn attach_image(
        &mut self,
        sprite: SpriteHandle,
        key: ImageKey,
        def: &ImageDefinition,
    ) -> Result<ImageHandle, SpriteError> {
        self.store.attach_image(sprite, key, def)
    }

    /// Detach an image together with its spatial bounds.
    pub fn detach_image(
        &mut self,
        sprite: SpriteHandle,
        key: ImageKey,
    ) -> Result<ImageState, SpriteError> {
        let image = self.store.detach_image(sprite, key)?;
        self.hit_test.remove_image_bounds(image.handle);
        Ok(image)
    }

    /// Re-estimate one sprite's world bounds against `projection`.
    pub fn refresh_sprite_hit_test_bounds(
        &mut self,
        sprite: SpriteHandle,
        projection: &dyn ProjectionHost,
    ) -> Result<(), SpriteError> {
        let state = self.store.sprite(sprite)?;
        let constants = FrameConstants::new(&self.config, &projection.snapshot());
        let ratio = projection
            .perspective_ratio(&state.location.value())
            .unwrap_or(1.0);
        let ctx = BoundsContext::new(&constants, ratio);
        self.hit_test
            .refresh_sprite_hit_test_bounds(state, &self.resources, &ctx, Some(projection));
        Ok(())
    }

    /// Drop every sprite, resource and hit-test structure.
    pub fn clear(&mut self) {
        self.store.clear();
        self.resources.clear();
        self.hit_test.clear_all();
    }

    /// Run one frame through `calc`.
    pub fn process<C: CalculationHost + ?Sized>(
        &mut self,
        calc: &mut C,
        projection: &dyn ProjectionHost,
        now_ms: f64,
    ) -> FrameOutput {
        calc.begin_frame(now_ms);
        self.hit_test.begin_frame();

        self.apply_visibility_lod(projection);

        let (batch, refs) = self.collect_interpolations(now_ms);
        let active = if batch.is_empty() {
            false
        } else {
            let result = calc.evaluate_interpolations(&batch);
            self.apply_interpolations(&refs, result)
        };

        let snapshot = projection.snapshot();
        let constants = FrameConstants::new(&self.config, &snapshot);
        let (input, slots) = self.build_frame_input(constants, FrameMatrices::from(&snapshot));
        let prepared = calc.prepare(&input);

        self.write_back(&input, &slots, &prepared.items, projection);

        FrameOutput {
            items: prepared.items,
            active,
        }
    }

    /// Fade images of sprites farther from the camera than their visibility distance.
    fn apply_visibility_lod(&mut self, projection: &dyn ProjectionHost) {
        for sprite in self.store.iter_mut() {
            let Some(limit) = sprite.visibility_distance_m else {
                continue;
            };
            let hidden = projection
                .camera_distance_meters(&sprite.location.value())
                .is_some_and(|distance| distance > limit);
            for image in sprite.images.values_mut() {
                image.set_lod_hidden(hidden);
            }
        }
    }

    fn collect_interpolations(&self, now_ms: f64) -> (InterpolationBatch, ChannelRefs) {
        let mut batch = InterpolationBatch::new(now_ms);
        let mut refs = ChannelRefs::default();
        for handle in self.store.handles() {
            let Some(sprite) = self.store.get(handle) else {
                continue;
            };
            if let Some(state) = sprite.location.state() {
                batch.locations.push(*state);
                refs.locations.push(handle);
            }
            for (key, image) in &sprite.images {
                if let Some(state) = image.offset_meters.state() {
                    batch.scalars.push(*state);
                    refs.scalars.push(ScalarRef::OffsetMeters(handle, *key));
                }
                if let Some(state) = image.opacity.state() {
                    batch.scalars.push(*state);
                    refs.scalars.push(ScalarRef::Opacity(handle, *key));
                }
                if let Some(state) = image.rotation.state() {
                    batch.degrees.push(*state);
                    refs.degrees.push(DegreeRef::Rotation(handle, *key));
                }
                if let Some(state) = image.offset_heading.state() {
                    batch.degrees.push(*state);
                    refs.degrees.push(DegreeRef::OffsetHeading(handle, *key));
                }
            }
        }
        (batch, refs)
    }

    /// Apply evaluations in batch order. Returns whether any channel is still running.
    fn apply_interpolations(&mut self, refs: &ChannelRefs, result: InterpolationBatchResult) -> bool {
        let mut active = false;
        for (slot, evaluation) in refs.scalars.iter().zip(result.scalars) {
            active |= !evaluation.completed;
            let (sprite, key) = match *slot {
                ScalarRef::OffsetMeters(s, k) | ScalarRef::Opacity(s, k) => (s, k),
            };
            if let Ok(image) = self.store.image_mut(sprite, key) {
                match slot {
                    ScalarRef::OffsetMeters(..) => image.offset_meters.apply(evaluation),
                    ScalarRef::Opacity(..) => image.opacity.apply(evaluation),
                }
            }
        }
        for (slot, evaluation) in refs.degrees.iter().zip(result.degrees) {
            active |= !evaluation.completed;
            let (sprite, key) = match *slot {
                DegreeRef::Rotation(s, k) | DegreeRef::OffsetHeading(s, k) => (s, k),
            };
            if let Ok(image) = self.store.image_mut(sprite, key) {
                match slot {
                    DegreeRef::Rotation(..) => image.rotation.apply(evaluation),
                    DegreeRef::OffsetHeading(..) => image.offset_heading.apply(evaluation),
                }
            }
        }
        for (handle, evaluation) in refs.locations.iter().zip(result.locations) {
            active |= !evaluation.completed;
            if let Ok(sprite) = self.store.sprite_mut(*handle) {
                sprite.location.apply(evaluation);
            }
        }
        active
    }

    /// Snapshot enabled sprites (handle order) and their images (key order).
    /// `slots[i]` names the image behind `input.items[i]`.
    fn build_frame_input(
        &self,
        constants: FrameConstants,
        matrices: FrameMatrices,
    ) -> (FrameInput, Vec<(SpriteHandle, ImageKey)>) {
        let ranks = self.store.id_ranks();
        let mut resource_index: HashMap<ResourceHandle, usize> = HashMap::new();
        let mut input = FrameInput {
            constants,
            matrices,
            resources: Vec::new(),
            sprites: Vec::new(),
            items: Vec::new(),
        };
        let mut slots = Vec::new();

        for handle in self.store.handles() {
            let Some(sprite) = self.store.get(handle) else {
                continue;
            };
            if !sprite.enabled || sprite.images.is_empty() {
                continue;
            }
            let sprite_index = input.sprites.len();
            input.sprites.push(SpriteEntry::new(
                handle,
                ranks.get(&handle).copied().unwrap_or(u32::MAX),
                sprite.location.value(),
            ));

            let first = input.items.len();
            for (key, image) in &sprite.images {
                let resource = match resource_index.get(&image.resource) {
                    Some(index) => Some(*index),
                    None => self.resources.get(image.resource).map(|resource| {
                        input.resources.push(*resource);
                        resource_index.insert(image.resource, input.resources.len() - 1);
                        input.resources.len() - 1
                    }),
                };
                input.items.push(ItemEntry {
                    sprite_index,
                    resource_index: resource,
                    image: image.handle,
                    key: *key,
                    mode: image.mode,
                    scale: image.scale,
                    opacity: image.opacity.value(),
                    anchor: image.anchor,
                    offset: image.offset(),
                    rotation_deg: image.rotation.value().0,
                    origin_index: None,
                    origin_use_anchor: false,
                });
                slots.push((handle, *key));
            }

            // Origins point inside this sprite's contiguous run of items.
            for index in first..input.items.len() {
                let (_, key) = slots[index];
                let Some(origin) = sprite.images.get(&key).and_then(|image| image.origin) else {
                    continue;
                };
                input.items[index].origin_index =
                    (first..input.items.len()).find(|&i| slots[i].1 == origin.key && i != index);
                input.items[index].origin_use_anchor = origin.use_resolved_anchor;
            }
        }
        (input, slots)
    }

    fn write_back(
        &mut self,
        input: &FrameInput,
        slots: &[(SpriteHandle, ImageKey)],
        items: &[PreparedDrawItem],
        projection: &dyn ProjectionHost,
    ) {
        for &(sprite, key) in slots {
            if let Ok(image) = self.store.image_mut(sprite, key) {
                image.cache.clear();
            }
        }
        for (draw_index, item) in items.iter().enumerate() {
            let Some(&(sprite, key)) = slots.get(item.item_index) else {
                continue;
            };
            if let Ok(image) = self.store.image_mut(sprite, key) {
                image.cache.screen_corners = Some(item.screen_corners);
                image.cache.shader = item.shader;
            }
            self.hit_test
                .register_hit_test_entry(sprite, item.image, item.screen_corners, draw_index);
        }

        if !self.hit_test.is_hit_test_enabled() {
            return;
        }
        for entry in &input.sprites {
            let Some(sprite) = self.store.get(entry.handle) else {
                continue;
            };
            let ratio = projection.perspective_ratio(&entry.location).unwrap_or(1.0);
            let ctx = BoundsContext::new(&input.constants, ratio);
            self.hit_test
                .refresh_sprite_hit_test_bounds(sprite, &self.resources, &ctx, Some(projection));
        }
        for sprite in self.store.iter().filter(|s| !s.enabled) {
            self.hit_test.remove_sprite_bounds(sprite.handle);
        }
    }
}
