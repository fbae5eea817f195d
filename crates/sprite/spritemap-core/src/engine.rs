//! Engine: caller-owned facade over a `RenderHost` and an execution strategy.
//!
//! Methods:
//! - construction (local, native module, custom strategy)
//! - store commands (sprites, images, resources, channel targets)
//! - hit-test operations
//! - process_frame, release

use crate::calc::{
    CalculationHost, CalculationKind, ComputeModule, LocalCalculationHost, NativeCalculationHost,
};
use crate::config::Config;
use crate::error::SpriteError;
use crate::geo::SpriteLocation;
use crate::hit_test::{resolve_hit_test_result, HitTestEntry, HitTestResult};
use crate::host::{FrameOutput, RenderHost};
use crate::ids::{ImageHandle, ImageKey, ResourceHandle, SpriteHandle};
use crate::projection::{ProjectionHost, ScreenPoint};
use crate::sprite::{
    AtlasRegion, ImageDefinition, ImageOffset, ImageState, SpriteDefinition, SpriteState,
};

pub struct SpriteEngine {
    render: RenderHost,
    calc: Box<dyn CalculationHost>,
}

impl SpriteEngine {
    /// Engine computing every frame in process.
    pub fn new(cfg: Config) -> Self {
        let calc = Box::new(LocalCalculationHost::new(cfg.features.clone()));
        Self::with_calculation_host(cfg, calc)
    }

    /// Engine delegating to a compute module, falling back to local
    /// calculation if the module ever fails.
    pub fn with_module<M: ComputeModule + 'static>(cfg: Config, module: M) -> Self {
        let calc = Box::new(NativeCalculationHost::new(
            module,
            cfg.pool.clone(),
            cfg.features.clone(),
        ));
        Self::with_calculation_host(cfg, calc)
    }

    pub fn with_calculation_host(cfg: Config, calc: Box<dyn CalculationHost>) -> Self {
        Self {
            render: RenderHost::new(cfg),
            calc,
        }
    }

    pub fn calculation_kind(&self) -> CalculationKind {
        self.calc.kind()
    }

    pub fn config(&self) -> &Config {
        self.render.config()
    }

    pub fn render(&self) -> &RenderHost {
        &self.render
    }

    pub fn render_mut(&mut self) -> &mut RenderHost {
        &mut self.render
    }

    // ---- store commands ----

    pub fn register_resource(
        &mut self,
        width: f64,
        height: f64,
    ) -> Result<ResourceHandle, SpriteError> {
        self.render.resources_mut().register(width, height)
    }

    pub fn mark_resource_ready(&mut self, resource: ResourceHandle, region: AtlasRegion) -> bool {
        self.render.resources_mut().mark_ready(resource, region)
    }

    pub fn add_sprite(
        &mut self,
        id: &str,
        def: &SpriteDefinition,
    ) -> Result<SpriteHandle, SpriteError> {
        self.render.add_sprite(id, def)
    }

    pub fn remove_sprite(&mut self, sprite: SpriteHandle) -> Result<SpriteState, SpriteError> {
        self.render.remove_sprite(sprite)
    }

    pub fn sprite(&self, sprite: SpriteHandle) -> Option<&SpriteState> {
        self.render.store().get(sprite)
    }

    pub fn sprite_handle(&self, id: &str) -> Option<SpriteHandle> {
        self.render.store().handle_of(id)
    }

    pub fn attach_image(
        &mut self,
        sprite: SpriteHandle,
        key: ImageKey,
        def: &ImageDefinition,
    ) -> Result<ImageHandle, SpriteError> {
        self.render.attach_image(sprite, key, def)
    }

    pub fn detach_image(
        &mut self,
        sprite: SpriteHandle,
        key: ImageKey,
    ) -> Result<ImageState, SpriteError> {
        self.render.detach_image(sprite, key)
    }

    pub fn set_sprite_location(
        &mut self,
        sprite: SpriteHandle,
        location: SpriteLocation,
    ) -> Result<(), SpriteError> {
        self.render.store_mut().sprite_mut(sprite)?.set_location(location);
        Ok(())
    }

    pub fn set_sprite_enabled(&mut self, sprite: SpriteHandle, enabled: bool) -> Result<(), SpriteError> {
        self.render.store_mut().sprite_mut(sprite)?.enabled = enabled;
        Ok(())
    }

    pub fn set_image_opacity(
        &mut self,
        sprite: SpriteHandle,
        key: ImageKey,
        opacity: f64,
    ) -> Result<(), SpriteError> {
        self.render.store_mut().image_mut(sprite, key)?.set_opacity(opacity);
        Ok(())
    }

    pub fn set_image_rotation(
        &mut self,
        sprite: SpriteHandle,
        key: ImageKey,
        rotation_deg: f64,
    ) -> Result<(), SpriteError> {
        self.render
            .store_mut()
            .image_mut(sprite, key)?
            .set_rotation(rotation_deg);
        Ok(())
    }

    pub fn set_image_offset(
        &mut self,
        sprite: SpriteHandle,
        key: ImageKey,
        offset: ImageOffset,
    ) -> Result<(), SpriteError> {
        self.render.store_mut().image_mut(sprite, key)?.set_offset(offset);
        Ok(())
    }

    // ---- hit testing ----

    pub fn begin_frame(&mut self) {
        self.render.hit_test_mut().begin_frame();
    }

    pub fn clear_all(&mut self) {
        self.render.hit_test_mut().clear_all();
    }

    pub fn register_hit_test_entry(
        &mut self,
        sprite: SpriteHandle,
        image: ImageHandle,
        corners: [ScreenPoint; 4],
        draw_index: usize,
    ) -> bool {
        self.render
            .hit_test_mut()
            .register_hit_test_entry(sprite, image, corners, draw_index)
    }

    /// Re-estimate one sprite's world bounds against the current camera.
    pub fn refresh_sprite_hit_test_bounds(
        &mut self,
        sprite: SpriteHandle,
        projection: &dyn ProjectionHost,
    ) -> Result<(), SpriteError> {
        self.render.refresh_sprite_hit_test_bounds(sprite, projection)
    }

    pub fn remove_image_bounds(&mut self, image: ImageHandle) -> bool {
        self.render.hit_test_mut().remove_image_bounds(image)
    }

    pub fn find_topmost_hit_entry(
        &self,
        point: ScreenPoint,
        projection: Option<&dyn ProjectionHost>,
    ) -> Option<&HitTestEntry> {
        self.render.hit_test().find_topmost_hit_entry(point, projection)
    }

    pub fn resolve_hit_test_result(&self, entry: &HitTestEntry) -> Option<HitTestResult> {
        resolve_hit_test_result(entry, self.render.store())
    }

    /// `find_topmost_hit_entry` followed by `resolve_hit_test_result`.
    pub fn hit_test(
        &self,
        point: ScreenPoint,
        projection: Option<&dyn ProjectionHost>,
    ) -> Option<HitTestResult> {
        let entry = self.find_topmost_hit_entry(point, projection)?;
        self.resolve_hit_test_result(entry)
    }

    pub fn set_hit_test_detection(&mut self, enabled: bool) {
        self.render.hit_test_mut().set_hit_test_detection(enabled);
    }

    pub fn is_hit_test_enabled(&self) -> bool {
        self.render.hit_test().is_hit_test_enabled()
    }

    // ---- frames ----

    pub fn process_frame(&mut self, projection: &dyn ProjectionHost, now_ms: f64) -> FrameOutput {
        self.calc.process_frame(&mut self.render, projection, now_ms)
    }

    /// Tear down: drop all sprites, resources, hit-test state and strategy buffers.
    pub fn release(&mut self) {
        self.render.clear();
        self.calc.release();
    }
}
