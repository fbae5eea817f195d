//! Pointer → sprite resolution.
//!
//! Two structures are kept per frame: world-space (lng/lat) estimated bounds
//! for every visible image in a loose quadtree, and the exact screen quads
//! registered while the frame was prepared. A query narrows the quads through
//! the tree when a projection is available and falls back to a linear scan
//! otherwise.

use hashbrown::{HashMap, HashSet};

use crate::config::{Config, HitTestConfig};
use crate::geo::{meters_to_degree_span, pixels_per_meter, SpriteLocation};
use crate::ids::{ImageHandle, ImageKey, SpriteHandle};
use crate::prepare::geometry::{pixel_scale_adjustment, surface_geometry};
use crate::prepare::FrameConstants;
use crate::projection::{ProjectionHost, ScreenPoint};
use crate::spatial::{LooseQuadTree, Rect, SpatialKey};
use crate::sprite::{ImageState, PlacementMode, ResourceTable, SpriteState, SpriteStore};

/// Whole lng/lat domain; every estimated rect is clamped into it.
pub const WORLD_BOUNDS: Rect = Rect {
    x0: -180.0,
    y0: -90.0,
    x1: 180.0,
    y1: 90.0,
};

/// One drawn quad of this frame.
#[derive(Clone, Debug, PartialEq)]
pub struct HitTestEntry {
    pub sprite: SpriteHandle,
    pub image: ImageHandle,
    /// Top-left, top-right, bottom-right, bottom-left in screen pixels.
    pub corners: [ScreenPoint; 4],
    pub bounds: Rect,
    pub draw_index: usize,
}

impl HitTestEntry {
    pub fn new(
        sprite: SpriteHandle,
        image: ImageHandle,
        corners: [ScreenPoint; 4],
        draw_index: usize,
    ) -> Option<Self> {
        if !corners.iter().all(ScreenPoint::is_finite) {
            return None;
        }
        let bounds = Rect::from_points(corners.iter().map(|p| (p.x, p.y)))?;
        Some(Self {
            sprite,
            image,
            corners,
            bounds,
            draw_index,
        })
    }

    pub fn contains(&self, point: ScreenPoint, epsilon: f64) -> bool {
        self.bounds.contains_point(point.x, point.y) && quad_contains(&self.corners, point, epsilon)
    }
}

/// Convex quad test: the point lies on the same side of every edge.
/// Cross products within `epsilon` of zero count as on the edge.
pub fn quad_contains(corners: &[ScreenPoint; 4], point: ScreenPoint, epsilon: f64) -> bool {
    let mut sign = 0.0;
    for i in 0..4 {
        let a = corners[i];
        let b = corners[(i + 1) % 4];
        let cross = (b.x - a.x) * (point.y - a.y) - (b.y - a.y) * (point.x - a.x);
        if cross.abs() <= epsilon {
            continue;
        }
        if sign == 0.0 {
            sign = cross.signum();
        } else if cross.signum() != sign {
            return false;
        }
    }
    true
}

/// What a hit resolves to for the caller.
#[derive(Clone, Debug, PartialEq)]
pub struct HitTestResult {
    pub sprite: SpriteHandle,
    pub sprite_id: String,
    pub image: ImageHandle,
    pub key: ImageKey,
    pub draw_index: usize,
    pub location: SpriteLocation,
}

/// Frame values needed to estimate world bounds.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BoundsContext {
    pub world_size: f64,
    pub meters_per_pixel: f64,
    pub zoom_scale_factor: f64,
    pub sprite_min_pixel: f64,
    pub sprite_max_pixel: f64,
    /// Perspective ratio at the sprite (1 when unknown).
    pub perspective_ratio: f64,
}

impl BoundsContext {
    pub fn new(constants: &FrameConstants, perspective_ratio: f64) -> Self {
        Self {
            world_size: constants.world_size,
            meters_per_pixel: constants.meters_per_pixel,
            zoom_scale_factor: constants.zoom_scale_factor,
            sprite_min_pixel: constants.sprite_min_pixel,
            sprite_max_pixel: constants.sprite_max_pixel,
            perspective_ratio: if perspective_ratio.is_finite() && perspective_ratio > 0.0 {
                perspective_ratio
            } else {
                1.0
            },
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
struct ImageRef {
    sprite: SpriteHandle,
    image: ImageHandle,
}

#[derive(Copy, Clone, Debug)]
struct Tracked {
    key: SpatialKey,
    rect: Rect,
    sprite: SpriteHandle,
}

#[derive(Debug)]
pub struct HitTestController {
    config: HitTestConfig,
    enabled: bool,
    index: LooseQuadTree<ImageRef>,
    tracked: HashMap<ImageHandle, Tracked>,
    entries: Vec<HitTestEntry>,
}

impl HitTestController {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.hit_test.clone(),
            enabled: config.hit_test.enabled,
            index: LooseQuadTree::new(WORLD_BOUNDS, &config.spatial),
            tracked: HashMap::new(),
            entries: Vec::new(),
        }
    }

    pub fn is_hit_test_enabled(&self) -> bool {
        self.enabled
    }

    /// Disabling drops both structures; nothing is tracked until re-enabled.
    pub fn set_hit_test_detection(&mut self, enabled: bool) {
        if !enabled {
            self.clear_all();
        }
        self.enabled = enabled;
    }

    /// Start a frame: screen quads are rebuilt from scratch every frame.
    pub fn begin_frame(&mut self) {
        self.entries.clear();
    }

    pub fn clear_all(&mut self) {
        self.entries.clear();
        self.index.clear();
        self.tracked.clear();
    }

    pub fn entries(&self) -> &[HitTestEntry] {
        &self.entries
    }

    /// Spatial bounds currently tracked for an image.
    pub fn image_bounds(&self, image: ImageHandle) -> Option<Rect> {
        self.tracked.get(&image).map(|t| t.rect)
    }

    pub fn tracked_len(&self) -> usize {
        self.index.len()
    }

    /// Record a drawn quad. Ignored while disabled or when a corner is not finite.
    pub fn register_hit_test_entry(
        &mut self,
        sprite: SpriteHandle,
        image: ImageHandle,
        corners: [ScreenPoint; 4],
        draw_index: usize,
    ) -> bool {
        if !self.enabled {
            return false;
        }
        match HitTestEntry::new(sprite, image, corners, draw_index) {
            Some(entry) => {
                self.entries.push(entry);
                true
            }
            None => false,
        }
    }

    /// Re-estimate the world bounds of every image of `sprite`. Images that
    /// cannot be drawn lose their bounds. With a projection the ground under
    /// each image's last drawn quad is covered too.
    pub fn refresh_sprite_hit_test_bounds(
        &mut self,
        sprite: &SpriteState,
        resources: &ResourceTable,
        ctx: &BoundsContext,
        projection: Option<&dyn ProjectionHost>,
    ) {
        if !self.enabled {
            return;
        }
        for image in sprite.images.values() {
            let bounds = estimate_image_bounds(sprite, image, resources, ctx).map(|rect| {
                match (projection, image.cache.screen_corners) {
                    (Some(projection), Some(corners)) => {
                        rect.union(&screen_footprint(&corners, projection))
                    }
                    _ => rect,
                }
            });
            match bounds {
                Some(rect) => self.set_image_bounds(sprite.handle, image.handle, rect),
                None => {
                    self.remove_image_bounds(image.handle);
                }
            }
        }
    }

    pub fn remove_image_bounds(&mut self, image: ImageHandle) -> bool {
        match self.tracked.remove(&image) {
            Some(t) => self.index.remove(t.key, &t.rect),
            None => false,
        }
    }

    /// Drop the bounds of every image owned by `sprite`.
    pub fn remove_sprite_bounds(&mut self, sprite: SpriteHandle) {
        let index = &mut self.index;
        self.tracked.retain(|_, t| {
            if t.sprite == sprite {
                index.remove(t.key, &t.rect);
                false
            } else {
                true
            }
        });
    }

    fn set_image_bounds(&mut self, sprite: SpriteHandle, image: ImageHandle, rect: Rect) {
        let rect = rect.clamped_to(&WORLD_BOUNDS);
        if !rect.is_finite() {
            self.remove_image_bounds(image);
            return;
        }
        if let Some(t) = self.tracked.get_mut(&image) {
            if t.rect == rect {
                return;
            }
            if self.index.update(t.key, &t.rect, rect) {
                t.rect = rect;
                return;
            }
            log::debug!("hit-test bounds for {image:?} out of sync, reinserting");
            self.index.remove(t.key, &t.rect);
            self.tracked.remove(&image);
        }
        match self.index.add(rect, ImageRef { sprite, image }) {
            Ok(key) => {
                self.tracked.insert(image, Tracked { key, rect, sprite });
            }
            Err(err) => log::debug!("hit-test bounds rejected: {err}"),
        }
    }

    /// Topmost (highest draw index) quad under `point`.
    pub fn find_topmost_hit_entry(
        &self,
        point: ScreenPoint,
        projection: Option<&dyn ProjectionHost>,
    ) -> Option<&HitTestEntry> {
        if !self.enabled || self.entries.is_empty() || !point.is_finite() {
            return None;
        }
        match projection.and_then(|p| self.spatial_candidates(point, p)) {
            Some(candidates) => self.topmost_among(point, &candidates),
            None => self.linear_scan(point),
        }
    }

    /// Reverse-draw-order scan over every entry of the frame.
    pub fn linear_scan(&self, point: ScreenPoint) -> Option<&HitTestEntry> {
        let eps = self.config.quad_epsilon;
        self.entries
            .iter()
            .filter(|e| e.contains(point, eps))
            .max_by_key(|e| e.draw_index)
    }

    fn spatial_candidates(
        &self,
        point: ScreenPoint,
        projection: &dyn ProjectionHost,
    ) -> Option<HashSet<ImageHandle>> {
        let m = self.config.query_margin_px;
        let samples = [
            point,
            point.offset(-m, 0.0),
            point.offset(m, 0.0),
            point.offset(0.0, -m),
            point.offset(0.0, m),
        ];
        let query = Rect::from_points(
            samples
                .iter()
                .filter_map(|p| projection.unproject(*p))
                .filter(|loc| loc.lng.is_finite() && loc.lat.is_finite())
                .map(|loc| (loc.lng, loc.lat)),
        )?;
        let found = self.index.lookup(&query);
        if found.is_empty() {
            return None;
        }
        Some(found.into_iter().map(|(_, item)| item.payload.image).collect())
    }

    fn topmost_among(
        &self,
        point: ScreenPoint,
        candidates: &HashSet<ImageHandle>,
    ) -> Option<&HitTestEntry> {
        let eps = self.config.quad_epsilon;
        let mut pool: Vec<&HitTestEntry> = self
            .entries
            .iter()
            .filter(|e| candidates.contains(&e.image))
            .collect();
        pool.sort_by_key(|e| e.draw_index);
        let mut seen = HashSet::new();
        pool.into_iter()
            .rev()
            .filter(|e| seen.insert(e.image))
            .find(|e| e.contains(point, eps))
    }
}

/// Map an entry back to the sprite and image it was drawn from.
pub fn resolve_hit_test_result(entry: &HitTestEntry, store: &SpriteStore) -> Option<HitTestResult> {
    let sprite = store.get(entry.sprite)?;
    let image = sprite.images.values().find(|i| i.handle == entry.image)?;
    Some(HitTestResult {
        sprite: sprite.handle,
        sprite_id: sprite.id.clone(),
        image: image.handle,
        key: image.key,
        draw_index: entry.draw_index,
        location: sprite.location.value(),
    })
}

/// Largest distance (meters) an image can reach from its placement base:
/// the full diagonal (the anchor may sit on a corner) plus the offset.
fn image_reach_m(image: &ImageState, resources: &ResourceTable, ctx: &BoundsContext, lat: f64) -> Option<f64> {
    let resource = resources.get(image.resource)?;
    let (width_m, height_m) = image_size_m(image, resource.width, resource.height, ctx);
    let adjustment = clamp_adjustment(width_m, height_m, ctx, lat);
    let reach = width_m.hypot(height_m) * adjustment + image.offset_meters.value().abs();
    reach.is_finite().then_some(reach)
}

fn image_size_m(image: &ImageState, width_px: f64, height_px: f64, ctx: &BoundsContext) -> (f64, f64) {
    let meters_per_image_pixel = ctx.meters_per_pixel * image.scale * ctx.zoom_scale_factor;
    (width_px * meters_per_image_pixel, height_px * meters_per_image_pixel)
}

fn clamp_adjustment(width_m: f64, height_m: f64, ctx: &BoundsContext, lat: f64) -> f64 {
    let ppm = pixels_per_meter(ctx.world_size, lat) * ctx.perspective_ratio;
    pixel_scale_adjustment(width_m * ppm, height_m * ppm, ctx.sprite_min_pixel, ctx.sprite_max_pixel)
}

/// Sum of the reaches of every image up the origin chain (cycle safe).
fn origin_chain_reach_m(
    sprite: &SpriteState,
    image: &ImageState,
    resources: &ResourceTable,
    ctx: &BoundsContext,
    lat: f64,
) -> f64 {
    let mut reach = 0.0;
    let mut visited = HashSet::new();
    visited.insert(image.key);
    let mut next = image.origin.map(|o| o.key);
    while let Some(key) = next {
        if !visited.insert(key) {
            break;
        }
        let Some(origin) = sprite.images.get(&key) else {
            break;
        };
        reach += image_reach_m(origin, resources, ctx, lat).unwrap_or(0.0);
        next = origin.origin.map(|o| o.key);
    }
    reach
}

fn is_visible(sprite: &SpriteState, image: &ImageState, resources: &ResourceTable) -> bool {
    if !sprite.enabled {
        return false;
    }
    let opacity = image.opacity.value();
    if !(opacity.is_finite() && opacity > 0.0) {
        return false;
    }
    resources
        .get(image.resource)
        .is_some_and(|r| r.ready && r.width > 0.0 && r.height > 0.0)
}

/// Ground area under a drawn quad. A quad reaching above the horizon covers
/// unbounded ground and gets the whole world.
pub fn screen_footprint(corners: &[ScreenPoint; 4], projection: &dyn ProjectionHost) -> Rect {
    let ground: Option<Vec<(f64, f64)>> = corners
        .iter()
        .map(|p| projection.unproject(*p).map(|loc| (loc.lng, loc.lat)))
        .collect();
    ground.and_then(Rect::from_points).unwrap_or(WORLD_BOUNDS)
}

/// World bounds estimate: a safety circle around the base for billboards,
/// the displaced ground corners for surfaces. Origin chains widen both.
pub fn estimate_image_bounds(
    sprite: &SpriteState,
    image: &ImageState,
    resources: &ResourceTable,
    ctx: &BoundsContext,
) -> Option<Rect> {
    if !is_visible(sprite, image, resources) {
        return None;
    }
    let base = sprite.location.value();
    let chain_m = origin_chain_reach_m(sprite, image, resources, ctx, base.lat);
    let rect = match image.mode {
        PlacementMode::Billboard => {
            let radius_m = image_reach_m(image, resources, ctx, base.lat)? + chain_m;
            let (dlng, dlat) = meters_to_degree_span(radius_m, base.lat);
            Rect::new(base.lng - dlng, base.lat - dlat, base.lng + dlng, base.lat + dlat)
        }
        PlacementMode::Surface => {
            let resource = resources.get(image.resource)?;
            let (width_m, height_m) = image_size_m(image, resource.width, resource.height, ctx);
            let adjustment = clamp_adjustment(width_m, height_m, ctx, base.lat);
            let offset = image.offset();
            let g = surface_geometry(
                &base,
                width_m * adjustment,
                height_m * adjustment,
                image.anchor,
                offset.meters,
                offset.heading_deg,
                image.rotation.value().0,
            );
            let (dlng, dlat) = meters_to_degree_span(chain_m, base.lat);
            Rect::from_points(g.corners.iter().map(|c| (c.lng, c.lat)))?.expanded(dlng, dlat)
        }
    };
    rect.is_finite().then_some(rect)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::MatrixProjection;
    use crate::sprite::{AtlasRegion, ImageDefinition, SpriteDefinition};

    fn square(x0: f64, y0: f64, size: f64) -> [ScreenPoint; 4] {
        [
            ScreenPoint::new(x0, y0),
            ScreenPoint::new(x0 + size, y0),
            ScreenPoint::new(x0 + size, y0 + size),
            ScreenPoint::new(x0, y0 + size),
        ]
    }

    #[test]
    fn quad_test_handles_rotation_and_edges() {
        let diamond = [
            ScreenPoint::new(0.0, -1.0),
            ScreenPoint::new(1.0, 0.0),
            ScreenPoint::new(0.0, 1.0),
            ScreenPoint::new(-1.0, 0.0),
        ];
        assert!(quad_contains(&diamond, ScreenPoint::new(0.0, 0.0), 1e-9));
        assert!(quad_contains(&diamond, ScreenPoint::new(0.5, 0.5), 1e-9));
        assert!(!quad_contains(&diamond, ScreenPoint::new(0.9, 0.9), 1e-9));
    }

    #[test]
    fn linear_scan_prefers_highest_draw_index() {
        let mut hits = HitTestController::new(&Config::default());
        hits.register_hit_test_entry(SpriteHandle(0), ImageHandle(0), square(0.0, 0.0, 10.0), 0);
        hits.register_hit_test_entry(SpriteHandle(1), ImageHandle(1), square(5.0, 5.0, 10.0), 1);
        let hit = hits
            .find_topmost_hit_entry(ScreenPoint::new(7.0, 7.0), None)
            .expect("hit");
        assert_eq!(hit.image, ImageHandle(1));
        let hit = hits
            .find_topmost_hit_entry(ScreenPoint::new(2.0, 2.0), None)
            .expect("hit");
        assert_eq!(hit.image, ImageHandle(0));
        assert!(hits
            .find_topmost_hit_entry(ScreenPoint::new(50.0, 50.0), None)
            .is_none());
    }

    #[test]
    fn disabling_clears_and_ignores_registration() {
        let mut hits = HitTestController::new(&Config::default());
        hits.register_hit_test_entry(SpriteHandle(0), ImageHandle(0), square(0.0, 0.0, 10.0), 0);
        hits.set_hit_test_detection(false);
        assert!(hits.entries().is_empty());
        assert!(!hits.register_hit_test_entry(
            SpriteHandle(0),
            ImageHandle(0),
            square(0.0, 0.0, 10.0),
            0
        ));
        assert!(hits
            .find_topmost_hit_entry(ScreenPoint::new(1.0, 1.0), None)
            .is_none());
        hits.set_hit_test_detection(true);
        assert!(hits.is_hit_test_enabled());
    }

    #[test]
    fn non_finite_corners_are_rejected() {
        let mut hits = HitTestController::new(&Config::default());
        let mut corners = square(0.0, 0.0, 1.0);
        corners[2].x = f64::NAN;
        assert!(!hits.register_hit_test_entry(SpriteHandle(0), ImageHandle(0), corners, 0));
    }

    #[test]
    fn refresh_tracks_visible_images_only() {
        let mut store = SpriteStore::new();
        let mut resources = ResourceTable::new();
        let ready = resources.register(32.0, 32.0).expect("resource");
        resources.mark_ready(ready, AtlasRegion::default());
        let pending = resources.register(32.0, 32.0).expect("resource");

        let sprite = store
            .add_sprite("a", &SpriteDefinition::at(SpriteLocation::new(10.0, 20.0)))
            .expect("sprite");
        let shown = store
            .attach_image(
                sprite,
                ImageKey::new(0, 0),
                &ImageDefinition {
                    resource: ready,
                    ..ImageDefinition::default()
                },
            )
            .expect("image");
        let hidden = store
            .attach_image(
                sprite,
                ImageKey::new(0, 1),
                &ImageDefinition {
                    resource: pending,
                    ..ImageDefinition::default()
                },
            )
            .expect("image");

        let ctx = BoundsContext {
            world_size: 512.0 * 2f64.powi(16),
            meters_per_pixel: 1.0,
            zoom_scale_factor: 1.0,
            sprite_min_pixel: 0.0,
            sprite_max_pixel: 0.0,
            perspective_ratio: 1.0,
        };
        let mut hits = HitTestController::new(&Config::default());
        hits.refresh_sprite_hit_test_bounds(
            store.get(sprite).expect("sprite"),
            &resources,
            &ctx,
            None,
        );
        let rect = hits.image_bounds(shown).expect("tracked");
        assert!(rect.contains_point(10.0, 20.0));
        assert!(hits.image_bounds(hidden).is_none());

        hits.remove_sprite_bounds(sprite);
        assert_eq!(hits.tracked_len(), 0);
    }

    #[test]
    fn footprint_covers_the_ground_under_a_quad() {
        let center = SpriteLocation::new(0.0, 0.0);
        let proj = MatrixProjection::pitched(center, 16.0, 60.0, 0.0, 800.0, 600.0).expect("camera");
        let quad = square(380.0, 20.0, 40.0);
        let rect = screen_footprint(&quad, &proj);
        for p in [ScreenPoint::new(400.0, 40.0), ScreenPoint::new(381.0, 59.0)] {
            let ground = proj.unproject(p).expect("below the horizon");
            assert!(rect.contains_point(ground.lng, ground.lat), "{p:?}");
        }
        assert!(rect.y0 > center.lat);

        let sky = square(380.0, -400.0, 40.0);
        assert_eq!(screen_footprint(&sky, &proj), WORLD_BOUNDS);
    }
}
