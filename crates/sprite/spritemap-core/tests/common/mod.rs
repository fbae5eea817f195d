#![allow(dead_code)]

use serde::Deserialize;
use spritemap_core::sprite::AtlasRegion;
use spritemap_core::{
    Config, ImageDefinition, ImageKey, MatrixProjection, SpriteDefinition, SpriteEngine,
    SpriteLocation,
};

#[derive(Debug, Deserialize)]
pub struct Camera {
    pub center: SpriteLocation,
    pub zoom: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub pitch: f64,
    #[serde(default)]
    pub bearing: f64,
}

#[derive(Debug, Deserialize)]
pub struct SceneResource {
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub ready: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneImage {
    pub sub_layer: i32,
    pub order: i32,
    #[serde(flatten)]
    pub def: ImageDefinition,
}

#[derive(Debug, Deserialize)]
pub struct SceneSprite {
    pub id: String,
    #[serde(flatten)]
    pub def: SpriteDefinition,
    #[serde(default)]
    pub images: Vec<SceneImage>,
}

#[derive(Debug, Deserialize)]
pub struct Scene {
    pub camera: Camera,
    pub resources: Vec<SceneResource>,
    pub sprites: Vec<SceneSprite>,
}

impl Scene {
    pub fn load(name: &str) -> Scene {
        spritemap_test_fixtures::scenes::load(name)
            .unwrap_or_else(|err| panic!("scene fixture {name}: {err:#}"))
    }

    /// The scene's own camera: straight down unless it sets a pitch or bearing.
    pub fn projection(&self) -> MatrixProjection {
        if self.camera.pitch == 0.0 && self.camera.bearing == 0.0 {
            MatrixProjection::top_down(
                self.camera.center,
                self.camera.zoom,
                self.camera.width,
                self.camera.height,
            )
        } else {
            self.tilted(self.camera.pitch, self.camera.bearing)
        }
    }

    /// Perspective camera over the same center, zoom and viewport.
    pub fn tilted(&self, pitch_deg: f64, bearing_deg: f64) -> MatrixProjection {
        MatrixProjection::pitched(
            self.camera.center,
            self.camera.zoom,
            pitch_deg,
            bearing_deg,
            self.camera.width,
            self.camera.height,
        )
        .unwrap_or_else(|| panic!("invalid camera pitch={pitch_deg} bearing={bearing_deg}"))
    }

    /// Top-down plus a couple of tilted views of the scene.
    pub fn cameras(&self) -> Vec<(String, MatrixProjection)> {
        vec![
            ("scene".to_string(), self.projection()),
            ("pitch 45".to_string(), self.tilted(45.0, 0.0)),
            ("pitch 60 bearing 30".to_string(), self.tilted(60.0, 30.0)),
        ]
    }

    /// Register resources (in order, so handles match the fixture indices)
    /// and add every sprite with its images.
    pub fn populate(&self, engine: &mut SpriteEngine) {
        for res in &self.resources {
            let handle = engine
                .register_resource(res.width, res.height)
                .expect("resource");
            if res.ready {
                engine.mark_resource_ready(handle, AtlasRegion::default());
            }
        }
        for sprite in &self.sprites {
            let handle = engine
                .add_sprite(&sprite.id, &sprite.def)
                .expect("add scene sprite");
            for image in &sprite.images {
                engine
                    .attach_image(handle, ImageKey::new(image.sub_layer, image.order), &image.def)
                    .expect("attach scene image");
            }
        }
    }

    pub fn engine(&self, cfg: Config) -> SpriteEngine {
        let mut engine = SpriteEngine::new(cfg);
        self.populate(&mut engine);
        engine
    }
}

pub fn config(name: &str) -> Config {
    let json = spritemap_test_fixtures::configs::json(name)
        .unwrap_or_else(|err| panic!("config fixture {name}: {err:#}"));
    Config::from_json_str(&json).expect("fixture config should validate")
}

pub fn approx(a: f64, b: f64, eps: f64) {
    assert!(
        (a - b).abs() <= eps,
        "approx failed: left={a} right={b} eps={eps}"
    );
}
