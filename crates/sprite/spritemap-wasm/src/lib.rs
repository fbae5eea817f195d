use serde_wasm_bindgen as swb;
use wasm_bindgen::prelude::*;

use spritemap_core::geo::mercator_from_location;
use spritemap_core::projection::{
    perspective_ratio_with, project_with_pixel_matrix, unproject_with_inverse, Mat4,
};
use spritemap_core::protocol::{interpolation_result_len, result_capacity as frame_result_capacity};
use spritemap_core::{
    process_frame_buffers, process_interpolation_buffers, ComputeKernel, Config, ProtocolError,
    ScreenPoint, SpriteLocation, PROTOCOL_VERSION,
};

fn jsvalue_is_undefined_or_null(v: &JsValue) -> bool {
    v.is_undefined() || v.is_null()
}

fn protocol_error(call: &str, err: ProtocolError) -> JsError {
    JsError::new(&format!("{call}: {err}"))
}

fn read_matrix(name: &str, values: &[f64]) -> Result<Mat4, JsError> {
    values
        .try_into()
        .map_err(|_| JsError::new(&format!("{name} must have 16 elements, got {}", values.len())))
}

fn location(lng: f64, lat: f64, altitude: f64) -> SpriteLocation {
    SpriteLocation::with_z(lng, lat, altitude)
}

/// Protocol version the buffers of this module follow. Hosts compare it at init.
#[wasm_bindgen(js_name = abiVersion)]
pub fn abi_version() -> u32 {
    PROTOCOL_VERSION
}

/// Prepare a frame: decode `input`, write draw items into `output`.
/// Returns the number of slots written.
#[wasm_bindgen(js_name = processFrame)]
pub fn process_frame(input: &[f64], output: &mut [f64]) -> Result<usize, JsError> {
    process_frame_buffers(input, output).map_err(|e| protocol_error("processFrame", e))
}

/// Evaluate an interpolation batch into `output`. Returns the number of slots written.
#[wasm_bindgen(js_name = processInterpolations)]
pub fn process_interpolations(input: &[f64], output: &mut [f64]) -> Result<usize, JsError> {
    process_interpolation_buffers(input, output)
        .map_err(|e| protocol_error("processInterpolations", e))
}

/// Output slots `processFrame` may need for `items` input items.
#[wasm_bindgen(js_name = resultCapacity)]
pub fn result_capacity(items: usize) -> usize {
    frame_result_capacity(items)
}

#[wasm_bindgen(js_name = interpolationResultCapacity)]
pub fn interpolation_result_capacity(scalars: usize, degrees: usize, locations: usize) -> usize {
    interpolation_result_len(scalars, degrees, locations)
}

/// Mercator `[x, y, z]` of a location, or `undefined` for non-finite input.
#[wasm_bindgen(js_name = fromLngLat)]
pub fn from_lng_lat(lng: f64, lat: f64, altitude: f64) -> Option<Vec<f64>> {
    let m = mercator_from_location(&location(lng, lat, altitude));
    [m.x, m.y, m.z]
        .iter()
        .all(|v| v.is_finite())
        .then(|| vec![m.x, m.y, m.z])
}

/// Screen `[x, y]` through a pixel matrix, or `undefined` behind the camera.
#[wasm_bindgen]
pub fn project(
    lng: f64,
    lat: f64,
    altitude: f64,
    world_size: f64,
    pixel_matrix: &[f64],
) -> Result<Option<Vec<f64>>, JsError> {
    let m = read_matrix("pixel_matrix", pixel_matrix)?;
    Ok(project_with_pixel_matrix(&m, world_size, &location(lng, lat, altitude))
        .map(|p| vec![p.x, p.y]))
}

/// Ground `[lng, lat]` under a screen point, or `undefined` when the ray misses.
#[wasm_bindgen]
pub fn unproject(
    x: f64,
    y: f64,
    world_size: f64,
    pixel_matrix_inverse: &[f64],
) -> Result<Option<Vec<f64>>, JsError> {
    let m = read_matrix("pixel_matrix_inverse", pixel_matrix_inverse)?;
    Ok(unproject_with_inverse(&m, world_size, ScreenPoint::new(x, y))
        .map(|loc| vec![loc.lng, loc.lat]))
}

#[wasm_bindgen(js_name = calculatePerspectiveRatio)]
pub fn calculate_perspective_ratio(
    lng: f64,
    lat: f64,
    altitude: f64,
    camera_to_center_distance: f64,
    mercator_matrix: &[f64],
) -> Result<Option<f64>, JsError> {
    let m = read_matrix("mercator_matrix", mercator_matrix)?;
    Ok(perspective_ratio_with(
        &m,
        camera_to_center_distance,
        &location(lng, lat, altitude),
    ))
}

/// Kernel instance holding the worker pool configured from a JSON config.
#[wasm_bindgen]
pub struct SpritemapKernel {
    kernel: ComputeKernel,
}

#[wasm_bindgen]
impl SpritemapKernel {
    /// Pass a (partial) engine config object, or undefined/null for defaults.
    /// Only the `features` section affects the kernel.
    ///   new SpritemapKernel({ features: { thread_pool_size: 4 } })
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> Result<SpritemapKernel, JsError> {
        console_error_panic_hook::set_once();

        let cfg: Config = if jsvalue_is_undefined_or_null(&config) {
            Config::default()
        } else {
            swb::from_value(config).map_err(|e| JsError::new(&format!("config error: {e}")))?
        };
        cfg.validate()
            .map_err(|e| JsError::new(&format!("config error: {e}")))?;
        log::debug!("spritemap kernel features: {:?}", cfg.features);

        Ok(SpritemapKernel {
            kernel: ComputeKernel::new(cfg.features),
        })
    }

    /// Same as the constructor, from a JSON string.
    #[wasm_bindgen(js_name = fromJson)]
    pub fn from_json(json: &str) -> Result<SpritemapKernel, JsError> {
        console_error_panic_hook::set_once();
        let cfg = Config::from_json_str(json)
            .map_err(|e| JsError::new(&format!("config error: {e}")))?;
        Ok(SpritemapKernel {
            kernel: ComputeKernel::new(cfg.features),
        })
    }

    #[wasm_bindgen(js_name = threadCount)]
    pub fn thread_count(&self) -> usize {
        self.kernel.thread_count()
    }

    /// Resize the worker pool; a non-positive size means "hardware concurrency".
    #[wasm_bindgen(js_name = setThreadPoolSize)]
    pub fn set_thread_pool_size(&mut self, size: i32) {
        let size = usize::try_from(size).ok().filter(|n| *n > 0);
        self.kernel.set_thread_pool_size(size);
    }

    #[wasm_bindgen(js_name = processFrame)]
    pub fn process_frame(&self, input: &[f64], output: &mut [f64]) -> Result<usize, JsError> {
        self.kernel
            .process_frame(input, output)
            .map_err(|e| protocol_error("processFrame", e))
    }

    #[wasm_bindgen(js_name = processInterpolations)]
    pub fn process_interpolations(
        &self,
        input: &[f64],
        output: &mut [f64],
    ) -> Result<usize, JsError> {
        self.kernel
            .process_interpolations(input, output)
            .map_err(|e| protocol_error("processInterpolations", e))
    }

    /// Features in effect, as a JS object.
    pub fn features(&self) -> Result<JsValue, JsError> {
        swb::to_value(self.kernel.features())
            .map_err(|e| JsError::new(&format!("features error: {e}")))
    }
}
