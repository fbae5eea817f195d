mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::Scene;
use spritemap_core::protocol::{
    decode_frame_input, decode_interpolation_batch, decode_prepared_frame, result_capacity,
};
use spritemap_core::{
    process_frame_buffers, process_interpolation_buffers, ComputeModule, Config, ImageKey,
    InProcessModule, InterpolationOptions, ModuleError, ProtocolError, SpriteEngine,
    PROTOCOL_VERSION,
};

#[derive(Default)]
struct Captured {
    frame: Option<Vec<f64>>,
    interpolations: Option<Vec<f64>>,
}

/// Keeps a copy of the last input buffer of each kind.
struct Recording {
    inner: InProcessModule,
    seen: Rc<RefCell<Captured>>,
}

impl ComputeModule for Recording {
    fn process_interpolations(
        &mut self,
        input: &[f64],
        output: &mut [f64],
    ) -> Result<(), ModuleError> {
        self.seen.borrow_mut().interpolations = Some(input.to_vec());
        self.inner.process_interpolations(input, output)
    }

    fn process_frame(&mut self, input: &[f64], output: &mut [f64]) -> Result<(), ModuleError> {
        self.seen.borrow_mut().frame = Some(input.to_vec());
        self.inner.process_frame(input, output)
    }
}

/// Run one animated frame of the mixed scene and return the buffers the
/// module received along with the engine's output.
fn capture() -> (Vec<f64>, Vec<f64>, spritemap_core::FrameOutput) {
    let scene = Scene::load("mixed-placement");
    let proj = scene.projection();
    let seen = Rc::new(RefCell::new(Captured::default()));
    let module = Recording {
        inner: InProcessModule::default(),
        seen: seen.clone(),
    };
    let mut engine = SpriteEngine::with_module(Config::default(), module);
    scene.populate(&mut engine);

    let marker = engine.sprite_handle("marker").expect("marker");
    let key = ImageKey::new(0, 0);
    engine
        .render_mut()
        .store_mut()
        .image_mut(marker, key)
        .expect("image")
        .opacity_interpolation = Some(InterpolationOptions::new(100.0));
    engine.set_image_opacity(marker, key, 0.5).expect("opacity");

    let out = engine.process_frame(&proj, 10.0);
    let captured = seen.take();
    (
        captured.frame.expect("frame buffer"),
        captured.interpolations.expect("interpolation buffer"),
        out,
    )
}

/// it should reproduce the engine's draw items from the raw buffers
#[test]
fn kernel_reproduces_engine_output() {
    let (frame, _, out) = capture();
    let input = decode_frame_input(&frame).expect("decode input");
    let mut result = vec![0.0; result_capacity(input.items.len())];
    let written = process_frame_buffers(&frame, &mut result).expect("kernel");
    assert!(written <= result.len());

    let prepared = decode_prepared_frame(&result, &input).expect("decode result");
    assert_eq!(prepared.items, out.items);
}

/// it should refuse buffers from another protocol version
#[test]
fn version_mismatch_is_rejected() {
    let (mut frame, mut interp, _) = capture();
    let mut out = vec![0.0; 4096];

    frame[0] = PROTOCOL_VERSION as f64 + 1.0;
    assert_eq!(
        process_frame_buffers(&frame, &mut out),
        Err(ProtocolError::VersionMismatch {
            expected: PROTOCOL_VERSION,
            found: PROTOCOL_VERSION as f64 + 1.0,
        })
    );

    interp[0] = 0.0;
    assert!(matches!(
        process_interpolation_buffers(&interp, &mut out),
        Err(ProtocolError::VersionMismatch { .. })
    ));
}

/// it should refuse buffers shorter than their header declares
#[test]
fn truncation_is_rejected() {
    let (frame, interp, _) = capture();
    let mut out = vec![0.0; 4096];

    let short = &frame[..frame.len() - 1];
    assert!(matches!(
        process_frame_buffers(short, &mut out),
        Err(ProtocolError::Truncated { .. })
    ));

    let short = &interp[..interp.len() - 1];
    assert!(matches!(
        process_interpolation_buffers(short, &mut out),
        Err(ProtocolError::Truncated { .. })
    ));
    assert!(decode_interpolation_batch(&interp).is_ok());
}

/// it should refuse indices pointing outside the frame tables
#[test]
fn dangling_sprite_index_is_rejected() {
    let (mut frame, _, _) = capture();
    let item_offset = frame[9] as usize;
    let sprite_count = frame[6];
    frame[item_offset] = sprite_count;

    let mut out = vec![0.0; 4096];
    assert!(matches!(
        process_frame_buffers(&frame, &mut out),
        Err(ProtocolError::InvalidIndex {
            field: "sprite_index",
            ..
        })
    ));
}

/// it should refuse an output buffer that cannot hold the result
#[test]
fn small_output_buffer_overflows() {
    let (frame, _, _) = capture();
    let mut out = vec![0.0; 16];
    assert!(matches!(
        process_frame_buffers(&frame, &mut out),
        Err(ProtocolError::Overflow { .. })
    ));
}
