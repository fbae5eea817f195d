//! Interpolation batch codecs.

use super::cursor::{BufferReader, BufferWriter, Result};
use super::*;
use crate::error::ProtocolError;
use crate::geo::SpriteLocation;
use crate::interp::{
    Degrees, Easing, Evaluation, InterpolationBatch, InterpolationBatchResult, InterpolationState,
};

/// Slot-level view of one value kind.
trait Slots: Sized {
    const WIDTH: usize;
    fn write(&self, w: &mut BufferWriter<'_>) -> Result<()>;
    fn read(r: &mut BufferReader<'_>) -> Result<Self>;
}

impl Slots for f64 {
    const WIDTH: usize = 1;

    fn write(&self, w: &mut BufferWriter<'_>) -> Result<()> {
        w.push(*self)
    }

    fn read(r: &mut BufferReader<'_>) -> Result<Self> {
        r.read()
    }
}

impl Slots for Degrees {
    const WIDTH: usize = 1;

    fn write(&self, w: &mut BufferWriter<'_>) -> Result<()> {
        w.push(self.0)
    }

    fn read(r: &mut BufferReader<'_>) -> Result<Self> {
        r.read().map(Degrees)
    }
}

impl Slots for SpriteLocation {
    const WIDTH: usize = 4;

    fn write(&self, w: &mut BufferWriter<'_>) -> Result<()> {
        w.push_slice(&[self.lng, self.lat, self.z.unwrap_or(0.0)])?;
        w.push_bool(self.z.is_some())
    }

    fn read(r: &mut BufferReader<'_>) -> Result<Self> {
        let [lng, lat, z] = r.read_array::<3>()?;
        let has_z = r.read_bool()?;
        Ok(SpriteLocation {
            lng,
            lat,
            z: has_z.then_some(z),
        })
    }
}

fn write_state<T: Slots>(w: &mut BufferWriter<'_>, s: &InterpolationState<T>) -> Result<()> {
    w.push(s.duration_ms)?;
    s.from.write(w)?;
    s.path_target.write(w)?;
    s.final_value.write(w)?;
    w.push(s.start_ms.unwrap_or(cursor::UNSET_TIME))?;
    w.push(s.easing.preset_id() as f64)?;
    w.push_slice(&s.easing.params())
}

fn read_state<T: Slots>(r: &mut BufferReader<'_>) -> Result<InterpolationState<T>> {
    let duration_ms = r.read()?;
    let from = T::read(r)?;
    let path_target = T::read(r)?;
    let final_value = T::read(r)?;
    let start_ms = r.read_optional_time()?;
    let preset = r.read_i32("easing_preset")?;
    let params = r.read_array::<3>()?;
    Ok(InterpolationState {
        from,
        path_target,
        final_value,
        start_ms,
        duration_ms,
        easing: Easing::from_preset(preset, params),
    })
}

fn write_evaluation<T: Slots>(w: &mut BufferWriter<'_>, e: &Evaluation<T>) -> Result<()> {
    e.value.write(w)?;
    w.push_bool(e.completed)?;
    w.push(e.effective_start_ms)
}

fn read_evaluation<T: Slots>(r: &mut BufferReader<'_>) -> Result<Evaluation<T>> {
    let value = T::read(r)?;
    let completed = r.read_bool()?;
    let effective_start_ms = r.read()?;
    Ok(Evaluation {
        value,
        completed,
        effective_start_ms,
    })
}

const _: () = {
    assert!(SCALAR_ITEM_LENGTH == 6 + 3 * <f64 as Slots>::WIDTH);
    assert!(LOCATION_ITEM_LENGTH == 6 + 3 * <SpriteLocation as Slots>::WIDTH);
    assert!(SCALAR_RESULT_LENGTH == 2 + <f64 as Slots>::WIDTH);
    assert!(LOCATION_RESULT_LENGTH == 2 + <SpriteLocation as Slots>::WIDTH);
};

struct Header {
    timestamp_ms: f64,
    scalars: usize,
    degrees: usize,
    locations: usize,
}

fn write_header(w: &mut BufferWriter<'_>, timestamp_ms: f64, counts: [usize; 3]) -> Result<()> {
    w.push_u32(PROTOCOL_VERSION)?;
    w.push(timestamp_ms)?;
    for count in counts {
        w.push_count(count)?;
    }
    Ok(())
}

fn read_header(r: &mut BufferReader<'_>) -> Result<Header> {
    expect_version(r)?;
    Ok(Header {
        timestamp_ms: r.read()?,
        scalars: r.read_count("scalar_count")?,
        degrees: r.read_count("degree_count")?,
        locations: r.read_count("location_count")?,
    })
}

fn check_available(needed: usize, available: usize) -> Result<()> {
    if needed > available {
        return Err(ProtocolError::Truncated { needed, available });
    }
    Ok(())
}

pub fn encode_interpolation_batch(batch: &InterpolationBatch, buf: &mut [f64]) -> Result<usize> {
    let counts = [batch.scalars.len(), batch.degrees.len(), batch.locations.len()];
    let total = interpolation_input_len(counts[0], counts[1], counts[2]);
    let mut w = BufferWriter::new(buf);
    write_header(&mut w, batch.timestamp_ms, counts)?;
    for s in &batch.scalars {
        write_state(&mut w, s)?;
    }
    for s in &batch.degrees {
        write_state(&mut w, s)?;
    }
    for s in &batch.locations {
        write_state(&mut w, s)?;
    }
    w.finish(total)
}

pub fn decode_interpolation_batch(buf: &[f64]) -> Result<InterpolationBatch> {
    let mut r = BufferReader::new(buf);
    let h = read_header(&mut r)?;
    check_available(
        interpolation_input_len(h.scalars, h.degrees, h.locations),
        buf.len(),
    )?;
    Ok(InterpolationBatch {
        timestamp_ms: h.timestamp_ms,
        scalars: (0..h.scalars)
            .map(|_| read_state(&mut r))
            .collect::<Result<_>>()?,
        degrees: (0..h.degrees)
            .map(|_| read_state(&mut r))
            .collect::<Result<_>>()?,
        locations: (0..h.locations)
            .map(|_| read_state(&mut r))
            .collect::<Result<_>>()?,
    })
}

pub fn encode_interpolation_result(
    result: &InterpolationBatchResult,
    timestamp_ms: f64,
    buf: &mut [f64],
) -> Result<usize> {
    let counts = [
        result.scalars.len(),
        result.degrees.len(),
        result.locations.len(),
    ];
    let total = interpolation_result_len(counts[0], counts[1], counts[2]);
    let mut w = BufferWriter::new(buf);
    write_header(&mut w, timestamp_ms, counts)?;
    for e in &result.scalars {
        write_evaluation(&mut w, e)?;
    }
    for e in &result.degrees {
        write_evaluation(&mut w, e)?;
    }
    for e in &result.locations {
        write_evaluation(&mut w, e)?;
    }
    w.finish(total)
}

/// Decode results for `batch`; the per-kind counts must match it exactly.
pub fn decode_interpolation_result(
    buf: &[f64],
    batch: &InterpolationBatch,
) -> Result<InterpolationBatchResult> {
    let mut r = BufferReader::new(buf);
    let h = read_header(&mut r)?;
    for (field, expected, found) in [
        ("scalar_count", batch.scalars.len(), h.scalars),
        ("degree_count", batch.degrees.len(), h.degrees),
        ("location_count", batch.locations.len(), h.locations),
    ] {
        if expected != found {
            return Err(ProtocolError::LayoutMismatch {
                field,
                expected,
                found,
            });
        }
    }
    check_available(
        interpolation_result_len(h.scalars, h.degrees, h.locations),
        buf.len(),
    )?;
    Ok(InterpolationBatchResult {
        scalars: (0..h.scalars)
            .map(|_| read_evaluation(&mut r))
            .collect::<Result<_>>()?,
        degrees: (0..h.degrees)
            .map(|_| read_evaluation(&mut r))
            .collect::<Result<_>>()?,
        locations: (0..h.locations)
            .map(|_| read_evaluation(&mut r))
            .collect::<Result<_>>()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::{evaluate_batch, EasingMode};

    fn batch() -> InterpolationBatch {
        let mut batch = InterpolationBatch::new(40.0);
        batch.scalars.push(InterpolationState {
            from: 0.0,
            path_target: 10.0,
            final_value: 10.0,
            start_ms: None,
            duration_ms: 100.0,
            easing: Easing::Cubic {
                mode: EasingMode::Out,
            },
        });
        batch.degrees.push(InterpolationState {
            from: Degrees(350.0),
            path_target: Degrees(370.0),
            final_value: Degrees(10.0),
            start_ms: Some(0.0),
            duration_ms: 100.0,
            easing: Easing::Linear,
        });
        batch.locations.push(InterpolationState {
            from: SpriteLocation::with_z(1.0, 2.0, 3.0),
            path_target: SpriteLocation::new(4.0, 5.0),
            final_value: SpriteLocation::new(4.0, 5.0),
            start_ms: Some(10.0),
            duration_ms: 50.0,
            easing: Easing::Back { overshoot: 2.0 },
        });
        batch
    }

    #[test]
    fn batch_survives_the_buffer() {
        let batch = batch();
        let mut buf = vec![0.0; interpolation_input_len(1, 1, 1)];
        encode_interpolation_batch(&batch, &mut buf).expect("encode");
        assert_eq!(decode_interpolation_batch(&buf).expect("decode"), batch);
    }

    #[test]
    fn result_counts_must_match_the_batch() {
        let batch = batch();
        let result = evaluate_batch(&batch);
        let mut buf = vec![0.0; interpolation_result_len(1, 1, 1)];
        encode_interpolation_result(&result, batch.timestamp_ms, &mut buf).expect("encode");
        assert_eq!(
            decode_interpolation_result(&buf, &batch).expect("decode"),
            result
        );

        let mut other = batch.clone();
        other.scalars.clear();
        assert!(matches!(
            decode_interpolation_result(&buf, &other),
            Err(ProtocolError::LayoutMismatch {
                field: "scalar_count",
                ..
            })
        ));
    }

    #[test]
    fn negative_start_time_survives_the_buffer() {
        let mut batch = batch();
        batch.timestamp_ms = -40.0;
        batch.scalars[0].start_ms = Some(-120.0);
        let mut buf = vec![0.0; interpolation_input_len(1, 1, 1)];
        encode_interpolation_batch(&batch, &mut buf).expect("encode");
        let decoded = decode_interpolation_batch(&buf).expect("decode");
        assert_eq!(decoded.scalars[0].start_ms, Some(-120.0));
        assert_eq!(decoded.degrees[0].start_ms, Some(0.0));
        assert_eq!(decoded, batch);
    }

    #[test]
    fn truncated_batch_is_rejected() {
        let batch = batch();
        let mut buf = vec![0.0; interpolation_input_len(1, 1, 1)];
        encode_interpolation_batch(&batch, &mut buf).expect("encode");
        assert!(matches!(
            decode_interpolation_batch(&buf[..buf.len() - 2]),
            Err(ProtocolError::Truncated { .. })
        ));
    }
}
