//! Typed cursors over flat `f64` buffers. Every read and write is bounds
//! checked and reports a `ProtocolError` instead of panicking.

use crate::error::ProtocolError;

pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Sentinel for "no index".
pub const NONE_SLOT: f64 = -1.0;

/// Sentinel for "no timestamp". Any number is a valid timestamp, including
/// negative ones from clocks with an arbitrary origin.
pub const UNSET_TIME: f64 = f64::NAN;

/// Round a slot to a count: finite, non-negative, nearest integer.
pub fn slot_to_count(value: f64) -> Option<usize> {
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    let rounded = (value + 0.5).floor();
    if rounded > u32::MAX as f64 {
        return None;
    }
    Some(rounded as usize)
}

pub struct BufferWriter<'a> {
    buf: &'a mut [f64],
    pos: usize,
}

impl<'a> BufferWriter<'a> {
    pub fn new(buf: &'a mut [f64]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn at(buf: &'a mut [f64], pos: usize) -> Self {
        Self { buf, pos }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    fn claim(&mut self, n: usize) -> Result<&mut [f64]> {
        let end = self.pos + n;
        if end > self.buf.len() {
            return Err(ProtocolError::Overflow {
                needed: end,
                capacity: self.buf.len(),
            });
        }
        let slots = &mut self.buf[self.pos..end];
        self.pos = end;
        Ok(slots)
    }

    pub fn push(&mut self, value: f64) -> Result<()> {
        self.claim(1)?[0] = value;
        Ok(())
    }

    pub fn push_bool(&mut self, value: bool) -> Result<()> {
        self.push(if value { 1.0 } else { 0.0 })
    }

    pub fn push_u32(&mut self, value: u32) -> Result<()> {
        self.push(value as f64)
    }

    pub fn push_count(&mut self, value: usize) -> Result<()> {
        self.push(value as f64)
    }

    pub fn push_index(&mut self, value: Option<usize>) -> Result<()> {
        self.push(value.map_or(NONE_SLOT, |v| v as f64))
    }

    pub fn push_slice(&mut self, values: &[f64]) -> Result<()> {
        self.claim(values.len())?.copy_from_slice(values);
        Ok(())
    }

    /// Zero-fill `n` reserved slots.
    pub fn pad(&mut self, n: usize) -> Result<()> {
        self.claim(n)?.fill(0.0);
        Ok(())
    }

    /// Zero-fill up to `end` (a block boundary).
    pub fn pad_to(&mut self, end: usize) -> Result<()> {
        if end < self.pos {
            return Err(ProtocolError::LayoutMismatch {
                field: "block",
                expected: end,
                found: self.pos,
            });
        }
        self.pad(end - self.pos)
    }

    /// Check the writer ended exactly where the header said it would.
    pub fn finish(self, declared: usize) -> Result<usize> {
        if self.pos != declared {
            return Err(ProtocolError::LengthMismatch {
                declared,
                actual: self.pos,
            });
        }
        Ok(self.pos)
    }
}

pub struct BufferReader<'a> {
    buf: &'a [f64],
    pos: usize,
}

impl<'a> BufferReader<'a> {
    pub fn new(buf: &'a [f64]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn at(buf: &'a [f64], pos: usize) -> Self {
        Self { buf, pos }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    fn take(&mut self, n: usize) -> Result<&'a [f64]> {
        let end = self.pos + n;
        if end > self.buf.len() {
            return Err(ProtocolError::Truncated {
                needed: end,
                available: self.buf.len(),
            });
        }
        let buf: &'a [f64] = self.buf;
        let slots = &buf[self.pos..end];
        self.pos = end;
        Ok(slots)
    }

    pub fn read(&mut self) -> Result<f64> {
        Ok(self.take(1)?[0])
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[f64; N]> {
        let mut out = [0.0; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read()? != 0.0)
    }

    pub fn read_count(&mut self, field: &'static str) -> Result<usize> {
        let value = self.read()?;
        slot_to_count(value).ok_or(ProtocolError::InvalidCount { field, value })
    }

    pub fn read_u32(&mut self, field: &'static str) -> Result<u32> {
        // slot_to_count caps at u32::MAX.
        self.read_count(field).map(|v| v as u32)
    }

    pub fn read_i32(&mut self, field: &'static str) -> Result<i32> {
        let value = self.read()?;
        if !value.is_finite() || value < i32::MIN as f64 || value > i32::MAX as f64 {
            return Err(ProtocolError::InvalidCount { field, value });
        }
        Ok(value.round() as i32)
    }

    /// Index into a table of `len` entries.
    pub fn read_index(&mut self, field: &'static str, len: usize) -> Result<usize> {
        let value = self.read()?;
        match slot_to_count(value) {
            Some(index) if index < len => Ok(index),
            _ => Err(ProtocolError::InvalidIndex { field, value, len }),
        }
    }

    /// Like `read_index` but negative slots mean "none".
    pub fn read_optional_index(&mut self, field: &'static str, len: usize) -> Result<Option<usize>> {
        let value = self.read()?;
        if value.is_finite() && value < 0.0 {
            return Ok(None);
        }
        match slot_to_count(value) {
            Some(index) if index < len => Ok(Some(index)),
            _ => Err(ProtocolError::InvalidIndex { field, value, len }),
        }
    }

    /// Timestamp slot; NaN means unset.
    pub fn read_optional_time(&mut self) -> Result<Option<f64>> {
        let value = self.read()?;
        Ok((!value.is_nan()).then_some(value))
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    pub fn skip_to(&mut self, pos: usize) -> Result<()> {
        if pos < self.pos {
            return Err(ProtocolError::LayoutMismatch {
                field: "block",
                expected: pos,
                found: self.pos,
            });
        }
        self.skip(pos - self.pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_reports_overflow() {
        let mut buf = [0.0; 2];
        let mut w = BufferWriter::new(&mut buf);
        w.push(1.0).expect("fits");
        let err = w.push_slice(&[2.0, 3.0]).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::Overflow {
                needed: 3,
                capacity: 2
            }
        );
    }

    #[test]
    fn reader_reports_truncation() {
        let buf = [1.0];
        let mut r = BufferReader::new(&buf);
        assert!(r.read().is_ok());
        assert!(matches!(r.read(), Err(ProtocolError::Truncated { .. })));
    }

    #[test]
    fn counts_round_and_reject_garbage() {
        assert_eq!(slot_to_count(2.4), Some(2));
        assert_eq!(slot_to_count(2.5), Some(3));
        assert_eq!(slot_to_count(-1.0), None);
        assert_eq!(slot_to_count(f64::NAN), None);
        assert_eq!(slot_to_count(1e20), None);
    }

    #[test]
    fn optional_index_accepts_negative_as_none() {
        let buf = [-1.0, 1.0, 5.0];
        let mut r = BufferReader::new(&buf);
        assert_eq!(r.read_optional_index("origin", 3).expect("none"), None);
        assert_eq!(r.read_optional_index("origin", 3).expect("some"), Some(1));
        assert!(matches!(
            r.read_optional_index("origin", 3),
            Err(ProtocolError::InvalidIndex { .. })
        ));
    }

    #[test]
    fn negative_timestamps_are_not_unset() {
        let buf = [UNSET_TIME, -250.0, 0.0];
        let mut r = BufferReader::new(&buf);
        assert_eq!(r.read_optional_time().expect("unset"), None);
        assert_eq!(r.read_optional_time().expect("negative"), Some(-250.0));
        assert_eq!(r.read_optional_time().expect("zero"), Some(0.0));
    }

    #[test]
    fn finish_checks_declared_length() {
        let mut buf = [0.0; 4];
        let mut w = BufferWriter::new(&mut buf);
        w.pad(3).expect("pad");
        assert!(matches!(
            w.finish(4),
            Err(ProtocolError::LengthMismatch {
                declared: 4,
                actual: 3
            })
        ));
    }
}
