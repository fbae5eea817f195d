//! Easing presets.
//!
//! Preset ids and the meaning of their three parameters are part of the
//! compute-module ABI: an `Easing` crosses the buffer boundary as
//! `(preset_id, p0, p1, p2)` and is rebuilt on the other side with
//! `Easing::from_preset`.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

pub const PRESET_LINEAR: i32 = 0;
pub const PRESET_EASE: i32 = 1;
pub const PRESET_EXPONENTIAL: i32 = 4;
pub const PRESET_QUADRATIC: i32 = 5;
pub const PRESET_CUBIC: i32 = 6;
pub const PRESET_SINE: i32 = 7;
pub const PRESET_BOUNCE: i32 = 8;
pub const PRESET_BACK: i32 = 9;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EasingMode {
    In,
    Out,
    #[default]
    InOut,
}

impl EasingMode {
    /// 1 = in, 2 = out, anything else = in-out.
    pub fn from_code(code: f64) -> Self {
        if code == 1.0 {
            EasingMode::In
        } else if code == 2.0 {
            EasingMode::Out
        } else {
            EasingMode::InOut
        }
    }

    pub fn code(self) -> f64 {
        match self {
            EasingMode::In => 1.0,
            EasingMode::Out => 2.0,
            EasingMode::InOut => 0.0,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Easing {
    #[default]
    Linear,
    Ease {
        power: f64,
        mode: EasingMode,
    },
    Exponential {
        exponent: f64,
        mode: EasingMode,
    },
    Quadratic {
        mode: EasingMode,
    },
    Cubic {
        mode: EasingMode,
    },
    Sine {
        mode: EasingMode,
        amplitude: f64,
    },
    Bounce {
        bounces: f64,
        decay: f64,
    },
    Back {
        overshoot: f64,
    },
}

impl Easing {
    pub fn preset_id(&self) -> i32 {
        match self {
            Easing::Linear => PRESET_LINEAR,
            Easing::Ease { .. } => PRESET_EASE,
            Easing::Exponential { .. } => PRESET_EXPONENTIAL,
            Easing::Quadratic { .. } => PRESET_QUADRATIC,
            Easing::Cubic { .. } => PRESET_CUBIC,
            Easing::Sine { .. } => PRESET_SINE,
            Easing::Bounce { .. } => PRESET_BOUNCE,
            Easing::Back { .. } => PRESET_BACK,
        }
    }

    pub fn params(&self) -> [f64; 3] {
        match *self {
            Easing::Linear => [0.0; 3],
            Easing::Ease { power, mode } => [power, mode.code(), 0.0],
            Easing::Exponential { exponent, mode } => [exponent, mode.code(), 0.0],
            Easing::Quadratic { mode } | Easing::Cubic { mode } => [mode.code(), 0.0, 0.0],
            Easing::Sine { mode, amplitude } => [mode.code(), amplitude, 0.0],
            Easing::Bounce { bounces, decay } => [bounces, decay, 0.0],
            Easing::Back { overshoot } => [overshoot, 0.0, 0.0],
        }
    }

    /// Rebuild from the wire form. Unknown ids fall back to linear.
    pub fn from_preset(id: i32, params: [f64; 3]) -> Self {
        let [p0, p1, _] = params;
        match id {
            PRESET_EASE => Easing::Ease {
                power: p0,
                mode: EasingMode::from_code(p1),
            },
            PRESET_EXPONENTIAL => Easing::Exponential {
                exponent: p0,
                mode: EasingMode::from_code(p1),
            },
            PRESET_QUADRATIC => Easing::Quadratic {
                mode: EasingMode::from_code(p0),
            },
            PRESET_CUBIC => Easing::Cubic {
                mode: EasingMode::from_code(p0),
            },
            PRESET_SINE => Easing::Sine {
                mode: EasingMode::from_code(p0),
                amplitude: p1,
            },
            PRESET_BOUNCE => Easing::Bounce {
                bounces: p0,
                decay: p1,
            },
            PRESET_BACK => Easing::Back { overshoot: p0 },
            _ => Easing::Linear,
        }
    }

    /// Map raw progress to eased progress. The input is clamped to [0, 1]
    /// (non-finite counts as finished); the output is not, so `Back` and
    /// `Sine` with a large amplitude may overshoot.
    pub fn apply(&self, progress: f64) -> f64 {
        let t = clamp01(progress);
        match *self {
            Easing::Linear => t,
            Easing::Ease { power, mode } => {
                let power = if power > 0.0 { power } else { 3.0 };
                in_out(t, mode, |x| x.powf(power))
            }
            Easing::Exponential { exponent, mode } => {
                let exponent = if exponent > 0.0 { exponent } else { 5.0 };
                exponential(t, exponent, mode)
            }
            Easing::Quadratic { mode } => in_out(t, mode, |x| x * x),
            Easing::Cubic { mode } => in_out(t, mode, |x| x * x * x),
            Easing::Sine { mode, amplitude } => {
                let amplitude = if amplitude > 0.0 { amplitude } else { 1.0 };
                match mode {
                    EasingMode::In => amplitude * (1.0 - (PI / 2.0 * t).cos()),
                    EasingMode::Out => amplitude * (PI / 2.0 * t).sin(),
                    EasingMode::InOut => amplitude * 0.5 * (1.0 - (PI * t).cos()),
                }
            }
            Easing::Bounce { bounces, decay } => {
                let bounces = (if bounces > 0.0 { bounces } else { 3.0 }).round().max(1.0);
                let decay = if decay <= 0.0 { 0.5 } else { decay.min(1.0) };
                let oscillation = (PI * (bounces + 0.5) * t).cos();
                1.0 - oscillation.abs() * decay.powf(t * bounces)
            }
            Easing::Back { overshoot } => {
                let s = if overshoot.is_finite() && overshoot != 0.0 {
                    overshoot
                } else {
                    1.70158
                };
                let p = t - 1.0;
                1.0 + (s + 1.0) * p * p * p + s * p * p
            }
        }
    }
}

#[inline]
fn clamp01(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        1.0
    }
}

/// Build in/out/in-out variants from an "in" curve.
#[inline]
fn in_out(t: f64, mode: EasingMode, ease_in: impl Fn(f64) -> f64) -> f64 {
    match mode {
        EasingMode::In => ease_in(t),
        EasingMode::Out => 1.0 - ease_in(1.0 - t),
        EasingMode::InOut => {
            if t < 0.5 {
                0.5 * ease_in(t * 2.0)
            } else {
                1.0 - 0.5 * ease_in(2.0 - t * 2.0)
            }
        }
    }
}

fn exponential(t: f64, exponent: f64, mode: EasingMode) -> f64 {
    let denom = exponent.exp_m1();
    let exp_in = |v: f64| {
        if v == 0.0 || v == 1.0 {
            v
        } else {
            (exponent * v).exp_m1() / denom
        }
    };
    let exp_out = |v: f64| {
        if v == 0.0 || v == 1.0 {
            v
        } else {
            1.0 - (exponent * (1.0 - v)).exp_m1() / denom
        }
    };
    match mode {
        EasingMode::In => exp_in(t),
        EasingMode::Out => exp_out(t),
        EasingMode::InOut => {
            if t < 0.5 {
                0.5 * exp_in(t * 2.0)
            } else {
                0.5 + 0.5 * exp_out(t * 2.0 - 1.0)
            }
        }
    }
}
