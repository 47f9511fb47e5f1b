//! Coefficient design for the bell and cut filters.
//!
//! Everything in here is a pure function of its arguments. Out-of-range input never fails, it
//! degrades to pass-through sections so the audio stream keeps running.

use biquad::Coefficients;
use std::f64::consts::PI;

/// A band filter holds at most this many second-order sections, enough for 48 dB/oct.
pub const MAX_SECTIONS: usize = 4;

/// Lower bound applied to the bell filter's quality factor.
pub const MIN_QUALITY: f32 = 1.0e-3;

/// Coefficients that pass the signal through unchanged.
pub fn identity() -> Coefficients<f32> {
    Coefficients {
        a1: 0.0,
        a2: 0.0,
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
    }
}

/// The sections of a cascaded cut filter, in the order they have to be applied.
#[derive(Debug, Clone, Copy)]
pub struct CascadeDesign {
    sections: [Coefficients<f32>; MAX_SECTIONS],
    len: usize,
}

impl CascadeDesign {
    pub fn empty() -> Self {
        Self {
            sections: [identity(); MAX_SECTIONS],
            len: 0,
        }
    }

    fn push(&mut self, section: Coefficients<f32>) {
        if self.len < MAX_SECTIONS {
            self.sections[self.len] = section;
            self.len += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[Coefficients<f32>] {
        &self.sections[..self.len]
    }
}

#[derive(Debug, Clone, Copy)]
enum CutShape {
    Highpass,
    Lowpass,
}

fn below_nyquist(freq: f32, sample_rate: f32) -> bool {
    freq.is_finite()
        && sample_rate.is_finite()
        && freq > 0.0
        && sample_rate > 0.0
        && freq < sample_rate * 0.5
}

fn normalize(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> Coefficients<f32> {
    Coefficients {
        a1: (a1 / a0) as f32,
        a2: (a2 / a0) as f32,
        b0: (b0 / a0) as f32,
        b1: (b1 / a0) as f32,
        b2: (b2 / a0) as f32,
    }
}

/// RBJ cookbook bell filter. Returns [`identity()`] when `freq` is not below Nyquist, callers are
/// expected to clamp the frequency first.
pub fn design_peak_filter(
    freq: f32,
    quality: f32,
    gain_db: f32,
    sample_rate: f32,
) -> Coefficients<f32> {
    if !below_nyquist(freq, sample_rate) || !gain_db.is_finite() {
        return identity();
    }

    let quality = if quality.is_finite() {
        quality.max(MIN_QUALITY)
    } else {
        MIN_QUALITY
    };

    // amplitude is the square root of the linear gain
    let amplitude = 10f64.powf(f64::from(gain_db) / 40.0);
    let omega = 2.0 * PI * f64::from(freq) / f64::from(sample_rate);
    let (sinw, cosw) = omega.sin_cos();
    let alpha = sinw / (2.0 * f64::from(quality));

    normalize(
        1.0 + alpha * amplitude,
        -2.0 * cosw,
        1.0 - alpha * amplitude,
        1.0 + alpha / amplitude,
        -2.0 * cosw,
        1.0 - alpha / amplitude,
    )
}

/// Butterworth high-pass of the given order, split into `order / 2` biquads.
pub fn design_highpass_butterworth(freq: f32, sample_rate: f32, order: usize) -> CascadeDesign {
    design_butterworth(CutShape::Highpass, freq, sample_rate, order)
}

/// Butterworth low-pass of the given order, split into `order / 2` biquads.
pub fn design_lowpass_butterworth(freq: f32, sample_rate: f32, order: usize) -> CascadeDesign {
    design_butterworth(CutShape::Lowpass, freq, sample_rate, order)
}

fn design_butterworth(
    shape: CutShape,
    freq: f32,
    sample_rate: f32,
    order: usize,
) -> CascadeDesign {
    // Only even orders up to 8 fit into a band filter
    let order = order.min(2 * MAX_SECTIONS) & !1;
    let valid = below_nyquist(freq, sample_rate);

    let mut design = CascadeDesign::empty();
    for i in 0..order / 2 {
        if !valid {
            design.push(identity());
            continue;
        }

        let angle = (2 * i + 1) as f64 * PI / (2 * order) as f64;
        let quality = 1.0 / (2.0 * angle.cos());
        design.push(second_order_section(shape, freq, sample_rate, quality));
    }

    design
}

fn second_order_section(
    shape: CutShape,
    freq: f32,
    sample_rate: f32,
    quality: f64,
) -> Coefficients<f32> {
    let omega = 2.0 * PI * f64::from(freq) / f64::from(sample_rate);
    let (sinw, cosw) = omega.sin_cos();
    let alpha = sinw / (2.0 * quality);

    let (b0, b1, b2) = match shape {
        CutShape::Lowpass => ((1.0 - cosw) / 2.0, 1.0 - cosw, (1.0 - cosw) / 2.0),
        CutShape::Highpass => ((1.0 + cosw) / 2.0, -(1.0 + cosw), (1.0 + cosw) / 2.0),
    };

    normalize(b0, b1, b2, 1.0 + alpha, -2.0 * cosw, 1.0 - alpha)
}
