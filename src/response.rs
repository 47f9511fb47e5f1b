//! Magnitude response of a filter chain, for drawing the EQ curve.
//!
//! The audio thread is the only writer of coefficients. It publishes what it committed into a
//! [`PublishedChain`], and the GUI side reads that back through a [`CurveMonitor`] on its own
//! timer.

use atomic_float::AtomicF32;
use biquad::Coefficients;
use num_complex::Complex64;
use std::f64::consts::PI;
use std::sync::atomic::{fence, AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use crate::design::MAX_SECTIONS;
use crate::processor::ChannelChain;

/// Lowest frequency on the curve.
pub const MIN_FREQUENCY: f64 = 20.0;
/// The curve approaches but never reaches this frequency.
pub const MAX_FREQUENCY: f64 = 20000.0;

/// Low cut sections, both bells, high cut sections.
const CHAIN_STAGES: usize = 2 * MAX_SECTIONS + 2;

/// Frequency of the `index`-th of `width` points, spaced logarithmically from
/// [`MIN_FREQUENCY`] up towards [`MAX_FREQUENCY`].
pub fn curve_frequency(index: usize, width: usize) -> f64 {
    let position = index as f64 / width.max(1) as f64;
    MIN_FREQUENCY * (MAX_FREQUENCY / MIN_FREQUENCY).powf(position)
}

/// `20 * log10(magnitude)`. A zero in the response is reported as the smallest finite dB value a
/// positive `f64` gives instead of `-inf`.
pub fn magnitude_to_db(magnitude: f64) -> f32 {
    (20.0 * magnitude.max(f64::MIN_POSITIVE).log10()) as f32
}

/// Linear magnitude of a single section at `frequency`.
pub fn stage_magnitude(coefficients: &Coefficients<f32>, frequency: f64, sample_rate: f64) -> f64 {
    if sample_rate.is_nan() || sample_rate <= 0.0 {
        return 1.0;
    }

    let omega = 2.0 * PI * frequency / sample_rate;
    let z1 = Complex64::from_polar(1.0, -omega);
    let z2 = z1 * z1;

    let numerator = f64::from(coefficients.b0)
        + f64::from(coefficients.b1) * z1
        + f64::from(coefficients.b2) * z2;
    let denominator = 1.0 + f64::from(coefficients.a1) * z1 + f64::from(coefficients.a2) * z2;

    (numerator / denominator).norm()
}

/// Linear magnitude of the whole chain. Bypassed stages count as unity.
pub fn chain_magnitude(chain: &ChannelChain, frequency: f64, sample_rate: f64) -> f64 {
    chain
        .stages()
        .filter(|stage| stage.is_active())
        .map(|stage| stage_magnitude(&stage.coefficients(), frequency, sample_rate))
        .product()
}

/// The chain's response in dB at `width` log-spaced points. The iterator is lazy and can be
/// cloned to walk the curve again.
pub fn magnitude_curve(
    chain: &ChannelChain,
    sample_rate: f32,
    width: usize,
) -> impl ExactSizeIterator<Item = f32> + Clone + '_ {
    let sample_rate = f64::from(sample_rate);
    (0..width).map(move |index| {
        let magnitude = chain_magnitude(chain, curve_frequency(index, width), sample_rate);
        magnitude_to_db(magnitude)
    })
}

/// Coefficients and bypass flags committed by the audio thread, readable from any thread.
///
/// There must only ever be one writer. Readers spin on an odd sequence number and retry when it
/// changed while they were reading, so a snapshot is never a mix of two publishes.
pub struct PublishedChain {
    sequence: AtomicU32,
    sample_rate: AtomicF32,
    coefficients: [[AtomicF32; 5]; CHAIN_STAGES],
    active: [AtomicBool; CHAIN_STAGES],
}

impl PublishedChain {
    pub fn new() -> Self {
        let this = Self {
            sequence: AtomicU32::new(0),
            sample_rate: AtomicF32::new(44100.0),
            coefficients: std::array::from_fn(|_| std::array::from_fn(|_| AtomicF32::new(0.0))),
            active: std::array::from_fn(|_| AtomicBool::new(false)),
        };
        this.publish(&ChannelChain::new(), 44100.0);
        this
    }

    /// Stores the chain's current coefficients. Only call this from the audio thread.
    pub fn publish(&self, chain: &ChannelChain, sample_rate: f32) {
        let sequence = self.sequence.load(Ordering::Relaxed);
        self.sequence.store(sequence.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);

        for ((slot, active), stage) in self
            .coefficients
            .iter()
            .zip(self.active.iter())
            .zip(chain.stages())
        {
            let c = stage.coefficients();
            for (atomic, value) in slot.iter().zip([c.b0, c.b1, c.b2, c.a1, c.a2]) {
                atomic.store(value, Ordering::Relaxed);
            }
            active.store(stage.is_active(), Ordering::Relaxed);
        }
        self.sample_rate.store(sample_rate, Ordering::Relaxed);

        self.sequence.store(sequence.wrapping_add(2), Ordering::Release);
    }

    /// Number of completed publishes so far, times two.
    pub fn sequence(&self) -> u32 {
        self.sequence.load(Ordering::Acquire)
    }

    /// Reads a consistent copy of the last published chain together with its sample rate and
    /// sequence number. The copy has a clean history and is only meant for analysis.
    pub fn load(&self) -> (ChannelChain, f32, u32) {
        loop {
            let before = self.sequence.load(Ordering::Acquire);
            if before % 2 == 1 {
                std::hint::spin_loop();
                continue;
            }

            let mut coefficients = [crate::design::identity(); CHAIN_STAGES];
            let mut active = [false; CHAIN_STAGES];
            for (index, (slot, flag)) in self.coefficients.iter().zip(&self.active).enumerate() {
                coefficients[index] = Coefficients {
                    b0: slot[0].load(Ordering::Relaxed),
                    b1: slot[1].load(Ordering::Relaxed),
                    b2: slot[2].load(Ordering::Relaxed),
                    a1: slot[3].load(Ordering::Relaxed),
                    a2: slot[4].load(Ordering::Relaxed),
                };
                active[index] = flag.load(Ordering::Relaxed);
            }
            let sample_rate = self.sample_rate.load(Ordering::Relaxed);

            fence(Ordering::Acquire);
            if self.sequence.load(Ordering::Relaxed) != before {
                continue;
            }

            return (rebuild_chain(&coefficients, &active), sample_rate, before);
        }
    }
}

impl Default for PublishedChain {
    fn default() -> Self {
        Self::new()
    }
}

fn rebuild_chain(
    coefficients: &[Coefficients<f32>; CHAIN_STAGES],
    active: &[bool; CHAIN_STAGES],
) -> ChannelChain {
    let (low_cut, rest) = coefficients.split_at(MAX_SECTIONS);
    let (peaks, high_cut) = rest.split_at(2);
    let (low_active, rest_active) = active.split_at(MAX_SECTIONS);
    let high_active = &rest_active[2..];

    // Band filters only ever have their leading stages active
    let low_count = low_active.iter().take_while(|&&a| a).count();
    let high_count = high_active.iter().take_while(|&&a| a).count();

    let mut chain = ChannelChain::new();
    chain.apply_peak_coefficients(peaks[0], peaks[1]);
    chain.apply_cut_coefficients(&low_cut[..low_count], &high_cut[..high_count]);
    chain
}

/// Keeps the rendered EQ curve up to date from the GUI thread.
pub struct CurveMonitor {
    published: Arc<PublishedChain>,
    params_changed: Arc<AtomicBool>,
    seen_sequence: Option<u32>,
    width: usize,
    curve: Vec<f32>,
}

impl CurveMonitor {
    pub fn new(
        published: Arc<PublishedChain>,
        params_changed: Arc<AtomicBool>,
        width: usize,
    ) -> Self {
        Self {
            published,
            params_changed,
            seen_sequence: None,
            width,
            curve: Vec::with_capacity(width),
        }
    }

    /// Re-renders the curve if a parameter changed or the audio thread committed new
    /// coefficients since the last call. Returns whether the curve changed.
    pub fn poll(&mut self) -> bool {
        let params_changed = self
            .params_changed
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok();
        if !params_changed && self.seen_sequence == Some(self.published.sequence()) {
            return false;
        }

        let (chain, sample_rate, sequence) = self.published.load();
        self.curve.clear();
        self.curve.extend(magnitude_curve(&chain, sample_rate, self.width));
        self.seen_sequence = Some(sequence);

        true
    }

    /// Changes the number of points, the next poll renders at the new width.
    pub fn set_width(&mut self, width: usize) {
        if width != self.width {
            self.width = width;
            self.seen_sequence = None;
        }
    }

    pub fn curve(&self) -> &[f32] {
        &self.curve
    }
}
