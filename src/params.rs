use nih_plug::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::settings::{ChainSettings, Slope};

#[derive(Params)]
pub struct EqParams {
    /// Set by every parameter change, cleared by whoever redraws the response curve.
    pub params_changed: Arc<AtomicBool>,

    // Peak band 1
    #[id = "peak1_freq"]
    pub peak1_freq: FloatParam,
    #[id = "peak1_gain"]
    pub peak1_gain: FloatParam,
    #[id = "peak1_q"]
    pub peak1_q: FloatParam,

    // Peak band 2
    #[id = "peak2_freq"]
    pub peak2_freq: FloatParam,
    #[id = "peak2_gain"]
    pub peak2_gain: FloatParam,
    #[id = "peak2_q"]
    pub peak2_q: FloatParam,

    // Cut filters
    #[id = "low_cut_freq"]
    pub low_cut_freq: FloatParam,
    #[id = "low_cut_slope"]
    pub low_cut_slope: EnumParam<Slope>,
    #[id = "high_cut_freq"]
    pub high_cut_freq: FloatParam,
    #[id = "high_cut_slope"]
    pub high_cut_slope: EnumParam<Slope>,

    #[id = "output_gain"]
    pub output_gain: FloatParam,
    #[id = "bypass"]
    pub bypass: BoolParam,
}

fn frequency_param(
    name: &str,
    default: f32,
    min: f32,
    max: f32,
    params_changed: &Arc<AtomicBool>,
) -> FloatParam {
    FloatParam::new(
        name,
        default,
        FloatRange::Skewed {
            min,
            max,
            factor: FloatRange::skew_factor(-1.0),
        },
    )
    .with_step_size(0.1)
    .with_unit(" Hz")
    .with_value_to_string(formatters::v2s_f32_rounded(1))
    .with_callback(mark_changed(params_changed))
}

fn gain_param(name: &str, range: f32, params_changed: &Arc<AtomicBool>) -> FloatParam {
    FloatParam::new(
        name,
        0.0,
        FloatRange::Linear {
            min: -range,
            max: range,
        },
    )
    .with_step_size(0.1)
    .with_unit(" dB")
    .with_value_to_string(formatters::v2s_f32_rounded(1))
    .with_callback(mark_changed(params_changed))
}

fn quality_param(name: &str, params_changed: &Arc<AtomicBool>) -> FloatParam {
    FloatParam::new(name, 0.5, FloatRange::Linear { min: 0.5, max: 5.0 })
        .with_step_size(0.05)
        .with_value_to_string(formatters::v2s_f32_rounded(2))
        .with_callback(mark_changed(params_changed))
}

fn slope_param(name: &str, params_changed: &Arc<AtomicBool>) -> EnumParam<Slope> {
    let params_changed = params_changed.clone();
    EnumParam::new(name, Slope::Db12).with_callback(Arc::new(move |_: Slope| {
        params_changed.store(true, Ordering::Release);
    }))
}

fn mark_changed(params_changed: &Arc<AtomicBool>) -> Arc<dyn Fn(f32) + Send + Sync> {
    let params_changed = params_changed.clone();
    Arc::new(move |_: f32| params_changed.store(true, Ordering::Release))
}

impl Default for EqParams {
    fn default() -> Self {
        let params_changed = Arc::new(AtomicBool::new(true));

        Self {
            peak1_freq: frequency_param("Peak 1 Frequency", 500.0, 500.0, 5000.0, &params_changed),
            peak1_gain: gain_param("Peak 1 Gain", 18.0, &params_changed),
            peak1_q: quality_param("Peak 1 Quality", &params_changed),

            peak2_freq: frequency_param(
                "Peak 2 Frequency",
                5000.0,
                5000.0,
                10000.0,
                &params_changed,
            ),
            peak2_gain: gain_param("Peak 2 Gain", 18.0, &params_changed),
            peak2_q: quality_param("Peak 2 Quality", &params_changed),

            low_cut_freq: frequency_param("Low Cut Frequency", 20.0, 20.0, 500.0, &params_changed),
            low_cut_slope: slope_param("Low Cut Slope", &params_changed),
            high_cut_freq: frequency_param(
                "High Cut Frequency",
                20000.0,
                2000.0,
                20000.0,
                &params_changed,
            ),
            high_cut_slope: slope_param("High Cut Slope", &params_changed),

            output_gain: gain_param("Output Gain", 24.0, &params_changed),
            bypass: BoolParam::new("Bypass", false)
                .with_callback({
                    let params_changed = params_changed.clone();
                    Arc::new(move |_: bool| params_changed.store(true, Ordering::Release))
                })
                .make_bypass(),

            params_changed,
        }
    }
}

impl EqParams {
    /// Reads every parameter once. Each load is atomic on its own, so a snapshot taken while the
    /// host is automating can mix old and new values. The engine copes with that.
    pub fn snapshot(&self) -> ChainSettings {
        ChainSettings {
            peak1_frequency: self.peak1_freq.value(),
            peak1_gain_db: self.peak1_gain.value(),
            peak1_quality: self.peak1_q.value(),
            peak2_frequency: self.peak2_freq.value(),
            peak2_gain_db: self.peak2_gain.value(),
            peak2_quality: self.peak2_q.value(),
            low_cut_frequency: self.low_cut_freq.value(),
            high_cut_frequency: self.high_cut_freq.value(),
            low_cut_slope: self.low_cut_slope.value(),
            high_cut_slope: self.high_cut_slope.value(),
            output_gain_db: self.output_gain.value(),
            bypass: self.bypass.value(),
        }
    }
}
