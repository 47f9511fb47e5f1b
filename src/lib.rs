use nih_plug::prelude::*;
use std::sync::Arc;

pub mod design;
pub mod filter;
mod params;
pub mod processor;
pub mod response;
pub mod settings;

pub use params::EqParams;
use processor::EqualizerEngine;
use response::{CurveMonitor, PublishedChain};

/// Two bell bands between a low cut and a high cut, the same on both channels.
pub struct ParametricEq {
    // GUIやホストと共有するパラメーター
    params: Arc<EqParams>,

    engine: EqualizerEngine,
    /// The coefficients the audio thread last committed. This is the only thing the curve display
    /// reads, it never touches `engine` directly.
    published: Arc<PublishedChain>,
    /// Refresh count of the engine at the last publish.
    published_generation: u32,
}

impl Default for ParametricEq {
    fn default() -> Self {
        Self {
            params: Arc::new(EqParams::default()),

            engine: EqualizerEngine::new(),
            published: Arc::new(PublishedChain::new()),
            published_generation: 0,
        }
    }
}

impl ParametricEq {
    /// Creates a curve renderer that follows this instance. The plugin has no editor of its own,
    /// whatever embeds it polls the monitor at a low fixed rate from a non-audio thread.
    pub fn curve_monitor(&self, width: usize) -> CurveMonitor {
        CurveMonitor::new(
            self.published.clone(),
            self.params.params_changed.clone(),
            width,
        )
    }

    fn publish_if_refreshed(&mut self) {
        let generation = self.engine.generation();
        if generation != self.published_generation {
            self.published.publish(self.engine.left(), self.engine.sample_rate());
            self.published_generation = generation;
        }
    }
}

impl Plugin for ParametricEq {
    const NAME: &'static str = "Parametric EQ";
    const VENDOR: &'static str = "Kakeru3";
    const URL: &'static str = "";
    const EMAIL: &'static str = "";

    const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    const AUDIO_IO_LAYOUTS: &'static [AudioIOLayout] = &[AudioIOLayout {
        main_input_channels: NonZeroU32::new(2),
        main_output_channels: NonZeroU32::new(2),
        ..AudioIOLayout::const_default()
    }];

    // パラメーターはブロックの先頭で一度だけ読む
    const SAMPLE_ACCURATE_AUTOMATION: bool = false;

    type SysExMessage = ();
    type BackgroundTask = ();

    fn params(&self) -> Arc<dyn Params> {
        self.params.clone()
    }

    fn initialize(
        &mut self,
        _audio_io_layout: &AudioIOLayout,
        buffer_config: &BufferConfig,
        _context: &mut impl InitContext<Self>,
    ) -> bool {
        nih_log!(
            "preparing filters for {} Hz, up to {} samples per block",
            buffer_config.sample_rate,
            buffer_config.max_buffer_size
        );

        let settings = self.params.snapshot();
        self.engine.prepare(
            buffer_config.sample_rate,
            buffer_config.max_buffer_size as usize,
            &settings,
        );
        self.publish_if_refreshed();

        true
    }

    fn reset(&mut self) {
        self.engine.reset();
    }

    fn process(
        &mut self,
        buffer: &mut Buffer,
        _aux: &mut AuxiliaryBuffers,
        _context: &mut impl ProcessContext<Self>,
    ) -> ProcessStatus {
        let settings = self.params.snapshot();
        let channels = buffer.as_slice();

        // ステレオ以外のチャンネルは無音にする
        for extra in channels.iter_mut().skip(2) {
            extra.fill(0.0);
        }

        if let [left, right, ..] = channels {
            self.engine.process_block(&settings, left, right);
        }

        self.publish_if_refreshed();

        ProcessStatus::Normal
    }
}

impl ClapPlugin for ParametricEq {
    const CLAP_ID: &'static str = "com.kakeru3.parametric-eq";
    const CLAP_DESCRIPTION: Option<&'static str> =
        Some("Two band parametric EQ with Butterworth low and high cut");
    const CLAP_MANUAL_URL: Option<&'static str> = None;
    const CLAP_SUPPORT_URL: Option<&'static str> = None;
    const CLAP_FEATURES: &'static [ClapFeature] = &[
        ClapFeature::AudioEffect,
        ClapFeature::Stereo,
        ClapFeature::Equalizer,
    ];
}

impl Vst3Plugin for ParametricEq {
    const VST3_CLASS_ID: [u8; 16] = *b"ParametricEqKk3A";
    const VST3_SUBCATEGORIES: &'static [Vst3SubCategory] =
        &[Vst3SubCategory::Fx, Vst3SubCategory::Eq];
}

nih_export_clap!(ParametricEq);
nih_export_vst3!(ParametricEq);
