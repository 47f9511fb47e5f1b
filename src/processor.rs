use biquad::Coefficients;
use nih_plug::prelude::*;

use crate::design::{design_highpass_butterworth, design_lowpass_butterworth, design_peak_filter};
use crate::filter::{BandFilter, BiquadStage};
use crate::settings::ChainSettings;

/// Frequencies handed to the designers are kept just under Nyquist.
const MAX_FREQUENCY_RATIO: f32 = 0.499;

/// The complete filter chain of one audio channel: low cut, two bells, high cut.
#[derive(Debug, Clone, Copy)]
pub struct ChannelChain {
    low_cut: BandFilter,
    peak1: BiquadStage,
    peak2: BiquadStage,
    high_cut: BandFilter,
}

impl ChannelChain {
    pub fn new() -> Self {
        Self {
            low_cut: BandFilter::new(),
            peak1: BiquadStage::new(),
            peak2: BiquadStage::new(),
            high_cut: BandFilter::new(),
        }
    }

    /// Clears all filter history. Coefficients are left alone, the engine refreshes them right
    /// after.
    pub fn prepare(&mut self, _sample_rate: f32) {
        self.low_cut.reset();
        self.peak1.reset();
        self.peak2.reset();
        self.high_cut.reset();
    }

    pub fn process_sample(&mut self, x: f32) -> f32 {
        let x = self.low_cut.process_sample(x);
        let x = self.peak1.process_sample(x);
        let x = self.peak2.process_sample(x);
        self.high_cut.process_sample(x)
    }

    pub fn apply_peak_coefficients(&mut self, peak1: Coefficients<f32>, peak2: Coefficients<f32>) {
        self.peak1.set_coefficients(peak1);
        self.peak2.set_coefficients(peak2);
    }

    pub fn apply_cut_coefficients(
        &mut self,
        low_cut: &[Coefficients<f32>],
        high_cut: &[Coefficients<f32>],
    ) {
        self.low_cut.apply_design(low_cut);
        self.high_cut.apply_design(high_cut);
    }

    pub fn low_cut(&self) -> &BandFilter {
        &self.low_cut
    }

    pub fn high_cut(&self) -> &BandFilter {
        &self.high_cut
    }

    /// Every stage of the chain in the order [`process_sample()`][Self::process_sample()] runs
    /// them, active or not.
    pub fn stages(&self) -> impl Iterator<Item = &BiquadStage> + Clone + '_ {
        self.low_cut
            .stages()
            .iter()
            .chain(std::iter::once(&self.peak1))
            .chain(std::iter::once(&self.peak2))
            .chain(self.high_cut.stages().iter())
    }
}

impl Default for ChannelChain {
    fn default() -> Self {
        Self::new()
    }
}

/// Stereo equalizer. Both channels always carry the same coefficients, only their history
/// differs.
pub struct EqualizerEngine {
    left: ChannelChain,
    right: ChannelChain,

    sample_rate: f32,
    /// The last block went through bypass, so the history in both chains is stale.
    bypassed: bool,
    /// The snapshot the current coefficients were computed from. `None` forces a refresh.
    applied: Option<ChainSettings>,
    /// Bumped on every coefficient refresh.
    generation: u32,
}

impl EqualizerEngine {
    pub fn new() -> Self {
        Self {
            left: ChannelChain::new(),
            right: ChannelChain::new(),

            sample_rate: 44100.0,
            bypassed: false,
            applied: None,
            generation: 0,
        }
    }

    /// Resets both channels for a new sample rate and designs the filters for `settings`.
    pub fn prepare(&mut self, sample_rate: f32, _max_block_size: usize, settings: &ChainSettings) {
        self.sample_rate = sample_rate;
        self.bypassed = false;

        self.left.prepare(sample_rate);
        self.right.prepare(sample_rate);

        self.refresh_coefficients(settings, sample_rate);
    }

    /// Recomputes every coefficient from `settings`. Safe to call before every block, nothing is
    /// allocated.
    pub fn refresh_coefficients(&mut self, settings: &ChainSettings, sample_rate: f32) {
        let max_frequency = sample_rate * MAX_FREQUENCY_RATIO;

        let peak1 = design_peak_filter(
            settings.peak1_frequency.min(max_frequency),
            settings.peak1_quality,
            settings.peak1_gain_db,
            sample_rate,
        );
        let peak2 = design_peak_filter(
            settings.peak2_frequency.min(max_frequency),
            settings.peak2_quality,
            settings.peak2_gain_db,
            sample_rate,
        );

        let low_cut = design_highpass_butterworth(
            settings.low_cut_frequency.min(max_frequency),
            sample_rate,
            settings.low_cut_slope.order(),
        );
        let high_cut = design_lowpass_butterworth(
            settings.high_cut_frequency.min(max_frequency),
            sample_rate,
            settings.high_cut_slope.order(),
        );

        // 左右のチャンネルには必ず同じ係数を入れる
        for chain in [&mut self.left, &mut self.right] {
            chain.apply_peak_coefficients(peak1, peak2);
            chain.apply_cut_coefficients(low_cut.as_slice(), high_cut.as_slice());
        }

        self.sample_rate = sample_rate;
        self.applied = Some(*settings);
        self.generation = self.generation.wrapping_add(1);
    }

    /// Filters one block in place. Returns `false` without touching either buffer when the
    /// channel lengths differ.
    pub fn process_block(
        &mut self,
        settings: &ChainSettings,
        left: &mut [f32],
        right: &mut [f32],
    ) -> bool {
        nih_debug_assert_eq!(left.len(), right.len());
        if left.len() != right.len() {
            return false;
        }

        // パラメーターが変わったときだけ係数を再計算する
        if self.applied.as_ref() != Some(settings) {
            self.refresh_coefficients(settings, self.sample_rate);
        }

        if settings.bypass {
            self.bypassed = true;
            return true;
        }

        // バイパス中に止まっていた履歴は捨ててから再開する
        if self.bypassed {
            self.reset();
            self.bypassed = false;
        }

        let output_gain = util::db_to_gain(settings.output_gain_db);
        for sample in left.iter_mut() {
            *sample = self.left.process_sample(*sample) * output_gain;
        }
        for sample in right.iter_mut() {
            *sample = self.right.process_sample(*sample) * output_gain;
        }

        true
    }

    /// Clears the history of both channels without touching the coefficients.
    pub fn reset(&mut self) {
        self.left.prepare(self.sample_rate);
        self.right.prepare(self.sample_rate);
    }

    pub fn left(&self) -> &ChannelChain {
        &self.left
    }

    pub fn right(&self) -> &ChannelChain {
        &self.right
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Changes whenever the coefficients were recomputed.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl Default for EqualizerEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Slope;

    const SAMPLE_RATE: f32 = 48000.0;

    fn noise(len: usize, seed: u32) -> Vec<f32> {
        // Small LCG, deterministic across runs
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (state >> 8) as f32 / (1u32 << 24) as f32 * 2.0 - 1.0
            })
            .collect()
    }

    fn busy_settings() -> ChainSettings {
        ChainSettings {
            peak1_frequency: 800.0,
            peak1_gain_db: 9.0,
            peak1_quality: 2.0,
            peak2_frequency: 6000.0,
            peak2_gain_db: -12.0,
            peak2_quality: 0.7,
            low_cut_frequency: 120.0,
            high_cut_frequency: 9000.0,
            low_cut_slope: Slope::Db36,
            high_cut_slope: Slope::Db24,
            output_gain_db: 3.0,
            bypass: false,
        }
    }

    fn prepared(settings: &ChainSettings) -> EqualizerEngine {
        let mut engine = EqualizerEngine::new();
        engine.prepare(SAMPLE_RATE, 512, settings);
        engine
    }

    fn coefficient_bits(chain: &ChannelChain) -> Vec<(u32, u32, u32, u32, u32, bool)> {
        chain
            .stages()
            .map(|stage| {
                let c = stage.coefficients();
                (
                    c.b0.to_bits(),
                    c.b1.to_bits(),
                    c.b2.to_bits(),
                    c.a1.to_bits(),
                    c.a2.to_bits(),
                    stage.is_active(),
                )
            })
            .collect()
    }

    #[test]
    fn bypass_is_bit_identical() {
        let settings = ChainSettings {
            bypass: true,
            ..busy_settings()
        };
        let mut engine = prepared(&settings);

        let input_left = noise(1024, 1);
        let input_right = noise(1024, 2);
        let mut left = input_left.clone();
        let mut right = input_right.clone();
        assert!(engine.process_block(&settings, &mut left, &mut right));

        let to_bits = |v: &[f32]| v.iter().map(|x| x.to_bits()).collect::<Vec<_>>();
        assert_eq!(to_bits(&left), to_bits(&input_left));
        assert_eq!(to_bits(&right), to_bits(&input_right));
    }

    #[test]
    fn slope_controls_active_stage_count() {
        let mut engine = prepared(&ChainSettings::default());
        for (ordinal, slope) in [Slope::Db12, Slope::Db24, Slope::Db36, Slope::Db48]
            .into_iter()
            .enumerate()
        {
            let settings = ChainSettings {
                low_cut_slope: slope,
                high_cut_slope: Slope::Db48,
                ..ChainSettings::default()
            };
            engine.refresh_coefficients(&settings, SAMPLE_RATE);

            let low_cut = engine.left().low_cut();
            assert_eq!(low_cut.active_count(), ordinal + 1);
            let active = low_cut.stages().iter().filter(|s| s.is_active()).count();
            assert_eq!(active, ordinal + 1);
            assert!(low_cut.stages()[..=ordinal].iter().all(|s| s.is_active()));
            assert_eq!(engine.left().high_cut().active_count(), 4);
        }
    }

    #[test]
    fn both_channels_share_coefficients() {
        let settings = busy_settings();
        let mut engine = prepared(&settings);

        let mut left = noise(777, 3);
        let mut right = noise(777, 4);
        engine.process_block(&settings, &mut left, &mut right);

        let changed = ChainSettings {
            low_cut_slope: Slope::Db12,
            peak1_gain_db: -4.0,
            ..settings
        };
        engine.refresh_coefficients(&changed, SAMPLE_RATE);
        assert_eq!(
            coefficient_bits(engine.left()),
            coefficient_bits(engine.right())
        );
    }

    #[test]
    fn silence_in_silence_out() {
        for settings in [ChainSettings::default(), busy_settings()] {
            let mut engine = prepared(&settings);
            let mut left = vec![0.0_f32; 2048];
            let mut right = vec![0.0_f32; 2048];
            engine.process_block(&settings, &mut left, &mut right);
            assert!(left.iter().chain(right.iter()).all(|&x| x == 0.0));
        }
    }

    #[test]
    fn mismatched_channels_are_left_alone() {
        let settings = busy_settings();
        let mut engine = prepared(&settings);

        let mut left = noise(64, 5);
        let mut right = noise(63, 6);
        let (left_in, right_in) = (left.clone(), right.clone());
        assert!(!engine.process_block(&settings, &mut left, &mut right));
        assert_eq!(left, left_in);
        assert_eq!(right, right_in);
    }

    #[test]
    fn chain_runs_in_fixed_order() {
        let settings = busy_settings();
        let engine = prepared(&settings);
        let mut chain = *engine.left();

        let mut low_cut = *chain.low_cut();
        let mut peak1 = chain.peak1;
        let mut peak2 = chain.peak2;
        let mut high_cut = *chain.high_cut();

        for x in noise(512, 7) {
            let expected = high_cut.process_sample(
                peak2.process_sample(peak1.process_sample(low_cut.process_sample(x))),
            );
            assert_eq!(chain.process_sample(x).to_bits(), expected.to_bits());
        }
    }

    #[test]
    fn skipped_refresh_matches_fresh_design() {
        let first = busy_settings();
        let second = ChainSettings {
            peak2_frequency: 3000.0,
            high_cut_slope: Slope::Db48,
            ..first
        };

        // One engine sees a parameter change between blocks, the other is built for it directly
        let mut changed = prepared(&first);
        let mut scratch_left = vec![0.0_f32; 256];
        let mut scratch_right = vec![0.0_f32; 256];
        changed.process_block(&first, &mut scratch_left, &mut scratch_right);
        changed.process_block(&second, &mut scratch_left, &mut scratch_right);

        let fresh = prepared(&second);
        assert_eq!(coefficient_bits(changed.left()), coefficient_bits(fresh.left()));
    }

    #[test]
    fn leaving_bypass_starts_from_clean_history() {
        let settings = ChainSettings {
            low_cut_slope: Slope::Db48,
            low_cut_frequency: 100.0,
            ..busy_settings()
        };
        let bypassed = ChainSettings {
            bypass: true,
            ..settings
        };
        let mut engine = prepared(&settings);

        let mut left = noise(512, 13);
        let mut right = noise(512, 14);
        engine.process_block(&settings, &mut left, &mut right);
        let mut ringing = *engine.left();
        assert_ne!(ringing.process_sample(0.0), 0.0);

        let mut left = noise(256, 15);
        let mut right = noise(256, 16);
        engine.process_block(&bypassed, &mut left, &mut right);

        let mut left = vec![0.0_f32; 256];
        let mut right = vec![0.0_f32; 256];
        engine.process_block(&settings, &mut left, &mut right);
        assert_eq!(left[0], 0.0);
        assert!(left.iter().chain(right.iter()).all(|&x| x == 0.0));
    }

    #[test]
    fn output_gain_is_applied_after_the_cascade() {
        let flat = ChainSettings::default();
        let boosted = ChainSettings {
            output_gain_db: 6.0,
            ..flat
        };
        let mut plain = prepared(&flat);
        let mut louder = prepared(&boosted);

        let input = noise(256, 8);
        let (mut a_left, mut a_right) = (input.clone(), input.clone());
        let (mut b_left, mut b_right) = (input.clone(), input);
        plain.process_block(&flat, &mut a_left, &mut a_right);
        louder.process_block(&boosted, &mut b_left, &mut b_right);

        let gain = util::db_to_gain(6.0);
        for (a, b) in a_left.iter().zip(&b_left) {
            assert!((a * gain - b).abs() < 1e-5);
        }
    }

    #[test]
    fn crossed_cut_filters_stay_finite() {
        let settings = ChainSettings {
            low_cut_frequency: 15000.0,
            high_cut_frequency: 100.0,
            ..busy_settings()
        };
        let mut engine = prepared(&settings);
        let mut left = noise(4096, 9);
        let mut right = noise(4096, 10);
        engine.process_block(&settings, &mut left, &mut right);
        assert!(left.iter().chain(right.iter()).all(|x| x.is_finite()));
    }

    #[test]
    fn frequencies_above_nyquist_are_clamped() {
        let settings = ChainSettings {
            peak1_frequency: 40000.0,
            high_cut_frequency: 30000.0,
            ..ChainSettings::default()
        };
        let mut engine = prepared(&settings);
        let mut left = noise(1024, 11);
        let mut right = noise(1024, 12);
        engine.process_block(&settings, &mut left, &mut right);
        assert!(left.iter().chain(right.iter()).all(|x| x.is_finite()));
    }
}
