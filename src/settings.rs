use nih_plug::prelude::*;

/// Steepness of a cut filter. The discriminant is the ordinal the host stores, the filter order is
/// `2 * (ordinal + 1)`.
#[derive(Enum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slope {
    #[id = "12db"]
    #[name = "12 dB/oct"]
    Db12,
    #[id = "24db"]
    #[name = "24 dB/oct"]
    Db24,
    #[id = "36db"]
    #[name = "36 dB/oct"]
    Db36,
    #[id = "48db"]
    #[name = "48 dB/oct"]
    Db48,
}

impl Slope {
    /// Restores a slope from its raw ordinal. Anything outside `0..=3` is a caller bug, so it gets
    /// logged and clamped to the nearest valid slope.
    pub fn from_ordinal(ordinal: i32) -> Self {
        match ordinal {
            0 => Slope::Db12,
            1 => Slope::Db24,
            2 => Slope::Db36,
            3 => Slope::Db48,
            other => {
                nih_warn!("slope ordinal {other} is out of range, clamping");
                if other < 0 {
                    Slope::Db12
                } else {
                    Slope::Db48
                }
            }
        }
    }

    pub fn ordinal(self) -> usize {
        self as usize
    }

    /// Butterworth order of the cut filter, always one of 2, 4, 6 or 8.
    pub fn order(self) -> usize {
        2 * (self.ordinal() + 1)
    }
}

/// Snapshot of every parameter the filter chain depends on, taken once per block.
///
/// `low_cut_frequency < high_cut_frequency` is not enforced here. Crossed cut filters just produce
/// whatever response the math gives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainSettings {
    pub peak1_frequency: f32,
    pub peak1_gain_db: f32,
    pub peak1_quality: f32,
    pub peak2_frequency: f32,
    pub peak2_gain_db: f32,
    pub peak2_quality: f32,
    pub low_cut_frequency: f32,
    pub high_cut_frequency: f32,
    pub low_cut_slope: Slope,
    pub high_cut_slope: Slope,
    pub output_gain_db: f32,
    pub bypass: bool,
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            peak1_frequency: 500.0,
            peak1_gain_db: 0.0,
            peak1_quality: 1.0,
            peak2_frequency: 2000.0,
            peak2_gain_db: 0.0,
            peak2_quality: 1.0,
            low_cut_frequency: 80.0,
            high_cut_frequency: 12000.0,
            low_cut_slope: Slope::Db12,
            high_cut_slope: Slope::Db12,
            output_gain_db: 0.0,
            bypass: false,
        }
    }
}
