use biquad::Coefficients;

use crate::design::{self, MAX_SECTIONS};

/// One second-order section with its own history and a bypass switch.
#[derive(Debug, Clone, Copy)]
pub struct BiquadStage {
    coefficients: Coefficients<f32>,
    z1: f32,
    z2: f32,
    active: bool,
}

impl BiquadStage {
    pub fn new() -> Self {
        Self {
            coefficients: design::identity(),
            z1: 0.0,
            z2: 0.0,
            active: true,
        }
    }

    pub fn process_sample(&mut self, x: f32) -> f32 {
        if !self.active {
            return x;
        }

        // Direct Form II Transposed to keep numerical stability
        let c = &self.coefficients;
        let y = c.b0 * x + self.z1;
        self.z1 = c.b1 * x - c.a1 * y + self.z2;
        self.z2 = c.b2 * x - c.a2 * y;
        y
    }

    /// Swaps in a new coefficient set. The history is kept so parameter automation doesn't click.
    pub fn set_coefficients(&mut self, coefficients: Coefficients<f32>) {
        self.coefficients = coefficients;
    }

    pub fn coefficients(&self) -> Coefficients<f32> {
        self.coefficients
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

impl Default for BiquadStage {
    fn default() -> Self {
        Self::new()
    }
}

/// A cut filter made of up to four cascaded sections. Only the leading `active_count` stages
/// filter, the rest are transparent.
#[derive(Debug, Clone, Copy)]
pub struct BandFilter {
    stages: [BiquadStage; MAX_SECTIONS],
    active_count: usize,
}

impl BandFilter {
    pub fn new() -> Self {
        let mut stages = [BiquadStage::new(); MAX_SECTIONS];
        for stage in stages.iter_mut() {
            stage.set_active(false);
        }

        Self {
            stages,
            active_count: 0,
        }
    }

    /// Loads a cascade design into the leading stages and bypasses the rest. A stage that comes
    /// back from bypass starts from a clean history, whatever it held before is stale.
    pub fn apply_design(&mut self, sections: &[Coefficients<f32>]) {
        let count = sections.len().min(MAX_SECTIONS);

        for (index, stage) in self.stages.iter_mut().enumerate() {
            if index < count {
                if !stage.is_active() {
                    stage.reset();
                }
                stage.set_coefficients(sections[index]);
                stage.set_active(true);
            } else {
                stage.set_active(false);
            }
        }

        self.active_count = count;
    }

    pub fn process_sample(&mut self, x: f32) -> f32 {
        self.stages
            .iter_mut()
            .fold(x, |sample, stage| stage.process_sample(sample))
    }

    pub fn active_count(&self) -> usize {
        self.active_count
    }

    pub fn stages(&self) -> &[BiquadStage; MAX_SECTIONS] {
        &self.stages
    }

    pub fn reset(&mut self) {
        for stage in self.stages.iter_mut() {
            stage.reset();
        }
    }
}

impl Default for BandFilter {
    fn default() -> Self {
        Self::new()
    }
}
