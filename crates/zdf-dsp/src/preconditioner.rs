//! Input conditioning ahead of the resonant stage.
//!
//! `hp = x - lp(x)` with a TPT one-pole at the high-pass cutoff, then an
//! exponential drive gain `10^(drive * 0.5)` into `tanh`:
//!
//!   y = tanh(10^(drive/2) * (x - lp(x)))
//!
//! Drive 0 is unity gain, drive 2 is +20 dB into the saturator.

use crate::filter::prewarp;
use crate::one_pole::OnePoleStage;

pub struct PreConditioner {
    lp: OnePoleStage,
    sample_rate: f64,
    hp_cutoff_hz: f64,
    drive: f64,
    drive_gain: f64,
}

impl Default for PreConditioner {
    fn default() -> Self {
        Self::new()
    }
}

/// 10^(drive * 0.5)
#[inline]
pub fn drive_gain(drive: f64) -> f64 {
    10f64.powf(drive * 0.5)
}

impl PreConditioner {
    pub fn new() -> Self {
        Self {
            lp: OnePoleStage::new(),
            sample_rate: 44100.0,
            hp_cutoff_hz: 0.0,
            drive: 0.0,
            drive_gain: 1.0,
        }
    }

    pub fn reset(&mut self, sample_rate: f64) -> bool {
        self.sample_rate = sample_rate;
        self.lp.reset();
        self.update();
        true
    }

    /// Only recomputes coefficients when a value changed.
    pub fn set_params(&mut self, hp_cutoff_hz: f64, drive: f64) {
        if hp_cutoff_hz != self.hp_cutoff_hz || drive != self.drive {
            self.hp_cutoff_hz = hp_cutoff_hz;
            self.drive = drive;
            self.update();
        }
    }

    fn update(&mut self) {
        let g = prewarp(self.hp_cutoff_hz, self.sample_rate);
        self.lp.set_alpha(g / (1.0 + g));
        self.drive_gain = drive_gain(self.drive);
    }

    #[inline]
    pub fn process(&mut self, x: f64) -> f64 {
        let hp = self.lp.process(x).hpf;
        (self.drive_gain * hp).tanh()
    }
}
