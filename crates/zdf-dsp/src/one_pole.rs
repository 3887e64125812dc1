//! Trapezoidal (TPT) one-pole stage, the building block of the ladder.
//!
//! Per sample:
//!   v   = (x - s) * alpha
//!   lpf = v + s
//!   s   = v + lpf
//!   hpf = x - lpf
//!
//! `alpha = g / (1 + g)` with `g = tan(pi*fc/fs)`, supplied by the owner.
//! The stage never derives alpha itself: a composite injects one shared set
//! of coefficients into all of its sub-stages so they stay sync-tuned.
//!
//! `beta` scales the stage state into a feedback readout (`beta * s`) that the
//! composite sums across stages to close its delay-free loop in one step.

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct OnePoleCoeffs {
    /// g / (1 + g)
    pub alpha: f64,
    /// Feedback readout weight
    pub beta: f64,
}

/// Result of one stage step.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StageOutput {
    pub lpf: f64,
    pub hpf: f64,
    /// lpf + alpha * hpf
    pub anm_lpf: f64,
    /// beta * s after the state update
    pub feedback: f64,
}

#[derive(Clone, Debug)]
pub struct OnePoleStage {
    coeffs: OnePoleCoeffs,
    /// Integrator state
    s: f64,
}

impl Default for OnePoleStage {
    fn default() -> Self {
        Self::new()
    }
}

impl OnePoleStage {
    pub fn new() -> Self {
        Self {
            coeffs: OnePoleCoeffs::default(),
            s: 0.0,
        }
    }

    /// Zero the integrator. Coefficients are the owner's to re-derive.
    pub fn reset(&mut self) {
        self.s = 0.0;
    }

    pub fn set_alpha(&mut self, alpha: f64) {
        self.coeffs.alpha = alpha;
    }

    pub fn set_beta(&mut self, beta: f64) {
        self.coeffs.beta = beta;
    }

    pub fn set_coeffs(&mut self, coeffs: OnePoleCoeffs) {
        self.coeffs = coeffs;
    }

    pub fn copy_coeffs(&self, destination: &mut OnePoleStage) {
        destination.set_coeffs(self.coeffs);
    }

    pub fn coeffs(&self) -> OnePoleCoeffs {
        self.coeffs
    }

    /// Feedback readout `beta * s` without advancing the stage.
    #[inline]
    pub fn fb_output(&self) -> f64 {
        self.coeffs.beta * self.s
    }

    #[inline]
    pub fn process(&mut self, x: f64) -> StageOutput {
        let alpha = self.coeffs.alpha;
        let v = (x - self.s) * alpha;
        let lpf = v + self.s;
        self.s = v + lpf;
        let hpf = x - lpf;

        StageOutput {
            lpf,
            hpf,
            anm_lpf: lpf + alpha * hpf,
            feedback: self.coeffs.beta * self.s,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::prewarp;
    use std::f64::consts::PI;

    fn stage_at(fc: f64, sr: f64) -> OnePoleStage {
        let mut stage = OnePoleStage::new();
        stage.reset();
        let g = prewarp(fc, sr);
        stage.set_alpha(g / (1.0 + g));
        stage
    }

    fn steady_peak(stage: &mut OnePoleStage, freq: f64, sr: f64, hp: bool) -> f64 {
        let n = (sr * 0.1) as usize;
        let mut peak = 0.0f64;
        for i in 0..n {
            let x = (2.0 * PI * freq * i as f64 / sr).sin();
            let out = stage.process(x);
            if i > n / 2 {
                peak = peak.max(if hp { out.hpf } else { out.lpf }.abs());
            }
        }
        peak
    }

    #[test]
    fn test_lpf_passes_low_attenuates_high() {
        let sr = 44100.0;
        let mut stage = stage_at(1000.0, sr);
        let low = steady_peak(&mut stage, 100.0, sr, false);
        stage.reset();
        let high = steady_peak(&mut stage, 10_000.0, sr, false);
        assert!(low > 0.99, "LPF attenuated 100 Hz too much: {low}");
        assert!(high < 0.15, "LPF didn't attenuate 10 kHz enough: {high}");
    }

    #[test]
    fn test_cutoff_is_minus_3db() {
        // Bilinear prewarping puts the -3 dB point exactly at fc
        let sr = 44100.0;
        let mut stage = stage_at(2000.0, sr);
        let peak = steady_peak(&mut stage, 2000.0, sr, false);
        let db = 20.0 * peak.log10();
        assert!((db + 3.01).abs() < 0.25, "gain at cutoff = {db:.2} dB, want -3 dB");
    }

    #[test]
    fn test_lpf_plus_hpf_is_input() {
        let sr = 48000.0;
        let mut stage = stage_at(500.0, sr);
        for i in 0..256 {
            let x = ((i * 7919) % 101) as f64 / 50.0 - 1.0;
            let out = stage.process(x);
            assert!((out.lpf + out.hpf - x).abs() < 1e-15);
        }
    }

    #[test]
    fn test_feedback_readout_matches_fb_output() {
        let sr = 44100.0;
        let mut stage = stage_at(1000.0, sr);
        stage.set_beta(-0.37);
        for i in 0..64 {
            let out = stage.process((i as f64 * 0.3).sin());
            assert_eq!(out.feedback, stage.fb_output());
        }
    }

    #[test]
    fn test_zero_beta_reads_zero() {
        let mut stage = stage_at(1000.0, 44100.0);
        stage.process(1.0);
        assert_eq!(stage.fb_output(), 0.0);
    }

    #[test]
    fn test_copy_coeffs() {
        let mut src = stage_at(1234.0, 44100.0);
        src.set_beta(0.5);
        let mut dst = OnePoleStage::new();
        src.copy_coeffs(&mut dst);
        assert_eq!(src.coeffs(), dst.coeffs());
    }

    #[test]
    fn test_reset_clears_state() {
        let sr = 44100.0;
        let mut stage = stage_at(1000.0, sr);
        stage.set_beta(1.0);
        for _ in 0..100 {
            stage.process(1.0);
        }
        stage.reset();
        assert_eq!(stage.fb_output(), 0.0);
        let out = stage.process(0.0);
        assert_eq!(out, StageOutput::default());
    }
}
