//! Shared interface for the resonant ZDF topologies.
//!
//! Every topology follows the same lifecycle:
//!   `reset(sample_rate)` -> `set_filter_params(fc, q)` -> `update()` -> `process(x)` per sample.
//!
//! Coefficient derivation (tan, division) happens in `update()` only, never in `process()`.

use std::f64::consts::PI;

/// Output taps of one processed sample.
///
/// Returned by value: callers get their own copy, nothing aliases filter state.
/// Topologies fill the taps they have; single-stage topologies mirror their only
/// stage into both the `*1` and `*2` slots.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FilterOutput {
    pub lpf1: f64,
    pub lpf2: f64,
    pub hpf1: f64,
    pub hpf2: f64,
    /// Lowpass without the 1/(1+g) normalization ("antinormalized").
    pub anm_lpf1: f64,
    pub anm_lpf2: f64,
}

/// Final-stage tap selection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Tap {
    #[default]
    Lowpass,
    Highpass,
}

impl FilterOutput {
    pub fn tap(&self, tap: Tap) -> f64 {
        match tap {
            Tap::Lowpass => self.lpf2,
            Tap::Highpass => self.hpf2,
        }
    }
}

/// Capability set shared by every resonant topology.
pub trait ResonantFilter {
    /// Zero all state and cache sample-period constants. Returns `true` on success.
    fn reset(&mut self, sample_rate: f64) -> bool;

    /// Recompute coefficients from the stored cutoff/resonance.
    fn update(&mut self) -> bool;

    /// Advance one sample.
    fn process(&mut self, x: f64) -> FilterOutput;

    /// Set cutoff (Hz) and the topology's resonance control.
    ///
    /// No range clamping: `fc` must stay below Nyquist and `q` inside the
    /// topology's stable range.
    fn set_filter_params(&mut self, fc: f64, q: f64);
}

/// Bilinear-transform prewarped integrator gain: tan(pi * fc / fs).
///
/// Equals `wc * T / 2` with `wc` the prewarped analog cutoff.
#[inline]
pub fn prewarp(fc: f64, sample_rate: f64) -> f64 {
    (PI * fc / sample_rate).tan()
}

/// Cutoff in Hz whose prewarped gain at `sample_rate` is `g`.
#[inline]
pub fn unwarp(g: f64, sample_rate: f64) -> f64 {
    g.atan() * sample_rate / PI
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prewarp_matches_wc_t_half_at_low_freq() {
        // Far below Nyquist tan(x) ~= x, so prewarp ~= pi * fc / fs
        let sr = 48000.0;
        let g = prewarp(10.0, sr);
        let naive = PI * 10.0 / sr;
        assert!((g - naive).abs() / naive < 1e-6, "prewarp {g} vs {naive}");
    }

    #[test]
    fn test_prewarp_grows_toward_nyquist() {
        let sr = 44100.0;
        let g_quarter = prewarp(sr / 4.0, sr);
        assert!((g_quarter - 1.0).abs() < 1e-12, "tan(pi/4) should be 1, got {g_quarter}");
        assert!(prewarp(0.49 * sr, sr) > 30.0);
    }

    #[test]
    fn test_unwarp_inverts_prewarp() {
        let sr = 48000.0;
        for fc in [20.0, 1000.0, 12000.0, 0.45 * sr] {
            let back = unwarp(prewarp(fc, sr), sr);
            assert!((back - fc).abs() < 1e-9 * fc, "{fc} came back as {back}");
        }
    }

    #[test]
    fn test_tap_selection() {
        let out = FilterOutput {
            lpf2: 0.25,
            hpf2: -0.5,
            ..Default::default()
        };
        assert_eq!(out.tap(Tap::Lowpass), 0.25);
        assert_eq!(out.tap(Tap::Highpass), -0.5);
    }
}
