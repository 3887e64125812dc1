//! Sync-tuned ladder (Korg-35 style): six TPT one-poles around a closed-form ZDF loop.
//!
//! Two parallel chains share one coefficient set:
//!
//!   lowpass:  x -> S1 -> u = alpha0 * (y1 + S35) -> S2 -> *K -> out
//!                                                      out -> S3 (state only)
//!
//!   highpass: x -> S1 -> u = alpha0 * (y1 + S35) -> *K -> out
//!                                  out -> S2 -> hpf -> S3 (state only)
//!
//! `S35` is the sum of the stage-2 and stage-3 feedback readouts (beta * state),
//! read before those stages advance. `alpha0 = 1 / (1 - K*alpha + K*alpha^2)`
//! resolves the instantaneous loop algebraically, so no iteration is needed.
//!
//! Auto-normalization: for K > 0 the K-scaled taps are divided by K, which keeps
//! the passband level independent of resonance.

use crate::filter::{FilterOutput, ResonantFilter, prewarp, unwarp};
use crate::one_pole::OnePoleStage;

pub const SUBFILTERS: usize = 3;
const FLT1: usize = 0;
const FLT2: usize = 1;
const FLT3: usize = 2;

/// Musical Q range exposed by the controls.
pub const GUI_Q_MIN: f64 = 1.0;
pub const GUI_Q_MAX: f64 = 10.0;

/// Internal resonance range. K = 2 is the self-oscillation edge.
pub const K_MIN: f64 = 0.707;
pub const K_MAX: f64 = 2.0;

/// Linear map from musical Q to internal resonance K:
///   K = k_min + (q - q_min) * slope
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResonanceMap {
    pub q_min: f64,
    pub k_min: f64,
    pub slope: f64,
}

impl ResonanceMap {
    /// Q in [1, 10] -> K in [0.707, 2.0]
    pub const KORG35: Self = Self {
        q_min: GUI_Q_MIN,
        k_min: K_MIN,
        slope: (K_MAX - K_MIN) / (GUI_Q_MAX - GUI_Q_MIN),
    };

    /// q is K.
    pub const IDENTITY: Self = Self {
        q_min: 0.0,
        k_min: 0.0,
        slope: 1.0,
    };

    #[inline]
    pub fn map(&self, q: f64) -> f64 {
        self.k_min + (q - self.q_min) * self.slope
    }

    /// The `q` that maps to `k`.
    pub fn inverse(&self, k: f64) -> f64 {
        self.q_min + (k - self.k_min) / self.slope
    }
}

impl Default for ResonanceMap {
    fn default() -> Self {
        Self::KORG35
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LadderCoeffs {
    /// Internal resonance
    pub k: f64,
    /// g / (1 + g)
    pub alpha: f64,
    /// Delay-free loop resolver: 1 / (1 - K*alpha + K*alpha^2)
    pub alpha0: f64,
    /// Prewarped integrator gain tan(pi*fc/fs)
    pub g: f64,
}

impl Default for LadderCoeffs {
    fn default() -> Self {
        Self {
            k: 1.0,
            alpha: 0.0,
            alpha0: 1.0,
            g: 0.0,
        }
    }
}

impl LadderCoeffs {
    /// Derive the full coefficient set from cutoff and K.
    pub fn derive(fc: f64, k: f64, sample_rate: f64) -> Self {
        Self::from_gain(prewarp(fc, sample_rate), k)
    }

    /// Complete a coefficient set from an already-prewarped gain (no trig).
    pub fn from_gain(g: f64, k: f64) -> Self {
        let alpha = g / (1.0 + g);
        Self {
            k,
            alpha,
            alpha0: 1.0 / (1.0 - k * alpha + k * alpha * alpha),
            g,
        }
    }

    /// Morph between two coefficient sets.
    ///
    /// Interpolates the gain and resonance, then completes alpha/alpha0
    /// algebraically so the loop stays exactly resolved at every step.
    pub fn lerp(&self, other: &LadderCoeffs, t: f64) -> Self {
        let g = self.g + (other.g - self.g) * t;
        let k = self.k + (other.k - self.k) * t;
        Self::from_gain(g, k)
    }
}

pub struct SyncTunedLadder {
    lpf_stages: [OnePoleStage; SUBFILTERS],
    hpf_stages: [OnePoleStage; SUBFILTERS],
    coeffs: LadderCoeffs,
    resonance_map: ResonanceMap,
    sample_rate: f64,
    fc: f64,
    /// 1/K cached for auto-normalization (1.0 when K <= 0)
    inv_k: f64,
}

impl Default for SyncTunedLadder {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncTunedLadder {
    pub fn new() -> Self {
        Self::with_resonance_map(ResonanceMap::KORG35)
    }

    pub fn with_resonance_map(resonance_map: ResonanceMap) -> Self {
        Self {
            lpf_stages: Default::default(),
            hpf_stages: Default::default(),
            coeffs: LadderCoeffs::default(),
            resonance_map,
            sample_rate: 44100.0,
            fc: 0.0,
            inv_k: 1.0,
        }
    }

    pub fn coeffs(&self) -> LadderCoeffs {
        self.coeffs
    }

    pub fn cutoff(&self) -> f64 {
        self.fc
    }

    /// Inject a coefficient set directly, bypassing derivation.
    ///
    /// The cutoff implied by `coeffs.g` becomes the stored cutoff, so a later
    /// `reset` retunes the injected set for the new rate and keeps its K.
    pub fn set_coeffs(&mut self, coeffs: LadderCoeffs) {
        self.fc = unwarp(coeffs.g, self.sample_rate);
        self.coeffs = coeffs;
        self.sync_stages();
    }

    pub fn copy_coeffs(&self, destination: &mut SyncTunedLadder) {
        destination.set_coeffs(self.coeffs);
    }

    /// Push the shared coefficients into all six sub-stages.
    fn sync_stages(&mut self) {
        let c = self.coeffs;
        for stage in self.lpf_stages.iter_mut().chain(self.hpf_stages.iter_mut()) {
            stage.set_alpha(c.alpha);
            stage.set_beta(0.0);
        }

        let deno = 1.0 + c.g;
        self.lpf_stages[FLT2].set_beta(c.k * (1.0 - c.alpha) / deno);
        self.lpf_stages[FLT3].set_beta(-1.0 / deno);
        self.hpf_stages[FLT2].set_beta(-c.alpha / deno);
        self.hpf_stages[FLT3].set_beta(1.0 / deno);

        self.inv_k = if c.k > 0.0 { 1.0 / c.k } else { 1.0 };
    }
}

impl ResonantFilter for SyncTunedLadder {
    fn reset(&mut self, sample_rate: f64) -> bool {
        self.sample_rate = sample_rate;
        for stage in self.lpf_stages.iter_mut().chain(self.hpf_stages.iter_mut()) {
            stage.reset();
        }
        // Cached coefficients were derived for the old rate
        if self.fc > 0.0 {
            self.update();
        }
        true
    }

    fn update(&mut self) -> bool {
        self.coeffs = LadderCoeffs::derive(self.fc, self.coeffs.k, self.sample_rate);
        self.sync_stages();
        true
    }

    fn set_filter_params(&mut self, fc: f64, q: f64) {
        let k = self.resonance_map.map(q);
        if fc != self.fc || k != self.coeffs.k {
            self.fc = fc;
            self.coeffs.k = k;
            self.update();
        }
    }

    #[inline]
    fn process(&mut self, x: f64) -> FilterOutput {
        let k = self.coeffs.k;
        let alpha0 = self.coeffs.alpha0;

        // Lowpass chain. Feedback readouts are taken before LP2/LP3 advance.
        let lp1 = self.lpf_stages[FLT1].process(x);
        let s35 = self.lpf_stages[FLT2].fb_output() + self.lpf_stages[FLT3].fb_output();
        let u = alpha0 * (lp1.anm_lpf + s35);
        let lp2 = self.lpf_stages[FLT2].process(u);
        let mut lpf2 = lp2.lpf * k;
        let mut anm_lpf2 = lp2.anm_lpf * k;
        // LP3 only matters through its next feedback readout
        self.lpf_stages[FLT3].process(lpf2);

        // Highpass chain
        let hp1 = self.hpf_stages[FLT1].process(x);
        let s35 = self.hpf_stages[FLT2].fb_output() + self.hpf_stages[FLT3].fb_output();
        let u = alpha0 * (hp1.hpf + s35);
        let mut hpf2 = k * u;
        let hp2 = self.hpf_stages[FLT2].process(hpf2);
        self.hpf_stages[FLT3].process(hp2.hpf);

        if k > 0.0 {
            lpf2 *= self.inv_k;
            anm_lpf2 *= self.inv_k;
            hpf2 *= self.inv_k;
        }

        FilterOutput {
            lpf1: lp1.lpf,
            lpf2,
            hpf1: hp1.hpf,
            hpf2,
            anm_lpf1: lp1.anm_lpf,
            anm_lpf2,
        }
    }
}
