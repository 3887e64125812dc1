//! One-pole with a diode-style nonlinearity inside the feedback path.
//!
//! Trapezoidal integration of `dv/dt = wc * (x - v - diode(v))` with
//! `diode(v) = p * (exp(v / VT) - 1)`. The implicit equation
//!
//!   F(v) = v - v_prev - g * [(x - v - diode(v)) + (x_prev - v_prev - diode(v_prev))]
//!
//! has no closed form, so each sample runs a bounded Newton-Raphson solve
//! seeded from `v_prev`:
//!
//!   F'(v) = 1 + g * (1 + diode'(v)),   diode'(v) = (p / VT) * exp(v / VT)
//!
//! At most `MAX_ITERATIONS` steps. The loop stops early when the derivative
//! falls under `DERIVATIVE_GUARD` (keeping the current guess) or a step is
//! smaller than `STEP_TOLERANCE`. Steps up the exponential are limited to
//! `MAX_STEP_UP`, the usual junction-voltage limiting, so a large input swing
//! can't fling the first iterate far past the root.

use crate::filter::{FilterOutput, ResonantFilter, prewarp, unwarp};

/// Thermal voltage scale of the diode law.
pub const DIODE_VT: f64 = 0.02;
pub const MAX_ITERATIONS: usize = 5;
pub const DERIVATIVE_GUARD: f64 = 1e-14;
pub const STEP_TOLERANCE: f64 = 1e-9;
/// Largest upward Newton step per iteration.
pub const MAX_STEP_UP: f64 = 3.0 * DIODE_VT;
/// Upper bound on `v / VT` inside `exp`.
const EXP_CLAMP: f64 = 80.0;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DiodeCoeffs {
    /// tan(pi * fc / fs)
    pub g: f64,
    /// Diode scale `p`; 0 makes the stage linear
    pub nonlinear: f64,
}

/// Outcome of the most recent per-sample solve.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SolveStats {
    pub iterations: usize,
    /// |F(v)| at the accepted root
    pub residual: f64,
}

#[inline]
fn diode(v: f64, p: f64) -> f64 {
    p * ((v / DIODE_VT).min(EXP_CLAMP).exp() - 1.0)
}

#[inline]
fn diode_slope(v: f64, p: f64) -> f64 {
    p / DIODE_VT * (v / DIODE_VT).min(EXP_CLAMP).exp()
}

pub struct DiodeOnePole {
    coeffs: DiodeCoeffs,
    sample_rate: f64,
    fc: f64,
    v_prev: f64,
    x_prev: f64,
    last: SolveStats,
}

impl Default for DiodeOnePole {
    fn default() -> Self {
        Self::new()
    }
}

impl DiodeOnePole {
    pub fn new() -> Self {
        Self {
            coeffs: DiodeCoeffs::default(),
            sample_rate: 44100.0,
            fc: 0.0,
            v_prev: 0.0,
            x_prev: 0.0,
            last: SolveStats::default(),
        }
    }

    pub fn coeffs(&self) -> DiodeCoeffs {
        self.coeffs
    }

    /// Inject coefficients directly; the cutoff implied by `g` is kept for `reset`.
    pub fn set_coeffs(&mut self, coeffs: DiodeCoeffs) {
        self.fc = unwarp(coeffs.g, self.sample_rate);
        self.coeffs = coeffs;
    }

    pub fn copy_coeffs(&self, destination: &mut DiodeOnePole) {
        destination.set_coeffs(self.coeffs);
    }

    pub fn last_solve(&self) -> SolveStats {
        self.last
    }

    fn solve(&self, x: f64) -> (f64, SolveStats) {
        let DiodeCoeffs { g, nonlinear: p } = self.coeffs;
        let v_prev = self.v_prev;
        let history = self.x_prev - v_prev - diode(v_prev, p);
        let residual = |v: f64| v - v_prev - g * ((x - v - diode(v, p)) + history);

        let mut v = v_prev;
        let mut iterations = 0;
        while iterations < MAX_ITERATIONS {
            let f = residual(v);
            let df = 1.0 + g * (1.0 + diode_slope(v, p));
            if df.abs() < DERIVATIVE_GUARD {
                break;
            }
            let step = (f / df).max(-MAX_STEP_UP);
            v -= step;
            iterations += 1;
            if step.abs() < STEP_TOLERANCE {
                break;
            }
        }

        let stats = SolveStats {
            iterations,
            residual: residual(v).abs(),
        };
        (v, stats)
    }
}

impl ResonantFilter for DiodeOnePole {
    fn reset(&mut self, sample_rate: f64) -> bool {
        self.sample_rate = sample_rate;
        self.v_prev = 0.0;
        self.x_prev = 0.0;
        self.last = SolveStats::default();
        if self.fc > 0.0 {
            self.update();
        }
        true
    }

    fn update(&mut self) -> bool {
        self.coeffs.g = prewarp(self.fc, self.sample_rate);
        true
    }

    /// `q` is the diode scale `p`.
    fn set_filter_params(&mut self, fc: f64, q: f64) {
        if fc != self.fc || q != self.coeffs.nonlinear {
            self.fc = fc;
            self.coeffs.nonlinear = q;
            self.update();
        }
    }

    #[inline]
    fn process(&mut self, x: f64) -> FilterOutput {
        let (v, stats) = self.solve(x);
        self.v_prev = v;
        self.x_prev = x;
        self.last = stats;

        let hpf = x - v;
        FilterOutput {
            lpf1: v,
            lpf2: v,
            hpf1: hpf,
            hpf2: hpf,
            anm_lpf1: v,
            anm_lpf2: v,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::one_pole::OnePoleStage;
    use quickcheck_macros::quickcheck;
    use std::f64::consts::PI;

    fn diode_at(fc: f64, p: f64, sr: f64) -> DiodeOnePole {
        let mut f = DiodeOnePole::new();
        f.reset(sr);
        f.set_filter_params(fc, p);
        f
    }

    #[quickcheck]
    fn check_newton_converges(p: u16, amplitude: u16) -> bool {
        let sr = 44100.0;
        let p = p as f64 / u16::MAX as f64;
        let amplitude = amplitude as f64 / u16::MAX as f64 * 2.0 - 1.0;
        let mut f = diode_at(1000.0, p, sr);
        (0..1500).all(|i| {
            let x = amplitude * (2.0 * PI * 1000.0 * i as f64 / sr).sin();
            let y = f.process(x).lpf2;
            let stats = f.last_solve();
            y.is_finite() && stats.residual < 1e-6 && stats.iterations <= MAX_ITERATIONS
        })
    }

    #[test]
    fn test_full_scale_extremes_converge() {
        let sr = 44100.0;
        for &p in &[1e-6, 1e-3, 0.05, 0.5, 1.0] {
            for &amplitude in &[-1.0, 1.0] {
                let mut f = diode_at(1000.0, p, sr);
                for i in 0..1500 {
                    let x = amplitude * (2.0 * PI * 1000.0 * i as f64 / sr).sin();
                    let y = f.process(x).lpf2;
                    let r = f.last_solve().residual;
                    assert!(y.is_finite(), "p={p} amp={amplitude}: non-finite at {i}");
                    assert!(r < 1e-6, "p={p} amp={amplitude}: residual {r:e} at sample {i}");
                }
            }
        }
    }

    #[test]
    fn test_low_sine_stays_bounded() {
        let sr = 48000.0;
        let mut f = diode_at(1000.0, 0.3, sr);
        for i in 0..48000 {
            let x = 0.5 * (2.0 * PI * 100.0 * i as f64 / sr).sin();
            let y = f.process(x).lpf2;
            assert!(y.is_finite() && y.abs() <= 1.2, "sample {i}: {y}");
        }
    }

    #[test]
    fn test_zero_diode_is_linear_one_pole() {
        // p = 0: F is linear, one Newton step lands on the TPT one-pole output
        let sr = 44100.0;
        let fc = 800.0;
        let mut f = diode_at(fc, 0.0, sr);
        let mut stage = OnePoleStage::new();
        stage.reset();
        let g = prewarp(fc, sr);
        stage.set_alpha(g / (1.0 + g));

        for i in 0..2000 {
            let x = (2.0 * PI * 300.0 * i as f64 / sr).sin() * 0.8;
            let y = f.process(x).lpf2;
            let reference = stage.process(x).lpf;
            assert!((y - reference).abs() < 1e-9, "sample {i}: {y} vs {reference}");
        }
    }

    #[test]
    fn test_diode_compresses_positive_swing() {
        let sr = 44100.0;
        let mut linear = diode_at(2000.0, 0.0, sr);
        let mut clipped = diode_at(2000.0, 0.5, sr);
        let mut peak_linear = 0.0f64;
        let mut peak_clipped = 0.0f64;
        for i in 0..4410 {
            let x = 0.8 * (2.0 * PI * 100.0 * i as f64 / sr).sin();
            peak_linear = peak_linear.max(linear.process(x).lpf2);
            peak_clipped = peak_clipped.max(clipped.process(x).lpf2);
        }
        assert!(
            peak_clipped < 0.5 * peak_linear,
            "diode should clamp the positive swing: {peak_clipped} vs {peak_linear}"
        );
    }

    #[test]
    fn test_reset_keeps_injected_coefficients() {
        let mut f = diode_at(1000.0, 0.2, 48000.0);
        f.set_coeffs(DiodeCoeffs {
            g: prewarp(5000.0, 48000.0),
            nonlinear: 0.7,
        });
        f.reset(96000.0);
        let c = f.coeffs();
        assert!((c.g - prewarp(5000.0, 96000.0)).abs() < 1e-12);
        assert_eq!(c.nonlinear, 0.7);
    }

    #[test]
    fn test_reset_and_determinism() {
        let sr = 44100.0;
        let mut a = diode_at(1500.0, 0.4, sr);
        let mut b = DiodeOnePole::new();
        b.reset(sr);
        a.copy_coeffs(&mut b);
        for i in 0..1000 {
            let x = ((i * 13) % 29) as f64 / 14.0 - 1.0;
            assert_eq!(a.process(x).lpf2.to_bits(), b.process(x).lpf2.to_bits());
        }
        a.reset(sr);
        assert_eq!(a.last_solve(), SolveStats::default());
        for _ in 0..4 {
            assert_eq!(a.process(0.0), FilterOutput::default());
        }
    }
}
