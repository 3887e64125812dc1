//! Coupled two-pole resonator solved by direct 2x2 inversion.
//!
//! Two one-pole integrators, the second fed by the first, with resonance
//! feedback R from v2 back into the first. Per sample, with a = tan(pi*fc/fs):
//!
//!   E = v1[n-1]*(1-a) + a*(x[n] + x[n-1])
//!   F = v2[n-1]*(1-a) + a*v1[n-1]
//!
//!   | 1+a   -a*R | |v1|   |E|
//!   | -a     1+a | |v2| = |F|
//!
//!   Det = (1+a)^2 - a^2*R
//!
//! Both unknowns come out exactly in one step; no iteration.
//!
//! Stability (Jury test on the characteristic quadratic
//! Det*z^2 - (2(1-a^2) + a^2*R)*z + (1-a)^2):
//!   R < 2      keeps the DC pole inside the unit circle (DC gain is 2/(2-R))
//!   R < 4/a    keeps the pole product inside it, which matters once a > 2
//! Inside that region Det > (1-a)^2 >= 0, so the inversion is never singular.
//! Every feedback value reaching the solver is clamped to STABILITY_MARGIN of
//! that limit; direct `set_feedback` calls beyond it are rejected.

use crate::error::FilterError;
use crate::filter::{FilterOutput, ResonantFilter, prewarp, unwarp};

/// Ceiling of the musical Q -> R mappings.
pub const MAX_FEEDBACK: f64 = 0.99;

/// Fraction of the stability limit that R may reach.
pub const STABILITY_MARGIN: f64 = 0.9;

/// Default scale for the logarithmic curve: Q = 10 lands on MAX_FEEDBACK.
pub const LOG_CURVE_SCALE: f64 = 0.99;

/// Largest R for which the discretized pair stays stable at integrator gain `a`.
pub fn stability_limit(a: f64) -> f64 {
    if a > 0.0 { (4.0 / a).min(2.0) } else { 2.0 }
}

/// Largest R the resonator accepts at integrator gain `a`.
pub fn max_feedback(a: f64) -> f64 {
    STABILITY_MARGIN * stability_limit(a)
}

/// Musical Q -> resonance feedback R.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum FeedbackCurve {
    /// R = 1 - 1/(2Q)
    #[default]
    Linear,
    /// R = scale * log10(Q)
    Logarithmic { scale: f64 },
}

impl FeedbackCurve {
    pub fn feedback(&self, q: f64) -> f64 {
        let r = match *self {
            Self::Linear => 1.0 - 1.0 / (2.0 * q),
            Self::Logarithmic { scale } => scale * q.log10(),
        };
        r.min(MAX_FEEDBACK)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MatrixCoeffs {
    /// Prewarped integrator gain (wc*T/2)
    pub a: f64,
    /// Resonance feedback, already clamped
    pub r: f64,
}

/// Precomputed system matrix and inverse determinant.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MatrixSolver {
    m00: f64,
    m01: f64,
    m10: f64,
    m11: f64,
    inv_det: f64,
    one_minus_a: f64,
    a: f64,
}

impl MatrixSolver {
    pub fn new(coeffs: MatrixCoeffs) -> Self {
        let a = coeffs.a;
        let m00 = 1.0 + a;
        let m01 = -a * coeffs.r;
        let m10 = -a;
        let m11 = 1.0 + a;
        Self {
            m00,
            m01,
            m10,
            m11,
            inv_det: 1.0 / (m00 * m11 - m01 * m10),
            one_minus_a: 1.0 - a,
            a,
        }
    }

    /// Det = (1+a)^2 - a^2*R
    pub fn det(&self) -> f64 {
        self.m00 * self.m11 - self.m01 * self.m10
    }

    /// Cramer's rule on the 2x2 system.
    #[inline]
    pub fn solve(&self, e: f64, f: f64) -> (f64, f64) {
        let v1 = (e * self.m11 - self.m01 * f) * self.inv_det;
        let v2 = (self.m00 * f - self.m10 * e) * self.inv_det;
        (v1, v2)
    }
}

pub struct MatrixResonator {
    coeffs: MatrixCoeffs,
    solver: MatrixSolver,
    curve: FeedbackCurve,
    sample_rate: f64,
    fc: f64,
    q: f64,
    /// Feedback before the cutoff-dependent clamp
    requested_r: f64,
    v1: f64,
    v2: f64,
    x_prev: f64,
}

impl Default for MatrixResonator {
    fn default() -> Self {
        Self::new()
    }
}

impl MatrixResonator {
    pub fn new() -> Self {
        Self::with_curve(FeedbackCurve::Linear)
    }

    pub fn with_curve(curve: FeedbackCurve) -> Self {
        let coeffs = MatrixCoeffs::default();
        Self {
            coeffs,
            solver: MatrixSolver::new(coeffs),
            curve,
            sample_rate: 44100.0,
            fc: 0.0,
            q: f64::NAN,
            requested_r: 0.0,
            v1: 0.0,
            v2: 0.0,
            x_prev: 0.0,
        }
    }

    pub fn coeffs(&self) -> MatrixCoeffs {
        self.coeffs
    }

    pub fn solver(&self) -> MatrixSolver {
        self.solver
    }

    pub fn curve(&self) -> FeedbackCurve {
        self.curve
    }

    /// Swap the Q -> R policy, re-deriving R for the stored Q.
    pub fn set_curve(&mut self, curve: FeedbackCurve) {
        self.curve = curve;
        if self.q.is_finite() {
            self.requested_r = curve.feedback(self.q);
            self.update();
        }
    }

    /// Set R directly, bypassing the Q curve.
    ///
    /// Rejects values at or beyond `max_feedback(a)` for the current cutoff
    /// and keeps the previous feedback in that case.
    pub fn set_feedback(&mut self, r: f64) -> Result<(), FilterError> {
        if !r.is_finite() {
            return Err(FilterError::NonFiniteParameter {
                name: "feedback",
                value: r,
            });
        }
        let limit = max_feedback(self.coeffs.a);
        if r >= limit {
            log::warn!("rejecting matrix feedback {r}: limit at a={} is {limit}", self.coeffs.a);
            return Err(FilterError::UnstableFeedback { r, limit });
        }
        self.requested_r = r;
        self.apply(MatrixCoeffs { a: self.coeffs.a, r });
        Ok(())
    }

    /// Inject coefficients directly. `r` is clamped into the stable region.
    ///
    /// The cutoff implied by `a` and the unclamped `r` become the stored
    /// settings, so a later `reset` retunes the injected pair for the new rate.
    pub fn set_coeffs(&mut self, coeffs: MatrixCoeffs) {
        self.fc = unwarp(coeffs.a, self.sample_rate);
        self.requested_r = coeffs.r;
        self.apply(coeffs);
    }

    fn apply(&mut self, coeffs: MatrixCoeffs) {
        let r = coeffs.r.min(max_feedback(coeffs.a));
        self.coeffs = MatrixCoeffs { a: coeffs.a, r };
        self.solver = MatrixSolver::new(self.coeffs);
    }

    pub fn copy_coeffs(&self, destination: &mut MatrixResonator) {
        destination.set_coeffs(self.coeffs);
    }
}

impl ResonantFilter for MatrixResonator {
    fn reset(&mut self, sample_rate: f64) -> bool {
        self.sample_rate = sample_rate;
        self.v1 = 0.0;
        self.v2 = 0.0;
        self.x_prev = 0.0;
        if self.fc > 0.0 {
            self.update();
        }
        true
    }

    fn update(&mut self) -> bool {
        let a = prewarp(self.fc, self.sample_rate);
        self.apply(MatrixCoeffs {
            a,
            r: self.requested_r,
        });
        true
    }

    fn set_filter_params(&mut self, fc: f64, q: f64) {
        if fc != self.fc || q != self.q {
            self.fc = fc;
            self.q = q;
            self.requested_r = self.curve.feedback(q);
            self.update();
        }
    }

    #[inline]
    fn process(&mut self, x: f64) -> FilterOutput {
        let s = &self.solver;
        let e = self.v1 * s.one_minus_a + s.a * (x + self.x_prev);
        let f = self.v2 * s.one_minus_a + s.a * self.v1;
        let (v1, v2) = s.solve(e, f);

        self.v1 = v1;
        self.v2 = v2;
        self.x_prev = x;

        FilterOutput {
            lpf1: v1,
            lpf2: v2,
            hpf1: x - v1,
            hpf2: x - v2,
            anm_lpf1: v1,
            anm_lpf2: v2,
        }
    }
}
