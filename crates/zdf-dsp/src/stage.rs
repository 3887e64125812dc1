//! Runtime-selectable resonant stage.
//!
//! The three topologies solve the same delay-free loop three different ways;
//! which one runs is a configuration value, not a type parameter, so the
//! plugin and the CLI can switch between them without monomorphizing.

use crate::diode::{DiodeOnePole, SolveStats};
use crate::filter::{FilterOutput, ResonantFilter};
use crate::ladder::{GUI_Q_MIN, ResonanceMap, SyncTunedLadder};
use crate::matrix::{FeedbackCurve, MatrixResonator};

/// Highest K the shared resonance control reaches on the ladder.
///
/// The loop has no saturation, so at K = 2 a tone at cutoff grows without
/// bound. 1.9 keeps the resonant peak near +22 dB.
pub const LADDER_K_CEILING: f64 = 1.9;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Topology {
    /// Sync-tuned ladder, loop closed with `alpha0`
    #[default]
    ClosedForm,
    /// Coupled two-pole, 2x2 solve
    Matrix,
    /// Diode one-pole, Newton-Raphson
    Newton,
}

impl Topology {
    pub const ALL: [Topology; 3] = [Topology::ClosedForm, Topology::Matrix, Topology::Newton];

    pub fn name(self) -> &'static str {
        match self {
            Topology::ClosedForm => "closed-form",
            Topology::Matrix => "matrix",
            Topology::Newton => "newton",
        }
    }

    /// Map the shared 0..1 resonance control onto this topology's `q`.
    ///
    ///   ClosedForm: q from 1 up to the q of LADDER_K_CEILING
    ///   Matrix:     q = 0.5 + 9.5*res  (Q before the feedback curve)
    ///   Newton:     q = res            (diode scale p)
    pub fn q_from_resonance(self, resonance: f64) -> f64 {
        match self {
            Topology::ClosedForm => {
                let q_max = ResonanceMap::KORG35.inverse(LADDER_K_CEILING);
                GUI_Q_MIN + (q_max - GUI_Q_MIN) * resonance
            }
            Topology::Matrix => 0.5 + 9.5 * resonance,
            Topology::Newton => resonance,
        }
    }
}

pub enum ResonantStage {
    Ladder(SyncTunedLadder),
    Matrix(MatrixResonator),
    Diode(DiodeOnePole),
}

impl ResonantStage {
    pub fn new(topology: Topology) -> Self {
        match topology {
            Topology::ClosedForm => Self::Ladder(SyncTunedLadder::new()),
            Topology::Matrix => Self::Matrix(MatrixResonator::new()),
            Topology::Newton => Self::Diode(DiodeOnePole::new()),
        }
    }

    pub fn topology(&self) -> Topology {
        match self {
            Self::Ladder(_) => Topology::ClosedForm,
            Self::Matrix(_) => Topology::Matrix,
            Self::Diode(_) => Topology::Newton,
        }
    }

    /// Cutoff in Hz plus the shared 0..1 resonance control.
    pub fn set_controls(&mut self, cutoff_hz: f64, resonance: f64) {
        let q = self.topology().q_from_resonance(resonance);
        self.set_filter_params(cutoff_hz, q);
    }

    /// Q -> R policy for the matrix stage. The other topologies ignore it.
    pub fn set_curve(&mut self, curve: FeedbackCurve) {
        if let Self::Matrix(f) = self {
            f.set_curve(curve);
        }
    }

    /// Newton statistics of the last sample; `None` for the linear topologies.
    pub fn last_solve(&self) -> Option<SolveStats> {
        match self {
            Self::Diode(f) => Some(f.last_solve()),
            _ => None,
        }
    }
}

impl ResonantFilter for ResonantStage {
    fn reset(&mut self, sample_rate: f64) -> bool {
        match self {
            Self::Ladder(f) => f.reset(sample_rate),
            Self::Matrix(f) => f.reset(sample_rate),
            Self::Diode(f) => f.reset(sample_rate),
        }
    }

    fn update(&mut self) -> bool {
        match self {
            Self::Ladder(f) => f.update(),
            Self::Matrix(f) => f.update(),
            Self::Diode(f) => f.update(),
        }
    }

    #[inline]
    fn process(&mut self, x: f64) -> FilterOutput {
        match self {
            Self::Ladder(f) => f.process(x),
            Self::Matrix(f) => f.process(x),
            Self::Diode(f) => f.process(x),
        }
    }

    fn set_filter_params(&mut self, fc: f64, q: f64) {
        match self {
            Self::Ladder(f) => f.set_filter_params(fc, q),
            Self::Matrix(f) => f.set_filter_params(fc, q),
            Self::Diode(f) => f.set_filter_params(fc, q),
        }
    }
}
