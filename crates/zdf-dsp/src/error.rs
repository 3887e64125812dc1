//! Errors surfaced to calling layers.
//!
//! The per-sample path never returns these. They come from parameter
//! validation and from direct coefficient setters that would otherwise
//! leave a topology in an unstable state.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum FilterError {
    #[error("sample rate must be positive and finite, got {0}")]
    InvalidSampleRate(f64),

    #[error("cutoff {fc} Hz must be below {limit} Hz at this sample rate")]
    CutoffAboveNyquist { fc: f64, limit: f64 },

    #[error("resonance feedback {r} is at or above the stability limit {limit}")]
    UnstableFeedback { r: f64, limit: f64 },

    #[error("parameter `{name}` is not finite ({value})")]
    NonFiniteParameter { name: &'static str, value: f64 },
}
