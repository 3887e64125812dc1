//! ZDF filter DSP library: zero-delay-feedback resonant filters.
//!
//! Pure DSP math with no audio framework dependencies.

// Shared interface and building block
pub mod error;
pub mod filter;
pub mod one_pole;

// Resonant topologies
pub mod diode;
pub mod ladder;
pub mod matrix;

// Signal chain
pub mod engine;
pub mod preconditioner;
pub mod stage;

pub use engine::{EngineParams, FilterEngine, MAX_CHANNELS};
pub use error::FilterError;
pub use filter::{FilterOutput, ResonantFilter, Tap};
pub use stage::{ResonantStage, Topology};
