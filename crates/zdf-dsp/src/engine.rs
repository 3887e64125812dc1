//! Per-channel filter engine: pre-conditioner into a resonant stage.
//!
//! Signal chain per channel:
//!   x -> PreConditioner (HP extract, drive, tanh) -> ResonantStage -> tap
//!
//! Channel state lives in a fixed array; nothing here allocates after
//! construction. Parameters arrive once per block through `set_params`.

use crate::error::FilterError;
use crate::filter::{ResonantFilter, Tap};
use crate::matrix::FeedbackCurve;
use crate::preconditioner::PreConditioner;
use crate::stage::{ResonantStage, Topology};

pub const MAX_CHANNELS: usize = 2;
pub const MIN_CUTOFF_HZ: f64 = 10.0;
/// Cutoffs are kept below this fraction of the sample rate.
pub const MAX_CUTOFF_RATIO: f64 = 0.45;
pub const MAX_DRIVE: f64 = 2.0;

/// Live control values, read from the host once per block.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EngineParams {
    pub cutoff_hz: f64,
    /// Shared 0..1 resonance control, mapped per topology
    pub resonance: f64,
    /// 0..MAX_DRIVE, exponential gain into the saturator
    pub drive: f64,
    pub hp_cutoff_hz: f64,
    pub tap: Tap,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            cutoff_hz: 1000.0,
            resonance: 0.5,
            drive: 0.0,
            hp_cutoff_hz: 20.0,
            tap: Tap::Lowpass,
        }
    }
}

fn clamp_or(value: f64, lo: f64, hi: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value.clamp(lo, hi)
    } else {
        fallback
    }
}

impl EngineParams {
    /// Clamp every control into its valid range for `sample_rate`.
    ///
    /// Non-finite values fall back to the defaults.
    pub fn sanitized(&self, sample_rate: f64) -> Self {
        let defaults = Self::default();
        let max_cutoff = (MAX_CUTOFF_RATIO * sample_rate).max(MIN_CUTOFF_HZ);
        Self {
            cutoff_hz: clamp_or(
                self.cutoff_hz,
                MIN_CUTOFF_HZ,
                max_cutoff,
                defaults.cutoff_hz.min(max_cutoff),
            ),
            resonance: clamp_or(self.resonance, 0.0, 1.0, defaults.resonance),
            drive: clamp_or(self.drive, 0.0, MAX_DRIVE, defaults.drive),
            hp_cutoff_hz: clamp_or(
                self.hp_cutoff_hz,
                MIN_CUTOFF_HZ,
                max_cutoff,
                defaults.hp_cutoff_hz.min(max_cutoff),
            ),
            tap: self.tap,
        }
    }

    /// Reject a bad sample rate, non-finite controls and cutoffs above the
    /// usable range. Everything else is clamped as in `sanitized`.
    pub fn validate(&self, sample_rate: f64) -> Result<Self, FilterError> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(FilterError::InvalidSampleRate(sample_rate));
        }
        for (name, value) in [
            ("cutoff_hz", self.cutoff_hz),
            ("resonance", self.resonance),
            ("drive", self.drive),
            ("hp_cutoff_hz", self.hp_cutoff_hz),
        ] {
            if !value.is_finite() {
                return Err(FilterError::NonFiniteParameter { name, value });
            }
        }
        let limit = MAX_CUTOFF_RATIO * sample_rate;
        for fc in [self.cutoff_hz, self.hp_cutoff_hz] {
            if fc > limit {
                return Err(FilterError::CutoffAboveNyquist { fc, limit });
            }
        }
        Ok(self.sanitized(sample_rate))
    }
}

struct ChannelStrip {
    pre: PreConditioner,
    stage: ResonantStage,
}

impl ChannelStrip {
    fn new(topology: Topology) -> Self {
        Self {
            pre: PreConditioner::new(),
            stage: ResonantStage::new(topology),
        }
    }

    fn reset(&mut self, sample_rate: f64) {
        self.pre.reset(sample_rate);
        self.stage.reset(sample_rate);
    }

    fn apply(&mut self, params: &EngineParams) {
        self.pre.set_params(params.hp_cutoff_hz, params.drive);
        self.stage.set_controls(params.cutoff_hz, params.resonance);
    }
}

pub struct FilterEngine {
    channels: [ChannelStrip; MAX_CHANNELS],
    topology: Topology,
    curve: FeedbackCurve,
    params: EngineParams,
    sample_rate: f64,
}

impl FilterEngine {
    pub fn new(topology: Topology, sample_rate: f64) -> Self {
        let mut engine = Self {
            channels: std::array::from_fn(|_| ChannelStrip::new(topology)),
            topology,
            curve: FeedbackCurve::default(),
            params: EngineParams::default(),
            sample_rate,
        };
        engine.reset(sample_rate);
        engine
    }

    /// Zero all channel state and re-derive coefficients for `sample_rate`.
    pub fn reset(&mut self, sample_rate: f64) -> bool {
        self.sample_rate = sample_rate;
        self.params = self.params.sanitized(sample_rate);
        for ch in &mut self.channels {
            ch.reset(sample_rate);
            ch.apply(&self.params);
        }
        log::debug!(
            "filter engine reset: {} at {sample_rate} Hz",
            self.topology.name()
        );
        true
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    pub fn params(&self) -> EngineParams {
        self.params
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn curve(&self) -> FeedbackCurve {
        self.curve
    }

    /// Matrix Q -> R policy. Kept across topology switches.
    pub fn set_curve(&mut self, curve: FeedbackCurve) {
        self.curve = curve;
        for ch in &mut self.channels {
            ch.stage.set_curve(curve);
        }
    }

    /// Swap the resonant stage on every channel. State starts from zero.
    pub fn set_topology(&mut self, topology: Topology) {
        if topology == self.topology {
            return;
        }
        log::debug!("topology {} -> {}", self.topology.name(), topology.name());
        self.topology = topology;
        for ch in &mut self.channels {
            ch.stage = ResonantStage::new(topology);
            ch.stage.set_curve(self.curve);
        }
        self.reset(self.sample_rate);
    }

    /// Call once per block, outside the sample loop.
    pub fn set_params(&mut self, params: &EngineParams) {
        self.params = params.sanitized(self.sample_rate);
        for ch in &mut self.channels {
            ch.apply(&self.params);
        }
    }

    /// Borrow one channel's resonant stage (diagnostics, coefficient copies).
    pub fn stage(&self, channel: usize) -> Option<&ResonantStage> {
        self.channels.get(channel).map(|ch| &ch.stage)
    }

    /// Channels beyond `MAX_CHANNELS` pass through untouched.
    #[inline]
    pub fn process_sample(&mut self, channel: usize, x: f64) -> f64 {
        let tap = self.params.tap;
        match self.channels.get_mut(channel) {
            Some(ch) => {
                let driven = ch.pre.process(x);
                ch.stage.process(driven).tap(tap)
            }
            None => x,
        }
    }

    pub fn process_block(&mut self, channel: usize, samples: &mut [f32]) {
        for s in samples.iter_mut() {
            *s = self.process_sample(channel, *s as f64) as f32;
        }
    }
}
