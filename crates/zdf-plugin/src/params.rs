use nih_plug::prelude::*;
use zdf_dsp::{Tap, Topology};

/// Which delay-free loop solver runs.
#[derive(Enum, Debug, PartialEq, Eq, Clone, Copy)]
pub enum FilterTopology {
    #[id = "ladder"]
    #[name = "Ladder (closed form)"]
    ClosedForm,
    #[id = "matrix"]
    #[name = "Matrix (2x2 solve)"]
    Matrix,
    #[id = "diode"]
    #[name = "Diode (Newton)"]
    Newton,
}

impl From<FilterTopology> for Topology {
    fn from(t: FilterTopology) -> Self {
        match t {
            FilterTopology::ClosedForm => Topology::ClosedForm,
            FilterTopology::Matrix => Topology::Matrix,
            FilterTopology::Newton => Topology::Newton,
        }
    }
}

#[derive(Enum, Debug, PartialEq, Eq, Clone, Copy)]
pub enum FilterMode {
    #[name = "Lowpass"]
    Lowpass,
    #[name = "Highpass"]
    Highpass,
}

impl From<FilterMode> for Tap {
    fn from(m: FilterMode) -> Self {
        match m {
            FilterMode::Lowpass => Tap::Lowpass,
            FilterMode::Highpass => Tap::Highpass,
        }
    }
}

#[derive(Params)]
pub struct ZdfFilterParams {
    /// Resonant stage cutoff in Hz.
    #[id = "cutoff"]
    pub cutoff: FloatParam,

    /// Shared resonance control (0..1), mapped per topology.
    #[id = "res"]
    pub resonance: FloatParam,

    /// Pre-conditioner drive: 10^(drive/2) gain into tanh.
    #[id = "drive"]
    pub drive: FloatParam,

    /// Pre-conditioner high-pass cutoff in Hz.
    #[id = "hp_cutoff"]
    pub hp_cutoff: FloatParam,

    #[id = "topology"]
    pub topology: EnumParam<FilterTopology>,

    #[id = "mode"]
    pub mode: EnumParam<FilterMode>,

    /// Output level (linear gain, shown in dB).
    #[id = "output"]
    pub output: FloatParam,
}

impl Default for ZdfFilterParams {
    fn default() -> Self {
        Self {
            cutoff: FloatParam::new(
                "Cutoff",
                1000.0,
                FloatRange::Skewed {
                    min: 20.0,
                    max: 20_000.0,
                    factor: FloatRange::skew_factor(-2.0),
                },
            )
            .with_smoother(SmoothingStyle::Logarithmic(20.0))
            .with_value_to_string(formatters::v2s_f32_hz_then_khz(0))
            .with_string_to_value(formatters::s2v_f32_hz_then_khz()),

            resonance: FloatParam::new(
                "Resonance",
                0.5,
                FloatRange::Linear { min: 0.0, max: 1.0 },
            )
            .with_smoother(SmoothingStyle::Linear(20.0))
            .with_unit(" %")
            .with_value_to_string(formatters::v2s_f32_percentage(0))
            .with_string_to_value(formatters::s2v_f32_percentage()),

            drive: FloatParam::new("Drive", 0.0, FloatRange::Linear { min: 0.0, max: 2.0 })
                .with_smoother(SmoothingStyle::Linear(20.0))
                .with_step_size(0.01),

            hp_cutoff: FloatParam::new(
                "HP Cutoff",
                20.0,
                FloatRange::Skewed {
                    min: 10.0,
                    max: 2000.0,
                    factor: FloatRange::skew_factor(-2.0),
                },
            )
            .with_smoother(SmoothingStyle::Logarithmic(20.0))
            .with_value_to_string(formatters::v2s_f32_hz_then_khz(0))
            .with_string_to_value(formatters::s2v_f32_hz_then_khz()),

            topology: EnumParam::new("Topology", FilterTopology::ClosedForm),

            mode: EnumParam::new("Mode", FilterMode::Lowpass),

            output: FloatParam::new(
                "Output",
                util::db_to_gain(0.0),
                FloatRange::Skewed {
                    min: util::db_to_gain(-24.0),
                    max: util::db_to_gain(12.0),
                    factor: FloatRange::gain_skew_factor(-24.0, 12.0),
                },
            )
            .with_smoother(SmoothingStyle::Logarithmic(5.0))
            .with_unit(" dB")
            .with_value_to_string(formatters::v2s_f32_gain_to_db(1))
            .with_string_to_value(formatters::s2v_f32_gain_to_db()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_engine_defaults() {
        let params = ZdfFilterParams::default();
        let engine = zdf_dsp::EngineParams::default();
        assert_eq!(params.cutoff.default_plain_value() as f64, engine.cutoff_hz);
        assert_eq!(params.resonance.default_plain_value() as f64, engine.resonance);
        assert_eq!(params.drive.default_plain_value() as f64, engine.drive);
        assert_eq!(params.hp_cutoff.default_plain_value() as f64, engine.hp_cutoff_hz);
        assert_eq!(Topology::from(params.topology.value()), Topology::default());
        assert_eq!(Tap::from(params.mode.value()), engine.tap);
    }
}
