// ZDF Filter: zero-delay-feedback resonant filter effect plugin (CLAP + VST3).

use nih_plug::prelude::*;
use std::num::NonZeroU32;
use std::sync::Arc;
use zdf_dsp::{EngineParams, FilterEngine, MAX_CHANNELS, Topology};

mod params;
use params::ZdfFilterParams;

struct ZdfFilter {
    params: Arc<ZdfFilterParams>,
    engine: FilterEngine,
    sample_rate: f64,
}

impl Default for ZdfFilter {
    fn default() -> Self {
        let sr = 44100.0;
        Self {
            params: Arc::new(ZdfFilterParams::default()),
            engine: FilterEngine::new(Topology::default(), sr),
            sample_rate: sr,
        }
    }
}

impl ZdfFilter {
    /// Read the host's parameter values once for a block of `len` samples.
    fn block_params(&self, len: usize) -> EngineParams {
        let steps = len as u32;
        EngineParams {
            cutoff_hz: self.params.cutoff.smoothed.next_step(steps) as f64,
            resonance: self.params.resonance.smoothed.next_step(steps) as f64,
            drive: self.params.drive.smoothed.next_step(steps) as f64,
            hp_cutoff_hz: self.params.hp_cutoff.smoothed.next_step(steps) as f64,
            tap: self.params.mode.value().into(),
        }
    }
}

impl Plugin for ZdfFilter {
    const NAME: &'static str = "ZDF Filter";
    const VENDOR: &'static str = "hal0zer0";
    const URL: &'static str = "https://github.com/hal0zer0/zdf-filter";
    const EMAIL: &'static str = "";
    const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    const AUDIO_IO_LAYOUTS: &'static [AudioIOLayout] = &[
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(2),
            main_output_channels: NonZeroU32::new(2),
            aux_input_ports: &[],
            aux_output_ports: &[],
            names: PortNames::const_default(),
        },
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(1),
            main_output_channels: NonZeroU32::new(1),
            ..AudioIOLayout::const_default()
        },
    ];

    const SAMPLE_ACCURATE_AUTOMATION: bool = false;

    type SysExMessage = ();
    type BackgroundTask = ();

    fn params(&self) -> Arc<dyn Params> {
        self.params.clone()
    }

    fn initialize(
        &mut self,
        audio_io_layout: &AudioIOLayout,
        buffer_config: &BufferConfig,
        _context: &mut impl InitContext<Self>,
    ) -> bool {
        self.sample_rate = buffer_config.sample_rate as f64;

        let channels = audio_io_layout
            .main_output_channels
            .map(NonZeroU32::get)
            .unwrap_or(0) as usize;
        nih_debug_assert!(channels <= MAX_CHANNELS);

        // Rebuild at the host rate; the topology switch itself happens in process()
        self.engine = FilterEngine::new(self.params.topology.value().into(), self.sample_rate);
        self.engine.set_params(&self.block_params(1));
        nih_log!(
            "ZDF Filter initialized: {} channel(s) at {} Hz",
            channels,
            self.sample_rate
        );

        true
    }

    fn reset(&mut self) {
        self.engine.reset(self.sample_rate);
    }

    fn process(
        &mut self,
        buffer: &mut Buffer,
        _aux: &mut AuxiliaryBuffers,
        _context: &mut impl ProcessContext<Self>,
    ) -> ProcessStatus {
        let num_samples = buffer.samples();
        if num_samples == 0 {
            return ProcessStatus::Normal;
        }

        let topology: Topology = self.params.topology.value().into();
        if topology != self.engine.topology() {
            // Swapping clears state and logs; both are rare, user-driven events
            util::permit_alloc(|| self.engine.set_topology(topology));
        }

        // Coefficients are derived once per block, never per sample
        let block_params = self.block_params(num_samples);
        self.engine.set_params(&block_params);

        for (channel, samples) in buffer.as_slice().iter_mut().enumerate() {
            self.engine.process_block(channel, samples);
        }

        // Per-sample smoothing prevents zipper noise on output level changes
        for mut channel_samples in buffer.iter_samples() {
            let gain = self.params.output.smoothed.next();
            for s in channel_samples.iter_mut() {
                *s *= gain;
            }
        }

        ProcessStatus::Normal
    }
}

impl ClapPlugin for ZdfFilter {
    const CLAP_ID: &'static str = "com.hal0zer0.zdf-filter";
    const CLAP_DESCRIPTION: Option<&'static str> =
        Some("Zero-delay-feedback resonant filter with ladder, matrix and diode topologies");
    const CLAP_MANUAL_URL: Option<&'static str> = None;
    const CLAP_SUPPORT_URL: Option<&'static str> = None;
    const CLAP_FEATURES: &'static [ClapFeature] = &[
        ClapFeature::AudioEffect,
        ClapFeature::Filter,
        ClapFeature::Stereo,
        ClapFeature::Mono,
    ];
}

impl Vst3Plugin for ZdfFilter {
    const VST3_CLASS_ID: [u8; 16] = *b"ZdfFilterHal0zer";
    const VST3_SUBCATEGORIES: &'static [Vst3SubCategory] =
        &[Vst3SubCategory::Fx, Vst3SubCategory::Filter];
}

nih_export_clap!(ZdfFilter);
nih_export_vst3!(ZdfFilter);
