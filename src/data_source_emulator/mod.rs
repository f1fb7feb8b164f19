//! Emulator data source - generates synthetic acquisition cycles
//!
//! Each emulated channel delivers one bunch covering the whole readout
//! window:
//! - Gaussian noise around a configurable pedestal
//! - with a given probability per channel, one pulse with fast linear rise
//!   and exponential decay, amplitude drawn from an exponential distribution
//!
//! Samples are clamped to the 10 bit ADC range.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Exp, Normal};
use serde::Deserialize;
use tracing::{debug, info};

use crate::common::{
    Bunch, ChannelId, RawChannel, RawEvent, Sample, TimeframeError, TimeframeResult, SIGNAL_RANGE,
};
use crate::reader::EventSource;

/// Emulator configuration (`[input.emulator]` section)
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EmulatorConfig {
    /// First emulated DDL number
    pub first_ddl: u16,
    /// Number of emulated DDLs
    pub ddls: u16,
    /// Channels (hardware addresses 0..n) per DDL
    pub channels_per_ddl: u16,
    /// Timebins of the readout window
    pub readout_length: usize,
    /// Mean pedestal in ADC counts
    pub pedestal: f64,
    /// Standard deviation of the pedestal noise
    pub noise_sigma: f64,
    /// Probability of a pulse per channel and cycle
    pub pulse_probability: f64,
    /// Mean pulse amplitude in ADC counts
    pub pulse_amplitude: f64,
    /// Rise time in timebins
    pub rise_time: usize,
    /// Decay constant in timebins
    pub decay_time: f64,
    /// Number of cycles to deliver (None = unlimited)
    pub events: Option<u64>,
    /// Random seed (None = from entropy)
    pub seed: Option<u64>,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            first_ddl: 0,
            ddls: 2,
            channels_per_ddl: 16,
            readout_length: 1000,
            pedestal: 50.0,
            noise_sigma: 1.0,
            pulse_probability: 0.2,
            pulse_amplitude: 100.0,
            rise_time: 2,
            decay_time: 4.0,
            events: None,
            seed: None,
        }
    }
}

/// Synthetic event source
pub struct EmulatorSource {
    config: EmulatorConfig,
    rng: StdRng,
    noise: Normal<f64>,
    amplitude: Exp<f64>,
    generated: u64,
}

impl EmulatorSource {
    pub fn new(config: EmulatorConfig) -> TimeframeResult<Self> {
        let noise = Normal::new(config.pedestal, config.noise_sigma).map_err(|e| {
            TimeframeError::invalid_argument(format!("emulator noise distribution: {e}"))
        })?;
        if config.pulse_amplitude <= 0.0 {
            return Err(TimeframeError::invalid_argument(
                "emulator pulse_amplitude must be > 0",
            ));
        }
        let amplitude = Exp::new(1.0 / config.pulse_amplitude).map_err(|e| {
            TimeframeError::invalid_argument(format!("emulator amplitude distribution: {e}"))
        })?;
        if !(0.0..=1.0).contains(&config.pulse_probability) {
            return Err(TimeframeError::invalid_argument(
                "emulator pulse_probability must be in [0, 1]",
            ));
        }
        if config.readout_length == 0 {
            return Err(TimeframeError::invalid_argument(
                "emulator readout_length must be > 0",
            ));
        }
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        info!(
            ddls = config.ddls,
            channels_per_ddl = config.channels_per_ddl,
            readout_length = config.readout_length,
            "Emulator data source created"
        );
        Ok(Self {
            config,
            rng,
            noise,
            amplitude,
            generated: 0,
        })
    }

    pub fn generated(&self) -> u64 {
        self.generated
    }

    /// Samples of one channel in increasing timebin order
    fn generate_samples(&mut self) -> Vec<Sample> {
        let n = self.config.readout_length;
        let max = (SIGNAL_RANGE - 1) as f64;
        let mut signal: Vec<f64> = (0..n).map(|_| self.noise.sample(&mut self.rng)).collect();

        if self.rng.gen_bool(self.config.pulse_probability) {
            let amplitude = self.amplitude.sample(&mut self.rng);
            let start = self.rng.gen_range(0..n);
            let rise = self.config.rise_time.max(1);
            for (i, value) in signal.iter_mut().enumerate().skip(start) {
                let t = i - start;
                *value += if t < rise {
                    amplitude * (t + 1) as f64 / rise as f64
                } else {
                    amplitude * (-((t - rise) as f64) / self.config.decay_time).exp()
                };
            }
        }

        signal
            .into_iter()
            .map(|v| v.round().clamp(0.0, max) as Sample)
            .collect()
    }

    /// Generate one acquisition cycle
    pub fn generate_event(&mut self) -> RawEvent {
        let last = (self.config.readout_length - 1) as i32;
        let mut channels = Vec::new();
        for ddl in 0..self.config.ddls {
            let ddl = self.config.first_ddl.saturating_add(ddl);
            for hw in 0..self.config.channels_per_ddl {
                let mut samples = self.generate_samples();
                // bunch samples run backward in time
                samples.reverse();
                channels.push(RawChannel::new(
                    ChannelId::new(ddl, hw),
                    vec![Bunch::new(last, samples)],
                ));
            }
        }
        self.generated += 1;
        debug!(event = self.generated, channels = channels.len(), "Generated event");
        RawEvent::new(channels)
    }
}

impl EventSource for EmulatorSource {
    fn next_event(&mut self) -> TimeframeResult<Option<RawEvent>> {
        if self.config.events.is_some_and(|limit| self.generated >= limit) {
            return Ok(None);
        }
        Ok(Some(self.generate_event()))
    }
}
