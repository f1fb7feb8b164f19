//! Collision generator - offsets of the collisions merged into a timeframe
//!
//! Offsets are in units of the timeframe length. Random sequences are
//! Poisson processes: exponential inter-arrival times with mean `1 / rate`,
//! accumulated while inside `[0, 1)`, so the number of collisions follows
//! Poisson(rate) and the offsets are sorted.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Exp};
use serde::Deserialize;

use crate::common::{TimeframeError, TimeframeResult};

/// How collisions pile up in a timeframe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PileupMode {
    /// Fixed number of collisions at offset 0
    Fixed,
    /// Poisson number of collisions at offset 0
    RandomCount,
    /// Fixed number of collisions at random offsets (unsupported)
    FixedRandomOffset,
    /// Poisson number of collisions at random offsets
    #[default]
    RandomOffset,
}

/// Generator configuration (`[generator]` section)
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default)]
    pub pileup_mode: PileupMode,

    /// Mean number of collisions per timeframe
    #[serde(default = "default_rate")]
    pub rate: f64,

    /// Number of collisions for the fixed mode
    #[serde(default = "default_collisions")]
    pub collisions: usize,

    /// Number of timeframes (negative = until the input is exhausted)
    #[serde(default = "default_frames")]
    pub frames: i64,

    /// Random seed (None = from entropy)
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            pileup_mode: PileupMode::default(),
            rate: default_rate(),
            collisions: default_collisions(),
            frames: default_frames(),
            seed: None,
        }
    }
}

fn default_rate() -> f64 {
    5.0
}

fn default_collisions() -> usize {
    10
}

fn default_frames() -> i64 {
    1000
}

/// Produces the collision offsets of each timeframe
pub struct CollisionGenerator {
    mode: PileupMode,
    collisions: usize,
    arrival: Option<Exp<f64>>,
    rng: StdRng,
}

impl CollisionGenerator {
    pub fn new(config: &GeneratorConfig) -> TimeframeResult<Self> {
        let arrival = match config.pileup_mode {
            PileupMode::Fixed => None,
            PileupMode::FixedRandomOffset => {
                return Err(TimeframeError::invalid_argument(
                    "fixed number of collisions at random offsets is not supported",
                ))
            }
            PileupMode::RandomCount | PileupMode::RandomOffset => {
                Some(Exp::new(config.rate).map_err(|e| {
                    TimeframeError::invalid_argument(format!("collision rate {}: {e}", config.rate))
                })?)
            }
        };
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            mode: config.pileup_mode,
            collisions: config.collisions,
            arrival,
            rng,
        })
    }

    /// Sorted offsets of a Poisson process inside one timeframe
    fn collision_sequence(&mut self, arrival: Exp<f64>) -> Vec<f32> {
        let mut offsets = Vec::new();
        let mut time = arrival.sample(&mut self.rng);
        while time < 1.0 {
            offsets.push(time as f32);
            time += arrival.sample(&mut self.rng);
        }
        offsets
    }

    /// Offsets of the collisions of the next timeframe
    pub fn next_timeframe(&mut self) -> Vec<f32> {
        match (self.mode, self.arrival) {
            (PileupMode::RandomOffset, Some(arrival)) => self.collision_sequence(arrival),
            (PileupMode::RandomCount, Some(arrival)) => {
                vec![0.0; self.collision_sequence(arrival).len()]
            }
            _ => vec![0.0; self.collisions],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(mode: PileupMode) -> GeneratorConfig {
        GeneratorConfig {
            pileup_mode: mode,
            rate: 5.0,
            collisions: 4,
            seed: Some(99),
            ..Default::default()
        }
    }

    #[test]
    fn fixed_mode_at_offset_zero() {
        let mut generator = CollisionGenerator::new(&config(PileupMode::Fixed)).unwrap();
        assert_eq!(generator.next_timeframe(), vec![0.0; 4]);
    }

    #[test]
    fn random_offsets_are_sorted_in_unit_interval() {
        let mut generator = CollisionGenerator::new(&config(PileupMode::RandomOffset)).unwrap();
        for _ in 0..50 {
            let offsets = generator.next_timeframe();
            assert!(offsets.windows(2).all(|w| w[0] <= w[1]));
            assert!(offsets.iter().all(|&o| (0.0..1.0).contains(&o)));
        }
    }

    #[test]
    fn random_count_mean_follows_rate() {
        let mut generator = CollisionGenerator::new(&config(PileupMode::RandomCount)).unwrap();
        let frames = 2000;
        let mut total = 0;
        for _ in 0..frames {
            let offsets = generator.next_timeframe();
            assert!(offsets.iter().all(|&o| o == 0.0));
            total += offsets.len();
        }
        let mean = total as f64 / frames as f64;
        assert!((mean - 5.0).abs() < 0.3, "mean {mean}");
    }

    #[test]
    fn unsupported_mode_and_bad_rate() {
        assert!(CollisionGenerator::new(&config(PileupMode::FixedRandomOffset)).is_err());
        let bad = GeneratorConfig {
            rate: -1.0,
            ..config(PileupMode::RandomOffset)
        };
        assert!(CollisionGenerator::new(&bad).is_err());
    }

    #[test]
    fn pileup_mode_names() {
        #[derive(Deserialize)]
        struct Wrapper {
            mode: PileupMode,
        }
        let w: Wrapper = toml::from_str("mode = \"random-count\"").unwrap();
        assert_eq!(w.mode, PileupMode::RandomCount);
        let w: Wrapper = toml::from_str("mode = \"fixed\"").unwrap();
        assert_eq!(w.mode, PileupMode::Fixed);
    }
}
