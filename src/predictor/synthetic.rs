//! Synthetic bootstrap corpus.
//!
//! Generates feature/delay pairs from a hand-made delay model so a fresh
//! predictor has something to serve before real outcomes accumulate.
//!
//! # Delay Model
//!
//! ```text
//! delay = 15·weather + 10·traffic + 20·(1 - track) + 25·signal
//!       + 12·(1 - platform) + 2·complexity + N(0, 5)
//! delay ×= 1.3 at peak hours (7-9, 17-19)
//! delay ×= 0.8 at weekends
//! delay  = max(0, delay)
//! ```

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use super::features::{Features, TrainCategory};
use super::model::TrainingSample;
use crate::error::{Error, Result};

const WEATHER_LEVELS: [f64; 4] = [0.0, 0.3, 0.7, 1.0];
const CATEGORIES: [TrainCategory; 3] = [
    TrainCategory::Express,
    TrainCategory::Local,
    TrainCategory::Freight,
];

/// Expected delay of a feature set, without noise.
pub fn expected_delay(features: &Features, noise: f64) -> f64 {
    let mut delay = features.weather * 15.0
        + features.traffic_density * 10.0
        + (1.0 - features.track_condition) * 20.0
        + features.signal_delay * 25.0
        + (1.0 - features.platform_availability) * 12.0
        + f64::from(features.route_complexity) * 2.0
        + noise;
    if features.is_peak_hour() {
        delay *= 1.3;
    }
    if features.is_weekend() {
        delay *= 0.8;
    }
    delay.max(0.0)
}

/// Generates `n` samples with a fixed seed.
pub fn generate(n: usize, seed: u64) -> Result<Vec<TrainingSample>> {
    let mut rng = SmallRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, 5.0).map_err(|e| Error::InvalidConfig(e.to_string()))?;

    let samples = (0..n)
        .map(|_| {
            let features = Features {
                weather: WEATHER_LEVELS[rng.random_range(0..WEATHER_LEVELS.len())],
                traffic_density: rng.random_range(0.0..1.0),
                hour: rng.random_range(0..=23),
                day_of_week: rng.random_range(0..=6),
                track_condition: rng.random_range(0.7..1.0),
                signal_delay: rng.random_range(0.0..0.5),
                platform_availability: rng.random_range(0.5..1.0),
                route_complexity: rng.random_range(1..=8),
                train_type: CATEGORIES[rng.random_range(0..CATEGORIES.len())],
                current_delay: 0.0,
            };
            let delay = expected_delay(&features, noise.sample(&mut rng));
            TrainingSample::new(features, delay)
        })
        .collect();
    Ok(samples)
}
