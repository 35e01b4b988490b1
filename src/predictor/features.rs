//! Prediction features and their domains.
//!
//! Raw features arrive from the request payload and are validated against
//! their declared domains before anything is computed. The model works on
//! an engineered vector where every component grows with expected delay
//! (e.g. track *wear* instead of track *condition*).

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{Priority, Train};

/// Number of engineered features.
pub const FEATURE_COUNT: usize = 11;

/// Human-readable label of each engineered feature.
pub const FEATURE_LABELS: [&str; FEATURE_COUNT] = [
    "Weather conditions",
    "High traffic density",
    "Poor track condition",
    "Signal delays",
    "Platform congestion",
    "Complex routing",
    "Peak hour traffic",
    "Weekend service",
    "Express service",
    "Local service",
    "Current delay",
];

/// Largest route complexity accepted (elements on a route).
pub const MAX_ROUTE_COMPLEXITY: u32 = 100;

/// Accepted current delay range (minutes).
pub const CURRENT_DELAY_RANGE: (f64, f64) = (-120.0, 1440.0);

/// Service category of a train.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TrainCategory {
    #[default]
    #[serde(alias = "express")]
    Express,
    #[serde(alias = "local")]
    Local,
    #[serde(alias = "freight")]
    Freight,
}

impl From<Priority> for TrainCategory {
    fn from(priority: Priority) -> Self {
        match priority {
            Priority::High => TrainCategory::Express,
            Priority::Medium => TrainCategory::Local,
            Priority::Low => TrainCategory::Freight,
        }
    }
}

impl TrainCategory {
    pub fn label(&self) -> &'static str {
        match self {
            TrainCategory::Express => "Express",
            TrainCategory::Local => "Local",
            TrainCategory::Freight => "Freight",
        }
    }
}

/// Contextual inputs of one prediction.
///
/// Missing payload fields take neutral values (clear weather, perfect
/// track, free platforms, noon on a Monday).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Features {
    /// Weather severity in [0, 1].
    pub weather: f64,
    /// Traffic density in [0, 1].
    pub traffic_density: f64,
    /// Hour of day in [0, 23].
    pub hour: u8,
    /// Day of week in [0, 6], 0 = Monday.
    pub day_of_week: u8,
    /// Track condition in [0, 1], 1 = perfect.
    pub track_condition: f64,
    /// Signal delay severity in [0, 1].
    pub signal_delay: f64,
    /// Platform availability in [0, 1], 1 = all free.
    pub platform_availability: f64,
    /// Number of route elements, in [1, 100].
    pub route_complexity: u32,
    /// Service category.
    pub train_type: TrainCategory,
    /// Observed delay (minutes).
    pub current_delay: f64,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            weather: 0.0,
            traffic_density: 0.0,
            hour: 12,
            day_of_week: 0,
            track_condition: 1.0,
            signal_delay: 0.0,
            platform_availability: 1.0,
            route_complexity: 1,
            train_type: TrainCategory::Express,
            current_delay: 0.0,
        }
    }
}

impl Features {
    /// Neutral features for a train (route length, category, delay).
    pub fn for_train(train: &Train) -> Self {
        Self {
            route_complexity: train.route_len().max(1) as u32,
            train_type: train.priority.into(),
            current_delay: train.current_delay_min as f64,
            ..Self::default()
        }
    }

    pub fn with_weather(mut self, weather: f64) -> Self {
        self.weather = weather;
        self
    }

    pub fn with_traffic(mut self, traffic_density: f64) -> Self {
        self.traffic_density = traffic_density;
        self
    }

    pub fn with_time(mut self, hour: u8, day_of_week: u8) -> Self {
        self.hour = hour;
        self.day_of_week = day_of_week;
        self
    }

    /// Checks every numeric feature against its domain.
    ///
    /// # Errors
    /// [`Error::InvalidFeature`] naming the first offending feature.
    pub fn validate(&self) -> Result<()> {
        let unit = [
            ("weather", self.weather),
            ("traffic_density", self.traffic_density),
            ("track_condition", self.track_condition),
            ("signal_delay", self.signal_delay),
            ("platform_availability", self.platform_availability),
        ];
        for (feature, value) in unit {
            check(feature, value, 0.0, 1.0)?;
        }
        check("hour", f64::from(self.hour), 0.0, 23.0)?;
        check("day_of_week", f64::from(self.day_of_week), 0.0, 6.0)?;
        check(
            "route_complexity",
            f64::from(self.route_complexity),
            1.0,
            f64::from(MAX_ROUTE_COMPLEXITY),
        )?;
        check(
            "current_delay",
            self.current_delay,
            CURRENT_DELAY_RANGE.0,
            CURRENT_DELAY_RANGE.1,
        )
    }

    /// Whether the hour falls in the morning or evening rush.
    pub fn is_peak_hour(&self) -> bool {
        matches!(self.hour, 7..=9 | 17..=19)
    }

    pub fn is_weekend(&self) -> bool {
        self.day_of_week >= 5
    }

    /// Engineered feature vector, ordered as [`FEATURE_LABELS`].
    pub fn encode(&self) -> [f64; FEATURE_COUNT] {
        let flag = |b: bool| if b { 1.0 } else { 0.0 };
        [
            self.weather,
            self.traffic_density,
            1.0 - self.track_condition,
            self.signal_delay,
            1.0 - self.platform_availability,
            f64::from(self.route_complexity),
            flag(self.is_peak_hour()),
            flag(self.is_weekend()),
            flag(self.train_type == TrainCategory::Express),
            flag(self.train_type == TrainCategory::Local),
            self.current_delay,
        ]
    }
}

fn check(feature: &'static str, value: f64, min: f64, max: f64) -> Result<()> {
    if value.is_finite() && value >= min && value <= max {
        Ok(())
    } else {
        Err(Error::InvalidFeature {
            feature,
            value,
            min,
            max,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(Features::default().validate().is_ok());
    }

    #[test]
    fn test_weather_out_of_domain() {
        let err = Features::default().with_weather(1.2).validate().unwrap_err();
        assert_eq!(
            err,
            Error::InvalidFeature {
                feature: "weather",
                value: 1.2,
                min: 0.0,
                max: 1.0
            }
        );
    }

    #[test]
    fn test_nan_rejected() {
        let err = Features::default().with_traffic(f64::NAN).validate().unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidFeature {
                feature: "traffic_density",
                ..
            }
        ));
    }

    #[test]
    fn test_calendar_domains() {
        assert!(Features::default().with_time(24, 0).validate().is_err());
        assert!(Features::default().with_time(23, 7).validate().is_err());
        assert!(Features::default().with_time(23, 6).validate().is_ok());
    }

    #[test]
    fn test_route_complexity_domain() {
        let mut f = Features::default();
        f.route_complexity = 0;
        assert!(f.validate().is_err());
    }

    #[test]
    fn test_encode() {
        let f = Features {
            weather: 0.7,
            traffic_density: 0.8,
            hour: 8,
            day_of_week: 6,
            track_condition: 0.9,
            platform_availability: 0.5,
            train_type: TrainCategory::Local,
            ..Features::default()
        };
        let x = f.encode();
        assert!((x[0] - 0.7).abs() < 1e-10);
        assert!((x[2] - 0.1).abs() < 1e-10);
        assert!((x[4] - 0.5).abs() < 1e-10);
        assert!((x[6] - 1.0).abs() < 1e-10);
        assert!((x[7] - 1.0).abs() < 1e-10);
        assert!(x[8].abs() < 1e-10);
        assert!((x[9] - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_for_train() {
        let train = Train::new("FRT-203")
            .with_route(["A", "B", "C"])
            .with_priority(Priority::Low)
            .with_current_delay(12);
        let f = Features::for_train(&train);
        assert_eq!(f.route_complexity, 3);
        assert_eq!(f.train_type, TrainCategory::Freight);
        assert!((f.current_delay - 12.0).abs() < 1e-10);
    }

    #[test]
    fn test_payload_defaults() {
        let f: Features =
            serde_json::from_str(r#"{"weather": 0.7, "traffic_density": 0.8, "train_type": "Freight"}"#)
                .unwrap();
        assert_eq!(f.hour, 12);
        assert_eq!(f.train_type, TrainCategory::Freight);
        assert!((f.track_condition - 1.0).abs() < 1e-10);
    }
}
