// packages/engine/src/interception/sensor.rs
//! Sensor sources and the events they produce

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sensor types known to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Accelerometer,
    Gyroscope,
    MagneticField,
    Gravity,
    LinearAcceleration,
    RotationVector,
    Light,
    Pressure,
    Proximity,
}

impl SensorKind {
    /// Number of leading payload values that carry measurements
    pub fn axes(&self) -> usize {
        match self {
            Self::Accelerometer
            | Self::Gyroscope
            | Self::MagneticField
            | Self::Gravity
            | Self::LinearAcceleration => 3,
            Self::RotationVector => 4,
            Self::Light | Self::Pressure | Self::Proximity => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accelerometer => "accelerometer",
            Self::Gyroscope => "gyroscope",
            Self::MagneticField => "magnetic_field",
            Self::Gravity => "gravity",
            Self::LinearAcceleration => "linear_acceleration",
            Self::RotationVector => "rotation_vector",
            Self::Light => "light",
            Self::Pressure => "pressure",
            Self::Proximity => "proximity",
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One event-producing channel
///
/// Sensors compare by value: two `Sensor`s with the same handle, name and
/// kind are the same source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sensor {
    handle: u32,
    name: String,
    kind: SensorKind,
}

impl Sensor {
    pub fn new(handle: u32, name: impl Into<String>, kind: SensorKind) -> Self {
        Self {
            handle,
            name: name.into(),
            kind,
        }
    }

    pub fn handle(&self) -> u32 {
        self.handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    /// A blank name is the "null" sensor
    pub fn is_valid(&self) -> bool {
        !self.name.trim().is_empty()
    }
}

impl fmt::Display for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{} ({})", self.name, self.handle, self.kind)
    }
}

/// Reported sensor accuracy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accuracy {
    NoContact,
    Unreliable,
    Low,
    Medium,
    High,
}

impl Accuracy {
    /// Convert the producer's raw status code
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            -1 => Some(Self::NoContact),
            0 => Some(Self::Unreliable),
            1 => Some(Self::Low),
            2 => Some(Self::Medium),
            3 => Some(Self::High),
            _ => None,
        }
    }

    pub fn as_raw(&self) -> i32 {
        match self {
            Self::NoContact => -1,
            Self::Unreliable => 0,
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
        }
    }
}

/// A single reading delivered by a producer
///
/// Only `values` is subject to rewriting; the remaining fields are metadata
/// that reaches the consumer untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorEvent {
    pub sensor: Sensor,
    pub values: Vec<f32>,
    pub accuracy: Accuracy,

    /// Nanoseconds, producer clock
    pub timestamp_ns: i64,
}

impl SensorEvent {
    pub fn new(sensor: Sensor, values: Vec<f32>, timestamp_ns: i64) -> Self {
        Self {
            sensor,
            values,
            accuracy: Accuracy::High,
            timestamp_ns,
        }
    }

    pub fn with_accuracy(mut self, accuracy: Accuracy) -> Self {
        self.accuracy = accuracy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axes() {
        assert_eq!(SensorKind::Accelerometer.axes(), 3);
        assert_eq!(SensorKind::RotationVector.axes(), 4);
        assert_eq!(SensorKind::Light.axes(), 1);
    }

    #[test]
    fn test_sensor_equality_is_by_value() {
        let a = Sensor::new(1, "BMI160 Accelerometer", SensorKind::Accelerometer);
        let b = Sensor::new(1, "BMI160 Accelerometer".to_string(), SensorKind::Accelerometer);
        let c = Sensor::new(2, "BMI160 Accelerometer", SensorKind::Accelerometer);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_blank_sensor_is_invalid() {
        assert!(!Sensor::new(0, "   ", SensorKind::Light).is_valid());
        assert!(Sensor::new(0, "ambient", SensorKind::Light).is_valid());
    }

    #[test]
    fn test_accuracy_raw_codes() {
        for raw in -1..=3 {
            assert_eq!(Accuracy::from_raw(raw).unwrap().as_raw(), raw);
        }
        assert!(Accuracy::from_raw(7).is_none());
    }

    #[test]
    fn test_sensor_display() {
        let sensor = Sensor::new(4, "gyro", SensorKind::Gyroscope);
        assert_eq!(sensor.to_string(), "gyro#4 (gyroscope)");
    }
}
