// packages/engine/src/replay/recording.rs
//! Recorded sensor captures
//!
//! Captures are `;`-delimited CSV files with a header row. The file name
//! selects the sensor (`ACG.csv` accelerometer, `GYRO.csv` gyroscope); the
//! columns read are `t_unix` (Unix epoch milliseconds, may be fractional)
//! and `x`, `y`, `z`. Other columns are ignored.

use crate::interception::sensor::{Sensor, SensorEvent, SensorKind};
use crate::utils::errors::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DELIMITER: char = ';';
pub const TIME_COLUMN: &str = "t_unix";
pub const AXIS_COLUMNS: [&str; 3] = ["x", "y", "z"];

/// Capture files the replay understands, and the sensor each one holds
pub const KNOWN_FILES: [(&str, SensorKind); 2] = [
    ("ACG.csv", SensorKind::Accelerometer),
    ("GYRO.csv", SensorKind::Gyroscope),
];

pub fn kind_for_file(file_name: &str) -> Option<SensorKind> {
    KNOWN_FILES
        .iter()
        .find(|(name, _)| *name == file_name)
        .map(|(_, kind)| *kind)
}

/// One captured reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Capture time in epoch milliseconds, as read
    pub t_unix: f64,
    pub timestamp_ns: i64,
    pub values: Vec<f32>,
}

impl Sample {
    pub fn new(t_unix: f64, values: Vec<f32>) -> Result<Self> {
        Ok(Self {
            t_unix,
            timestamp_ns: millis_to_nanos(t_unix)?,
            values,
        })
    }
}

/// Epoch milliseconds to nanoseconds; out-of-range times are rejected
///
/// Whole milliseconds are scaled in integer arithmetic so epoch-sized
/// values keep nanosecond precision.
pub fn millis_to_nanos(t_unix: f64) -> Result<i64> {
    let out_of_range = || {
        EngineError::ReplayFailed(format!(
            "timestamp {} ms does not fit in nanoseconds",
            t_unix
        ))
    };
    // i64 nanoseconds span about 9.22e12 ms either side of the epoch
    if !t_unix.is_finite() || t_unix.abs() > 9.3e12 {
        return Err(out_of_range());
    }

    let whole = t_unix.trunc();
    let fraction_ns = ((t_unix - whole) * 1e6).round() as i64;
    (whole as i64)
        .checked_mul(1_000_000)
        .and_then(|ns| ns.checked_add(fraction_ns))
        .ok_or_else(out_of_range)
}

/// All samples captured for one sensor
#[derive(Debug, Clone)]
pub struct Recording {
    pub sensor: Sensor,
    pub source: PathBuf,
    pub samples: Vec<Sample>,
}

impl Recording {
    /// Samples as producer events, in capture order
    pub fn events(&self) -> impl Iterator<Item = SensorEvent> + '_ {
        self.samples
            .iter()
            .map(|s| SensorEvent::new(self.sensor.clone(), s.values.clone(), s.timestamp_ns))
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Parse capture text. `label` names the source in error messages.
pub fn parse_samples(text: &str, label: &str) -> Result<Vec<Sample>> {
    let mut lines = text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());

    let (_, header) = lines
        .next()
        .ok_or_else(|| EngineError::ReplayFailed(format!("{}: file is empty", label)))?;
    let columns: Vec<&str> = header.split(DELIMITER).map(str::trim).collect();

    let position = |name: &str| {
        columns.iter().position(|c| *c == name).ok_or_else(|| {
            EngineError::ReplayFailed(format!("{}: missing column '{}'", label, name))
        })
    };
    let time_idx = position(TIME_COLUMN)?;
    let axis_idx = AXIS_COLUMNS
        .iter()
        .map(|name| position(*name))
        .collect::<Result<Vec<_>>>()?;

    let mut samples = Vec::new();
    for (line_no, line) in lines {
        let fields: Vec<&str> = line.split(DELIMITER).map(str::trim).collect();
        let field = |idx: usize| {
            fields.get(idx).copied().ok_or_else(|| {
                EngineError::ReplayFailed(format!(
                    "{}:{}: expected {} columns, found {}",
                    label,
                    line_no + 1,
                    columns.len(),
                    fields.len()
                ))
            })
        };
        let invalid = |raw: &str| {
            EngineError::ReplayFailed(format!(
                "{}:{}: '{}' is not a number",
                label,
                line_no + 1,
                raw
            ))
        };

        let raw_time = field(time_idx)?;
        let t_unix: f64 = raw_time.parse().map_err(|_| invalid(raw_time))?;

        let mut values = Vec::with_capacity(axis_idx.len());
        for idx in &axis_idx {
            let raw = field(*idx)?;
            values.push(raw.parse::<f32>().map_err(|_| invalid(raw))?);
        }

        let timestamp_ns = millis_to_nanos(t_unix).map_err(|_| {
            EngineError::ReplayFailed(format!(
                "{}:{}: timestamp {} ms is out of range",
                label,
                line_no + 1,
                raw_time
            ))
        })?;

        samples.push(Sample {
            t_unix,
            timestamp_ns,
            values,
        });
    }

    Ok(samples)
}

/// Load one capture file
pub fn load_recording(path: impl AsRef<Path>, handle: u32) -> Result<Recording> {
    let path = path.as_ref();
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| EngineError::ReplayFailed(format!("Not a file: {}", path.display())))?;

    if !file_name.ends_with(".csv") {
        return Err(EngineError::ReplayFailed(format!(
            "Not a valid CSV file: {}",
            path.display()
        )));
    }
    let kind = kind_for_file(file_name).ok_or_else(|| {
        EngineError::ReplayFailed(format!("CSV is not a known capture: {}", file_name))
    })?;

    let text = std::fs::read_to_string(path)?;
    let samples = parse_samples(&text, file_name)?;
    debug!("Loaded {} samples from {}", samples.len(), path.display());

    let name = file_name.trim_end_matches(".csv");
    Ok(Recording {
        sensor: Sensor::new(handle, name, kind),
        source: path.to_path_buf(),
        samples,
    })
}

/// Load a capture file, or every known capture in a directory
pub fn load_directory(path: impl AsRef<Path>) -> Result<Vec<Recording>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(EngineError::ReplayFailed(format!(
            "Input not found: {}",
            path.display()
        )));
    }
    if path.is_file() {
        return Ok(vec![load_recording(path, 1)?]);
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(path)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .and_then(kind_for_file)
                .is_some()
        })
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(EngineError::ReplayFailed(format!(
            "No valid CSV file was found in {}",
            path.display()
        )));
    }

    files
        .iter()
        .enumerate()
        .map(|(i, file)| load_recording(file, i as u32 + 1))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACG: &str =
        "t_unix;x;y;z;extra\n1700000000000;0.1;9.8;-0.2;a\n1700000000250.5;0.2;9.7;-0.1;b\n";

    #[test]
    fn test_parse_samples() {
        let samples = parse_samples(ACG, "ACG.csv").unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].values, vec![0.1, 9.8, -0.2]);
        assert_eq!(samples[1].t_unix, 1_700_000_000_250.5);
        assert_eq!(samples[1].timestamp_ns, 1_700_000_000_250_500_000);
    }

    #[test]
    fn test_columns_in_any_order() {
        let text = "z;t_unix;y;x\n3;10;2;1\n";
        let samples = parse_samples(text, "GYRO.csv").unwrap();
        assert_eq!(samples[0].values, vec![1.0, 2.0, 3.0]);
        assert_eq!(samples[0].t_unix, 10.0);
        assert_eq!(samples[0].timestamp_ns, 10_000_000);
    }

    #[test]
    fn test_epoch_millis_timestamps() {
        let text = "t_unix;x;y;z\n1700000000123;1;1;1\n1700000000373;5;5;5\n";
        let samples = parse_samples(text, "ACG.csv").unwrap();
        assert_eq!(samples[0].timestamp_ns, 1_700_000_000_123_000_000);
        assert_eq!(samples[1].timestamp_ns, 1_700_000_000_373_000_000);
    }

    #[test]
    fn test_out_of_range_timestamp_is_rejected() {
        let err = parse_samples("t_unix;x;y;z\n1e20;1;1;1\n", "GYRO.csv").unwrap_err();
        assert!(matches!(err, EngineError::ReplayFailed(_)));
        assert!(err.to_string().contains("GYRO.csv:2"));
        assert!(millis_to_nanos(f64::INFINITY).is_err());
    }

    #[test]
    fn test_missing_column() {
        let err = parse_samples("t_unix;x;y\n1;2;3\n", "ACG.csv").unwrap_err();
        assert!(err.to_string().contains("missing column 'z'"));
    }

    #[test]
    fn test_bad_number_reports_line() {
        let err = parse_samples("t_unix;x;y;z\n1;2;oops;4\n", "ACG.csv").unwrap_err();
        assert!(err.to_string().contains("ACG.csv:2"));
    }

    #[test]
    fn test_load_directory_picks_known_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ACG.csv"), ACG).unwrap();
        std::fs::write(dir.path().join("GYRO.csv"), "t_unix;x;y;z\n1;0.01;0.02;0.03\n").unwrap();
        std::fs::write(dir.path().join("notes.csv"), "ignored").unwrap();

        let recordings = load_directory(dir.path()).unwrap();
        assert_eq!(recordings.len(), 2);
        assert_eq!(recordings[0].sensor.kind(), SensorKind::Accelerometer);
        assert_eq!(recordings[1].sensor.kind(), SensorKind::Gyroscope);
        assert_ne!(recordings[0].sensor, recordings[1].sensor);
    }

    #[test]
    fn test_unknown_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("MAG.csv");
        std::fs::write(&path, "t_unix;x;y;z\n").unwrap();
        assert!(load_recording(&path, 1).is_err());

        let txt = dir.path().join("ACG.txt");
        std::fs::write(&txt, "t_unix;x;y;z\n").unwrap();
        assert!(load_recording(&txt, 1).is_err());
    }

    #[test]
    fn test_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_directory(dir.path()),
            Err(EngineError::ReplayFailed(_))
        ));
    }
}
