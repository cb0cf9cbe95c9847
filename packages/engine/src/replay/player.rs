// packages/engine/src/replay/player.rs
//! Replay captured readings through the interception layer
//!
//! A collecting consumer is registered through the facade for every
//! recording, so the simulated producer only ever sees the proxy. Samples
//! are fed to a dedicated dispatch thread over a bounded channel, the way a
//! real producer delivers from its own thread. Afterwards the consumer is
//! unregistered and the delivered values are compared with the originals.

use crate::interception::facade::RegistrationFacade;
use crate::interception::listener::{ListenerHandle, ListenerKey, SensorEventListener};
use crate::interception::registry::ListenerRegistry;
use crate::interception::sensor::{Accuracy, Sensor, SensorEvent, SensorKind};
use crate::replay::manager::SimulatedSensorManager;
use crate::replay::recording::Recording;
use crate::utils::config::ReplayConfig;
use crate::utils::errors::{EngineError, Result};
use chrono::{DateTime, Utc};
use crossbeam_channel::bounded;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Output format for replay reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    Json,
    Yaml,
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            other => Err(format!("unknown report format '{}'", other)),
        }
    }
}

/// Consumer that keeps everything it is given
#[derive(Default)]
struct CollectingListener {
    events: Mutex<Vec<SensorEvent>>,
    statuses: Mutex<Vec<(Sensor, Accuracy)>>,
}

impl SensorEventListener for CollectingListener {
    fn on_sensor_changed(&self, event: &mut SensorEvent) -> Result<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }

    fn on_accuracy_changed(&self, sensor: &Sensor, accuracy: Accuracy) {
        self.statuses.lock().push((sensor.clone(), accuracy));
    }
}

/// Per-sensor replay outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorReport {
    pub sensor: String,
    pub kind: SensorKind,
    pub samples: usize,
    pub delivered: usize,
    pub failed: usize,
    pub status_changes: usize,
    /// Mean |delivered - original| per axis over delivered samples
    pub mean_abs_displacement: Vec<f64>,
}

/// Result of one replay run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayReport {
    pub generated_at: DateTime<Utc>,
    pub transform: String,
    pub listener: String,
    pub duration_ms: u64,
    pub sensors: Vec<SensorReport>,
}

impl ReplayReport {
    pub fn total_samples(&self) -> usize {
        self.sensors.iter().map(|s| s.samples).sum()
    }

    pub fn total_delivered(&self) -> usize {
        self.sensors.iter().map(|s| s.delivered).sum()
    }

    pub fn total_failed(&self) -> usize {
        self.sensors.iter().map(|s| s.failed).sum()
    }

    pub fn render(&self, format: ReportFormat) -> Result<String> {
        match format {
            ReportFormat::Json => Ok(serde_json::to_string_pretty(self)?),
            ReportFormat::Yaml => Ok(serde_yaml::to_string(self)?),
        }
    }
}

/// Drives recordings through facade, registry and simulated producer
pub struct ReplaySession {
    config: ReplayConfig,
    facade: RegistrationFacade<Arc<SimulatedSensorManager>>,
    stop: Arc<AtomicBool>,
}

impl ReplaySession {
    pub fn new(config: ReplayConfig, registry: Arc<ListenerRegistry>) -> Self {
        let manager = Arc::new(SimulatedSensorManager::new());
        Self {
            config,
            facade: RegistrationFacade::new(registry, manager),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn facade(&self) -> &RegistrationFacade<Arc<SimulatedSensorManager>> {
        &self.facade
    }

    /// Flag that stops feeding samples when set
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn run(&self, recordings: &[Recording]) -> Result<ReplayReport> {
        let started = Instant::now();
        let sink = Arc::new(CollectingListener::default());
        let handle = ListenerHandle::new(
            ListenerKey::new(self.config.listener_key.clone()),
            sink.clone(),
        );

        info!(
            "Replaying {} recording(s) through listener {}",
            recordings.len(),
            handle.key()
        );

        for (idx, recording) in recordings.iter().enumerate() {
            if let Err(e) = self.register(&handle, &recording.sensor) {
                // roll back everything attached so far, the refused sensor included
                for attached in &recordings[..=idx] {
                    self.facade.unregister_listener_for(&handle, &attached.sensor);
                }
                return Err(e);
            }
        }

        let result = self.feed(recordings);

        for recording in recordings {
            self.facade.unregister_listener_for(&handle, &recording.sensor);
        }
        if self.facade.registry().contains(handle.key()) {
            warn!("Listener {} still wrapped after replay", handle.key());
        }

        let failures = result?;
        let report = self.build_report(recordings, &sink, &failures, started);
        info!(
            "Replay finished: {} of {} samples delivered, {} failed",
            report.total_delivered(),
            report.total_samples(),
            report.total_failed()
        );
        Ok(report)
    }

    fn register(&self, handle: &ListenerHandle, sensor: &Sensor) -> Result<()> {
        let period = self.config.sampling_period_us;
        let accepted = match self.config.max_report_latency_us {
            Some(latency) => self
                .facade
                .register_listener_with_latency(handle, sensor, period, latency)?,
            None => self.facade.register_listener(handle, sensor, period)?,
        };

        if !accepted {
            return Err(EngineError::ReplayFailed(format!(
                "Producer refused registration for {}",
                sensor
            )));
        }
        Ok(())
    }

    /// Feed every sample to the dispatch thread; returns the indices of the
    /// samples that failed, per sensor handle
    fn feed(&self, recordings: &[Recording]) -> Result<HashMap<u32, HashSet<usize>>> {
        let (tx, rx) = bounded::<(usize, SensorEvent)>(self.config.channel_capacity);
        let manager = Arc::clone(self.facade.manager());

        let dispatcher = std::thread::Builder::new()
            .name("sensor-dispatch".to_string())
            .spawn(move || {
                let mut failures: HashMap<u32, HashSet<usize>> = HashMap::new();
                for (idx, event) in rx {
                    if let Err(e) = manager.dispatch(&event) {
                        debug!("Dispatch failed for {}: {}", event.sensor, e);
                        failures.entry(event.sensor.handle()).or_default().insert(idx);
                    }
                }
                failures
            })?;

        'feed: for recording in recordings {
            self.facade
                .manager()
                .dispatch_accuracy(&recording.sensor, Accuracy::High);

            for (idx, event) in recording.events().enumerate() {
                if self.stop.load(Ordering::Relaxed) {
                    warn!("Replay stopped before {} was fully fed", recording.sensor);
                    break 'feed;
                }
                tx.send((idx, event))
                    .map_err(|_| EngineError::ReplayFailed("Dispatch thread exited".to_string()))?;
            }
        }
        drop(tx);

        dispatcher
            .join()
            .map_err(|_| EngineError::ReplayFailed("Dispatch thread panicked".to_string()))
    }

    fn build_report(
        &self,
        recordings: &[Recording],
        sink: &CollectingListener,
        failures: &HashMap<u32, HashSet<usize>>,
        started: Instant,
    ) -> ReplayReport {
        let events = sink.events.lock();
        let statuses = sink.statuses.lock();

        let sensors = recordings
            .iter()
            .map(|recording| {
                let empty = HashSet::new();
                let failed = failures.get(&recording.sensor.handle()).unwrap_or(&empty);

                // one dispatch thread, so deliveries follow capture order
                // minus the samples that failed
                let originals = recording
                    .samples
                    .iter()
                    .enumerate()
                    .filter(|(idx, _)| !failed.contains(idx))
                    .map(|(_, sample)| sample.values.as_slice());
                let delivered_events = events.iter().filter(|e| e.sensor == recording.sensor);

                let axes = recording.sensor.kind().axes();
                let mut sums = vec![0.0f64; axes];
                let mut delivered = 0usize;

                for (event, original) in delivered_events.zip(originals) {
                    delivered += 1;
                    for (axis, sum) in sums.iter_mut().enumerate() {
                        let (Some(out), Some(input)) = (event.values.get(axis), original.get(axis))
                        else {
                            continue;
                        };
                        *sum += f64::from((out - input).abs());
                    }
                }

                let mean_abs_displacement = sums
                    .into_iter()
                    .map(|sum| if delivered == 0 { 0.0 } else { sum / delivered as f64 })
                    .collect();

                SensorReport {
                    sensor: recording.sensor.name().to_string(),
                    kind: recording.sensor.kind(),
                    samples: recording.len(),
                    delivered,
                    failed: failed.len(),
                    status_changes: statuses
                        .iter()
                        .filter(|(s, _)| *s == recording.sensor)
                        .count(),
                    mean_abs_displacement,
                }
            })
            .collect();

        ReplayReport {
            generated_at: Utc::now(),
            transform: self.facade.registry().transform().name().to_string(),
            listener: self.config.listener_key.clone(),
            duration_ms: started.elapsed().as_millis() as u64,
            sensors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interception::transform::{IdentityTransform, OffsetTransform};
    use crate::replay::recording::Sample;
    use std::path::PathBuf;

    fn recording_at(handle: u32, kind: SensorKind, rows: Vec<(f64, Vec<f32>)>) -> Recording {
        Recording {
            sensor: Sensor::new(handle, format!("{}", kind), kind),
            source: PathBuf::from("memory"),
            samples: rows
                .into_iter()
                .map(|(t_unix, values)| Sample::new(t_unix, values).unwrap())
                .collect(),
        }
    }

    fn recording(handle: u32, kind: SensorKind, samples: Vec<Vec<f32>>) -> Recording {
        let rows = samples
            .into_iter()
            .enumerate()
            .map(|(i, values)| (1_700_000_000_000.0 + i as f64 * 250.0, values))
            .collect();
        recording_at(handle, kind, rows)
    }

    fn session(registry: ListenerRegistry) -> ReplaySession {
        ReplaySession::new(ReplayConfig::default(), Arc::new(registry))
    }

    #[test]
    fn test_identity_replay_has_no_displacement() {
        let session = session(ListenerRegistry::new(Arc::new(IdentityTransform)));
        let recordings = vec![recording(
            1,
            SensorKind::Accelerometer,
            vec![vec![0.1, 9.8, 0.0], vec![0.2, 9.7, 0.1]],
        )];

        let report = session.run(&recordings).unwrap();

        assert_eq!(report.transform, "identity");
        assert_eq!(report.sensors[0].samples, 2);
        assert_eq!(report.sensors[0].delivered, 2);
        assert_eq!(report.sensors[0].status_changes, 1);
        assert!(report.sensors[0].mean_abs_displacement.iter().all(|d| *d == 0.0));
    }

    #[test]
    fn test_offset_replay_reports_displacement_and_cleans_up() {
        let transform = OffsetTransform::new().with_correction(
            SensorKind::Gyroscope,
            vec![0.5, 0.0, -0.25],
            1.0,
        );
        let session = session(ListenerRegistry::new(Arc::new(transform)));
        let recordings = vec![
            recording(1, SensorKind::Accelerometer, vec![vec![0.0, 0.0, 0.0]]),
            recording(2, SensorKind::Gyroscope, vec![vec![0.0, 0.0, 0.0], vec![1.0, 1.0, 1.0]]),
        ];

        let report = session.run(&recordings).unwrap();

        let gyro = &report.sensors[1];
        assert_eq!(gyro.delivered, 2);
        assert_eq!(gyro.mean_abs_displacement, vec![0.5, 0.0, 0.25]);
        assert_eq!(report.total_delivered(), 3);

        assert!(session.facade().registry().is_empty());
        assert_eq!(session.facade().manager().registration_count(), 0);
    }

    #[test]
    fn test_malformed_samples_are_counted_not_delivered() {
        let transform =
            OffsetTransform::new().with_correction(SensorKind::Accelerometer, vec![1.0], 1.0);
        let session = session(ListenerRegistry::new(Arc::new(transform)));
        let recordings = vec![recording(
            1,
            SensorKind::Accelerometer,
            vec![vec![0.0, 0.0, 0.0], vec![f32::NAN, 0.0, 0.0]],
        )];

        let report = session.run(&recordings).unwrap();
        assert_eq!(report.sensors[0].delivered, 1);
        assert_eq!(report.sensors[0].failed, 1);
    }

    #[test]
    fn test_shared_timestamps_pair_by_capture_order() {
        let session = session(ListenerRegistry::new(Arc::new(IdentityTransform)));
        let recordings = vec![recording_at(
            1,
            SensorKind::Accelerometer,
            vec![(10.0, vec![1.0, 1.0, 1.0]), (10.0, vec![5.0, 5.0, 5.0])],
        )];

        let report = session.run(&recordings).unwrap();
        assert_eq!(report.sensors[0].delivered, 2);
        assert_eq!(report.sensors[0].mean_abs_displacement, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_failed_sample_is_skipped_when_pairing() {
        let transform =
            OffsetTransform::new().with_correction(SensorKind::Accelerometer, vec![1.0], 1.0);
        let session = session(ListenerRegistry::new(Arc::new(transform)));
        let recordings = vec![recording(
            1,
            SensorKind::Accelerometer,
            vec![
                vec![0.0, 0.0, 0.0],
                vec![f32::NAN, 9.0, 9.0],
                vec![2.0, 2.0, 2.0],
            ],
        )];

        let report = session.run(&recordings).unwrap();
        assert_eq!(report.sensors[0].delivered, 2);
        assert_eq!(report.sensors[0].failed, 1);
        assert_eq!(report.sensors[0].mean_abs_displacement, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_refused_registration_is_rolled_back() {
        let config = ReplayConfig {
            sampling_period_us: -1,
            ..ReplayConfig::default()
        };
        let session = ReplaySession::new(
            config,
            Arc::new(ListenerRegistry::new(Arc::new(IdentityTransform))),
        );
        let recordings = vec![recording(1, SensorKind::Accelerometer, vec![vec![0.0, 0.0, 0.0]])];

        assert!(matches!(
            session.run(&recordings),
            Err(EngineError::ReplayFailed(_))
        ));
        assert!(session.facade().registry().is_empty());
        assert_eq!(session.facade().manager().registration_count(), 0);
    }

    #[test]
    fn test_invalid_sensor_rolls_back_earlier_registrations() {
        let session = session(ListenerRegistry::new(Arc::new(IdentityTransform)));
        let mut blank = recording(2, SensorKind::Gyroscope, vec![vec![0.0, 0.0, 0.0]]);
        blank.sensor = Sensor::new(2, " ", SensorKind::Gyroscope);
        let recordings = vec![
            recording(1, SensorKind::Accelerometer, vec![vec![0.0, 0.0, 0.0]]),
            blank,
        ];

        assert!(matches!(
            session.run(&recordings),
            Err(EngineError::InvalidArgument(_))
        ));
        assert!(session.facade().registry().is_empty());
        assert_eq!(session.facade().manager().registration_count(), 0);
    }

    #[test]
    fn test_report_rendering() {
        let session = session(ListenerRegistry::new(Arc::new(IdentityTransform)));
        let report = session
            .run(&[recording(1, SensorKind::Gyroscope, vec![vec![0.0, 0.0, 0.0]])])
            .unwrap();

        let json = report.render(ReportFormat::Json).unwrap();
        assert!(json.contains("\"transform\": \"identity\""));
        let yaml = report.render(ReportFormat::Yaml).unwrap();
        assert!(yaml.contains("kind: gyroscope"));
    }

    #[test]
    fn test_report_format_parsing() {
        assert_eq!("JSON".parse::<ReportFormat>().unwrap(), ReportFormat::Json);
        assert_eq!("yml".parse::<ReportFormat>().unwrap(), ReportFormat::Yaml);
        assert!("xml".parse::<ReportFormat>().is_err());
    }
}
