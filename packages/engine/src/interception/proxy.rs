// packages/engine/src/interception/proxy.rs
//! Listener proxy interposed between a producer and an original consumer
//!
//! The proxy satisfies the same callback contract as any consumer. Every
//! reading is rewritten by the transform and then handed to the wrapped
//! consumer exactly once; accuracy changes pass straight through.
//!
//! The sensor set is only mutated by `ListenerRegistry`, inside the
//! critical section for this proxy's key. Delivery never touches it.

use crate::interception::listener::{ListenerHandle, ListenerKey, SensorEventListener};
use crate::interception::sensor::{Accuracy, Sensor, SensorEvent};
use crate::interception::transform::EventTransform;
use crate::observability::names;
use crate::utils::errors::Result;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Wrapper around one original consumer
pub struct ListenerProxy {
    id: u64,
    original: ListenerHandle,
    sensors: Mutex<HashSet<Sensor>>,
    transform: Arc<dyn EventTransform>,
    delivered: AtomicU64,
    transform_failures: AtomicU64,
    status_forwarded: AtomicU64,
}

impl ListenerProxy {
    pub(crate) fn new(id: u64, original: ListenerHandle, transform: Arc<dyn EventTransform>) -> Self {
        Self {
            id,
            original,
            sensors: Mutex::new(HashSet::new()),
            transform,
            delivered: AtomicU64::new(0),
            transform_failures: AtomicU64::new(0),
            status_forwarded: AtomicU64::new(0),
        }
    }

    /// Registry-assigned id, unique for the registry's lifetime
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn key(&self) -> &ListenerKey {
        self.original.key()
    }

    /// The consumer this proxy wraps
    pub fn original(&self) -> &ListenerHandle {
        &self.original
    }

    /// Snapshot of the attached sensors
    pub fn sensors(&self) -> Vec<Sensor> {
        self.sensors.lock().iter().cloned().collect()
    }

    pub fn sensor_count(&self) -> usize {
        self.sensors.lock().len()
    }

    pub fn is_attached_to(&self, sensor: &Sensor) -> bool {
        self.sensors.lock().contains(sensor)
    }

    /// At least one sensor is routed through this proxy
    pub fn is_active(&self) -> bool {
        !self.sensors.lock().is_empty()
    }

    /// Returns `true` if the sensor was not attached before
    pub(crate) fn attach_sensor(&self, sensor: Sensor) -> bool {
        self.sensors.lock().insert(sensor)
    }

    /// Remove one sensor, or all of them for `None`. Returns how many remain.
    pub(crate) fn detach_sensor(&self, sensor: Option<&Sensor>) -> usize {
        let mut sensors = self.sensors.lock();
        match sensor {
            Some(sensor) => {
                sensors.remove(sensor);
            }
            None => sensors.clear(),
        }
        sensors.len()
    }

    pub fn stats(&self) -> ProxyStats {
        ProxyStats {
            events_delivered: self.delivered.load(Ordering::Relaxed),
            transform_failures: self.transform_failures.load(Ordering::Relaxed),
            status_changes_forwarded: self.status_forwarded.load(Ordering::Relaxed),
        }
    }
}

impl SensorEventListener for ListenerProxy {
    fn on_sensor_changed(&self, event: &mut SensorEvent) -> Result<()> {
        let SensorEvent { sensor, values, .. } = &mut *event;

        if let Err(e) = self.transform.apply(sensor, values) {
            self.transform_failures.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(names::TRANSFORM_FAILURES, "sensor" => sensor.kind().as_str())
                .increment(1);
            warn!(
                proxy = self.id,
                listener = %self.key(),
                "Dropping event for {}: {}", sensor, e
            );
            return Err(e);
        }

        self.original.listener().on_sensor_changed(event)?;

        self.delivered.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(names::EVENTS_DELIVERED).increment(1);
        Ok(())
    }

    fn on_accuracy_changed(&self, sensor: &Sensor, accuracy: Accuracy) {
        self.status_forwarded.fetch_add(1, Ordering::Relaxed);
        self.original.listener().on_accuracy_changed(sensor, accuracy);
    }
}

impl fmt::Debug for ListenerProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerProxy")
            .field("id", &self.id)
            .field("key", self.key())
            .field("transform", &self.transform.name())
            .field("sensors", &self.sensor_count())
            .finish()
    }
}

/// Per-proxy delivery counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyStats {
    pub events_delivered: u64,
    pub transform_failures: u64,
    pub status_changes_forwarded: u64,
}
