// packages/engine/src/replay/manager.rs
//! In-process sensor producer
//!
//! Plays the role of the genuine sensor manager during replay: it keeps
//! the registrations it is given and delivers readings to whichever
//! listener objects are registered for the reading's sensor. Listeners are
//! matched by pointer identity, exactly as the producer sees them.

use crate::interception::facade::{DispatchHandler, SensorManager};
use crate::interception::listener::{same_listener, SensorEventListener};
use crate::interception::sensor::{Accuracy, Sensor, SensorEvent};
use crate::utils::errors::Result;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

struct Registration {
    listener: Arc<dyn SensorEventListener>,
    sensor: Sensor,
    sampling_period_us: i32,
    max_report_latency_us: Option<i32>,
    handler: Option<DispatchHandler>,
}

/// Registration parameters as the producer recorded them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationInfo {
    pub sampling_period_us: i32,
    pub max_report_latency_us: Option<i32>,
    pub handler: Option<DispatchHandler>,
}

/// Simulated producer backing the replay
#[derive(Default)]
pub struct SimulatedSensorManager {
    registrations: RwLock<Vec<Registration>>,
    dispatched: AtomicU64,
}

impl SimulatedSensorManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(
        &self,
        listener: Arc<dyn SensorEventListener>,
        sensor: &Sensor,
        sampling_period_us: i32,
        max_report_latency_us: Option<i32>,
        handler: Option<DispatchHandler>,
    ) -> bool {
        if !sensor.is_valid() || sampling_period_us < 0 {
            return false;
        }
        if max_report_latency_us.is_some_and(|latency| latency < 0) {
            return false;
        }

        let mut registrations = self.registrations.write();
        let existing = registrations
            .iter()
            .position(|r| same_listener(&r.listener, &listener) && r.sensor == *sensor);

        match existing {
            Some(idx) => {
                let registration = &mut registrations[idx];
                registration.sampling_period_us = sampling_period_us;
                registration.max_report_latency_us = max_report_latency_us;
                registration.handler = handler;
            }
            None => registrations.push(Registration {
                listener,
                sensor: sensor.clone(),
                sampling_period_us,
                max_report_latency_us,
                handler,
            }),
        }

        debug!("Registered listener for {} at {}us", sensor, sampling_period_us);
        true
    }

    fn listeners_for(&self, sensor: &Sensor) -> Vec<Arc<dyn SensorEventListener>> {
        self.registrations
            .read()
            .iter()
            .filter(|r| r.sensor == *sensor)
            .map(|r| Arc::clone(&r.listener))
            .collect()
    }

    /// Deliver a reading to every listener registered for its sensor
    ///
    /// Each listener gets its own copy of the event, and a failing listener
    /// does not keep the event from the others. Returns how many listeners
    /// received the event, or the first listener error once every listener
    /// has been called.
    pub fn dispatch(&self, event: &SensorEvent) -> Result<usize> {
        let listeners = self.listeners_for(&event.sensor);

        let mut delivered = 0;
        let mut first_error = None;
        for listener in &listeners {
            let mut copy = event.clone();
            match listener.on_sensor_changed(&mut copy) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    debug!("Listener rejected event for {}: {}", event.sensor, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                self.dispatched.fetch_add(1, Ordering::Relaxed);
                Ok(delivered)
            }
        }
    }

    /// Deliver an accuracy change; returns how many listeners received it
    pub fn dispatch_accuracy(&self, sensor: &Sensor, accuracy: Accuracy) -> usize {
        let listeners = self.listeners_for(sensor);
        for listener in &listeners {
            listener.on_accuracy_changed(sensor, accuracy);
        }
        listeners.len()
    }

    pub fn registration_count(&self) -> usize {
        self.registrations.read().len()
    }

    pub fn registrations_for(&self, sensor: &Sensor) -> usize {
        self.registrations
            .read()
            .iter()
            .filter(|r| r.sensor == *sensor)
            .count()
    }

    pub fn is_registered(&self, listener: &Arc<dyn SensorEventListener>) -> bool {
        self.registrations
            .read()
            .iter()
            .any(|r| same_listener(&r.listener, listener))
    }

    /// Parameters a listener/sensor pair was registered with
    pub fn registration_info(
        &self,
        listener: &Arc<dyn SensorEventListener>,
        sensor: &Sensor,
    ) -> Option<RegistrationInfo> {
        self.registrations
            .read()
            .iter()
            .find(|r| same_listener(&r.listener, listener) && r.sensor == *sensor)
            .map(|r| RegistrationInfo {
                sampling_period_us: r.sampling_period_us,
                max_report_latency_us: r.max_report_latency_us,
                handler: r.handler.clone(),
            })
    }

    /// Events dispatched without a listener error
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }
}

impl SensorManager for SimulatedSensorManager {
    fn register_listener(
        &self,
        listener: Arc<dyn SensorEventListener>,
        sensor: &Sensor,
        sampling_period_us: i32,
    ) -> bool {
        self.register(listener, sensor, sampling_period_us, None, None)
    }

    fn register_listener_with_latency(
        &self,
        listener: Arc<dyn SensorEventListener>,
        sensor: &Sensor,
        sampling_period_us: i32,
        max_report_latency_us: i32,
    ) -> bool {
        self.register(
            listener,
            sensor,
            sampling_period_us,
            Some(max_report_latency_us),
            None,
        )
    }

    fn register_listener_with_handler(
        &self,
        listener: Arc<dyn SensorEventListener>,
        sensor: &Sensor,
        sampling_period_us: i32,
        handler: &DispatchHandler,
    ) -> bool {
        self.register(
            listener,
            sensor,
            sampling_period_us,
            None,
            Some(handler.clone()),
        )
    }

    fn unregister_listener(&self, listener: Arc<dyn SensorEventListener>) {
        self.registrations
            .write()
            .retain(|r| !same_listener(&r.listener, &listener));
    }

    fn unregister_listener_for(&self, listener: Arc<dyn SensorEventListener>, sensor: &Sensor) {
        self.registrations
            .write()
            .retain(|r| !(same_listener(&r.listener, &listener) && r.sensor == *sensor));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interception::sensor::SensorKind;
    use crate::utils::errors::EngineError;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Counter {
        events: Mutex<u32>,
        statuses: Mutex<u32>,
    }

    impl SensorEventListener for Counter {
        fn on_sensor_changed(&self, _event: &mut SensorEvent) -> Result<()> {
            *self.events.lock() += 1;
            Ok(())
        }

        fn on_accuracy_changed(&self, _sensor: &Sensor, _accuracy: Accuracy) {
            *self.statuses.lock() += 1;
        }
    }

    fn accel() -> Sensor {
        Sensor::new(1, "accel", SensorKind::Accelerometer)
    }

    #[test]
    fn test_dispatch_reaches_registered_listeners_only() {
        let manager = SimulatedSensorManager::new();
        let counter = Arc::new(Counter::default());
        let gyro = Sensor::new(2, "gyro", SensorKind::Gyroscope);

        assert!(manager.register_listener(counter.clone(), &accel(), 100));

        let event = SensorEvent::new(accel(), vec![0.0, 0.0, 0.0], 1);
        assert_eq!(manager.dispatch(&event).unwrap(), 1);

        let other = SensorEvent::new(gyro.clone(), vec![0.0, 0.0, 0.0], 1);
        assert_eq!(manager.dispatch(&other).unwrap(), 0);

        assert_eq!(manager.dispatch_accuracy(&accel(), Accuracy::Low), 1);
        assert_eq!(*counter.events.lock(), 1);
        assert_eq!(*counter.statuses.lock(), 1);
    }

    struct Failing;

    impl SensorEventListener for Failing {
        fn on_sensor_changed(&self, event: &mut SensorEvent) -> Result<()> {
            Err(EngineError::transform(&event.sensor, "rejected"))
        }

        fn on_accuracy_changed(&self, _sensor: &Sensor, _accuracy: Accuracy) {}
    }

    #[test]
    fn test_failing_listener_does_not_starve_others() {
        let manager = SimulatedSensorManager::new();
        let counter = Arc::new(Counter::default());

        assert!(manager.register_listener(Arc::new(Failing), &accel(), 100));
        assert!(manager.register_listener(counter.clone(), &accel(), 100));

        let event = SensorEvent::new(accel(), vec![0.0, 0.0, 0.0], 1);
        let err = manager.dispatch(&event).unwrap_err();

        assert!(matches!(err, EngineError::TransformFailed { .. }));
        assert_eq!(*counter.events.lock(), 1);
        assert_eq!(manager.dispatched(), 0);
    }

    #[test]
    fn test_duplicate_registration_is_updated_in_place() {
        let manager = SimulatedSensorManager::new();
        let counter: Arc<dyn SensorEventListener> = Arc::new(Counter::default());

        assert!(manager.register_listener(Arc::clone(&counter), &accel(), 100));
        assert!(manager.register_listener_with_latency(Arc::clone(&counter), &accel(), 100, 5_000));

        assert_eq!(manager.registration_count(), 1);
        let info = manager.registration_info(&counter, &accel()).unwrap();
        assert_eq!(info.sampling_period_us, 100);
        assert_eq!(info.max_report_latency_us, Some(5_000));
        assert_eq!(info.handler, None);
    }

    #[test]
    fn test_rejects_invalid_registrations() {
        let manager = SimulatedSensorManager::new();
        let counter = Arc::new(Counter::default());

        assert!(!manager.register_listener(counter.clone(), &accel(), -1));
        assert!(!manager.register_listener(
            counter.clone(),
            &Sensor::new(5, "", SensorKind::Light),
            100
        ));
        assert_eq!(manager.registration_count(), 0);
    }

    #[test]
    fn test_unregister_by_identity() {
        let manager = SimulatedSensorManager::new();
        let a: Arc<dyn SensorEventListener> = Arc::new(Counter::default());
        let b: Arc<dyn SensorEventListener> = Arc::new(Counter::default());
        let gyro = Sensor::new(2, "gyro", SensorKind::Gyroscope);

        manager.register_listener(Arc::clone(&a), &accel(), 1);
        manager.register_listener(Arc::clone(&a), &gyro, 1);
        manager.register_listener_with_handler(
            Arc::clone(&b),
            &accel(),
            1,
            &DispatchHandler::new("looper"),
        );

        let info = manager.registration_info(&b, &accel()).unwrap();
        assert_eq!(info.handler, Some(DispatchHandler::new("looper")));

        manager.unregister_listener_for(Arc::clone(&a), &accel());
        assert_eq!(manager.registrations_for(&accel()), 1);
        assert!(manager.is_registered(&a));

        manager.unregister_listener(Arc::clone(&a));
        assert!(!manager.is_registered(&a));
        assert!(manager.is_registered(&b));
    }
}
