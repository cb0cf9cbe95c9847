//! End-to-end flow: facade → registry → simulated producer → proxy → consumer

use parking_lot::Mutex;
use sensorguard_engine::interception::{
    Accuracy, IdentityTransform, ListenerHandle, ListenerRegistry, OffsetTransform,
    RegistrationFacade, Sensor, SensorEvent, SensorEventListener, SensorKind,
};
use sensorguard_engine::replay::SimulatedSensorManager;
use sensorguard_engine::Result;
use std::sync::Arc;
use std::thread;

#[derive(Default)]
struct App {
    events: Mutex<Vec<SensorEvent>>,
    statuses: Mutex<Vec<(Sensor, Accuracy)>>,
}

impl SensorEventListener for App {
    fn on_sensor_changed(&self, event: &mut SensorEvent) -> Result<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }

    fn on_accuracy_changed(&self, sensor: &Sensor, accuracy: Accuracy) {
        self.statuses.lock().push((sensor.clone(), accuracy));
    }
}

fn accel() -> Sensor {
    Sensor::new(1, "accel", SensorKind::Accelerometer)
}

fn gyro() -> Sensor {
    Sensor::new(2, "gyro", SensorKind::Gyroscope)
}

fn offset_facade() -> RegistrationFacade<Arc<SimulatedSensorManager>> {
    let transform = OffsetTransform::new().with_correction(
        SensorKind::Accelerometer,
        vec![1.0, 2.0, 3.0],
        1.0,
    );
    RegistrationFacade::new(
        Arc::new(ListenerRegistry::new(Arc::new(transform))),
        Arc::new(SimulatedSensorManager::new()),
    )
}

#[test]
fn test_transformed_delivery_then_eviction() {
    let facade = offset_facade();
    let app = Arc::new(App::default());
    let handle = ListenerHandle::new("com.example.app", app.clone());

    assert!(facade.register_listener(&handle, &accel(), 20_000).unwrap());

    let event = SensorEvent::new(accel(), vec![0.5, 0.5, 0.5], 42).with_accuracy(Accuracy::Medium);
    assert_eq!(facade.manager().dispatch(&event).unwrap(), 1);

    {
        let events = app.events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].values, vec![1.5, 2.5, 3.5]);
        // fields outside the payload are untouched
        assert_eq!(events[0].sensor, accel());
        assert_eq!(events[0].timestamp_ns, 42);
        assert_eq!(events[0].accuracy, Accuracy::Medium);
    }

    facade.unregister_listener_for(&handle, &accel());
    assert!(!facade.registry().contains(handle.key()));
    assert_eq!(facade.manager().registration_count(), 0);

    // the producer no longer reaches the evicted proxy
    assert_eq!(facade.manager().dispatch(&event).unwrap(), 0);
    assert_eq!(app.events.lock().len(), 1);
}

#[test]
fn test_payload_beyond_axes_is_preserved() {
    let facade = offset_facade();
    let app = Arc::new(App::default());
    let handle = ListenerHandle::new("app", app.clone());
    facade.register_listener(&handle, &accel(), 1).unwrap();

    let event = SensorEvent::new(accel(), vec![0.0, 0.0, 0.0, 7.25, -1.5], 1);
    facade.manager().dispatch(&event).unwrap();

    assert_eq!(app.events.lock()[0].values, vec![1.0, 2.0, 3.0, 7.25, -1.5]);
}

#[test]
fn test_status_changes_are_forwarded_untouched() {
    let facade = offset_facade();
    let app = Arc::new(App::default());
    let handle = ListenerHandle::new("app", app.clone());
    facade.register_listener(&handle, &accel(), 1).unwrap();

    assert_eq!(facade.manager().dispatch_accuracy(&accel(), Accuracy::Unreliable), 1);
    assert_eq!(
        app.statuses.lock().as_slice(),
        &[(accel(), Accuracy::Unreliable)]
    );
}

#[test]
fn test_one_proxy_across_sensors_until_last_detach() {
    let facade = offset_facade();
    let app = Arc::new(App::default());
    let handle = ListenerHandle::new("app", app.clone());

    facade.register_listener(&handle, &accel(), 1).unwrap();
    facade.register_listener_with_latency(&handle, &gyro(), 1, 10_000).unwrap();
    let proxy = facade.registry().lookup(handle.key()).unwrap();
    assert_eq!(proxy.sensor_count(), 2);
    assert_eq!(facade.registry().len(), 1);

    facade.unregister_listener_for(&handle, &accel());
    assert!(facade.registry().contains(handle.key()));

    // gyro still flows, untransformed since only accel has a correction
    let event = SensorEvent::new(gyro(), vec![0.1, 0.2, 0.3], 5);
    assert_eq!(facade.manager().dispatch(&event).unwrap(), 1);
    assert_eq!(app.events.lock()[0].values, vec![0.1, 0.2, 0.3]);

    facade.unregister_listener(&handle);
    assert!(facade.registry().is_empty());
    assert_eq!(facade.manager().registration_count(), 0);
}

#[test]
fn test_concurrent_consumers_through_facade() {
    let facade = Arc::new(RegistrationFacade::new(
        Arc::new(ListenerRegistry::new(Arc::new(IdentityTransform))),
        Arc::new(SimulatedSensorManager::new()),
    ));

    let workers: Vec<_> = (0..8)
        .map(|t| {
            let facade = Arc::clone(&facade);
            thread::spawn(move || {
                let app = Arc::new(App::default());
                for round in 0..50 {
                    let handle = ListenerHandle::new(format!("app-{}-{}", t, round % 5), app.clone());
                    facade.register_listener(&handle, &accel(), 1).unwrap();
                    facade.register_listener(&handle, &gyro(), 1).unwrap();
                    facade.unregister_listener_for(&handle, &accel());
                    if round % 2 == 0 {
                        facade.unregister_listener(&handle);
                    }
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    let registry = facade.registry();
    for key in registry.keys() {
        let proxy = registry.lookup(&key).unwrap();
        assert!(proxy.is_active());
        assert_eq!(proxy.sensors(), vec![gyro()]);
    }
    let stats = registry.stats();
    assert_eq!(stats.live_proxies, registry.len());
    assert_eq!(
        stats.proxies_created - stats.proxies_evicted,
        registry.len() as u64
    );
    // every live proxy is registered once, for gyro only
    assert_eq!(facade.manager().registrations_for(&accel()), 0);
    assert_eq!(facade.manager().registrations_for(&gyro()), registry.len());
}
