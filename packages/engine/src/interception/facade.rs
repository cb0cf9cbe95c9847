// packages/engine/src/interception/facade.rs
//! Registration facade invoked by the call-interception layer
//!
//! Mirrors every register/unregister shape of the producer API. Each call
//! swaps the consumer for the handle the registry hands back and forwards
//! to the genuine producer, returning its result untouched.
//!
//! ```text
//! register(listener, sensor, ..)
//!     │
//!     ├─ registry.attach(listener, sensor) → proxy
//!     └─ manager.register_*(proxy, sensor, ..) → bool (returned as-is)
//!
//! unregister(listener[, sensor])
//!     │
//!     ├─ registry.detach(listener, sensor) → proxy | listener
//!     └─ manager.unregister_*(substitute[, sensor])
//! ```

use crate::interception::listener::{ListenerHandle, SensorEventListener};
use crate::interception::registry::ListenerRegistry;
use crate::interception::sensor::Sensor;
use crate::utils::errors::Result;
use std::sync::Arc;
use tracing::debug;

/// Opaque identity of the thread/loop a producer should dispatch on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DispatchHandler(String);

impl DispatchHandler {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

/// The producer's genuine registration API
pub trait SensorManager: Send + Sync {
    fn register_listener(
        &self,
        listener: Arc<dyn SensorEventListener>,
        sensor: &Sensor,
        sampling_period_us: i32,
    ) -> bool;

    fn register_listener_with_latency(
        &self,
        listener: Arc<dyn SensorEventListener>,
        sensor: &Sensor,
        sampling_period_us: i32,
        max_report_latency_us: i32,
    ) -> bool;

    fn register_listener_with_handler(
        &self,
        listener: Arc<dyn SensorEventListener>,
        sensor: &Sensor,
        sampling_period_us: i32,
        handler: &DispatchHandler,
    ) -> bool;

    /// Unregister `listener` from every sensor
    fn unregister_listener(&self, listener: Arc<dyn SensorEventListener>);

    fn unregister_listener_for(&self, listener: Arc<dyn SensorEventListener>, sensor: &Sensor);
}

impl<T: SensorManager + ?Sized> SensorManager for Arc<T> {
    fn register_listener(
        &self,
        listener: Arc<dyn SensorEventListener>,
        sensor: &Sensor,
        sampling_period_us: i32,
    ) -> bool {
        (**self).register_listener(listener, sensor, sampling_period_us)
    }

    fn register_listener_with_latency(
        &self,
        listener: Arc<dyn SensorEventListener>,
        sensor: &Sensor,
        sampling_period_us: i32,
        max_report_latency_us: i32,
    ) -> bool {
        (**self).register_listener_with_latency(
            listener,
            sensor,
            sampling_period_us,
            max_report_latency_us,
        )
    }

    fn register_listener_with_handler(
        &self,
        listener: Arc<dyn SensorEventListener>,
        sensor: &Sensor,
        sampling_period_us: i32,
        handler: &DispatchHandler,
    ) -> bool {
        (**self).register_listener_with_handler(listener, sensor, sampling_period_us, handler)
    }

    fn unregister_listener(&self, listener: Arc<dyn SensorEventListener>) {
        (**self).unregister_listener(listener)
    }

    fn unregister_listener_for(&self, listener: Arc<dyn SensorEventListener>, sensor: &Sensor) {
        (**self).unregister_listener_for(listener, sensor)
    }
}

/// Adapter between intercepted calls and the registry
pub struct RegistrationFacade<M> {
    registry: Arc<ListenerRegistry>,
    manager: M,
}

impl<M: SensorManager> RegistrationFacade<M> {
    pub fn new(registry: Arc<ListenerRegistry>, manager: M) -> Self {
        Self { registry, manager }
    }

    pub fn registry(&self) -> &Arc<ListenerRegistry> {
        &self.registry
    }

    pub fn manager(&self) -> &M {
        &self.manager
    }

    pub fn register_listener(
        &self,
        listener: &ListenerHandle,
        sensor: &Sensor,
        sampling_period_us: i32,
    ) -> Result<bool> {
        let proxy = self.registry.attach(listener, sensor)?;
        debug!(proxy = proxy.id(), "Forwarding register for {}", sensor);
        Ok(self
            .manager
            .register_listener(proxy, sensor, sampling_period_us))
    }

    pub fn register_listener_with_latency(
        &self,
        listener: &ListenerHandle,
        sensor: &Sensor,
        sampling_period_us: i32,
        max_report_latency_us: i32,
    ) -> Result<bool> {
        let proxy = self.registry.attach(listener, sensor)?;
        debug!(proxy = proxy.id(), "Forwarding batched register for {}", sensor);
        Ok(self.manager.register_listener_with_latency(
            proxy,
            sensor,
            sampling_period_us,
            max_report_latency_us,
        ))
    }

    pub fn register_listener_with_handler(
        &self,
        listener: &ListenerHandle,
        sensor: &Sensor,
        sampling_period_us: i32,
        handler: &DispatchHandler,
    ) -> Result<bool> {
        let proxy = self.registry.attach(listener, sensor)?;
        debug!(
            proxy = proxy.id(),
            "Forwarding register for {} on {}",
            sensor,
            handler.name()
        );
        Ok(self
            .manager
            .register_listener_with_handler(proxy, sensor, sampling_period_us, handler))
    }

    pub fn unregister_listener(&self, listener: &ListenerHandle) {
        let substitute = self.registry.detach(listener, None);
        self.manager.unregister_listener(substitute.listener());
    }

    pub fn unregister_listener_for(&self, listener: &ListenerHandle, sensor: &Sensor) {
        let substitute = self.registry.detach(listener, Some(sensor));
        self.manager
            .unregister_listener_for(substitute.listener(), sensor);
    }
}
