// packages/engine/src/interception/mod.rs
//! Listener interception layer
//!
//! This module wraps sensor consumers transparently and rewrites their
//! readings in flight:
//!
//! - **Sensor**: sources, readings and accuracy codes
//! - **Listener**: the consumer callback contract and consumer identity
//! - **Transform**: pluggable payload rewrite applied at delivery time
//! - **Proxy**: per-consumer wrapper that transforms then forwards
//! - **Registry**: consumer → proxy table with reference-counted sensors
//! - **Facade**: adapter between intercepted producer calls and the registry
//! - **Calibration**: view-attach trigger for the one-shot calibration
//!
//! # Architecture
//!
//! ```text
//! App Code (Unmodified)
//!     │
//!     ├─ register(listener, sensor) → Facade → Registry.attach → Proxy
//!     │                                   └─ Producer.register(Proxy)
//!     │
//!     └─ unregister(listener) → Facade → Registry.detach → Proxy | listener
//!                                     └─ Producer.unregister(substitute)
//!
//! Producer dispatch → Proxy.on_sensor_changed → Transform → listener
//! ```

pub mod calibration;
pub mod facade;
pub mod listener;
pub mod proxy;
pub mod registry;
pub mod sensor;
pub mod transform;

// Re-export commonly used types
pub use calibration::{CalibrationRoutine, ContentHost, ContentSpec, ViewAttachHook, ViewContext};
pub use facade::{DispatchHandler, RegistrationFacade, SensorManager};
pub use listener::{ListenerHandle, ListenerKey, SensorEventListener};
pub use proxy::{ListenerProxy, ProxyStats};
pub use registry::{ListenerRegistry, RegistryStats, Substitute};
pub use sensor::{Accuracy, Sensor, SensorEvent, SensorKind};
pub use transform::{
    build_transform, EventTransform, IdentityTransform, NoiseTransform, OffsetTransform,
    TransformChain,
};
