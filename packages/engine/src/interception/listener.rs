// packages/engine/src/interception/listener.rs
//! Consumer callback contract and consumer identity

use crate::interception::sensor::{Accuracy, Sensor, SensorEvent};
use crate::utils::errors::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Callback contract every consumer (and every proxy) satisfies
pub trait SensorEventListener: Send + Sync {
    /// Handle a new reading. The event is borrowed mutably so that a
    /// wrapping layer can rewrite it in place before passing it on.
    fn on_sensor_changed(&self, event: &mut SensorEvent) -> Result<()>;

    /// Handle an accuracy/status change for `sensor`
    fn on_accuracy_changed(&self, sensor: &Sensor, accuracy: Accuracy);
}

/// Logical identity of a consumer
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ListenerKey(String);

impl ListenerKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Fresh unique key for consumers without a natural name
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// An empty key stands for the "null" consumer
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for ListenerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ListenerKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for ListenerKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// A consumer as presented at registration time
///
/// Equality and hashing only look at the key: distinct handle instances
/// carrying the same key denote the same consumer.
#[derive(Clone)]
pub struct ListenerHandle {
    key: ListenerKey,
    listener: Arc<dyn SensorEventListener>,
}

impl ListenerHandle {
    pub fn new(key: impl Into<ListenerKey>, listener: Arc<dyn SensorEventListener>) -> Self {
        Self {
            key: key.into(),
            listener,
        }
    }

    /// Wrap a listener under a generated key
    pub fn from_listener(listener: Arc<dyn SensorEventListener>) -> Self {
        Self::new(ListenerKey::generate(), listener)
    }

    pub fn key(&self) -> &ListenerKey {
        &self.key
    }

    pub fn listener(&self) -> &Arc<dyn SensorEventListener> {
        &self.listener
    }
}

impl PartialEq for ListenerHandle {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for ListenerHandle {}

impl Hash for ListenerHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Whether two listener pointers refer to the same object
pub fn same_listener(a: &Arc<dyn SensorEventListener>, b: &Arc<dyn SensorEventListener>) -> bool {
    // Compare data pointers only; vtable pointers may differ across codegen units
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Silent;

    impl SensorEventListener for Silent {
        fn on_sensor_changed(&self, _event: &mut SensorEvent) -> Result<()> {
            Ok(())
        }

        fn on_accuracy_changed(&self, _sensor: &Sensor, _accuracy: Accuracy) {}
    }

    #[test]
    fn test_handles_compare_by_key() {
        let a = ListenerHandle::new("ui.tilt", Arc::new(Silent));
        let b = ListenerHandle::new("ui.tilt", Arc::new(Silent));
        let c = ListenerHandle::new("ui.step", Arc::new(Silent));

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(!same_listener(a.listener(), b.listener()));
    }

    #[test]
    fn test_generated_keys_are_unique() {
        let a = ListenerKey::generate();
        let b = ListenerKey::generate();
        assert_ne!(a, b);
        assert!(!a.is_empty());
    }

    #[test]
    fn test_empty_key() {
        assert!(ListenerKey::new("").is_empty());
        assert!(ListenerKey::new("  ").is_empty());
    }

    #[test]
    fn test_same_listener() {
        let shared: Arc<dyn SensorEventListener> = Arc::new(Silent);
        let clone = Arc::clone(&shared);
        assert!(same_listener(&shared, &clone));
    }
}
