// packages/engine/src/interception/registry.rs
//! Listener registry mapping consumers to their proxies
//!
//! One `ListenerProxy` exists per consumer key. Attaching a sensor to a
//! consumer creates the proxy on first use; detaching the last sensor
//! evicts it. An evicted proxy is never handed out again: the next attach
//! for the same key allocates a fresh one.
//!
//! Every attach/detach runs while holding the map entry for its key, so
//! lookup, sensor-set mutation and eviction form one critical section per
//! consumer. Event delivery goes through the proxy only and never takes
//! that lock.

use crate::interception::listener::{ListenerHandle, ListenerKey, SensorEventListener};
use crate::interception::proxy::ListenerProxy;
use crate::interception::sensor::Sensor;
use crate::interception::transform::EventTransform;
use crate::observability::names;
use crate::utils::config::RegistryConfig;
use crate::utils::errors::{EngineError, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Handle to forward downstream after a detach
#[derive(Debug, Clone)]
pub enum Substitute {
    /// The consumer was wrapped; the proxy is either still active or was
    /// just evicted
    Proxy(Arc<ListenerProxy>),

    /// The consumer was never wrapped by this registry
    Original(ListenerHandle),
}

impl Substitute {
    /// The listener object the producer knows about
    pub fn listener(&self) -> Arc<dyn SensorEventListener> {
        match self {
            Self::Proxy(proxy) => Arc::clone(proxy) as Arc<dyn SensorEventListener>,
            Self::Original(handle) => Arc::clone(handle.listener()),
        }
    }

    pub fn as_proxy(&self) -> Option<&Arc<ListenerProxy>> {
        match self {
            Self::Proxy(proxy) => Some(proxy),
            Self::Original(_) => None,
        }
    }

    pub fn is_proxy(&self) -> bool {
        matches!(self, Self::Proxy(_))
    }
}

/// Process-wide table of active proxies
pub struct ListenerRegistry {
    proxies: DashMap<ListenerKey, Arc<ListenerProxy>>,
    transform: Arc<dyn EventTransform>,
    next_proxy_id: AtomicU64,
    counters: RegistryCounters,
}

#[derive(Default)]
struct RegistryCounters {
    attaches: AtomicU64,
    detaches: AtomicU64,
    proxies_created: AtomicU64,
    proxies_evicted: AtomicU64,
}

impl ListenerRegistry {
    /// Create an empty registry whose proxies apply `transform`
    pub fn new(transform: Arc<dyn EventTransform>) -> Self {
        Self::with_capacity(transform, 0)
    }

    pub fn with_capacity(transform: Arc<dyn EventTransform>, capacity: usize) -> Self {
        info!(
            "Initializing listener registry with {} transform",
            transform.name()
        );

        Self {
            proxies: DashMap::with_capacity(capacity),
            transform,
            next_proxy_id: AtomicU64::new(1),
            counters: RegistryCounters::default(),
        }
    }

    pub fn from_config(config: &RegistryConfig, transform: Arc<dyn EventTransform>) -> Self {
        Self::with_capacity(transform, config.initial_capacity)
    }

    /// Route `sensor` through the proxy for `consumer`, creating the proxy
    /// if the consumer is not wrapped yet
    pub fn attach(&self, consumer: &ListenerHandle, sensor: &Sensor) -> Result<Arc<ListenerProxy>> {
        if consumer.key().is_empty() {
            return Err(EngineError::InvalidArgument(
                "consumer handle has an empty key".to_string(),
            ));
        }
        if !sensor.is_valid() {
            return Err(EngineError::InvalidArgument(format!(
                "sensor #{} has no name",
                sensor.handle()
            )));
        }

        let (proxy, created) = match self.proxies.entry(consumer.key().clone()) {
            Entry::Occupied(entry) => {
                let proxy = Arc::clone(entry.get());
                proxy.attach_sensor(sensor.clone());
                (proxy, false)
            }
            Entry::Vacant(entry) => {
                let id = self.next_proxy_id.fetch_add(1, Ordering::Relaxed);
                let proxy = Arc::new(ListenerProxy::new(
                    id,
                    consumer.clone(),
                    Arc::clone(&self.transform),
                ));
                proxy.attach_sensor(sensor.clone());
                entry.insert(Arc::clone(&proxy));
                (proxy, true)
            }
        };

        self.counters.attaches.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(names::ATTACH_TOTAL).increment(1);

        if created {
            self.counters.proxies_created.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(names::PROXIES_CREATED).increment(1);
            self.publish_live_gauge();
            info!(proxy = proxy.id(), "Wrapped listener {} for {}", consumer.key(), sensor);
        } else {
            debug!(proxy = proxy.id(), "Attached {} to listener {}", sensor, consumer.key());
        }

        Ok(proxy)
    }

    /// Stop routing `sensor` (or every sensor, for `None`) through the
    /// proxy for `consumer`
    ///
    /// Unknown consumers are handed back unchanged so the caller can still
    /// forward the unregister call.
    pub fn detach(&self, consumer: &ListenerHandle, sensor: Option<&Sensor>) -> Substitute {
        let (proxy, evicted) = match self.proxies.entry(consumer.key().clone()) {
            Entry::Vacant(_) => {
                debug!("Detach for unknown listener {}, passing through", consumer.key());
                return Substitute::Original(consumer.clone());
            }
            Entry::Occupied(entry) => {
                let remaining = entry.get().detach_sensor(sensor);
                if remaining == 0 {
                    (entry.remove(), true)
                } else {
                    (Arc::clone(entry.get()), false)
                }
            }
        };

        self.counters.detaches.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(names::DETACH_TOTAL).increment(1);

        if evicted {
            self.counters.proxies_evicted.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(names::PROXIES_EVICTED).increment(1);
            self.publish_live_gauge();
            info!(proxy = proxy.id(), "Released listener {}", consumer.key());
        } else {
            debug!(
                proxy = proxy.id(),
                "Detached {} from listener {}, {} sensor(s) left",
                sensor.map(ToString::to_string).unwrap_or_else(|| "all sensors".to_string()),
                consumer.key(),
                proxy.sensor_count()
            );
        }

        Substitute::Proxy(proxy)
    }

    /// Active proxy for a consumer key
    pub fn lookup(&self, key: &ListenerKey) -> Option<Arc<ListenerProxy>> {
        self.proxies.get(key).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, key: &ListenerKey) -> bool {
        self.proxies.contains_key(key)
    }

    /// Number of wrapped consumers
    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    pub fn keys(&self) -> Vec<ListenerKey> {
        self.proxies.iter().map(|entry| entry.key().clone()).collect()
    }

    /// The transform every proxy created by this registry applies
    pub fn transform(&self) -> &Arc<dyn EventTransform> {
        &self.transform
    }

    /// Evict every proxy, e.g. at shutdown
    pub fn drain(&self) -> Vec<Arc<ListenerProxy>> {
        let keys = self.keys();
        let mut drained = Vec::with_capacity(keys.len());

        for key in keys {
            if let Some((_, proxy)) = self.proxies.remove(&key) {
                proxy.detach_sensor(None);
                self.counters.proxies_evicted.fetch_add(1, Ordering::Relaxed);
                drained.push(proxy);
            }
        }

        if !drained.is_empty() {
            metrics::counter!(names::PROXIES_EVICTED).increment(drained.len() as u64);
            info!("Drained {} listener proxies", drained.len());
        }
        self.publish_live_gauge();

        drained
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            live_proxies: self.proxies.len(),
            attaches: self.counters.attaches.load(Ordering::Relaxed),
            detaches: self.counters.detaches.load(Ordering::Relaxed),
            proxies_created: self.counters.proxies_created.load(Ordering::Relaxed),
            proxies_evicted: self.counters.proxies_evicted.load(Ordering::Relaxed),
        }
    }

    // Must not be called while an entry guard is held: len() locks every shard
    fn publish_live_gauge(&self) {
        metrics::gauge!(names::LIVE_PROXIES).set(self.proxies.len() as f64);
    }
}

/// Registry counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub live_proxies: usize,
    pub attaches: u64,
    pub detaches: u64,
    pub proxies_created: u64,
    pub proxies_evicted: u64,
}
