// packages/engine/src/interception/transform.rs
//! Payload transforms applied by proxies at delivery time
//!
//! A transform rewrites the measurement values of one event in place. It
//! is a pure function of `(sensor, values)`: the same input always yields
//! the same output, it never blocks and it never calls back into the
//! listener registry.

use crate::interception::sensor::{Sensor, SensorKind};
use crate::utils::config::{KindCorrection, TransformConfig, TransformKind};
use crate::utils::errors::{EngineError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// In-place payload rewrite
pub trait EventTransform: Send + Sync {
    /// Rewrite `values` for an event produced by `sensor`.
    ///
    /// On error `values` must be left as it was.
    fn apply(&self, sensor: &Sensor, values: &mut [f32]) -> Result<()>;

    fn name(&self) -> &'static str;
}

/// Reject payloads a correcting transform cannot work on
pub fn check_payload(sensor: &Sensor, values: &[f32]) -> Result<()> {
    let axes = sensor.kind().axes();
    if values.len() < axes {
        return Err(EngineError::transform(
            sensor,
            format!("payload has {} values, expected at least {}", values.len(), axes),
        ));
    }
    if let Some(pos) = values[..axes].iter().position(|v| !v.is_finite()) {
        return Err(EngineError::transform(
            sensor,
            format!("axis {} is not a finite number", pos),
        ));
    }
    Ok(())
}

/// Passes every payload through untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTransform;

impl EventTransform for IdentityTransform {
    fn apply(&self, _sensor: &Sensor, _values: &mut [f32]) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "identity"
    }
}

#[derive(Debug, Clone, PartialEq)]
struct AxisCorrection {
    bias: Vec<f32>,
    gain: f32,
}

/// Per-kind gain and bias: `v' = v * gain + bias[axis]`
#[derive(Debug, Clone, Default)]
pub struct OffsetTransform {
    corrections: HashMap<SensorKind, AxisCorrection>,
}

impl OffsetTransform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_correction(mut self, kind: SensorKind, bias: Vec<f32>, gain: f32) -> Self {
        self.corrections.insert(kind, AxisCorrection { bias, gain });
        self
    }

    pub fn from_corrections(corrections: &[KindCorrection]) -> Self {
        corrections.iter().fold(Self::new(), |t, c| {
            t.with_correction(c.sensor, c.bias.clone(), c.gain)
        })
    }

    pub fn covers(&self, kind: SensorKind) -> bool {
        self.corrections.contains_key(&kind)
    }
}

impl EventTransform for OffsetTransform {
    fn apply(&self, sensor: &Sensor, values: &mut [f32]) -> Result<()> {
        let Some(correction) = self.corrections.get(&sensor.kind()) else {
            return Ok(());
        };
        check_payload(sensor, values)?;

        let axes = sensor.kind().axes();
        for (axis, value) in values[..axes].iter_mut().enumerate() {
            let bias = correction.bias.get(axis).copied().unwrap_or(0.0);
            *value = *value * correction.gain + bias;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "offset"
    }
}

/// Bounded jitter, reproducible from the input
///
/// The RNG is seeded from the configured seed, the sensor handle and the
/// bit pattern of the incoming values, so equal inputs get equal noise.
#[derive(Debug, Clone)]
pub struct NoiseTransform {
    amplitude: f32,
    seed: u64,
    /// Empty = every kind
    kinds: HashSet<SensorKind>,
}

impl NoiseTransform {
    /// Jitter of up to `amplitude` per axis; the sign is ignored and a
    /// non-finite amplitude disables the jitter
    pub fn new(amplitude: f32, seed: u64) -> Self {
        let amplitude = if amplitude.is_finite() { amplitude.abs() } else { 0.0 };
        Self {
            amplitude,
            seed,
            kinds: HashSet::new(),
        }
    }

    pub fn for_kinds(mut self, kinds: impl IntoIterator<Item = SensorKind>) -> Self {
        self.kinds = kinds.into_iter().collect();
        self
    }

    pub fn amplitude(&self) -> f32 {
        self.amplitude
    }

    fn applies_to(&self, kind: SensorKind) -> bool {
        self.kinds.is_empty() || self.kinds.contains(&kind)
    }

    fn event_seed(&self, sensor: &Sensor, values: &[f32]) -> u64 {
        let mut state = splitmix64(self.seed ^ u64::from(sensor.handle()));
        for value in values {
            state = splitmix64(state ^ u64::from(value.to_bits()));
        }
        state
    }
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

impl EventTransform for NoiseTransform {
    fn apply(&self, sensor: &Sensor, values: &mut [f32]) -> Result<()> {
        if !self.applies_to(sensor.kind()) {
            return Ok(());
        }
        check_payload(sensor, values)?;
        if self.amplitude == 0.0 {
            return Ok(());
        }

        let axes = sensor.kind().axes();
        let mut rng = StdRng::seed_from_u64(self.event_seed(sensor, &values[..axes]));
        for value in values[..axes].iter_mut() {
            *value += rng.gen_range(-self.amplitude..=self.amplitude);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "noise"
    }
}

/// Applies transforms in order; all-or-nothing
pub struct TransformChain {
    stages: Vec<Arc<dyn EventTransform>>,
}

impl TransformChain {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    pub fn then(mut self, stage: Arc<dyn EventTransform>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl Default for TransformChain {
    fn default() -> Self {
        Self::new()
    }
}

impl EventTransform for TransformChain {
    fn apply(&self, sensor: &Sensor, values: &mut [f32]) -> Result<()> {
        let mut scratch = values.to_vec();
        for stage in &self.stages {
            stage.apply(sensor, &mut scratch)?;
        }
        values.copy_from_slice(&scratch);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "chain"
    }
}

/// Build the transform described by the configuration
pub fn build_transform(config: &TransformConfig) -> Arc<dyn EventTransform> {
    debug!("Building {:?} transform", config.kind);

    let offset = || OffsetTransform::from_corrections(&config.corrections);
    let noise = || {
        NoiseTransform::new(config.noise_amplitude, config.noise_seed)
            .for_kinds(config.noise_sensors.iter().copied())
    };

    match config.kind {
        TransformKind::Identity => Arc::new(IdentityTransform),
        TransformKind::Offset => Arc::new(offset()),
        TransformKind::Noise => Arc::new(noise()),
        TransformKind::OffsetNoise => Arc::new(
            TransformChain::new()
                .then(Arc::new(offset()))
                .then(Arc::new(noise())),
        ),
    }
}
