// packages/engine/src/replay/mod.rs
//! Offline replay of captured sensor readings
//!
//! - **Recording**: CSV capture loading
//! - **Manager**: in-process producer that dispatches to registered listeners
//! - **Player**: end-to-end run through facade, registry and proxy, with a report

pub mod manager;
pub mod player;
pub mod recording;

pub use manager::{RegistrationInfo, SimulatedSensorManager};
pub use player::{ReplayReport, ReplaySession, ReportFormat, SensorReport};
pub use recording::{load_directory, load_recording, Recording, Sample};
