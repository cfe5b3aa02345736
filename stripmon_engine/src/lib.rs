//! Telemetry sampling and time-series engine for the stripmon resource
//! monitor.
//!
//! The engine polls raw OS and hardware counters at several independent
//! cadences, converts cumulative readings into rates, stores derived values
//! in fixed-capacity ring buffers ([`TimeSeries`]), and groups opaque
//! vendor sensor keys into presentable instrument families
//! ([`sensors::SensorCatalog`]). Rendering, preferences, and window chrome
//! live elsewhere; they consume read-only snapshots and never mutate
//! engine state.

pub mod config;
pub mod damping;
pub mod engine;
pub mod error;
pub mod feeds;
pub mod miners;
pub mod schedule;
pub mod sensors;
pub mod series;
pub mod source;

pub use config::{load_settings, save_settings, Settings, SettingsHandle};
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use schedule::{Cadence, Scheduler};
pub use series::{CombineOp, TimeSeries};
