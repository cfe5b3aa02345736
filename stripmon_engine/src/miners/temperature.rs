//! Temperature/fan miner: feeds the sensor catalog from the live vendor
//! key namespace and rebuilds it when the hardware's key set changes.

use tracing::{debug, warn};

use crate::sensors::{Fan, SensorCatalog, SensorDescriptor, SensorKey};
use crate::source::SensorSource;

pub struct TemperatureMiner {
    source: Box<dyn SensorSource>,
    catalog: SensorCatalog,
}

impl TemperatureMiner {
    /// The catalog is built by whoever assembles the miners and handed in
    /// here; this miner owns its lifecycle from then on.
    pub fn new(source: Box<dyn SensorSource>, catalog: SensorCatalog) -> Self {
        Self { source, catalog }
    }

    pub fn graph_update(&mut self) {
        let snapshot = match self.source.read() {
            Ok(s) => s,
            Err(e) => {
                warn!("sensor source unavailable: {e}");
                return;
            }
        };
        let keys: Vec<SensorKey> = snapshot.values.iter().map(|(k, _)| *k).collect();
        if self.catalog.is_stale(&keys) {
            debug!(sensors = keys.len(), "sensor key set changed, rebuilding catalog");
            self.catalog.rebuild(&keys);
        }
        for (key, value) in snapshot.values {
            self.catalog.set_current_value(key, value);
        }
    }

    pub fn catalog(&self) -> &SensorCatalog {
        &self.catalog
    }

    pub fn location_keys(&self, include_unknown: bool) -> Vec<SensorKey> {
        self.catalog.location_keys(include_unknown)
    }

    pub fn sensor_for_location(&self, key: &SensorKey) -> Option<&SensorDescriptor> {
        self.catalog.sensor(key)
    }

    pub fn is_fan_sensor(&self, sensor: &SensorDescriptor) -> bool {
        sensor.key.is_fan()
    }

    pub fn fans(&self) -> Vec<Fan> {
        self.catalog.fans()
    }

    pub fn set_enabled(&mut self, key: SensorKey, enabled: bool) {
        self.catalog.set_enabled(key, enabled);
    }

    pub fn set_data_size(&mut self, sample_capacity: usize) {
        self.catalog.set_data_size(sample_capacity);
    }

    pub fn reset(&mut self) {
        self.catalog.reset();
    }
}
