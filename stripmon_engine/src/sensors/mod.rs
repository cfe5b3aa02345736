//! Sensor key discovery, grouping, and the catalog of live descriptors.
//!
//! The catalog is an explicitly constructed service: the process context
//! that assembles the miners builds one, hands it to the temperature miner,
//! and the miner rebuilds it whenever the live key set changes (first
//! launch, wake from sleep, hardware swap). Group membership depends on
//! global key presence, so rebuilds are wholesale, never incremental.

mod group;
mod key;

pub use group::{SensorGroup, SensorSeries};
pub use key::{SensorKey, KEY_WIDTH};

use std::collections::{BTreeMap, BTreeSet};

use crate::series::TimeSeries;

/// Wildcard patterns the catalog knows how to describe. Order matters:
/// the first pattern that matches a key names it.
const GROUP_PATTERNS: &[(&str, &str)] = &[
    ("TC?c", "CPU Core ?"),
    ("Tp0?", "CPU Proximity ?"),
    ("TC0?", "CPU ?"),
    ("TG0?", "GPU ?"),
    ("Tm0?", "Memory Module ?"),
    ("TA0?", "Ambient ?"),
    ("Th0?", "Heatsink ?"),
    ("TW0?", "Wireless Module ?"),
    ("F?Ac", "Fan ? Speed"),
    ("F?Tg", "Fan ? Target"),
    ("F?Mn", "Fan ? Minimum"),
    ("F?Mx", "Fan ? Maximum"),
];

/// One live sensor: raw key, resolved name when the key family is known,
/// current value, and the history ring feeding its strip chart.
#[derive(Debug, Clone)]
pub struct SensorDescriptor {
    pub key: SensorKey,
    pub human_name: Option<String>,
    pub units: Option<&'static str>,
    pub current_value: f32,
    pub series: TimeSeries,
    pub enabled: bool,
}

impl SensorDescriptor {
    fn new(key: SensorKey, human_name: Option<String>, sample_capacity: usize) -> Self {
        let units = if key.is_temperature() {
            Some("°C")
        } else if key.is_fan() {
            Some("rpm")
        } else {
            None
        };
        Self {
            key,
            human_name,
            units,
            current_value: 0.0,
            series: TimeSeries::new(sample_capacity),
            enabled: true,
        }
    }

    /// Display label; unrecognized sensors fall back to the raw key code.
    pub fn label(&self) -> &str {
        self.human_name.as_deref().unwrap_or_else(|| self.key.as_str())
    }
}

/// A fan assembled from its speed-family key group.
#[derive(Debug, Clone, Default)]
pub struct Fan {
    pub name: String,
    pub key: Option<SensorKey>,
    pub actual_speed: i64,
    pub target_speed: i64,
    pub minimum_speed: i64,
    pub maximum_speed: i64,
}

#[derive(Debug)]
pub struct SensorCatalog {
    sample_capacity: usize,
    sensors: BTreeMap<SensorKey, SensorDescriptor>,
    groups: Vec<SensorGroup>,
    cataloged_keys: BTreeSet<SensorKey>,
}

impl SensorCatalog {
    pub fn new(sample_capacity: usize) -> Self {
        Self {
            sample_capacity,
            sensors: BTreeMap::new(),
            groups: Vec::new(),
            cataloged_keys: BTreeSet::new(),
        }
    }

    /// True when `available` differs from the key set this catalog was
    /// built from, meaning a rebuild is due.
    pub fn is_stale(&self, available: &[SensorKey]) -> bool {
        if available.len() != self.cataloged_keys.len() {
            return true;
        }
        !available.iter().all(|k| self.cataloged_keys.contains(k))
    }

    /// Re-discover all groups and descriptors from the live key set.
    /// History series survive for keys that persist across the rebuild.
    pub fn rebuild(&mut self, available: &[SensorKey]) {
        let mut old = std::mem::take(&mut self.sensors);

        self.groups = GROUP_PATTERNS
            .iter()
            .filter_map(|(pattern, description)| {
                SensorGroup::build(pattern, available, description)
            })
            .collect();

        let mut sensors = BTreeMap::new();
        for key in available {
            let name = self
                .groups
                .iter()
                .find_map(|g| g.description_for(key))
                .map(str::to_string);
            let descriptor = match old.remove(key) {
                Some(mut existing) => {
                    existing.human_name = name;
                    existing
                }
                None => SensorDescriptor::new(*key, name, self.sample_capacity),
            };
            sensors.insert(*key, descriptor);
        }
        self.sensors = sensors;
        self.cataloged_keys = available.iter().copied().collect();
    }

    /// Record the latest raw reading for a key and append it to history.
    /// Unknown keys are ignored; the caller rebuilds on key-set change.
    pub fn set_current_value(&mut self, key: SensorKey, value: f32) {
        if let Some(descriptor) = self.sensors.get_mut(&key) {
            descriptor.current_value = value;
            if descriptor.enabled {
                descriptor.series.append(value);
            }
        }
    }

    /// Toggling a sensor back on clears its stale history.
    pub fn set_enabled(&mut self, key: SensorKey, enabled: bool) {
        if let Some(descriptor) = self.sensors.get_mut(&key) {
            if enabled && !descriptor.enabled {
                descriptor.series.set_all(0.0);
            }
            descriptor.enabled = enabled;
        }
    }

    pub fn sensor(&self, key: &SensorKey) -> Option<&SensorDescriptor> {
        self.sensors.get(key)
    }

    pub fn groups(&self) -> &[SensorGroup] {
        &self.groups
    }

    /// All keys the catalog was built from, named families first in group
    /// order, then unrecognized keys in code order.
    pub fn location_keys(&self, include_unknown: bool) -> Vec<SensorKey> {
        let mut out = Vec::new();
        let mut seen = BTreeSet::new();
        for group in &self.groups {
            for key in group.key_order() {
                if seen.insert(*key) {
                    out.push(*key);
                }
            }
        }
        if include_unknown {
            for key in self.sensors.keys() {
                if seen.insert(*key) {
                    out.push(*key);
                }
            }
        }
        out
    }

    /// Assemble fans from the F-prefix key families: one fan per member of
    /// the speed group, joined with its target/min/max siblings.
    pub fn fans(&self) -> Vec<Fan> {
        let Some(speed_group) = self.groups.iter().find(|g| g.pattern() == "F?Ac") else {
            return Vec::new();
        };
        let mut fans = Vec::new();
        for key in speed_group.concurrent_keys() {
            let Some(slot) = key.char_at(1) else { continue };
            let sibling = |suffix: &str| -> i64 {
                let code = format!("F{slot}{suffix}");
                SensorKey::parse(&code)
                    .and_then(|k| self.sensors.get(&k))
                    .map(|d| d.current_value as i64)
                    .unwrap_or(0)
            };
            fans.push(Fan {
                name: format!("Fan {slot}"),
                key: Some(key),
                actual_speed: self
                    .sensors
                    .get(&key)
                    .map(|d| d.current_value as i64)
                    .unwrap_or(0),
                target_speed: sibling("Tg"),
                minimum_speed: sibling("Mn"),
                maximum_speed: sibling("Mx"),
            });
        }
        fans
    }

    /// Resize every descriptor's history ring.
    pub fn set_data_size(&mut self, sample_capacity: usize) {
        self.sample_capacity = sample_capacity;
        for descriptor in self.sensors.values_mut() {
            descriptor.series.resize(sample_capacity);
        }
    }

    /// Clear all history without losing discovery state.
    pub fn reset(&mut self) {
        for descriptor in self.sensors.values_mut() {
            descriptor.series.set_all(0.0);
            descriptor.current_value = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(codes: &[&str]) -> Vec<SensorKey> {
        codes.iter().map(|c| SensorKey::parse(c).unwrap()).collect()
    }

    #[test]
    fn rebuild_names_known_families_and_keeps_unknown_keys() {
        let mut catalog = SensorCatalog::new(16);
        catalog.rebuild(&keys(&["TC0a", "TC0b", "Zz9q"]));

        let known = catalog.sensor(&SensorKey::parse("TC0a").unwrap()).unwrap();
        assert_eq!(known.label(), "CPU a");
        assert_eq!(known.units, Some("°C"));

        let unknown = catalog.sensor(&SensorKey::parse("Zz9q").unwrap()).unwrap();
        assert!(unknown.human_name.is_none());
        assert_eq!(unknown.label(), "Zz9q");

        let all = catalog.location_keys(true);
        assert_eq!(all.len(), 3);
        let named_only = catalog.location_keys(false);
        assert_eq!(named_only, keys(&["TC0a", "TC0b"]));
    }

    #[test]
    fn rebuild_preserves_history_for_surviving_keys() {
        let mut catalog = SensorCatalog::new(8);
        let k = SensorKey::parse("TC0a").unwrap();
        catalog.rebuild(&keys(&["TC0a"]));
        catalog.set_current_value(k, 41.0);
        catalog.set_current_value(k, 42.0);

        catalog.rebuild(&keys(&["TC0a", "TC0b"]));
        let d = catalog.sensor(&k).unwrap();
        assert_eq!(d.series.ordered_snapshot(), vec![41.0, 42.0]);
        assert!(!catalog.is_stale(&keys(&["TC0a", "TC0b"])));
        assert!(catalog.is_stale(&keys(&["TC0a"])));
    }

    #[test]
    fn fans_join_speed_target_and_bounds_families() {
        let mut catalog = SensorCatalog::new(4);
        catalog.rebuild(&keys(&["F0Ac", "F0Tg", "F0Mn", "F0Mx", "F1Ac"]));
        catalog.set_current_value(SensorKey::parse("F0Ac").unwrap(), 1200.0);
        catalog.set_current_value(SensorKey::parse("F0Tg").unwrap(), 1250.0);
        catalog.set_current_value(SensorKey::parse("F0Mn").unwrap(), 600.0);
        catalog.set_current_value(SensorKey::parse("F0Mx").unwrap(), 5400.0);
        catalog.set_current_value(SensorKey::parse("F1Ac").unwrap(), 900.0);

        let fans = catalog.fans();
        assert_eq!(fans.len(), 2);
        assert_eq!(fans[0].name, "Fan 0");
        assert_eq!(fans[0].actual_speed, 1200);
        assert_eq!(fans[0].target_speed, 1250);
        assert_eq!(fans[0].minimum_speed, 600);
        assert_eq!(fans[0].maximum_speed, 5400);
        // Fan 1 has no sibling keys; bounds default to zero.
        assert_eq!(fans[1].actual_speed, 900);
        assert_eq!(fans[1].maximum_speed, 0);
    }

    #[test]
    fn disabled_sensor_stops_recording_and_reset_clears_on_reenable() {
        let mut catalog = SensorCatalog::new(4);
        let k = SensorKey::parse("TA0a").unwrap();
        catalog.rebuild(&[k]);
        catalog.set_current_value(k, 21.0);
        catalog.set_enabled(k, false);
        catalog.set_current_value(k, 22.0);
        let d = catalog.sensor(&k).unwrap();
        assert_eq!(d.series.len(), 1);
        assert_eq!(d.current_value, 22.0);

        catalog.set_enabled(k, true);
        let d = catalog.sensor(&k).unwrap();
        assert_eq!(d.series.ordered_snapshot(), vec![0.0; 4]);
    }
}
