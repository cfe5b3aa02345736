//! Battery miner: aggregates zero or more physical batteries into summed
//! charge/capacity figures and charge/discharge wattage histories.

use tracing::warn;

use crate::series::TimeSeries;
use crate::source::{BatteryReading, BatterySource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatteryStatus {
    Unknown,
    RunningOnBattery,
    Charging,
    Charged,
    OnHold,
    NoBattery,
}

pub struct BatteryMiner {
    source: Box<dyn BatterySource>,
    batteries: Vec<BatteryReading>,
    charge_watts: TimeSeries,
    discharge_watts: TimeSeries,
}

impl BatteryMiner {
    pub fn new(source: Box<dyn BatterySource>, sample_capacity: usize) -> Self {
        Self {
            source,
            batteries: Vec::new(),
            charge_watts: TimeSeries::new(sample_capacity),
            discharge_watts: TimeSeries::new(sample_capacity),
        }
    }

    pub fn graph_update(&mut self) {
        let batteries = match self.source.read() {
            Ok(b) => b,
            Err(e) => {
                warn!("battery source unavailable: {e}");
                return;
            }
        };
        self.batteries = batteries;

        let watts: f32 = self
            .batteries
            .iter()
            .map(|b| b.voltage * b.amperage)
            .sum();
        let charging = self.batteries.iter().any(|b| b.is_charging);
        if charging {
            self.charge_watts.append(watts.abs());
            self.discharge_watts.append(0.0);
        } else {
            self.charge_watts.append(0.0);
            self.discharge_watts.append(watts.abs());
        }
    }

    pub fn batteries(&self) -> &[BatteryReading] {
        &self.batteries
    }

    pub fn status(&self) -> BatteryStatus {
        if self.batteries.is_empty() {
            return BatteryStatus::NoBattery;
        }
        if self.batteries.iter().any(|b| b.is_charging) {
            return BatteryStatus::Charging;
        }
        if self.batteries.iter().all(|b| b.is_fully_charged) {
            return BatteryStatus::Charged;
        }
        if self.batteries.iter().any(|b| b.is_plugged_in) {
            // Plugged in, neither charging nor full: the charger is holding.
            return BatteryStatus::OnHold;
        }
        BatteryStatus::RunningOnBattery
    }

    /// Summed charge across all batteries, mAh.
    pub fn total_charge(&self) -> u64 {
        self.batteries.iter().map(|b| b.current_charge).sum()
    }

    /// Summed capacity across all batteries, mAh.
    pub fn total_capacity(&self) -> u64 {
        self.batteries.iter().map(|b| b.total_capacity).sum()
    }

    pub fn charge_percent(&self) -> f32 {
        let capacity = self.total_capacity();
        if capacity == 0 {
            return 0.0;
        }
        self.total_charge() as f32 / capacity as f32 * 100.0
    }

    /// Estimated minutes to full (charging) or to empty (on battery), from
    /// the summed charge figures and current draw. Zero draw means no
    /// estimate.
    pub fn minutes_remaining(&self) -> Option<u64> {
        let amps: f32 = self.batteries.iter().map(|b| b.amperage.abs()).sum();
        if amps <= f32::EPSILON || self.batteries.is_empty() {
            return None;
        }
        let m_ah = match self.status() {
            BatteryStatus::Charging => {
                self.total_capacity().saturating_sub(self.total_charge())
            }
            BatteryStatus::RunningOnBattery => self.total_charge(),
            _ => return None,
        };
        let hours = m_ah as f32 / (amps * 1000.0);
        Some((hours * 60.0) as u64)
    }

    pub fn charge_watts(&self) -> &TimeSeries {
        &self.charge_watts
    }

    pub fn discharge_watts(&self) -> &TimeSeries {
        &self.discharge_watts
    }

    pub fn set_data_size(&mut self, sample_capacity: usize) {
        self.charge_watts.resize(sample_capacity);
        self.discharge_watts.resize(sample_capacity);
    }

    pub fn reset(&mut self) {
        self.charge_watts.set_all(0.0);
        self.discharge_watts.set_all(0.0);
        self.batteries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceResult;

    struct FixedBatterySource(Vec<BatteryReading>);

    impl BatterySource for FixedBatterySource {
        fn read(&mut self) -> SourceResult<Vec<BatteryReading>> {
            Ok(self.0.clone())
        }
    }

    fn battery(charge: u64, capacity: u64, amps: f32, charging: bool) -> BatteryReading {
        BatteryReading {
            current_charge: charge,
            total_capacity: capacity,
            voltage: 12.0,
            amperage: amps,
            is_charging: charging,
            is_fully_charged: false,
            is_plugged_in: charging,
        }
    }

    #[test]
    fn no_battery_is_a_valid_state() {
        let mut miner = BatteryMiner::new(Box::new(FixedBatterySource(vec![])), 4);
        miner.graph_update();
        assert_eq!(miner.status(), BatteryStatus::NoBattery);
        assert_eq!(miner.total_capacity(), 0);
        assert_eq!(miner.charge_percent(), 0.0);
        assert!(miner.minutes_remaining().is_none());
        // The watt histories still advance so charts stay aligned.
        assert_eq!(miner.discharge_watts().len(), 1);
    }

    #[test]
    fn multiple_batteries_sum() {
        let mut miner = BatteryMiner::new(
            Box::new(FixedBatterySource(vec![
                battery(2000, 4000, 0.5, false),
                battery(1000, 4000, 0.5, false),
            ])),
            4,
        );
        miner.graph_update();
        assert_eq!(miner.total_charge(), 3000);
        assert_eq!(miner.total_capacity(), 8000);
        assert!((miner.charge_percent() - 37.5).abs() < 1e-3);
        assert_eq!(miner.status(), BatteryStatus::RunningOnBattery);
        // 3000 mAh at 1 A => 3 hours.
        assert_eq!(miner.minutes_remaining(), Some(180));
        assert!(miner.discharge_watts().current() > 0.0);
        assert_eq!(miner.charge_watts().current(), 0.0);
    }

    #[test]
    fn charging_fills_the_charge_series() {
        let mut miner = BatteryMiner::new(
            Box::new(FixedBatterySource(vec![battery(1000, 4000, 2.0, true)])),
            4,
        );
        miner.graph_update();
        assert_eq!(miner.status(), BatteryStatus::Charging);
        assert!(miner.charge_watts().current() > 0.0);
        assert_eq!(miner.discharge_watts().current(), 0.0);
        // 3000 mAh to full at 2 A => 90 minutes.
        assert_eq!(miner.minutes_remaining(), Some(90));
    }
}
