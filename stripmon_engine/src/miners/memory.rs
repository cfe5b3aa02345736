//! Memory miner: used/free histories plus paging-event rates derived from
//! cumulative VM counters.

use std::time::Instant;

use tracing::warn;

use crate::series::TimeSeries;
use crate::source::{MemoryReading, MemorySource};

use super::{counter_delta, rate_per_sec};

const MIB: u64 = 1024 * 1024;

pub struct MemoryMiner {
    source: Box<dyn MemorySource>,

    // Sizes in MiB to keep f32 samples well within precision.
    used_values: TimeSeries,
    free_values: TimeSeries,
    swap_used_values: TimeSeries,

    // Events per second.
    fault_values: TimeSeries,
    page_in_values: TimeSeries,
    page_out_values: TimeSeries,

    current: MemoryReading,
    prev: Option<(MemoryReading, Instant)>,

    recent_faults: u64,
    recent_page_ins: u64,
    recent_page_outs: u64,
}

impl MemoryMiner {
    pub fn new(source: Box<dyn MemorySource>, sample_capacity: usize) -> Self {
        Self {
            source,
            used_values: TimeSeries::new(sample_capacity),
            free_values: TimeSeries::new(sample_capacity),
            swap_used_values: TimeSeries::new(sample_capacity),
            fault_values: TimeSeries::new(sample_capacity),
            page_in_values: TimeSeries::new(sample_capacity),
            page_out_values: TimeSeries::new(sample_capacity),
            current: MemoryReading::default(),
            prev: None,
            recent_faults: 0,
            recent_page_ins: 0,
            recent_page_outs: 0,
        }
    }

    pub fn graph_update(&mut self) {
        let reading = match self.source.read() {
            Ok(r) => r,
            Err(e) => {
                warn!("memory source unavailable: {e}");
                return;
            }
        };
        let now = Instant::now();

        self.used_values.append((reading.used / MIB) as f32);
        self.free_values.append((reading.available / MIB) as f32);
        self.swap_used_values.append((reading.swap_used / MIB) as f32);

        if let Some((prev, at)) = self.prev.take() {
            let elapsed = now.duration_since(at);
            self.recent_faults = counter_delta(reading.faults, prev.faults);
            self.recent_page_ins = counter_delta(reading.page_ins, prev.page_ins);
            self.recent_page_outs = counter_delta(reading.page_outs, prev.page_outs);
            self.fault_values
                .append(rate_per_sec(self.recent_faults, elapsed));
            self.page_in_values
                .append(rate_per_sec(self.recent_page_ins, elapsed));
            self.page_out_values
                .append(rate_per_sec(self.recent_page_outs, elapsed));
        }

        self.prev = Some((reading.clone(), now));
        self.current = reading;
    }

    pub fn current(&self) -> &MemoryReading {
        &self.current
    }

    pub fn used_percent(&self) -> f32 {
        if self.current.total == 0 {
            return 0.0;
        }
        self.current.used as f32 / self.current.total as f32 * 100.0
    }

    pub fn used_values(&self) -> &TimeSeries {
        &self.used_values
    }

    pub fn free_values(&self) -> &TimeSeries {
        &self.free_values
    }

    pub fn swap_used_values(&self) -> &TimeSeries {
        &self.swap_used_values
    }

    pub fn fault_values(&self) -> &TimeSeries {
        &self.fault_values
    }

    pub fn page_in_values(&self) -> &TimeSeries {
        &self.page_in_values
    }

    pub fn page_out_values(&self) -> &TimeSeries {
        &self.page_out_values
    }

    pub fn recent_faults(&self) -> u64 {
        self.recent_faults
    }

    pub fn recent_page_ins(&self) -> u64 {
        self.recent_page_ins
    }

    pub fn recent_page_outs(&self) -> u64 {
        self.recent_page_outs
    }

    /// Cumulative since-boot totals straight from the counters.
    pub fn total_faults(&self) -> u64 {
        self.current.faults
    }

    pub fn set_data_size(&mut self, sample_capacity: usize) {
        for series in [
            &mut self.used_values,
            &mut self.free_values,
            &mut self.swap_used_values,
            &mut self.fault_values,
            &mut self.page_in_values,
            &mut self.page_out_values,
        ] {
            series.resize(sample_capacity);
        }
    }

    pub fn reset(&mut self) {
        for series in [
            &mut self.used_values,
            &mut self.free_values,
            &mut self.swap_used_values,
            &mut self.fault_values,
            &mut self.page_in_values,
            &mut self.page_out_values,
        ] {
            series.set_all(0.0);
        }
        self.prev = None;
    }
}
