//! Disk miner: read/write throughput summed across mounted volumes, plus
//! capacity figures for each volume. The volume list refreshes on the slow
//! cadence; I/O counters are diffed every graph tick.

use std::collections::HashMap;
use std::time::Instant;

use tracing::warn;

use crate::damping::damped_max;
use crate::series::{CombineOp, TimeSeries};
use crate::source::{DiskSource, VolumeCounters};

/// Axis floor for throughput charts (4 KiB/s).
const THROUGHPUT_FLOOR: f32 = 4096.0;

pub struct DiskMiner {
    source: Box<dyn DiskSource>,

    // Bytes per second.
    read_values: TimeSeries,
    write_values: TimeSeries,

    volumes: Vec<VolumeCounters>,
    // volume -> (read_total, write_total) at the previous successful sample.
    prev_totals: HashMap<String, (u64, u64)>,
    last_sample: Option<Instant>,

    current_read: f32,
    current_write: f32,
    peak_throughput: f32,
    total_bytes_since_launch: u64,
}

impl DiskMiner {
    pub fn new(source: Box<dyn DiskSource>, sample_capacity: usize) -> Self {
        Self {
            source,
            read_values: TimeSeries::new(sample_capacity),
            write_values: TimeSeries::new(sample_capacity),
            volumes: Vec::new(),
            prev_totals: HashMap::new(),
            last_sample: None,
            current_read: 0.0,
            current_write: 0.0,
            peak_throughput: THROUGHPUT_FLOOR,
            total_bytes_since_launch: 0,
        }
    }

    pub fn graph_update(&mut self) {
        let counters = match self.source.read() {
            Ok(c) => c,
            Err(e) => {
                warn!("disk source unavailable: {e}");
                return;
            }
        };
        let now = Instant::now();

        let mut read_delta = 0u64;
        let mut write_delta = 0u64;
        let mut next_totals = HashMap::with_capacity(counters.len());
        for c in &counters {
            if let Some((prev_r, prev_w)) = self.prev_totals.get(&c.name) {
                read_delta += c.read_bytes.saturating_sub(*prev_r);
                write_delta += c.written_bytes.saturating_sub(*prev_w);
            }
            next_totals.insert(c.name.clone(), (c.read_bytes, c.written_bytes));
        }
        self.prev_totals = next_totals;

        let (read_rate, write_rate) = match self.last_sample {
            Some(at) => {
                let dt = now.duration_since(at).as_secs_f64().max(1e-6);
                (
                    (read_delta as f64 / dt) as f32,
                    (write_delta as f64 / dt) as f32,
                )
            }
            None => (0.0, 0.0),
        };
        self.current_read = read_rate;
        self.current_write = write_rate;
        self.read_values.append(read_rate);
        self.write_values.append(write_rate);
        self.total_bytes_since_launch += read_delta + write_delta;
        self.peak_throughput = damped_max(
            self.peak_throughput,
            self.read_values.max().max(self.write_values.max()),
            THROUGHPUT_FLOOR,
        );
        self.last_sample = Some(now);
        self.volumes = counters;
    }

    /// Slow-cadence device refresh: picks up newly mounted volumes.
    pub fn refresh_devices(&mut self) {
        if let Err(e) = self.source.enumerate() {
            warn!("disk enumeration failed: {e}");
        }
    }

    pub fn volumes(&self) -> &[VolumeCounters] {
        &self.volumes
    }

    pub fn current_read(&self) -> f32 {
        self.current_read
    }

    pub fn current_write(&self) -> f32 {
        self.current_write
    }

    pub fn read_values(&self) -> &TimeSeries {
        &self.read_values
    }

    pub fn write_values(&self) -> &TimeSeries {
        &self.write_values
    }

    /// Derived combined-throughput series: read + write, element-wise.
    pub fn total_values(&self) -> TimeSeries {
        let mut total = self.read_values.clone();
        if let Err(e) = total.combine(&self.write_values, CombineOp::Add) {
            warn!("total throughput series unavailable: {e}");
        }
        total
    }

    pub fn max_throughput(&self) -> f32 {
        self.peak_throughput
    }

    pub fn total_bytes_since_launch(&self) -> u64 {
        self.total_bytes_since_launch
    }

    pub fn set_data_size(&mut self, sample_capacity: usize) {
        self.read_values.resize(sample_capacity);
        self.write_values.resize(sample_capacity);
    }

    pub fn reset(&mut self) {
        self.read_values.set_all(0.0);
        self.write_values.set_all(0.0);
        self.prev_totals.clear();
        self.last_sample = None;
        self.current_read = 0.0;
        self.current_write = 0.0;
        self.peak_throughput = THROUGHPUT_FLOOR;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::source::SourceResult;

    struct ScriptedDiskSource {
        script: Vec<SourceResult<Vec<VolumeCounters>>>,
        cursor: usize,
    }

    impl DiskSource for ScriptedDiskSource {
        fn read(&mut self) -> SourceResult<Vec<VolumeCounters>> {
            let idx = self.cursor.min(self.script.len() - 1);
            self.cursor += 1;
            match &self.script[idx] {
                Ok(r) => Ok(r.clone()),
                Err(_) => Err(EngineError::SourceUnavailable("scripted".into())),
            }
        }

        fn enumerate(&mut self) -> SourceResult<()> {
            Ok(())
        }
    }

    fn volume(name: &str, read: u64, written: u64) -> VolumeCounters {
        VolumeCounters {
            name: name.to_string(),
            total_space: 1 << 40,
            available_space: 1 << 39,
            read_bytes: read,
            written_bytes: written,
        }
    }

    #[test]
    fn throughput_sums_across_volumes() {
        let src = ScriptedDiskSource {
            script: vec![
                Ok(vec![volume("sda", 0, 0), volume("sdb", 0, 0)]),
                Ok(vec![volume("sda", 4096, 1024), volume("sdb", 1024, 1024)]),
            ],
            cursor: 0,
        };
        let mut miner = DiskMiner::new(Box::new(src), 8);
        miner.graph_update();
        miner.graph_update();
        assert_eq!(miner.total_bytes_since_launch(), 4096 + 1024 + 1024 + 1024);
        assert_eq!(miner.volumes().len(), 2);
        assert!(miner.current_read() > 0.0);
    }

    #[test]
    fn unplugged_volume_is_dropped_silently() {
        let src = ScriptedDiskSource {
            script: vec![
                Ok(vec![volume("sda", 0, 0), volume("usb0", 0, 0)]),
                Ok(vec![volume("sda", 100, 0)]),
                Ok(vec![volume("sda", 300, 0)]),
            ],
            cursor: 0,
        };
        let mut miner = DiskMiner::new(Box::new(src), 8);
        miner.graph_update();
        miner.graph_update();
        miner.graph_update();
        assert_eq!(miner.total_bytes_since_launch(), 300);
        assert_eq!(miner.volumes().len(), 1);
    }

    #[test]
    fn replaced_device_counter_reset_clamps() {
        let src = ScriptedDiskSource {
            script: vec![
                Ok(vec![volume("usb0", 50_000, 0)]),
                // Same name, fresh device: counters restart from zero.
                Ok(vec![volume("usb0", 10, 0)]),
                Ok(vec![volume("usb0", 60, 0)]),
            ],
            cursor: 0,
        };
        let mut miner = DiskMiner::new(Box::new(src), 8);
        miner.graph_update();
        miner.graph_update();
        assert_eq!(miner.current_read(), 0.0);
        miner.graph_update();
        assert_eq!(miner.total_bytes_since_launch(), 50);
    }
}
