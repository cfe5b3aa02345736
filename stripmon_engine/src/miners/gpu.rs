//! GPU miner: per-adapter VRAM and utilization histories. Zero adapters is
//! a fully supported state; the series lists are simply empty.

use tracing::{debug, warn};

use crate::series::TimeSeries;
use crate::source::{GpuReading, GpuSource};

const MIB: u64 = 1024 * 1024;

pub struct GpuMiner {
    source: Box<dyn GpuSource>,
    sample_capacity: usize,

    adapters: Vec<GpuReading>,
    // Per adapter, MiB.
    total_vram: Vec<TimeSeries>,
    free_vram: Vec<TimeSeries>,
    // Per adapter, percent.
    utilization: Vec<TimeSeries>,

    // Only the first failure is worth a warning; probing a machine without
    // an adapter fails on every tick.
    unavailable_logged: bool,
}

impl GpuMiner {
    pub fn new(source: Box<dyn GpuSource>, sample_capacity: usize) -> Self {
        Self {
            source,
            sample_capacity,
            adapters: Vec::new(),
            total_vram: Vec::new(),
            free_vram: Vec::new(),
            utilization: Vec::new(),
            unavailable_logged: false,
        }
    }

    pub fn graph_update(&mut self) {
        let adapters = match self.source.read() {
            Ok(a) => a,
            Err(e) => {
                if !self.unavailable_logged {
                    warn!("gpu source unavailable: {e}");
                    self.unavailable_logged = true;
                } else {
                    debug!("gpu source unavailable: {e}");
                }
                return;
            }
        };
        self.unavailable_logged = false;
        self.ensure_adapters(adapters.len());

        for (i, gpu) in adapters.iter().enumerate() {
            self.total_vram[i].append((gpu.total_vram / MIB) as f32);
            self.free_vram[i].append((gpu.total_vram.saturating_sub(gpu.used_vram) / MIB) as f32);
            self.utilization[i].append(gpu.utilization_pct.min(100) as f32);
        }
        self.adapters = adapters;
    }

    pub fn number_of_gpus(&self) -> usize {
        self.adapters.len()
    }

    pub fn adapters(&self) -> &[GpuReading] {
        &self.adapters
    }

    pub fn total_vram_history(&self, adapter: usize) -> Option<&TimeSeries> {
        self.total_vram.get(adapter)
    }

    pub fn free_vram_history(&self, adapter: usize) -> Option<&TimeSeries> {
        self.free_vram.get(adapter)
    }

    pub fn utilization_history(&self, adapter: usize) -> Option<&TimeSeries> {
        self.utilization.get(adapter)
    }

    pub fn set_data_size(&mut self, sample_capacity: usize) {
        self.sample_capacity = sample_capacity;
        for series in self
            .total_vram
            .iter_mut()
            .chain(self.free_vram.iter_mut())
            .chain(self.utilization.iter_mut())
        {
            series.resize(sample_capacity);
        }
    }

    fn ensure_adapters(&mut self, n: usize) {
        if self.total_vram.len() == n {
            return;
        }
        debug!(adapters = n, "gpu adapter count changed, rebuilding histories");
        let cap = self.sample_capacity;
        let make = || (0..n).map(|_| TimeSeries::new(cap)).collect();
        self.total_vram = make();
        self.free_vram = make();
        self.utilization = make();
    }
}
