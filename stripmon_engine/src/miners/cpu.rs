//! CPU miner: per-core usage histories from cumulative tick counters, a
//! sub-second fast aggregate, damped load average, and uptime.

use tracing::{debug, warn};

use crate::damping::damped_value;
use crate::series::{CombineOp, TimeSeries};
use crate::source::{CoreTicks, CpuReading, CpuSource};

/// Capacity of the fast aggregate ring; sized for roughly a graph tick's
/// worth of sub-second samples.
const FAST_SAMPLES: usize = 8;

pub struct CpuMiner {
    source: Box<dyn CpuSource>,
    sample_capacity: usize,

    // Per-core histories, percentages 0..100.
    user: Vec<TimeSeries>,
    system: Vec<TimeSeries>,
    nice: Vec<TimeSeries>,
    total: Vec<TimeSeries>,
    immediate_total: Vec<f32>,

    // Lightweight aggregate sampled at the fast cadence.
    fast_values: TimeSeries,

    prev_graph: Option<Vec<CoreTicks>>,
    prev_fast: Option<Vec<CoreTicks>>,

    load_average: f32,
    uptime_secs: u64,
}

impl CpuMiner {
    pub fn new(source: Box<dyn CpuSource>, sample_capacity: usize) -> Self {
        Self {
            source,
            sample_capacity,
            user: Vec::new(),
            system: Vec::new(),
            nice: Vec::new(),
            total: Vec::new(),
            immediate_total: Vec::new(),
            fast_values: TimeSeries::new(FAST_SAMPLES),
            prev_graph: None,
            prev_fast: None,
            load_average: 0.0,
            uptime_secs: 0,
        }
    }

    pub fn number_of_cpus(&self) -> usize {
        self.total.len()
    }

    pub fn load_average(&self) -> f32 {
        self.load_average
    }

    pub fn uptime_secs(&self) -> u64 {
        self.uptime_secs
    }

    /// Current total usage of one core, percent.
    pub fn current_total_usage(&self, core: usize) -> f32 {
        self.immediate_total.get(core).copied().unwrap_or(0.0)
    }

    pub fn fast_values(&self) -> &TimeSeries {
        &self.fast_values
    }

    pub fn user_history(&self, core: usize) -> Option<&TimeSeries> {
        self.user.get(core)
    }

    pub fn system_history(&self, core: usize) -> Option<&TimeSeries> {
        self.system.get(core)
    }

    pub fn nice_history(&self, core: usize) -> Option<&TimeSeries> {
        self.nice.get(core)
    }

    pub fn total_history(&self, core: usize) -> Option<&TimeSeries> {
        self.total.get(core)
    }

    /// Averaged machine-wide usage history: per-core totals summed and
    /// divided by the core count.
    pub fn combined_usage(&self) -> Option<TimeSeries> {
        let mut iter = self.total.iter();
        let mut combined = iter.next()?.clone();
        for series in iter {
            if combined.combine(series, CombineOp::Add).is_err() {
                return None;
            }
        }
        combined.scale(self.total.len() as f32);
        Some(combined)
    }

    /// Graph-cadence update: per-core histories, load average, uptime.
    pub fn graph_update(&mut self) {
        let reading = match self.source.read() {
            Ok(r) => r,
            Err(e) => {
                warn!("cpu source unavailable: {e}");
                return;
            }
        };
        let n = reading.per_core.len();
        if self.ensure_cores(n) {
            // Topology changed; re-baseline and sample next tick.
            self.prev_graph = Some(reading.per_core);
            self.record_load(&reading.load_average, reading.uptime_secs);
            return;
        }

        if let Some(prev) = self.prev_graph.take() {
            for (core, (cur, old)) in reading.per_core.iter().zip(prev.iter()).enumerate() {
                let (user, system, nice, total) = usage_percentages(cur, old);
                self.user[core].append(user);
                self.system[core].append(system);
                self.nice[core].append(nice);
                self.total[core].append(total);
                self.immediate_total[core] = total;
            }
        }
        self.prev_graph = Some(reading.per_core);
        self.record_load(&reading.load_average, reading.uptime_secs);
    }

    /// Fast-cadence update: one aggregate busy percentage across all cores.
    pub fn fast_update(&mut self) {
        let reading = match self.source.read() {
            Ok(r) => r,
            Err(e) => {
                warn!("cpu source unavailable: {e}");
                return;
            }
        };
        if let Some(prev) = self.prev_fast.take() {
            if prev.len() == reading.per_core.len() {
                let mut busy = 0u64;
                let mut total = 0u64;
                for (cur, old) in reading.per_core.iter().zip(prev.iter()) {
                    let (b, t) = busy_delta(cur, old);
                    busy += b;
                    total += t;
                }
                if total > 0 {
                    self.fast_values
                        .append((busy as f32 / total as f32 * 100.0).clamp(0.0, 100.0));
                }
            }
        }
        self.prev_fast = Some(reading.per_core);
    }

    pub fn set_data_size(&mut self, sample_capacity: usize) {
        self.sample_capacity = sample_capacity;
        for series in self
            .user
            .iter_mut()
            .chain(self.system.iter_mut())
            .chain(self.nice.iter_mut())
            .chain(self.total.iter_mut())
        {
            series.resize(sample_capacity);
        }
    }

    pub fn reset(&mut self) {
        for series in self
            .user
            .iter_mut()
            .chain(self.system.iter_mut())
            .chain(self.nice.iter_mut())
            .chain(self.total.iter_mut())
        {
            series.set_all(0.0);
        }
        self.fast_values.set_all(0.0);
        self.prev_graph = None;
        self.prev_fast = None;
    }

    fn record_load(&mut self, load: &f32, uptime: u64) {
        self.load_average = damped_value(self.load_average, *load);
        self.uptime_secs = uptime;
    }

    /// Returns true when the core count changed and histories were rebuilt.
    fn ensure_cores(&mut self, n: usize) -> bool {
        if self.total.len() == n {
            return false;
        }
        debug!(cores = n, "cpu topology changed, rebuilding histories");
        let cap = self.sample_capacity;
        let make = || (0..n).map(|_| TimeSeries::new(cap)).collect();
        self.user = make();
        self.system = make();
        self.nice = make();
        self.total = make();
        self.immediate_total = vec![0.0; n];
        self.prev_graph = None;
        self.prev_fast = None;
        true
    }
}

fn usage_percentages(cur: &CoreTicks, old: &CoreTicks) -> (f32, f32, f32, f32) {
    let d_user = cur.user.saturating_sub(old.user);
    let d_nice = cur.nice.saturating_sub(old.nice);
    let d_system = cur.system.saturating_sub(old.system);
    let d_idle = cur.idle.saturating_sub(old.idle);
    let d_total = d_user + d_nice + d_system + d_idle;
    if d_total == 0 {
        return (0.0, 0.0, 0.0, 0.0);
    }
    let pct = |d: u64| (d as f32 / d_total as f32 * 100.0).clamp(0.0, 100.0);
    let user = pct(d_user);
    let system = pct(d_system);
    let nice = pct(d_nice);
    (user, system, nice, (user + system + nice).clamp(0.0, 100.0))
}

fn busy_delta(cur: &CoreTicks, old: &CoreTicks) -> (u64, u64) {
    let d_user = cur.user.saturating_sub(old.user);
    let d_nice = cur.nice.saturating_sub(old.nice);
    let d_system = cur.system.saturating_sub(old.system);
    let d_idle = cur.idle.saturating_sub(old.idle);
    let busy = d_user + d_nice + d_system;
    (busy, busy + d_idle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::source::testing::ScriptedCpuSource;

    fn ticks(user: u64, system: u64, idle: u64) -> CoreTicks {
        CoreTicks {
            user,
            nice: 0,
            system,
            idle,
        }
    }

    fn reading(cores: Vec<CoreTicks>) -> CpuReading {
        CpuReading {
            per_core: cores,
            load_average: 1.0,
            uptime_secs: 100,
        }
    }

    #[test]
    fn per_core_usage_from_tick_deltas() {
        let script = vec![
            Ok(reading(vec![ticks(100, 50, 850), ticks(0, 0, 1000)])),
            // Core 0: +50 user, +25 system, +25 idle => 75% busy.
            Ok(reading(vec![ticks(150, 75, 875), ticks(0, 0, 1100)])),
        ];
        let mut miner = CpuMiner::new(Box::new(ScriptedCpuSource::new(script)), 16);
        miner.graph_update();
        miner.graph_update();

        assert_eq!(miner.number_of_cpus(), 2);
        assert!((miner.current_total_usage(0) - 75.0).abs() < 1e-3);
        assert_eq!(miner.current_total_usage(1), 0.0);
        assert_eq!(miner.total_history(0).unwrap().len(), 1);
    }

    #[test]
    fn counter_rollback_yields_zero_not_negative() {
        let script = vec![
            Ok(reading(vec![ticks(1000, 0, 1000)])),
            // Counter reset: everything below the baseline.
            Ok(reading(vec![ticks(10, 0, 10)])),
            Ok(reading(vec![ticks(60, 0, 60)])),
        ];
        let mut miner = CpuMiner::new(Box::new(ScriptedCpuSource::new(script)), 8);
        miner.graph_update();
        miner.graph_update();
        assert_eq!(miner.current_total_usage(0), 0.0);
        // Delta computed against the rolled-back baseline.
        miner.graph_update();
        assert!((miner.current_total_usage(0) - 50.0).abs() < 1e-3);
    }

    #[test]
    fn outage_retains_last_value_and_recovers_cleanly() {
        let unavailable = || Err(EngineError::SourceUnavailable("busy".into()));
        let script = vec![
            Ok(reading(vec![ticks(100, 0, 900)])),
            Ok(reading(vec![ticks(150, 0, 950)])),
            unavailable(),
            unavailable(),
            unavailable(),
            Ok(reading(vec![ticks(300, 0, 1100)])),
        ];
        let mut miner = CpuMiner::new(Box::new(ScriptedCpuSource::new(script)), 8);
        miner.graph_update();
        miner.graph_update();
        let before = miner.current_total_usage(0);
        assert!((before - 50.0).abs() < 1e-3);

        for _ in 0..3 {
            miner.graph_update();
            assert_eq!(miner.current_total_usage(0), before, "outage keeps last value");
        }
        assert_eq!(miner.total_history(0).unwrap().len(), 1);

        // Recovery: delta spans the outage (150 busy of 300 elapsed ticks),
        // a sane average rather than a spike.
        miner.graph_update();
        assert!((miner.current_total_usage(0) - 50.0).abs() < 1e-3);
        assert_eq!(miner.total_history(0).unwrap().len(), 2);
    }

    #[test]
    fn combined_usage_averages_cores() {
        let script = vec![
            Ok(reading(vec![ticks(0, 0, 0), ticks(0, 0, 0)])),
            Ok(reading(vec![ticks(100, 0, 0), ticks(0, 0, 100)])),
        ];
        let mut miner = CpuMiner::new(Box::new(ScriptedCpuSource::new(script)), 4);
        miner.graph_update();
        miner.graph_update();
        let combined = miner.combined_usage().unwrap();
        // Core 0 at 100%, core 1 at 0% => machine average 50%.
        assert!((combined.current() - 50.0).abs() < 1e-3);
    }

    #[test]
    fn topology_change_rebuilds_histories() {
        let script = vec![
            Ok(reading(vec![ticks(0, 0, 100)])),
            Ok(reading(vec![ticks(10, 0, 190)])),
            Ok(reading(vec![ticks(0, 0, 0), ticks(0, 0, 0)])),
            Ok(reading(vec![ticks(50, 0, 50), ticks(0, 0, 100)])),
        ];
        let mut miner = CpuMiner::new(Box::new(ScriptedCpuSource::new(script)), 4);
        miner.graph_update();
        miner.graph_update();
        assert_eq!(miner.number_of_cpus(), 1);
        miner.graph_update();
        assert_eq!(miner.number_of_cpus(), 2);
        assert_eq!(miner.total_history(0).unwrap().len(), 0);
        miner.graph_update();
        assert_eq!(miner.total_history(0).unwrap().len(), 1);
    }
}
