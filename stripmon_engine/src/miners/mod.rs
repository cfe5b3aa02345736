//! Resource miners: one per domain, each owning its TimeSeries and the
//! previous raw counter baselines needed to turn cumulative readings into
//! per-tick rates.

pub mod battery;
pub mod cpu;
pub mod disk;
pub mod gpu;
pub mod memory;
pub mod net;
pub mod temperature;

pub use battery::{BatteryMiner, BatteryStatus};
pub use cpu::CpuMiner;
pub use disk::DiskMiner;
pub use gpu::GpuMiner;
pub use memory::MemoryMiner;
pub use net::NetMiner;
pub use temperature::TemperatureMiner;

use std::time::Duration;

/// Delta between cumulative counter readings. A reading below the previous
/// baseline means the counter reset (device replaced, driver reloaded); the
/// delta clamps to zero for that tick and the caller re-baselines.
pub(crate) fn counter_delta(current: u64, previous: u64) -> u64 {
    current.saturating_sub(previous)
}

/// Convert a counter delta into a per-second rate over the measured wall
/// clock elapsed since the previous successful sample. Timer cadences
/// drift under load, so the nominal period is never assumed.
pub(crate) fn rate_per_sec(delta: u64, elapsed: Duration) -> f32 {
    delta as f32 / (elapsed.as_secs_f32().max(1e-6))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_uses_measured_elapsed_time() {
        let rate = rate_per_sec(counter_delta(1500, 1000), Duration::from_millis(500));
        assert!((rate - 1000.0).abs() < 1e-3);
    }

    #[test]
    fn rollback_clamps_to_zero() {
        assert_eq!(counter_delta(900, 1000), 0);
        // Next tick diffs against the rolled-back baseline.
        assert_eq!(counter_delta(950, 900), 50);
    }
}
