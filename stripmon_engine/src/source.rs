//! Raw counter sources: the pull-based boundary between the miners and the
//! operating system. Every accessor can fail; a failure is transient and
//! miners keep their last good derived values across it.
//!
//! Default implementations use sysinfo (CPU usage, memory, networks, disks,
//! temperature components), /proc and /sys reads for tick counters and
//! battery state, and gfxinfo for GPU adapters.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

use sysinfo::{Components, Disks, MemoryRefreshKind, Networks, RefreshKind, System};

use crate::error::EngineError;
use crate::sensors::SensorKey;

pub type SourceResult<T> = Result<T, EngineError>;

fn unavailable(what: &str, err: impl std::fmt::Display) -> EngineError {
    EngineError::SourceUnavailable(format!("{what}: {err}"))
}

// ---------- CPU ----------

/// Cumulative scheduler tick counts for one core since boot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoreTicks {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
}

impl CoreTicks {
    pub fn total(&self) -> u64 {
        self.user
            .saturating_add(self.nice)
            .saturating_add(self.system)
            .saturating_add(self.idle)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CpuReading {
    pub per_core: Vec<CoreTicks>,
    pub load_average: f32,
    pub uptime_secs: u64,
}

pub trait CpuSource: Send {
    fn read(&mut self) -> SourceResult<CpuReading>;
}

/// Reads per-core jiffies from /proc/stat.
pub struct ProcStatCpuSource;

impl ProcStatCpuSource {
    fn parse(stat: &str) -> Vec<CoreTicks> {
        let mut cores = Vec::new();
        for line in stat.lines() {
            // Per-core lines are "cpuN user nice system idle ..."; the
            // aggregate "cpu " line is skipped.
            let Some(rest) = line.strip_prefix("cpu") else {
                break;
            };
            if rest.starts_with(char::is_whitespace) {
                continue;
            }
            let mut it = rest.split_whitespace();
            let Some(tag) = it.next() else { continue };
            if tag.parse::<usize>().is_err() {
                continue;
            }
            let mut fields = [0u64; 4];
            for f in &mut fields {
                *f = it.next().and_then(|t| t.parse().ok()).unwrap_or(0);
            }
            cores.push(CoreTicks {
                user: fields[0],
                nice: fields[1],
                system: fields[2],
                idle: fields[3],
            });
        }
        cores
    }
}

impl CpuSource for ProcStatCpuSource {
    fn read(&mut self) -> SourceResult<CpuReading> {
        let stat = fs::read_to_string("/proc/stat").map_err(|e| unavailable("/proc/stat", e))?;
        let per_core = Self::parse(&stat);
        if per_core.is_empty() {
            return Err(unavailable("/proc/stat", "no per-core cpu lines"));
        }
        Ok(CpuReading {
            per_core,
            load_average: System::load_average().one as f32,
            uptime_secs: System::uptime(),
        })
    }
}

// ---------- Memory ----------

#[derive(Debug, Clone, Default)]
pub struct MemoryReading {
    pub total: u64,
    pub available: u64,
    pub used: u64,
    pub swap_total: u64,
    pub swap_used: u64,
    // Cumulative VM event counters since boot.
    pub faults: u64,
    pub page_ins: u64,
    pub page_outs: u64,
}

pub trait MemorySource: Send {
    fn read(&mut self) -> SourceResult<MemoryReading>;
}

/// sysinfo memory sizes plus /proc/vmstat event counters where present.
pub struct SysinfoMemorySource {
    sys: System,
}

impl SysinfoMemorySource {
    pub fn new() -> Self {
        let sys = System::new_with_specifics(
            RefreshKind::nothing().with_memory(MemoryRefreshKind::everything()),
        );
        Self { sys }
    }

    fn vmstat_counters() -> (u64, u64, u64) {
        let Ok(s) = fs::read_to_string("/proc/vmstat") else {
            return (0, 0, 0);
        };
        let mut faults = 0;
        let mut page_ins = 0;
        let mut page_outs = 0;
        for line in s.lines() {
            let mut it = line.split_whitespace();
            match (it.next(), it.next().and_then(|v| v.parse::<u64>().ok())) {
                (Some("pgfault"), Some(v)) => faults = v,
                (Some("pgpgin"), Some(v)) => page_ins = v,
                (Some("pgpgout"), Some(v)) => page_outs = v,
                _ => {}
            }
        }
        (faults, page_ins, page_outs)
    }
}

impl Default for SysinfoMemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySource for SysinfoMemorySource {
    fn read(&mut self) -> SourceResult<MemoryReading> {
        self.sys.refresh_memory();
        let total = self.sys.total_memory();
        let available = self.sys.available_memory();
        let (faults, page_ins, page_outs) = Self::vmstat_counters();
        Ok(MemoryReading {
            total,
            available,
            used: total.saturating_sub(available),
            swap_total: self.sys.total_swap(),
            swap_used: self.sys.used_swap(),
            faults,
            page_ins,
            page_outs,
        })
    }
}

// ---------- Network ----------

#[derive(Debug, Clone, Default)]
pub struct InterfaceCounters {
    pub name: String,
    // Cumulative byte totals; miners diff to get rates.
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

pub trait NetSource: Send {
    /// Refresh byte counters for the known interface list.
    fn read(&mut self) -> SourceResult<Vec<InterfaceCounters>>;
    /// Re-enumerate interfaces (slow cadence); picks up newly attached
    /// devices and forgets unplugged ones.
    fn enumerate(&mut self) -> SourceResult<()>;
}

pub struct SysinfoNetSource {
    networks: Networks,
}

impl SysinfoNetSource {
    pub fn new() -> Self {
        Self {
            networks: Networks::new_with_refreshed_list(),
        }
    }
}

impl Default for SysinfoNetSource {
    fn default() -> Self {
        Self::new()
    }
}

impl NetSource for SysinfoNetSource {
    fn read(&mut self) -> SourceResult<Vec<InterfaceCounters>> {
        self.networks.refresh(false);
        Ok(self
            .networks
            .iter()
            .map(|(name, data)| InterfaceCounters {
                name: name.to_string(),
                rx_bytes: data.total_received(),
                tx_bytes: data.total_transmitted(),
            })
            .collect())
    }

    fn enumerate(&mut self) -> SourceResult<()> {
        self.networks.refresh(true);
        Ok(())
    }
}

// ---------- Disk ----------

#[derive(Debug, Clone, Default)]
pub struct VolumeCounters {
    pub name: String,
    pub total_space: u64,
    pub available_space: u64,
    // Cumulative I/O byte totals.
    pub read_bytes: u64,
    pub written_bytes: u64,
}

pub trait DiskSource: Send {
    fn read(&mut self) -> SourceResult<Vec<VolumeCounters>>;
    fn enumerate(&mut self) -> SourceResult<()>;
}

pub struct SysinfoDiskSource {
    disks: Disks,
}

impl SysinfoDiskSource {
    pub fn new() -> Self {
        Self {
            disks: Disks::new_with_refreshed_list(),
        }
    }
}

impl Default for SysinfoDiskSource {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskSource for SysinfoDiskSource {
    fn read(&mut self) -> SourceResult<Vec<VolumeCounters>> {
        self.disks.refresh(false);
        Ok(self
            .disks
            .iter()
            .map(|d| {
                let usage = d.usage();
                VolumeCounters {
                    name: d.name().to_string_lossy().into_owned(),
                    total_space: d.total_space(),
                    available_space: d.available_space(),
                    read_bytes: usage.total_read_bytes,
                    written_bytes: usage.total_written_bytes,
                }
            })
            .collect())
    }

    fn enumerate(&mut self) -> SourceResult<()> {
        self.disks.refresh(true);
        Ok(())
    }
}

// ---------- Battery ----------

#[derive(Debug, Clone, Default)]
pub struct BatteryReading {
    /// Charge now, in mAh.
    pub current_charge: u64,
    /// Design-full charge, in mAh.
    pub total_capacity: u64,
    pub voltage: f32,
    pub amperage: f32,
    pub is_charging: bool,
    pub is_fully_charged: bool,
    pub is_plugged_in: bool,
}

impl BatteryReading {
    pub fn percent_charged(&self) -> f32 {
        if self.total_capacity == 0 {
            return 0.0;
        }
        (self.current_charge as f32 / self.total_capacity as f32) * 100.0
    }
}

pub trait BatterySource: Send {
    /// A machine with no battery returns an empty list.
    fn read(&mut self) -> SourceResult<Vec<BatteryReading>>;
}

/// Linux sysfs power-supply interface. Scans /sys/class/power_supply for
/// BAT* entries; absent entries mean a battery-less machine, not an error.
pub struct SysfsBatterySource {
    base: std::path::PathBuf,
}

impl SysfsBatterySource {
    pub fn new() -> Self {
        Self {
            base: "/sys/class/power_supply".into(),
        }
    }

    #[cfg(test)]
    pub fn with_base(base: impl Into<std::path::PathBuf>) -> Self {
        Self { base: base.into() }
    }

    fn read_u64(dir: &Path, file: &str) -> Option<u64> {
        fs::read_to_string(dir.join(file))
            .ok()?
            .trim()
            .parse()
            .ok()
    }

    fn read_battery(dir: &Path) -> Option<BatteryReading> {
        let status = fs::read_to_string(dir.join("status")).ok()?;
        let status = status.trim();
        // charge_* in µAh, energy_* in µWh; either family may be present.
        let (charge, full) = match (
            Self::read_u64(dir, "charge_now"),
            Self::read_u64(dir, "charge_full"),
        ) {
            (Some(now), Some(full)) => (now / 1000, full / 1000),
            _ => (
                Self::read_u64(dir, "energy_now").unwrap_or(0) / 1000,
                Self::read_u64(dir, "energy_full").unwrap_or(0) / 1000,
            ),
        };
        let voltage = Self::read_u64(dir, "voltage_now").unwrap_or(0) as f32 / 1_000_000.0;
        let amperage = Self::read_u64(dir, "current_now").unwrap_or(0) as f32 / 1_000_000.0;
        Some(BatteryReading {
            current_charge: charge,
            total_capacity: full,
            voltage,
            amperage,
            is_charging: status == "Charging",
            is_fully_charged: status == "Full",
            is_plugged_in: matches!(status, "Charging" | "Full" | "Not charging"),
        })
    }
}

impl Default for SysfsBatterySource {
    fn default() -> Self {
        Self::new()
    }
}

impl BatterySource for SysfsBatterySource {
    fn read(&mut self) -> SourceResult<Vec<BatteryReading>> {
        let entries = match fs::read_dir(&self.base) {
            Ok(e) => e,
            // No power-supply class at all: a valid battery-less state.
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(unavailable("power_supply", e)),
        };
        let mut out = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name();
            if !name.to_string_lossy().starts_with("BAT") {
                continue;
            }
            if let Some(reading) = Self::read_battery(&entry.path()) {
                out.push(reading);
            }
        }
        Ok(out)
    }
}

// ---------- GPU ----------

#[derive(Debug, Clone, Default)]
pub struct GpuReading {
    pub name: String,
    pub utilization_pct: u32,
    pub used_vram: u64,
    pub total_vram: u64,
}

pub trait GpuSource: Send {
    /// A machine with no usable adapter returns an empty list.
    fn read(&mut self) -> SourceResult<Vec<GpuReading>>;
}

pub struct GfxinfoGpuSource;

impl GpuSource for GfxinfoGpuSource {
    fn read(&mut self) -> SourceResult<Vec<GpuReading>> {
        let gpu = gfxinfo::active_gpu().map_err(|e| unavailable("gpu", e))?;
        let info = gpu.info();
        Ok(vec![GpuReading {
            name: gpu.model().to_string(),
            utilization_pct: info.load_pct() as u32,
            used_vram: info.used_vram(),
            total_vram: info.total_vram(),
        }])
    }
}

// ---------- Sensors ----------

/// One snapshot of the flat vendor sensor namespace: key -> raw value.
#[derive(Debug, Clone, Default)]
pub struct SensorSnapshot {
    pub values: Vec<(SensorKey, f32)>,
}

pub trait SensorSource: Send {
    fn read(&mut self) -> SourceResult<SensorSnapshot>;
}

/// Maps sysinfo temperature components onto the fixed-width key namespace.
///
/// Component ordering is stable within a boot, so the i-th component gets
/// the wildcard slot 'a' + i. CPU-ish labels land in the TC group, the rest
/// in the TA (ambient/auxiliary) group.
pub struct ComponentSensorSource {
    components: Components,
}

impl ComponentSensorSource {
    pub fn new() -> Self {
        Self {
            components: Components::new_with_refreshed_list(),
        }
    }

    fn is_cpu_label(label: &str) -> bool {
        let l = label.to_ascii_lowercase();
        l.contains("cpu") || l.contains("core") || l.contains("package") || l.contains("tctl") || l.contains("tdie")
    }
}

impl Default for ComponentSensorSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorSource for ComponentSensorSource {
    fn read(&mut self) -> SourceResult<SensorSnapshot> {
        self.components.refresh(false);
        let mut cpu_slot = 0u8;
        let mut aux_slot = 0u8;
        let mut values = Vec::new();
        for c in self.components.iter() {
            let Some(temp) = c.temperature() else { continue };
            let (prefix, slot) = if Self::is_cpu_label(c.label()) {
                let s = cpu_slot;
                cpu_slot += 1;
                (*b"TC0", s)
            } else {
                let s = aux_slot;
                aux_slot += 1;
                (*b"TA0", s)
            };
            if slot >= 26 {
                continue;
            }
            let key = SensorKey::from_bytes([prefix[0], prefix[1], prefix[2], b'a' + slot]);
            values.push((key, temp));
        }
        Ok(SensorSnapshot { values })
    }
}

// ---------- Assembly ----------

/// The full set of raw sources a default engine is assembled from.
/// Dependency-injected so tests can swap in scripted fakes.
pub struct Sources {
    pub cpu: Box<dyn CpuSource>,
    pub memory: Box<dyn MemorySource>,
    pub net: Box<dyn NetSource>,
    pub disk: Box<dyn DiskSource>,
    pub battery: Box<dyn BatterySource>,
    pub gpu: Box<dyn GpuSource>,
    pub sensors: Box<dyn SensorSource>,
}

impl Sources {
    /// Live sources for the running machine.
    pub fn detect() -> Self {
        Self {
            cpu: Box::new(ProcStatCpuSource),
            memory: Box::new(SysinfoMemorySource::new()),
            net: Box::new(SysinfoNetSource::new()),
            disk: Box::new(SysinfoDiskSource::new()),
            battery: Box::new(SysfsBatterySource::new()),
            gpu: Box::new(GfxinfoGpuSource),
            sensors: Box::new(ComponentSensorSource::new()),
        }
    }
}

// Scripted sources used by unit and integration tests.
#[doc(hidden)]
pub mod testing {
    use super::*;

    /// Plays back a fixed script of readings; `Err` entries simulate a
    /// transiently unavailable source. The last entry repeats.
    pub struct ScriptedCpuSource {
        pub script: Vec<SourceResult<CpuReading>>,
        pub cursor: usize,
    }

    impl ScriptedCpuSource {
        pub fn new(script: Vec<SourceResult<CpuReading>>) -> Self {
            Self { script, cursor: 0 }
        }
    }

    impl CpuSource for ScriptedCpuSource {
        fn read(&mut self) -> SourceResult<CpuReading> {
            let idx = self.cursor.min(self.script.len().saturating_sub(1));
            self.cursor += 1;
            match &self.script[idx] {
                Ok(r) => Ok(r.clone()),
                Err(EngineError::SourceUnavailable(s)) => {
                    Err(EngineError::SourceUnavailable(s.clone()))
                }
                Err(_) => Err(EngineError::SourceUnavailable("scripted".into())),
            }
        }
    }

    pub struct ScriptedNetSource {
        pub script: Vec<SourceResult<Vec<InterfaceCounters>>>,
        pub cursor: usize,
    }

    impl ScriptedNetSource {
        pub fn new(script: Vec<SourceResult<Vec<InterfaceCounters>>>) -> Self {
            Self { script, cursor: 0 }
        }
    }

    impl NetSource for ScriptedNetSource {
        fn read(&mut self) -> SourceResult<Vec<InterfaceCounters>> {
            let idx = self.cursor.min(self.script.len().saturating_sub(1));
            self.cursor += 1;
            match &self.script[idx] {
                Ok(r) => Ok(r.clone()),
                Err(EngineError::SourceUnavailable(s)) => {
                    Err(EngineError::SourceUnavailable(s.clone()))
                }
                Err(_) => Err(EngineError::SourceUnavailable("scripted".into())),
            }
        }

        fn enumerate(&mut self) -> SourceResult<()> {
            Ok(())
        }
    }

    /// Fixed sensor namespace with mutable values.
    pub struct FixedSensorSource {
        pub values: HashMap<SensorKey, f32>,
    }

    impl SensorSource for FixedSensorSource {
        fn read(&mut self) -> SourceResult<SensorSnapshot> {
            let mut values: Vec<(SensorKey, f32)> =
                self.values.iter().map(|(k, v)| (*k, *v)).collect();
            values.sort_by_key(|(k, _)| *k);
            Ok(SensorSnapshot { values })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proc_stat_parser_reads_per_core_lines() {
        let stat = "cpu  100 2 30 400 5 6 7 8 0 0\n\
                    cpu0 50 1 15 200 2 3 4 4 0 0\n\
                    cpu1 50 1 15 200 3 3 3 4 0 0\n\
                    intr 12345\n";
        let cores = ProcStatCpuSource::parse(stat);
        assert_eq!(cores.len(), 2);
        assert_eq!(cores[0].user, 50);
        assert_eq!(cores[0].system, 15);
        assert_eq!(cores[1].idle, 200);
        assert_eq!(cores[0].total(), 50 + 1 + 15 + 200);
    }

    #[test]
    fn sysfs_battery_source_reads_bat_entries() {
        let td = tempfile::tempdir().unwrap();
        let bat = td.path().join("BAT0");
        fs::create_dir_all(&bat).unwrap();
        fs::write(bat.join("status"), "Charging\n").unwrap();
        fs::write(bat.join("charge_now"), "2500000\n").unwrap();
        fs::write(bat.join("charge_full"), "5000000\n").unwrap();
        fs::write(bat.join("voltage_now"), "12000000\n").unwrap();
        fs::write(bat.join("current_now"), "1500000\n").unwrap();

        let mut src = SysfsBatterySource::with_base(td.path());
        let batteries = src.read().unwrap();
        assert_eq!(batteries.len(), 1);
        let b = &batteries[0];
        assert_eq!(b.current_charge, 2500);
        assert_eq!(b.total_capacity, 5000);
        assert!(b.is_charging);
        assert!(b.is_plugged_in);
        assert!((b.percent_charged() - 50.0).abs() < 1e-3);
        assert!((b.voltage - 12.0).abs() < 1e-3);
    }

    #[test]
    fn missing_power_supply_dir_is_an_empty_battery_set() {
        let mut src = SysfsBatterySource::with_base("/definitely/not/here");
        assert!(src.read().unwrap().is_empty());
    }
}
