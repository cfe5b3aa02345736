//! Engine assembly: one instance owns every miner and dispatches the
//! scheduler's cadence ticks to them. Settings are re-read on each tick so
//! a change (window size, interface, station, symbols) takes effect on the
//! next update without a restart.

use once_cell::sync::OnceCell;
use tracing::debug;

use crate::config::{Settings, SettingsHandle};
use crate::feeds::{StockMiner, WeatherMiner};
use crate::miners::{
    BatteryMiner, CpuMiner, DiskMiner, GpuMiner, MemoryMiner, NetMiner, TemperatureMiner,
};
use crate::schedule::Cadence;
use crate::sensors::SensorCatalog;
use crate::source::Sources;

// Runtime kill-switches (read once). Probing GPU or sensor hardware can be
// slow or noisy on some machines; these drop the whole domain.
fn gpu_enabled() -> bool {
    static ON: OnceCell<bool> = OnceCell::new();
    *ON.get_or_init(|| {
        std::env::var("STRIPMON_GPU")
            .map(|v| v != "0")
            .unwrap_or(true)
    })
}

fn temp_enabled() -> bool {
    static ON: OnceCell<bool> = OnceCell::new();
    *ON.get_or_init(|| {
        std::env::var("STRIPMON_TEMP")
            .map(|v| v != "0")
            .unwrap_or(true)
    })
}

pub struct Engine {
    settings: SettingsHandle,
    applied_capacity: usize,

    pub cpu: CpuMiner,
    pub memory: MemoryMiner,
    pub net: NetMiner,
    pub disk: DiskMiner,
    pub battery: BatteryMiner,
    pub gpu: GpuMiner,
    pub temperature: TemperatureMiner,
    pub weather: WeatherMiner,
    pub stock: StockMiner,
}

impl Engine {
    /// Assemble the miners from injected sources and a pre-built sensor
    /// catalog. The catalog is handed to the temperature miner, which owns
    /// its lifecycle (rebuild on key-set change) from here on.
    pub fn new(settings: SettingsHandle, sources: Sources, catalog: SensorCatalog) -> Self {
        let snapshot = settings
            .read()
            .map(|g| g.clone())
            .unwrap_or_default();
        let capacity = snapshot.sample_capacity();

        let mut net = NetMiner::new(sources.net, capacity);
        net.set_monitored_interface(&snapshot.network_interface);

        Self {
            cpu: CpuMiner::new(sources.cpu, capacity),
            memory: MemoryMiner::new(sources.memory, capacity),
            net,
            disk: DiskMiner::new(sources.disk, capacity),
            battery: BatteryMiner::new(sources.battery, capacity),
            gpu: GpuMiner::new(sources.gpu, capacity),
            temperature: TemperatureMiner::new(sources.sensors, catalog),
            weather: WeatherMiner::new(&snapshot.weather_station, capacity),
            stock: StockMiner::new(&snapshot.stock_symbols),
            settings,
            applied_capacity: capacity,
        }
    }

    pub fn settings(&self) -> &SettingsHandle {
        &self.settings
    }

    /// Scheduler entry point: one cadence tick. Miners are driven strictly
    /// sequentially; nothing here runs concurrently with anything else.
    pub fn update(&mut self, cadence: Cadence) {
        let Ok(snapshot) = self.settings.read().map(|g| g.clone()) else {
            return;
        };
        self.apply_settings(&snapshot);

        match cadence {
            Cadence::Fast => {
                if snapshot.modules.cpu {
                    self.cpu.fast_update();
                }
            }
            Cadence::Graph => {
                if snapshot.modules.cpu {
                    self.cpu.graph_update();
                }
                if snapshot.modules.memory {
                    self.memory.graph_update();
                }
                if snapshot.modules.network {
                    self.net.graph_update();
                }
                if snapshot.modules.disk {
                    self.disk.graph_update();
                }
                if snapshot.modules.battery {
                    self.battery.graph_update();
                }
                if snapshot.modules.gpu && gpu_enabled() {
                    self.gpu.graph_update();
                }
                if snapshot.modules.temperature && temp_enabled() {
                    self.temperature.graph_update();
                }
                if snapshot.modules.weather {
                    self.weather.graph_update();
                }
                if snapshot.modules.stock {
                    self.stock.graph_update();
                }
            }
            Cadence::Min5 => {
                if snapshot.modules.network {
                    self.net.refresh_devices();
                }
                if snapshot.modules.disk {
                    self.disk.refresh_devices();
                }
            }
            Cadence::Min30 => {
                if snapshot.modules.weather {
                    self.weather.min30_update();
                }
                if snapshot.modules.stock {
                    self.stock.min30_update();
                }
            }
        }
    }

    fn apply_settings(&mut self, snapshot: &Settings) {
        let capacity = snapshot.sample_capacity();
        if capacity != self.applied_capacity {
            debug!(capacity, "sample window changed, resizing histories");
            self.cpu.set_data_size(capacity);
            self.memory.set_data_size(capacity);
            self.net.set_data_size(capacity);
            self.disk.set_data_size(capacity);
            self.battery.set_data_size(capacity);
            self.gpu.set_data_size(capacity);
            self.temperature.set_data_size(capacity);
            self.weather.set_data_size(capacity);
            self.applied_capacity = capacity;
        }
        self.net.set_monitored_interface(&snapshot.network_interface);
        self.weather.set_station(&snapshot.weather_station);
        self.stock.set_symbols(&snapshot.stock_symbols);
    }
}
