//! Entry point for the stripmon frontend. Parses args, assembles the
//! engine, and either runs the scheduler until interrupted or takes a
//! single sample sweep and prints a report.

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use stripmon_engine::config;
use stripmon_engine::miners::BatteryStatus;
use stripmon_engine::sensors::SensorCatalog;
use stripmon_engine::source::Sources;
use stripmon_engine::{Engine, Scheduler};

#[derive(Debug)]
struct ParsedArgs {
    config: Option<String>,
    interval: Option<f64>,
    once: bool,
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<ParsedArgs, String> {
    let mut it = args.into_iter();
    let prog = it.next().unwrap_or_else(|| "stripmon".into());
    let mut config: Option<String> = None;
    let mut interval: Option<f64> = None;
    let mut once = false;

    let usage =
        || format!("Usage: {prog} [--config PATH|-c PATH] [--interval SECS|-i SECS] [--once]");

    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                return Err(usage());
            }
            "--config" | "-c" => {
                config = it.next();
            }
            "--interval" | "-i" => match it.next().and_then(|v| v.parse().ok()) {
                Some(v) if v > 0.0 => interval = Some(v),
                _ => return Err(format!("--interval needs a positive number\n{}", usage())),
            },
            "--once" => {
                once = true;
            }
            _ if arg.starts_with("--config=") => {
                if let Some((_, v)) = arg.split_once('=') {
                    if !v.is_empty() {
                        config = Some(v.to_string());
                    }
                }
            }
            _ if arg.starts_with("--interval=") => {
                match arg.split_once('=').and_then(|(_, v)| v.parse().ok()) {
                    Some(v) if v > 0.0 => interval = Some(v),
                    _ => return Err(format!("--interval needs a positive number\n{}", usage())),
                }
            }
            _ => {
                return Err(format!("Unexpected argument '{arg}'.\n{}", usage()));
            }
        }
    }
    Ok(ParsedArgs {
        config,
        interval,
        once,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let parsed = match parse_args(std::env::args()) {
        Ok(v) => v,
        Err(msg) => {
            eprintln!("{msg}");
            return Ok(());
        }
    };

    let mut settings = match parsed.config.as_deref() {
        Some(path) => config::load_settings_from(std::path::Path::new(path)),
        None => config::load_settings(),
    };
    if let Some(interval) = parsed.interval {
        settings.refresh_interval_secs = interval;
    }

    let capacity = settings.sample_capacity();
    let settings = config::shared(settings);
    let engine = Engine::new(settings, Sources::detect(), SensorCatalog::new(capacity));
    let mut scheduler = Scheduler::new(engine);

    if parsed.once {
        scheduler.run_once();
        // Second sample so rate-derived values have a baseline to diff.
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        scheduler.engine_mut().update(stripmon_engine::Cadence::Graph);
        print_report(scheduler.engine());
        return Ok(());
    }

    tokio::select! {
        _ = scheduler.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, shutting down");
        }
    }
    Ok(())
}

fn print_report(engine: &Engine) {
    let cores = engine.cpu.number_of_cpus();
    let usage: f32 = (0..cores).map(|c| engine.cpu.current_total_usage(c)).sum::<f32>()
        / cores.max(1) as f32;
    println!(
        "cpu: {cores} cores, {usage:.1}% used, load {:.2}, up {}",
        engine.cpu.load_average(),
        format_uptime(engine.cpu.uptime_secs())
    );

    let mem = engine.memory.current();
    println!(
        "memory: {} / {} used ({:.1}%), swap {} / {}",
        format_bytes(mem.used as f64),
        format_bytes(mem.total as f64),
        engine.memory.used_percent(),
        format_bytes(mem.swap_used as f64),
        format_bytes(mem.swap_total as f64),
    );

    println!(
        "network ({}): rx {}/s, tx {}/s, total since launch {}",
        engine.net.monitored_interface(),
        format_bytes(engine.net.current_rx() as f64),
        format_bytes(engine.net.current_tx() as f64),
        format_bytes(engine.net.total_bytes_since_launch() as f64),
    );

    println!(
        "disk: read {}/s, write {}/s across {} volume(s)",
        format_bytes(engine.disk.current_read() as f64),
        format_bytes(engine.disk.current_write() as f64),
        engine.disk.volumes().len(),
    );

    match engine.battery.status() {
        BatteryStatus::NoBattery => println!("battery: none"),
        status => println!(
            "battery: {:?}, {:.0}% ({} of {} mAh)",
            status,
            engine.battery.charge_percent(),
            engine.battery.total_charge(),
            engine.battery.total_capacity(),
        ),
    }

    if engine.gpu.number_of_gpus() == 0 {
        println!("gpu: none");
    }
    for (i, gpu) in engine.gpu.adapters().iter().enumerate() {
        println!(
            "gpu {i}: {} {}% busy, vram {} / {}",
            gpu.name,
            gpu.utilization_pct,
            format_bytes(gpu.used_vram as f64),
            format_bytes(gpu.total_vram as f64),
        );
    }

    for key in engine.temperature.location_keys(true) {
        if let Some(sensor) = engine.temperature.sensor_for_location(&key) {
            println!(
                "sensor {}: {:.1} {}",
                sensor.label(),
                sensor.current_value,
                sensor.units.unwrap_or(""),
            );
        }
    }
    for fan in engine.temperature.fans() {
        println!("{}: {} rpm (target {})", fan.name, fan.actual_speed, fan.target_speed);
    }

    if let Some(obs) = engine.weather.current() {
        println!("weather {}: {:.1} °C", obs.station, obs.temperature_c);
    }
    for quote in engine.stock.quotes() {
        println!(
            "stock {}: {:.2} ({:+.2})",
            quote.symbol, quote.current_price, quote.last_change
        );
    }
}

fn format_bytes(bytes: f64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes.max(0.0);
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{value:.0} {}", UNITS[unit])
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

fn format_uptime(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3_600;
    let minutes = (secs % 3_600) / 60;
    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else {
        format!("{hours}h {minutes}m")
    }
}
