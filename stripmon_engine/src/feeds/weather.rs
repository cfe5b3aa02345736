//! Weather miner: METAR observations for a configured station, fetched at
//! the 30-minute cadence, feeding a temperature strip chart.
//!
//! Unit selection (°C/°F, mi/km) is applied at read time so a settings
//! change shows up without refetching.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::config::{DistanceUnit, TemperatureUnit};
use crate::series::TimeSeries;

use super::fetch::{build_client, fetch_text, FetchTask};

const METAR_URL_TEMPLATE: &str =
    "https://tgftp.nws.noaa.gov/data/observations/metar/stations/{station}.TXT";

#[derive(Debug, Clone, Default)]
pub struct WeatherObservation {
    pub station: String,
    pub fetched_at: Option<DateTime<Utc>>,
    /// Day-of-month, hour, minute from the observation timestamp.
    pub observed: Option<(u8, u8, u8)>,
    pub temperature_c: f32,
    pub dewpoint_c: Option<f32>,
    pub wind_direction_deg: Option<u16>,
    pub wind_speed_knots: Option<u16>,
    pub gust_speed_knots: Option<u16>,
    pub visibility_miles: Option<f32>,
    pub pressure_in: Option<f32>,
}

impl WeatherObservation {
    /// Relative humidity from temperature and dewpoint (Magnus formula).
    pub fn relative_humidity(&self) -> Option<f32> {
        let dewpoint = self.dewpoint_c?;
        let e = |t: f32| (17.625 * t / (243.04 + t)).exp();
        Some((100.0 * e(dewpoint) / e(self.temperature_c)).clamp(0.0, 100.0))
    }
}

pub struct WeatherMiner {
    station: String,
    client: reqwest::Client,
    fetch: FetchTask<String>,
    observation: Option<WeatherObservation>,
    /// °C history, one sample per graph tick.
    temperature_values: TimeSeries,
}

impl WeatherMiner {
    pub fn new(station: &str, sample_capacity: usize) -> Self {
        Self {
            station: station.trim().to_uppercase(),
            client: build_client(),
            fetch: FetchTask::new(),
            observation: None,
            temperature_values: TimeSeries::new(sample_capacity),
        }
    }

    pub fn station(&self) -> &str {
        &self.station
    }

    /// A station change supersedes any in-flight fetch and clears data that
    /// belongs to the old station.
    pub fn set_station(&mut self, station: &str) {
        let station = station.trim().to_uppercase();
        if self.station == station {
            return;
        }
        debug!(station = %station, "weather station changed");
        self.station = station;
        self.fetch.cancel();
        self.observation = None;
        self.temperature_values.set_all(0.0);
        self.begin_fetch();
    }

    /// 30-minute cadence: kick off a background fetch.
    pub fn min30_update(&mut self) {
        self.begin_fetch();
    }

    fn begin_fetch(&mut self) {
        if self.station.is_empty() {
            return;
        }
        let url = METAR_URL_TEMPLATE.replace("{station}", &self.station);
        let client = self.client.clone();
        self.fetch.begin(async move { fetch_text(&client, &url).await });
    }

    /// Graph cadence: integrate any delivered fetch result and advance the
    /// strip chart with the current temperature.
    pub fn graph_update(&mut self) {
        if let Some(result) = self.fetch.try_take() {
            match result {
                Ok(body) => match parse_metar_document(&self.station, &body) {
                    Some(mut obs) => {
                        obs.fetched_at = Some(Utc::now());
                        self.observation = Some(obs);
                    }
                    None => warn!(station = %self.station, "malformed METAR document"),
                },
                Err(e) => warn!(station = %self.station, "weather fetch failed: {e}"),
            }
        }
        if let Some(obs) = &self.observation {
            self.temperature_values.append(obs.temperature_c);
        }
    }

    pub fn has_good_data(&self) -> bool {
        self.observation.is_some()
    }

    pub fn current(&self) -> Option<&WeatherObservation> {
        self.observation.as_ref()
    }

    pub fn temperature(&self, unit: TemperatureUnit) -> Option<f32> {
        let obs = self.observation.as_ref()?;
        Some(match unit {
            TemperatureUnit::Celsius => obs.temperature_c,
            TemperatureUnit::Fahrenheit => obs.temperature_c * 9.0 / 5.0 + 32.0,
        })
    }

    pub fn visibility(&self, unit: DistanceUnit) -> Option<f32> {
        let miles = self.observation.as_ref()?.visibility_miles?;
        Some(match unit {
            DistanceUnit::Miles => miles,
            DistanceUnit::Kilometers => miles * 1.609_344,
        })
    }

    pub fn temperature_values(&self) -> &TimeSeries {
        &self.temperature_values
    }

    pub fn set_data_size(&mut self, sample_capacity: usize) {
        self.temperature_values.resize(sample_capacity);
    }

    pub fn reset(&mut self) {
        self.fetch.cancel();
        self.observation = None;
        self.temperature_values.set_all(0.0);
    }
}

/// NOAA serves a two-line document: a fetch timestamp, then the METAR
/// itself. Find the report line and decode the fields we chart.
fn parse_metar_document(station: &str, body: &str) -> Option<WeatherObservation> {
    let report = body
        .lines()
        .find(|line| line.split_whitespace().next() == Some(station))?;
    parse_metar(station, report)
}

fn parse_metar(station: &str, report: &str) -> Option<WeatherObservation> {
    let mut obs = WeatherObservation {
        station: station.to_string(),
        ..Default::default()
    };
    let mut have_temperature = false;

    for token in report.split_whitespace().skip(1) {
        // Remarks carry nothing we chart.
        if token == "RMK" {
            break;
        }
        if let Some(t) = token.strip_suffix('Z') {
            if t.len() == 6 {
                if let (Ok(day), Ok(hour), Ok(minute)) =
                    (t[0..2].parse(), t[2..4].parse(), t[4..6].parse())
                {
                    obs.observed = Some((day, hour, minute));
                }
            }
            continue;
        }
        if let Some(wind) = token.strip_suffix("KT") {
            parse_wind(wind, &mut obs);
            continue;
        }
        if let Some(vis) = token.strip_suffix("SM") {
            obs.visibility_miles = parse_visibility(vis);
            continue;
        }
        if let Some(alt) = token.strip_prefix('A') {
            if alt.len() == 4 {
                if let Ok(hundredths) = alt.parse::<u32>() {
                    obs.pressure_in = Some(hundredths as f32 / 100.0);
                }
            }
            continue;
        }
        if let Some(q) = token.strip_prefix('Q') {
            if let Ok(hpa) = q.parse::<u32>() {
                // Store inches regardless of report style; display converts.
                obs.pressure_in = Some(hpa as f32 * 0.029_53);
            }
            continue;
        }
        if let Some((t, d)) = token.split_once('/') {
            if let Some(temp) = parse_signed_temp(t) {
                obs.temperature_c = temp;
                obs.dewpoint_c = parse_signed_temp(d);
                have_temperature = true;
            }
            continue;
        }
    }

    have_temperature.then_some(obs)
}

fn parse_wind(wind: &str, obs: &mut WeatherObservation) {
    let (steady, gust) = match wind.split_once('G') {
        Some((s, g)) => (s, g.parse::<u16>().ok()),
        None => (wind, None),
    };
    if steady.len() < 5 {
        return;
    }
    let (dir, speed) = steady.split_at(3);
    if let Ok(speed) = speed.parse::<u16>() {
        obs.wind_speed_knots = Some(speed);
        obs.gust_speed_knots = gust;
        // "VRB" direction stays None.
        obs.wind_direction_deg = dir.parse::<u16>().ok();
    }
}

/// Visibility may be whole ("10"), fractional ("1/2"), or below-minimum
/// ("M1/4").
fn parse_visibility(vis: &str) -> Option<f32> {
    let vis = vis.strip_prefix('M').unwrap_or(vis);
    if let Some((num, den)) = vis.split_once('/') {
        let num: f32 = num.parse().ok()?;
        let den: f32 = den.parse().ok()?;
        if den == 0.0 {
            return None;
        }
        return Some(num / den);
    }
    vis.parse().ok()
}

/// "16" -> 16.0, "M05" -> -5.0, "" -> None.
fn parse_signed_temp(t: &str) -> Option<f32> {
    if let Some(neg) = t.strip_prefix('M') {
        return neg.parse::<f32>().ok().map(|v| -v);
    }
    t.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const KSFO: &str = "KSFO 211756Z 28016G24KT 10SM FEW008 16/09 A3012 RMK AO2 SLP198";

    #[test]
    fn parses_a_typical_report() {
        let obs = parse_metar("KSFO", KSFO).unwrap();
        assert_eq!(obs.observed, Some((21, 17, 56)));
        assert_eq!(obs.wind_direction_deg, Some(280));
        assert_eq!(obs.wind_speed_knots, Some(16));
        assert_eq!(obs.gust_speed_knots, Some(24));
        assert_eq!(obs.visibility_miles, Some(10.0));
        assert_eq!(obs.temperature_c, 16.0);
        assert_eq!(obs.dewpoint_c, Some(9.0));
        assert!((obs.pressure_in.unwrap() - 30.12).abs() < 1e-3);
        let rh = obs.relative_humidity().unwrap();
        assert!(rh > 60.0 && rh < 70.0, "humidity {rh}");
    }

    #[test]
    fn negative_temperatures_and_fractional_visibility() {
        let obs =
            parse_metar("CYYZ", "CYYZ 110200Z VRB03KT 1/2SM M05/M08 A2992").unwrap();
        assert_eq!(obs.temperature_c, -5.0);
        assert_eq!(obs.dewpoint_c, Some(-8.0));
        assert_eq!(obs.visibility_miles, Some(0.5));
        assert_eq!(obs.wind_speed_knots, Some(3));
        assert!(obs.wind_direction_deg.is_none());
    }

    #[test]
    fn report_without_temperature_is_rejected() {
        assert!(parse_metar("KSFO", "KSFO 211756Z 28016KT 10SM").is_none());
    }

    #[test]
    fn document_scan_finds_the_station_line() {
        let body = format!("2026/08/07 18:00\n{KSFO}\n");
        let obs = parse_metar_document("KSFO", &body).unwrap();
        assert_eq!(obs.temperature_c, 16.0);
    }

    #[tokio::test]
    async fn station_change_clears_stale_observation() {
        let mut miner = WeatherMiner::new("KSFO", 8);
        miner.observation = Some(WeatherObservation {
            station: "KSFO".into(),
            temperature_c: 16.0,
            ..Default::default()
        });
        miner.graph_update();
        assert_eq!(miner.temperature_values().len(), 1);

        miner.set_station("CYYZ");
        assert!(!miner.has_good_data());
        assert_eq!(miner.temperature_values().sum(), 0.0);
    }

    #[test]
    fn unit_conversion_happens_at_read_time() {
        let mut miner = WeatherMiner::new("KSFO", 8);
        miner.observation = Some(WeatherObservation {
            station: "KSFO".into(),
            temperature_c: 20.0,
            visibility_miles: Some(10.0),
            ..Default::default()
        });
        assert_eq!(miner.temperature(TemperatureUnit::Celsius), Some(20.0));
        assert_eq!(miner.temperature(TemperatureUnit::Fahrenheit), Some(68.0));
        let km = miner.visibility(DistanceUnit::Kilometers).unwrap();
        assert!((km - 16.093_44).abs() < 1e-3);
    }
}
