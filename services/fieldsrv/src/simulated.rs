//! Simulated field hardware
//!
//! Deterministic stand-ins for every collaborator so the service can run on a
//! workstation: the system clock, a clear-sky irradiance curve centred on
//! solar noon, fixed weather, panels whose output follows irradiance, and a
//! manual switch that is "on" while a flag file exists.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use eds_schedule::{minute_of_day, CalendarDate, PanelId, ScheduleEvaluator, SensorFault};
use errors::FieldResult;
use std::collections::BTreeSet;
use std::f64::consts::PI;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::config::Config;
use crate::hardware::{
    Actuator, Clock, FieldHardware, Indicator, Led, ManualSwitch, PanelMeasurement, Sensors,
};
use crate::persistence::CsvStore;

/// Peak plane-of-array irradiance at solar noon, W/m2
pub const PEAK_IRRADIANCE: f64 = 1000.0;
/// Half-width of the simulated day around solar noon, minutes
const HALF_DAY_MINUTES: f64 = 360.0;
const OPEN_CIRCUIT_VOLTAGE: f64 = 21.6;
const SHORT_CIRCUIT_CURRENT: f64 = 0.62;

/// Local wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    async fn now(&mut self) -> FieldResult<NaiveDateTime> {
        Ok(chrono::Local::now().naive_local())
    }
}

/// Clear-sky irradiance for `now`
pub fn clear_sky_irradiance(evaluator: &ScheduleEvaluator, now: &NaiveDateTime) -> f64 {
    let noon = evaluator.solar_noon(CalendarDate::from_naive(now.date()));
    let offset = minute_of_day(now) - noon;
    if offset.abs() >= HALF_DAY_MINUTES {
        return 0.0;
    }
    PEAK_IRRADIANCE * (offset / HALF_DAY_MINUTES * PI / 2.0).cos()
}

/// Weather and panel probes driven by the wall clock
#[derive(Debug, Clone)]
pub struct SimulatedSensors {
    evaluator: ScheduleEvaluator,
    temperature_c: f64,
    humidity_pct: f64,
}

impl SimulatedSensors {
    pub fn new(evaluator: ScheduleEvaluator, temperature_c: f64, humidity_pct: f64) -> Self {
        Self {
            evaluator,
            temperature_c,
            humidity_pct,
        }
    }

    fn irradiance(&self) -> f64 {
        clear_sky_irradiance(&self.evaluator, &chrono::Local::now().naive_local())
    }
}

#[async_trait]
impl Sensors for SimulatedSensors {
    async fn read_weather(&mut self) -> Result<(f64, f64), SensorFault> {
        Ok((self.temperature_c, self.humidity_pct))
    }

    async fn read_irradiance(&mut self) -> Result<f64, SensorFault> {
        Ok(self.irradiance())
    }

    async fn measure_panel(&mut self, panel: &PanelId) -> Result<PanelMeasurement, SensorFault> {
        let fraction = self.irradiance() / PEAK_IRRADIANCE;
        // Controls read slightly higher, as if freshly cleaned
        let cleanliness = if panel.is_eds() { 0.95 } else { 1.0 };
        let measurement = PanelMeasurement {
            voc: if fraction > 0.0 {
                OPEN_CIRCUIT_VOLTAGE * (0.9 + 0.1 * fraction)
            } else {
                0.0
            },
            isc: SHORT_CIRCUIT_CURRENT * fraction * cleanliness,
        };
        debug!("Simulated {} -> {:?}", panel, measurement);
        Ok(measurement)
    }
}

/// Relay bank that only logs
#[derive(Debug, Default)]
pub struct SimulatedRelays {
    energized: BTreeSet<String>,
}

impl SimulatedRelays {
    pub fn energized(&self) -> impl Iterator<Item = &str> {
        self.energized.iter().map(String::as_str)
    }
}

#[async_trait]
impl Actuator for SimulatedRelays {
    async fn energize(&mut self, panel: &PanelId) -> FieldResult<()> {
        info!("Relay {} on", panel);
        self.energized.insert(panel.name().to_string());
        Ok(())
    }

    async fn deenergize(&mut self, panel: &PanelId) -> FieldResult<()> {
        if self.energized.remove(panel.name()) {
            info!("Relay {} off", panel);
        }
        Ok(())
    }

    async fn release_all(&mut self) -> FieldResult<()> {
        if !self.energized.is_empty() {
            info!("Releasing relays {:?}", self.energized);
            self.energized.clear();
        }
        Ok(())
    }
}

/// Manual switch that is engaged while `flag` exists
#[derive(Debug, Clone)]
pub struct FlagFileSwitch {
    flag: PathBuf,
    last: bool,
}

impl FlagFileSwitch {
    pub fn new(flag: impl Into<PathBuf>) -> Self {
        let flag = flag.into();
        let last = flag.exists();
        Self { flag, last }
    }
}

impl ManualSwitch for FlagFileSwitch {
    fn take_rising_edge(&mut self) -> bool {
        let engaged = self.flag.exists();
        let rising = engaged && !self.last;
        self.last = engaged;
        rising
    }

    fn is_engaged(&self) -> bool {
        self.flag.exists()
    }
}

/// Status lights reported through the log on change
#[derive(Debug, Default)]
pub struct LogIndicator {
    green: bool,
    red: bool,
}

impl Indicator for LogIndicator {
    fn set(&mut self, led: Led, on: bool) {
        let state = match led {
            Led::Green => &mut self.green,
            Led::Red => &mut self.red,
        };
        if *state != on {
            *state = on;
            debug!("LED {:?} {}", led, if on { "on" } else { "off" });
        }
    }
}

/// Complete simulated unit for `config`
pub fn simulated_hardware(config: &Config, switch_flag: impl Into<PathBuf>) -> FieldHardware {
    let evaluator = ScheduleEvaluator::new(config.site.location());
    // Middle of the accepted band
    let temperature_c = (config.weather.temperature_c.low + config.weather.temperature_c.high) / 2.0;
    let humidity_pct = (config.weather.humidity_pct.low + config.weather.humidity_pct.high) / 2.0;

    FieldHardware {
        sensors: Box::new(SimulatedSensors::new(evaluator, temperature_c, humidity_pct)),
        actuator: Box::new(SimulatedRelays::default()),
        clock: Box::new(SystemClock),
        persistence: Box::new(CsvStore::new(config.storage.data_dir.clone())),
        switch: Box::new(FlagFileSwitch::new(switch_flag)),
        indicator: Box::new(LogIndicator::default()),
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use eds_schedule::SiteLocation;
    use tempfile::tempdir;

    fn evaluator() -> ScheduleEvaluator {
        ScheduleEvaluator::new(SiteLocation {
            longitude_deg: 0.0,
            utc_offset_hours: 0,
        })
    }

    #[test]
    fn test_clear_sky_curve() {
        let ev = evaluator();
        let date = NaiveDate::from_ymd_opt(2024, 6, 21).unwrap();
        let noon_minute = ev.solar_noon(CalendarDate::from_naive(date));
        let noon = date.and_hms_opt(0, 0, 0).unwrap()
            + chrono::Duration::seconds((noon_minute * 60.0) as i64);

        let peak = clear_sky_irradiance(&ev, &noon);
        assert!(peak > 999.0);

        let morning = clear_sky_irradiance(&ev, &date.and_hms_opt(9, 0, 0).unwrap());
        assert!(morning > 0.0 && morning < peak);

        assert_eq!(clear_sky_irradiance(&ev, &date.and_hms_opt(2, 0, 0).unwrap()), 0.0);
    }

    #[tokio::test]
    async fn test_relays_release() {
        let mut relays = SimulatedRelays::default();
        relays.energize(&PanelId::eds("eds1")).await.unwrap();
        relays.energize(&PanelId::eds("eds2")).await.unwrap();
        relays.deenergize(&PanelId::eds("eds1")).await.unwrap();
        assert_eq!(relays.energized().collect::<Vec<_>>(), vec!["eds2"]);

        relays.release_all().await.unwrap();
        assert_eq!(relays.energized().count(), 0);
    }

    #[test]
    fn test_flag_file_switch_edges() {
        let dir = tempdir().unwrap();
        let flag = dir.path().join("manual");
        let mut switch = FlagFileSwitch::new(&flag);

        assert!(!switch.take_rising_edge());
        std::fs::write(&flag, b"").unwrap();
        assert!(switch.is_engaged());
        assert!(switch.take_rising_edge());
        assert!(!switch.take_rising_edge());

        std::fs::remove_file(&flag).unwrap();
        assert!(!switch.take_rising_edge());
        std::fs::write(&flag, b"").unwrap();
        assert!(switch.take_rising_edge());
    }
}
