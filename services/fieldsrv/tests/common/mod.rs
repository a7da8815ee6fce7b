//! Shared mock field hardware for the orchestration tests
#![allow(dead_code)]
#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use eds_schedule::{PanelId, PanelKind, ScheduleSpec, SensorFault, Trigger};
use errors::{FieldError, FieldResult};
use fieldsrv::config::{Config, PanelConfig};
use fieldsrv::hardware::{
    Actuator, Clock, FieldHardware, Indicator, Led, ManualSwitch, PanelMeasurement, Persistence,
    Sensors,
};
use fieldsrv::record::MeasurementRecord;
use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

pub fn at(hour: u32, minute: u32) -> NaiveDateTime {
    on(2024, 6, 15, hour, minute)
}

pub fn on(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

/// eds3 at 12:10 +/- 20 min daily, eds6 as charger, one control panel;
/// site at longitude 0 / UTC+0 so solar noon sits close to 12:00
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.site.longitude_deg = 0.0;
    config.site.utc_offset_hours = 0;
    config.site.charger_panel = Some("eds6".to_string());
    config.weather.timeout = Duration::from_secs(5);
    config.test.manual_panel = "eds3".to_string();
    config.storage.ledger_path = dir.join("state").join("ledger.json");
    config.storage.data_dir = dir.join("usb");
    config.panels = vec![
        PanelConfig {
            id: "eds3".to_string(),
            kind: PanelKind::Eds,
            rated_power_w: 10.0,
            schedule: Some(ScheduleSpec::new(vec![Trigger::FixedMinute(730)], 1, 20.0)),
        },
        PanelConfig {
            id: "eds6".to_string(),
            kind: PanelKind::Eds,
            rated_power_w: 10.0,
            schedule: None,
        },
        PanelConfig {
            id: "ctrl1".to_string(),
            kind: PanelKind::Control,
            rated_power_w: 10.0,
            schedule: None,
        },
    ];
    config.validate().unwrap();
    config
}

/// Everything the mocks observe or are told to do
#[derive(Debug)]
pub struct FieldState {
    pub base_time: NaiveDateTime,
    pub base_instant: Instant,
    pub clock_fails: bool,

    pub weather: Result<(f64, f64), String>,
    pub irradiance: Result<f64, String>,
    pub failing_panels: HashSet<String>,
    pub measurements: Vec<String>,

    pub relay_events: Vec<String>,
    pub energize_fails: bool,
    pub release_fails: bool,

    pub usb_present: bool,
    pub write_fails: bool,
    pub records: Vec<MeasurementRecord>,

    pub switch_edges: VecDeque<bool>,
    pub switch_engaged: bool,

    pub green: bool,
    pub red: bool,
}

/// Handle for steering the mock hardware from a test
#[derive(Debug, Clone)]
pub struct MockField {
    state: Arc<Mutex<FieldState>>,
}

impl MockField {
    pub fn new(now: NaiveDateTime) -> (Self, FieldHardware) {
        let state = Arc::new(Mutex::new(FieldState {
            base_time: now,
            base_instant: Instant::now(),
            clock_fails: false,
            weather: Ok((25.0, 45.0)),
            irradiance: Ok(900.0),
            failing_panels: HashSet::new(),
            measurements: Vec::new(),
            relay_events: Vec::new(),
            energize_fails: false,
            release_fails: false,
            usb_present: true,
            write_fails: false,
            records: Vec::new(),
            switch_edges: VecDeque::new(),
            switch_engaged: false,
            green: false,
            red: false,
        }));
        let field = Self { state };
        let hardware = FieldHardware {
            sensors: Box::new(field.clone()),
            actuator: Box::new(field.clone()),
            clock: Box::new(field.clone()),
            persistence: Box::new(field.clone()),
            switch: Box::new(field.clone()),
            indicator: Box::new(field.clone()),
        };
        (field, hardware)
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut FieldState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    /// Jump the wall clock; monotonic time keeps running from here
    pub fn set_time(&self, now: NaiveDateTime) {
        self.with(|s| {
            s.base_time = now;
            s.base_instant = Instant::now();
        });
    }

    pub fn relay_events(&self) -> Vec<String> {
        self.with(|s| s.relay_events.clone())
    }

    /// Relay events other than the per-tick release
    pub fn activations(&self) -> Vec<String> {
        self.relay_events()
            .into_iter()
            .filter(|e| e != "release")
            .collect()
    }

    pub fn records(&self) -> Vec<MeasurementRecord> {
        self.with(|s| s.records.clone())
    }

    /// Flip the switch on, producing one rising edge
    pub fn press_switch(&self) {
        self.with(|s| {
            s.switch_engaged = true;
            s.switch_edges.push_back(true);
        });
    }

    pub fn leds(&self) -> (bool, bool) {
        self.with(|s| (s.green, s.red))
    }
}

#[async_trait]
impl Sensors for MockField {
    async fn read_weather(&mut self) -> Result<(f64, f64), SensorFault> {
        self.with(|s| s.weather.clone().map_err(SensorFault::new))
    }

    async fn read_irradiance(&mut self) -> Result<f64, SensorFault> {
        self.with(|s| s.irradiance.clone().map_err(SensorFault::new))
    }

    async fn measure_panel(&mut self, panel: &PanelId) -> Result<PanelMeasurement, SensorFault> {
        self.with(|s| {
            s.measurements.push(panel.name().to_string());
            if s.failing_panels.contains(panel.name()) {
                return Err(SensorFault::new(format!("{} ADC timeout", panel)));
            }
            // Cleaning shows up as a higher current after the first activation
            let cleaned = s
                .relay_events
                .iter()
                .any(|e| e == &format!("off {}", panel.name()));
            Ok(PanelMeasurement {
                voc: 20.0,
                isc: if cleaned { 0.5 } else { 0.45 },
            })
        })
    }
}

#[async_trait]
impl Actuator for MockField {
    async fn energize(&mut self, panel: &PanelId) -> FieldResult<()> {
        self.with(|s| {
            if s.energize_fails {
                return Err(FieldError::actuator(panel.name(), "relay stuck"));
            }
            s.relay_events.push(format!("on {}", panel.name()));
            Ok(())
        })
    }

    async fn deenergize(&mut self, panel: &PanelId) -> FieldResult<()> {
        self.with(|s| s.relay_events.push(format!("off {}", panel.name())));
        Ok(())
    }

    async fn release_all(&mut self) -> FieldResult<()> {
        self.with(|s| {
            if s.release_fails {
                return Err(FieldError::actuator("gpio", "line busy"));
            }
            s.relay_events.push("release".to_string());
            Ok(())
        })
    }
}

#[async_trait]
impl Clock for MockField {
    async fn now(&mut self) -> FieldResult<NaiveDateTime> {
        self.with(|s| {
            if s.clock_fails {
                return Err(FieldError::Clock("RTC not responding".to_string()));
            }
            let elapsed = chrono::Duration::from_std(s.base_instant.elapsed()).unwrap();
            Ok(s.base_time + elapsed)
        })
    }
}

#[async_trait]
impl Persistence for MockField {
    fn usb_available(&self) -> bool {
        self.with(|s| s.usb_present)
    }

    async fn persist(&mut self, record: &MeasurementRecord) -> FieldResult<()> {
        self.with(|s| {
            if !s.usb_present {
                return Err(FieldError::StorageUnavailable("usb0".to_string()));
            }
            if s.write_fails {
                return Err(FieldError::Persistence("write error".to_string()));
            }
            s.records.push(record.clone());
            Ok(())
        })
    }
}

impl ManualSwitch for MockField {
    fn take_rising_edge(&mut self) -> bool {
        self.with(|s| s.switch_edges.pop_front().unwrap_or(false))
    }

    fn is_engaged(&self) -> bool {
        self.with(|s| s.switch_engaged)
    }
}

impl Indicator for MockField {
    fn set(&mut self, led: Led, on: bool) {
        self.with(|s| match led {
            Led::Green => s.green = on,
            Led::Red => s.red = on,
        });
    }
}
