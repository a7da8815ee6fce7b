//! fieldsrv configuration
//!
//! Layered with figment: built-in defaults < YAML file < `FIELDSRV_` environment
//! (`__` separates nesting, e.g. `FIELDSRV_SITE__LONGITUDE_DEG=-70.9`).
//! Loaded once at startup and validated before the loop starts.

use eds_schedule::{
    Bounds, PanelId, PanelKind, ScheduleSpec, SiteLocation, Trigger, WeatherLimits,
};
use errors::{FieldError, FieldResult};
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Environment prefix for overrides
pub const ENV_PREFIX: &str = "FIELDSRV_";

/// Civil time of day with minute resolution, written `"HH:MM"`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    pub fn new(hour: u16, minute: u16) -> Self {
        Self(hour * 60 + minute)
    }

    pub fn minute_of_day(&self) -> u16 {
        self.0
    }
}

impl FromStr for TimeOfDay {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<Trigger>() {
            Ok(Trigger::FixedMinute(m)) => Ok(Self(m)),
            _ => Err(FieldError::invalid_config(
                "time of day",
                format!("'{}' is not HH:MM", s),
            )),
        }
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = FieldError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(t: TimeOfDay) -> Self {
        t.to_string()
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

/// Hours in which scheduled work runs
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaylightConfig {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

impl DaylightConfig {
    /// `[start, end)`; a window with `end < start` wraps past midnight
    pub fn contains(&self, minute_of_day: f64) -> bool {
        let start = f64::from(self.start.minute_of_day());
        let end = f64::from(self.end.minute_of_day());
        if start <= end {
            minute_of_day >= start && minute_of_day < end
        } else {
            minute_of_day >= start || minute_of_day < end
        }
    }
}

impl Default for DaylightConfig {
    fn default() -> Self {
        Self {
            start: TimeOfDay::new(5, 0),
            end: TimeOfDay::new(21, 0),
        }
    }
}

/// Site constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Degrees east positive
    pub longitude_deg: f64,
    /// Offset of the unit's clock from UTC
    pub utc_offset_hours: i32,
    pub daylight: DaylightConfig,
    /// Half-width of the noon measurement window
    pub noon_tolerance_minutes: f64,
    /// EDS panel energised after the noon pass (battery charger)
    pub charger_panel: Option<String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            longitude_deg: -71.05,
            utc_offset_hours: -4,
            daylight: DaylightConfig::default(),
            noon_tolerance_minutes: 1.0,
            charger_panel: Some("eds6".to_string()),
        }
    }
}

impl SiteConfig {
    pub fn location(&self) -> SiteLocation {
        SiteLocation {
            longitude_deg: self.longitude_deg,
            utc_offset_hours: self.utc_offset_hours,
        }
    }
}

/// Weather gate limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub temperature_c: Bounds,
    pub humidity_pct: Bounds,
    pub tolerance_fraction: f64,
    /// Maximum wait for acceptable weather before a scheduled test is skipped
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        let limits = WeatherLimits::default();
        Self {
            temperature_c: limits.temperature_c,
            humidity_pct: limits.humidity_pct,
            tolerance_fraction: limits.tolerance_fraction,
            timeout: Duration::from_secs(2700),
            poll_interval: eds_schedule::DEFAULT_POLL_INTERVAL,
        }
    }
}

impl WeatherConfig {
    pub fn limits(&self) -> WeatherLimits {
        WeatherLimits {
            temperature_c: self.temperature_c,
            humidity_pct: self.humidity_pct,
            tolerance_fraction: self.tolerance_fraction,
        }
    }
}

/// Test sequence parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestConfig {
    #[serde(with = "humantime_serde")]
    pub activation_duration: Duration,
    /// Longest a manual activation may stay energised
    #[serde(with = "humantime_serde")]
    pub manual_time_limit: Duration,
    pub manual_panel: String,
    /// Pmax = Voc * Isc * fill_factor
    pub fill_factor: f64,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            activation_duration: Duration::from_secs(120),
            manual_time_limit: Duration::from_secs(300),
            manual_panel: "eds1".to_string(),
            fill_factor: 0.75,
        }
    }
}

/// Control loop parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    #[serde(with = "humantime_serde")]
    pub tick_interval: Duration,
    /// Return from the loop on an escaped error instead of flagging FATAL-CORE
    pub halt_on_fatal: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            halt_on_fatal: false,
        }
    }
}

/// Durable state and removable media
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Activation ledger, on internal storage
    pub ledger_path: PathBuf,
    /// Measurement CSV directory, on removable media
    pub data_dir: PathBuf,
    /// Records buffered while the media is missing
    pub pending_capacity: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            ledger_path: PathBuf::from("data/ledger.json"),
            data_dir: PathBuf::from("/media/usb0/eds"),
            pending_capacity: 256,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: Option<String>,
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: None,
            level: "info".to_string(),
        }
    }
}

/// One panel on the rack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelConfig {
    pub id: String,
    pub kind: PanelKind,
    #[serde(default = "default_rated_power")]
    pub rated_power_w: f64,
    /// EDS panels only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<ScheduleSpec>,
}

fn default_rated_power() -> f64 {
    10.0
}

impl PanelConfig {
    pub fn panel_id(&self) -> PanelId {
        PanelId::new(self.id.clone(), self.kind)
    }
}

/// Full configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub site: SiteConfig,
    pub weather: WeatherConfig,
    pub test: TestConfig,
    #[serde(rename = "loop")]
    pub run_loop: LoopConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    pub panels: Vec<PanelConfig>,
}

impl Default for Config {
    fn default() -> Self {
        let hours_from_noon = |hours: &[f64]| {
            hours
                .iter()
                .map(|h| Trigger::SolarOffset(h * 60.0))
                .collect::<Vec<_>>()
        };
        let eds = |id: &str, triggers: Vec<Trigger>, frequency_days: u32| PanelConfig {
            id: id.to_string(),
            kind: PanelKind::Eds,
            rated_power_w: default_rated_power(),
            schedule: Some(ScheduleSpec::new(triggers, frequency_days, 1.0)),
        };
        let control = |id: &str| PanelConfig {
            id: id.to_string(),
            kind: PanelKind::Control,
            rated_power_w: default_rated_power(),
            schedule: None,
        };

        Self {
            site: SiteConfig::default(),
            weather: WeatherConfig::default(),
            test: TestConfig::default(),
            run_loop: LoopConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
            panels: vec![
                eds("eds1", hours_from_noon(&[-3.0, -2.0, -1.0]), 1),
                eds("eds2", hours_from_noon(&[-3.0, -2.0]), 1),
                eds("eds3", hours_from_noon(&[-2.0]), 1),
                eds("eds4", hours_from_noon(&[-2.0]), 2),
                eds("eds5", hours_from_noon(&[-2.0]), 3),
                // Battery charger, energised after the noon pass only
                PanelConfig {
                    schedule: None,
                    ..eds("eds6", vec![], 0)
                },
                control("ctrl1"),
                control("ctrl2"),
            ],
        }
    }
}

/// Where a loaded configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    /// No file at the path; built-in defaults plus the environment
    Defaults(PathBuf),
}

impl Config {
    /// Load from `path` (if it exists) and the environment, then validate
    pub fn load(path: &Path) -> FieldResult<(Self, ConfigSource)> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        let source = if path.exists() {
            figment = figment.merge(Yaml::file(path));
            ConfigSource::File(path.to_path_buf())
        } else {
            ConfigSource::Defaults(path.to_path_buf())
        };
        let config: Config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| FieldError::Configuration(format!("{}: {}", path.display(), e)))?;

        config.validate()?;
        Ok((config, source))
    }

    /// Parse YAML text over the defaults, without the environment
    pub fn from_yaml_str(yaml: &str) -> FieldResult<Self> {
        let config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Yaml::string(yaml))
            .extract()
            .map_err(|e| FieldError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> FieldResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn panel(&self, id: &str) -> Option<&PanelConfig> {
        self.panels.iter().find(|p| p.id == id)
    }

    pub fn eds_panels(&self) -> impl Iterator<Item = &PanelConfig> {
        self.panels.iter().filter(|p| p.kind == PanelKind::Eds)
    }

    /// Ids the activation ledger keeps records for
    pub fn eds_panel_ids(&self) -> Vec<&str> {
        self.eds_panels().map(|p| p.id.as_str()).collect()
    }

    pub fn control_panels(&self) -> impl Iterator<Item = &PanelConfig> {
        self.panels.iter().filter(|p| p.kind == PanelKind::Control)
    }

    /// Reject anything the loop could trip over at runtime
    pub fn validate(&self) -> FieldResult<()> {
        if self.panels.is_empty() {
            return Err(FieldError::invalid_config("panels", "at least one panel is required"));
        }

        let mut seen = HashSet::new();
        for (index, panel) in self.panels.iter().enumerate() {
            let field = format!("panels[{}]", index);
            if panel.id.trim().is_empty() {
                return Err(FieldError::invalid_config(field, "empty id"));
            }
            if !seen.insert(panel.id.as_str()) {
                return Err(FieldError::invalid_config(
                    field,
                    format!("duplicate id '{}'", panel.id),
                ));
            }
            if !(panel.rated_power_w >= 0.0) {
                return Err(FieldError::invalid_config(
                    format!("{}.rated_power_w", field),
                    "must be non-negative",
                ));
            }

            match (panel.kind, &panel.schedule) {
                (PanelKind::Control, Some(_)) => {
                    return Err(FieldError::invalid_config(
                        format!("{}.schedule", field),
                        format!("control panel '{}' cannot be scheduled", panel.id),
                    ));
                },
                (PanelKind::Eds, Some(schedule)) => {
                    validate_schedule(&format!("{}.schedule", field), schedule)?
                },
                (PanelKind::Eds, None) => {
                    if self.site.charger_panel.as_deref() != Some(panel.id.as_str()) {
                        return Err(FieldError::invalid_config(
                            format!("{}.schedule", field),
                            format!("EDS panel '{}' has no schedule", panel.id),
                        ));
                    }
                },
                (PanelKind::Control, None) => {},
            }
        }

        self.require_eds("test.manual_panel", &self.test.manual_panel)?;
        if let Some(charger) = &self.site.charger_panel {
            self.require_eds("site.charger_panel", charger)?;
        }

        if !(self.site.noon_tolerance_minutes > 0.0) {
            return Err(FieldError::invalid_config(
                "site.noon_tolerance_minutes",
                "must be positive",
            ));
        }
        if !(-12..=14).contains(&self.site.utc_offset_hours) {
            return Err(FieldError::invalid_config(
                "site.utc_offset_hours",
                "must be within -12..=14",
            ));
        }
        if !(-180.0..=180.0).contains(&self.site.longitude_deg) {
            return Err(FieldError::invalid_config(
                "site.longitude_deg",
                "must be within -180..=180",
            ));
        }
        for (field, bounds) in [
            ("weather.temperature_c", &self.weather.temperature_c),
            ("weather.humidity_pct", &self.weather.humidity_pct),
        ] {
            if !(bounds.low <= bounds.high) {
                return Err(FieldError::invalid_config(field, "low must not exceed high"));
            }
        }
        if !(0.0..1.0).contains(&self.weather.tolerance_fraction) {
            return Err(FieldError::invalid_config(
                "weather.tolerance_fraction",
                "must be within 0..1",
            ));
        }
        if self.weather.poll_interval.is_zero() {
            return Err(FieldError::invalid_config(
                "weather.poll_interval",
                "must be positive",
            ));
        }
        if self.run_loop.tick_interval.is_zero() {
            return Err(FieldError::invalid_config("loop.tick_interval", "must be positive"));
        }
        if !(self.test.fill_factor > 0.0 && self.test.fill_factor <= 1.0) {
            return Err(FieldError::invalid_config("test.fill_factor", "must be within (0, 1]"));
        }
        if self.storage.pending_capacity == 0 {
            return Err(FieldError::invalid_config(
                "storage.pending_capacity",
                "must be positive",
            ));
        }
        Ok(())
    }

    fn require_eds(&self, field: &str, id: &str) -> FieldResult<()> {
        match self.panel(id) {
            Some(panel) if panel.kind == PanelKind::Eds => Ok(()),
            Some(_) => Err(FieldError::invalid_config(
                field,
                format!("'{}' is a control panel", id),
            )),
            None => Err(FieldError::invalid_config(field, format!("unknown panel '{}'", id))),
        }
    }
}

fn validate_schedule(field: &str, schedule: &ScheduleSpec) -> FieldResult<()> {
    if schedule.triggers.is_empty() {
        return Err(FieldError::invalid_config(field, "no triggers"));
    }
    if !(schedule.tolerance_minutes > 0.0) {
        return Err(FieldError::invalid_config(
            format!("{}.tolerance_minutes", field),
            "must be positive",
        ));
    }
    for trigger in &schedule.triggers {
        if let Trigger::FixedMinute(m) = trigger {
            if *m >= 1440 {
                return Err(FieldError::invalid_config(
                    format!("{}.triggers", field),
                    format!("minute {} is past the end of the day", m),
                ));
            }
        }
    }
    Ok(())
}
