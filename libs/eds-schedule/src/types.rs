//! Scheduling type definitions
//!
//! Core types shared by the evaluator, the ledger and the orchestration loop:
//! - PanelId / PanelKind: which panel, and whether it can be activated
//! - Trigger / ScheduleSpec: when a panel should be tested
//! - ActivationRecord: durable per-panel activation state
//! - SiteLocation: constants for solar time

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::calendar::CalendarDate;
use crate::error::ScheduleError;

/// Minutes in a civil day
pub const MINUTES_PER_DAY: f64 = 1440.0;

// ============================================================================
// Panels
// ============================================================================

/// Panel role
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PanelKind {
    /// Electrodynamic dust shield panel, can be activated
    Eds,
    /// Reference panel, measured only
    Control,
}

impl fmt::Display for PanelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PanelKind::Eds => write!(f, "EDS"),
            PanelKind::Control => write!(f, "CTRL"),
        }
    }
}

/// Panel identifier tagged with its role
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PanelId {
    name: String,
    kind: PanelKind,
}

impl PanelId {
    pub fn new(name: impl Into<String>, kind: PanelKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn eds(name: impl Into<String>) -> Self {
        Self::new(name, PanelKind::Eds)
    }

    pub fn control(name: impl Into<String>) -> Self {
        Self::new(name, PanelKind::Control)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> PanelKind {
        self.kind
    }

    pub fn is_eds(&self) -> bool {
        self.kind == PanelKind::Eds
    }
}

impl fmt::Display for PanelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

// ============================================================================
// Triggers
// ============================================================================

/// Time of day at which a scheduled test may start
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TriggerRepr", into = "TriggerRepr")]
pub enum Trigger {
    /// Explicit civil minute of day, 0..1440
    FixedMinute(u16),
    /// Local solar noon
    SolarNoon,
    /// Solar noon shifted by a signed number of minutes
    SolarOffset(f64),
}

impl Trigger {
    pub fn fixed(hour: u16, minute: u16) -> Self {
        Trigger::FixedMinute(hour * 60 + minute)
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::FixedMinute(m) => write!(f, "{:02}:{:02}", m / 60, m % 60),
            Trigger::SolarNoon => write!(f, "solar_noon"),
            Trigger::SolarOffset(off) => write!(f, "solar_noon{:+}m", off),
        }
    }
}

impl FromStr for Trigger {
    type Err = ScheduleError;

    /// Accepts `"HH:MM"` or `"solar_noon"`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        if text.eq_ignore_ascii_case("solar_noon") || text.eq_ignore_ascii_case("solar noon") {
            return Ok(Trigger::SolarNoon);
        }

        let (hour, minute) = text
            .split_once(':')
            .ok_or_else(|| ScheduleError::InvalidTrigger(format!("'{}' is not HH:MM", s)))?;
        let hour: u16 = hour
            .trim()
            .parse()
            .map_err(|_| ScheduleError::InvalidTrigger(format!("bad hour in '{}'", s)))?;
        let minute: u16 = minute
            .trim()
            .parse()
            .map_err(|_| ScheduleError::InvalidTrigger(format!("bad minute in '{}'", s)))?;
        if hour > 23 || minute > 59 {
            return Err(ScheduleError::InvalidTrigger(format!(
                "'{}' is outside 00:00..23:59",
                s
            )));
        }
        Ok(Trigger::fixed(hour, minute))
    }
}

/// Configuration-file form of a trigger
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum TriggerRepr {
    Text(String),
    SolarOffset { solar_offset_minutes: f64 },
}

impl TryFrom<TriggerRepr> for Trigger {
    type Error = ScheduleError;

    fn try_from(repr: TriggerRepr) -> Result<Self, Self::Error> {
        match repr {
            TriggerRepr::Text(text) => text.parse(),
            TriggerRepr::SolarOffset {
                solar_offset_minutes,
            } => {
                if !solar_offset_minutes.is_finite()
                    || solar_offset_minutes.abs() >= MINUTES_PER_DAY
                {
                    return Err(ScheduleError::InvalidTrigger(format!(
                        "solar offset {} out of range",
                        solar_offset_minutes
                    )));
                }
                Ok(Trigger::SolarOffset(solar_offset_minutes))
            },
        }
    }
}

impl From<Trigger> for TriggerRepr {
    fn from(trigger: Trigger) -> Self {
        match trigger {
            Trigger::FixedMinute(_) | Trigger::SolarNoon => TriggerRepr::Text(trigger.to_string()),
            Trigger::SolarOffset(off) => TriggerRepr::SolarOffset {
                solar_offset_minutes: off,
            },
        }
    }
}

// ============================================================================
// Schedule
// ============================================================================

/// Per-panel schedule, immutable after startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSpec {
    /// Ordered trigger times
    pub triggers: Vec<Trigger>,

    /// Minimum elapsed calendar days between two successful activations (0 = every day)
    #[serde(default)]
    pub frequency_days: u32,

    /// Half-width of the matching window around a trigger, minutes
    pub tolerance_minutes: f64,
}

impl ScheduleSpec {
    pub fn new(triggers: Vec<Trigger>, frequency_days: u32, tolerance_minutes: f64) -> Self {
        Self {
            triggers,
            frequency_days,
            tolerance_minutes,
        }
    }
}

/// Durable activation state of one panel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationRecord {
    /// Day of the last successful scheduled activation, `None` = never
    #[serde(default)]
    pub last_activated_date: Option<CalendarDate>,

    /// Set by a successful activation, cleared on day roll
    #[serde(default)]
    pub activated_today: bool,
}

/// Site constants for solar time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SiteLocation {
    /// Degrees east positive
    pub longitude_deg: f64,
    /// Civil time offset from UTC, hours
    pub utc_offset_hours: i32,
}
