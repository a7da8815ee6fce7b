//! Fault tokens, the active error set and the fail-safe signal

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

use crate::hardware::{Indicator, Led};

/// One outstanding fault
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FaultToken {
    SensorRtc,
    SensorWeather,
    SensorIrradiance,
    GpioCleanup,
    /// Measurement failure during a scheduled test of the named panel
    Test(String),
    /// Relay failure while activating the named panel
    Actuator(String),
    StorageUsb,
    TestManual,
    FatalCore,
}

impl FaultToken {
    pub fn test(panel: impl Into<String>) -> Self {
        Self::Test(panel.into())
    }

    pub fn actuator(panel: impl Into<String>) -> Self {
        Self::Actuator(panel.into())
    }
}

impl fmt::Display for FaultToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SensorRtc => write!(f, "Sensor-RTC"),
            Self::SensorWeather => write!(f, "Sensor-Weather"),
            Self::SensorIrradiance => write!(f, "Sensor-Irradiance"),
            Self::GpioCleanup => write!(f, "GPIO-Cleanup"),
            Self::Test(panel) => write!(f, "Test-{}", panel),
            Self::Actuator(panel) => write!(f, "Actuator-{}", panel),
            Self::StorageUsb => write!(f, "Storage-USB"),
            Self::TestManual => write!(f, "Test-Manual"),
            Self::FatalCore => write!(f, "FATAL-CORE"),
        }
    }
}

/// Ordered set of active faults
///
/// Inserting a present token or removing an absent one is a no-op, so the
/// loop can re-assert state every tick and only transitions get logged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorSet {
    tokens: Vec<FaultToken>,
}

impl ErrorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when the token was not already present
    pub fn insert(&mut self, token: FaultToken) -> bool {
        if self.tokens.contains(&token) {
            return false;
        }
        warn!("Fault raised: {}", token);
        self.tokens.push(token);
        true
    }

    /// Returns true when the token was present
    pub fn remove(&mut self, token: &FaultToken) -> bool {
        match self.tokens.iter().position(|t| t == token) {
            Some(index) => {
                self.tokens.remove(index);
                info!("Fault cleared: {}", token);
                true
            },
            None => false,
        }
    }

    /// Insert when `raised`, remove otherwise
    pub fn set(&mut self, token: FaultToken, raised: bool) {
        if raised {
            self.insert(token);
        } else {
            self.remove(&token);
        }
    }

    pub fn contains(&self, token: &FaultToken) -> bool {
        self.tokens.contains(token)
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_critical(&self) -> bool {
        self.contains(&FaultToken::FatalCore)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FaultToken> {
        self.tokens.iter()
    }
}

impl fmt::Display for ErrorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.tokens.iter().map(ToString::to_string).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

/// Heartbeat and fault lights
#[derive(Debug, Clone, Default)]
pub struct FailSafeSignal {
    heartbeat: bool,
}

impl FailSafeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the heartbeat one tick and drive both lights
    pub fn drive(&mut self, errors: &ErrorSet, indicator: &mut dyn Indicator) {
        self.heartbeat = !self.heartbeat;
        let (green, red) = self.levels(errors);
        indicator.set(Led::Green, green);
        indicator.set(Led::Red, red);
    }

    /// Light levels for the current heartbeat phase
    pub fn levels(&self, errors: &ErrorSet) -> (bool, bool) {
        let red = if errors.is_empty() {
            false
        } else if errors.is_critical() {
            true
        } else {
            self.heartbeat
        };
        (self.heartbeat, red)
    }

    /// Solid green for the duration of an activation
    pub fn hold_active(&self, indicator: &mut dyn Indicator) {
        indicator.set(Led::Green, true);
    }
}
