//! Hardware collaborators
//!
//! Everything the orchestration loop touches outside its own state goes
//! through these traits. A real unit implements them over I2C/GPIO/ADC; the
//! simulated backend and the test mocks implement them in memory. All
//! collaborators are owned by the loop task, so methods take `&mut self`.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use eds_schedule::{PanelId, SensorFault};
use errors::FieldResult;
use std::time::Duration;
use tracing::warn;

use crate::record::MeasurementRecord;

/// Open-circuit voltage and short-circuit current of one panel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanelMeasurement {
    pub voc: f64,
    pub isc: f64,
}

/// Ambient and electrical probes
#[async_trait]
pub trait Sensors: Send {
    /// Temperature (C) and relative humidity (%)
    async fn read_weather(&mut self) -> Result<(f64, f64), SensorFault>;

    /// Plane-of-array irradiance, W/m2
    async fn read_irradiance(&mut self) -> Result<f64, SensorFault>;

    async fn measure_panel(&mut self, panel: &PanelId) -> Result<PanelMeasurement, SensorFault>;
}

/// Relay lines that energise the dust shields
#[async_trait]
pub trait Actuator: Send {
    async fn energize(&mut self, panel: &PanelId) -> FieldResult<()>;

    async fn deenergize(&mut self, panel: &PanelId) -> FieldResult<()>;

    /// Drive every line to its safe (off) state
    async fn release_all(&mut self) -> FieldResult<()>;

    /// Energise `panel` for `duration`
    ///
    /// The line is always released afterwards; a release failure is reported
    /// even when energising succeeded.
    async fn activate(&mut self, panel: &PanelId, duration: Duration) -> FieldResult<()> {
        if let Err(e) = self.energize(panel).await {
            // Leave nothing half-on
            if let Err(release) = self.deenergize(panel).await {
                warn!(
                    "Release of {} after failed energise also failed: {}",
                    panel, release
                );
            }
            return Err(e);
        }
        tokio::time::sleep(duration).await;
        self.deenergize(panel).await
    }
}

/// Real-time clock
#[async_trait]
pub trait Clock: Send {
    /// Local civil time
    async fn now(&mut self) -> FieldResult<NaiveDateTime>;
}

/// Removable-media measurement store
#[async_trait]
pub trait Persistence: Send {
    fn usb_available(&self) -> bool;

    async fn persist(&mut self, record: &MeasurementRecord) -> FieldResult<()>;
}

/// Manual test switch
pub trait ManualSwitch: Send {
    /// True once per off-to-on transition since the last call
    fn take_rising_edge(&mut self) -> bool;

    /// Current switch position
    fn is_engaged(&self) -> bool;
}

/// Status lights
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Led {
    Green,
    Red,
}

pub trait Indicator: Send {
    fn set(&mut self, led: Led, on: bool);
}

/// The full set of collaborators, owned by the loop
pub struct FieldHardware {
    pub sensors: Box<dyn Sensors>,
    pub actuator: Box<dyn Actuator>,
    pub clock: Box<dyn Clock>,
    pub persistence: Box<dyn Persistence>,
    pub switch: Box<dyn ManualSwitch>,
    pub indicator: Box<dyn Indicator>,
}

impl std::fmt::Debug for FieldHardware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldHardware").finish_non_exhaustive()
    }
}
