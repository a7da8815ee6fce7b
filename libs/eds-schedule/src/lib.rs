//! EDS Schedule - Test Scheduling Core
//!
//! Decides, for each panel and each control tick, whether a measurement and
//! activation cycle is due, whether the weather allows running it, and keeps
//! the durable state needed to make that decision correctly after a restart:
//! - Calendar arithmetic (leap years, day-of-year, elapsed days)
//! - Solar noon from the equation of time
//! - Trigger matching with midnight-wrapping tolerance windows
//! - Crash-safe activation ledger (write-through, atomic replace)
//! - Bounded weather gate polling
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────┐
//! │    Solar    │────▶│  Evaluator   │◀────│    Ledger    │
//! │ (noon time) │     │   (is_due)   │     │ (JSON file)  │
//! └─────────────┘     └──────────────┘     └──────────────┘
//!        ▲                   ▲
//!        │                   │
//! ┌─────────────┐     ┌──────────────┐
//! │  Calendar   │     │ WeatherGate  │
//! │ (day table) │     │  (polling)   │
//! └─────────────┘     └──────────────┘
//! ```

pub mod calendar;
mod error;
mod evaluator;
mod ledger;
pub mod solar;
pub mod types;
mod weather;

// Re-export public API
pub use calendar::CalendarDate;
pub use error::{Result, ScheduleError};
pub use evaluator::{minute_of_day, minute_distance, ScheduleEvaluator};
pub use ledger::{ActivationLedger, LedgerLoadStatus, LEDGER_VERSION};
pub use solar::{solar_noon_minute, solar_noon_offset_minutes};
pub use types::{
    ActivationRecord, PanelId, PanelKind, ScheduleSpec, SiteLocation, Trigger, MINUTES_PER_DAY,
};
pub use weather::{
    Bounds, GateOutcome, SensorFault, WeatherGate, WeatherLimits, WeatherReading, WeatherVerdict,
    DEFAULT_POLL_INTERVAL,
};
