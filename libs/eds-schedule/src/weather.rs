//! Weather gate
//!
//! Bounded polling of the ambient sensor before a scheduled test. A broken
//! sensor axis counts as passing so a dead probe cannot block testing.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Interval between two weather polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Sensor could not produce a value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct SensorFault(pub String);

impl SensorFault {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// One ambient reading; each axis may have failed independently
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherReading {
    pub temperature_c: Result<f64, SensorFault>,
    pub humidity_pct: Result<f64, SensorFault>,
}

impl WeatherReading {
    pub fn new(temperature_c: f64, humidity_pct: f64) -> Self {
        Self {
            temperature_c: Ok(temperature_c),
            humidity_pct: Ok(humidity_pct),
        }
    }

    /// Both axes failed for the same reason
    pub fn unavailable(reason: impl Into<String>) -> Self {
        let fault = SensorFault::new(reason);
        Self {
            temperature_c: Err(fault.clone()),
            humidity_pct: Err(fault),
        }
    }

    pub fn has_fault(&self) -> bool {
        self.temperature_c.is_err() || self.humidity_pct.is_err()
    }

    pub fn temperature(&self) -> Option<f64> {
        self.temperature_c.as_ref().ok().copied()
    }

    pub fn humidity(&self) -> Option<f64> {
        self.humidity_pct.as_ref().ok().copied()
    }
}

/// Inclusive nominal range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub low: f64,
    pub high: f64,
}

impl Bounds {
    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    /// `value` in `[low*(1-tol), high*(1+tol)]`
    pub fn admits(&self, value: f64, tolerance_fraction: f64) -> bool {
        value >= self.low * (1.0 - tolerance_fraction)
            && value <= self.high * (1.0 + tolerance_fraction)
    }
}

/// Acceptable ambient conditions for a test
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherLimits {
    pub temperature_c: Bounds,
    pub humidity_pct: Bounds,
    pub tolerance_fraction: f64,
}

impl Default for WeatherLimits {
    fn default() -> Self {
        Self {
            temperature_c: Bounds::new(10.0, 40.0),
            humidity_pct: Bounds::new(30.0, 60.0),
            tolerance_fraction: 0.1,
        }
    }
}

impl WeatherLimits {
    pub fn evaluate(&self, reading: &WeatherReading) -> WeatherVerdict {
        let axis = |value: &Result<f64, SensorFault>, bounds: &Bounds| match value {
            Ok(v) => bounds.admits(*v, self.tolerance_fraction),
            Err(_) => true,
        };
        WeatherVerdict {
            temperature_ok: axis(&reading.temperature_c, &self.temperature_c),
            humidity_ok: axis(&reading.humidity_pct, &self.humidity_pct),
            sensor_fault: reading.has_fault(),
        }
    }
}

/// Per-axis result of checking one reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeatherVerdict {
    pub temperature_ok: bool,
    pub humidity_ok: bool,
    /// At least one axis passed only because its sensor failed
    pub sensor_fault: bool,
}

impl WeatherVerdict {
    pub fn accepted(&self) -> bool {
        self.temperature_ok && self.humidity_ok
    }
}

/// Result of waiting for acceptable weather
#[derive(Debug, Clone, PartialEq)]
pub enum GateOutcome {
    Accepted(WeatherReading),
    /// Window elapsed; carries the last reading
    TimedOut(WeatherReading),
}

impl GateOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, GateOutcome::Accepted(_))
    }

    pub fn reading(&self) -> &WeatherReading {
        match self {
            GateOutcome::Accepted(r) | GateOutcome::TimedOut(r) => r,
        }
    }
}

/// Polls the weather until it is acceptable or the window closes
#[derive(Debug, Clone)]
pub struct WeatherGate {
    limits: WeatherLimits,
    timeout: Duration,
    poll_interval: Duration,
}

impl WeatherGate {
    pub fn new(limits: WeatherLimits, timeout: Duration) -> Self {
        Self {
            limits,
            timeout,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn limits(&self) -> &WeatherLimits {
        &self.limits
    }

    /// Poll `read_fn` until a reading is accepted or `timeout` has elapsed
    ///
    /// The first poll happens immediately. Elapsed time is counted in poll
    /// intervals, so a 5 s window at 1 s spacing polls six times.
    pub async fn await_acceptable<F, Fut>(&self, mut read_fn: F) -> GateOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = WeatherReading>,
    {
        let mut elapsed = Duration::ZERO;
        let mut fault_logged = false;

        loop {
            let reading = read_fn().await;
            let verdict = self.limits.evaluate(&reading);

            if verdict.sensor_fault && !fault_logged {
                warn!("Weather sensor fault, failed axis treated as passing: {:?}", reading);
                fault_logged = true;
            }

            if verdict.accepted() {
                info!(
                    "Weather accepted after {:?}: T={:?} RH={:?}",
                    elapsed,
                    reading.temperature(),
                    reading.humidity()
                );
                return GateOutcome::Accepted(reading);
            }

            if elapsed >= self.timeout {
                warn!(
                    "Weather not acceptable within {:?}: T={:?} RH={:?}",
                    self.timeout,
                    reading.temperature(),
                    reading.humidity()
                );
                return GateOutcome::TimedOut(reading);
            }

            debug!("Weather out of range ({:?}), retrying", verdict);
            tokio::time::sleep(self.poll_interval).await;
            elapsed += self.poll_interval;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn gate(timeout_secs: u64) -> WeatherGate {
        WeatherGate::new(WeatherLimits::default(), Duration::from_secs(timeout_secs))
    }

    #[test]
    fn test_tolerance_band() {
        let limits = WeatherLimits::default();
        assert!(limits.evaluate(&WeatherReading::new(41.0, 45.0)).accepted());
        assert!(limits.evaluate(&WeatherReading::new(44.0, 45.0)).accepted());
        assert!(!limits.evaluate(&WeatherReading::new(46.0, 45.0)).accepted());
        assert!(limits.evaluate(&WeatherReading::new(9.0, 27.0)).accepted());
        assert!(!limits.evaluate(&WeatherReading::new(25.0, 70.0)).accepted());
    }

    #[tokio::test(start_paused = true)]
    async fn test_accepts_first_good_reading() {
        let mut polls = 0;
        let outcome = gate(5)
            .await_acceptable(|| {
                polls += 1;
                async { WeatherReading::new(41.0, 45.0) }
            })
            .await;
        assert!(outcome.is_accepted());
        assert_eq!(polls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_after_window() {
        let start = tokio::time::Instant::now();
        let mut polls = 0;
        let outcome = gate(5)
            .await_acceptable(|| {
                polls += 1;
                async { WeatherReading::new(46.0, 45.0) }
            })
            .await;

        assert_eq!(
            outcome,
            GateOutcome::TimedOut(WeatherReading::new(46.0, 45.0))
        );
        assert_eq!(polls, 6);
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_accepts_when_weather_improves() {
        let mut polls = 0;
        let outcome = gate(10)
            .await_acceptable(|| {
                polls += 1;
                let temp = if polls < 3 { 50.0 } else { 35.0 };
                async move { WeatherReading::new(temp, 45.0) }
            })
            .await;
        assert_eq!(outcome, GateOutcome::Accepted(WeatherReading::new(35.0, 45.0)));
        assert_eq!(polls, 3);
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_sensor_fault_axis_passes() {
        let outcome = gate(5)
            .await_acceptable(|| async {
                WeatherReading {
                    temperature_c: Err(SensorFault::new("no response")),
                    humidity_pct: Ok(45.0),
                }
            })
            .await;
        assert!(outcome.is_accepted());
        assert!(outcome.reading().has_fault());
        assert!(logs_contain("Weather sensor fault"));

        // The healthy axis still gates
        let outcome = gate(0)
            .await_acceptable(|| async {
                WeatherReading {
                    temperature_c: Err(SensorFault::new("no response")),
                    humidity_pct: Ok(90.0),
                }
            })
            .await;
        assert!(!outcome.is_accepted());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fully_failed_sensor_accepts() {
        let outcome = gate(5)
            .await_acceptable(|| async { WeatherReading::unavailable("i2c timeout") })
            .await;
        assert!(outcome.is_accepted());
        assert_eq!(outcome.reading().temperature(), None);
    }
}
