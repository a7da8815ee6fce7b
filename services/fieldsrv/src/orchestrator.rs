//! Orchestration loop
//!
//! A single task owns every collaborator, the ledger and the error set. Each
//! tick walks the phases in order:
//!
//! 1. GPIO reset (release every relay)
//! 2. clock check, with fallback to the last good reading
//! 3. day roll of the ledger
//! 4. day segment check; the next two phases run in daylight only
//! 5. noon measurement pass, once per day near solar noon
//! 6. scheduled test pass for every due EDS panel
//! 7. manual override, honoured day and night
//! 8. flush of buffered records to removable media
//! 9. fault report (heartbeat and fault lights)
//!
//! Collaborator failures become fault tokens inside the tick. Anything that
//! still escapes (a ledger that cannot be written) is handled by `step`.

use chrono::NaiveDateTime;
use eds_schedule::{
    minute_distance, minute_of_day, ActivationLedger, CalendarDate, LedgerLoadStatus,
    ScheduleEvaluator, SensorFault, WeatherGate, WeatherReading,
};
use errors::{FieldError, FieldErrorTrait, FieldResult};
use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Level};

use crate::config::{Config, PanelConfig};
use crate::faults::{ErrorSet, FailSafeSignal, FaultToken};
use crate::hardware::{
    Actuator, Clock, FieldHardware, Indicator, ManualSwitch, PanelMeasurement, Persistence,
    Sensors,
};
use crate::metrics::{mean, PanelMetrics};
use crate::record::{MeasurementRecord, PhaseReading, RecordKind};

/// Switch poll spacing while a manual activation is held
pub const MANUAL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// What one tick did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Time the tick worked with, `None` when no time was available
    pub now: Option<NaiveDateTime>,
    pub daylight: bool,
    pub noon_pass: bool,
    /// EDS panels whose scheduled test completed
    pub activated: Vec<String>,
    /// Due panels skipped because the weather never became acceptable
    pub skipped: Vec<String>,
    /// Due panels whose test failed
    pub failed: Vec<String>,
    pub manual: bool,
    /// Set when an error escaped the tick body
    pub fatal: Option<String>,
}

/// Mutable loop state carried between ticks
#[derive(Debug, Default)]
pub struct OrchestrationState {
    pub errors: ErrorSet,
    pub signal: FailSafeSignal,
    /// Last good clock reading and the monotonic instant it was taken
    pub last_good_time: Option<(NaiveDateTime, Instant)>,
    /// Records not yet on removable media
    pub pending: VecDeque<MeasurementRecord>,
}

#[derive(Debug, Error)]
enum TestFailure {
    #[error("measurement of {panel} failed: {fault}")]
    Measurement { panel: String, fault: SensorFault },
    #[error("activation failed: {0}")]
    Actuator(FieldError),
}

pub struct OrchestrationLoop {
    config: Config,
    evaluator: ScheduleEvaluator,
    gate: WeatherGate,
    ledger: ActivationLedger,
    sensors: Mutex<Box<dyn Sensors>>,
    actuator: Box<dyn Actuator>,
    clock: Box<dyn Clock>,
    persistence: Box<dyn Persistence>,
    switch: Box<dyn ManualSwitch>,
    indicator: Box<dyn Indicator>,
    state: OrchestrationState,
}

impl OrchestrationLoop {
    pub fn new(config: Config, hardware: FieldHardware, ledger: ActivationLedger) -> Self {
        let evaluator = ScheduleEvaluator::new(config.site.location());
        let gate = WeatherGate::new(config.weather.limits(), config.weather.timeout)
            .with_poll_interval(config.weather.poll_interval);

        Self {
            config,
            evaluator,
            gate,
            ledger,
            sensors: Mutex::new(hardware.sensors),
            actuator: hardware.actuator,
            clock: hardware.clock,
            persistence: hardware.persistence,
            switch: hardware.switch,
            indicator: hardware.indicator,
            state: OrchestrationState::default(),
        }
    }

    /// Load the ledger named by the configuration and build the loop
    pub fn open(config: Config, hardware: FieldHardware) -> FieldResult<Self> {
        let (ledger, status) =
            ActivationLedger::load(&config.storage.ledger_path, &config.eds_panel_ids())?;
        match &status {
            LedgerLoadStatus::Loaded => info!("Ledger loaded from {}", ledger.path().display()),
            LedgerLoadStatus::Created => info!("Ledger created at {}", ledger.path().display()),
            LedgerLoadStatus::Recovered(reason) => warn!(
                "Ledger {} rebuilt, every panel treated as never activated: {}",
                ledger.path().display(),
                reason
            ),
        }
        Ok(Self::new(config, hardware, ledger))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn ledger(&self) -> &ActivationLedger {
        &self.ledger
    }

    pub fn errors(&self) -> &ErrorSet {
        &self.state.errors
    }

    pub fn pending_records(&self) -> usize {
        self.state.pending.len()
    }

    /// Tick until `token` is cancelled
    ///
    /// A tick in flight always finishes. With `loop.halt_on_fatal` an escaped
    /// fatal error (ledger write, internal) is returned instead of being flagged.
    pub async fn run(&mut self, token: CancellationToken) -> FieldResult<()> {
        info!(
            "Orchestration loop started: {} panels, tick {:?}",
            self.config.panels.len(),
            self.config.run_loop.tick_interval
        );

        let result = loop {
            if token.is_cancelled() {
                break Ok(());
            }
            if let Err(e) = self.step().await {
                break Err(e);
            }
            tokio::select! {
                _ = token.cancelled() => break Ok(()),
                _ = tokio::time::sleep(self.config.run_loop.tick_interval) => {},
            }
        };

        if let Err(e) = self.actuator.release_all().await {
            warn!("Relay release on shutdown failed: {}", e);
        }
        info!("Orchestration loop stopped");
        result
    }

    /// One tick plus fatal handling and the fault report
    pub async fn step(&mut self) -> FieldResult<TickReport> {
        let mut report = TickReport::default();
        let outcome = self.tick(&mut report).await;

        let escaped = match outcome {
            Ok(()) => {
                self.state.errors.remove(&FaultToken::FatalCore);
                None
            },
            Err(e) => {
                if e.log_level() == Level::ERROR {
                    error!("FATAL-CORE: {} [{}]", e, e.error_code());
                } else {
                    warn!("FATAL-CORE: {} [{}]", e, e.error_code());
                }
                report.fatal = Some(e.to_string());
                self.state.errors.insert(FaultToken::FatalCore);
                Some(e)
            },
        };

        self.report_faults();

        match escaped {
            Some(e) if halts(self.config.run_loop.halt_on_fatal, &e) => Err(e),
            _ => Ok(report),
        }
    }

    async fn tick(&mut self, report: &mut TickReport) -> FieldResult<()> {
        self.reset_gpio().await;

        let now = self.current_time().await;
        report.now = now;

        if let Some(now) = now {
            let today = CalendarDate::from_naive(now.date());
            self.ledger.roll_day(today)?;

            report.daylight = self.config.site.daylight.contains(minute_of_day(&now));
            if report.daylight {
                if self.noon_window(&now) && !self.ledger.noon_pass_done(today) {
                    self.noon_pass(now).await?;
                    report.noon_pass = true;
                }
                self.scheduled_pass(now, report).await?;
            } else {
                debug!("Night at {}, scheduled work skipped", now.time());
            }
        } else {
            debug!("No usable time, time-dependent phases skipped");
        }

        report.manual = self.manual_override(now).await;
        self.flush_pending().await;
        Ok(())
    }

    async fn reset_gpio(&mut self) {
        match self.actuator.release_all().await {
            Ok(()) => {
                self.state.errors.remove(&FaultToken::GpioCleanup);
            },
            Err(e) => {
                warn!("GPIO reset failed: {}", e);
                self.state.errors.insert(FaultToken::GpioCleanup);
            },
        }
    }

    /// Clock reading, or the last good one advanced by monotonic time
    async fn current_time(&mut self) -> Option<NaiveDateTime> {
        match self.clock.now().await {
            Ok(now) => {
                self.state.last_good_time = Some((now, Instant::now()));
                self.state.errors.remove(&FaultToken::SensorRtc);
                Some(now)
            },
            Err(e) => {
                warn!("Clock read failed: {}", e);
                self.state.errors.insert(FaultToken::SensorRtc);
                self.state.last_good_time.map(|(time, at)| {
                    let elapsed = chrono::Duration::from_std(at.elapsed())
                        .unwrap_or_else(|_| chrono::Duration::zero());
                    time + elapsed
                })
            },
        }
    }

    fn noon_window(&self, now: &NaiveDateTime) -> bool {
        let noon = self
            .evaluator
            .solar_noon(CalendarDate::from_naive(now.date()));
        minute_distance(minute_of_day(now), noon) < self.config.site.noon_tolerance_minutes
    }

    async fn read_weather(&mut self) -> WeatherReading {
        let reading = read_weather_from(&self.sensors).await;
        self.state
            .errors
            .set(FaultToken::SensorWeather, reading.has_fault());
        reading
    }

    async fn read_irradiance(&mut self) -> Option<f64> {
        match self.sensors.get_mut().read_irradiance().await {
            Ok(gpoa) => {
                self.state.errors.remove(&FaultToken::SensorIrradiance);
                Some(gpoa)
            },
            Err(fault) => {
                warn!("Irradiance sensor fault: {}", fault);
                self.state.errors.insert(FaultToken::SensorIrradiance);
                None
            },
        }
    }

    async fn measure(&mut self, panel: &PanelConfig) -> Result<PanelMeasurement, TestFailure> {
        self.sensors
            .get_mut()
            .measure_panel(&panel.panel_id())
            .await
            .map_err(|fault| TestFailure::Measurement {
                panel: panel.id.clone(),
                fault,
            })
    }

    /// Measurement-only pass over every panel, then the charger activation
    async fn noon_pass(&mut self, now: NaiveDateTime) -> FieldResult<()> {
        let today = CalendarDate::from_naive(now.date());
        info!("Noon measurement pass for {}", today);

        let weather = self.read_weather().await;
        let gpoa = self.read_irradiance().await;

        let panels = self.config.panels.clone();
        let mut measured = Vec::with_capacity(panels.len());
        for panel in &panels {
            match self.measure(panel).await {
                Ok(m) => {
                    self.state.errors.remove(&FaultToken::test(&panel.id));
                    measured.push((panel, m));
                },
                Err(e) => {
                    warn!("Noon pass: {}", e);
                    self.state.errors.insert(FaultToken::test(&panel.id));
                },
            }
        }

        let control_isc: Vec<f64> = measured
            .iter()
            .filter(|(p, _)| !p.panel_id().is_eds())
            .map(|(_, m)| m.isc)
            .collect();
        let reference = mean(&control_isc);

        for (panel, m) in &measured {
            let before = self.phase(panel, *m, gpoa, reference);
            self.enqueue(MeasurementRecord {
                kind: RecordKind::Noon,
                timestamp: now,
                temperature_c: weather.temperature(),
                humidity_pct: weather.humidity(),
                gpoa,
                panel: panel.panel_id(),
                before,
                after: None,
            });
        }

        self.ledger.mark_noon_pass(today)?;

        if let Some(charger) = self.config.site.charger_panel.clone() {
            if let Some(panel) = self.config.panel(&charger).map(PanelConfig::panel_id) {
                info!("Charging via {}", panel);
                self.state.signal.hold_active(self.indicator.as_mut());
                let duration = self.config.test.activation_duration;
                match self.actuator.activate(&panel, duration).await {
                    Ok(()) => {
                        self.state.errors.remove(&FaultToken::actuator(&charger));
                    },
                    Err(e) => {
                        warn!("Charger activation failed: {}", e);
                        self.state.errors.insert(FaultToken::actuator(&charger));
                    },
                }
            }
        }
        Ok(())
    }

    async fn scheduled_pass(
        &mut self,
        now: NaiveDateTime,
        report: &mut TickReport,
    ) -> FieldResult<()> {
        let today = CalendarDate::from_naive(now.date());
        let due: Vec<PanelConfig> = self
            .config
            .eds_panels()
            .filter(|panel| {
                panel.schedule.as_ref().is_some_and(|spec| {
                    self.evaluator
                        .is_due(&now, spec, &self.ledger.record(&panel.id))
                })
            })
            .cloned()
            .collect();

        for panel in due {
            info!("Panel {} due at {}", panel.id, now.time());

            let outcome = self
                .gate
                .await_acceptable(|| read_weather_from(&self.sensors))
                .await;
            self.state
                .errors
                .set(FaultToken::SensorWeather, outcome.reading().has_fault());
            if !outcome.is_accepted() {
                warn!("Test of {} skipped, weather not acceptable", panel.id);
                report.skipped.push(panel.id.clone());
                continue;
            }
            let weather = outcome.reading().clone();

            // The gate may have waited a long time
            let started = self.current_time().await.unwrap_or(now);

            match self.run_test(&panel, started, &weather).await {
                Ok(records) => {
                    for record in records {
                        self.enqueue(record);
                    }
                    // Counted for the day roll_day observed, even after a wait past midnight
                    self.ledger.mark_activated(&panel.id, today)?;
                    self.state.errors.remove(&FaultToken::test(&panel.id));
                    self.state.errors.remove(&FaultToken::actuator(&panel.id));
                    info!("Test of {} complete", panel.id);
                    report.activated.push(panel.id.clone());
                },
                Err(TestFailure::Actuator(e)) => {
                    warn!("Test of {} aborted: {}", panel.id, e);
                    self.state.errors.insert(FaultToken::actuator(&panel.id));
                    report.failed.push(panel.id.clone());
                },
                Err(e) => {
                    warn!("Test of {} aborted: {}", panel.id, e);
                    self.state.errors.insert(FaultToken::test(&panel.id));
                    report.failed.push(panel.id.clone());
                },
            }
        }
        Ok(())
    }

    /// Before/activate/after sequence for one EDS panel
    async fn run_test(
        &mut self,
        panel: &PanelConfig,
        started: NaiveDateTime,
        weather: &WeatherReading,
    ) -> Result<Vec<MeasurementRecord>, TestFailure> {
        let controls: Vec<PanelConfig> = self.config.control_panels().cloned().collect();

        let mut controls_before = Vec::with_capacity(controls.len());
        for control in &controls {
            controls_before.push(self.measure(control).await?);
        }
        let eds_before = self.measure(panel).await?;

        info!(
            "Activating {} for {:?}",
            panel.id, self.config.test.activation_duration
        );
        self.state.signal.hold_active(self.indicator.as_mut());
        self.actuator
            .activate(&panel.panel_id(), self.config.test.activation_duration)
            .await
            .map_err(TestFailure::Actuator)?;

        let eds_after = self.measure(panel).await?;
        let mut controls_after = Vec::with_capacity(controls.len());
        for control in &controls {
            controls_after.push(self.measure(control).await?);
        }

        let gpoa = self.read_irradiance().await;
        let reference_before = mean(&controls_before.iter().map(|m| m.isc).collect::<Vec<_>>());
        let reference_after = mean(&controls_after.iter().map(|m| m.isc).collect::<Vec<_>>());

        let record = |target: &PanelConfig, before: PhaseReading, after: PhaseReading| {
            MeasurementRecord {
                kind: RecordKind::Scheduled,
                timestamp: started,
                temperature_c: weather.temperature(),
                humidity_pct: weather.humidity(),
                gpoa,
                panel: target.panel_id(),
                before,
                after: Some(after),
            }
        };

        let mut records = Vec::with_capacity(controls.len() + 1);
        records.push(record(
            panel,
            self.phase(panel, eds_before, gpoa, reference_before),
            self.phase(panel, eds_after, gpoa, reference_after),
        ));
        for ((control, before), after) in controls.iter().zip(controls_before).zip(controls_after) {
            records.push(record(
                control,
                self.phase(control, before, gpoa, reference_before),
                self.phase(control, after, gpoa, reference_after),
            ));
        }
        Ok(records)
    }

    fn phase(
        &self,
        panel: &PanelConfig,
        m: PanelMeasurement,
        gpoa: Option<f64>,
        reference_isc: Option<f64>,
    ) -> PhaseReading {
        let metrics = PanelMetrics::compute(
            m.voc,
            m.isc,
            self.config.test.fill_factor,
            panel.rated_power_w,
            gpoa,
            reference_isc,
        );
        PhaseReading {
            voc: m.voc,
            isc: m.isc,
            power_w: metrics.power_w,
            performance_ratio: metrics.performance_ratio,
            soiling_index: metrics.soiling_index,
        }
    }

    /// Returns true when a manual test completed this tick
    async fn manual_override(&mut self, now: Option<NaiveDateTime>) -> bool {
        if !self.switch.take_rising_edge() || !self.switch.is_engaged() {
            return false;
        }
        let Some(panel) = self.config.panel(&self.config.test.manual_panel).cloned() else {
            return false;
        };
        info!("Manual test requested on {}", panel.id);

        let result = match now {
            Some(now) => self.manual_test(&panel, now).await,
            None => Err(FieldError::Clock("no time available for the record".to_string())),
        };
        match result {
            Ok(record) => {
                self.enqueue(record);
                self.state.errors.remove(&FaultToken::TestManual);
                info!("Manual test of {} complete", panel.id);
                true
            },
            Err(e) => {
                warn!("Manual test of {} failed: {}", panel.id, e);
                self.state.errors.insert(FaultToken::TestManual);
                false
            },
        }
    }

    async fn manual_test(
        &mut self,
        panel: &PanelConfig,
        now: NaiveDateTime,
    ) -> FieldResult<MeasurementRecord> {
        let sensor_err = |e: TestFailure| FieldError::sensor(panel.id.clone(), e.to_string());
        let id = panel.panel_id();

        let weather = self.read_weather().await;
        let gpoa = self.read_irradiance().await;
        let before = self.measure(panel).await.map_err(sensor_err)?;

        self.state.signal.hold_active(self.indicator.as_mut());
        let energized = self.actuator.energize(&id).await;
        if energized.is_ok() {
            let deadline = Instant::now() + self.config.test.manual_time_limit;
            loop {
                tokio::time::sleep(MANUAL_POLL_INTERVAL).await;
                if self.switch.take_rising_edge() || !self.switch.is_engaged() {
                    debug!("Manual switch released");
                    break;
                }
                if Instant::now() >= deadline {
                    info!(
                        "Manual activation reached its {:?} limit",
                        self.config.test.manual_time_limit
                    );
                    break;
                }
            }
        }
        let released = self.actuator.deenergize(&id).await;
        energized?;
        released?;

        let after = self.measure(panel).await.map_err(sensor_err)?;
        Ok(MeasurementRecord {
            kind: RecordKind::Manual,
            timestamp: now,
            temperature_c: weather.temperature(),
            humidity_pct: weather.humidity(),
            gpoa,
            panel: id,
            before: self.phase(panel, before, gpoa, None),
            after: Some(self.phase(panel, after, gpoa, None)),
        })
    }

    fn enqueue(&mut self, record: MeasurementRecord) {
        let pending = &mut self.state.pending;
        if pending.len() >= self.config.storage.pending_capacity {
            if let Some(dropped) = pending.pop_front() {
                warn!(
                    "Record buffer full, dropped {} record for {} from {}",
                    dropped.kind, dropped.panel, dropped.timestamp
                );
            }
        }
        pending.push_back(record);
    }

    async fn flush_pending(&mut self) {
        if !self.persistence.usb_available() {
            if self.state.errors.insert(FaultToken::StorageUsb) || !self.state.pending.is_empty() {
                warn!(
                    "Removable storage missing, {} records held",
                    self.state.pending.len()
                );
            }
            return;
        }

        let mut written = 0usize;
        while let Some(record) = self.state.pending.front() {
            if let Err(e) = self.persistence.persist(record).await {
                warn!("Record write failed: {}", e);
                self.state.errors.insert(FaultToken::StorageUsb);
                return;
            }
            self.state.pending.pop_front();
            written += 1;
        }
        if written > 0 {
            debug!("{} records written", written);
        }
        self.state.errors.remove(&FaultToken::StorageUsb);
    }

    fn report_faults(&mut self) {
        self.state
            .signal
            .drive(&self.state.errors, self.indicator.as_mut());
        if !self.state.errors.is_empty() {
            warn!("Active faults: {}", self.state.errors);
        }
    }
}

async fn read_weather_from(sensors: &Mutex<Box<dyn Sensors>>) -> WeatherReading {
    match sensors.lock().await.read_weather().await {
        Ok((temperature_c, humidity_pct)) => WeatherReading::new(temperature_c, humidity_pct),
        Err(fault) => WeatherReading::unavailable(fault.0),
    }
}

/// Only fatal categories stop the loop; anything else stays a flagged tick
fn halts(halt_on_fatal: bool, error: &FieldError) -> bool {
    halt_on_fatal && error.is_fatal()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_halts_only_on_fatal_errors() {
        let ledger_write = FieldError::LedgerWrite("rename failed".into());
        let corrupt = FieldError::LedgerCorrupt("bad json".into());
        let sensor = FieldError::sensor("weather", "crc");

        assert!(halts(true, &ledger_write));
        assert!(!halts(false, &ledger_write));
        assert!(!halts(true, &corrupt));
        assert!(!halts(true, &sensor));
    }
}
