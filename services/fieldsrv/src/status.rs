//! Read-only reports for the `check` and `ledger show` commands
//!
//! Nothing here writes the ledger; a missing or unreadable file is reported
//! as such and left for the loop to recover.

use chrono::NaiveDateTime;
use eds_schedule::{
    minute_of_day, ActivationLedger, ActivationRecord, CalendarDate, LedgerLoadStatus,
    ScheduleEvaluator, MINUTES_PER_DAY,
};
use errors::FieldResult;
use std::io::Write;

use crate::config::Config;

/// Today's schedule for every panel, as seen at `now`
pub fn write_schedule(
    config: &Config,
    now: NaiveDateTime,
    out: &mut impl Write,
) -> FieldResult<()> {
    let evaluator = ScheduleEvaluator::new(config.site.location());
    let today = CalendarDate::from_naive(now.date());
    let (ledger, status) =
        ActivationLedger::inspect(&config.storage.ledger_path, &config.eds_panel_ids());

    writeln!(out, "Configuration OK")?;
    writeln!(
        out,
        "Today {} (day {}), now {}",
        today,
        today.ordinal,
        format_minute(minute_of_day(&now))
    )?;
    writeln!(out, "Solar noon {}", format_minute(evaluator.solar_noon(today)))?;
    writeln!(out, "Ledger {} ({})", ledger.path().display(), describe(&status))?;

    for panel in &config.panels {
        let kind = panel.kind.to_string();
        let Some(spec) = &panel.schedule else {
            writeln!(out, "  {:<8} {:<4} measured only", panel.id, kind)?;
            continue;
        };
        let times: Vec<String> = spec
            .triggers
            .iter()
            .map(|t| format!("{} = {}", t, format_minute(evaluator.trigger_minute(t, today))))
            .collect();
        let record = ledger.record(&panel.id);
        writeln!(
            out,
            "  {:<8} {:<4} every {} day(s) +/-{} min [{}] last {} due now: {}",
            panel.id,
            kind,
            spec.frequency_days,
            spec.tolerance_minutes,
            times.join(", "),
            last_activated(&record),
            evaluator.is_due(&now, spec, &record)
        )?;
    }
    Ok(())
}

/// Every ledger record with the noon pass date
pub fn write_ledger(config: &Config, out: &mut impl Write) -> FieldResult<()> {
    let (ledger, status) =
        ActivationLedger::inspect(&config.storage.ledger_path, &config.eds_panel_ids());

    writeln!(out, "{} ({})", ledger.path().display(), describe(&status))?;
    if let Some(date) = ledger.noon_pass_date() {
        writeln!(out, "noon pass: {}", date)?;
    }
    for (id, record) in ledger.records() {
        writeln!(
            out,
            "  {:<8} last {:<10} today {}",
            id,
            last_activated(record),
            record.activated_today
        )?;
    }
    Ok(())
}

fn describe(status: &LedgerLoadStatus) -> String {
    match status {
        LedgerLoadStatus::Loaded => "loaded".to_string(),
        LedgerLoadStatus::Created => "missing, created on first run".to_string(),
        LedgerLoadStatus::Recovered(reason) => {
            format!("unreadable, rebuilt on first run: {}", reason)
        },
    }
}

fn last_activated(record: &ActivationRecord) -> String {
    record
        .last_activated_date
        .map(|d| d.to_string())
        .unwrap_or_else(|| "never".to_string())
}

/// `HH:MM:SS` for a minute of day
pub fn format_minute(minute: f64) -> String {
    let total = (minute.rem_euclid(MINUTES_PER_DAY) * 60.0).round() as u32 % 86_400;
    format!("{:02}:{:02}:{:02}", total / 3600, (total / 60) % 60, total % 60)
}
