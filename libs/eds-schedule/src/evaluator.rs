//! Schedule evaluator
//!
//! Pure decision function: given the current civil time, a panel's schedule and
//! its activation record, is a test due right now?

use chrono::{NaiveDateTime, Timelike};
use tracing::debug;

use crate::calendar::CalendarDate;
use crate::solar::solar_noon_minute;
use crate::types::{ActivationRecord, ScheduleSpec, SiteLocation, Trigger, MINUTES_PER_DAY};

/// Fractional minute of day, `h*60 + m + s/60`
pub fn minute_of_day(now: &NaiveDateTime) -> f64 {
    f64::from(now.hour() * 60 + now.minute()) + f64::from(now.second()) / 60.0
}

/// Distance between two minutes of day on the 24 h circle
///
/// 1439 and 1 are two minutes apart, not 1438.
pub fn minute_distance(a: f64, b: f64) -> f64 {
    let d = (a - b).abs() % MINUTES_PER_DAY;
    d.min(MINUTES_PER_DAY - d)
}

/// Decides whether a panel's test is due
#[derive(Debug, Clone, Copy)]
pub struct ScheduleEvaluator {
    site: SiteLocation,
}

impl ScheduleEvaluator {
    pub fn new(site: SiteLocation) -> Self {
        Self { site }
    }

    pub fn site(&self) -> &SiteLocation {
        &self.site
    }

    /// Local solar noon for `date` as a minute of day
    pub fn solar_noon(&self, date: CalendarDate) -> f64 {
        solar_noon_minute(
            date.ordinal,
            self.site.longitude_deg,
            self.site.utc_offset_hours,
        )
    }

    /// Target minute of day of `trigger` on `date`, wrapped into 0..1440
    pub fn trigger_minute(&self, trigger: &Trigger, date: CalendarDate) -> f64 {
        let minute = match trigger {
            Trigger::FixedMinute(m) => f64::from(*m),
            Trigger::SolarNoon => self.solar_noon(date),
            Trigger::SolarOffset(offset) => self.solar_noon(date) + offset,
        };
        minute.rem_euclid(MINUTES_PER_DAY)
    }

    /// First trigger whose tolerance window contains `now`
    pub fn matching_trigger<'a>(
        &self,
        now: &NaiveDateTime,
        spec: &'a ScheduleSpec,
    ) -> Option<&'a Trigger> {
        let date = CalendarDate::from_naive(now.date());
        let current = minute_of_day(now);
        spec.triggers.iter().find(|trigger| {
            minute_distance(current, self.trigger_minute(trigger, date)) < spec.tolerance_minutes
        })
    }

    /// Whether enough calendar days have passed since the last activation
    pub fn frequency_satisfied(
        &self,
        today: CalendarDate,
        spec: &ScheduleSpec,
        record: &ActivationRecord,
    ) -> bool {
        let Some(last) = record.last_activated_date else {
            return true;
        };

        let elapsed = today.days_since(&last);
        if elapsed < 0 {
            // Last activation in the future: the clock was set back
            debug!(
                "Last activation {} is after today {}, treating as due",
                last, today
            );
            return true;
        }
        elapsed >= i64::from(spec.frequency_days)
    }

    /// Full due decision
    ///
    /// Already activated today wins over everything; otherwise a trigger
    /// window must contain `now` and the frequency constraint must hold.
    pub fn is_due(
        &self,
        now: &NaiveDateTime,
        spec: &ScheduleSpec,
        record: &ActivationRecord,
    ) -> bool {
        if record.activated_today {
            return false;
        }
        if self.matching_trigger(now, spec).is_none() {
            return false;
        }
        self.frequency_satisfied(CalendarDate::from_naive(now.date()), spec, record)
    }
}
