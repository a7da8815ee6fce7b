//! Solar time
//!
//! Equation-of-time approximation for local solar noon. Pure functions, no
//! error conditions; callers supply day-of-year from [`crate::calendar`].

/// Civil noon, minutes after midnight
const CIVIL_NOON_MINUTE: f64 = 720.0;

/// Offset of local solar noon from civil noon, minutes
///
/// ```text
/// B      = (day_of_year - 81) * 360 / 365          degrees
/// C      = 9.87 sin 2B - 7.53 cos B - 1.58 sin B   minutes
/// offset = 4 * (15 * utc_offset_hours - longitude_deg) + C
/// ```
pub fn solar_noon_offset_minutes(day_of_year: u16, longitude_deg: f64, utc_offset_hours: i32) -> f64 {
    let b = ((f64::from(day_of_year) - 81.0) * 360.0 / 365.0).to_radians();
    let equation_of_time = 9.87 * (2.0 * b).sin() - 7.53 * b.cos() - 1.58 * b.sin();
    4.0 * (15.0 * f64::from(utc_offset_hours) - longitude_deg) + equation_of_time
}

/// Local solar noon as a civil minute of day
pub fn solar_noon_minute(day_of_year: u16, longitude_deg: f64, utc_offset_hours: i32) -> f64 {
    CIVIL_NOON_MINUTE + solar_noon_offset_minutes(day_of_year, longitude_deg, utc_offset_hours)
}
