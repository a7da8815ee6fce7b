//! Derived panel metrics
//!
//! Pure functions over one phase (before or after activation) of a test.

/// Maximum output power estimate, W
pub fn output_power(voc: f64, isc: f64, fill_factor: f64) -> f64 {
    voc * isc * fill_factor
}

/// Measured power over the rated power scaled to plane-of-array irradiance
///
/// `None` without a usable irradiance reading or rated power.
pub fn performance_ratio(power_w: f64, rated_power_w: f64, gpoa: Option<f64>) -> Option<f64> {
    let gpoa = gpoa.filter(|g| *g > 0.0)?;
    if rated_power_w <= 0.0 {
        return None;
    }
    Some(power_w / (rated_power_w * gpoa / 1000.0))
}

/// Isc relative to the clean reference
pub fn soiling_index(isc: f64, reference_isc: Option<f64>) -> Option<f64> {
    let reference = reference_isc.filter(|r| *r != 0.0)?;
    Some(isc / reference)
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Metrics for one phase of one panel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanelMetrics {
    pub power_w: f64,
    pub performance_ratio: Option<f64>,
    pub soiling_index: Option<f64>,
}

impl PanelMetrics {
    pub fn compute(
        voc: f64,
        isc: f64,
        fill_factor: f64,
        rated_power_w: f64,
        gpoa: Option<f64>,
        reference_isc: Option<f64>,
    ) -> Self {
        let power_w = output_power(voc, isc, fill_factor);
        Self {
            power_w,
            performance_ratio: performance_ratio(power_w, rated_power_w, gpoa),
            soiling_index: soiling_index(isc, reference_isc),
        }
    }
}
