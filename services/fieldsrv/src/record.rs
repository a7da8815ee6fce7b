//! Measurement records

use chrono::NaiveDateTime;
use eds_schedule::PanelId;
use std::fmt;

/// Which test produced a record; selects the CSV file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Scheduled,
    Noon,
    Manual,
}

impl RecordKind {
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Scheduled => "eds_data.csv",
            Self::Noon => "noon_data.csv",
            Self::Manual => "manual_data.csv",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scheduled => write!(f, "scheduled"),
            Self::Noon => write!(f, "noon"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// One phase (before or after activation) of a panel measurement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseReading {
    pub voc: f64,
    pub isc: f64,
    pub power_w: f64,
    pub performance_ratio: Option<f64>,
    pub soiling_index: Option<f64>,
}

/// CSV header shared by every record file
pub const HEADER: [&str; 16] = [
    "Date",
    "Time",
    "Temperature(C)",
    "Humidity(%)",
    "GPOA(W/M2)",
    "EDS/CTRL(#)",
    "Voc_Before(V)",
    "Voc_After(V)",
    "Isc_Before(A)",
    "Isc_After(A)",
    "Pout_Before(W)",
    "Pout_After(W)",
    "PR_Before",
    "PR_After",
    "SI_Before",
    "SI_After",
];

#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementRecord {
    pub kind: RecordKind,
    pub timestamp: NaiveDateTime,
    pub temperature_c: Option<f64>,
    pub humidity_pct: Option<f64>,
    pub gpoa: Option<f64>,
    pub panel: PanelId,
    pub before: PhaseReading,
    /// Absent for measurement-only passes
    pub after: Option<PhaseReading>,
}

fn cell(value: Option<f64>) -> String {
    value.map(|v| format!("{:.4}", v)).unwrap_or_default()
}

impl MeasurementRecord {
    /// Row in `HEADER` order; missing values are empty cells
    pub fn csv_row(&self) -> Vec<String> {
        let after = self.after.as_ref();
        vec![
            self.timestamp.format("%m/%d/%Y").to_string(),
            self.timestamp.format("%H:%M:%S").to_string(),
            cell(self.temperature_c),
            cell(self.humidity_pct),
            cell(self.gpoa),
            self.panel.to_string(),
            cell(Some(self.before.voc)),
            cell(after.map(|a| a.voc)),
            cell(Some(self.before.isc)),
            cell(after.map(|a| a.isc)),
            cell(Some(self.before.power_w)),
            cell(after.map(|a| a.power_w)),
            cell(self.before.performance_ratio),
            cell(after.and_then(|a| a.performance_ratio)),
            cell(self.before.soiling_index),
            cell(after.and_then(|a| a.soiling_index)),
        ]
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn phase(voc: f64) -> PhaseReading {
        PhaseReading {
            voc,
            isc: 0.5,
            power_w: voc * 0.5 * 0.75,
            performance_ratio: Some(0.8),
            soiling_index: None,
        }
    }

    #[test]
    fn test_row_layout() {
        let record = MeasurementRecord {
            kind: RecordKind::Scheduled,
            timestamp: NaiveDate::from_ymd_opt(2024, 3, 5)
                .unwrap()
                .and_hms_opt(12, 10, 3)
                .unwrap(),
            temperature_c: Some(25.0),
            humidity_pct: None,
            gpoa: Some(950.0),
            panel: PanelId::eds("eds3"),
            before: phase(20.0),
            after: Some(phase(21.0)),
        };
        let row = record.csv_row();

        assert_eq!(row.len(), HEADER.len());
        assert_eq!(row[0], "03/05/2024");
        assert_eq!(row[1], "12:10:03");
        assert_eq!(row[2], "25.0000");
        assert_eq!(row[3], "");
        assert_eq!(row[5], "eds3");
        assert_eq!(row[6], "20.0000");
        assert_eq!(row[7], "21.0000");
        assert_eq!(row[14], "");
    }

    #[test]
    fn test_measurement_only_row_leaves_after_empty() {
        let record = MeasurementRecord {
            kind: RecordKind::Noon,
            timestamp: NaiveDate::from_ymd_opt(2024, 6, 1)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
            temperature_c: None,
            humidity_pct: None,
            gpoa: None,
            panel: PanelId::control("ctrl1"),
            before: phase(19.5),
            after: None,
        };
        let row = record.csv_row();
        for index in [7, 9, 11, 13, 15] {
            assert_eq!(row[index], "", "column {}", HEADER[index]);
        }
        assert_eq!(RecordKind::Noon.file_name(), "noon_data.csv");
    }
}
