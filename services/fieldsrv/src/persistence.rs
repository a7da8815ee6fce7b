//! CSV measurement store on removable media

use async_trait::async_trait;
use errors::{FieldError, FieldResult};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::hardware::Persistence;
use crate::record::{MeasurementRecord, HEADER};

/// Appends records to one CSV file per record kind under `data_dir`
#[derive(Debug, Clone)]
pub struct CsvStore {
    data_dir: PathBuf,
}

impl CsvStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn append(&self, record: &MeasurementRecord) -> FieldResult<()> {
        let path = self.data_dir.join(record.kind.file_name());
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let needs_header = file.metadata()?.len() == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if needs_header {
            writer
                .write_record(HEADER)
                .map_err(|e| FieldError::Persistence(format!("{}: {}", path.display(), e)))?;
        }
        writer
            .write_record(record.csv_row())
            .map_err(|e| FieldError::Persistence(format!("{}: {}", path.display(), e)))?;
        writer.flush()?;

        debug!("Record {} {} -> {}", record.kind, record.panel, path.display());
        Ok(())
    }
}

#[async_trait]
impl Persistence for CsvStore {
    fn usb_available(&self) -> bool {
        self.data_dir.is_dir()
    }

    async fn persist(&mut self, record: &MeasurementRecord) -> FieldResult<()> {
        if !self.usb_available() {
            return Err(FieldError::StorageUnavailable(format!(
                "{} not mounted",
                self.data_dir.display()
            )));
        }
        self.append(record)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::record::{PhaseReading, RecordKind};
    use chrono::NaiveDate;
    use eds_schedule::PanelId;
    use tempfile::tempdir;

    fn record(kind: RecordKind, panel: &str) -> MeasurementRecord {
        MeasurementRecord {
            kind,
            timestamp: NaiveDate::from_ymd_opt(2024, 7, 4)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
            temperature_c: Some(28.0),
            humidity_pct: Some(45.0),
            gpoa: Some(880.0),
            panel: PanelId::eds(panel),
            before: PhaseReading {
                voc: 20.0,
                isc: 0.5,
                power_w: 7.5,
                performance_ratio: None,
                soiling_index: None,
            },
            after: None,
        }
    }

    #[tokio::test]
    async fn test_header_written_once() {
        let dir = tempdir().unwrap();
        let mut store = CsvStore::new(dir.path());
        assert!(store.usb_available());

        store.persist(&record(RecordKind::Scheduled, "eds1")).await.unwrap();
        store.persist(&record(RecordKind::Scheduled, "eds2")).await.unwrap();
        store.persist(&record(RecordKind::Manual, "eds1")).await.unwrap();

        let text = std::fs::read_to_string(dir.path().join("eds_data.csv")).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Date,Time,Temperature(C)"));
        assert!(lines[1].contains(",eds1,"));
        assert!(lines[2].contains(",eds2,"));

        let manual = std::fs::read_to_string(dir.path().join("manual_data.csv")).unwrap();
        assert_eq!(manual.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_missing_media_is_unavailable() {
        let dir = tempdir().unwrap();
        let mut store = CsvStore::new(dir.path().join("usb0"));
        assert!(!store.usb_available());

        let err = store
            .persist(&record(RecordKind::Noon, "eds1"))
            .await
            .unwrap_err();
        assert!(matches!(err, FieldError::StorageUnavailable(_)));
    }
}
