//! Activation ledger
//!
//! Durable per-panel activation state. Load once, mutate in memory, write the
//! whole file through on every mutation. Writes go to a temp file in the same
//! directory which is synced and renamed over the target, so a reader sees
//! either the previous or the new ledger, never a partial one.
//!
//! A missing or unreadable file yields a fresh ledger where every panel is
//! never-activated, and that fresh ledger is written immediately. `inspect`
//! gives the same view for read-only tools without writing anything.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::calendar::{days_in_year, CalendarDate};
use crate::error::{Result, ScheduleError};
use crate::types::ActivationRecord;

/// Current on-disk format version
pub const LEDGER_VERSION: u32 = 1;

fn default_version() -> u32 {
    LEDGER_VERSION
}

/// On-disk layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct LedgerFile {
    #[serde(default = "default_version")]
    version: u32,

    /// Last calendar day seen by `roll_day`
    #[serde(default)]
    observed_date: Option<CalendarDate>,

    /// Day the noon measurement pass last ran
    #[serde(default)]
    noon_pass_date: Option<CalendarDate>,

    #[serde(default)]
    panels: BTreeMap<String, ActivationRecord>,
}

impl LedgerFile {
    fn fresh<'a>(panel_ids: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            version: LEDGER_VERSION,
            observed_date: None,
            noon_pass_date: None,
            panels: panel_ids
                .into_iter()
                .map(|id| (id.to_string(), ActivationRecord::default()))
                .collect(),
        }
    }

    fn encode(&self) -> Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let file: LedgerFile =
            serde_json::from_slice(bytes).map_err(|e| ScheduleError::Corrupt(e.to_string()))?;

        if file.version > LEDGER_VERSION {
            return Err(ScheduleError::UnsupportedVersion(file.version));
        }

        let dates = file
            .panels
            .values()
            .filter_map(|r| r.last_activated_date)
            .chain(file.observed_date)
            .chain(file.noon_pass_date);
        for date in dates {
            if date.ordinal == 0 || date.ordinal > days_in_year(date.year) {
                return Err(ScheduleError::Corrupt(format!(
                    "day {} out of range for {}",
                    date.ordinal, date.year
                )));
            }
        }

        Ok(file)
    }
}

/// How the ledger came into being at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerLoadStatus {
    /// Existing file decoded
    Loaded,
    /// No file; a fresh one was written
    Created,
    /// File unreadable; replaced by a fresh one
    Recovered(String),
}

/// Write-through activation ledger, single owner
#[derive(Debug)]
pub struct ActivationLedger {
    path: PathBuf,
    state: LedgerFile,
}

impl ActivationLedger {
    /// Load the ledger at `path`, creating or recovering it as needed
    ///
    /// Every id in `panel_ids` is guaranteed a record afterwards. Only a failed
    /// write of the fresh ledger is an error.
    pub fn load(path: impl AsRef<Path>, panel_ids: &[&str]) -> Result<(Self, LedgerLoadStatus)> {
        let (ledger, status, dirty) = Self::read(path.as_ref(), panel_ids);
        if dirty {
            ledger.write()?;
        }
        Ok((ledger, status))
    }

    /// Same view of the ledger as [`ActivationLedger::load`], file left untouched
    ///
    /// A missing or unreadable file shows up in the status only.
    pub fn inspect(path: impl AsRef<Path>, panel_ids: &[&str]) -> (Self, LedgerLoadStatus) {
        let (ledger, status, _) = Self::read(path.as_ref(), panel_ids);
        (ledger, status)
    }

    /// Decode or rebuild the in-memory ledger; the flag says it differs from disk
    fn read(path: &Path, panel_ids: &[&str]) -> (Self, LedgerLoadStatus, bool) {
        let fresh = || LedgerFile::fresh(panel_ids.iter().copied());

        let (state, status) = match fs::read(path) {
            Ok(bytes) => match LedgerFile::decode(&bytes) {
                Ok(state) => (state, LedgerLoadStatus::Loaded),
                Err(e) => {
                    warn!(
                        "Ledger {} unreadable ({}), starting from a fresh ledger",
                        path.display(),
                        e
                    );
                    (fresh(), LedgerLoadStatus::Recovered(e.to_string()))
                },
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No ledger at {}", path.display());
                (fresh(), LedgerLoadStatus::Created)
            },
            Err(e) => {
                warn!("Cannot read ledger {}: {}", path.display(), e);
                (fresh(), LedgerLoadStatus::Recovered(e.to_string()))
            },
        };

        let mut ledger = Self {
            path: path.to_path_buf(),
            state,
        };
        let mut dirty = status != LedgerLoadStatus::Loaded;

        for id in panel_ids {
            if !ledger.state.panels.contains_key(*id) {
                debug!("Ledger has no record for {}, adding one", id);
                ledger
                    .state
                    .panels
                    .insert(id.to_string(), ActivationRecord::default());
                dirty = true;
            }
        }
        if ledger.state.version < LEDGER_VERSION {
            ledger.state.version = LEDGER_VERSION;
            dirty = true;
        }

        (ledger, status, dirty)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record for `panel_id`; unknown panels read as never-activated
    pub fn record(&self, panel_id: &str) -> ActivationRecord {
        self.state
            .panels
            .get(panel_id)
            .copied()
            .unwrap_or_default()
    }

    pub fn records(&self) -> impl Iterator<Item = (&str, &ActivationRecord)> {
        self.state.panels.iter().map(|(id, r)| (id.as_str(), r))
    }

    pub fn observed_date(&self) -> Option<CalendarDate> {
        self.state.observed_date
    }

    pub fn noon_pass_date(&self) -> Option<CalendarDate> {
        self.state.noon_pass_date
    }

    /// Record a successful scheduled activation and write through
    ///
    /// The in-memory record is updated even when the write fails.
    pub fn mark_activated(&mut self, panel_id: &str, date: CalendarDate) -> Result<()> {
        let record = self.state.panels.entry(panel_id.to_string()).or_default();
        record.last_activated_date = Some(date);
        record.activated_today = true;
        info!("Ledger: {} activated on {}", panel_id, date);
        self.write()
    }

    /// Observe the current calendar day
    ///
    /// On a change of day every `activated_today` flag is cleared and the
    /// ledger written. Returns whether the day changed.
    pub fn roll_day(&mut self, today: CalendarDate) -> Result<bool> {
        match self.state.observed_date {
            Some(observed) if observed == today => return Ok(false),
            Some(observed) => {
                if today < observed {
                    warn!("Calendar went backwards from {} to {}", observed, today);
                } else {
                    info!("New day {}", today);
                }
                for record in self.state.panels.values_mut() {
                    record.activated_today = false;
                }
            },
            None => {
                // No observed day recorded: only today's activations still count
                for record in self.state.panels.values_mut() {
                    if record.last_activated_date != Some(today) {
                        record.activated_today = false;
                    }
                }
            },
        }
        self.state.observed_date = Some(today);
        self.write()?;
        Ok(true)
    }

    pub fn noon_pass_done(&self, today: CalendarDate) -> bool {
        self.state.noon_pass_date == Some(today)
    }

    pub fn mark_noon_pass(&mut self, today: CalendarDate) -> Result<()> {
        self.state.noon_pass_date = Some(today);
        self.write()
    }

    /// Forget every activation and write through
    pub fn reset(&mut self) -> Result<()> {
        for record in self.state.panels.values_mut() {
            *record = ActivationRecord::default();
        }
        self.state.noon_pass_date = None;
        info!("Ledger {} reset", self.path.display());
        self.write()
    }

    /// Atomic replace of the backing file
    fn write(&self) -> Result<()> {
        let bytes = self.state.encode()?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let write_err = |e: std::io::Error| {
            ScheduleError::Write(format!("{}: {}", self.path.display(), e))
        };

        fs::create_dir_all(&dir).map_err(write_err)?;
        let mut tmp = NamedTempFile::new_in(&dir).map_err(write_err)?;
        tmp.write_all(&bytes).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;
        Ok(())
    }
}
