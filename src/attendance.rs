//! Attendance calculator and its local key/value store.
//!
//! Purely client-side: counters live in a JSON file next to the client, never on
//! the feed service.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Store key for the total number of classes.
pub const TOTAL_KEY: &str = "bunk_total";
/// Store key for the number of classes attended.
pub const ATTENDED_KEY: &str = "bunk_attended";

/// Minimum attendance, in percent.
pub const TARGET_PERCENT: f64 = 75.0;

/// Where the counters stand against the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Classes that must be attended in a row to reach the target
    NeedToAttend(u32),
    /// Classes that can be missed while staying at or above the target
    CanSkip(u32),
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::NeedToAttend(n) => {
                write!(f, "You need to attend {} more classes to hit 75%.", n)
            }
            Verdict::CanSkip(n) => write!(f, "You can safely bunk {} more classes.", n),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttendanceCounter {
    pub total: u32,
    pub attended: u32,
}

impl AttendanceCounter {
    pub fn new(total: u32, attended: u32) -> Self {
        Self { total, attended }
    }

    /// Attendance in percent; 100 before any class is recorded.
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        f64::from(self.attended) / f64::from(self.total) * 100.0
    }

    /// `None` until at least one class is recorded.
    ///
    /// With a 75% target, `(0.75t - a) / 0.25` reduces to `3t - 4a` and
    /// `(a - 0.75t) / 0.75` to `(4a - 3t) / 3`, so integers are exact here.
    pub fn verdict(&self) -> Option<Verdict> {
        if self.total == 0 {
            return None;
        }
        let total = i64::from(self.total);
        let attended = i64::from(self.attended);
        let surplus = 4 * attended - 3 * total;

        let verdict = if surplus < 0 {
            Verdict::NeedToAttend(clamp_u32(-surplus))
        } else {
            Verdict::CanSkip(clamp_u32(surplus / 3))
        };
        Some(verdict)
    }

    pub fn load(store: &LocalStore) -> Self {
        Self {
            total: store.get_u32(TOTAL_KEY).unwrap_or(0),
            attended: store.get_u32(ATTENDED_KEY).unwrap_or(0),
        }
    }

    pub fn save(&self, store: &mut LocalStore) -> Result<(), StoreError> {
        store.set(TOTAL_KEY, self.total.to_string());
        store.set(ATTENDED_KEY, self.attended.to_string());
        store.save()
    }
}

fn clamp_u32(value: i64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

/// Errors from the local key/value store.
#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Format(serde_json::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "local store I/O error: {}", e),
            StoreError::Format(e) => write!(f, "local store is not valid JSON: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Format(err)
    }
}

/// String key/value pairs persisted as one JSON object.
#[derive(Debug)]
pub struct LocalStore {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl LocalStore {
    /// Open the store, starting empty when the file does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let values = match std::fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, values })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Numeric value under `key`; unparseable values read as absent.
    pub fn get_u32(&self, key: &str) -> Option<u32> {
        let raw = self.get(key)?;
        match raw.trim().parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring non-numeric local value {}={:?}", key, raw);
                None
            }
        }
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(key.to_string(), value.into());
    }

    pub fn save(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let raw = serde_json::to_string_pretty(&self.values)?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_percentage() {
        assert_eq!(AttendanceCounter::default().percentage(), 100.0);
        assert_eq!(AttendanceCounter::new(40, 30).percentage(), 75.0);
        assert_eq!(AttendanceCounter::new(8, 2).percentage(), 25.0);
    }

    #[test]
    fn test_verdict_below_target() {
        // 3*40 - 4*20 = 40 classes in a row: 60/80 = 75%
        assert_eq!(
            AttendanceCounter::new(40, 20).verdict(),
            Some(Verdict::NeedToAttend(40))
        );
        assert_eq!(
            AttendanceCounter::new(4, 2).verdict(),
            Some(Verdict::NeedToAttend(4))
        );
    }

    #[test]
    fn test_verdict_at_or_above_target() {
        assert_eq!(
            AttendanceCounter::new(40, 30).verdict(),
            Some(Verdict::CanSkip(0))
        );
        // (4*40 - 3*40) / 3 = 13: 40/53 stays above 75%, 40/54 would not
        assert_eq!(
            AttendanceCounter::new(40, 40).verdict(),
            Some(Verdict::CanSkip(13))
        );
        assert_eq!(AttendanceCounter::default().verdict(), None);
    }

    #[test]
    fn test_verdict_message() {
        assert_eq!(
            Verdict::CanSkip(2).to_string(),
            "You can safely bunk 2 more classes."
        );
    }

    #[test]
    fn test_counter_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state").join("local.json");

        let mut store = LocalStore::open(&path).unwrap();
        assert_eq!(AttendanceCounter::load(&store), AttendanceCounter::default());

        AttendanceCounter::new(30, 25).save(&mut store).unwrap();

        let reopened = LocalStore::open(&path).unwrap();
        assert_eq!(reopened.get(TOTAL_KEY), Some("30"));
        assert_eq!(
            AttendanceCounter::load(&reopened),
            AttendanceCounter::new(30, 25)
        );
    }

    #[test]
    fn test_bad_value_reads_as_zero() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("local.json");
        std::fs::write(&path, r#"{"bunk_total":"lots","bunk_attended":"3"}"#).unwrap();

        let store = LocalStore::open(&path).unwrap();
        assert_eq!(AttendanceCounter::load(&store), AttendanceCounter::new(0, 3));
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("local.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(LocalStore::open(&path), Err(StoreError::Format(_))));
    }
}
