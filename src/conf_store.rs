//! Persisted section/key/value record holding the last known target PID.
//!
//! The record is an INI file:
//!
//! ```ini
//! [AuAu]
//! pid = 1234
//! ```
//!
//! Other sections and keys are preserved untouched; the controller only ever
//! goes through [`PidStore`], which reads and writes `AuAu.pid`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ini::Ini;
use tracing::{debug, info};

use crate::error::{CtrlError, Result};

pub const PID_SECTION: &str = "AuAu";
pub const PID_KEY: &str = "pid";

/// File copied into place when the requested record file does not exist yet.
pub const EXAMPLE_CONF_FILE: &str = "example-app.conf";

/// Typed access to the one persisted value the controller needs.
pub trait PidStore: Send + Sync {
    /// Stored PID, `None` when nothing was stored yet.
    fn load_pid(&self) -> Result<Option<u32>>;

    fn save_pid(&self, pid: u32) -> Result<()>;
}

/// Parse a PID string. Zero, negatives and non-numbers are rejected.
pub fn parse_pid(value: &str) -> Result<u32> {
    let trimmed = value.trim();
    let pid: u32 = trimmed
        .parse()
        .map_err(|e: std::num::ParseIntError| CtrlError::invalid_pid(value, e.to_string()))?;
    if pid == 0 {
        return Err(CtrlError::invalid_pid(value, "pid must be positive"));
    }
    Ok(pid)
}

/// A stored PID value; blank counts as nothing stored.
fn parse_stored_pid(value: Option<&str>) -> Result<Option<u32>> {
    value
        .filter(|value| !value.trim().is_empty())
        .map(parse_pid)
        .transpose()
}

#[derive(Debug, Clone)]
pub struct ConfRecord {
    ini: Ini,
}

impl Default for ConfRecord {
    fn default() -> Self {
        Self { ini: Ini::new() }
    }
}

impl ConfRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse record text.
    pub fn parse(content: &str) -> Result<Self> {
        let ini = Ini::load_from_str(content)
            .map_err(|e| CtrlError::config_load("<memory>", e.to_string()))?;
        Ok(Self { ini })
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.ini.get_from(Some(section), key)
    }

    pub fn set(&mut self, section: &str, key: &str, value: impl Into<String>) {
        self.ini.with_section(Some(section)).set(key, value);
    }

    pub fn pid(&self) -> Result<Option<u32>> {
        parse_stored_pid(self.get(PID_SECTION, PID_KEY))
    }

    pub fn set_pid(&mut self, pid: u32) {
        self.set(PID_SECTION, PID_KEY, pid.to_string());
    }

    /// Render the record as INI text.
    pub fn to_text(&self) -> Result<String> {
        let mut buf = Vec::new();
        self.ini.write_to(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| CtrlError::config_load(path.display().to_string(), e.to_string()))?;
        let ini = Ini::load_from_str(&content)
            .map_err(|e| CtrlError::config_load(path.display().to_string(), e.to_string()))?;
        Ok(Self { ini })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = self.to_text()?;
        fs::write(path, content)
            .map_err(|e| CtrlError::config_save(path.display().to_string(), e.to_string()))
    }
}

/// [`PidStore`] backed by a record file on disk.
#[derive(Debug, Clone)]
pub struct ConfFile {
    path: PathBuf,
}

impl ConfFile {
    /// Open an existing record file.
    ///
    /// A missing file is created from the [`EXAMPLE_CONF_FILE`] in the same
    /// directory, if there is one.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            let example = example_for(&path);
            if !example.is_file() {
                return Err(CtrlError::config_load(
                    path.display().to_string(),
                    format!("missing config file and no {}", example.display()),
                ));
            }
            fs::copy(&example, &path)
                .map_err(|e| CtrlError::config_save(path.display().to_string(), e.to_string()))?;
            info!(
                path = %path.display(),
                example = %example.display(),
                "created config file from example"
            );
        }
        Ok(Self { path })
    }

    /// Open the record file, creating an empty one when it does not exist.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            ConfRecord::new().save(&path)?;
            debug!(path = %path.display(), "created empty config file");
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self) -> Result<ConfRecord> {
        ConfRecord::load(&self.path)
    }
}

fn example_for(path: &Path) -> PathBuf {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(EXAMPLE_CONF_FILE),
        _ => PathBuf::from(EXAMPLE_CONF_FILE),
    }
}

impl PidStore for ConfFile {
    fn load_pid(&self) -> Result<Option<u32>> {
        self.record()?.pid()
    }

    fn save_pid(&self, pid: u32) -> Result<()> {
        let mut record = self.record()?;
        record.set_pid(pid);
        record.save(&self.path)?;
        debug!(pid, path = %self.path.display(), "saved pid");
        Ok(())
    }
}

/// In-memory [`PidStore`]. Holds the raw string so malformed values can be
/// exercised.
#[derive(Debug, Default)]
pub struct MemoryPidStore {
    value: Mutex<Option<String>>,
}

impl MemoryPidStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_raw(value: impl Into<String>) -> Self {
        Self {
            value: Mutex::new(Some(value.into())),
        }
    }

    pub fn raw(&self) -> Option<String> {
        self.value
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl PidStore for MemoryPidStore {
    fn load_pid(&self) -> Result<Option<u32>> {
        parse_stored_pid(self.raw().as_deref())
    }

    fn save_pid(&self, pid: u32) -> Result<()> {
        *self
            .value
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(pid.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pid() {
        assert_eq!(parse_pid("1234").unwrap(), 1234);
        assert_eq!(parse_pid(" 42 ").unwrap(), 42);
        assert!(matches!(parse_pid("0"), Err(CtrlError::InvalidPid { .. })));
        assert!(parse_pid("-3").is_err());
        assert!(parse_pid("abc").is_err());
        assert!(parse_pid("").is_err());
    }

    #[test]
    fn test_record_reads_ini_sections() {
        let record = ConfRecord::parse("[AuAu]\npid = 1234\n").unwrap();
        assert_eq!(record.pid().unwrap(), Some(1234));
        assert_eq!(record.get("AuAu", "missing"), None);
        assert_eq!(record.get("Other", "pid"), None);
    }

    #[test]
    fn test_record_keeps_other_sections() {
        let mut record =
            ConfRecord::parse("[AuAu]\npid = 12\n\n[Ui]\ntheme = dark\n").unwrap();
        assert_eq!(record.pid().unwrap(), Some(12));

        record.set_pid(99);
        let text = record.to_text().unwrap();
        let reloaded = ConfRecord::parse(&text).unwrap();
        assert_eq!(reloaded.get("AuAu", "pid"), Some("99"));
        assert_eq!(reloaded.get("Ui", "theme"), Some("dark"));
    }

    #[test]
    fn test_blank_pid_is_absent() {
        let mut record = ConfRecord::parse("[AuAu]\npid =\n").unwrap();
        assert_eq!(record.pid().unwrap(), None);
        record.set(PID_SECTION, PID_KEY, "  ");
        assert_eq!(record.pid().unwrap(), None);
        record.set(PID_SECTION, PID_KEY, "x1");
        assert!(record.pid().is_err());
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryPidStore::new();
        assert_eq!(store.load_pid().unwrap(), None);
        store.save_pid(77).unwrap();
        assert_eq!(store.load_pid().unwrap(), Some(77));

        let broken = MemoryPidStore::with_raw("not-a-pid");
        assert!(matches!(
            broken.load_pid(),
            Err(CtrlError::InvalidPid { .. })
        ));
    }

    #[test]
    fn test_blank_pid_is_absent_in_both_stores() {
        let memory = MemoryPidStore::with_raw("   ");
        assert_eq!(memory.load_pid().unwrap(), None);

        let mut record = ConfRecord::new();
        record.set(PID_SECTION, PID_KEY, "   ");
        assert_eq!(record.pid().unwrap(), memory.load_pid().unwrap());
    }

    #[test]
    fn test_example_lookup_stays_beside_record() {
        assert_eq!(
            example_for(Path::new("conf/app.conf")),
            Path::new("conf").join(EXAMPLE_CONF_FILE)
        );
        assert_eq!(example_for(Path::new("app.conf")), PathBuf::from(EXAMPLE_CONF_FILE));
    }
}
