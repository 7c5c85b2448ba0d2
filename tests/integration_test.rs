use anyhow::Result;
use auto_dance_ctrl::conf_store::{ConfRecord, EXAMPLE_CONF_FILE};
use auto_dance_ctrl::config::{parse_duration, Address, Config};
use auto_dance_ctrl::{ConfFile, CtrlError, PidStore, ProcessFinder};
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

#[test]
fn test_full_settings_file() -> Result<()> {
    let mut temp_file = NamedTempFile::new()?;

    let json_content = r#"
    {
        "window_title": "Audition",
        "window_class": "AuditionWnd",
        "process_name": "Audition.exe",
        "speed": {
            "module_offset": "0x5A1C24",
            "offsets": ["0x1C", "0x248"],
            "pointer_width": 4,
            "min": 1,
            "max": 8
        },
        "increase_key": "f6",
        "decrease_key": "f5",
        "poll_interval": "500ms",
        "adjust_interval": "1s",
        "settle_delay": "25",
        "hotkeys": {
            "increase": "ctrl+shift+up",
            "decrease": "ctrl+shift+down",
            "measure": null,
            "stop": "ctrl+shift+q"
        },
        "verbose": true
    }
    "#;
    temp_file.write_all(json_content.as_bytes())?;

    let config = Config::from_file(temp_file.path())?;

    assert_eq!(config.window_class.as_deref(), Some("AuditionWnd"));
    assert_eq!(config.speed.module_offset, Address(0x5A1C24));
    assert_eq!(config.speed.offsets, vec![Address(0x1C), Address(0x248)]);
    assert_eq!(config.speed.bounds()?.min, 1);
    assert_eq!(config.speed.bounds()?.max, 8);
    assert_eq!(config.increase_key, "f6");
    assert_eq!(config.poll_interval, Duration::from_millis(500));
    assert_eq!(config.adjust_interval, Duration::from_secs(1));
    assert_eq!(config.settle_delay, Duration::from_millis(25));
    assert_eq!(config.hotkeys.measure, None);
    assert_eq!(config.hotkeys.stop.as_deref(), Some("ctrl+shift+q"));
    assert!(config.verbose);
    assert!(config.speed.is_configured());

    Ok(())
}

#[test]
fn test_default_values() {
    let config: Config = serde_json::from_str("{}").unwrap();

    assert_eq!(config.window_title, "Audition");
    assert_eq!(config.process_name, "Audition.exe");
    assert_eq!(config.increase_key, "pageup");
    assert_eq!(config.decrease_key, "pagedown");
    assert_eq!(config.poll_interval, Duration::from_millis(250));
    assert_eq!(config.adjust_interval, Duration::from_millis(120));
    assert_eq!(config.speed.pointer_width, 4);
    assert!(config.speed.offsets.is_empty());
    assert_eq!(config.hotkeys.increase.as_deref(), Some("ctrl+alt+pageup"));
    assert!(!config.verbose);
    assert!(config.validate().is_ok());
}

#[test]
fn test_bad_settings_are_rejected() -> Result<()> {
    let mut temp_file = NamedTempFile::new()?;
    temp_file.write_all(br#"{ "speed": { "module_offset": "0xNOPE" } }"#)?;
    let err = Config::from_file(temp_file.path()).unwrap_err();
    assert!(matches!(err, CtrlError::ConfigLoad { .. }));

    let mut temp_file = NamedTempFile::new()?;
    temp_file.write_all(br#"{ "poll_interval": "0ms" }"#)?;
    assert!(matches!(
        Config::from_file(temp_file.path()),
        Err(CtrlError::ConfigValidation(_))
    ));

    Ok(())
}

#[test]
fn test_settings_save_load_roundtrip() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let path = temp_dir.path().join("settings.json");

    let mut original = Config::default();
    original.window_class = Some("AuditionWnd".to_string());
    original.speed.module_offset = Address(0x400);
    original.speed.offsets = vec![Address(0x10)];
    original.speed.pointer_width = 8;
    original.adjust_interval = Duration::from_millis(1500);

    original.save_to_file(&path)?;
    let loaded = Config::from_file(&path)?;

    assert_eq!(loaded.window_class, original.window_class);
    assert_eq!(loaded.speed, original.speed);
    assert_eq!(loaded.adjust_interval, original.adjust_interval);
    assert_eq!(loaded.poll_interval, original.poll_interval);
    assert_eq!(loaded.hotkeys, original.hotkeys);

    Ok(())
}

#[test]
fn test_missing_settings_file_uses_defaults() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let config = Config::load_or_default(temp_dir.path().join("absent.json"))?;
    assert_eq!(config.window_title, "Audition");
    Ok(())
}

#[test]
fn test_duration_parsing_edge_cases() {
    assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
    assert_eq!(parse_duration("3s").unwrap(), Duration::from_secs(3));
    assert!(parse_duration("1.5s").is_err());
    assert!(parse_duration("ms").is_err());
}

// Record file tests

#[test]
fn test_conf_file_pid_roundtrip() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let path = temp_dir.path().join("app.conf");

    let store = ConfFile::create(&path)?;
    assert_eq!(store.load_pid()?, None);

    store.save_pid(4321)?;
    assert_eq!(store.load_pid()?, Some(4321));

    let record = ConfRecord::load(&path)?;
    assert_eq!(record.get("AuAu", "pid"), Some("4321"));

    Ok(())
}

#[test]
fn test_conf_file_keeps_foreign_sections() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let path = temp_dir.path().join("app.conf");
    std::fs::write(
        &path,
        "[AuAu]\npid = 10\nnote = main account\n\n[Window]\nx = 40\n",
    )?;

    let store = ConfFile::open(&path)?;
    assert_eq!(store.load_pid()?, Some(10));
    store.save_pid(11)?;

    let record = store.record()?;
    assert_eq!(record.get("AuAu", "pid"), Some("11"));
    assert_eq!(record.get("AuAu", "note"), Some("main account"));
    assert_eq!(record.get("Window", "x"), Some("40"));

    Ok(())
}

#[test]
fn test_conf_file_created_from_example() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    std::fs::write(
        temp_dir.path().join(EXAMPLE_CONF_FILE),
        "[AuAu]\npid = 555\n",
    )?;
    let path = temp_dir.path().join("app.conf");

    let store = ConfFile::open(&path)?;
    assert!(path.exists());
    assert_eq!(store.load_pid()?, Some(555));

    Ok(())
}

#[test]
fn test_conf_file_missing_without_example() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let path = temp_dir.path().join("app.conf");
    let err = ConfFile::open(&path).unwrap_err();
    assert!(matches!(err, CtrlError::ConfigLoad { .. }));
    assert!(!path.exists());
    Ok(())
}

#[test]
fn test_conf_file_reads_existing_ini_record() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let path = temp_dir.path().join("app.conf");
    std::fs::write(&path, "; written by the desktop tool\n[AuAu]\npid = 1234\n")?;

    let store = ConfFile::open(&path)?;
    assert_eq!(store.path(), path.as_path());
    assert_eq!(store.load_pid()?, Some(1234));

    store.save_pid(4321)?;
    let text = std::fs::read_to_string(&path)?;
    assert!(text.contains("[AuAu]"));
    assert_eq!(ConfRecord::parse(&text)?.pid()?, Some(4321));

    Ok(())
}

#[test]
fn test_conf_file_with_invalid_pid() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let path = temp_dir.path().join("app.conf");
    std::fs::write(&path, "[AuAu]\npid = -5\n")?;

    let store = ConfFile::open(&path)?;
    assert!(matches!(store.load_pid(), Err(CtrlError::InvalidPid { .. })));

    Ok(())
}

// ProcessFinder tests

#[test]
fn test_process_finder_creation() {
    let finder = ProcessFinder::new();
    let finder2 = finder.clone();
    drop(finder);
    drop(finder2);
}

#[test]
fn test_process_finder_nonexistent_process() {
    let mut finder = ProcessFinder::default();
    assert!(finder
        .find_pid_by_name("nonexistent_process_xyz_123456")
        .is_none());
}

#[test]
fn test_process_finder_sees_itself() {
    let mut finder = ProcessFinder::new();
    assert!(finder.is_alive(std::process::id()));
}
