use std::io::Write;

use dr_domain::EngineConfig;

#[test]
fn loads_a_full_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
group_id = -1001234567

[sessions]
inactivity_threshold_hours = 48
reaper_interval_secs = 120
audit_interval_secs = 240

[queue]
max_per_minute = 20
burst_limit = 3
"#
    )
    .unwrap();

    let config = EngineConfig::load(file.path()).unwrap();
    assert_eq!(config.group_id, -1001234567);
    assert_eq!(config.sessions.inactivity_threshold_hours, 48);
    assert_eq!(config.sessions.reaper_interval_secs, 120);
    assert_eq!(config.sessions.audit_interval_secs, 240);
    assert_eq!(config.queue.max_per_minute, 20);
    assert_eq!(config.queue.burst_limit, 3);
}

#[test]
fn partial_file_falls_back_to_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "group_id = -42\n").unwrap();

    let config = EngineConfig::load(file.path()).unwrap();
    assert_eq!(config.group_id, -42);
    assert_eq!(config.sessions.inactivity_threshold_hours, 24);
    assert_eq!(config.queue.max_per_minute, 30);
}

#[test]
fn missing_file_is_an_io_error() {
    assert!(EngineConfig::load(std::path::Path::new("/nonexistent/deskrelay.toml")).is_err());
}

#[test]
fn malformed_toml_is_a_config_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "group_id = \"not a number\"").unwrap();
    let err = EngineConfig::load(file.path()).unwrap_err();
    assert!(err.to_string().contains("config"));
}
