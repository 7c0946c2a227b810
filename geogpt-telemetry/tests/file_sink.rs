use std::fs;

use geogpt_config::{LogFormat, LogRotation, LoggingConfig};
use geogpt_telemetry::{get_logger, initialize};
use tempfile::TempDir;

#[test]
fn file_sink_receives_json_lines() {
    let dir = TempDir::new().unwrap();
    let config = LoggingConfig {
        level: "info".into(),
        format: LogFormat::Json,
        file: Some(dir.path().join("logs").join("geogpt.log")),
        rotation: LogRotation::Never,
        ansi: false,
        ..LoggingConfig::default()
    };

    let guard = initialize(&config).unwrap();
    assert!(guard.has_file_sink());

    let span = get_logger("file-sink-test");
    span.in_scope(|| tracing::info!(answer = 42, "written to file"));
    drop(guard);

    let contents = fs::read_to_string(dir.path().join("logs").join("geogpt.log")).unwrap();
    let line = contents
        .lines()
        .find(|line| line.contains("written to file"))
        .expect("log line present");
    let value: serde_json::Value = serde_json::from_str(line).unwrap();
    assert_eq!(value["fields"]["answer"], 42);
}
