mod common;
use crate::common::init_tracing;

use std::error::Error;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::NamedTempFile;

use pathqueue::config::{ConfigFile, load_and_validate, load_from_path, parse_duration};
use pathqueue::fs::mock::MockFileSystem;
use pathqueue::kernel::mock::MockKernel;
use pathqueue::{EventSet, PathQueueBuilder, PathQueueError};

type TestResult = Result<(), Box<dyn Error>>;

fn write_config(contents: &str) -> Result<NamedTempFile, Box<dyn Error>> {
    let mut file = NamedTempFile::new()?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    Ok(file)
}

#[test]
fn full_config_is_loaded_and_validated() -> TestResult {
    init_tracing();
    let file = write_config(
        r#"
[queue]
sleep_interval = "250ms"
always_post_notifications = true
broadcast_capacity = 32

[watch]
paths = ["/tmp/a.txt", "/var/log/syslog"]
events = ["write", "Delete", "size-increase"]
"#,
    )?;

    let cfg = load_and_validate(file.path())?;

    assert_eq!(cfg.queue.sleep_interval, Duration::from_millis(250));
    assert!(cfg.queue.always_post_notifications);
    assert_eq!(cfg.queue.broadcast_capacity, 32);
    assert_eq!(
        cfg.watch.paths,
        vec![PathBuf::from("/tmp/a.txt"), PathBuf::from("/var/log/syslog")]
    );
    assert_eq!(
        cfg.watch.events,
        EventSet::WRITE | EventSet::DELETE | EventSet::SIZE_INCREASE
    );
    Ok(())
}

#[test]
fn empty_file_yields_defaults() -> TestResult {
    let file = write_config("")?;

    let cfg = load_and_validate(file.path())?;

    assert_eq!(cfg, ConfigFile::default());
    assert_eq!(cfg.queue.sleep_interval, Duration::from_secs(1));
    assert!(!cfg.queue.always_post_notifications);
    assert_eq!(cfg.watch.events, EventSet::ALL);
    Ok(())
}

#[test]
fn raw_load_does_not_validate() -> TestResult {
    let file = write_config("[watch]\npaths = [\"relative/path\"]\n")?;

    let raw = load_from_path(file.path())?;
    assert_eq!(raw.watch.paths, vec![PathBuf::from("relative/path")]);

    let err = load_and_validate(file.path()).expect_err("relative path must be rejected");
    assert!(matches!(err, PathQueueError::Config(_)));
    assert!(err.to_string().contains("absolute"), "unexpected error: {err}");
    Ok(())
}

#[test]
fn zero_sleep_interval_is_rejected() -> TestResult {
    let file = write_config("[queue]\nsleep_interval = \"0ms\"\n")?;

    let err = load_and_validate(file.path()).expect_err("zero interval must be rejected");
    assert!(err.to_string().contains("sleep_interval"), "unexpected error: {err}");
    Ok(())
}

#[test]
fn bad_duration_unit_is_rejected() -> TestResult {
    let file = write_config("[queue]\nsleep_interval = \"5 fortnights\"\n")?;

    let err = load_and_validate(file.path()).expect_err("unknown unit must be rejected");
    assert!(matches!(err, PathQueueError::Config(_)));
    Ok(())
}

#[test]
fn zero_broadcast_capacity_is_rejected() -> TestResult {
    let file = write_config("[queue]\nbroadcast_capacity = 0\n")?;

    let err = load_and_validate(file.path()).expect_err("zero capacity must be rejected");
    assert!(err.to_string().contains("broadcast_capacity"), "unexpected error: {err}");
    Ok(())
}

#[test]
fn empty_event_list_is_rejected() -> TestResult {
    let file = write_config("[watch]\nevents = []\n")?;

    let err = load_and_validate(file.path()).expect_err("empty events must be rejected");
    assert!(err.to_string().contains("events"), "unexpected error: {err}");
    Ok(())
}

#[test]
fn unknown_event_name_is_a_parse_error() -> TestResult {
    let file = write_config("[watch]\nevents = [\"explode\"]\n")?;

    let err = load_from_path(file.path()).expect_err("unknown event must fail to parse");
    assert!(matches!(err, PathQueueError::Toml(_)));
    assert!(err.to_string().contains("explode"), "unexpected error: {err}");
    Ok(())
}

#[test]
fn unknown_keys_are_rejected() -> TestResult {
    let file = write_config("[queue]\nsleep_intervall = \"1s\"\n")?;

    let err = load_from_path(file.path()).expect_err("typo must be rejected");
    assert!(matches!(err, PathQueueError::Toml(_)));
    Ok(())
}

#[test]
fn missing_file_is_an_io_error() {
    let err = load_and_validate("/definitely/not/here/pathqueue.toml")
        .expect_err("missing file must fail");
    assert!(matches!(err, PathQueueError::Io(_)));
}

#[test]
fn duration_strings() {
    assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
    assert_eq!(parse_duration(" 3s "), Ok(Duration::from_secs(3)));
    assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
    assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
    assert!(parse_duration("").is_err());
    assert!(parse_duration("10").is_err());
    assert!(parse_duration("ms").is_err());
    assert!(parse_duration("4d").is_err());
}

#[test]
fn huge_durations_are_rejected_instead_of_overflowing() {
    let err = parse_duration("307445734561825861m").expect_err("minutes overflow u64 seconds");
    assert!(err.contains("too large"), "unexpected error: {err}");
    assert!(parse_duration("5124095576030432h").is_err());
    assert_eq!(
        parse_duration("18446744073709551615s"),
        Ok(Duration::from_secs(u64::MAX))
    );
}

#[test]
fn overflowing_sleep_interval_in_config_is_a_config_error() -> TestResult {
    let file = write_config("[queue]\nsleep_interval = \"307445734561825861m\"\n")?;

    let err = load_and_validate(file.path()).expect_err("overflow must be rejected");
    assert!(matches!(err, PathQueueError::Config(_)));
    Ok(())
}

#[test]
fn builder_applies_queue_settings() -> TestResult {
    init_tracing();
    let file = write_config(
        "[queue]\nsleep_interval = \"40ms\"\nalways_post_notifications = true\n",
    )?;
    let cfg = load_and_validate(file.path())?;

    let kernel = MockKernel::new();
    let queue = PathQueueBuilder::from_config(&cfg.queue)
        .kernel(kernel.factory())
        .file_system(Arc::new(MockFileSystem::new()))
        .build();

    assert_eq!(queue.sleep_interval(), Duration::from_millis(40));
    assert!(queue.always_post_notifications());

    queue.set_sleep_interval(Duration::ZERO);
    assert_eq!(queue.sleep_interval(), Duration::from_millis(1));
    Ok(())
}
