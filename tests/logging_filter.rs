use tracing::level_filters::LevelFilter;

use pathqueue::cli::LogLevel;
use pathqueue::logging::{build_filter, filter_directive};

#[test]
fn cli_flag_wins_over_the_environment() {
    assert_eq!(
        filter_directive(Some(LogLevel::Debug), Some("pathqueue=trace")),
        "debug"
    );
    assert_eq!(filter_directive(Some(LogLevel::Error), None), "error");
}

#[test]
fn environment_directives_are_passed_through() {
    assert_eq!(
        filter_directive(None, Some(" info,pathqueue::kernel=trace ")),
        "info,pathqueue::kernel=trace"
    );
}

#[test]
fn missing_or_blank_environment_means_info() {
    assert_eq!(filter_directive(None, None), "info");
    assert_eq!(filter_directive(None, Some("   ")), "info");
}

#[test]
fn per_target_directive_raises_the_level_hint() {
    let (filter, rejected) = build_filter("warn,pathqueue::kernel=trace");

    assert!(rejected.is_none());
    assert_eq!(filter.max_level_hint(), Some(LevelFilter::TRACE));
}

#[test]
fn malformed_directive_falls_back_to_info() {
    let (filter, rejected) = build_filter("pathqueue=very-loud");

    let rejected = rejected.expect("bad level must be reported");
    assert!(rejected.contains("very-loud"), "unexpected message: {rejected}");
    assert_eq!(filter.max_level_hint(), Some(LevelFilter::INFO));
}
