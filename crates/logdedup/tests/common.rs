//! Common fixtures for logdedup integration tests.

#![allow(dead_code)]

use std::time::Duration;

use logdedup::{DeduplicationSettings, LogEvent, Severity};

/// An Information event carrying a `Code` property.
pub fn coded_event(message: &str, code: &str) -> LogEvent {
    LogEvent::new(Severity::Information, message).with_property("Code", code)
}

/// An event at the given tier carrying a `Code` property.
pub fn coded_event_at(severity: Severity, message: &str, code: &str) -> LogEvent {
    LogEvent::new(severity, message).with_property("Code", code)
}

/// Settings bound from `Logging:Deduplication`-relative key/value pairs.
pub fn settings_from(pairs: &[(&str, &str)]) -> DeduplicationSettings {
    DeduplicationSettings::from_key_values(
        pairs
            .iter()
            .map(|(k, v)| (format!("Logging:Deduplication:{}", k), v.to_string())),
    )
    .expect("valid settings")
}

/// Shorthand for a millisecond duration.
pub fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}
