//! Log severity tiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Severity tier of a log event, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Most detailed tracing output.
    Verbose,
    /// Internal diagnostics.
    Debug,
    /// Normal operational messages.
    Information,
    /// Something unexpected that did not stop the operation.
    Warning,
    /// An operation failed.
    Error,
    /// The process cannot continue. Carries no policy of its own.
    Fatal,
}

impl Severity {
    /// All tiers in ascending order.
    pub const ALL: [Severity; 6] = [
        Severity::Verbose,
        Severity::Debug,
        Severity::Information,
        Severity::Warning,
        Severity::Error,
        Severity::Fatal,
    ];

    /// Canonical name used in configuration keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Verbose => "Verbose",
            Severity::Debug => "Debug",
            Severity::Information => "Information",
            Severity::Warning => "Warning",
            Severity::Error => "Error",
            Severity::Fatal => "Fatal",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a tier name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown severity: {0}")]
pub struct UnknownSeverity(pub String);

impl FromStr for Severity {
    type Err = UnknownSeverity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Severity::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownSeverity(s.to_string()))
    }
}

impl From<tracing::Level> for Severity {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Severity::Verbose,
            tracing::Level::DEBUG => Severity::Debug,
            tracing::Level::INFO => Severity::Information,
            tracing::Level::WARN => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str_case_insensitive() {
        assert_eq!("error".parse::<Severity>().unwrap(), Severity::Error);
        assert_eq!("WARNING".parse::<Severity>().unwrap(), Severity::Warning);
        assert_eq!(
            "Information".parse::<Severity>().unwrap(),
            Severity::Information
        );
    }

    #[test]
    fn test_from_str_unknown() {
        let err = "critical".parse::<Severity>().unwrap_err();
        assert_eq!(err.0, "critical");
    }

    #[test]
    fn test_from_tracing_level() {
        assert_eq!(Severity::from(tracing::Level::TRACE), Severity::Verbose);
        assert_eq!(Severity::from(tracing::Level::DEBUG), Severity::Debug);
        assert_eq!(Severity::from(tracing::Level::INFO), Severity::Information);
        assert_eq!(Severity::from(tracing::Level::WARN), Severity::Warning);
        assert_eq!(Severity::from(tracing::Level::ERROR), Severity::Error);
    }

    #[test]
    fn test_ordering() {
        assert!(Severity::Verbose < Severity::Debug);
        assert!(Severity::Error < Severity::Fatal);
    }

    #[test]
    fn test_display_round_trips_through_from_str() {
        for level in Severity::ALL {
            assert_eq!(level.to_string().parse::<Severity>().unwrap(), level);
        }
    }
}
