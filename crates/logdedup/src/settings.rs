//! Deduplication policy and settings.
//!
//! Files (TOML or JSON) deserialize straight into [`DeduplicationSettings`]
//! from the `Logging.Deduplication` section, with PascalCase keys. Flat
//! `Logging:Deduplication:...` key/value pairs, such as environment
//! variables, are applied on top as overrides, matched case-insensitively.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::error::{DedupError, Result};
use crate::severity::Severity;

/// Configuration section holding the deduplication settings.
pub const SECTION: &str = "Logging:Deduplication";

/// Hierarchy separator used in environment variable names.
pub const ENV_SEPARATOR: &str = "__";

const DEFAULT_WINDOW: Duration = Duration::from_millis(5_000);
const DEFAULT_PRUNE_INTERVAL: Duration = Duration::from_millis(60_000);
const DEFAULT_CACHE_EXPIRATION: Duration = Duration::from_millis(300_000);

/// Deduplication policy for one severity tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DeduplicationLevel {
    /// Whether duplicates at this tier are suppressed at all.
    #[serde(rename = "DeduplicationEnabled")]
    pub enabled: bool,
    /// Minimum time before an identical key is emitted again.
    #[serde(rename = "DeduplicationWindowMilliseconds", deserialize_with = "millis")]
    pub window: Duration,
}

impl Default for DeduplicationLevel {
    fn default() -> Self {
        Self {
            enabled: true,
            window: DEFAULT_WINDOW,
        }
    }
}

impl DeduplicationLevel {
    /// A policy that lets every event through.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// An enabled policy with the given window.
    pub fn with_window(window: Duration) -> Self {
        Self {
            enabled: true,
            window,
        }
    }
}

/// Complete deduplication configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct DeduplicationSettings {
    /// Policy for [`Severity::Error`].
    pub error: DeduplicationLevel,
    /// Policy for [`Severity::Warning`].
    pub warning: DeduplicationLevel,
    /// Policy for [`Severity::Information`], also used for unconfigured tiers.
    pub information: DeduplicationLevel,
    /// Policy for [`Severity::Debug`].
    pub debug: DeduplicationLevel,
    /// Policy for [`Severity::Verbose`].
    pub verbose: DeduplicationLevel,
    /// How often the background sweep runs.
    #[serde(rename = "PruneIntervalMilliseconds", deserialize_with = "millis")]
    pub prune_interval: Duration,
    /// Age beyond which cache entries are evicted.
    #[serde(rename = "CacheExpirationMilliseconds", deserialize_with = "millis")]
    pub cache_expiration: Duration,
    /// Event properties that make up the key, in order.
    pub key_properties: Vec<String>,
    /// Whether the raw message template is appended to the key.
    pub include_message_template: bool,
}

impl Default for DeduplicationSettings {
    fn default() -> Self {
        Self {
            error: DeduplicationLevel::default(),
            warning: DeduplicationLevel::default(),
            information: DeduplicationLevel::default(),
            debug: DeduplicationLevel::default(),
            verbose: DeduplicationLevel::default(),
            prune_interval: DEFAULT_PRUNE_INTERVAL,
            cache_expiration: DEFAULT_CACHE_EXPIRATION,
            key_properties: Vec::new(),
            include_message_template: true,
        }
    }
}

fn millis<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_millis)
}

/// Shape of a configuration file: `Logging.Deduplication` at the root.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    #[serde(rename = "Logging")]
    logging: LoggingSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LoggingSection {
    #[serde(rename = "Deduplication")]
    deduplication: DeduplicationSettings,
}

impl DeduplicationSettings {
    /// Selects the policy for a tier. Tiers without their own policy use
    /// the Information policy.
    pub fn policy_for(&self, severity: Severity) -> &DeduplicationLevel {
        match severity {
            Severity::Error => &self.error,
            Severity::Warning => &self.warning,
            Severity::Information => &self.information,
            Severity::Debug => &self.debug,
            Severity::Verbose => &self.verbose,
            _ => &self.information,
        }
    }

    fn level_mut(&mut self, tier: &str) -> Option<&mut DeduplicationLevel> {
        match tier.parse::<Severity>().ok()? {
            Severity::Error => Some(&mut self.error),
            Severity::Warning => Some(&mut self.warning),
            Severity::Information => Some(&mut self.information),
            Severity::Debug => Some(&mut self.debug),
            Severity::Verbose => Some(&mut self.verbose),
            _ => None,
        }
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.prune_interval.is_zero() {
            return Err(DedupError::InvalidSetting {
                key: format!("{}:PruneIntervalMilliseconds", SECTION),
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Binds settings from flat `Logging:Deduplication:...` key/value pairs
    /// on top of the defaults.
    pub fn from_key_values<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut settings = Self::default();
        settings.apply_overrides(pairs)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Binds settings from environment-style pairs using `__` as separator.
    pub fn from_env_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self::from_key_values(env_pairs(vars))
    }

    /// Binds settings from the process environment. Variables whose name or
    /// value is not valid UTF-8 are skipped.
    pub fn from_env() -> Result<Self> {
        Self::from_env_vars(process_env())
    }

    /// Parses a TOML document containing `[Logging.Deduplication]`.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents)?;
        file.logging.deduplication.validated()
    }

    /// Parses a JSON document containing `{"Logging": {"Deduplication": ...}}`.
    pub fn from_json_str(contents: &str) -> Result<Self> {
        let file: ConfigFile = serde_json::from_str(contents)?;
        file.logging.deduplication.validated()
    }

    /// Loads settings from a `.toml` or `.json` file.
    pub fn from_file(path: &Path) -> Result<Self> {
        read_file(path)?.validated()
    }

    /// Loads settings from an optional file, then applies environment
    /// overrides on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => read_file(path)?,
            None => Self::default(),
        };
        settings.apply_overrides(env_pairs(process_env()))?;
        settings.validated()
    }

    fn validated(self) -> Result<Self> {
        self.validate()?;
        debug!(
            key_properties = ?self.key_properties,
            include_message_template = self.include_message_template,
            prune_interval_ms = self.prune_interval.as_millis() as u64,
            cache_expiration_ms = self.cache_expiration.as_millis() as u64,
            "Loaded deduplication settings"
        );
        Ok(self)
    }

    /// Applies one source of `Logging:Deduplication:...` overrides.
    ///
    /// Keys are case-insensitive and keys outside the section are ignored.
    /// If the batch mentions `KeyProperties` at all, it replaces the whole
    /// list: a comma-separated `KeyProperties` value seeds it and indexed
    /// `KeyProperties:<n>` entries set positions, in index order. A later
    /// source therefore always wins over an earlier one, whatever form
    /// either used.
    pub fn apply_overrides<I, K, V>(&mut self, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut key_properties: Option<BTreeMap<usize, String>> = None;

        for (key, value) in pairs {
            let (key, value) = (key.as_ref(), value.as_ref());
            let Some(path) = strip_section(key) else {
                continue;
            };
            let segments: Vec<&str> = path.split(':').collect();

            match segments.as_slice() {
                [name] if is(name, "PruneIntervalMilliseconds") => {
                    self.prune_interval = parse_millis(key, value)?;
                }
                [name] if is(name, "CacheExpirationMilliseconds") => {
                    self.cache_expiration = parse_millis(key, value)?;
                }
                [name] if is(name, "IncludeMessageTemplate") => {
                    self.include_message_template = parse_bool(key, value)?;
                }
                [name] if is(name, "KeyProperties") => {
                    let listed = key_properties.get_or_insert_with(BTreeMap::new);
                    let names = value.split(',').map(str::trim).filter(|p| !p.is_empty());
                    for (i, name) in names.enumerate() {
                        listed.entry(i).or_insert_with(|| name.to_string());
                    }
                }
                [name, index] if is(name, "KeyProperties") => {
                    let index = index.parse::<usize>().map_err(|_| {
                        invalid(key, value, "KeyProperties entries must be indexed 0, 1, 2, ...")
                    })?;
                    key_properties
                        .get_or_insert_with(BTreeMap::new)
                        .insert(index, value.to_string());
                }
                [tier, field] => match self.level_mut(tier) {
                    Some(level) if is(field, "DeduplicationEnabled") => {
                        level.enabled = parse_bool(key, value)?;
                    }
                    Some(level) if is(field, "DeduplicationWindowMilliseconds") => {
                        level.window = parse_millis(key, value)?;
                    }
                    _ => debug!(key, "Ignoring unknown deduplication setting"),
                },
                _ => debug!(key, "Ignoring unknown deduplication setting"),
            }
        }

        if let Some(key_properties) = key_properties {
            self.key_properties = key_properties.into_values().collect();
        }
        Ok(())
    }
}

fn read_file(path: &Path) -> Result<DeduplicationSettings> {
    let contents = std::fs::read_to_string(path)?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();

    let file: ConfigFile = match ext.to_lowercase().as_str() {
        "toml" => toml::from_str(&contents)?,
        "json" => serde_json::from_str(&contents)?,
        _ => {
            return Err(DedupError::UnsupportedFormat {
                ext: ext.to_string(),
            })
        }
    };
    debug!(path = %path.display(), "Read deduplication config file");
    Ok(file.logging.deduplication)
}

fn process_env() -> impl Iterator<Item = (String, String)> {
    std::env::vars_os()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
}

fn env_pairs<I>(vars: I) -> impl Iterator<Item = (String, String)>
where
    I: IntoIterator<Item = (String, String)>,
{
    vars.into_iter()
        .map(|(key, value)| (key.replace(ENV_SEPARATOR, ":"), value))
}

fn is(segment: &str, name: &str) -> bool {
    segment.eq_ignore_ascii_case(name)
}

/// Returns the part of `key` below [`SECTION`], if `key` lies inside it.
fn strip_section(key: &str) -> Option<&str> {
    let head = key.get(..SECTION.len())?;
    if !head.eq_ignore_ascii_case(SECTION) {
        return None;
    }
    key[SECTION.len()..].strip_prefix(':')
}

fn invalid(key: &str, value: &str, reason: &str) -> DedupError {
    DedupError::InvalidSetting {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    value
        .trim()
        .to_ascii_lowercase()
        .parse::<bool>()
        .map_err(|_| invalid(key, value, "expected true or false"))
}

fn parse_millis(key: &str, value: &str) -> Result<Duration> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| invalid(key, value, "expected a non-negative number of milliseconds"))
}
