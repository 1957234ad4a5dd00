use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::broker::DEFAULT_QUEUE_CAPACITY;
use crate::runtime_api::DEFAULT_API_VERSION;

/// Settings shared by the broker, the Runtime API and the supervisor.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Version segment of the Runtime API paths.
    pub api_version: String,
    /// Maximum duration of one invocation, advertised to the function through
    /// the deadline header. Not enforced.
    #[serde(deserialize_with = "deserialize_duration")]
    pub max_duration: Duration,
    pub deadline: DeadlineMode,
    pub queue_capacity: usize,
    /// Give up on an invocation after this long. `None` waits forever.
    #[serde(deserialize_with = "deserialize_optional_duration")]
    pub invoke_timeout: Option<Duration>,
    /// Fail outstanding invocations with `Abandoned` when the supervisor
    /// closes, instead of leaving their callers suspended.
    pub abandon_on_close: bool,
    /// Name used in the invoked-function ARN. Defaults to the executable's
    /// file stem.
    pub function_name: Option<String>,
    pub region: String,
    pub max_payload_bytes: usize,
}

/// How the deadline header is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeadlineMode {
    /// Unix epoch milliseconds at which the invocation should be finished.
    #[default]
    Absolute,
    /// The configured maximum duration in milliseconds.
    Relative,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            api_version: DEFAULT_API_VERSION.into(),
            max_duration: Duration::from_secs(10),
            deadline: DeadlineMode::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            invoke_timeout: None,
            abandon_on_close: true,
            function_name: None,
            region: "us-east-1".into(),
            max_payload_bytes: 6 * 1024 * 1024,
        }
    }
}

impl RuntimeConfig {
    pub fn with_max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = max_duration;
        self
    }

    pub fn with_invoke_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.invoke_timeout = timeout;
        self
    }

    pub fn with_deadline(mut self, deadline: DeadlineMode) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_function_name(mut self, name: impl Into<String>) -> Self {
        self.function_name = Some(name.into());
        self
    }
}

/// Parse a duration such as `500ms`, `30s`, `2m` or `1h`. A bare number is
/// taken as seconds.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    let (digits, unit) = input.split_at(split);
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration '{input}'"))?;

    match unit.trim() {
        "ms" => Ok(Duration::from_millis(value)),
        "" | "s" => Ok(Duration::from_secs(value)),
        "m" => scaled(value, 60, input),
        "h" => scaled(value, 3600, input),
        other => Err(format!("unknown duration unit '{other}' in '{input}'")),
    }
}

fn scaled(value: u64, seconds_per_unit: u64, input: &str) -> Result<Duration, String> {
    value
        .checked_mul(seconds_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{input}' is too large"))
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_duration(&raw).map_err(serde::de::Error::custom)
}

fn deserialize_optional_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    raw.map(|s| parse_duration(&s).map_err(serde::de::Error::custom))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_duration_units() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("7").unwrap(), Duration::from_secs(7));
    }

    #[test]
    fn rejects_bad_durations() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("fast").is_err());
        assert!(parse_duration("10d").is_err());
        assert!(parse_duration("18446744073709551615h").is_err());
        assert!(parse_duration("18446744073709551615m").is_err());
        assert!(parse_duration("99999999999999999999s").is_err());
    }

    #[test]
    fn defaults_match_runtime_api() {
        let config = RuntimeConfig::default();
        assert_eq!(config.api_version, "2018-06-01");
        assert_eq!(config.queue_capacity, 16);
        assert_eq!(config.deadline, DeadlineMode::Absolute);
        assert!(config.invoke_timeout.is_none());
        assert!(config.abandon_on_close);
    }

    #[test]
    fn parses_partial_toml() {
        let config: RuntimeConfig = toml::from_str(
            r#"
max_duration = "45s"
deadline = "relative"
invoke_timeout = "2m"
abandon_on_close = false
"#,
        )
        .unwrap();
        assert_eq!(config.max_duration, Duration::from_secs(45));
        assert_eq!(config.deadline, DeadlineMode::Relative);
        assert_eq!(config.invoke_timeout, Some(Duration::from_secs(120)));
        assert!(!config.abandon_on_close);
        assert_eq!(config.queue_capacity, 16);
    }
}
