//! Engine configuration.
//!
//! [`EngineConfig`] is built either with its setters or from string
//! key/value pairs, for example environment variables:
//!
//! ```rust
//! use std::time::Duration;
//! use nbfsm_core::EngineConfig;
//!
//! let config = EngineConfig::from_params_with_prefix(
//!     "NBFSM_",
//!     [("NBFSM_TRACE", "true"), ("NBFSM_QUIESCE_TIMEOUT", "2s"), ("HOME", "/root")],
//! )
//! .unwrap();
//! assert!(config.trace);
//! assert_eq!(config.quiesce_timeout, Some(Duration::from_secs(2)));
//! ```

use std::time::Duration;

/// Default bound on follow-up instructions resolved for one event.
pub const DEFAULT_MAX_CASCADE_DEPTH: usize = 1024;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown engine parameter `{0}`")]
    Unknown(String),
    #[error("invalid value `{value}` for `{key}`: {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

/// Runtime settings of a machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Log committed transitions at `info` instead of `debug`.
    pub trace: bool,
    /// Upper bound on how long `quiesce_then_stop` waits for pending events.
    /// `None` waits forever.
    pub quiesce_timeout: Option<Duration>,
    /// How many instructions one event may resolve, counting its own.
    pub max_cascade_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            trace: false,
            quiesce_timeout: None,
            max_cascade_depth: DEFAULT_MAX_CASCADE_DEPTH,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    #[must_use]
    pub fn with_quiesce_timeout(mut self, timeout: Duration) -> Self {
        self.quiesce_timeout = Some(timeout);
        self
    }

    /// Sets the cascade bound. Values below 1 are raised to 1.
    #[must_use]
    pub fn with_max_cascade_depth(mut self, depth: usize) -> Self {
        self.max_cascade_depth = depth.max(1);
        self
    }

    /// Builds a configuration from key/value pairs.
    ///
    /// Keys are matched case-insensitively and `-` or `.` may stand in for
    /// `_`. Recognised keys are `trace`, `quiesce_timeout` (a humantime
    /// duration such as `500ms`, or `none`) and `max_cascade_depth`.
    pub fn from_params<I, K, V>(params: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();
        for (key, value) in params {
            config.apply(&normalize(key.as_ref()), value.as_ref())?;
        }
        Ok(config)
    }

    /// Like [`from_params`](Self::from_params), but only looks at keys that
    /// start with `prefix` and strips it. Other keys are ignored.
    pub fn from_params_with_prefix<I, K, V>(prefix: &str, params: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let prefix = normalize(prefix);
        let mut config = Self::default();
        for (key, value) in params {
            let key = normalize(key.as_ref());
            if let Some(stripped) = key.strip_prefix(&prefix) {
                config.apply(stripped, value.as_ref())?;
            }
        }
        Ok(config)
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let value = value.trim();
        match key {
            "trace" => self.trace = parse_bool(key, value)?,
            "quiesce_timeout" => {
                self.quiesce_timeout = if value.eq_ignore_ascii_case("none") {
                    None
                } else {
                    Some(
                        humantime::parse_duration(value)
                            .map_err(|err| invalid(key, value, err.to_string()))?,
                    )
                };
            }
            "max_cascade_depth" => {
                let depth: usize = value
                    .parse()
                    .map_err(|err: std::num::ParseIntError| invalid(key, value, err.to_string()))?;
                if depth == 0 {
                    return Err(invalid(key, value, "must be at least 1".into()));
                }
                self.max_cascade_depth = depth;
            }
            other => return Err(ConfigError::Unknown(other.to_string())),
        }
        Ok(())
    }
}

fn normalize(key: &str) -> String {
    key.trim()
        .chars()
        .map(|c| match c {
            '-' | '.' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, value, "expected a boolean".into())),
    }
}

fn invalid(key: &str, value: &str, reason: String) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
        reason,
    }
}
