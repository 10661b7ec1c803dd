//! nodescale.toml configuration parser.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::identity::WINDOWS_PUBLISHER;

/// Default per-node drain timeout.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Default cap on concurrently draining nodes.
pub const DEFAULT_MAX_CONCURRENT_DRAINS: usize = 32;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScaleConfig {
    pub drain: Option<DrainConfig>,
    pub operation: Option<OperationConfig>,
    pub identity: Option<IdentityConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrainConfig {
    /// Per-node drain timeout, e.g. "60m".
    pub timeout: Option<String>,
    pub max_concurrent: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationConfig {
    /// Deadline for a whole scale operation, e.g. "2h".
    pub timeout: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub windows_publisher: Option<String>,
}

/// Resolved settings with defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaleSettings {
    pub drain_timeout: Duration,
    pub max_concurrent_drains: usize,
    /// Deadline for a whole scale operation. On expiry, drains still in
    /// flight are aborted and their nodes may be left cordoned.
    pub operation_timeout: Option<Duration>,
    pub windows_publisher: String,
}

impl Default for ScaleSettings {
    fn default() -> Self {
        Self {
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            max_concurrent_drains: DEFAULT_MAX_CONCURRENT_DRAINS,
            operation_timeout: None,
            windows_publisher: WINDOWS_PUBLISHER.to_string(),
        }
    }
}

impl ScaleConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply defaults and validate.
    pub fn settings(&self) -> ConfigResult<ScaleSettings> {
        let mut settings = ScaleSettings::default();

        if let Some(drain) = &self.drain {
            if let Some(timeout) = &drain.timeout {
                settings.drain_timeout = parse_duration("drain.timeout", timeout)?;
            }
            if let Some(max) = drain.max_concurrent {
                if max == 0 {
                    return Err(ConfigError::Zero {
                        field: "drain.max_concurrent",
                    });
                }
                settings.max_concurrent_drains = max;
            }
        }

        if let Some(timeout) = self.operation.as_ref().and_then(|o| o.timeout.as_ref()) {
            settings.operation_timeout = Some(parse_duration("operation.timeout", timeout)?);
        }

        if let Some(publisher) = self.identity.as_ref().and_then(|i| i.windows_publisher.as_ref()) {
            settings.windows_publisher = publisher.clone();
        }

        Ok(settings)
    }
}

/// Parse "90s", "60m", "2h" or a bare number of seconds.
pub fn parse_duration(field: &'static str, value: &str) -> ConfigResult<Duration> {
    let s = value.trim();
    let (digits, unit) = if let Some(n) = s.strip_suffix('h') {
        (n, 3600)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1)
    } else {
        (s, 1)
    };

    digits
        .parse::<u64>()
        .map(|n| Duration::from_secs(n * unit))
        .map_err(|_| ConfigError::Duration {
            field,
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let settings = ScaleConfig::from_toml("").unwrap().settings().unwrap();
        assert_eq!(settings, ScaleSettings::default());
        assert_eq!(settings.drain_timeout, Duration::from_secs(3600));
        assert_eq!(settings.operation_timeout, None);
    }

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
[drain]
timeout = "15m"
max_concurrent = 4

[operation]
timeout = "2h"

[identity]
windows_publisher = "ContosoWindows"
"#;
        let settings = ScaleConfig::from_toml(toml_str).unwrap().settings().unwrap();
        assert_eq!(settings.drain_timeout, Duration::from_secs(15 * 60));
        assert_eq!(settings.max_concurrent_drains, 4);
        assert_eq!(settings.operation_timeout, Some(Duration::from_secs(7200)));
        assert_eq!(settings.windows_publisher, "ContosoWindows");
    }

    #[test]
    fn rejects_bad_values() {
        let cfg = ScaleConfig::from_toml("[drain]\ntimeout = \"soon\"").unwrap();
        assert!(matches!(cfg.settings(), Err(ConfigError::Duration { .. })));

        let cfg = ScaleConfig::from_toml("[drain]\nmax_concurrent = 0").unwrap();
        assert!(matches!(cfg.settings(), Err(ConfigError::Zero { .. })));
    }

    #[test]
    fn parse_duration_values() {
        assert_eq!(parse_duration("t", "30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("t", "5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("t", "1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("t", "45").unwrap(), Duration::from_secs(45));
        assert!(parse_duration("t", "").is_err());
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nodescale.toml");
        std::fs::write(&path, "[drain]\ntimeout = \"10m\"\n").unwrap();
        let settings = ScaleConfig::from_file(&path).unwrap().settings().unwrap();
        assert_eq!(settings.drain_timeout, Duration::from_secs(600));

        assert!(ScaleConfig::from_file(&dir.path().join("missing.toml")).is_err());
    }
}
