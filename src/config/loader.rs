// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::config::consts::{
    DEFAULT_ACTIVITY_TIMEOUT_MS, DEFAULT_EXPIRATION_MS, DEFAULT_IDLE_TIME_MS,
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_SERVER_ACTIVITY_TIMEOUT_MS,
};
use crate::config::Options;
use crate::errors::ConfigError;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Environment configuration.
///
/// Every section is optional; missing fields take the defaults in
/// [`crate::config::consts`]. The `options` tree seeds the environment's
/// top-level [`Options`].
///
/// # Example
/// ```yaml
/// dispatcher:
///   poll_interval_ms: 200
///   idle_time_ms: 100
/// name_service:
///   group_name: blue
///   default_expiration_ms: 1000
///   server_activity_timeout_ms: 5000
/// service_groups:
///   activity_timeout_ms: 1200
/// options:
///   name_server_options:
///     name_server_address: 127.0.0.1
/// ```
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct EnvConfig {
    pub dispatcher: DispatcherConfig,
    pub name_service: NameServiceConfig,
    pub service_groups: ServiceGroupConfig,
    pub options: serde_yaml::Value,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DispatcherConfig {
    pub poll_interval_ms: u64,
    pub idle_time_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            idle_time_ms: DEFAULT_IDLE_TIME_MS,
        }
    }
}

impl DispatcherConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn idle_time(&self) -> Duration {
        Duration::from_millis(self.idle_time_ms)
    }
}

/// Name-service client settings.
///
/// # Fields
/// * `group_name` - Store used when an operation's options name none
/// * `default_expiration_ms` - Expiration used by callers that do not pick one
/// * `server_activity_timeout_ms` - Silence after which a name server is forgotten
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct NameServiceConfig {
    pub group_name: Option<String>,
    pub default_expiration_ms: u64,
    pub server_activity_timeout_ms: u64,
}

impl Default for NameServiceConfig {
    fn default() -> Self {
        Self {
            group_name: None,
            default_expiration_ms: DEFAULT_EXPIRATION_MS,
            server_activity_timeout_ms: DEFAULT_SERVER_ACTIVITY_TIMEOUT_MS,
        }
    }
}

impl NameServiceConfig {
    pub fn server_activity_timeout(&self) -> Duration {
        Duration::from_millis(self.server_activity_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceGroupConfig {
    pub activity_timeout_ms: u64,
}

impl Default for ServiceGroupConfig {
    fn default() -> Self {
        Self {
            activity_timeout_ms: DEFAULT_ACTIVITY_TIMEOUT_MS,
        }
    }
}

impl ServiceGroupConfig {
    pub fn activity_timeout(&self) -> Duration {
        Duration::from_millis(self.activity_timeout_ms)
    }
}

impl EnvConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Reject values the dispatcher or the trackers cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let intervals = [
            ("dispatcher.poll_interval_ms", self.dispatcher.poll_interval_ms),
            ("name_service.default_expiration_ms", self.name_service.default_expiration_ms),
            (
                "name_service.server_activity_timeout_ms",
                self.name_service.server_activity_timeout_ms,
            ),
            ("service_groups.activity_timeout_ms", self.service_groups.activity_timeout_ms),
        ];

        for (field, value) in intervals {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        if let Some(group) = &self.name_service.group_name {
            if group.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field: "name_service.group_name",
                    reason: "must not be blank".to_string(),
                });
            }
        }

        Ok(())
    }

    /// The `options` tree as an option set.
    pub fn options(&self) -> Result<Options, ConfigError> {
        Ok(Options::from_value(&self.options)?)
    }
}

/// Load a config file; `.toml` files are parsed as TOML, anything else as YAML.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<EnvConfig, ConfigError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => EnvConfig::from_toml_str(&content),
        _ => EnvConfig::from_yaml_str(&content),
    }
}

pub fn load_and_validate_config<P: AsRef<Path>>(path: P) -> Result<EnvConfig, ConfigError> {
    let cfg = load_config(path)?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_empty_config_uses_defaults() {
        let cfg = EnvConfig::from_yaml_str("{}").unwrap();
        assert_eq!(cfg.dispatcher.poll_interval(), Duration::from_millis(200));
        assert_eq!(cfg.dispatcher.idle_time_ms, 100);
        assert_eq!(cfg.name_service.default_expiration_ms, 1000);
        assert_eq!(cfg.name_service.server_activity_timeout_ms, 5000);
        assert_eq!(cfg.service_groups.activity_timeout(), Duration::from_millis(1200));
        assert!(cfg.options().unwrap().is_empty());
    }

    #[test]
    fn parse_partial_yaml_config() {
        let yaml = r#"
dispatcher:
  poll_interval_ms: 50
name_service:
  group_name: blue
options:
  group_name: blue
  name_server_options:
    name_server_address: 127.0.0.1
"#;
        let cfg = EnvConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(cfg.dispatcher.poll_interval_ms, 50);
        assert_eq!(cfg.dispatcher.idle_time_ms, 100);
        assert_eq!(cfg.name_service.group_name.as_deref(), Some("blue"));

        let options = cfg.options().unwrap();
        assert_eq!(options.find_text("group_name"), Some("blue"));
        assert!(options.find_sub_option("name_server_options").is_some());
    }

    #[test]
    fn parse_toml_config() {
        let toml_src = r#"
[dispatcher]
poll_interval_ms = 75

[service_groups]
activity_timeout_ms = 3000

[options]
fault_tolerant_state = "active"
"#;
        let cfg = EnvConfig::from_toml_str(toml_src).unwrap();
        assert_eq!(cfg.dispatcher.poll_interval_ms, 75);
        assert_eq!(cfg.service_groups.activity_timeout_ms, 3000);
        assert_eq!(cfg.options().unwrap().find_text("fault_tolerant_state"), Some("active"));
    }

    #[test]
    fn test_validate_rejects_zero_intervals() {
        struct TestCase {
            yaml: &'static str,
            field: &'static str,
        }

        let cases = vec![
            TestCase {
                yaml: "dispatcher: { poll_interval_ms: 0 }",
                field: "dispatcher.poll_interval_ms",
            },
            TestCase {
                yaml: "name_service: { default_expiration_ms: 0 }",
                field: "name_service.default_expiration_ms",
            },
            TestCase {
                yaml: "service_groups: { activity_timeout_ms: 0 }",
                field: "service_groups.activity_timeout_ms",
            },
            TestCase {
                yaml: "name_service: { group_name: '  ' }",
                field: "name_service.group_name",
            },
        ];

        for case in cases {
            let cfg = EnvConfig::from_yaml_str(case.yaml).unwrap();
            match cfg.validate() {
                Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, case.field),
                other => panic!("{}: expected Invalid, got {:?}", case.yaml, other),
            }
        }
    }

    #[test]
    fn test_load_and_validate_picks_format_by_extension() {
        let dir = tempfile::tempdir().unwrap();

        let yaml_path = dir.path().join("env.yaml");
        std::fs::write(&yaml_path, "dispatcher:\n  poll_interval_ms: 10\n").unwrap();
        assert_eq!(
            load_and_validate_config(&yaml_path).unwrap().dispatcher.poll_interval_ms,
            10
        );

        let toml_path = dir.path().join("env.toml");
        let mut file = std::fs::File::create(&toml_path).unwrap();
        writeln!(file, "[dispatcher]\npoll_interval_ms = 20").unwrap();
        assert_eq!(
            load_and_validate_config(&toml_path).unwrap().dispatcher.poll_interval_ms,
            20
        );
    }

    #[test]
    fn test_load_missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.yaml");

        match load_config(&missing) {
            Err(ConfigError::Io { path, .. }) => assert_eq!(path, missing),
            other => panic!("expected Io error, got {:?}", other),
        }
    }

    #[test]
    fn test_load_rejects_malformed_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "dispatcher: [unterminated").unwrap();
        assert!(matches!(load_config(file.path()), Err(ConfigError::Yaml(_))));
    }
}
