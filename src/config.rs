// src/config.rs

//! Loads and validates the main TOML configuration file and the per-cluster
//! YAML settings it references via `include_dir`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::types::ClusterSetting;

/// A raw representation of the config file before defaults and validation.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(default = "default_listen_address")]
    listen_address: String,
    #[serde(default = "default_listen_port")]
    listen_port: u16,
    #[serde(default)]
    include_dir: String,
    #[serde(default = "default_save_state_dir")]
    save_state_dir: String,
    #[serde(default)]
    log_base_dir: String,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default = "default_timeout")]
    timeout: u64,
    #[serde(default)]
    tls: TlsConfig,
    #[serde(default)]
    metrics: MetricsConfig,
}

fn default_listen_address() -> String {
    "0.0.0.0".to_string()
}
fn default_listen_port() -> u16 {
    8443
}
fn default_save_state_dir() -> String {
    "/tmp/goahead/".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_timeout() -> u64 {
    5
}

/// TLS / mutual-TLS settings for the HTTPS listener.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct TlsConfig {
    #[serde(default, rename = "ssl_private_key")]
    pub private_key: String,
    #[serde(default, rename = "ssl_certificate_file")]
    pub certificate_file: String,
    #[serde(default, rename = "ssl_require_and_verify_client_cert")]
    pub require_and_verify_client_cert: bool,
    #[serde(default, rename = "ssl_client_cert_ca_file")]
    pub client_cert_ca_file: String,
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

fn default_metrics_port() -> u16 {
    9443
}

/// The final, validated server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_address: String,
    pub listen_port: u16,
    pub include_dir: String,
    pub save_state_dir: PathBuf,
    pub log_base_dir: PathBuf,
    pub log_level: String,
    pub timeout: u64,
    pub tls: TlsConfig,
    pub metrics: MetricsConfig,
}

impl Config {
    /// Reads and parses the TOML config file at `path`, applies defaults,
    /// creates `save_state_dir` if missing, and validates the result.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file at '{path}'"))?;
        let raw: RawConfig = toml::from_str(&contents)
            .with_context(|| format!("failed to parse TOML from '{path}'"))?;

        let config = Config {
            listen_address: raw.listen_address,
            listen_port: raw.listen_port,
            include_dir: raw.include_dir,
            save_state_dir: PathBuf::from(raw.save_state_dir),
            log_base_dir: PathBuf::from(raw.log_base_dir),
            log_level: raw.log_level,
            timeout: raw.timeout,
            tls: raw.tls,
            metrics: raw.metrics,
        };

        config.validate()?;
        check_dir_and_create(&config.save_state_dir)
            .with_context(|| "save_state_dir setting is unusable")?;
        if !config.log_base_dir.as_os_str().is_empty() {
            check_dir_and_create(&config.log_base_dir)
                .with_context(|| "log_base_dir setting is unusable")?;
        }

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.listen_port == 0 {
            return Err(anyhow!("listen_port cannot be 0"));
        }
        if self.listen_address.trim().is_empty() {
            return Err(anyhow!("listen_address cannot be empty"));
        }
        if !Path::new(&self.tls.private_key).exists() {
            return Err(anyhow!(
                "configured ssl_private_key '{}' does not exist",
                self.tls.private_key
            ));
        }
        if !Path::new(&self.tls.certificate_file).exists() {
            return Err(anyhow!(
                "configured ssl_certificate_file '{}' does not exist",
                self.tls.certificate_file
            ));
        }
        if self.tls.require_and_verify_client_cert && !Path::new(&self.tls.client_cert_ca_file).exists()
        {
            return Err(anyhow!(
                "configured ssl_client_cert_ca_file '{}' does not exist",
                self.tls.client_cert_ca_file
            ));
        }
        if self.metrics.enabled && self.metrics.port == self.listen_port {
            return Err(anyhow!(
                "metrics.port cannot be the same as listen_port"
            ));
        }
        Ok(())
    }
}

fn check_dir_and_create(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create directory '{}'", dir.display()))?;
    } else if !dir.is_dir() {
        return Err(anyhow!("'{}' exists but is not a directory", dir.display()));
    }
    Ok(())
}

/// Scans `include_dir` for `*.yml`/`*.yaml` cluster settings documents and
/// merges every `{cluster_name: ClusterSetting}` mapping they contain.
pub fn load_cluster_settings(include_dir: &str) -> Result<HashMap<String, ClusterSetting>> {
    let mut settings = HashMap::new();
    if include_dir.is_empty() {
        return Ok(settings);
    }
    let dir = Path::new(include_dir);
    if !dir.is_dir() {
        return Ok(settings);
    }

    let mut matches: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("failed to read include_dir '{include_dir}'"))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yml") | Some("yaml")
            )
        })
        .collect();
    matches.sort();

    if matches.is_empty() {
        return Err(anyhow!(
            "could not find any cluster settings matching {include_dir}/*.yml"
        ));
    }

    for path in matches {
        let data = fs::read_to_string(&path)
            .with_context(|| format!("error reading cluster settings file {}", path.display()))?;
        let parsed: HashMap<String, ClusterSetting> = serde_yaml::from_str(&data)
            .with_context(|| format!("YAML unmarshal error in {}", path.display()))?;
        for (cluster_name, setting) in parsed {
            settings.insert(cluster_name, setting);
        }
    }

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_cluster_settings_merges_multiple_yaml_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("foobar.yml"),
            r#"
foobar-server:
  enabled: true
  name_pattern: "^foobar-server-.*"
  allowed_parallel_restarts: 2
  minimum_uptime: "30m"
  reboot_completion_check: "/bin/true"
  reboot_completion_check_interval: "10s"
  reboot_completion_check_offset: "1m"
  reboot_completion_check_consecutive_successes: 3
"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("other.yaml"),
            r#"
other-server:
  enabled: true
  name_pattern: "^other-.*"
  allowed_parallel_restarts: 1
  minimum_uptime: "5m"
  reboot_completion_check: "/bin/true"
  reboot_completion_check_interval: "10s"
  reboot_completion_check_offset: "1m"
  reboot_completion_check_consecutive_successes: 1
"#,
        )
        .unwrap();

        let settings = load_cluster_settings(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(settings.len(), 2);
        assert!(settings.contains_key("foobar-server"));
        assert!(settings.contains_key("other-server"));
    }

    #[test]
    fn load_cluster_settings_errors_when_include_dir_has_no_matches() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("readme.txt"), "not a cluster file").unwrap();
        let result = load_cluster_settings(dir.path().to_str().unwrap());
        assert!(result.is_err());
    }

    #[test]
    fn load_cluster_settings_is_empty_when_include_dir_is_blank() {
        let settings = load_cluster_settings("").unwrap();
        assert!(settings.is_empty());
    }

    #[test]
    fn validate_rejects_zero_port() {
        let config = Config {
            listen_address: "0.0.0.0".to_string(),
            listen_port: 0,
            include_dir: String::new(),
            save_state_dir: PathBuf::from("/tmp/goahead-test"),
            log_base_dir: PathBuf::new(),
            log_level: "info".to_string(),
            timeout: 5,
            tls: TlsConfig::default(),
            metrics: MetricsConfig::default(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_missing_tls_material() {
        let config = Config {
            listen_address: "0.0.0.0".to_string(),
            listen_port: 8443,
            include_dir: String::new(),
            save_state_dir: PathBuf::from("/tmp/goahead-test"),
            log_base_dir: PathBuf::new(),
            log_level: "info".to_string(),
            timeout: 5,
            tls: TlsConfig {
                private_key: "/no/such/key.pem".to_string(),
                certificate_file: "/no/such/cert.pem".to_string(),
                require_and_verify_client_cert: false,
                client_cert_ca_file: String::new(),
            },
            metrics: MetricsConfig::default(),
        };
        assert!(config.validate().is_err());
    }
}
