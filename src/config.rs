//! File and environment configuration
//!
//! [`AppConfig`] is loaded with the `config` crate from an optional file plus
//! `RELAY__<SECTION>__<FIELD>` environment variables, then converted into the
//! runtime configs each subsystem takes.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::controller::ControllerConfig;
use crate::probe::ProbeConfig;
use crate::process::TranscoderConfig;
use crate::registry::{RegistryConfig, StreamKey};
use crate::server::ServerConfig;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub relay: RelaySettings,
    pub public: PublicSettings,
    pub probe: ProbeSettings,
    pub transcoder: TranscoderSettings,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
            shutdown_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    /// Streaming server address relays publish into
    pub host: String,
    pub app: String,
    pub default_key: String,
    pub stop_grace_secs: u64,
    pub failure_retention_secs: u64,
    pub max_failures: usize,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1:1935".to_string(),
            app: "live".to_string(),
            default_key: "stream".to_string(),
            stop_grace_secs: 5,
            failure_retention_secs: 60,
            max_failures: 256,
        }
    }
}

/// Externally reachable streaming server addresses returned to callers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublicSettings {
    pub rtmp_host: String,
    pub rtmp_port: u16,
    pub http_host: String,
    pub http_port: u16,
}

impl Default for PublicSettings {
    fn default() -> Self {
        Self {
            rtmp_host: "127.0.0.1".to_string(),
            rtmp_port: 1935,
            http_host: "127.0.0.1".to_string(),
            http_port: 8000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSettings {
    pub enabled: bool,
    pub url: String,
    pub interval_secs: u64,
    pub timeout_secs: u64,
    pub grace_secs: u64,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "http://127.0.0.1:8000/api/streams".to_string(),
            interval_secs: 5,
            timeout_secs: 2,
            grace_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscoderSettings {
    pub binary: String,
    pub realtime: bool,
    pub video_codec: String,
    pub preset: String,
    pub crf: u8,
    pub audio_codec: String,
}

impl Default for TranscoderSettings {
    fn default() -> Self {
        let defaults = TranscoderConfig::default();
        Self {
            binary: defaults.binary,
            realtime: defaults.realtime,
            video_codec: defaults.video_codec,
            preset: defaults.preset,
            crf: defaults.crf,
            audio_codec: defaults.audio_codec,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `trace`, `debug`, `info`, `warn` or `error`
    pub level: String,
    /// `pretty` or `json`
    pub format: String,
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

impl AppConfig {
    /// Load from an optional file, overridden by `RELAY__*` environment
    /// variables (e.g. `RELAY__PROBE__GRACE_SECS=30`)
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_from(config_file, environment())
    }

    fn load_from(config_file: Option<&Path>, env: Environment) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if !path.exists() {
                return Err(ConfigError::Message(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(File::from(path));
        }

        let config: Self = builder.add_source(env).build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        StreamKey::new(self.relay.default_key.as_str())
            .map_err(|e| ConfigError::Message(format!("relay.default_key: {e}")))?;
        if self.probe.interval_secs == 0 {
            return Err(ConfigError::Message(
                "probe.interval_secs must be at least 1".to_string(),
            ));
        }
        if self.relay.app.is_empty() || self.relay.app.contains('/') {
            return Err(ConfigError::Message(format!(
                "relay.app must be a single path segment, got {:?}",
                self.relay.app
            )));
        }
        Ok(())
    }

    /// Parsed API bind address
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server
            .bind
            .parse()
            .map_err(|e| ConfigError::Message(format!("server.bind {:?}: {e}", self.server.bind)))
    }

    pub fn server_config(&self) -> Result<ServerConfig, ConfigError> {
        Ok(ServerConfig::with_addr(self.bind_addr()?)
            .shutdown_timeout(Duration::from_secs(self.server.shutdown_timeout_secs)))
    }

    pub fn registry_config(&self) -> RegistryConfig {
        let t = &self.transcoder;
        let mut transcoder = TranscoderConfig::default()
            .binary(t.binary.as_str())
            .video(t.video_codec.as_str(), t.preset.as_str())
            .crf(t.crf)
            .audio_codec(t.audio_codec.as_str());
        transcoder.realtime = t.realtime;

        RegistryConfig::default()
            .relay_host(self.relay.host.as_str())
            .app(self.relay.app.as_str())
            .stop_grace_period(Duration::from_secs(self.relay.stop_grace_secs))
            .failure_retention(Duration::from_secs(self.relay.failure_retention_secs))
            .max_failures(self.relay.max_failures)
            .transcoder(transcoder)
    }

    pub fn probe_config(&self) -> ProbeConfig {
        let config = ProbeConfig::default()
            .url(self.probe.url.as_str())
            .interval(Duration::from_secs(self.probe.interval_secs))
            .request_timeout(Duration::from_secs(self.probe.timeout_secs))
            .grace_window(Duration::from_secs(self.probe.grace_secs));

        if self.probe.enabled {
            config
        } else {
            config.disabled()
        }
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig::default()
            .default_key(self.relay.default_key.as_str())
            .public_rtmp(format!("{}:{}", self.public.rtmp_host, self.public.rtmp_port))
            .public_http(format!("{}:{}", self.public.http_host, self.public.http_port))
    }
}

fn environment() -> Environment {
    Environment::with_prefix("RELAY")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let map = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        environment().source(Some(map))
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::load_from(None, env(&[])).unwrap();

        assert_eq!(config.bind_addr().unwrap().port(), 3000);
        assert_eq!(config.registry_config().output_uri("cam1"), "rtmp://127.0.0.1:1935/live/cam1");
        assert_eq!(config.probe_config().grace_window, Duration::from_secs(15));
        assert!(config.probe_config().enabled);
        assert_eq!(config.controller_config().default_key, "stream");
        assert_eq!(config.controller_config().public_http, "127.0.0.1:8000");
    }

    #[test]
    fn test_file_then_env_override() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[relay]
host = "media.internal:1935"
app = "cams"

[probe]
grace_secs = 30

[transcoder]
binary = "/opt/ffmpeg/bin/ffmpeg"
crf = 28
"#
        )
        .unwrap();

        let config = AppConfig::load_from(
            Some(file.path()),
            env(&[
                ("RELAY__PROBE__GRACE_SECS", "45"),
                ("RELAY__PROBE__ENABLED", "false"),
                ("RELAY__PUBLIC__RTMP_HOST", "live.example.com"),
                ("RELAY__RELAY__MAX_FAILURES", "16"),
            ]),
        )
        .unwrap();

        let registry = config.registry_config();
        assert_eq!(registry.output_uri("cam1"), "rtmp://media.internal:1935/cams/cam1");
        assert_eq!(registry.transcoder.binary, "/opt/ffmpeg/bin/ffmpeg");
        assert_eq!(registry.transcoder.crf, 28);
        assert_eq!(registry.max_failures, 16);
        assert_eq!(config.probe_config().grace_window, Duration::from_secs(45));
        assert!(!config.probe_config().enabled);
        assert_eq!(config.controller_config().public_rtmp, "live.example.com:1935");
    }

    #[test]
    fn test_missing_file() {
        let result = AppConfig::load_from(Some(Path::new("/nonexistent/relay.toml")), env(&[]));

        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(AppConfig::load_from(None, env(&[("RELAY__SERVER__BIND", "not-an-addr")])).is_err());
        assert!(AppConfig::load_from(None, env(&[("RELAY__RELAY__DEFAULT_KEY", "a/b")])).is_err());
        assert!(AppConfig::load_from(None, env(&[("RELAY__PROBE__INTERVAL_SECS", "0")])).is_err());
    }
}
