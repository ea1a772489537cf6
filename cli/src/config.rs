use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use pidwatt_platform::{CounterConfig, CpuNormalization, DEFAULT_DOMAIN_CLASS, DEFAULT_POWERCAP_ROOT};
use pidwatt_protocol::Normalization;
use serde::{Deserialize, Serialize};
use tracing::Level;

use crate::session::SessionError;

const MIN_RELIABLE_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "off" | "none" => LogLevel::Off,
            "error" => LogLevel::Error,
            "info" => LogLevel::Info,
            "debug" => LogLevel::Debug,
            "trace" => LogLevel::Trace,
            _ => LogLevel::Warn,
        }
    }

    pub fn as_tracing_level(&self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Summary,
    Json,
    Csv,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "summary" | "text" => Some(OutputFormat::Summary),
            "json" => Some(OutputFormat::Json),
            "csv" => Some(OutputFormat::Csv),
            _ => None,
        }
    }
}

fn default_domain_class() -> String {
    DEFAULT_DOMAIN_CLASS.to_string()
}

fn default_powercap_root() -> PathBuf {
    PathBuf::from(DEFAULT_POWERCAP_ROOT)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    pub sampling_interval_ms: u64,
    pub timeout_ms: Option<u64>,
    pub normalization: Normalization,
    pub sockets: usize,
    #[serde(default = "default_domain_class")]
    pub domain_class: String,
    #[serde(default = "default_powercap_root")]
    pub powercap_root: PathBuf,
    pub kill_grace_ms: u64,
    pub output_format: OutputFormat,
    pub log_level: LogLevel,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            sampling_interval_ms: 200,
            timeout_ms: None,
            normalization: Normalization::PerCore,
            sockets: 1,
            domain_class: default_domain_class(),
            powercap_root: default_powercap_root(),
            kill_grace_ms: 2000,
            output_format: OutputFormat::Summary,
            log_level: LogLevel::Warn,
        }
    }
}

pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("pidwatt")
}

pub fn runtime_dir() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::cache_dir)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("pidwatt")
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

pub fn ensure_dirs() -> std::io::Result<()> {
    fs::create_dir_all(config_dir())
}

/// Per-run overrides collected from the command line.
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub interval_ms: Option<u64>,
    pub timeout: Option<Duration>,
    pub normalization: Option<Normalization>,
    pub sockets: Option<usize>,
    pub domain_class: Option<String>,
    pub powercap_root: Option<PathBuf>,
    pub format: Option<OutputFormat>,
}

impl UserConfig {
    pub fn load() -> Self {
        let path = config_path();
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(content) => Self::from_toml(&content),
            Err(_) => Self::default(),
        }
    }

    pub fn from_toml(content: &str) -> Self {
        match toml::from_str(content) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %e, "invalid config file, using defaults");
                Self::default()
            }
        }
    }

    pub fn save(&self) -> std::io::Result<()> {
        let _ = ensure_dirs();
        let path = config_path();
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        fs::write(path, content)
    }

    pub fn merge_with_args(&mut self, overrides: &RunOverrides) {
        if let Some(ms) = overrides.interval_ms {
            self.sampling_interval_ms = ms;
        }
        if let Some(timeout) = overrides.timeout {
            // Rounded up so only a zero timeout reads as zero.
            self.timeout_ms = Some(timeout.as_nanos().div_ceil(1_000_000) as u64);
        }
        if let Some(mode) = overrides.normalization {
            self.normalization = mode;
        }
        if let Some(sockets) = overrides.sockets {
            self.sockets = sockets;
        }
        if let Some(ref class) = overrides.domain_class {
            self.domain_class = class.clone();
        }
        if let Some(ref root) = overrides.powercap_root {
            self.powercap_root = root.clone();
        }
        if let Some(format) = overrides.format {
            self.output_format = format;
        }
    }
}

/// Explicit settings for one sampling session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub sampling_interval: Duration,
    pub timeout: Option<Duration>,
    pub normalization: Normalization,
    pub sockets: usize,
    pub domain_class: String,
    pub powercap_root: PathBuf,
    pub kill_grace: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_user(&UserConfig::default())
    }
}

impl SessionConfig {
    pub fn from_user(config: &UserConfig) -> Self {
        Self {
            sampling_interval: Duration::from_millis(config.sampling_interval_ms),
            timeout: config.timeout_ms.map(Duration::from_millis),
            normalization: config.normalization,
            sockets: config.sockets,
            domain_class: config.domain_class.clone(),
            powercap_root: config.powercap_root.clone(),
            kill_grace: Duration::from_millis(config.kill_grace_ms),
        }
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        if self.sampling_interval.is_zero() {
            return Err(SessionError::InvalidConfig(
                "sampling interval must be greater than zero".to_string(),
            ));
        }
        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(SessionError::InvalidConfig(
                "timeout must be greater than zero".to_string(),
            ));
        }
        if self.sockets == 0 {
            return Err(SessionError::InvalidConfig(
                "at least one energy domain is required".to_string(),
            ));
        }
        if self.sampling_interval < MIN_RELIABLE_INTERVAL {
            tracing::warn!(
                interval_ms = self.sampling_interval.as_millis() as u64,
                "sampling interval is below the CPU accounting resolution; readings will be noisy"
            );
        }
        Ok(())
    }

    pub fn cpu_normalization(&self) -> CpuNormalization {
        match self.normalization {
            Normalization::PerCore => CpuNormalization::PerCore,
            Normalization::Irix => CpuNormalization::Irix,
        }
    }

    pub fn counter_config(&self) -> CounterConfig {
        CounterConfig {
            powercap_root: self.powercap_root.clone(),
            domain_class: self.domain_class.clone(),
            sockets: self.sockets,
            sampling_interval: self.sampling_interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_round_trip_through_toml() {
        let config = UserConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed = UserConfig::from_toml(&text);

        assert_eq!(parsed.sampling_interval_ms, 200);
        assert_eq!(parsed.normalization, Normalization::PerCore);
        assert_eq!(parsed.domain_class, "package");
        assert_eq!(parsed.powercap_root, PathBuf::from(DEFAULT_POWERCAP_ROOT));
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let parsed = UserConfig::from_toml(
            r#"
            sampling_interval_ms = 500
            normalization = "irix"
            sockets = 2
            "#,
        );

        assert_eq!(parsed.sampling_interval_ms, 500);
        assert_eq!(parsed.normalization, Normalization::Irix);
        assert_eq!(parsed.sockets, 2);
        assert_eq!(parsed.kill_grace_ms, 2000);
        assert_eq!(parsed.timeout_ms, None);
    }

    #[test]
    fn test_invalid_config_falls_back() {
        let parsed = UserConfig::from_toml("sampling_interval_ms = \"fast\"");
        assert_eq!(parsed.sampling_interval_ms, 200);
    }

    #[test]
    fn test_cli_overrides_win() {
        let mut config = UserConfig::default();
        config.merge_with_args(&RunOverrides {
            interval_ms: Some(50),
            timeout: Some(Duration::from_secs(30)),
            normalization: Some(Normalization::Irix),
            sockets: Some(2),
            format: Some(OutputFormat::Csv),
            ..Default::default()
        });

        let session = SessionConfig::from_user(&config);
        assert_eq!(session.sampling_interval, Duration::from_millis(50));
        assert_eq!(session.timeout, Some(Duration::from_secs(30)));
        assert_eq!(session.cpu_normalization(), CpuNormalization::Irix);
        assert_eq!(session.counter_config().sockets, 2);
        assert_eq!(config.output_format, OutputFormat::Csv);
    }

    fn session_with_timeout(text: &str) -> SessionConfig {
        let mut config = UserConfig::default();
        config.merge_with_args(&RunOverrides {
            timeout: Some(humantime::parse_duration(text).unwrap()),
            ..Default::default()
        });
        SessionConfig::from_user(&config)
    }

    #[test]
    fn test_timeout_override_keeps_sub_second_precision() {
        let session = session_with_timeout("1500ms");
        assert_eq!(session.timeout, Some(Duration::from_millis(1500)));
        assert!(session.validate().is_ok());

        let session = session_with_timeout("2s 900ms");
        assert_eq!(session.timeout, Some(Duration::from_millis(2900)));
    }

    #[test]
    fn test_zero_timeout_override_is_rejected() {
        let session = session_with_timeout("0s");
        assert_eq!(session.timeout, Some(Duration::ZERO));
        assert!(matches!(
            session.validate(),
            Err(SessionError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validation() {
        assert!(SessionConfig::default().validate().is_ok());

        let zero_interval = SessionConfig {
            sampling_interval: Duration::ZERO,
            ..SessionConfig::default()
        };
        assert!(zero_interval.validate().is_err());

        let zero_timeout = SessionConfig {
            timeout: Some(Duration::ZERO),
            ..SessionConfig::default()
        };
        assert!(zero_timeout.validate().is_err());

        let no_sockets = SessionConfig {
            sockets: 0,
            ..SessionConfig::default()
        };
        assert!(no_sockets.validate().is_err());
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(LogLevel::from_str("DEBUG"), LogLevel::Debug);
        assert_eq!(LogLevel::from_str("off"), LogLevel::Off);
        assert_eq!(LogLevel::from_str("nonsense"), LogLevel::Warn);
        assert_eq!(LogLevel::Off.as_tracing_level(), None);
    }
}
