//! Configuration file handling for visioniq.
//!
//! Loads configuration from `~/.config/visioniq/config.toml` or a custom path.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::capture::{Resolution, UploadLimits};
use crate::controller::Backend;
use crate::identify::{
    Identifier, IdentifyError, MockIdentifier, RemoteIdentifier, RetryPolicy, DEFAULT_BASE_URL,
};
use crate::session::SessionSettings;
use crate::simulated::{SimulatedCamera, SimulatedFailure};

/// Frame size produced by the simulated camera.
const SIMULATED_FRAME_SIZE: Resolution = Resolution::HIGH;

/// Template written by `visioniq config init`.
pub const DEFAULT_CONFIG: &str = r#"# visioniq configuration

[camera]
# Device id to select instead of the default (the last listed device)
# device = "cam0"
# Simulated devices, in enumeration order
devices = ["Front Camera", "Back Camera"]
# Force acquisition failures: none, denied, not-found, busy, unsupported
failure = "none"

[capture]
# Size of stills drawn from the live stream (WIDTHxHEIGHT)
resolution = "640x480"

[upload]
# Largest accepted file in bytes
max_bytes = 10485760
# Largest accepted width or height in pixels
max_dimension = 8192

[identify]
# mock or remote
backend = "mock"
mock_delay_ms = 2000
# Remote backend; the API key is read from VISIONIQ_API_KEY
base_url = "https://api.visioniq.app"
timeout_secs = 30
max_retries = 3
"#;

/// Configuration file structure for visioniq.
/// Loaded from ~/.config/visioniq/config.toml (or custom path via --config).
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub upload: UploadLimits,
    #[serde(default)]
    pub identify: IdentifyConfig,
}

#[derive(Debug, Deserialize)]
pub struct CameraConfig {
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default = "default_devices")]
    pub devices: Vec<String>,
    #[serde(default)]
    pub failure: SimulatedFailure,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: None,
            devices: default_devices(),
            failure: SimulatedFailure::None,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct CaptureConfig {
    #[serde(default)]
    pub resolution: Resolution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifyBackend {
    #[default]
    Mock,
    Remote,
}

#[derive(Debug, Deserialize)]
pub struct IdentifyConfig {
    #[serde(default)]
    pub backend: IdentifyBackend,
    #[serde(default = "default_mock_delay_ms")]
    pub mock_delay_ms: u64,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for IdentifyConfig {
    fn default() -> Self {
        Self {
            backend: IdentifyBackend::Mock,
            mock_delay_ms: default_mock_delay_ms(),
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_devices() -> Vec<String> {
    vec!["Front Camera".to_string(), "Back Camera".to_string()]
}

fn default_mock_delay_ms() -> u64 {
    2000
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    RetryPolicy::DEFAULT_MAX_RETRIES
}

impl Config {
    /// Load configuration from the default path.
    /// Returns default config if the file doesn't exist.
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let path = default_path();
        if path.exists() {
            Self::read(&path)
        } else {
            Ok(Config::default())
        }
    }

    /// Load configuration from a path given on the command line.
    /// Unlike [`Config::load`], a missing file is an error.
    pub fn load_from_explicit(path: PathBuf) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound { path });
        }
        Self::read(&path)
    }

    /// `--config` if given, otherwise the default path.
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from_explicit(path.to_path_buf()),
            None => Self::load(),
        }
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            capture_size: self.capture.resolution,
            upload_limits: self.upload,
            preferred_device: self.camera.device.clone(),
        }
    }

    pub fn simulated_camera(&self) -> SimulatedCamera {
        SimulatedCamera::with_failure(
            &self.camera.devices,
            SIMULATED_FRAME_SIZE,
            self.camera.failure,
        )
    }

    /// Build the configured identification backend. The remote backend
    /// needs `VISIONIQ_API_KEY`.
    pub fn identifier(&self) -> Result<Arc<dyn Identifier>, IdentifyError> {
        let cfg = &self.identify;
        match cfg.backend {
            IdentifyBackend::Mock => Ok(Arc::new(MockIdentifier::with_delay(
                Duration::from_millis(cfg.mock_delay_ms),
            ))),
            IdentifyBackend::Remote => {
                let retry = RetryPolicy {
                    max_retries: cfg.max_retries,
                    ..RetryPolicy::default()
                };
                let client =
                    RemoteIdentifier::from_env(&cfg.base_url, Duration::from_secs(cfg.timeout_secs))?
                        .with_retry(retry);
                Ok(Arc::new(client))
            }
        }
    }

    /// Wire the simulated camera and the configured identifier together.
    pub fn backend(&self) -> Result<Backend, IdentifyError> {
        let camera = self.simulated_camera();
        Ok(Backend {
            devices: Arc::new(camera.clone()),
            streams: Arc::new(camera.clone()),
            permissions: Some(Arc::new(camera)),
            identifier: self.identifier()?,
        })
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    NotFound {
        path: PathBuf,
    },
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NotFound { path } => {
                write!(f, "Config file not found: '{}'", path.display())
            }
            ConfigError::IoError { path, source } => {
                write!(
                    f,
                    "Failed to read config file '{}': {}",
                    path.display(),
                    source
                )
            }
            ConfigError::ParseError { path, source } => {
                write!(
                    f,
                    "Failed to parse config file '{}': {}",
                    path.display(),
                    source
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::NotFound { .. } => None,
            ConfigError::IoError { source, .. } => Some(source),
            ConfigError::ParseError { source, .. } => Some(source),
        }
    }
}

/// Get the default config file path.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("visioniq").join("config.toml"))
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config/visioniq/config.toml")
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.camera.devices.len(), 2);
        assert!(config.camera.device.is_none());
        assert_eq!(config.capture.resolution, Resolution::MEDIUM);
        assert_eq!(config.upload, UploadLimits::default());
        assert_eq!(config.identify.backend, IdentifyBackend::Mock);
        assert_eq!(config.identify.mock_delay_ms, 2000);
    }

    #[test]
    fn test_default_template_parses() {
        let config: Config = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.camera.devices, default_devices());
        assert_eq!(config.camera.failure, SimulatedFailure::None);
        assert_eq!(config.identify.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.upload.max_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn test_load_explicit_file() {
        let file = write_config(
            r#"
[camera]
device = "cam0"
failure = "busy"

[capture]
resolution = "320x240"

[upload]
max_dimension = 1024

[identify]
mock_delay_ms = 10
"#,
        );
        let config = Config::load_from_explicit(file.path().to_path_buf()).unwrap();
        assert_eq!(config.camera.device.as_deref(), Some("cam0"));
        assert_eq!(config.camera.failure, SimulatedFailure::Busy);
        assert_eq!(config.capture.resolution, Resolution::LOW);
        assert_eq!(config.upload.max_dimension, 1024);
        // Unset keys keep their defaults
        assert_eq!(config.upload.max_bytes, UploadLimits::default().max_bytes);
        assert_eq!(config.identify.mock_delay_ms, 10);
        assert_eq!(config.identify.timeout_secs, 30);

        let settings = config.session_settings();
        assert_eq!(settings.preferred_device.as_deref(), Some("cam0"));
        assert_eq!(settings.capture_size, Resolution::LOW);
    }

    #[test]
    fn test_backend_applies_failure_mode() {
        use crate::devices::DeviceEnumerator;
        use crate::stream::{AcquireError, MediaStreamProvider};

        let file = write_config("[camera]\nfailure = \"busy\"\n");
        let config = Config::load_from_explicit(file.path().to_path_buf()).unwrap();
        let backend = config.backend().unwrap();

        // Every collaborator shares the same failing hardware
        let err = backend.streams.acquire(None).err().unwrap();
        assert!(matches!(err, AcquireError::DeviceBusy { .. }));
        assert_eq!(backend.devices.list_video_input_devices().unwrap().len(), 2);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");
        let err = Config::load_from_explicit(path).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
        assert!(err.to_string().contains("nope.toml"));
    }

    #[test]
    fn test_parse_error_names_file() {
        let file = write_config("[capture]\nresolution = \"big\"\n");
        let err = Config::load_from_explicit(file.path().to_path_buf()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
        assert!(err.to_string().starts_with("Failed to parse config file"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let result: Result<Config, _> = toml::from_str("[identify]\nbackend = \"magic\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_mock_identifier_built() {
        let config = Config::default();
        assert!(config.identifier().is_ok());
        assert!(config.backend().is_ok());
    }

    #[test]
    fn test_default_path_ends_with_config_toml() {
        let path = default_path();
        assert!(path.ends_with("visioniq/config.toml"));
    }
}
