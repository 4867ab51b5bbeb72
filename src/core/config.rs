use crate::core::sampler::sample_interval;
use crate::models::capture::CameraRequest;
use crate::models::pose::LandmarkSelection;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Pose tracker configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrackerConfig {
    /// Scoring endpoint that receives the captured sequence
    pub backend_url: String,
    /// Captures per second while recording
    pub capture_fps: f64,
    /// Keypoints at or below this confidence are dropped (0.0-1.0)
    pub min_confidence: f32,
    /// Landmark allow-list
    pub landmarks: LandmarkSelection,
    /// Detection loop tick, stands in for the display refresh
    pub frame_tick_ms: u64,
    /// Upper bound on a scoring request
    pub request_timeout_secs: u64,
    /// Camera to request on startup
    pub camera: CameraRequest,
    /// ONNX pose model (used with the `ml-onnx` feature)
    pub model_path: PathBuf,
    /// Directory of precomputed reference pose sequences
    pub reference_pose_dir: PathBuf,
    /// Frame rate the reference sequences were extracted at
    pub reference_fps: u32,
    /// Persisted login state (bearer token, user id)
    pub session_store_path: PathBuf,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        let data_dir = Self::data_dir();

        Self {
            backend_url: "http://localhost:8000/api/pose/compare".to_string(),
            capture_fps: 10.0,
            min_confidence: 0.2,
            landmarks: LandmarkSelection::All,
            frame_tick_ms: 16,
            request_timeout_secs: 30,
            camera: CameraRequest::default(),
            model_path: PathBuf::from("models/movenet_lightning.onnx"),
            reference_pose_dir: PathBuf::from("reference_poses"),
            reference_fps: 15,
            session_store_path: data_dir.join("session.json"),
        }
    }
}

impl TrackerConfig {
    /// Load configuration from the default location, creating it with defaults if missing
    pub fn load() -> ConfigResult<Self> {
        let config_path = Self::get_config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Self::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: TrackerConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> ConfigResult<()> {
        self.save_to(&Self::get_config_path())
    }

    pub fn save_to(&self, path: &Path) -> ConfigResult<()> {
        self.validate()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> ConfigResult<()> {
        if !(self.backend_url.starts_with("http://") || self.backend_url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "Invalid backend URL: {}. Must start with http:// or https://",
                self.backend_url
            )));
        }

        if !self.capture_fps.is_finite() || self.capture_fps <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "Invalid capture FPS: {}. Must be greater than 0",
                self.capture_fps
            )));
        }

        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(ConfigError::Invalid(format!(
                "Invalid confidence threshold: {}. Must be between 0.0 and 1.0",
                self.min_confidence
            )));
        }

        if let LandmarkSelection::Custom(names) = &self.landmarks {
            if names.is_empty() {
                return Err(ConfigError::Invalid(
                    "Custom landmark list cannot be empty".to_string(),
                ));
            }
        }

        if self.frame_tick_ms == 0 || self.frame_tick_ms > 1000 {
            return Err(ConfigError::Invalid(format!(
                "Invalid frame tick: {}ms. Must be between 1 and 1000",
                self.frame_tick_ms
            )));
        }

        if self.request_timeout_secs == 0 || self.request_timeout_secs > 600 {
            return Err(ConfigError::Invalid(format!(
                "Invalid request timeout: {}s. Must be between 1 and 600",
                self.request_timeout_secs
            )));
        }

        if self.reference_fps == 0 || self.reference_fps > 120 {
            return Err(ConfigError::Invalid(format!(
                "Invalid reference FPS: {}. Must be between 1 and 120",
                self.reference_fps
            )));
        }

        Ok(())
    }

    /// Reset to default configuration
    pub fn reset() -> ConfigResult<Self> {
        let config = Self::default();
        config.save()?;
        Ok(config)
    }

    pub fn sample_interval(&self) -> Duration {
        sample_interval(self.capture_fps)
    }

    pub fn frame_tick(&self) -> Duration {
        Duration::from_millis(self.frame_tick_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Get the configuration file path
    pub fn get_config_path() -> PathBuf {
        Self::data_dir().join("settings.json")
    }

    fn data_dir() -> PathBuf {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string());

        let mut path = PathBuf::from(home);
        path.push(".pose_capture");
        path
    }
}
