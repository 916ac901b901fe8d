use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A geographic point as `(latitude, longitude)`
pub type GeoPoint = (f64, f64);

/// Region covered by a camera, given as two opposite corners
pub type CoverageArea = [GeoPoint; 2];

/// Configuration for a single camera
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Camera identity, carried in every published message
    pub id: String,
    /// Video file path, image directory, or URI (file://, rtsp://, http://)
    pub source: String,
    /// Area observed by the camera
    pub coverage_area: CoverageArea,
    /// Port the camera's HTTP endpoint listens on
    pub port: u16,
}

/// MQTT broker settings shared by every camera
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_broker_host")]
    pub host: String,
    #[serde(default = "default_broker_port")]
    pub port: u16,
    /// Topic every camera publishes on
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    /// How long to wait for the initial CONNACK before carrying on
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_broker_host() -> String {
    "localhost".to_string()
}

fn default_broker_port() -> u16 {
    1883
}

fn default_topic() -> String {
    "cameras/detections".to_string()
}

fn default_keep_alive_secs() -> u64 {
    60
}

fn default_connect_timeout_ms() -> u64 {
    3000
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: default_broker_host(),
            port: default_broker_port(),
            topic: default_topic(),
            keep_alive_secs: default_keep_alive_secs(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

/// Detection model settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Path to the ONNX weights
    #[serde(default = "default_model_path")]
    pub path: PathBuf,
    /// Square input resolution expected by the model
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    /// Minimum class score for a box to be kept
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    /// IoU above which overlapping boxes of the same class are suppressed
    #[serde(default = "default_iou")]
    pub iou: f32,
}

fn default_model_path() -> PathBuf {
    PathBuf::from("yolo11m.onnx")
}

fn default_input_size() -> u32 {
    640
}

fn default_confidence() -> f32 {
    0.25
}

fn default_iou() -> f32 {
    0.45
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: default_model_path(),
            input_size: default_input_size(),
            confidence: default_confidence(),
            iou: default_iou(),
        }
    }
}

/// Retry policy for reopening or rereading a frame source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Consecutive failures tolerated before giving up (`None` retries forever)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: Option<u32>,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> Option<u32> {
    Some(10)
}

fn default_initial_backoff_ms() -> u64 {
    100
}

fn default_max_backoff_ms() -> u64 {
    5000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt after `failures` consecutive failures.
    ///
    /// The first failure is retried immediately so that a plain end of
    /// stream rewinds without delay.
    pub fn backoff(&self, failures: u32) -> Duration {
        if failures <= 1 {
            return Duration::ZERO;
        }
        let exponent = (failures - 2).min(16);
        let delay = self
            .initial_backoff_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_backoff_ms);
        Duration::from_millis(delay)
    }

    /// Whether `failures` consecutive failures exhaust the policy
    pub fn exhausted(&self, failures: u32) -> bool {
        matches!(self.max_attempts, Some(max) if failures >= max)
    }
}

/// Settings for the per-camera worker process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSettings {
    /// Target processing rate
    #[serde(default = "default_fps")]
    pub fps: u32,
    /// Address the HTTP endpoint binds to
    #[serde(default = "default_bind_host")]
    pub bind_host: String,
    /// Mount the WebSocket route that mirrors published payloads
    #[serde(default)]
    pub stream_endpoint: bool,
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_fps() -> u32 {
    30
}

fn default_bind_host() -> String {
    "0.0.0.0".to_string()
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            bind_host: default_bind_host(),
            stream_endpoint: false,
            retry: RetryPolicy::default(),
        }
    }
}

impl WorkerSettings {
    /// Pause between loop iterations
    pub fn pacing_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.fps.max(1)))
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub worker: WorkerSettings,
    /// Cameras to run, one process each
    pub cameras: Vec<CameraConfig>,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Config =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the fields a worker cannot run without.
    ///
    /// Camera ids and coverage areas are taken as given.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cameras.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one camera must be configured".to_string(),
            ));
        }
        if self.worker.fps == 0 {
            return Err(ConfigError::ValidationError(
                "worker.fps must be greater than zero".to_string(),
            ));
        }
        if self.model.input_size == 0 {
            return Err(ConfigError::ValidationError(
                "model.input_size must be greater than zero".to_string(),
            ));
        }
        for (name, value) in [
            ("model.confidence", self.model.confidence),
            ("model.iou", self.model.iou),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be within 0..=1, got {}",
                    name, value
                )));
            }
        }
        if self.worker.retry.max_attempts == Some(0) {
            return Err(ConfigError::ValidationError(
                "worker.retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn camera(&self, id: &str) -> Option<&CameraConfig> {
        self.cameras.iter().find(|c| c.id == id)
    }

    /// Self-contained configuration for the worker process of `camera`
    pub fn worker_config(&self, camera: &CameraConfig) -> WorkerConfig {
        WorkerConfig {
            camera: camera.clone(),
            broker: self.broker.clone(),
            model: self.model.clone(),
            worker: self.worker.clone(),
        }
    }
}

/// Everything one worker process needs, handed over by the launcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub camera: CameraConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub worker: WorkerSettings,
}

impl WorkerConfig {
    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string(self).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAMERAS_YAML: &str = r#"
cameras:
  - id: "camera-1"
    source: "traffic.mp4"
    coverage_area: [[33.999, -118.500], [34.050, -118.460]]
    port: 8002
  - id: "camera-2"
    source: "rtsp://192.168.1.11:554/live"
    coverage_area: [[34.051, -118.461], [34.100, -118.430]]
    port: 8003
"#;

    #[test]
    fn test_parse_config_defaults() {
        let config = Config::parse(CAMERAS_YAML).unwrap();
        assert_eq!(config.cameras.len(), 2);
        assert_eq!(config.cameras[0].id, "camera-1");
        assert_eq!(config.cameras[0].coverage_area[0], (33.999, -118.5));
        assert_eq!(config.cameras[1].port, 8003);

        assert_eq!(config.broker.host, "localhost");
        assert_eq!(config.broker.port, 1883);
        assert_eq!(config.broker.topic, "cameras/detections");
        assert_eq!(config.model.path, PathBuf::from("yolo11m.onnx"));
        assert_eq!(config.worker.fps, 30);
        assert!(!config.worker.stream_endpoint);
        assert_eq!(config.worker.retry.max_attempts, Some(10));
    }

    #[test]
    fn test_parse_config_overrides() {
        let yaml = r#"
broker:
  host: "mqtt.local"
  port: 1884
worker:
  fps: 10
  stream_endpoint: true
  retry:
    max_attempts: null
cameras:
  - id: "camera-1"
    source: "frames/"
    coverage_area: [[0.0, 0.0], [1.0, 1.0]]
    port: 9000
"#;
        let config = Config::parse(yaml).unwrap();
        assert_eq!(config.broker.host, "mqtt.local");
        assert_eq!(config.broker.port, 1884);
        assert_eq!(config.broker.topic, "cameras/detections");
        assert_eq!(config.worker.fps, 10);
        assert!(config.worker.stream_endpoint);
        assert_eq!(config.worker.retry.max_attempts, None);
        assert_eq!(config.worker.retry.initial_backoff_ms, 100);
    }

    #[test]
    fn test_duplicate_ids_are_accepted() {
        let yaml = r#"
cameras:
  - { id: "cam", source: "a.mp4", coverage_area: [[0, 0], [1, 1]], port: 8002 }
  - { id: "cam", source: "b.mp4", coverage_area: [[5, 5], [1, 1]], port: 8003 }
"#;
        assert_eq!(Config::parse(yaml).unwrap().cameras.len(), 2);
    }

    #[test]
    fn test_validation_rejects_empty_and_zero_fps() {
        assert!(matches!(
            Config::parse("cameras: []"),
            Err(ConfigError::ValidationError(_))
        ));

        let yaml = format!("worker:\n  fps: 0\n{}", CAMERAS_YAML);
        assert!(matches!(
            Config::parse(&yaml),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validation_rejects_model_settings() {
        for model in [
            "model:\n  input_size: 0\n",
            "model:\n  confidence: 1.5\n",
            "model:\n  iou: -0.1\n",
        ] {
            let yaml = format!("{}{}", model, CAMERAS_YAML);
            assert!(
                matches!(Config::parse(&yaml), Err(ConfigError::ValidationError(_))),
                "accepted {:?}",
                model
            );
        }
    }

    #[test]
    fn test_validation_rejects_zero_attempts() {
        let yaml = format!("worker:\n  retry:\n    max_attempts: 0\n{}", CAMERAS_YAML);
        assert!(matches!(
            Config::parse(&yaml),
            Err(ConfigError::ValidationError(_))
        ));

        let yaml = format!("worker:\n  retry:\n    max_attempts: 1\n{}", CAMERAS_YAML);
        assert_eq!(Config::parse(&yaml).unwrap().worker.retry.max_attempts, Some(1));
    }

    #[test]
    fn test_sample_config_runs_video_files() {
        let yaml = include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/../../configs/cameras.yaml"
        ));
        let config = Config::parse(yaml).unwrap();
        assert_eq!(config.cameras.len(), 3);
        assert!(config.cameras.iter().all(|c| c.source.ends_with(".mp4")));
    }

    #[test]
    fn test_worker_config_json_hand_off() {
        let config = Config::parse(CAMERAS_YAML).unwrap();
        let worker = config.worker_config(&config.cameras[1]);
        let json = worker.to_json().unwrap();
        let parsed = WorkerConfig::from_json(&json).unwrap();
        assert_eq!(parsed, worker);
        assert_eq!(parsed.camera.source, "rtsp://192.168.1.11:554/live");
    }

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy {
            max_attempts: Some(4),
            initial_backoff_ms: 100,
            max_backoff_ms: 350,
        };
        assert_eq!(policy.backoff(1), Duration::ZERO);
        assert_eq!(policy.backoff(2), Duration::from_millis(100));
        assert_eq!(policy.backoff(3), Duration::from_millis(200));
        assert_eq!(policy.backoff(4), Duration::from_millis(350));
        assert!(!policy.exhausted(3));
        assert!(policy.exhausted(4));
        assert!(!RetryPolicy {
            max_attempts: None,
            ..policy
        }
        .exhausted(u32::MAX));
    }

    #[test]
    fn test_pacing_interval() {
        let settings = WorkerSettings::default();
        let interval = settings.pacing_interval();
        assert!(interval > Duration::from_millis(33) && interval < Duration::from_millis(34));
    }
}
