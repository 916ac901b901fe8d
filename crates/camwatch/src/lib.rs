pub mod config;
pub mod counts;
pub mod detect;
pub mod endpoint;
pub mod frame;
pub mod message;
pub mod publish;
pub mod service;
pub mod source;
pub mod stream;
pub mod worker;

pub use config::{CameraConfig, Config, ConfigError, CoverageArea, WorkerConfig};
pub use counts::{CountSnapshot, TRACKED_CLASSES};
pub use detect::{Detection, Detector};
pub use frame::Frame;
pub use message::DetectionMessage;
pub use publish::{MqttPublisher, Publisher};
pub use service::CameraService;
pub use source::FrameSource;
pub use worker::{Worker, WorkerError, WorkerIdentity};
