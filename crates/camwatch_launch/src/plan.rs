//! Launch plan: which worker processes to start and with what arguments

use crate::runtime::ProcessConfig;
use camwatch::config::{Config, ConfigError};
use std::collections::HashSet;

/// One worker process to start
#[derive(Debug, Clone)]
pub struct WorkerLaunch {
    pub camera_id: String,
    pub port: u16,
    pub source: String,
    pub executable: String,
    pub args: Vec<String>,
}

/// Worker processes in launch order
#[derive(Debug)]
pub struct LaunchPlan {
    pub broker: String,
    pub topic: String,
    pub workers: Vec<WorkerLaunch>,
}

impl LaunchPlan {
    /// Build the plan for `config`.
    ///
    /// With a selection only the named cameras are planned; naming a camera
    /// that is not configured is an error.
    pub fn build(
        config: &Config,
        executable: &str,
        selection: Option<&[String]>,
    ) -> Result<Self, PlanError> {
        if let Some(ids) = selection {
            if let Some(unknown) = ids.iter().find(|id| config.camera(id).is_none()) {
                return Err(PlanError::UnknownCamera(unknown.clone()));
            }
        }
        let selected: Option<HashSet<&str>> =
            selection.map(|ids| ids.iter().map(String::as_str).collect());

        let mut workers = Vec::new();
        for camera in &config.cameras {
            if let Some(selected) = &selected {
                if !selected.contains(camera.id.as_str()) {
                    continue;
                }
            }

            let worker_config = config.worker_config(camera).to_json()?;
            workers.push(WorkerLaunch {
                camera_id: camera.id.clone(),
                port: camera.port,
                source: camera.source.clone(),
                executable: executable.to_string(),
                args: vec!["--worker-config".to_string(), worker_config],
            });
        }

        Ok(Self {
            broker: format!("{}:{}", config.broker.host, config.broker.port),
            topic: config.broker.topic.clone(),
            workers,
        })
    }

    /// Process configurations for the supervisor
    pub fn process_configs(&self) -> Vec<ProcessConfig> {
        self.workers
            .iter()
            .map(|w| ProcessConfig {
                name: w.camera_id.clone(),
                executable: w.executable.clone(),
                args: w.args.clone(),
            })
            .collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("Camera '{0}' is not configured")]
    UnknownCamera(String),

    #[error("Failed to encode worker configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Display the launch plan in a human-readable format
impl std::fmt::Display for LaunchPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Launch Plan")?;
        writeln!(f, "===========")?;
        writeln!(f)?;
        writeln!(f, "Broker: {} (topic: {})", self.broker, self.topic)?;
        writeln!(f)?;

        writeln!(f, "Cameras (in launch order):")?;
        for (i, worker) in self.workers.iter().enumerate() {
            writeln!(f)?;
            writeln!(f, "  {}. {} [port {}]", i + 1, worker.camera_id, worker.port)?;
            writeln!(f, "     Source: {}", worker.source)?;
            writeln!(
                f,
                "     Command: {} {}",
                worker.executable,
                worker.args.join(" ")
            )?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camwatch::config::WorkerConfig;

    const CAMERAS_YAML: &str = r#"
broker:
  host: broker.local
cameras:
  - id: camera-1
    source: a.mp4
    coverage_area: [[33.999, -118.500], [34.050, -118.460]]
    port: 8002
  - id: camera-2
    source: b.mp4
    coverage_area: [[34.051, -118.461], [34.100, -118.430]]
    port: 8003
  - id: camera-3
    source: c.mp4
    coverage_area: [[34.000, -118.430], [34.050, -118.400]]
    port: 8004
"#;

    #[test]
    fn test_plan_covers_every_camera_in_order() {
        let config = Config::parse(CAMERAS_YAML).unwrap();
        let plan = LaunchPlan::build(&config, "camwatch_node", None).unwrap();

        let ids: Vec<&str> = plan.workers.iter().map(|w| w.camera_id.as_str()).collect();
        assert_eq!(ids, vec!["camera-1", "camera-2", "camera-3"]);
        assert_eq!(plan.broker, "broker.local:1883");
    }

    #[test]
    fn test_worker_args_carry_typed_config() {
        let config = Config::parse(CAMERAS_YAML).unwrap();
        let plan = LaunchPlan::build(&config, "camwatch_node", None).unwrap();

        let worker = &plan.workers[1];
        assert_eq!(worker.args[0], "--worker-config");
        let handed = WorkerConfig::from_json(&worker.args[1]).unwrap();
        assert_eq!(handed, config.worker_config(&config.cameras[1]));
        assert_eq!(handed.camera.coverage_area[0], (34.051, -118.461));
        assert_eq!(handed.broker.host, "broker.local");
    }

    #[test]
    fn test_selection() {
        let config = Config::parse(CAMERAS_YAML).unwrap();
        let selection = vec!["camera-3".to_string(), "camera-1".to_string()];
        let plan = LaunchPlan::build(&config, "camwatch_node", Some(&selection)).unwrap();

        // Config order wins over selection order
        let ids: Vec<&str> = plan.workers.iter().map(|w| w.camera_id.as_str()).collect();
        assert_eq!(ids, vec!["camera-1", "camera-3"]);

        let unknown = vec!["camera-9".to_string()];
        assert!(matches!(
            LaunchPlan::build(&config, "camwatch_node", Some(&unknown)),
            Err(PlanError::UnknownCamera(id)) if id == "camera-9"
        ));
    }

    #[test]
    fn test_display() {
        let config = Config::parse(CAMERAS_YAML).unwrap();
        let plan = LaunchPlan::build(&config, "/usr/bin/camwatch_node", None).unwrap();
        let text = plan.to_string();

        assert!(text.contains("1. camera-1 [port 8002]"));
        assert!(text.contains("Source: c.mp4"));
        assert!(text.contains("Command: /usr/bin/camwatch_node --worker-config {"));
    }
}
