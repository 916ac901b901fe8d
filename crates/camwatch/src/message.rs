use crate::config::CoverageArea;
use crate::counts::CountSnapshot;
use serde::{Deserialize, Serialize};

/// Payload published once per processed frame.
///
/// Carries no sequence number or timestamp; consumers only see arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionMessage {
    pub camera: String,
    pub coverage_area: CoverageArea,
    pub vehicle_counts: CountSnapshot,
}

impl DetectionMessage {
    pub fn new(camera: &str, coverage_area: CoverageArea, vehicle_counts: CountSnapshot) -> Self {
        Self {
            camera: camera.to_string(),
            coverage_area,
            vehicle_counts,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let mut counts = CountSnapshot::new();
        counts.record("car");
        counts.record("car");
        counts.record("person");

        let msg = DetectionMessage::new("camera-1", [(33.999, -118.5), (34.05, -118.46)], counts);
        let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();

        assert_eq!(
            value,
            serde_json::json!({
                "camera": "camera-1",
                "coverage_area": [[33.999, -118.5], [34.05, -118.46]],
                "vehicle_counts": {"car": 2, "truck": 0, "bus": 0, "motorcycle": 0, "person": 1}
            })
        );
    }

    #[test]
    fn test_consumer_side_parse() {
        let json = r#"{"camera":"camera-2","coverage_area":[[1.0,2.0],[3.0,4.0]],"vehicle_counts":{"car":0,"truck":3,"bus":0,"motorcycle":0,"person":0}}"#;
        let msg: DetectionMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.camera, "camera-2");
        assert_eq!(msg.vehicle_counts.get("truck"), Some(3));
    }
}
