use crate::detect::Detection;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Classes counted per frame, in payload order
pub const TRACKED_CLASSES: [&str; 5] = ["car", "truck", "bus", "motorcycle", "person"];

/// Per-frame tally over [`TRACKED_CLASSES`].
///
/// Every tracked class is always present; labels outside the set are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CountSnapshot {
    counts: IndexMap<String, u32>,
}

impl Default for CountSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl CountSnapshot {
    /// All tracked classes at zero
    pub fn new() -> Self {
        Self {
            counts: TRACKED_CLASSES
                .iter()
                .map(|class| (class.to_string(), 0))
                .collect(),
        }
    }

    pub fn from_detections<'a>(detections: impl IntoIterator<Item = &'a Detection>) -> Self {
        let mut snapshot = Self::new();
        for det in detections {
            snapshot.record(&det.label);
        }
        snapshot
    }

    /// Count one detection; returns `false` when the label is not tracked
    pub fn record(&mut self, label: &str) -> bool {
        match self.counts.get_mut(label) {
            Some(count) => {
                *count += 1;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, class: &str) -> Option<u32> {
        self.counts.get(class).copied()
    }

    pub fn total(&self) -> u32 {
        self.counts.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.counts.iter().map(|(k, v)| (k.as_str(), *v))
    }
}
