use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::detect::tracker::{PassthroughTracker, Tracker, TrackerConfig};
use crate::frame::Frame;

/// Replays pre-recorded detections, one list per decoded frame.
///
/// Track ids in the script are treated as the backend's native tracking output. With tracking
/// disabled, `tracker` fails and the adapter strips every id, which is the detection-only path
/// exercised by tests and offline replays.
pub struct ScriptedBackend {
    frames: Vec<Vec<Detection>>,
    tracking: bool,
}

#[derive(Debug, Deserialize)]
struct ScriptFile {
    #[serde(default = "default_tracking")]
    tracking: bool,
    frames: Vec<Vec<Detection>>,
}

fn default_tracking() -> bool {
    true
}

impl ScriptedBackend {
    pub fn new(frames: Vec<Vec<Detection>>) -> Self {
        Self {
            frames,
            tracking: true,
        }
    }

    pub fn without_tracking(mut self) -> Self {
        self.tracking = false;
        self
    }

    /// Load a JSON script: `{"tracking": true, "frames": [[{"class_id": 0, ...}], ...]}`.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read detection script {}", path.display()))?;
        let script: ScriptFile = serde_json::from_str(&raw)
            .with_context(|| format!("invalid detection script {}", path.display()))?;
        Ok(Self {
            frames: script.frames,
            tracking: script.tracking,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, frame: &Frame, min_confidence: f32) -> Result<Vec<Detection>> {
        let Some(slot) = frame.index.checked_sub(1) else {
            return Err(anyhow!("frame indices start at 1"));
        };
        Ok(self
            .frames
            .get(slot as usize)
            .map(|dets| {
                dets.iter()
                    .filter(|det| det.confidence >= min_confidence)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn tracker(&mut self, _config: &TrackerConfig) -> Result<Box<dyn Tracker>> {
        if !self.tracking {
            return Err(anyhow!("scripted backend has tracking disabled"));
        }
        Ok(Box::new(PassthroughTracker))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::BoundingBox;

    #[test]
    fn replays_by_frame_index_and_filters_confidence() -> Result<()> {
        let mut backend = ScriptedBackend::new(vec![
            vec![Detection::new(0, 0.9, BoundingBox::new(0, 0, 4, 4))],
            vec![
                Detection::new(0, 0.2, BoundingBox::new(0, 0, 4, 4)),
                Detection::new(1, 0.5, BoundingBox::new(0, 0, 4, 4)),
            ],
        ]);
        let frame = |index| Frame::solid(8, 8, index, [0, 0, 0]);

        assert_eq!(backend.detect(&frame(1)?, 0.3)?.len(), 1);
        let second = backend.detect(&frame(2)?, 0.3)?;
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].class_id, 1);
        assert!(backend.detect(&frame(3)?, 0.3)?.is_empty());
        Ok(())
    }

    #[test]
    fn disabled_tracking_refuses_tracker() {
        let mut backend = ScriptedBackend::new(Vec::new()).without_tracking();
        assert!(backend.tracker(&TrackerConfig::default()).is_err());
    }

    #[test]
    fn loads_json_script() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("script.json");
        std::fs::write(
            &path,
            r#"{"tracking": false, "frames": [[{"class_id": 0, "confidence": 0.8,
                "bbox": {"x1": 1, "y1": 2, "x2": 3, "y2": 4}, "track_id": 9}], []]}"#,
        )?;
        let mut backend = ScriptedBackend::from_json_file(&path)?;
        assert_eq!(backend.frame_count(), 2);
        assert!(backend.tracker(&TrackerConfig::default()).is_err());
        Ok(())
    }
}
