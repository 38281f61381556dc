use anyhow::Result;

use crate::detect::result::Detection;
use crate::detect::tracker::{IouTracker, Tracker, TrackerConfig};
use crate::frame::Frame;

/// Detector backend trait.
///
/// A backend turns one decoded frame into frame-local detections. Persistent identities are
/// the tracker's job; `tracker` builds one for tracking mode, and an error there sends the
/// adapter into detection-only mode for the rest of the invocation.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame, dropping anything below `min_confidence`.
    fn detect(&mut self, frame: &Frame, min_confidence: f32) -> Result<Vec<Detection>>;

    /// Initialise tracking mode.
    fn tracker(&mut self, config: &TrackerConfig) -> Result<Box<dyn Tracker>> {
        Ok(Box::new(IouTracker::new(config.clone())?))
    }

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called once before each invocation so per-video backend state starts clean.
    fn reset(&mut self) {}
}
