//! Detector/tracker adapter.
//!
//! Wraps a frame source and a backend into a lazy, finite stream of [`FrameResult`]s. Tracking
//! is attempted once when the stream opens; if the backend cannot provide a tracker, the stream
//! runs detection-only for its whole lifetime and yields no track ids.

use crate::counting::IdentityPolicy;
use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::detect::tracker::{Tracker, TrackerConfig};
use crate::error::CountError;
use crate::frame::{Frame, VideoInfo};
use crate::ingest::FrameSource;

/// One decoded frame and the detections found on it.
pub struct FrameResult {
    pub frame: Frame,
    pub detections: Vec<Detection>,
}

/// Pull-based frame stream. Ends after the last frame or the first error.
pub struct FrameStream<'a, S> {
    source: S,
    source_name: String,
    backend: &'a mut dyn DetectorBackend,
    tracker: Option<Box<dyn Tracker>>,
    min_confidence: f32,
    done: bool,
}

impl<'a, S: FrameSource> FrameStream<'a, S> {
    pub fn open(
        source: S,
        source_name: impl Into<String>,
        backend: &'a mut dyn DetectorBackend,
        tracker_config: &TrackerConfig,
        min_confidence: f32,
    ) -> Result<Self, CountError> {
        backend.reset();
        backend
            .warm_up()
            .map_err(|source| CountError::Detector {
                frame_index: 0,
                source,
            })?;
        let tracker = match backend.tracker(tracker_config) {
            Ok(tracker) => Some(tracker),
            Err(err) => {
                log::warn!(
                    "{}: tracking unavailable ({:#}); falling back to detection-only counting",
                    backend.name(),
                    err
                );
                None
            }
        };
        Ok(Self {
            source,
            source_name: source_name.into(),
            backend,
            tracker,
            min_confidence,
            done: false,
        })
    }

    /// Identity policy implied by the mode the stream opened in.
    pub fn policy(&self) -> IdentityPolicy {
        if self.tracker.is_some() {
            IdentityPolicy::Tracked
        } else {
            IdentityPolicy::PositionalFallback
        }
    }

    pub fn info(&self) -> VideoInfo {
        self.source.info()
    }

    pub fn frames_decoded(&self) -> u64 {
        self.source.frames_decoded()
    }

    fn pull(&mut self) -> Result<Option<FrameResult>, CountError> {
        let frame = self.source.next_frame().map_err(|err| {
            CountError::video_open(
                &self.source_name,
                format!(
                    "decode failed after frame {}: {:#}",
                    self.source.frames_decoded(),
                    err
                ),
            )
        })?;
        let Some(frame) = frame else {
            return Ok(None);
        };
        let mut detections = self
            .backend
            .detect(&frame, self.min_confidence)
            .map_err(|source| CountError::Detector {
                frame_index: frame.index,
                source,
            })?;
        match self.tracker.as_mut() {
            Some(tracker) => tracker.update(frame.index, &mut detections),
            None => detections.iter_mut().for_each(|det| det.track_id = None),
        }
        Ok(Some(FrameResult { frame, detections }))
    }
}

impl<S: FrameSource> Iterator for FrameStream<'_, S> {
    type Item = Result<FrameResult, CountError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.pull() {
            Ok(Some(result)) => Some(Ok(result)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
