//! Counting invocation.
//!
//! `CounterContext` owns the detector backend and the class table for the lifetime of the
//! process (or test). Each call to [`CounterContext::count`] opens the video, builds a fresh
//! [`CountingState`], drives the frame stream to the end and returns the frozen counts. Nothing
//! from one invocation is visible to the next.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::annotate::{Annotator, FrameSink};
use crate::classes::ClassTable;
use crate::counting::{CountSnapshot, CountingLine, CountingState, IdentityPolicy};
use crate::detect::{DetectorBackend, FrameStream, TrackerConfig};
use crate::error::CountError;
use crate::ingest::{self, FrameSource};

/// Per-invocation options.
#[derive(Clone, Debug, PartialEq)]
pub struct CountOptions {
    /// Counting line row; `floor(0.4 * height)` when unset.
    pub line_y: Option<i32>,
    pub tolerance: i32,
    pub frame_skip: u32,
    pub min_confidence: f32,
}

impl Default for CountOptions {
    fn default() -> Self {
        Self {
            line_y: None,
            tolerance: 5,
            frame_skip: 1,
            min_confidence: 0.3,
        }
    }
}

impl CountOptions {
    pub fn validate(&self) -> Result<(), CountError> {
        if self.tolerance < 0 {
            return Err(CountError::invalid(format!(
                "tolerance must be >= 0, got {}",
                self.tolerance
            )));
        }
        if self.frame_skip == 0 {
            return Err(CountError::invalid("frame_skip must be >= 1"));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(CountError::invalid(format!(
                "min_confidence must be in [0, 1], got {}",
                self.min_confidence
            )));
        }
        Ok(())
    }
}

/// Cooperative cancellation, checked before every frame.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of one invocation.
#[derive(Clone, Debug, Serialize)]
pub struct CountReport {
    pub snapshot: CountSnapshot,
    pub policy: IdentityPolicy,
    pub line_y: i32,
    pub frames_decoded: u64,
    pub frames_considered: u64,
    pub detections_considered: u64,
    pub detections_rejected: u64,
}

pub struct CounterContext {
    backend: Box<dyn DetectorBackend>,
    classes: ClassTable,
    tracker: TrackerConfig,
}

impl CounterContext {
    pub fn new(backend: Box<dyn DetectorBackend>, classes: ClassTable) -> Self {
        Self {
            backend,
            classes,
            tracker: TrackerConfig::default(),
        }
    }

    pub fn with_tracker_config(mut self, tracker: TrackerConfig) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn classes(&self) -> &ClassTable {
        &self.classes
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Count objects crossing the line in the video at `video`.
    pub fn count(
        &mut self,
        video: &str,
        options: &CountOptions,
        sink: Option<&mut dyn FrameSink>,
        cancel: &CancelFlag,
    ) -> Result<CountReport, CountError> {
        options.validate()?;
        let source = ingest::open_video(video)?;
        self.count_source(source, video, options, sink, cancel)
    }

    /// Same as [`CounterContext::count`] for an already opened source.
    pub fn count_source<S: FrameSource>(
        &mut self,
        source: S,
        source_name: &str,
        options: &CountOptions,
        mut sink: Option<&mut dyn FrameSink>,
        cancel: &CancelFlag,
    ) -> Result<CountReport, CountError> {
        options.validate()?;
        let Self {
            backend,
            classes,
            tracker,
        } = self;

        let info = source.info();
        let line_y = options
            .line_y
            .unwrap_or_else(|| CountingLine::default_y(info.height));
        let line = CountingLine::new(line_y, options.tolerance)?;
        log::info!(
            "video {}: {}x{}, {:.2} fps",
            source_name,
            info.width,
            info.height,
            info.fps
        );
        log::info!(
            "counting line at y={} (tolerance {}, frame_skip {})",
            line.y(),
            line.tolerance(),
            options.frame_skip
        );

        let mut stream = FrameStream::open(
            source,
            source_name,
            backend.as_mut(),
            tracker,
            options.min_confidence,
        )?;
        let mut state = CountingState::new(line, options.frame_skip, stream.policy())?;
        let annotator = Annotator::new();

        loop {
            if cancel.is_cancelled() {
                log::warn!(
                    "counting of {} cancelled after {} frames",
                    source_name,
                    state.frame_index()
                );
                return Err(CountError::Cancelled {
                    frames: state.frame_index(),
                });
            }
            let Some(result) = stream.next() else {
                break;
            };
            let result = result?;
            let outcome = state.process_frame(&result.detections, classes)?;

            if let Some(out) = sink.as_deref_mut() {
                let shown = if outcome.considered {
                    result.detections.as_slice()
                } else {
                    &[]
                };
                let annotated = annotator.annotate(
                    result.frame,
                    shown,
                    classes,
                    &line,
                    state.counts_by_class(),
                    state.total_count(),
                    outcome.considered,
                );
                if let Err(err) = out.write_frame(&annotated) {
                    log::warn!(
                        "frame sink failed at frame {} ({:#}); continuing without output",
                        outcome.frame_index,
                        err
                    );
                    sink = None;
                }
            }
        }

        if let Some(out) = sink {
            if let Err(err) = out.finish() {
                log::warn!("frame sink failed to finish: {:#}", err);
            }
        }

        let frames_decoded = stream.frames_decoded();
        let policy = state.policy();
        let stats = state.stats();
        let snapshot = state.finish()?;
        log::info!(
            "counted {} objects in {} ({} frames, {} considered, policy {})",
            snapshot.total_count(),
            source_name,
            frames_decoded,
            stats.frames_considered,
            policy.as_str()
        );

        Ok(CountReport {
            snapshot,
            policy,
            line_y: line.y(),
            frames_decoded,
            frames_considered: stats.frames_considered,
            detections_considered: stats.detections_considered,
            detections_rejected: stats.detections_rejected,
        })
    }
}
