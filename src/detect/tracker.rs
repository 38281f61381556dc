//! Track-identity assignment.
//!
//! `IouTracker` links detections across frames by greedy box overlap within a class. It is the
//! default tracker for backends that only produce frame-local detections. `PassthroughTracker`
//! keeps ids a backend already supplies.

use anyhow::{anyhow, Result};

use crate::detect::result::{BoundingBox, Detection};

pub trait Tracker: Send {
    /// Assign `track_id`s to this frame's detections. Called once per decoded frame, in order.
    fn update(&mut self, frame_index: u64, detections: &mut [Detection]);
}

#[derive(Clone, Debug, PartialEq)]
pub struct TrackerConfig {
    /// Minimum IoU for a detection to continue an existing track.
    pub iou_threshold: f32,
    /// Frames a track may go unseen before it is retired.
    pub max_missing: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            iou_threshold: 0.3,
            max_missing: 30,
        }
    }
}

#[derive(Clone, Debug)]
struct Track {
    id: u64,
    class_id: u32,
    bbox: BoundingBox,
    last_seen: u64,
}

pub struct IouTracker {
    config: TrackerConfig,
    tracks: Vec<Track>,
    next_id: u64,
}

impl IouTracker {
    pub fn new(config: TrackerConfig) -> Result<Self> {
        if !(config.iou_threshold > 0.0 && config.iou_threshold <= 1.0) {
            return Err(anyhow!(
                "tracker iou_threshold must be in (0, 1], got {}",
                config.iou_threshold
            ));
        }
        Ok(Self {
            config,
            tracks: Vec::new(),
            next_id: 1,
        })
    }

    pub fn live_tracks(&self) -> usize {
        self.tracks.len()
    }
}

impl Tracker for IouTracker {
    fn update(&mut self, frame_index: u64, detections: &mut [Detection]) {
        let mut pairs: Vec<(f32, usize, usize)> = Vec::new();
        for (t_idx, track) in self.tracks.iter().enumerate() {
            for (d_idx, det) in detections.iter().enumerate() {
                if det.class_id != track.class_id || !det.bbox.is_well_formed() {
                    continue;
                }
                let iou = track.bbox.iou(&det.bbox);
                if iou >= self.config.iou_threshold {
                    pairs.push((iou, t_idx, d_idx));
                }
            }
        }
        pairs.sort_by(|a, b| b.0.total_cmp(&a.0));

        let mut track_taken = vec![false; self.tracks.len()];
        let mut det_taken = vec![false; detections.len()];
        for (_, t_idx, d_idx) in pairs {
            if track_taken[t_idx] || det_taken[d_idx] {
                continue;
            }
            track_taken[t_idx] = true;
            det_taken[d_idx] = true;
            let track = &mut self.tracks[t_idx];
            track.bbox = detections[d_idx].bbox;
            track.last_seen = frame_index;
            detections[d_idx].track_id = Some(track.id);
        }

        for (d_idx, det) in detections.iter_mut().enumerate() {
            if det_taken[d_idx] || !det.bbox.is_well_formed() {
                continue;
            }
            let id = self.next_id;
            self.next_id += 1;
            self.tracks.push(Track {
                id,
                class_id: det.class_id,
                bbox: det.bbox,
                last_seen: frame_index,
            });
            det.track_id = Some(id);
        }

        let max_missing = self.config.max_missing;
        self.tracks
            .retain(|track| frame_index.saturating_sub(track.last_seen) <= max_missing);
    }
}

/// Keeps backend-supplied track ids untouched.
#[derive(Default)]
pub struct PassthroughTracker;

impl Tracker for PassthroughTracker {
    fn update(&mut self, _frame_index: u64, _detections: &mut [Detection]) {}
}
