use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use super::identity::{IdentityPolicy, ObjectIdentity};
use super::line::CountingLine;
use super::snapshot::CountSnapshot;
use crate::classes::ClassTable;
use crate::detect::Detection;
use crate::error::CountError;

/// Per-invocation counters for everything the state machine saw.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CountStats {
    pub frames_seen: u64,
    pub frames_considered: u64,
    pub detections_considered: u64,
    pub detections_rejected: u64,
}

/// What one call to [`CountingState::process_frame`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameOutcome {
    pub frame_index: u64,
    /// False when the frame fell outside the frame-skip stride.
    pub considered: bool,
    pub newly_counted: u32,
    pub rejected: u32,
}

/// Counting state for one invocation.
///
/// The identity set only grows, and every insertion increments exactly one class counter and
/// the total in the same step.
pub struct CountingState {
    line: CountingLine,
    frame_skip: u64,
    policy: IdentityPolicy,
    counted: HashSet<ObjectIdentity>,
    counts_by_class: BTreeMap<String, u64>,
    total_count: u64,
    frame_index: u64,
    stats: CountStats,
}

impl CountingState {
    pub fn new(
        line: CountingLine,
        frame_skip: u32,
        policy: IdentityPolicy,
    ) -> Result<Self, CountError> {
        if frame_skip == 0 {
            return Err(CountError::invalid("frame_skip must be >= 1"));
        }
        Ok(Self {
            line,
            frame_skip: u64::from(frame_skip),
            policy,
            counted: HashSet::new(),
            counts_by_class: BTreeMap::new(),
            total_count: 0,
            frame_index: 0,
            stats: CountStats::default(),
        })
    }

    /// Feed the detections of the next decoded frame.
    ///
    /// An unknown class id aborts the invocation; malformed boxes and out-of-range confidences
    /// are skipped with a warning.
    pub fn process_frame(
        &mut self,
        detections: &[Detection],
        classes: &ClassTable,
    ) -> Result<FrameOutcome, CountError> {
        self.frame_index += 1;
        self.stats.frames_seen += 1;
        let mut outcome = FrameOutcome {
            frame_index: self.frame_index,
            considered: false,
            newly_counted: 0,
            rejected: 0,
        };
        if self.frame_index % self.frame_skip != 0 {
            return Ok(outcome);
        }
        outcome.considered = true;
        self.stats.frames_considered += 1;

        for detection in detections {
            self.stats.detections_considered += 1;
            let class_name = classes.resolve(detection.class_id)?;

            if !detection.bbox.is_well_formed() {
                log::warn!(
                    "frame {}: skipping malformed box {:?} (class {})",
                    self.frame_index,
                    detection.bbox,
                    class_name
                );
                outcome.rejected += 1;
                continue;
            }
            if !(0.0..=1.0).contains(&detection.confidence) {
                log::warn!(
                    "frame {}: skipping detection with confidence {} outside [0, 1]",
                    self.frame_index,
                    detection.confidence
                );
                outcome.rejected += 1;
                continue;
            }

            let center = detection.center();
            if !self.line.contains(center.y) {
                continue;
            }
            let identity = self
                .policy
                .identify(detection, class_name, center, self.frame_index);
            if self.counted.contains(&identity) {
                continue;
            }
            self.record(identity, class_name);
            outcome.newly_counted += 1;
        }
        self.stats.detections_rejected += u64::from(outcome.rejected);
        Ok(outcome)
    }

    fn record(&mut self, identity: ObjectIdentity, class_name: &str) {
        log::debug!(
            "frame {}: counted {} as {:?}",
            self.frame_index,
            class_name,
            identity
        );
        self.counted.insert(identity);
        *self
            .counts_by_class
            .entry(class_name.to_string())
            .or_insert(0) += 1;
        self.total_count += 1;
    }

    pub fn line(&self) -> CountingLine {
        self.line
    }

    pub fn policy(&self) -> IdentityPolicy {
        self.policy
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    pub fn counts_by_class(&self) -> &BTreeMap<String, u64> {
        &self.counts_by_class
    }

    pub fn stats(&self) -> CountStats {
        self.stats
    }

    /// End the invocation and freeze the counts.
    pub fn finish(self) -> Result<CountSnapshot, CountError> {
        CountSnapshot::new(self.counts_by_class, self.total_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn classes() -> ClassTable {
        ClassTable::new(vec!["grain".to_string(), "husk".to_string()])
            .unwrap_or_else(|err| panic!("class table: {err}"))
    }

    /// Box of class `class_id` whose centre is (50, cy).
    fn at(class_id: u32, cy: i32) -> Detection {
        Detection::new(class_id, 0.9, BoundingBox::new(40, cy - 10, 60, cy + 10))
    }

    fn state(policy: IdentityPolicy, frame_skip: u32) -> CountingState {
        let line = CountingLine::new(100, 5).unwrap_or_else(|err| panic!("line: {err}"));
        CountingState::new(line, frame_skip, policy).unwrap_or_else(|err| panic!("state: {err}"))
    }

    #[test]
    fn tracked_identity_counts_once() -> TestResult {
        let classes = classes();
        let mut state = state(IdentityPolicy::Tracked, 1);
        for cy in [98, 100, 103] {
            state.process_frame(&[at(0, cy).with_track_id(1)], &classes)?;
        }
        let snapshot = state.finish()?;
        assert_eq!(snapshot.total_count(), 1);
        assert_eq!(snapshot.count_of("grain"), 1);
        Ok(())
    }

    #[test]
    fn positional_identity_counts_every_in_band_frame() -> TestResult {
        let classes = classes();
        let mut state = state(IdentityPolicy::PositionalFallback, 1);
        for cy in [80, 100, 100, 100, 120] {
            state.process_frame(&[at(0, cy)], &classes)?;
        }
        assert_eq!(state.finish()?.total_count(), 3);
        Ok(())
    }

    #[test]
    fn same_frame_same_position_is_one_identity() -> TestResult {
        let classes = classes();
        let mut state = state(IdentityPolicy::PositionalFallback, 1);
        let outcome = state.process_frame(&[at(0, 100), at(0, 100), at(1, 100)], &classes)?;
        assert_eq!(outcome.newly_counted, 2);
        let snapshot = state.finish()?;
        assert_eq!(snapshot.count_of("grain"), 1);
        assert_eq!(snapshot.count_of("husk"), 1);
        Ok(())
    }

    #[test]
    fn malformed_box_is_skipped_but_frame_continues() -> TestResult {
        let classes = classes();
        let mut state = state(IdentityPolicy::PositionalFallback, 1);
        let bad = Detection::new(0, 0.9, BoundingBox::new(60, 90, 40, 110));
        let outcome = state.process_frame(&[bad, at(1, 100)], &classes)?;
        assert_eq!(outcome.rejected, 1);
        assert_eq!(outcome.newly_counted, 1);
        assert_eq!(state.stats().detections_rejected, 1);
        assert_eq!(state.finish()?.count_of("husk"), 1);
        Ok(())
    }

    #[test]
    fn out_of_range_confidence_is_skipped() -> TestResult {
        let classes = classes();
        let mut state = state(IdentityPolicy::PositionalFallback, 1);
        let mut det = at(0, 100);
        det.confidence = 1.5;
        let outcome = state.process_frame(&[det], &classes)?;
        assert_eq!(outcome.rejected, 1);
        assert_eq!(state.total_count(), 0);
        Ok(())
    }

    #[test]
    fn unknown_class_is_fatal_even_for_malformed_box() {
        let classes = classes();
        let mut state = state(IdentityPolicy::Tracked, 1);
        let det = Detection::new(9, 0.9, BoundingBox::new(60, 90, 40, 110));
        let err = state.process_frame(&[det], &classes).err();
        assert_eq!(err.map(|e| e.kind()), Some("unknown_class"));
    }

    #[test]
    fn frame_skip_uses_one_based_index() -> TestResult {
        let classes = classes();
        let mut state = state(IdentityPolicy::PositionalFallback, 2);
        let first = state.process_frame(&[at(0, 100)], &classes)?;
        let second = state.process_frame(&[at(0, 100)], &classes)?;
        assert!(!first.considered);
        assert!(second.considered);
        assert_eq!(second.frame_index, 2);
        assert_eq!(state.stats().frames_considered, 1);
        assert_eq!(state.total_count(), 1);
        Ok(())
    }

    #[test]
    fn zero_frame_skip_is_invalid() -> TestResult {
        let line = CountingLine::new(10, 1)?;
        let err = CountingState::new(line, 0, IdentityPolicy::Tracked).err();
        assert_eq!(err.map(|e| e.kind()), Some("invalid_options"));
        Ok(())
    }

    #[test]
    fn totals_stay_consistent_and_monotone() -> TestResult {
        let classes = classes();
        let mut state = state(IdentityPolicy::Tracked, 1);
        let mut last_total = 0;
        for frame in 0..40i32 {
            let dets: Vec<Detection> = (0..3)
                .map(|k| at((k % 2) as u32, 90 + (frame + k) % 25).with_track_id((k + frame / 7) as u64))
                .collect();
            state.process_frame(&dets, &classes)?;
            assert!(state.total_count() >= last_total);
            assert_eq!(state.total_count(), state.counts_by_class().values().sum::<u64>());
            last_total = state.total_count();
        }
        let snapshot = state.finish()?;
        assert_eq!(snapshot.total_count(), last_total);
        Ok(())
    }
}
