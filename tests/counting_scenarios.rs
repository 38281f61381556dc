use anyhow::Result;

use line_counter::detect::{BoundingBox, Detection, DetectorBackend, ScriptedBackend};
use line_counter::frame::Frame;
use line_counter::{
    CancelFlag, ClassTable, CountError, CountOptions, CounterContext, IdentityPolicy,
    ResultStore, SqliteResultStore, UploadService,
};

/// 100px-high frames: the default counting line sits at y=40, band [35, 45].
const VIDEO: &str = "stub://conveyor?frames=10&width=64&height=100";

fn classes() -> ClassTable {
    ClassTable::new(vec!["grain".to_string(), "husk".to_string()]).expect("class table")
}

fn grain_at(cy: i32) -> Detection {
    Detection::new(0, 0.9, BoundingBox::new(20, cy - 8, 36, cy + 8))
}

/// One grain whose centre is exactly on the line for frames 4-6 and elsewhere otherwise.
fn grain_script() -> Vec<Vec<Detection>> {
    (1..=10)
        .map(|frame| {
            let cy = match frame {
                1..=3 => 10 * frame,
                4..=6 => 40,
                _ => 20 + 10 * frame,
            };
            vec![grain_at(cy).with_track_id(7)]
        })
        .collect()
}

fn count(
    backend: ScriptedBackend,
    options: &CountOptions,
) -> Result<line_counter::CountReport, CountError> {
    let mut context = CounterContext::new(Box::new(backend), classes());
    context.count(VIDEO, options, None, &CancelFlag::new())
}

#[test]
fn tracked_object_is_counted_once() -> Result<()> {
    let report = count(ScriptedBackend::new(grain_script()), &CountOptions::default())?;

    assert_eq!(report.policy, IdentityPolicy::Tracked);
    assert_eq!(report.snapshot.total_count(), 1);
    assert_eq!(
        report.snapshot.counts_by_class().iter().collect::<Vec<_>>(),
        vec![(&"grain".to_string(), &1)]
    );
    Ok(())
}

#[test]
fn untracked_object_is_counted_per_in_band_frame() -> Result<()> {
    let report = count(
        ScriptedBackend::new(grain_script()).without_tracking(),
        &CountOptions::default(),
    )?;

    assert_eq!(report.policy, IdentityPolicy::PositionalFallback);
    assert_eq!(report.snapshot.total_count(), 3);
    assert_eq!(report.snapshot.count_of("grain"), 3);
    Ok(())
}

#[test]
fn malformed_box_does_not_stop_valid_detection() -> Result<()> {
    let mut script = vec![Vec::new(); 10];
    script[4] = vec![
        Detection::new(0, 0.9, BoundingBox::new(40, 30, 20, 50)),
        Detection::new(1, 0.8, BoundingBox::new(10, 32, 30, 48)),
    ];
    let report = count(ScriptedBackend::new(script), &CountOptions::default())?;

    assert_eq!(report.snapshot.total_count(), 1);
    assert_eq!(report.snapshot.count_of("husk"), 1);
    assert_eq!(report.snapshot.count_of("grain"), 0);
    assert_eq!(report.detections_rejected, 1);
    assert_eq!(report.frames_decoded, 10);
    Ok(())
}

#[test]
fn unknown_class_fails_and_persists_nothing() -> Result<()> {
    let mut script = grain_script();
    script[5].push(Detection::new(9, 0.9, BoundingBox::new(0, 30, 10, 50)));
    let dir = tempfile::tempdir()?;
    let db_path = dir.path().join("results.db").to_string_lossy().into_owned();
    let context = CounterContext::new(Box::new(ScriptedBackend::new(script)), classes());
    let mut service = UploadService::new(
        context,
        Box::new(SqliteResultStore::open(&db_path)?),
        CountOptions::default(),
    );

    // Any Y4M with 10 frames of 64x100.
    let mut video = b"YUV4MPEG2 W64 H100 F25:1 Cmono\n".to_vec();
    for _ in 0..10 {
        video.extend_from_slice(b"FRAME\n");
        video.extend(std::iter::repeat(16u8).take(64 * 100));
    }

    let err = service
        .process(&video, Some("belt.y4m"), &CancelFlag::new())
        .expect_err("unknown class must fail");
    assert_eq!(err.kind(), "unknown_class");
    assert!(matches!(
        err,
        line_counter::UploadError::Count(CountError::UnknownClass { class_id: 9, .. })
    ));
    drop(service);

    let mut store = SqliteResultStore::open(&db_path)?;
    assert!(store.ids()?.is_empty());
    Ok(())
}

#[test]
fn detection_only_rerun_is_idempotent() -> Result<()> {
    let mut context = CounterContext::new(
        Box::new(ScriptedBackend::new(grain_script()).without_tracking()),
        classes(),
    );
    let options = CountOptions::default();
    let first = context.count(VIDEO, &options, None, &CancelFlag::new())?;
    let second = context.count(VIDEO, &options, None, &CancelFlag::new())?;

    assert_eq!(first.snapshot, second.snapshot);
    assert_eq!(first.detections_considered, second.detections_considered);
    Ok(())
}

#[test]
fn frame_skip_never_increases_counts() -> Result<()> {
    let every = count(
        ScriptedBackend::new(grain_script()).without_tracking(),
        &CountOptions::default(),
    )?;
    let every_other = count(
        ScriptedBackend::new(grain_script()).without_tracking(),
        &CountOptions {
            frame_skip: 2,
            ..CountOptions::default()
        },
    )?;

    assert!(every_other.snapshot.total_count() <= every.snapshot.total_count());
    assert!(every_other.detections_considered <= every.detections_considered);
    assert_eq!(every_other.frames_considered, 5);
    // Frames 4 and 6 are in band and even.
    assert_eq!(every_other.snapshot.total_count(), 2);
    Ok(())
}

#[test]
fn explicit_line_and_tolerance_override_defaults() -> Result<()> {
    let options = CountOptions {
        line_y: Some(30),
        tolerance: 0,
        ..CountOptions::default()
    };
    let report = count(ScriptedBackend::new(grain_script()).without_tracking(), &options)?;

    assert_eq!(report.line_y, 30);
    // Only frame 3 puts the centre exactly on row 30.
    assert_eq!(report.snapshot.total_count(), 1);
    Ok(())
}

/// Backend without tracking of its own; tracking mode falls to the built-in IoU tracker.
struct SlidingGrain;

impl DetectorBackend for SlidingGrain {
    fn name(&self) -> &'static str {
        "sliding"
    }

    fn detect(&mut self, frame: &Frame, _min_confidence: f32) -> anyhow::Result<Vec<Detection>> {
        let cy = 20 + 5 * frame.index as i32;
        Ok(vec![Detection::new(0, 0.8, BoundingBox::new(20, cy - 10, 40, cy + 10))])
    }
}

#[test]
fn iou_tracker_links_a_moving_object() -> Result<()> {
    let mut context = CounterContext::new(Box::new(SlidingGrain), classes());
    let report = context.count(VIDEO, &CountOptions::default(), None, &CancelFlag::new())?;

    assert_eq!(report.policy, IdentityPolicy::Tracked);
    assert_eq!(report.snapshot.total_count(), 1);
    Ok(())
}

#[test]
fn unopenable_video_is_fatal() {
    let mut context = CounterContext::new(Box::new(ScriptedBackend::new(Vec::new())), classes());
    let err = context
        .count(
            "/definitely/missing/conveyor.y4m",
            &CountOptions::default(),
            None,
            &CancelFlag::new(),
        )
        .expect_err("missing video must fail");
    assert_eq!(err.kind(), "video_open");
}
