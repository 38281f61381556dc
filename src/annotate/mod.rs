//! Annotated output frames.
//!
//! The annotator draws detection boxes and the counting line straight into the frame's RGB
//! buffer and attaches the text overlays (per-box labels and running totals) for the sink to
//! render. Nothing here feeds back into counting.

#[cfg(feature = "sink-image")]
mod image_dir;
#[cfg(feature = "sink-image")]
mod text;
#[cfg(feature = "sink-video")]
mod video_file;

use std::collections::BTreeMap;

use anyhow::Result;

use crate::classes::ClassTable;
use crate::counting::CountingLine;
use crate::detect::Detection;
use crate::frame::Frame;

#[cfg(feature = "sink-image")]
pub use image_dir::ImageDirSink;
#[cfg(feature = "sink-image")]
pub use text::OverlayFont;
#[cfg(feature = "sink-video")]
pub use video_file::VideoFileSink;

pub const BOX_COLOR: [u8; 3] = [0, 255, 0];
pub const LINE_COLOR: [u8; 3] = [255, 0, 0];
pub const TEXT_COLOR: [u8; 3] = [255, 255, 255];
const STROKE: i64 = 2;

/// Text to draw at a pixel anchor (top-left of the text).
#[derive(Clone, Debug, PartialEq)]
pub struct TextOverlay {
    pub x: i32,
    pub y: i32,
    pub text: String,
    pub color: [u8; 3],
}

pub struct AnnotatedFrame {
    pub frame: Frame,
    pub overlays: Vec<TextOverlay>,
    /// False for frames outside the frame-skip stride; they carry only the line and totals.
    pub considered: bool,
    pub total_count: u64,
}

#[derive(Clone, Debug, Default)]
pub struct Annotator;

impl Annotator {
    pub fn new() -> Self {
        Self
    }

    /// Draw one frame. `detections` is empty for frames that were not considered.
    pub fn annotate(
        &self,
        mut frame: Frame,
        detections: &[Detection],
        classes: &ClassTable,
        line: &CountingLine,
        counts_by_class: &BTreeMap<String, u64>,
        total_count: u64,
        considered: bool,
    ) -> AnnotatedFrame {
        let mut overlays = Vec::new();
        for det in detections.iter().filter(|det| det.bbox.is_well_formed()) {
            let b = det.bbox;
            draw_rect(&mut frame, b.x1, b.y1, b.x2, b.y2, BOX_COLOR);
            let name = classes.resolve(det.class_id).unwrap_or("?");
            overlays.push(TextOverlay {
                x: b.x1,
                y: b.y1.saturating_sub(10),
                text: format!("{} {:.2}", name, det.confidence),
                color: BOX_COLOR,
            });
        }

        let width = frame.width as i32;
        draw_hline(&mut frame, 0, width, line.y(), LINE_COLOR);

        overlays.push(TextOverlay {
            x: 10,
            y: 30,
            text: format!("Total Objects: {}", total_count),
            color: TEXT_COLOR,
        });
        for (row, (class_name, count)) in counts_by_class.iter().enumerate() {
            overlays.push(TextOverlay {
                x: 10,
                y: 60 + 30 * row as i32,
                text: format!("{}: {}", class_name, count),
                color: TEXT_COLOR,
            });
        }

        AnnotatedFrame {
            frame,
            overlays,
            considered,
            total_count,
        }
    }
}

fn draw_hline(frame: &mut Frame, x1: i32, x2: i32, y: i32, color: [u8; 3]) {
    for dy in 0..STROKE {
        for x in i64::from(x1)..=i64::from(x2) {
            frame.put_pixel(x, i64::from(y) + dy, color);
        }
    }
}

fn draw_vline(frame: &mut Frame, x: i32, y1: i32, y2: i32, color: [u8; 3]) {
    for dx in 0..STROKE {
        for y in i64::from(y1)..=i64::from(y2) {
            frame.put_pixel(i64::from(x) + dx, y, color);
        }
    }
}

fn draw_rect(frame: &mut Frame, x1: i32, y1: i32, x2: i32, y2: i32, color: [u8; 3]) {
    // Clip to the frame so huge boxes do not walk millions of off-screen pixels.
    let w = frame.width as i32;
    let h = frame.height as i32;
    let (cx1, cx2) = (x1.clamp(-1, w), x2.clamp(-1, w));
    let (cy1, cy2) = (y1.clamp(-1, h), y2.clamp(-1, h));
    draw_hline(frame, cx1, cx2, y1.clamp(-STROKE as i32, h), color);
    draw_hline(frame, cx1, cx2, y2.clamp(-STROKE as i32, h), color);
    draw_vline(frame, x1.clamp(-STROKE as i32, w), cy1, cy2, color);
    draw_vline(frame, x2.clamp(-STROKE as i32, w), cy1, cy2, color);
}

/// Consumer of annotated frames.
pub trait FrameSink {
    fn write_frame(&mut self, frame: &AnnotatedFrame) -> Result<()>;

    /// Flush and release the output. Called once after the last frame.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// What a [`MemorySink`] keeps per frame.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameSummary {
    pub index: u64,
    pub considered: bool,
    pub total_count: u64,
    pub overlays: Vec<String>,
}

/// Records frame summaries in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub frames: Vec<FrameSummary>,
    pub finished: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameSink for MemorySink {
    fn write_frame(&mut self, frame: &AnnotatedFrame) -> Result<()> {
        self.frames.push(FrameSummary {
            index: frame.frame.index,
            considered: frame.considered,
            total_count: frame.total_count,
            overlays: frame.overlays.iter().map(|o| o.text.clone()).collect(),
        });
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}
