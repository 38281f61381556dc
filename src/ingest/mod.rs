//! Frame sources.
//!
//! A source decodes one stored video into RGB `Frame`s, in order, exactly once:
//! - `stub://` synthetic videos (testing)
//! - YUV4MPEG2 files, no native dependencies
//! - Container formats via FFmpeg (feature: ingest-file-ffmpeg)
//!
//! Sources are local-only. A source is owned by a single invocation and released when dropped;
//! re-counting a video means opening it again.

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
mod normalize;
pub mod y4m;

use anyhow::Result;

use crate::frame::{Frame, VideoInfo};

pub use file::{open_video, FileSource};
pub use y4m::Y4mSource;

/// A finite, ordered stream of decoded frames.
pub trait FrameSource {
    /// Stream geometry, known before the first frame.
    fn info(&self) -> VideoInfo;

    /// Decode the next frame. `Ok(None)` marks the end of the stream.
    ///
    /// Frame indices start at 1 and increase by one per decoded frame.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Frames decoded so far.
    fn frames_decoded(&self) -> u64;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn info(&self) -> VideoInfo {
        (**self).info()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        (**self).next_frame()
    }

    fn frames_decoded(&self) -> u64 {
        (**self).frames_decoded()
    }
}
