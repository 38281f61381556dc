//! Local video file source.
//!
//! `FileSource` picks a decoder for a local path:
//! - `stub://` URIs produce a synthetic video (tests, dry runs)
//! - YUV4MPEG2 streams (by magic or `.y4m` extension) use the built-in reader
//! - anything else goes to FFmpeg when built with `ingest-file-ffmpeg`
//!
//! Remote URLs are refused.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{anyhow, Context, Result};

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::y4m::{self, Y4mSource};
use super::FrameSource;
use crate::error::CountError;
use crate::frame::{Frame, VideoInfo};

/// Open `path` for counting. Every failure is reported as [`CountError::VideoOpen`].
pub fn open_video(path: &str) -> Result<FileSource, CountError> {
    FileSource::open(path).map_err(|err| CountError::video_open(path, format!("{:#}", err)))
}

/// Local file frame source.
pub struct FileSource {
    path: String,
    backend: FileBackend,
}

enum FileBackend {
    Synthetic(SyntheticSource),
    Y4m(Y4mSource<BufReader<File>>),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl FileSource {
    pub fn open(path: &str) -> Result<Self> {
        if !is_local_file_path(path) {
            return Err(anyhow!(
                "file ingestion only supports local paths (no URL schemes)"
            ));
        }
        let backend = if let Some(stub) = path.strip_prefix("stub://") {
            FileBackend::Synthetic(SyntheticSource::parse(stub)?)
        } else if is_y4m(Path::new(path))? {
            FileBackend::Y4m(Y4mSource::open(Path::new(path))?)
        } else {
            open_container(path)?
        };
        let source = Self {
            path: path.to_string(),
            backend,
        };
        let info = source.info();
        log::info!(
            "FileSource: opened {} ({}x{} @ {:.2} fps, {})",
            source.path,
            info.width,
            info.height,
            info.fps,
            source.decoder_name()
        );
        Ok(source)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn decoder_name(&self) -> &'static str {
        match &self.backend {
            FileBackend::Synthetic(_) => "synthetic",
            FileBackend::Y4m(_) => "y4m",
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(_) => "ffmpeg",
        }
    }
}

impl FrameSource for FileSource {
    fn info(&self) -> VideoInfo {
        match &self.backend {
            FileBackend::Synthetic(source) => source.info(),
            FileBackend::Y4m(source) => source.info(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.info(),
        }
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.next_frame(),
            FileBackend::Y4m(source) => source.next_frame(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.next_frame(),
        }
    }

    fn frames_decoded(&self) -> u64 {
        match &self.backend {
            FileBackend::Synthetic(source) => source.frames_decoded(),
            FileBackend::Y4m(source) => source.frames_decoded(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.frames_decoded(),
        }
    }
}

#[cfg(feature = "ingest-file-ffmpeg")]
fn open_container(path: &str) -> Result<FileBackend> {
    Ok(FileBackend::Ffmpeg(FfmpegFileSource::new(path)?))
}

#[cfg(not(feature = "ingest-file-ffmpeg"))]
fn open_container(path: &str) -> Result<FileBackend> {
    if !Path::new(path).exists() {
        return Err(anyhow!("no such file"));
    }
    Err(anyhow!(
        "only YUV4MPEG2 input is built in; rebuild with --features ingest-file-ffmpeg"
    ))
}

fn is_y4m(path: &Path) -> Result<bool> {
    if path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("y4m"))
    {
        return Ok(true);
    }
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(err) => return Err(err).with_context(|| format!("failed to open {}", path.display())),
    };
    let mut magic = [0u8; 9];
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(magic == y4m::MAGIC),
        Err(_) => Ok(false),
    }
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with("stub://") {
        return true;
    }
    !path.contains("://")
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests
// ----------------------------------------------------------------------------

/// `stub://name?frames=N&width=W&height=H&fps=F`; missing keys take defaults.
struct SyntheticSource {
    info: VideoInfo,
    total_frames: u64,
    frames_decoded: u64,
}

impl SyntheticSource {
    fn parse(stub: &str) -> Result<Self> {
        let query = stub.split_once('?').map(|(_, q)| q).unwrap_or("");
        let mut info = VideoInfo {
            width: 640,
            height: 480,
            fps: 25.0,
        };
        let mut total_frames = 10;
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("invalid stub parameter: {}", pair))?;
            let bad = || anyhow!("invalid stub value for {}: {}", key, value);
            match key {
                "frames" => total_frames = value.parse().map_err(|_| bad())?,
                "width" => info.width = value.parse().map_err(|_| bad())?,
                "height" => info.height = value.parse().map_err(|_| bad())?,
                "fps" => info.fps = value.parse().map_err(|_| bad())?,
                other => return Err(anyhow!("unknown stub parameter: {}", other)),
            }
        }
        if info.width == 0 || info.height == 0 {
            return Err(anyhow!("stub video must have non-zero size"));
        }
        Ok(Self {
            info,
            total_frames,
            frames_decoded: 0,
        })
    }

    fn info(&self) -> VideoInfo {
        self.info
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.frames_decoded >= self.total_frames {
            return Ok(None);
        }
        self.frames_decoded += 1;
        let shade = (self.frames_decoded % 256) as u8;
        Frame::solid(
            self.info.width,
            self.info.height,
            self.frames_decoded,
            [shade, shade, shade],
        )
        .map(Some)
    }

    fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_source_is_finite() -> Result<()> {
        let mut source = FileSource::open("stub://belt?frames=3&width=8&height=6&fps=12")?;
        assert_eq!(source.info().height, 6);
        assert_eq!(source.info().fps, 12.0);
        let mut last = 0;
        while let Some(frame) = source.next_frame()? {
            assert_eq!(frame.index, last + 1);
            last = frame.index;
        }
        assert_eq!(last, 3);
        assert_eq!(source.frames_decoded(), 3);
        Ok(())
    }

    #[test]
    fn stub_rejects_unknown_keys() {
        assert!(FileSource::open("stub://belt?speed=3").is_err());
    }

    #[test]
    fn rejects_remote_urls() {
        let err = open_video("rtsp://camera/stream").err();
        assert!(matches!(err, Some(CountError::VideoOpen { .. })));
    }

    #[test]
    fn missing_file_is_video_open_error() {
        let err = open_video("/nonexistent/clip.y4m").err();
        assert_eq!(err.map(|e| e.kind()), Some("video_open"));
    }

    #[test]
    fn y4m_detected_by_magic() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("upload.bin");
        let mut bytes = b"YUV4MPEG2 W2 H2 F10:1 Cmono\nFRAME\n".to_vec();
        bytes.extend_from_slice(&[1, 2, 3, 4]);
        std::fs::write(&path, bytes)?;
        let path = path.to_string_lossy().into_owned();
        let mut source = open_video(&path)?;
        assert_eq!(source.decoder_name(), "y4m");
        assert!(source.next_frame()?.is_some());
        assert!(source.next_frame()?.is_none());
        Ok(())
    }
}
