//! YUV4MPEG2 reader.
//!
//! Parses the stream header (`W`, `H`, `F`, `C` tags; others ignored) and converts each
//! `FRAME` payload to RGB24. Supported colour spaces: 4:2:0 variants, 4:4:4 and mono.

use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::Path;

use anyhow::{anyhow, Context, Result};

use super::normalize::{normalize_to_rgb, PixelFormat};
use super::FrameSource;
use crate::frame::{Frame, VideoInfo};

pub const MAGIC: &[u8] = b"YUV4MPEG2";
const MAX_HEADER_LEN: usize = 4096;

pub struct Y4mSource<R> {
    reader: R,
    info: VideoInfo,
    format: PixelFormat,
    frame_len: usize,
    frames_decoded: u64,
    finished: bool,
}

impl Y4mSource<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        Self::from_reader(BufReader::new(file))
    }
}

impl<R: BufRead> Y4mSource<R> {
    pub fn from_reader(mut reader: R) -> Result<Self> {
        let header = read_line(&mut reader)?.ok_or_else(|| anyhow!("empty y4m stream"))?;
        let mut tokens = header.split(' ');
        if tokens.next() != Some("YUV4MPEG2") {
            return Err(anyhow!("missing YUV4MPEG2 signature"));
        }

        let mut width = None;
        let mut height = None;
        let mut fps = 0.0;
        let mut format = PixelFormat::Yuv420p;
        for token in tokens.filter(|t| !t.is_empty()) {
            if !token.is_char_boundary(1) {
                return Err(anyhow!("y4m header has a non-ASCII tag"));
            }
            let (tag, value) = token.split_at(1);
            match tag {
                "W" => width = Some(parse_dim(value, "width")?),
                "H" => height = Some(parse_dim(value, "height")?),
                "F" => fps = parse_rate(value)?,
                "C" => format = parse_colorspace(value)?,
                _ => {}
            }
        }
        let width = width.ok_or_else(|| anyhow!("y4m header has no width"))?;
        let height = height.ok_or_else(|| anyhow!("y4m header has no height"))?;
        let frame_len = format.frame_len(width, height)?;

        Ok(Self {
            reader,
            info: VideoInfo { width, height, fps },
            format,
            frame_len,
            frames_decoded: 0,
            finished: false,
        })
    }
}

impl<R: BufRead> FrameSource for Y4mSource<R> {
    fn info(&self) -> VideoInfo {
        self.info
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.finished {
            return Ok(None);
        }
        let Some(marker) = read_line(&mut self.reader)? else {
            self.finished = true;
            return Ok(None);
        };
        if marker != "FRAME" && !marker.starts_with("FRAME ") {
            return Err(anyhow!(
                "expected FRAME marker after frame {}",
                self.frames_decoded
            ));
        }

        let mut payload = vec![0u8; self.frame_len];
        self.reader.read_exact(&mut payload).map_err(|err| {
            if err.kind() == ErrorKind::UnexpectedEof {
                anyhow!("truncated y4m frame {}", self.frames_decoded + 1)
            } else {
                anyhow!(err)
            }
        })?;
        let rgb = normalize_to_rgb(&payload, self.info.width, self.info.height, self.format)?;
        self.frames_decoded += 1;
        Ok(Some(Frame::new(
            rgb,
            self.info.width,
            self.info.height,
            self.frames_decoded,
        )?))
    }

    fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }
}

/// Read one `\n`-terminated ASCII line. `None` at a clean end of stream.
fn read_line<R: BufRead>(reader: &mut R) -> Result<Option<String>> {
    let mut line = Vec::new();
    let n = reader
        .by_ref()
        .take(MAX_HEADER_LEN as u64)
        .read_until(b'\n', &mut line)
        .context("failed to read y4m stream")?;
    if n == 0 {
        return Ok(None);
    }
    if line.last() != Some(&b'\n') {
        return Err(anyhow!("unterminated y4m header line"));
    }
    line.pop();
    let line = String::from_utf8(line).map_err(|_| anyhow!("y4m header is not ASCII"))?;
    Ok(Some(line))
}

fn parse_dim(value: &str, what: &str) -> Result<u32> {
    let parsed: u32 = value
        .parse()
        .map_err(|_| anyhow!("invalid y4m {}: {}", what, value))?;
    if parsed == 0 {
        return Err(anyhow!("y4m {} must be non-zero", what));
    }
    Ok(parsed)
}

fn parse_rate(value: &str) -> Result<f64> {
    let (num, den) = value
        .split_once(':')
        .ok_or_else(|| anyhow!("invalid y4m frame rate: {}", value))?;
    let num: f64 = num
        .parse()
        .map_err(|_| anyhow!("invalid y4m frame rate: {}", value))?;
    let den: f64 = den
        .parse()
        .map_err(|_| anyhow!("invalid y4m frame rate: {}", value))?;
    if den == 0.0 {
        return Ok(0.0);
    }
    Ok(num / den)
}

fn parse_colorspace(value: &str) -> Result<PixelFormat> {
    match value {
        "420" | "420jpeg" | "420paldv" | "420mpeg2" => Ok(PixelFormat::Yuv420p),
        "444" => Ok(PixelFormat::Yuv444p),
        "mono" => Ok(PixelFormat::Gray8),
        other => Err(anyhow!("unsupported y4m colour space: {}", other)),
    }
}
