//! Annotated output video.
//!
//! Encodes one MPEG-4 frame per input frame at the source resolution and frame rate. The
//! container is picked by FFmpeg from the output file extension (`.mp4`, `.avi`, `.mkv`).

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;

use super::text::{render, OverlayFont};
use super::{AnnotatedFrame, FrameSink};
use crate::frame::VideoInfo;

/// Used when the source does not report a frame rate.
const FALLBACK_FPS: f64 = 25.0;

pub struct VideoFileSink {
    path: PathBuf,
    output: ffmpeg::format::context::Output,
    encoder: ffmpeg::encoder::video::Encoder,
    scaler: ffmpeg::software::scaling::context::Context,
    stream_index: usize,
    encoder_time_base: ffmpeg::Rational,
    width: u32,
    height: u32,
    font: Option<OverlayFont>,
    written: u64,
    finished: bool,
}

impl VideoFileSink {
    pub fn create(path: &Path, info: VideoInfo, font_path: Option<&Path>) -> Result<Self> {
        if info.width == 0 || info.height == 0 {
            return Err(anyhow!("output video must have non-zero size"));
        }
        ffmpeg::init().context("initialize ffmpeg")?;
        let font = font_path.map(OverlayFont::load).transpose()?;

        let fps = if info.fps.is_finite() && info.fps > 0.0 {
            info.fps
        } else {
            log::warn!(
                "source reports no frame rate; writing {} at {} fps",
                path.display(),
                FALLBACK_FPS
            );
            FALLBACK_FPS
        };
        let frame_rate = ffmpeg::Rational::from(fps);
        let time_base = frame_rate.invert();

        let mut output = ffmpeg::format::output(&path)
            .with_context(|| format!("failed to create output video {}", path.display()))?;
        let global_header = output
            .format()
            .flags()
            .contains(ffmpeg::format::flag::Flags::GLOBAL_HEADER);
        let codec = ffmpeg::encoder::find(ffmpeg::codec::Id::MPEG4)
            .ok_or_else(|| anyhow!("ffmpeg was built without an MPEG-4 encoder"))?;
        let stream_index = output
            .add_stream(codec)
            .context("add output video stream")?
            .index();

        let mut encoder = ffmpeg::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .context("create video encoder")?;
        encoder.set_width(info.width);
        encoder.set_height(info.height);
        encoder.set_format(ffmpeg::format::Pixel::YUV420P);
        encoder.set_time_base(time_base);
        encoder.set_frame_rate(Some(frame_rate));
        if global_header {
            encoder.set_flags(ffmpeg::codec::flag::Flags::GLOBAL_HEADER);
        }
        let encoder = encoder.open_as(codec).context("open video encoder")?;
        {
            let mut stream = output
                .stream_mut(stream_index)
                .ok_or_else(|| anyhow!("output video stream disappeared"))?;
            stream.set_parameters(&encoder);
            stream.set_time_base(time_base);
        }
        output
            .write_header()
            .with_context(|| format!("failed to write header of {}", path.display()))?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            ffmpeg::format::Pixel::RGB24,
            info.width,
            info.height,
            ffmpeg::format::Pixel::YUV420P,
            info.width,
            info.height,
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        log::info!(
            "VideoFileSink: writing {} ({}x{} @ {:.2} fps)",
            path.display(),
            info.width,
            info.height,
            fps
        );
        Ok(Self {
            path: path.to_path_buf(),
            output,
            encoder,
            scaler,
            stream_index,
            encoder_time_base: time_base,
            width: info.width,
            height: info.height,
            font,
            written: 0,
            finished: false,
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.written
    }

    fn write_packets(&mut self) -> Result<()> {
        let stream_time_base = self
            .output
            .stream(self.stream_index)
            .map(|stream| stream.time_base())
            .ok_or_else(|| anyhow!("output video stream disappeared"))?;
        let mut packet = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.stream_index);
            packet.rescale_ts(self.encoder_time_base, stream_time_base);
            packet
                .write_interleaved(&mut self.output)
                .context("write encoded packet")?;
        }
        Ok(())
    }
}

impl FrameSink for VideoFileSink {
    fn write_frame(&mut self, annotated: &AnnotatedFrame) -> Result<()> {
        let frame = &annotated.frame;
        if frame.width != self.width || frame.height != self.height {
            return Err(anyhow!(
                "frame {} is {}x{}, output video is {}x{}",
                frame.index,
                frame.width,
                frame.height,
                self.width,
                self.height
            ));
        }
        let img = render(annotated, self.font.as_ref())?;

        let mut rgb =
            ffmpeg::frame::Video::new(ffmpeg::format::Pixel::RGB24, self.width, self.height);
        let row_bytes = self.width as usize * 3;
        let stride = rgb.stride(0);
        let data = rgb.data_mut(0);
        for (row, src) in img.as_raw().chunks_exact(row_bytes).enumerate() {
            let start = row * stride;
            data.get_mut(start..start + row_bytes)
                .context("ffmpeg frame row is out of bounds")?
                .copy_from_slice(src);
        }

        let mut yuv = ffmpeg::frame::Video::empty();
        self.scaler
            .run(&rgb, &mut yuv)
            .context("convert frame to YUV420P")?;
        yuv.set_pts(Some(self.written as i64));
        self.encoder
            .send_frame(&yuv)
            .context("send frame to video encoder")?;
        self.write_packets()?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.encoder.send_eof().context("flush video encoder")?;
        self.write_packets()?;
        self.output
            .write_trailer()
            .with_context(|| format!("failed to finalize {}", self.path.display()))?;
        log::info!(
            "VideoFileSink: wrote {} frames to {}",
            self.written,
            self.path.display()
        );
        Ok(())
    }
}

impl Drop for VideoFileSink {
    fn drop(&mut self) {
        if !self.finished {
            log::warn!(
                "VideoFileSink: {} was not finalized after {} frames",
                self.path.display(),
                self.written
            );
        }
    }
}
