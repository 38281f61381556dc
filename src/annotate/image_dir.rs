use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::text::{render, OverlayFont};
use super::{AnnotatedFrame, FrameSink};

/// Writes every annotated frame as `frame_{n:06}.jpg` into a directory.
///
/// Text overlays are rendered only when a TTF/OTF font was supplied; boxes and the counting line
/// are already in the pixels.
pub struct ImageDirSink {
    dir: PathBuf,
    font: Option<OverlayFont>,
    written: u64,
}

impl ImageDirSink {
    pub fn create(dir: &Path, font_path: Option<&Path>) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create output dir {}", dir.display()))?;
        let font = font_path.map(OverlayFont::load).transpose()?;
        Ok(Self {
            dir: dir.to_path_buf(),
            font,
            written: 0,
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.written
    }
}

impl FrameSink for ImageDirSink {
    fn write_frame(&mut self, annotated: &AnnotatedFrame) -> Result<()> {
        let img = render(annotated, self.font.as_ref())?;
        let path = self
            .dir
            .join(format!("frame_{:06}.jpg", annotated.frame.index));
        img.save(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        log::info!(
            "ImageDirSink: wrote {} frames to {}",
            self.written,
            self.dir.display()
        );
        Ok(())
    }
}
