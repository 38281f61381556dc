use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_text_mut;

use super::AnnotatedFrame;

/// Font used to burn label and total overlays into output frames.
pub struct OverlayFont {
    font: FontVec,
    scale: PxScale,
}

impl OverlayFont {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read font {}", path.display()))?;
        let font = FontVec::try_from_vec(bytes)
            .map_err(|_| anyhow!("invalid font file {}", path.display()))?;
        Ok(Self {
            font,
            scale: PxScale::from(18.0),
        })
    }
}

/// Copy the frame into an `RgbImage`, drawing text overlays when a font is available.
pub(crate) fn render(annotated: &AnnotatedFrame, font: Option<&OverlayFont>) -> Result<RgbImage> {
    let frame = &annotated.frame;
    let mut img = RgbImage::from_raw(frame.width, frame.height, frame.pixels().to_vec())
        .ok_or_else(|| anyhow!("frame buffer does not match its geometry"))?;
    if let Some(font) = font {
        for overlay in &annotated.overlays {
            draw_text_mut(
                &mut img,
                Rgb(overlay.color),
                overlay.x,
                overlay.y,
                font.scale,
                &font.font,
                &overlay.text,
            );
        }
    }
    Ok(img)
}
