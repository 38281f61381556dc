use anyhow::{anyhow, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PixelFormat {
    /// Planar Y, then quarter-size U and V.
    Yuv420p,
    /// Planar Y, U, V at full resolution.
    Yuv444p,
    Gray8,
}

impl PixelFormat {
    /// Bytes one frame of this format occupies.
    pub(crate) fn frame_len(self, width: u32, height: u32) -> Result<usize> {
        let w = width as usize;
        let h = height as usize;
        let luma = w
            .checked_mul(h)
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        let chroma = w.div_ceil(2) * h.div_ceil(2);
        let len = match self {
            PixelFormat::Yuv444p => luma.checked_mul(3),
            PixelFormat::Yuv420p => luma.checked_add(chroma * 2),
            PixelFormat::Gray8 => Some(luma),
        };
        len.ok_or_else(|| anyhow!("frame dimensions overflow"))
    }
}

pub(crate) fn normalize_to_rgb(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<Vec<u8>> {
    let expected = format.frame_len(width, height)?;
    if pixels.len() != expected {
        return Err(anyhow!(
            "{:?} frame length mismatch: expected {}, got {}",
            format,
            expected,
            pixels.len()
        ));
    }
    let w = width as usize;
    let h = height as usize;
    let luma = w * h;
    match format {
        PixelFormat::Yuv420p => {
            let cw = w.div_ceil(2);
            let chroma = cw * h.div_ceil(2);
            Ok(convert(w, h, |i, j| {
                let c = (j / 2) * cw + i / 2;
                (
                    pixels[j * w + i],
                    pixels[luma + c],
                    pixels[luma + chroma + c],
                )
            }))
        }
        PixelFormat::Yuv444p => Ok(convert(w, h, |i, j| {
            let p = j * w + i;
            (pixels[p], pixels[luma + p], pixels[2 * luma + p])
        })),
        PixelFormat::Gray8 => Ok(pixels.iter().flat_map(|&y| [y, y, y]).collect()),
    }
}

fn convert(w: usize, h: usize, sample: impl Fn(usize, usize) -> (u8, u8, u8)) -> Vec<u8> {
    let mut rgb = vec![0u8; w * h * 3];
    for j in 0..h {
        for i in 0..w {
            let (y, u, v) = sample(i, j);
            let y = y as f32;
            let u = u as f32 - 128.0;
            let v = v as f32 - 128.0;

            let r = y + 1.402_f32 * v;
            let g = y - 0.344_136_f32 * u - 0.714_136_f32 * v;
            let b = y + 1.772_f32 * u;

            let offset = (j * w + i) * 3;
            rgb[offset] = clamp_to_u8(r);
            rgb[offset + 1] = clamp_to_u8(g);
            rgb[offset + 2] = clamp_to_u8(b);
        }
    }
    rgb
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yuv420p_handles_odd_dimensions() -> Result<()> {
        // 3x3 luma, 2x2 chroma planes.
        let mut frame = vec![200u8; 9];
        frame.extend(vec![128u8; 4]);
        frame.extend(vec![128u8; 4]);
        let rgb = normalize_to_rgb(&frame, 3, 3, PixelFormat::Yuv420p)?;
        assert_eq!(rgb, vec![200u8; 27]);
        Ok(())
    }

    #[test]
    fn red_chroma_pushes_red_channel() -> Result<()> {
        let frame = [vec![100u8], vec![128u8], vec![228u8]].concat();
        let rgb = normalize_to_rgb(&frame, 1, 1, PixelFormat::Yuv444p)?;
        assert!(rgb[0] > 200);
        assert!(rgb[1] < 100);
        Ok(())
    }

    #[test]
    fn length_mismatch_is_rejected() {
        assert!(normalize_to_rgb(&[1u8; 8], 1, 3, PixelFormat::Yuv444p).is_err());
        assert!(normalize_to_rgb(&[1u8; 4], 2, 2, PixelFormat::Yuv420p).is_err());
    }

    #[test]
    fn gray_expands_to_rgb() -> Result<()> {
        let rgb = normalize_to_rgb(&[7u8, 9u8], 2, 1, PixelFormat::Gray8)?;
        assert_eq!(rgb, vec![7, 7, 7, 9, 9, 9]);
        Ok(())
    }

    #[test]
    fn frame_len_matches_y4m_layouts() -> Result<()> {
        assert_eq!(PixelFormat::Yuv420p.frame_len(3, 3)?, 9 + 2 * 4);
        assert_eq!(PixelFormat::Yuv444p.frame_len(2, 2)?, 12);
        assert_eq!(PixelFormat::Gray8.frame_len(5, 1)?, 5);
        assert!(PixelFormat::Yuv444p.frame_len(u32::MAX, u32::MAX).is_err());
        Ok(())
    }
}
