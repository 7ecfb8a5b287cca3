//! Conversion of device buffers into tightly packed RGB24.
//!
//! Devices pad rows to `stride` bytes; padding is dropped here. YUYV (4:2:2)
//! is converted with BT.601 full-range coefficients.

use crate::error::{RecorderError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb24,
    Yuyv,
}

impl PixelFormat {
    pub fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"RGB3" => Some(PixelFormat::Rgb24),
            b"YUYV" => Some(PixelFormat::Yuyv),
            _ => None,
        }
    }

    pub fn fourcc(&self) -> &'static [u8; 4] {
        match self {
            PixelFormat::Rgb24 => b"RGB3",
            PixelFormat::Yuyv => b"YUYV",
        }
    }

    /// Minimum bytes in one row of `width` pixels.
    pub fn row_bytes(&self, width: u32) -> usize {
        let width = width as usize;
        match self {
            PixelFormat::Rgb24 => width * 3,
            // Pixels come in pairs sharing one U and one V sample.
            PixelFormat::Yuyv => width.div_ceil(2) * 4,
        }
    }
}

/// Convert one device buffer to packed RGB24 (`width * height * 3` bytes).
///
/// `stride` is the device's bytes-per-line; `0` means rows are unpadded.
pub fn normalize_to_rgb(
    buf: &[u8],
    width: u32,
    height: u32,
    stride: usize,
    format: PixelFormat,
) -> Result<Vec<u8>> {
    let row_bytes = format.row_bytes(width);
    let stride = if stride == 0 { row_bytes } else { stride };
    if stride < row_bytes {
        return Err(RecorderError::FrameMismatch {
            expected: format!("stride of at least {row_bytes} bytes"),
            got: format!("stride {stride}"),
        });
    }
    let rows = height as usize;
    let needed = match rows {
        0 => 0,
        n => (n - 1) * stride + row_bytes,
    };
    if buf.len() < needed {
        return Err(RecorderError::FrameMismatch {
            expected: format!("{width}x{height} {format:?} ({needed} bytes)"),
            got: format!("{} bytes", buf.len()),
        });
    }

    let mut rgb = Vec::with_capacity(width as usize * rows * 3);
    for row in 0..rows {
        let start = row * stride;
        let line = &buf[start..start + row_bytes];
        match format {
            PixelFormat::Rgb24 => rgb.extend_from_slice(line),
            PixelFormat::Yuyv => yuyv_row_to_rgb(line, width as usize, &mut rgb),
        }
    }
    Ok(rgb)
}

fn yuyv_row_to_rgb(line: &[u8], width: usize, out: &mut Vec<u8>) {
    for x in 0..width {
        let pair = &line[(x / 2) * 4..(x / 2) * 4 + 4];
        let y = pair[(x % 2) * 2] as f32;
        let u = pair[1] as f32 - 128.0;
        let v = pair[3] as f32 - 128.0;
        out.push(clamp_to_u8(y + 1.402 * v));
        out.push(clamp_to_u8(y - 0.344_136 * u - 0.714_136 * v));
        out.push(clamp_to_u8(y + 1.772 * u));
    }
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_yuyv_is_gray() -> Result<()> {
        // 2x2, every sample mid-range.
        let buf = vec![128u8; 8];
        let rgb = normalize_to_rgb(&buf, 2, 2, 0, PixelFormat::Yuyv)?;
        assert_eq!(rgb, vec![128u8; 12]);
        Ok(())
    }

    #[test]
    fn yuyv_pair_shares_chroma() -> Result<()> {
        // Y0=0, Y1=255 with strong blue chroma.
        let buf = [0u8, 255, 255, 128];
        let rgb = normalize_to_rgb(&buf, 2, 1, 0, PixelFormat::Yuyv)?;
        assert_eq!(&rgb[..3], &[0, 0, 225]);
        assert_eq!(&rgb[3..], &[255, 211, 255]);
        Ok(())
    }

    #[test]
    fn padded_rows_are_compacted() -> Result<()> {
        // 1x2 RGB with 2 padding bytes per row.
        let buf = [1u8, 2, 3, 0xEE, 0xEE, 4, 5, 6, 0xEE, 0xEE];
        let rgb = normalize_to_rgb(&buf, 1, 2, 5, PixelFormat::Rgb24)?;
        assert_eq!(rgb, vec![1, 2, 3, 4, 5, 6]);
        Ok(())
    }

    #[test]
    fn last_row_may_omit_padding() -> Result<()> {
        let buf = [1u8, 2, 3, 0, 4, 5, 6];
        let rgb = normalize_to_rgb(&buf, 1, 2, 4, PixelFormat::Rgb24)?;
        assert_eq!(rgb, vec![1, 2, 3, 4, 5, 6]);
        Ok(())
    }

    #[test]
    fn short_buffer_is_rejected() {
        let buf = vec![0u8; 7];
        let err = normalize_to_rgb(&buf, 2, 2, 0, PixelFormat::Yuyv).unwrap_err();
        assert!(matches!(err, RecorderError::FrameMismatch { .. }));
        assert!(normalize_to_rgb(&buf, 2, 1, 3, PixelFormat::Yuyv).is_err());
    }

    #[test]
    fn fourcc_mapping_round_trips() {
        for format in [PixelFormat::Rgb24, PixelFormat::Yuyv] {
            assert_eq!(PixelFormat::from_fourcc(format.fourcc()), Some(format));
        }
        assert_eq!(PixelFormat::from_fourcc(b"MJPG"), None);
    }
}
