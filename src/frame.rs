use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::error::{BlurError, Result};

pub const BYTES_PER_PIXEL: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    Rgba8,
    Bgra8,
}

/// A borrowed video frame as delivered by the capture session.
#[derive(Debug, Clone, Copy)]
pub struct VideoFrame<'a> {
    pub width: u32,
    pub height: u32,
    /// Bytes between the starts of consecutive rows.
    pub stride: usize,
    pub format: PixelFormat,
    pub data: &'a [u8],
}

impl<'a> VideoFrame<'a> {
    /// A tightly packed frame.
    pub fn new(width: u32, height: u32, format: PixelFormat, data: &'a [u8]) -> Self {
        Self {
            width,
            height,
            stride: width as usize * BYTES_PER_PIXEL,
            format,
            data,
        }
    }

    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self
    }

    fn row_bytes(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(BlurError::InvalidFrame(format!(
                "frame has zero size ({}x{})",
                self.width, self.height
            )));
        }
        if self.stride < self.row_bytes() {
            return Err(BlurError::InvalidFrame(format!(
                "stride {} is shorter than a row of {} bytes",
                self.stride,
                self.row_bytes()
            )));
        }
        let required = self
            .stride
            .checked_mul(self.height as usize - 1)
            .and_then(|body| body.checked_add(self.row_bytes()))
            .ok_or_else(|| {
                BlurError::InvalidFrame(format!(
                    "{} rows at stride {} overflow the address space",
                    self.height, self.stride
                ))
            })?;
        if self.data.len() < required {
            return Err(BlurError::InvalidFrame(format!(
                "buffer holds {} bytes, {}x{} at stride {} needs {}",
                self.data.len(),
                self.width,
                self.height,
                self.stride,
                required
            )));
        }
        Ok(())
    }

    /// Tightly packed RGBA bytes, borrowed when no conversion is needed.
    pub fn to_rgba8(&self) -> Result<Cow<'a, [u8]>> {
        self.validate()?;
        let row_bytes = self.row_bytes();
        let tight_len = row_bytes * self.height as usize;

        if self.format == PixelFormat::Rgba8 && self.stride == row_bytes {
            return Ok(Cow::Borrowed(&self.data[..tight_len]));
        }

        let mut pixels = Vec::with_capacity(tight_len);
        for row in self.data.chunks(self.stride).take(self.height as usize) {
            let row = &row[..row_bytes];
            match self.format {
                PixelFormat::Rgba8 => pixels.extend_from_slice(row),
                PixelFormat::Bgra8 => {
                    for pixel in row.chunks_exact(BYTES_PER_PIXEL) {
                        pixels.extend_from_slice(&[pixel[2], pixel[1], pixel[0], pixel[3]]);
                    }
                }
            }
        }
        Ok(Cow::Owned(pixels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tight_rgba_is_borrowed() {
        let data = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let frame = VideoFrame::new(2, 1, PixelFormat::Rgba8, &data);
        assert!(matches!(frame.to_rgba8(), Ok(Cow::Borrowed(_))));
    }

    #[test]
    fn bgra_is_swizzled_and_stride_dropped() {
        let data = [
            10u8, 20, 30, 255, 0, 0, // row 0 + 2 bytes padding
            40, 50, 60, 128, 0, 0,
        ];
        let frame = VideoFrame::new(1, 2, PixelFormat::Bgra8, &data).with_stride(6);
        let pixels = frame.to_rgba8().expect("valid frame");
        assert_eq!(&*pixels, &[30, 20, 10, 255, 60, 50, 40, 128]);
    }

    #[test]
    fn last_row_may_omit_padding() {
        let data = [0u8; 6 + 4];
        let frame = VideoFrame::new(1, 2, PixelFormat::Rgba8, &data).with_stride(6);
        assert!(frame.validate().is_ok());
    }

    #[test]
    fn invalid_frames_are_rejected() {
        let data = [0u8; 16];
        assert!(matches!(
            VideoFrame::new(0, 2, PixelFormat::Rgba8, &data).validate(),
            Err(BlurError::InvalidFrame(_))
        ));
        assert!(matches!(
            VideoFrame::new(2, 2, PixelFormat::Rgba8, &data).with_stride(4).validate(),
            Err(BlurError::InvalidFrame(_))
        ));
        assert!(matches!(
            VideoFrame::new(3, 2, PixelFormat::Rgba8, &data).validate(),
            Err(BlurError::InvalidFrame(_))
        ));
    }

    #[test]
    fn huge_stride_is_rejected_without_overflow() {
        let data = [0u8; 16];
        let frame =
            VideoFrame::new(1, 3, PixelFormat::Rgba8, &data).with_stride(usize::MAX / 2 + 1);
        assert!(matches!(frame.validate(), Err(BlurError::InvalidFrame(_))));
        assert!(matches!(frame.to_rgba8(), Err(BlurError::InvalidFrame(_))));
    }
}
