use lumablur::{PixelFormat, VideoFrame};

/// A synthetic RGBA frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl TestFrame {
    pub fn solid(width: u32, height: u32, color: [u8; 4]) -> Self {
        let pixels = color
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Opaque black with one white pixel.
    pub fn single_bright_pixel(width: u32, height: u32, x: u32, y: u32) -> Self {
        let mut frame = Self::solid(width, height, [0, 0, 0, 255]);
        frame.set_pixel(x, y, [255, 255, 255, 255]);
        frame
    }

    /// Opaque black and white cells of `cell` pixels.
    pub fn checkerboard(width: u32, height: u32, cell: u32) -> Self {
        let cell = cell.max(1);
        let mut frame = Self::solid(width, height, [0, 0, 0, 255]);
        for y in 0..height {
            for x in 0..width {
                if (x / cell + y / cell) % 2 == 0 {
                    frame.set_pixel(x, y, [255, 255, 255, 255]);
                }
            }
        }
        frame
    }

    /// Distinct values in every channel, for exactness checks.
    pub fn gradient(width: u32, height: u32) -> Self {
        let mut frame = Self::solid(width, height, [0, 0, 0, 255]);
        for y in 0..height {
            for x in 0..width {
                frame.set_pixel(
                    x,
                    y,
                    [
                        (x * 255 / width.max(2).saturating_sub(1)).min(255) as u8,
                        (y * 255 / height.max(2).saturating_sub(1)).min(255) as u8,
                        ((x * 7 + y * 13) % 256) as u8,
                        (128 + (x + y) % 128) as u8,
                    ],
                );
            }
        }
        frame
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, color: [u8; 4]) {
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        self.pixels[offset..offset + 4].copy_from_slice(&color);
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        pixel_at(&self.pixels, self.width, x, y)
    }

    pub fn as_rgba(&self) -> VideoFrame<'_> {
        VideoFrame::new(self.width, self.height, PixelFormat::Rgba8, &self.pixels)
    }

    /// The same image with red and blue swapped, as a BGRA capture would deliver it.
    pub fn to_bgra(&self) -> Vec<u8> {
        self.pixels
            .chunks_exact(4)
            .flat_map(|pixel| [pixel[2], pixel[1], pixel[0], pixel[3]])
            .collect()
    }
}

pub fn pixel_at(data: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
    let offset = (y as usize * width as usize + x as usize) * 4;
    [
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ]
}

/// Largest per-channel difference between two equally sized images.
pub fn max_channel_difference(a: &[u8], b: &[u8]) -> u8 {
    assert_eq!(a.len(), b.len(), "images differ in size");
    a.iter()
        .zip(b)
        .map(|(left, right)| left.abs_diff(*right))
        .max()
        .unwrap_or(0)
}

/// Sum of one channel over the whole image.
pub fn channel_sum(data: &[u8], channel: usize) -> u64 {
    data.iter().skip(channel).step_by(4).map(|&value| value as u64).sum()
}
