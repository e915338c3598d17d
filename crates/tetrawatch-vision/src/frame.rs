use std::{
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use image::RgbImage;

/// Failure to obtain a usable frame.
#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum CaptureFault {
    #[display("capture unavailable: {reason}")]
    Unavailable { reason: String },
    #[display("malformed frame: {width}x{height} with {len} bytes")]
    Malformed { width: u32, height: u32, len: usize },
    #[display("failed to decode {}", path.display())]
    Decode {
        path: PathBuf,
        source: image::ImageError,
    },
    #[display("capture source disconnected")]
    Disconnected,
}

impl CaptureFault {
    /// Returns `true` if the source will never produce another frame.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Disconnected)
    }
}

/// Byte order of the three channels of each pixel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChannelLayout {
    #[default]
    Rgb8,
    Bgr8,
}

/// One captured screen image.
///
/// Frames are immutable; pixel data is reference counted so cloning a frame or sending it
/// to another thread does not copy the image.
#[derive(Debug, Clone)]
pub struct Frame {
    pixels: Arc<[u8]>,
    width: u32,
    height: u32,
    layout: ChannelLayout,
    captured_at: Instant,
    sequence: u64,
}

impl Frame {
    /// Wraps raw pixel data captured now.
    pub fn new(
        pixels: impl Into<Arc<[u8]>>,
        width: u32,
        height: u32,
        layout: ChannelLayout,
        sequence: u64,
    ) -> Result<Self, CaptureFault> {
        let pixels = pixels.into();
        let expected = (width as usize) * (height as usize) * 3;
        if width == 0 || height == 0 || pixels.len() != expected {
            return Err(CaptureFault::Malformed {
                width,
                height,
                len: pixels.len(),
            });
        }
        Ok(Self {
            pixels,
            width,
            height,
            layout,
            captured_at: Instant::now(),
            sequence,
        })
    }

    pub fn from_rgb_image(image: &RgbImage, sequence: u64) -> Result<Self, CaptureFault> {
        Self::new(
            image.as_raw().as_slice(),
            image.width(),
            image.height(),
            ChannelLayout::Rgb8,
            sequence,
        )
    }

    /// Overrides the capture timestamp.
    #[must_use]
    pub fn with_captured_at(mut self, captured_at: Instant) -> Self {
        self.captured_at = captured_at;
        self
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    #[must_use]
    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// Time elapsed since capture.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.captured_at.elapsed()
    }

    #[must_use]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    #[must_use]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height
    }

    /// Pixel as `[r, g, b]` regardless of the channel layout.
    #[must_use]
    pub fn rgb(&self, x: u32, y: u32) -> [u8; 3] {
        let idx = ((y as usize) * (self.width as usize) + (x as usize)) * 3;
        let p = &self.pixels[idx..idx + 3];
        match self.layout {
            ChannelLayout::Rgb8 => [p[0], p[1], p[2]],
            ChannelLayout::Bgr8 => [p[2], p[1], p[0]],
        }
    }

    /// Rec. 601 luma in `0.0..=255.0`.
    #[must_use]
    pub fn luma(&self, x: u32, y: u32) -> f32 {
        let [r, g, b] = self.rgb(x, y);
        0.299 * f32::from(r) + 0.587 * f32::from(g) + 0.114 * f32::from(b)
    }

    /// Bilinear luma sample at a sub-pixel position, clamped to the frame edges.
    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    #[must_use]
    pub fn luma_bilinear(&self, x: f32, y: f32) -> f32 {
        let max_x = (self.width - 1) as f32;
        let max_y = (self.height - 1) as f32;
        let (x, y) = (x.clamp(0.0, max_x), y.clamp(0.0, max_y));
        let (x0, y0) = (x.floor() as u32, y.floor() as u32);
        let (x1, y1) = ((x0 + 1).min(self.width - 1), (y0 + 1).min(self.height - 1));
        let (fx, fy) = (x - x0 as f32, y - y0 as f32);

        let a = self.luma(x0, y0) + fx * (self.luma(x1, y0) - self.luma(x0, y0));
        let b = self.luma(x0, y1) + fx * (self.luma(x1, y1) - self.luma(x0, y1));
        a + fy * (b - a)
    }

    /// Luma of the whole frame in row-major order.
    #[must_use]
    pub fn luma_plane(&self) -> LumaPlane {
        let mut data = Vec::with_capacity((self.width as usize) * (self.height as usize));
        for y in 0..self.height {
            for x in 0..self.width {
                data.push(self.luma(x, y));
            }
        }
        LumaPlane {
            width: self.width as usize,
            height: self.height as usize,
            data,
        }
    }
}

/// Single-channel intensity image.
#[derive(Debug, Clone)]
pub struct LumaPlane {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
}

impl LumaPlane {
    #[inline]
    #[must_use]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }
}
