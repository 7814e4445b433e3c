//! Raw media frame representation
//!
//! Frames are tightly packed 8-bit RGB: 3 bytes per pixel, rows of
//! `width * 3` bytes with no padding.

/// A frame of RGB pixel data
#[derive(Debug, Clone, PartialEq)]
pub struct MediaFrame {
    /// Tightly packed RGB bytes
    pub data: Vec<u8>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
}

impl MediaFrame {
    pub const BYTES_PER_PIXEL: usize = 3;

    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self { data, width, height }
    }

    /// A frame filled with a single color
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take(Self::expected_size(width, height))
            .collect();
        Self { data, width, height }
    }

    /// Expected data size for the given dimensions (width * height * 3)
    pub fn expected_size(width: u32, height: u32) -> usize {
        (width as usize) * (height as usize) * Self::BYTES_PER_PIXEL
    }

    /// Row length in bytes
    pub fn stride(&self) -> usize {
        self.width as usize * Self::BYTES_PER_PIXEL
    }

    /// Check the data length matches the dimensions and the frame is non-empty
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0 && self.data.len() == Self::expected_size(self.width, self.height)
    }

    /// Expand to RGBA with an opaque alpha channel, the layout GPU textures take.
    pub fn to_rgba(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.data.len() / 3 * 4);
        for px in self.data.chunks_exact(3) {
            out.extend_from_slice(&[px[0], px[1], px[2], 255]);
        }
        out
    }
}
