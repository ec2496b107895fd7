//! Decoded texture pixels.

use std::path::Path;

use tracing::info;

use crate::error::{ResourceError, ResourceResult};

/// Tightly packed RGBA8 pixels, row-major from the top-left corner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureData {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl TextureData {
    /// Decodes an image file and converts it to RGBA8.
    ///
    /// # Errors
    ///
    /// [`ResourceError::FileNotFound`] if `path` does not exist, or
    /// [`ResourceError::Image`] if decoding fails.
    pub fn from_file(path: impl AsRef<Path>) -> ResourceResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ResourceError::FileNotFound(path.to_path_buf()));
        }

        let image = image::open(path)?.to_rgba8();
        let (width, height) = image.dimensions();
        info!("Loaded texture {:?} ({}x{})", path, width, height);

        Self::from_rgba8(width, height, image.into_raw())
    }

    /// Wraps raw RGBA8 pixels.
    ///
    /// # Errors
    ///
    /// [`ResourceError::InvalidData`] for a zero dimension or a pixel buffer
    /// whose length is not `width * height * 4`.
    pub fn from_rgba8(width: u32, height: u32, pixels: Vec<u8>) -> ResourceResult<Self> {
        if width == 0 || height == 0 {
            return Err(ResourceError::InvalidData(format!(
                "texture dimensions must be non-zero (got {}x{})",
                width, height
            )));
        }

        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(ResourceError::InvalidData(format!(
                "{}x{} RGBA8 texture needs {} bytes, got {}",
                width,
                height,
                expected,
                pixels.len()
            )));
        }

        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// A single-colored texture, handy as a placeholder.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> ResourceResult<Self> {
        let count = width as usize * height as usize;
        Self::from_rgba8(width, height, rgba.repeat(count))
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rgba8_checks_length() {
        assert!(TextureData::from_rgba8(2, 2, vec![0; 16]).is_ok());
        assert!(matches!(
            TextureData::from_rgba8(2, 2, vec![0; 15]),
            Err(ResourceError::InvalidData(_))
        ));
    }

    #[test]
    fn test_zero_dimension_rejected() {
        assert!(TextureData::from_rgba8(0, 4, Vec::new()).is_err());
    }

    #[test]
    fn test_solid_fills_every_pixel() {
        let texture = TextureData::solid(3, 2, [10, 20, 30, 255]).unwrap();
        assert_eq!(texture.pixels().len(), 24);
        assert!(texture.pixels().chunks(4).all(|p| p == [10, 20, 30, 255]));
    }

    #[test]
    fn test_missing_file() {
        let result = TextureData::from_file("definitely/not/here.png");
        assert!(matches!(result, Err(ResourceError::FileNotFound(_))));
    }
}
