use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageBuffer, ImageFormat};

use crate::error::ImageError;

pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Row-major, channel-interleaved 8-bit pixel buffer.
///
/// The buffer length always equals `width * height * channels`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Image {
    width: u32,
    height: u32,
    channels: u32,
    pixels: Vec<u8>,
}

impl Image {
    /// Allocates a zero-filled image. Every dimension must be positive.
    pub fn new(width: u32, height: u32, channels: u32) -> Result<Self, ImageError> {
        let len = checked_len(width, height, channels)?;
        Ok(Self {
            width,
            height,
            channels,
            pixels: vec![0; len],
        })
    }

    /// Wraps an existing pixel buffer, validating its length.
    pub fn from_raw(
        width: u32,
        height: u32,
        channels: u32,
        pixels: Vec<u8>,
    ) -> Result<Self, ImageError> {
        let expected = checked_len(width, height, channels)?;
        if pixels.len() != expected {
            return Err(ImageError::BufferLength {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            channels,
            pixels,
        })
    }

    /// Builds an image by evaluating `f(x, y, channel)` for every element.
    pub fn from_fn<F>(width: u32, height: u32, channels: u32, mut f: F) -> Result<Self, ImageError>
    where
        F: FnMut(u32, u32, u32) -> u8,
    {
        let mut img = Self::new(width, height, channels)?;
        let mut i = 0;
        for y in 0..height {
            for x in 0..width {
                for c in 0..channels {
                    img.pixels[i] = f(x, y, c);
                    i += 1;
                }
            }
        }
        Ok(img)
    }

    /// Buffer with no pixels, used as the scratch side of a buffer swap
    /// before the first filter reshapes it.
    pub fn scratch() -> Self {
        Self {
            width: 0,
            height: 0,
            channels: 0,
            pixels: Vec::new(),
        }
    }

    /// Resizes this buffer in place to the given shape, keeping the
    /// allocation when it is large enough. Contents are zeroed.
    pub fn reshape(&mut self, width: u32, height: u32, channels: u32) {
        let len = width as usize * height as usize * channels as usize;
        self.width = width;
        self.height = height;
        self.channels = channels;
        self.pixels.clear();
        self.pixels.resize(len, 0);
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u32 {
        self.channels
    }

    pub fn dimensions(&self) -> (u32, u32, u32) {
        (self.width, self.height, self.channels)
    }

    /// Number of bytes in the pixel buffer.
    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Bytes per row.
    pub fn row_len(&self) -> usize {
        self.width as usize * self.channels as usize
    }

    pub fn get(&self, x: u32, y: u32, channel: u32) -> Result<u8, ImageError> {
        let i = self.index_of(x, y, channel)?;
        Ok(self.pixels[i])
    }

    pub fn set(&mut self, x: u32, y: u32, channel: u32, value: u8) -> Result<(), ImageError> {
        let i = self.index_of(x, y, channel)?;
        self.pixels[i] = value;
        Ok(())
    }

    /// Contiguous pixel storage.
    pub fn as_raw(&self) -> &[u8] {
        &self.pixels
    }

    /// Mutable view of the pixel storage; the length cannot change through it.
    pub fn as_raw_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    fn index_of(&self, x: u32, y: u32, channel: u32) -> Result<usize, ImageError> {
        if x >= self.width || y >= self.height || channel >= self.channels {
            return Err(ImageError::OutOfBounds { x, y, channel });
        }
        Ok((y as usize * self.width as usize + x as usize) * self.channels as usize
            + channel as usize)
    }

    /// Decodes an image file. 16-bit and float sources are narrowed to 8 bits.
    pub fn load(path: &Path) -> Result<Self, ImageError> {
        let decoded = image::open(path)?;
        Self::from_dynamic(decoded)
    }

    /// Encodes to the format implied by the file extension (PNG, JPEG, BMP, TGA).
    pub fn save(&self, path: &Path) -> Result<(), ImageError> {
        self.save_with_quality(path, DEFAULT_JPEG_QUALITY)
    }

    /// Same as [`Image::save`], with an explicit JPEG quality (1-100).
    pub fn save_with_quality(&self, path: &Path, jpeg_quality: u8) -> Result<(), ImageError> {
        let format = ImageFormat::from_path(path)
            .map_err(|_| ImageError::UnsupportedFormat(extension_label(path)))?;
        let dynamic = self.to_dynamic()?;
        match format {
            ImageFormat::Jpeg => {
                // JPEG has no alpha channel.
                let dynamic = match self.channels {
                    2 => DynamicImage::ImageLuma8(dynamic.into_luma8()),
                    4 => DynamicImage::ImageRgb8(dynamic.into_rgb8()),
                    _ => dynamic,
                };
                let writer = BufWriter::new(File::create(path)?);
                let encoder = JpegEncoder::new_with_quality(writer, jpeg_quality.clamp(1, 100));
                dynamic.write_with_encoder(encoder)?;
            }
            ImageFormat::Png | ImageFormat::Bmp | ImageFormat::Tga => {
                dynamic.save_with_format(path, format)?;
            }
            _ => return Err(ImageError::UnsupportedFormat(extension_label(path))),
        }
        Ok(())
    }

    pub fn from_dynamic(img: DynamicImage) -> Result<Self, ImageError> {
        let (width, height) = (img.width(), img.height());
        let (channels, pixels) = match img.color().channel_count() {
            1 => (1, img.into_luma8().into_raw()),
            2 => (2, img.into_luma_alpha8().into_raw()),
            3 => (3, img.into_rgb8().into_raw()),
            _ => (4, img.into_rgba8().into_raw()),
        };
        Self::from_raw(width, height, channels, pixels)
    }

    pub fn to_dynamic(&self) -> Result<DynamicImage, ImageError> {
        let (w, h) = (self.width, self.height);
        let raw = self.pixels.clone();
        let dynamic = match self.channels {
            1 => ImageBuffer::from_raw(w, h, raw).map(DynamicImage::ImageLuma8),
            2 => ImageBuffer::from_raw(w, h, raw).map(DynamicImage::ImageLumaA8),
            3 => ImageBuffer::from_raw(w, h, raw).map(DynamicImage::ImageRgb8),
            4 => ImageBuffer::from_raw(w, h, raw).map(DynamicImage::ImageRgba8),
            n => return Err(ImageError::UnsupportedChannels(n)),
        };
        dynamic.ok_or(ImageError::BufferLength {
            expected: w as usize * h as usize * self.channels as usize,
            actual: self.pixels.len(),
        })
    }
}

fn checked_len(width: u32, height: u32, channels: u32) -> Result<usize, ImageError> {
    if width == 0 || height == 0 || channels == 0 {
        return Err(ImageError::InvalidDimensions {
            width,
            height,
            channels,
        });
    }
    Ok(width as usize * height as usize * channels as usize)
}

fn extension_label(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "<none>".to_string())
}
