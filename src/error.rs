//! Error types for image buffers and filter pipelines.

use thiserror::Error;

/// Errors raised by [`crate::image::Image`] construction, access and codecs.
#[derive(Error, Debug)]
pub enum ImageError {
    #[error("image dimensions must be positive (got {width}x{height}x{channels})")]
    InvalidDimensions {
        width: u32,
        height: u32,
        channels: u32,
    },

    #[error("pixel buffer holds {actual} bytes, expected {expected}")]
    BufferLength { expected: usize, actual: usize },

    #[error("pixel access out of range: x={x}, y={y}, channel={channel}")]
    OutOfBounds { x: u32, y: u32, channel: u32 },

    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("cannot encode an image with {0} channel(s)")]
    UnsupportedChannels(u32),

    #[error(transparent)]
    Codec(#[from] image::ImageError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Structural misuse of a [`crate::pipeline::FilterPipeline`], plus persistence failures.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A filter slot resolved to nothing (for example an unknown registry id).
    #[error("filter must not be empty")]
    MissingFilter,

    #[error("filter index {index} out of range (pipeline has {len} filter(s))")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("unknown filter id `{0}`")]
    UnknownFilter(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("malformed pipeline file: {0}")]
    Format(#[from] serde_json::Error),
}
