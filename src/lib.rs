//! Filter pipelines over 8-bit image buffers, with a CPU path for every
//! filter and a wgpu compute path for grayscale and box blur.

pub mod config;
pub mod error;
pub mod files;
pub mod image;
pub mod pipeline;
pub mod processing;
pub mod registry;

pub use error::{ImageError, PipelineError};
pub use image::Image;
pub use pipeline::{FilterPipeline, PipelineMetrics};
pub use processing::{Backend, Filter, FilterParams, ProcessingMode};
pub use registry::{FilterInfo, FilterRegistry};
