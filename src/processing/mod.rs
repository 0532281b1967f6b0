//! Filter contract and the concrete per-pixel filters.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::image::Image;

pub mod blur;
pub mod brightness;
pub mod dispatch;
pub mod gpu;
pub mod grayscale;
pub mod invert;
pub mod sepia;

pub use blur::BoxBlurFilter;
pub use brightness::BrightnessFilter;
pub use grayscale::GrayscaleFilter;
pub use invert::InvertFilter;
pub use sepia::SepiaFilter;

/// Named numeric parameters of a filter, used for persistence and the registry.
pub type FilterParams = BTreeMap<String, f32>;

/// Which execution paths accelerator-capable filters may take.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    /// Filters built as accelerator variants try the GPU; everything else runs on the CPU.
    #[default]
    Auto,
    CpuOnly,
    /// Every accelerator-capable filter tries the GPU.
    GpuPreferred,
}

impl ProcessingMode {
    pub fn label(self) -> &'static str {
        match self {
            ProcessingMode::Auto => "auto",
            ProcessingMode::CpuOnly => "cpu",
            ProcessingMode::GpuPreferred => "gpu",
        }
    }

    /// Whether a filter should attempt its GPU path under this mode.
    pub fn wants_gpu(self, supports_gpu: bool, accelerated: bool) -> bool {
        if !supports_gpu {
            return false;
        }
        match self {
            ProcessingMode::CpuOnly => false,
            ProcessingMode::GpuPreferred => true,
            ProcessingMode::Auto => accelerated,
        }
    }
}

impl fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Execution path that produced a filter's most recent output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Backend {
    #[default]
    Cpu,
    Gpu,
}

/// Timing and backend of one filter invocation.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RunStats {
    pub backend: Backend,
    pub elapsed: Duration,
}

impl RunStats {
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }
}

/// A stateless (per call) transformation from one image buffer to another.
///
/// The only state kept between calls is the diagnostic [`RunStats`] of the
/// last invocation.
pub trait Filter: Send {
    /// Registry identifier, stable across versions.
    fn id(&self) -> &'static str;

    /// Human-readable name; may embed parameter values.
    fn name(&self) -> String;

    /// Runs the filter, writing into `output`. `output` is reshaped as needed
    /// so its allocation can be reused across calls.
    fn apply_into(&mut self, input: &Image, output: &mut Image, mode: ProcessingMode);

    /// Runs the filter under [`ProcessingMode::Auto`] into a fresh buffer.
    fn apply(&mut self, input: &Image) -> Image {
        let mut output = Image::scratch();
        self.apply_into(input, &mut output, ProcessingMode::Auto);
        output
    }

    fn box_clone(&self) -> Box<dyn Filter>;

    fn supports_gpu(&self) -> bool {
        false
    }

    /// Whether this instance was built as its accelerator variant.
    fn is_accelerated(&self) -> bool {
        false
    }

    fn params(&self) -> FilterParams {
        FilterParams::new()
    }

    fn last_run(&self) -> RunStats;

    fn last_execution_ms(&self) -> f64 {
        self.last_run().elapsed_ms()
    }

    fn last_backend(&self) -> Backend {
        self.last_run().backend
    }
}

impl Clone for Box<dyn Filter> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

impl fmt::Debug for dyn Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("id", &self.id())
            .field("name", &self.name())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::image::Image;

    /// Deterministic RGB test pattern.
    pub fn pattern(width: u32, height: u32, channels: u32) -> Image {
        Image::from_fn(width, height, channels, |x, y, c| {
            ((x * 7 + y * 13 + c * 71) % 256) as u8
        })
        .unwrap()
    }

    pub fn assert_close(a: &Image, b: &Image, tolerance: u8) {
        assert_eq!(a.dimensions(), b.dimensions());
        for (i, (l, r)) in a.as_raw().iter().zip(b.as_raw()).enumerate() {
            let d = l.abs_diff(*r);
            assert!(
                d <= tolerance,
                "byte {} differed by {} (left={}, right={}, tol={})",
                i,
                d,
                l,
                r,
                tolerance
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Backend, ProcessingMode, RunStats};
    use std::time::Duration;

    #[test]
    fn cpu_only_never_wants_gpu() {
        assert!(!ProcessingMode::CpuOnly.wants_gpu(true, true));
    }

    #[test]
    fn gpu_preferred_requires_capability() {
        assert!(ProcessingMode::GpuPreferred.wants_gpu(true, false));
        assert!(!ProcessingMode::GpuPreferred.wants_gpu(false, true));
    }

    #[test]
    fn auto_follows_filter_variant() {
        assert!(ProcessingMode::Auto.wants_gpu(true, true));
        assert!(!ProcessingMode::Auto.wants_gpu(true, false));
    }

    #[test]
    fn run_stats_report_milliseconds() {
        let stats = RunStats {
            backend: Backend::Cpu,
            elapsed: Duration::from_micros(2500),
        };
        assert!((stats.elapsed_ms() - 2.5).abs() < 1e-9);
    }
}
