use rayon::prelude::*;

use super::dispatch::run_with_fallback;
use super::{Filter, FilterParams, ProcessingMode, RunStats, gpu};
use crate::image::Image;

pub const MIN_RADIUS: u32 = 1;
pub const MAX_RADIUS: u32 = 10;
pub const DEFAULT_RADIUS: u32 = 1;

/// Mean over a `(2r+1) x (2r+1)` window per channel.
///
/// Neighbours outside the image are excluded from both sum and count, so edge
/// pixels average over a clipped window. The radius is clamped to `[1, 10]`.
#[derive(Clone, Debug)]
pub struct BoxBlurFilter {
    radius: u32,
    accelerated: bool,
    last_run: RunStats,
}

impl Default for BoxBlurFilter {
    fn default() -> Self {
        Self::new(DEFAULT_RADIUS)
    }
}

impl BoxBlurFilter {
    pub fn new(radius: u32) -> Self {
        Self {
            radius: clamp_radius(radius),
            accelerated: false,
            last_run: RunStats::default(),
        }
    }

    /// The accelerator variant: tries the GPU under [`ProcessingMode::Auto`].
    pub fn accelerated(radius: u32) -> Self {
        Self {
            accelerated: true,
            ..Self::new(radius)
        }
    }

    pub fn radius(&self) -> u32 {
        self.radius
    }

    pub fn set_radius(&mut self, radius: u32) {
        self.radius = clamp_radius(radius);
    }
}

fn clamp_radius(radius: u32) -> u32 {
    radius.clamp(MIN_RADIUS, MAX_RADIUS)
}

impl Filter for BoxBlurFilter {
    fn id(&self) -> &'static str {
        "boxblur"
    }

    fn name(&self) -> String {
        if self.accelerated {
            format!("Box Blur (radius={}, GPU)", self.radius)
        } else {
            format!("Box Blur (radius={})", self.radius)
        }
    }

    fn apply_into(&mut self, input: &Image, output: &mut Image, mode: ProcessingMode) {
        let radius = self.radius;
        let use_gpu = mode.wants_gpu(true, self.accelerated);
        self.last_run = run_with_fallback(
            "boxblur",
            use_gpu,
            output,
            |out| gpu::box_blur(input, radius, out),
            |out| box_blur_cpu(input, radius, out),
        );
    }

    fn box_clone(&self) -> Box<dyn Filter> {
        Box::new(self.clone())
    }

    fn supports_gpu(&self) -> bool {
        true
    }

    fn is_accelerated(&self) -> bool {
        self.accelerated
    }

    fn params(&self) -> FilterParams {
        FilterParams::from([("radius".to_string(), self.radius as f32)])
    }

    fn last_run(&self) -> RunStats {
        self.last_run
    }
}

/// Clipped `[lo, hi]` window around `i` in `0..len`.
fn window(i: usize, radius: usize, len: usize) -> (usize, usize) {
    (i.saturating_sub(radius), (i + radius).min(len - 1))
}

/// Separable integer box sum: a horizontal pass of clipped row sums, then a
/// vertical pass over those sums. Integer sums make the result identical to
/// summing the full 2D window directly.
pub(crate) fn box_blur_cpu(input: &Image, radius: u32, output: &mut Image) {
    let width = input.width() as usize;
    let height = input.height() as usize;
    let channels = input.channels() as usize;
    let radius = radius as usize;
    let row_len = input.row_len();
    let src = input.as_raw();

    let mut row_sums = vec![0u32; src.len()];
    row_sums
        .par_chunks_mut(row_len)
        .zip(src.par_chunks(row_len))
        .for_each(|(sums, row)| {
            for x in 0..width {
                let (x0, x1) = window(x, radius, width);
                for c in 0..channels {
                    sums[x * channels + c] = (x0..=x1)
                        .map(|nx| row[nx * channels + c] as u32)
                        .sum();
                }
            }
        });

    output.reshape(input.width(), input.height(), input.channels());
    output
        .as_raw_mut()
        .par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(y, dst)| {
            let (y0, y1) = window(y, radius, height);
            let rows = (y1 - y0 + 1) as u32;
            for x in 0..width {
                let (x0, x1) = window(x, radius, width);
                let count = rows * (x1 - x0 + 1) as u32;
                for c in 0..channels {
                    let i = x * channels + c;
                    let sum: u32 = (y0..=y1).map(|ny| row_sums[ny * row_len + i]).sum();
                    dst[i] = (sum / count).min(255) as u8;
                }
            }
        });
}
