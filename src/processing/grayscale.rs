use rayon::prelude::*;

use super::dispatch::run_with_fallback;
use super::{Filter, ProcessingMode, RunStats, gpu};
use crate::image::Image;

// ITU-R BT.601 luma weights.
const LUMA_R: f32 = 0.299;
const LUMA_G: f32 = 0.587;
const LUMA_B: f32 = 0.114;

/// Converts to a single-channel luminance image.
///
/// Inputs with fewer than three channels keep their first channel; any alpha
/// channel is dropped.
#[derive(Clone, Debug, Default)]
pub struct GrayscaleFilter {
    accelerated: bool,
    last_run: RunStats,
}

impl GrayscaleFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The accelerator variant: tries the GPU under [`ProcessingMode::Auto`].
    pub fn accelerated() -> Self {
        Self {
            accelerated: true,
            ..Self::default()
        }
    }
}

impl Filter for GrayscaleFilter {
    fn id(&self) -> &'static str {
        "grayscale"
    }

    fn name(&self) -> String {
        if self.accelerated {
            "Grayscale (GPU)".to_string()
        } else {
            "Grayscale".to_string()
        }
    }

    fn apply_into(&mut self, input: &Image, output: &mut Image, mode: ProcessingMode) {
        let use_gpu = mode.wants_gpu(true, self.accelerated) && input.channels() >= 3;
        self.last_run = run_with_fallback(
            "grayscale",
            use_gpu,
            output,
            |out| gpu::grayscale(input, out),
            |out| grayscale_cpu(input, out),
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

    fn last_run(&self) -> RunStats {
        self.last_run
    }
}

/// Truncated `0.299 R + 0.587 G + 0.114 B`.
pub fn luminance(r: u8, g: u8, b: u8) -> u8 {
    (LUMA_R * r as f32 + LUMA_G * g as f32 + LUMA_B * b as f32) as u8
}

pub(crate) fn grayscale_cpu(input: &Image, output: &mut Image) {
    let channels = input.channels() as usize;
    let src_row_len = input.row_len();
    output.reshape(input.width(), input.height(), 1);
    let width = input.width() as usize;
    let src = input.as_raw();

    output
        .as_raw_mut()
        .par_chunks_mut(width)
        .zip(src.par_chunks(src_row_len))
        .for_each(|(dst_row, src_row)| {
            for (dst, px) in dst_row.iter_mut().zip(src_row.chunks_exact(channels)) {
                *dst = if channels >= 3 {
                    luminance(px[0], px[1], px[2])
                } else {
                    px[0]
                };
            }
        });
}

#[cfg(test)]
mod tests {
    use super::{GrayscaleFilter, grayscale_cpu, luminance};
    use crate::image::Image;
    use crate::processing::test_support::{assert_close, pattern};
    use crate::processing::{Backend, Filter, ProcessingMode, gpu};

    #[test]
    fn uniform_rgb_maps_to_truncated_luminance() {
        let img = Image::from_fn(4, 4, 3, |_, _, c| [100, 150, 200][c as usize]).unwrap();
        let out = GrayscaleFilter::new().apply(&img);
        assert_eq!(out.dimensions(), (4, 4, 1));
        // 29.9 + 88.05 + 22.8 = 140.75
        let expected = luminance(100, 150, 200);
        assert_eq!(expected, 140);
        assert!(out.as_raw().iter().all(|&v| v == expected));
    }

    #[test]
    fn rgba_drops_alpha() {
        let img = Image::from_fn(2, 3, 4, |_, _, c| if c == 3 { 7 } else { 255 }).unwrap();
        let out = GrayscaleFilter::new().apply(&img);
        assert_eq!(out.dimensions(), (2, 3, 1));
        assert!(out.as_raw().iter().all(|&v| v == 254 || v == 255));
    }

    #[test]
    fn single_channel_passes_through() {
        let img = pattern(5, 4, 1);
        let out = GrayscaleFilter::new().apply(&img);
        assert_eq!(out, img);
    }

    #[test]
    fn records_execution_time_and_cpu_backend() {
        let img = pattern(16, 16, 3);
        let mut filter = GrayscaleFilter::new();
        let mut out = Image::new(1, 1, 1).unwrap();
        filter.apply_into(&img, &mut out, ProcessingMode::CpuOnly);
        assert_eq!(filter.last_backend(), Backend::Cpu);
        assert!(filter.last_execution_ms() >= 0.0);
    }

    #[test]
    fn accelerated_variant_always_produces_cpu_equivalent_output() {
        // Either the GPU runs or the fallback does; both must agree with the CPU path.
        let img = pattern(37, 23, 3);
        let mut cpu = Image::new(1, 1, 1).unwrap();
        grayscale_cpu(&img, &mut cpu);

        let mut filter = GrayscaleFilter::accelerated();
        let mut out = Image::new(1, 1, 1).unwrap();
        filter.apply_into(&img, &mut out, ProcessingMode::GpuPreferred);
        assert_close(&cpu, &out, 1);
        if !gpu::is_available() {
            assert_eq!(filter.last_backend(), Backend::Cpu);
        }
    }

    #[test]
    fn parity_matches_cpu_on_gpu() {
        if !gpu::is_available() {
            return;
        }
        let img = pattern(64, 48, 3);
        let mut cpu = Image::new(1, 1, 1).unwrap();
        grayscale_cpu(&img, &mut cpu);
        let mut out = Image::new(1, 1, 1).unwrap();
        gpu::grayscale(&img, &mut out).expect("gpu grayscale should succeed");
        assert_close(&cpu, &out, 1);
    }

    #[test]
    fn name_marks_accelerated_variant() {
        assert_eq!(GrayscaleFilter::new().name(), "Grayscale");
        assert_eq!(GrayscaleFilter::accelerated().name(), "Grayscale (GPU)");
    }
}
