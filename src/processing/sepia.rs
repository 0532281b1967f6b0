use rayon::prelude::*;

use super::dispatch::run_cpu;
use super::{Filter, ProcessingMode, RunStats};
use crate::image::Image;

const SEPIA: [[f32; 3]; 3] = [
    [0.393, 0.769, 0.189],
    [0.349, 0.686, 0.168],
    [0.272, 0.534, 0.131],
];

/// Vintage sepia tone on the first three channels.
///
/// Extra channels (alpha) are copied; images with fewer than three channels
/// pass through unchanged.
#[derive(Clone, Debug, Default)]
pub struct SepiaFilter {
    last_run: RunStats,
}

impl SepiaFilter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Filter for SepiaFilter {
    fn id(&self) -> &'static str {
        "sepia"
    }

    fn name(&self) -> String {
        "Sepia Tone".to_string()
    }

    fn apply_into(&mut self, input: &Image, output: &mut Image, _mode: ProcessingMode) {
        self.last_run = run_cpu(output, |out| {
            out.reshape(input.width(), input.height(), input.channels());
            let channels = input.channels() as usize;
            if channels < 3 {
                out.as_raw_mut().copy_from_slice(input.as_raw());
                return;
            }
            let row_len = input.row_len();
            out.as_raw_mut()
                .par_chunks_mut(row_len)
                .zip(input.as_raw().par_chunks(row_len))
                .for_each(|(dst_row, src_row)| {
                    for (dst, src) in dst_row
                        .chunks_exact_mut(channels)
                        .zip(src_row.chunks_exact(channels))
                    {
                        let [r, g, b] = sepia(src[0], src[1], src[2]);
                        dst[0] = r;
                        dst[1] = g;
                        dst[2] = b;
                        dst[3..].copy_from_slice(&src[3..]);
                    }
                });
        });
    }

    fn box_clone(&self) -> Box<dyn Filter> {
        Box::new(self.clone())
    }

    fn last_run(&self) -> RunStats {
        self.last_run
    }
}

fn sepia(r: u8, g: u8, b: u8) -> [u8; 3] {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    // Coefficients are non-negative, so only the upper bound needs clamping.
    SEPIA.map(|[kr, kg, kb]| (kr * r + kg * g + kb * b).min(255.0) as u8)
}

#[cfg(test)]
mod tests {
    use super::{SepiaFilter, sepia};
    use crate::image::Image;
    use crate::processing::Filter;
    use crate::processing::test_support::pattern;

    #[test]
    fn white_saturates_to_clamped_tone() {
        // 0.272 + 0.534 + 0.131 = 0.937 of 255 for blue; red and green clip.
        assert_eq!(sepia(255, 255, 255), [255, 255, 238]);
    }

    #[test]
    fn black_stays_black() {
        assert_eq!(sepia(0, 0, 0), [0, 0, 0]);
    }

    #[test]
    fn mid_gray_matches_matrix() {
        // red: 0.393*100 + 0.769*100 + 0.189*100 = 135.1
        // green: 120.3, blue: 93.7
        assert_eq!(sepia(100, 100, 100), [135, 120, 93]);
    }

    #[test]
    fn single_channel_passes_through() {
        let img = pattern(9, 5, 1);
        let out = SepiaFilter::new().apply(&img);
        assert_eq!(out, img);
    }

    #[test]
    fn alpha_is_preserved() {
        let img = Image::from_fn(3, 2, 4, |x, _, c| if c == 3 { x as u8 * 50 } else { 80 }).unwrap();
        let out = SepiaFilter::new().apply(&img);
        assert_eq!(out.dimensions(), img.dimensions());
        for x in 0..3 {
            assert_eq!(out.get(x, 1, 3).unwrap(), x as u8 * 50);
        }
    }
}
