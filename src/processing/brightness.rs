use rayon::prelude::*;

use super::dispatch::run_cpu;
use super::{Filter, FilterParams, ProcessingMode, RunStats};
use crate::image::Image;

pub const DEFAULT_FACTOR: f32 = 1.0;

/// Scales every channel value by `factor`, clamped to `[0, 255]` and truncated.
///
/// `1.0` is the identity; below darkens, above brightens.
#[derive(Clone, Debug)]
pub struct BrightnessFilter {
    factor: f32,
    last_run: RunStats,
}

impl Default for BrightnessFilter {
    fn default() -> Self {
        Self::new(DEFAULT_FACTOR)
    }
}

impl BrightnessFilter {
    pub fn new(factor: f32) -> Self {
        Self {
            factor,
            last_run: RunStats::default(),
        }
    }

    pub fn factor(&self) -> f32 {
        self.factor
    }

    pub fn set_factor(&mut self, factor: f32) {
        self.factor = factor;
    }
}

impl Filter for BrightnessFilter {
    fn id(&self) -> &'static str {
        "brightness"
    }

    fn name(&self) -> String {
        format!("Brightness ({:.2})", self.factor)
    }

    fn apply_into(&mut self, input: &Image, output: &mut Image, _mode: ProcessingMode) {
        let factor = self.factor;
        self.last_run = run_cpu(output, |out| {
            out.reshape(input.width(), input.height(), input.channels());
            let row_len = input.row_len();
            out.as_raw_mut()
                .par_chunks_mut(row_len)
                .zip(input.as_raw().par_chunks(row_len))
                .for_each(|(dst, src)| {
                    for (d, &s) in dst.iter_mut().zip(src) {
                        *d = scale(s, factor);
                    }
                });
        });
    }

    fn box_clone(&self) -> Box<dyn Filter> {
        Box::new(self.clone())
    }

    fn params(&self) -> FilterParams {
        FilterParams::from([("factor".to_string(), self.factor)])
    }

    fn last_run(&self) -> RunStats {
        self.last_run
    }
}

fn scale(v: u8, factor: f32) -> u8 {
    (v as f32 * factor).clamp(0.0, 255.0) as u8
}
