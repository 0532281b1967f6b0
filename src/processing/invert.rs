use rayon::prelude::*;

use super::dispatch::run_cpu;
use super::{Filter, ProcessingMode, RunStats};
use crate::image::Image;

// Flattened bytes handed to each rayon task.
const CHUNK: usize = 4096;

/// Photographic negative: every byte `v` becomes `255 - v`, for any channel count.
#[derive(Clone, Debug, Default)]
pub struct InvertFilter {
    last_run: RunStats,
}

impl InvertFilter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Filter for InvertFilter {
    fn id(&self) -> &'static str {
        "invert"
    }

    fn name(&self) -> String {
        "Invert".to_string()
    }

    fn apply_into(&mut self, input: &Image, output: &mut Image, _mode: ProcessingMode) {
        self.last_run = run_cpu(output, |out| {
            out.reshape(input.width(), input.height(), input.channels());
            out.as_raw_mut()
                .par_chunks_mut(CHUNK)
                .zip(input.as_raw().par_chunks(CHUNK))
                .for_each(|(dst, src)| {
                    for (d, s) in dst.iter_mut().zip(src) {
                        *d = 255 - s;
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

#[cfg(test)]
mod tests {
    use super::InvertFilter;
    use crate::image::Image;
    use crate::processing::Filter;
    use crate::processing::test_support::pattern;

    #[test]
    fn inverts_every_byte() {
        let img = Image::from_raw(2, 1, 3, vec![0, 1, 127, 128, 254, 255]).unwrap();
        let out = InvertFilter::new().apply(&img);
        assert_eq!(out.as_raw(), &[255, 254, 128, 127, 1, 0]);
    }

    #[test]
    fn is_an_involution() {
        let img = pattern(67, 41, 4);
        let mut filter = InvertFilter::new();
        let once = filter.apply(&img);
        let twice = filter.apply(&once);
        assert_eq!(twice, img);
    }

    #[test]
    fn all_byte_values_invert_back() {
        let bytes: Vec<u8> = (0..=255).collect();
        let img = Image::from_raw(256, 1, 1, bytes).unwrap();
        let mut filter = InvertFilter::new();
        let inverted = filter.apply(&img);
        assert_eq!(inverted.as_raw()[0], 255);
        assert_eq!(filter.apply(&inverted), img);
    }
}
