//! Ordered filter chains.

use std::fmt;
use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PipelineError;
use crate::image::Image;
use crate::processing::{Backend, Filter, FilterParams, ProcessingMode};
use crate::registry::FilterRegistry;

/// Per-run timing collected by [`FilterPipeline::apply_with_metrics`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PipelineMetrics {
    pub total_ms: f64,
    pub filter_times: Vec<f64>,
    pub filter_names: Vec<String>,
    /// True when at least one step ran on the accelerator.
    pub gpu_used: bool,
}

/// An ordered list of filters applied in sequence to one image.
///
/// The pipeline never holds an empty slot. Cloning deep-copies every filter.
#[derive(Clone, Debug, Default)]
pub struct FilterPipeline {
    filters: Vec<Box<dyn Filter>>,
    mode: ProcessingMode,
}

#[derive(Serialize, Deserialize)]
struct PipelineFile {
    #[serde(default)]
    mode: ProcessingMode,
    pipeline: Vec<FilterRecord>,
}

#[derive(Serialize, Deserialize)]
struct FilterRecord {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    accelerated: bool,
    #[serde(default)]
    params: FilterParams,
}

impl FilterPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mode: ProcessingMode) -> Self {
        Self {
            filters: Vec::new(),
            mode,
        }
    }

    pub fn processing_mode(&self) -> ProcessingMode {
        self.mode
    }

    /// Takes effect on the next apply; filters keep no copy of the mode.
    pub fn set_processing_mode(&mut self, mode: ProcessingMode) {
        self.mode = mode;
    }

    pub fn push(&mut self, filter: Box<dyn Filter>) {
        self.filters.push(filter);
    }

    /// Appends a filter that may not exist, e.g. the result of a registry lookup.
    pub fn add_filter(&mut self, filter: Option<Box<dyn Filter>>) -> Result<(), PipelineError> {
        let filter = filter.ok_or(PipelineError::MissingFilter)?;
        self.filters.push(filter);
        Ok(())
    }

    /// Inserts before `index`; `index == len()` appends.
    pub fn insert_filter(
        &mut self,
        index: usize,
        filter: Option<Box<dyn Filter>>,
    ) -> Result<(), PipelineError> {
        if index > self.filters.len() {
            return Err(self.out_of_range(index));
        }
        let filter = filter.ok_or(PipelineError::MissingFilter)?;
        self.filters.insert(index, filter);
        Ok(())
    }

    pub fn remove_filter(&mut self, index: usize) -> Result<Box<dyn Filter>, PipelineError> {
        if index >= self.filters.len() {
            return Err(self.out_of_range(index));
        }
        Ok(self.filters.remove(index))
    }

    /// Swaps the filter at `index` with its predecessor. Index 0 and
    /// out-of-range indices are a no-op; returns whether anything moved.
    pub fn move_filter_up(&mut self, index: usize) -> bool {
        if index == 0 || index >= self.filters.len() {
            return false;
        }
        self.filters.swap(index - 1, index);
        true
    }

    /// Swaps the filter at `index` with its successor. The last index and
    /// out-of-range indices are a no-op; returns whether anything moved.
    pub fn move_filter_down(&mut self, index: usize) -> bool {
        if index + 1 >= self.filters.len() {
            return false;
        }
        self.filters.swap(index, index + 1);
        true
    }

    pub fn clear(&mut self) {
        self.filters.clear();
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<&dyn Filter, PipelineError> {
        self.filters
            .get(index)
            .map(|f| &**f as &dyn Filter)
            .ok_or_else(|| self.out_of_range(index))
    }

    pub fn get_mut(&mut self, index: usize) -> Result<&mut dyn Filter, PipelineError> {
        let len = self.filters.len();
        match self.filters.get_mut(index) {
            Some(filter) => Ok(&mut **filter),
            None => Err(PipelineError::IndexOutOfRange { index, len }),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Filter> {
        self.filters.iter().map(|f| &**f as &dyn Filter)
    }

    fn out_of_range(&self, index: usize) -> PipelineError {
        PipelineError::IndexOutOfRange {
            index,
            len: self.filters.len(),
        }
    }

    /// Runs every filter in order. An empty pipeline returns `image` untouched.
    pub fn apply(&mut self, image: Image) -> Image {
        self.run(image, |_, _| {})
    }

    /// Like [`FilterPipeline::apply`], leaving `image` intact for comparison.
    pub fn apply_ref(&mut self, image: &Image) -> Image {
        self.apply(image.clone())
    }

    /// Calls `progress(percent, filter_name)` after each filter completes.
    pub fn apply_with_progress<F>(&mut self, image: Image, mut progress: F) -> Image
    where
        F: FnMut(f32, &str),
    {
        let total = self.filters.len();
        self.run(image, |step, filter| {
            let percent = (step + 1) as f32 / total as f32 * 100.0;
            progress(percent, &filter.name());
        })
    }

    pub fn apply_with_metrics(&mut self, image: &Image) -> (Image, PipelineMetrics) {
        let mut metrics = PipelineMetrics::default();
        let start = Instant::now();
        let output = self.run(image.clone(), |_, filter| {
            let stats = filter.last_run();
            metrics.filter_times.push(stats.elapsed_ms());
            metrics.filter_names.push(filter.name());
            metrics.gpu_used |= stats.backend == Backend::Gpu;
        });
        metrics.total_ms = start.elapsed().as_secs_f64() * 1000.0;
        (output, metrics)
    }

    /// Threads `image` through the filters using two rotating buffers: the
    /// previous result is the next filter's input and the older buffer is
    /// reused as its output.
    fn run<F>(&mut self, image: Image, mut after_step: F) -> Image
    where
        F: FnMut(usize, &dyn Filter),
    {
        let mode = self.mode;
        let mut current = image;
        let mut next = Image::scratch();
        for (step, filter) in self.filters.iter_mut().enumerate() {
            filter.apply_into(&current, &mut next, mode);
            std::mem::swap(&mut current, &mut next);

            let stats = filter.last_run();
            debug!(
                step = step + 1,
                filter = %filter.name(),
                backend = ?stats.backend,
                elapsed_ms = stats.elapsed_ms(),
                "pipeline step finished"
            );
            after_step(step, &**filter);
        }
        current
    }

    /// One-line summary for logs; not a stable format.
    pub fn describe(&self) -> String {
        if self.filters.is_empty() {
            return "Empty pipeline".to_string();
        }
        let names: Vec<String> = self.filters.iter().map(|f| f.name()).collect();
        format!("{} filter(s): {}", self.filters.len(), names.join(" → "))
    }

    pub fn to_json(&self) -> Result<String, PipelineError> {
        let file = PipelineFile {
            mode: self.mode,
            pipeline: self
                .filters
                .iter()
                .map(|f| FilterRecord {
                    id: f.id().to_string(),
                    name: f.name(),
                    accelerated: f.is_accelerated(),
                    params: f.params(),
                })
                .collect(),
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }

    /// Replaces this pipeline's filters and mode with the ones described by
    /// `json`. On any error the pipeline is left unchanged.
    pub fn load_json(&mut self, json: &str, registry: &FilterRegistry) -> Result<(), PipelineError> {
        let file: PipelineFile = serde_json::from_str(json)?;
        let filters = file
            .pipeline
            .iter()
            .map(|record| {
                registry
                    .create_with_params(&record.id, record.accelerated, &record.params)
                    .ok_or_else(|| PipelineError::UnknownFilter(record.id.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.filters = filters;
        self.mode = file.mode;
        Ok(())
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), PipelineError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load_from_file(
        &mut self,
        path: &Path,
        registry: &FilterRegistry,
    ) -> Result<(), PipelineError> {
        let json = std::fs::read_to_string(path)?;
        self.load_json(&json, registry)
    }
}

impl fmt::Display for FilterPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FilterPipeline[{}]:", self.filters.len())?;
        for (i, filter) in self.filters.iter().enumerate() {
            write!(f, "\n  {}. {}", i + 1, filter.name())?;
        }
        Ok(())
    }
}
