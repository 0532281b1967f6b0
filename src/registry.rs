//! Identifier → constructor table for filters.
//!
//! The registry is a plain value built by whoever assembles the application
//! and passed to the code that needs it.

use std::collections::BTreeMap;

use crate::processing::{
    self, BoxBlurFilter, BrightnessFilter, Filter, FilterParams, GrayscaleFilter, InvertFilter,
    SepiaFilter,
};

pub type FilterConstructor = fn(&FilterParams) -> Box<dyn Filter>;

/// Registry entry: metadata plus CPU and optional GPU constructors.
#[derive(Clone)]
pub struct FilterInfo {
    pub id: &'static str,
    pub display_name: &'static str,
    pub description: &'static str,
    pub has_parameters: bool,
    pub create_cpu: FilterConstructor,
    pub create_gpu: Option<FilterConstructor>,
}

impl FilterInfo {
    pub fn has_gpu_version(&self) -> bool {
        self.create_gpu.is_some()
    }
}

impl std::fmt::Debug for FilterInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterInfo")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("has_parameters", &self.has_parameters)
            .field("has_gpu_version", &self.has_gpu_version())
            .finish()
    }
}

#[derive(Clone, Debug, Default)]
pub struct FilterRegistry {
    entries: BTreeMap<&'static str, FilterInfo>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the five built-in filters.
    pub fn with_builtin_filters() -> Self {
        let mut registry = Self::new();
        registry.register(FilterInfo {
            id: "grayscale",
            display_name: "Grayscale",
            description: "Convert the image to shades of gray",
            has_parameters: false,
            create_cpu: grayscale,
            create_gpu: Some(grayscale_gpu),
        });
        registry.register(FilterInfo {
            id: "invert",
            display_name: "Invert",
            description: "Invert the image colors",
            has_parameters: false,
            create_cpu: invert,
            create_gpu: None,
        });
        registry.register(FilterInfo {
            id: "brightness",
            display_name: "Brightness",
            description: "Scale the image brightness",
            has_parameters: true,
            create_cpu: brightness,
            create_gpu: None,
        });
        registry.register(FilterInfo {
            id: "boxblur",
            display_name: "Box Blur",
            description: "Blur the image with a square averaging window",
            has_parameters: true,
            create_cpu: box_blur,
            create_gpu: Some(box_blur_gpu),
        });
        registry.register(FilterInfo {
            id: "sepia",
            display_name: "Sepia Tone",
            description: "Apply a vintage sepia tone",
            has_parameters: false,
            create_cpu: sepia,
            create_gpu: None,
        });
        registry
    }

    /// Adds or replaces the entry for `info.id`.
    pub fn register(&mut self, info: FilterInfo) {
        self.entries.insert(info.id, info);
    }

    /// Builds a filter with default parameters. Falls back to the CPU variant
    /// when `accelerated` is requested but none is registered.
    pub fn create(&self, id: &str, accelerated: bool) -> Option<Box<dyn Filter>> {
        self.create_with_params(id, accelerated, &FilterParams::new())
    }

    pub fn create_with_params(
        &self,
        id: &str,
        accelerated: bool,
        params: &FilterParams,
    ) -> Option<Box<dyn Filter>> {
        let info = self.entries.get(id)?;
        let ctor = match (accelerated, info.create_gpu) {
            (true, Some(gpu)) => gpu,
            _ => info.create_cpu,
        };
        Some(ctor(params))
    }

    /// Registered ids in sorted order.
    pub fn ids(&self) -> Vec<&'static str> {
        self.entries.keys().copied().collect()
    }

    pub fn info(&self, id: &str) -> Option<&FilterInfo> {
        self.entries.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FilterInfo> {
        self.entries.values()
    }
}

fn grayscale(_: &FilterParams) -> Box<dyn Filter> {
    Box::new(GrayscaleFilter::new())
}

fn grayscale_gpu(_: &FilterParams) -> Box<dyn Filter> {
    Box::new(GrayscaleFilter::accelerated())
}

fn invert(_: &FilterParams) -> Box<dyn Filter> {
    Box::new(InvertFilter::new())
}

fn brightness(params: &FilterParams) -> Box<dyn Filter> {
    Box::new(BrightnessFilter::new(param(
        params,
        "factor",
        processing::brightness::DEFAULT_FACTOR,
    )))
}

fn box_blur(params: &FilterParams) -> Box<dyn Filter> {
    Box::new(BoxBlurFilter::new(blur_radius(params)))
}

fn box_blur_gpu(params: &FilterParams) -> Box<dyn Filter> {
    Box::new(BoxBlurFilter::accelerated(blur_radius(params)))
}

fn sepia(_: &FilterParams) -> Box<dyn Filter> {
    Box::new(SepiaFilter::new())
}

fn param(params: &FilterParams, key: &str, default: f32) -> f32 {
    params.get(key).copied().unwrap_or(default)
}

fn blur_radius(params: &FilterParams) -> u32 {
    // Registry default is a slightly stronger blur than the filter's own default.
    let radius = param(params, "radius", 2.0).round();
    if radius.is_finite() && radius > 0.0 {
        radius as u32
    } else {
        processing::blur::MIN_RADIUS
    }
}
