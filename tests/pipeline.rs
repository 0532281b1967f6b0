use imageflow::processing::{
    BoxBlurFilter, BrightnessFilter, GrayscaleFilter, InvertFilter, SepiaFilter, dispatch, gpu,
};
use imageflow::{Backend, Filter, FilterPipeline, FilterRegistry, Image, PipelineError, ProcessingMode};

fn uniform(width: u32, height: u32, rgb: [u8; 3]) -> Image {
    Image::from_fn(width, height, 3, |_, _, c| rgb[c as usize]).unwrap()
}

fn gradient(width: u32, height: u32) -> Image {
    Image::from_fn(width, height, 3, |x, y, c| ((x * 5 + y * 3 + c * 60) % 256) as u8).unwrap()
}

#[test]
fn grayscale_of_uniform_color() {
    let mut pipeline = FilterPipeline::new();
    pipeline.push(Box::new(GrayscaleFilter::new()));
    let out = pipeline.apply(uniform(4, 4, [100, 150, 200]));
    assert_eq!(out.dimensions(), (4, 4, 1));
    // 29.9 + 88.05 + 22.8 = 140.75
    assert!(out.as_raw().iter().all(|&v| v == 140));
}

#[test]
fn every_filter_honors_its_shape_contract() {
    let img = gradient(17, 9);
    assert_eq!(GrayscaleFilter::new().apply(&img).dimensions(), (17, 9, 1));

    let registry = FilterRegistry::with_builtin_filters();
    for id in ["invert", "brightness", "boxblur", "sepia"] {
        let mut pipeline = FilterPipeline::new();
        pipeline.add_filter(registry.create(id, false)).unwrap();
        assert_eq!(pipeline.apply_ref(&img).dimensions(), img.dimensions(), "{}", id);
    }
}

#[test]
fn blur_keeps_uniform_images_uniform_through_a_chain() {
    let img = uniform(31, 19, [12, 200, 77]);
    let mut pipeline = FilterPipeline::new();
    pipeline.push(Box::new(BoxBlurFilter::new(1)));
    pipeline.push(Box::new(BoxBlurFilter::new(10)));
    pipeline.push(Box::new(BrightnessFilter::new(1.0)));
    assert_eq!(pipeline.apply_ref(&img), img);
}

#[test]
fn cpu_only_mode_never_touches_the_accelerator() {
    let img = gradient(40, 30);
    let mut pipeline = FilterPipeline::with_mode(ProcessingMode::CpuOnly);
    pipeline.push(Box::new(GrayscaleFilter::accelerated()));
    pipeline.push(Box::new(BoxBlurFilter::accelerated(2)));
    let (_, metrics) = pipeline.apply_with_metrics(&img);
    assert!(!metrics.gpu_used);
    for filter in pipeline.iter() {
        assert_eq!(filter.last_backend(), Backend::Cpu);
    }
}

#[test]
fn accelerated_pipeline_matches_cpu_pipeline() {
    let img = gradient(64, 48);
    let build = |mode| {
        let mut pipeline = FilterPipeline::with_mode(mode);
        pipeline.push(Box::new(SepiaFilter::new()));
        pipeline.push(Box::new(BoxBlurFilter::accelerated(3)));
        pipeline.push(Box::new(GrayscaleFilter::accelerated()));
        pipeline.push(Box::new(InvertFilter::new()));
        pipeline
    };
    let cpu = build(ProcessingMode::CpuOnly).apply_ref(&img);
    let (out, metrics) = build(ProcessingMode::GpuPreferred).apply_with_metrics(&img);
    assert_eq!(out.dimensions(), cpu.dimensions());
    for (a, b) in cpu.as_raw().iter().zip(out.as_raw()) {
        assert!(a.abs_diff(*b) <= 1);
    }
    if !gpu::is_available() {
        assert!(!metrics.gpu_used);
    }
}

#[test]
fn mode_change_applies_on_next_run() {
    let img = gradient(8, 8);
    let mut pipeline = FilterPipeline::new();
    pipeline.push(Box::new(GrayscaleFilter::accelerated()));
    pipeline.set_processing_mode(ProcessingMode::CpuOnly);
    pipeline.apply_ref(&img);
    assert_eq!(pipeline.get(0).unwrap().last_backend(), Backend::Cpu);
    assert_eq!(pipeline.processing_mode(), ProcessingMode::CpuOnly);
}

#[test]
fn structural_errors_surface_to_caller() {
    let registry = FilterRegistry::with_builtin_filters();
    let mut pipeline = FilterPipeline::new();
    assert!(matches!(
        pipeline.add_filter(registry.create("does-not-exist", false)),
        Err(PipelineError::MissingFilter)
    ));
    assert!(matches!(
        pipeline.remove_filter(0),
        Err(PipelineError::IndexOutOfRange { index: 0, len: 0 })
    ));
}

#[test]
fn saved_pipeline_reproduces_output() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chain.json");
    let registry = FilterRegistry::with_builtin_filters();

    let mut original = FilterPipeline::with_mode(ProcessingMode::CpuOnly);
    original.push(Box::new(BrightnessFilter::new(0.75)));
    original.push(Box::new(BoxBlurFilter::new(2)));
    original.push(Box::new(SepiaFilter::new()));
    original.save_to_file(&path).unwrap();

    let mut restored = FilterPipeline::new();
    restored.load_from_file(&path, &registry).unwrap();

    let img = gradient(20, 20);
    assert_eq!(restored.apply_ref(&img), original.apply_ref(&img));
}

#[test]
fn processed_image_survives_png_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.png");
    let mut pipeline = FilterPipeline::new();
    pipeline.push(Box::new(SepiaFilter::new()));
    let out = pipeline.apply(gradient(12, 7));
    out.save(&path).unwrap();
    assert_eq!(Image::load(&path).unwrap(), out);
}

/// Filter defined outside the crate, built on the public dispatch helpers.
#[derive(Clone, Default)]
struct Threshold {
    last_run: imageflow::processing::RunStats,
}

impl Filter for Threshold {
    fn id(&self) -> &'static str {
        "threshold"
    }

    fn name(&self) -> String {
        "Threshold".to_string()
    }

    fn apply_into(&mut self, input: &Image, output: &mut Image, mode: ProcessingMode) {
        let binarize = |out: &mut Image| {
            out.reshape(input.width(), input.height(), input.channels());
            for (d, s) in out.as_raw_mut().iter_mut().zip(input.as_raw()) {
                *d = if *s >= 128 { 255 } else { 0 };
            }
        };
        self.last_run = dispatch::run_with_fallback(
            "threshold",
            mode.wants_gpu(self.supports_gpu(), true),
            output,
            |_| Err(gpu::GpuError::Unavailable),
            binarize,
        );
    }

    fn box_clone(&self) -> Box<dyn Filter> {
        Box::new(self.clone())
    }

    fn supports_gpu(&self) -> bool {
        true
    }

    fn last_run(&self) -> imageflow::processing::RunStats {
        self.last_run
    }
}

#[test]
fn external_filter_reuses_buffers_and_falls_back() {
    let img = gradient(9, 5);
    let mut pipeline = FilterPipeline::with_mode(ProcessingMode::GpuPreferred);
    pipeline.push(Box::new(InvertFilter::new()));
    pipeline.push(Box::new(Threshold::default()));
    let out = pipeline.apply_ref(&img);

    assert_eq!(out.dimensions(), img.dimensions());
    for (o, i) in out.as_raw().iter().zip(img.as_raw()) {
        assert_eq!(*o, if 255 - i >= 128 { 255 } else { 0 });
    }
    assert_eq!(pipeline.get(1).unwrap().last_backend(), Backend::Cpu);

    let mut scratch = Image::scratch();
    Threshold::default().apply_into(&gradient(3, 2), &mut scratch, ProcessingMode::CpuOnly);
    assert_eq!(scratch.dimensions(), (3, 2, 3));
}
