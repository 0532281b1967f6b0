use std::time::Instant;

use anyhow::{Context, Result};

use imageflow::processing::{Backend, BoxBlurFilter, Filter, GrayscaleFilter, ProcessingMode, gpu};
use imageflow::Image;

const DEFAULT_WIDTH: u32 = 2000;
const DEFAULT_HEIGHT: u32 = 1500;
const BLUR_RADIUS: u32 = 3;

fn median_ms(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) * 0.5
    } else {
        sorted[mid]
    }
}

fn gradient(width: u32, height: u32) -> Result<Image> {
    Image::from_fn(width, height, 3, |x, y, c| match c {
        0 => (x * 255 / width.max(1)) as u8,
        1 => (y * 255 / height.max(1)) as u8,
        _ => ((x + y) % 256) as u8,
    })
    .context("building gradient image")
}

struct Run {
    median_ms: f64,
    backend: Backend,
}

fn time_filter(filter: &mut dyn Filter, input: &Image, mode: ProcessingMode, runs: usize) -> Run {
    let mut output = input.clone();
    let mut samples = Vec::with_capacity(runs);
    let mut backend = Backend::Cpu;
    for _ in 0..runs {
        let t0 = Instant::now();
        filter.apply_into(input, &mut output, mode);
        samples.push(t0.elapsed().as_secs_f64() * 1000.0);
        backend = filter.last_backend();
    }
    Run {
        median_ms: median_ms(&samples),
        backend,
    }
}

fn report(key: &str, cpu: &Run, gpu: &Run) {
    println!("METRIC {}_cpu_ms_median={:.2}", key, cpu.median_ms);
    println!("METRIC {}_gpu_ms_median={:.2}", key, gpu.median_ms);
    println!(
        "METRIC {}_speedup={:.2}",
        key,
        cpu.median_ms / gpu.median_ms.max(1e-9)
    );
    println!("METRIC {}_gpu_used={}", key, gpu.backend == Backend::Gpu);
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let runs = args
        .next()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(5)
        .max(1);
    let width = args
        .next()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(DEFAULT_WIDTH);
    let height = args
        .next()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(DEFAULT_HEIGHT);

    let input = gradient(width, height)?;
    let status = gpu::runtime_status();
    eprintln!(
        "bench: {}x{}x3, {} run(s), gpu {}",
        width,
        height,
        runs,
        status.adapter_name.as_deref().unwrap_or("unavailable")
    );

    let mut grayscale = GrayscaleFilter::accelerated();
    let cpu = time_filter(&mut grayscale, &input, ProcessingMode::CpuOnly, runs);
    let gpu = time_filter(&mut grayscale, &input, ProcessingMode::GpuPreferred, runs);
    report("grayscale", &cpu, &gpu);

    let mut blur = BoxBlurFilter::accelerated(BLUR_RADIUS);
    let cpu = time_filter(&mut blur, &input, ProcessingMode::CpuOnly, runs);
    let gpu = time_filter(&mut blur, &input, ProcessingMode::GpuPreferred, runs);
    report("boxblur", &cpu, &gpu);

    println!("METRIC image_pixels={}", width as u64 * height as u64);
    println!("METRIC gpu_available={}", status.available);
    Ok(())
}
