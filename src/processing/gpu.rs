//! wgpu compute path for the accelerator-capable filters.
//!
//! Images travel to the device as flat byte buffers (packed four bytes per
//! `u32` word) and come back as one `u32` per output element, so every
//! invocation owns its output words and no two invocations write the same
//! word. One invocation computes one output pixel.

use std::sync::{
    Mutex, OnceLock,
    atomic::{AtomicBool, Ordering},
    mpsc,
};

use bytemuck::{Pod, Zeroable};
use thiserror::Error;
use tracing::{info, warn};

use crate::image::Image;

pub const DISABLE_GPU_ENV: &str = "IMAGEFLOW_DISABLE_GPU";
const WORKGROUP_SIZE: u32 = 16;

#[derive(Error, Debug)]
pub enum GpuError {
    #[error("no compatible gpu adapter")]
    Unavailable,
    #[error("image needs {bytes} bytes of device memory, limit is {limit}")]
    TooLarge { bytes: u64, limit: u64 },
    #[error("device error: {0}")]
    Device(String),
    #[error("readback failed: {0}")]
    Readback(String),
}

struct PipelineBundle {
    pipeline: wgpu::ComputePipeline,
    bgl: wgpu::BindGroupLayout,
}

struct GpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    // Error scopes live on the device, not the calling thread: one kernel at a time.
    submit_lock: Mutex<()>,
    grayscale: PipelineBundle,
    box_blur: PipelineBundle,
    adapter_name: String,
    adapter_backend: String,
    adapter_driver: String,
}

static GPU_CONTEXT: OnceLock<Option<GpuContext>> = OnceLock::new();
static GPU_UNAVAILABLE_REPORTED: AtomicBool = AtomicBool::new(false);

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct KernelParams {
    width: u32,
    height: u32,
    channels: u32,
    radius: u32,
}

#[derive(Clone, Debug, Default)]
/// Snapshot of accelerator availability and adapter details.
pub struct RuntimeStatus {
    pub available: bool,
    pub disabled_by_env: bool,
    pub adapter_name: Option<String>,
    pub adapter_backend: Option<String>,
    pub adapter_driver: Option<String>,
}

/// Returns whether the accelerator path can run on this machine.
pub fn is_available() -> bool {
    gpu_context().is_some()
}

/// Returns adapter details for diagnostics.
pub fn runtime_status() -> RuntimeStatus {
    let disabled_by_env = gpu_disabled();
    match gpu_context() {
        Some(ctx) => RuntimeStatus {
            available: true,
            disabled_by_env,
            adapter_name: Some(ctx.adapter_name.clone()),
            adapter_backend: Some(ctx.adapter_backend.clone()),
            adapter_driver: Some(ctx.adapter_driver.clone()),
        },
        None => RuntimeStatus {
            disabled_by_env,
            ..RuntimeStatus::default()
        },
    }
}

/// True when `IMAGEFLOW_DISABLE_GPU` is set to a truthy value.
pub fn gpu_disabled() -> bool {
    std::env::var(DISABLE_GPU_ENV)
        .ok()
        .map(|raw| env_truthy(&raw))
        .unwrap_or(false)
}

fn env_truthy(raw: &str) -> bool {
    let norm = raw.trim().to_ascii_lowercase();
    norm == "1" || norm == "true" || norm == "yes" || norm == "on"
}

/// Luminance of the first three channels into a single-channel image.
/// Requires at least three input channels.
pub(crate) fn grayscale(input: &Image, output: &mut Image) -> Result<(), GpuError> {
    let ctx = gpu_context().ok_or(GpuError::Unavailable)?;
    if input.channels() < 3 {
        return Err(GpuError::Device(format!(
            "grayscale kernel needs 3+ channels, got {}",
            input.channels()
        )));
    }
    let data = run_kernel(ctx, &ctx.grayscale, "gpu_grayscale", input, 1, 0)?;
    output.reshape(input.width(), input.height(), 1);
    output.as_raw_mut().copy_from_slice(&data);
    Ok(())
}

/// Clipped-window mean over a `(2r+1)^2` neighbourhood, per channel.
pub(crate) fn box_blur(input: &Image, radius: u32, output: &mut Image) -> Result<(), GpuError> {
    let ctx = gpu_context().ok_or(GpuError::Unavailable)?;
    let channels = input.channels();
    let data = run_kernel(ctx, &ctx.box_blur, "gpu_box_blur", input, channels, radius)?;
    output.reshape(input.width(), input.height(), channels);
    output.as_raw_mut().copy_from_slice(&data);
    Ok(())
}

fn run_kernel(
    ctx: &GpuContext,
    bundle: &PipelineBundle,
    label: &str,
    input: &Image,
    out_channels: u32,
    radius: u32,
) -> Result<Vec<u8>, GpuError> {
    let width = input.width();
    let height = input.height();
    let out_len = width as u64 * height as u64 * out_channels as u64;
    let out_bytes = out_len * 4;

    let mut packed = input.as_raw().to_vec();
    packed.resize(packed.len().next_multiple_of(4), 0);
    let in_bytes = packed.len() as u64;

    let limits = ctx.device.limits();
    let limit = (limits.max_storage_buffer_binding_size as u64).min(limits.max_buffer_size);
    let largest = out_bytes.max(in_bytes);
    if largest > limit {
        return Err(GpuError::TooLarge {
            bytes: largest,
            limit,
        });
    }
    let groups_x = width.div_ceil(WORKGROUP_SIZE);
    let groups_y = height.div_ceil(WORKGROUP_SIZE);
    let max_groups = limits.max_compute_workgroups_per_dimension;
    if groups_x > max_groups || groups_y > max_groups {
        return Err(GpuError::TooLarge {
            bytes: largest,
            limit,
        });
    }

    let _guard = ctx
        .submit_lock
        .lock()
        .map_err(|_| GpuError::Device("gpu submit lock poisoned".to_string()))?;
    ctx.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    ctx.device.push_error_scope(wgpu::ErrorFilter::Validation);

    let src_buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: in_bytes,
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    ctx.queue.write_buffer(&src_buffer, 0, &packed);

    let dst_buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: out_bytes,
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        mapped_at_creation: false,
    });

    let params = KernelParams {
        width,
        height,
        channels: input.channels(),
        radius,
    };
    let params_buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: std::mem::size_of::<KernelParams>() as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    ctx.queue
        .write_buffer(&params_buffer, 0, bytemuck::bytes_of(&params));

    let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout: &bundle.bgl,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: src_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: dst_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: params_buffer.as_entire_binding(),
            },
        ],
    });

    let readback = ctx.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: out_bytes,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });
    {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(label),
            timestamp_writes: None,
        });
        pass.set_pipeline(&bundle.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(groups_x, groups_y, 1);
    }
    encoder.copy_buffer_to_buffer(&dst_buffer, 0, &readback, 0, out_bytes);
    ctx.queue.submit([encoder.finish()]);

    let validation = pollster::block_on(ctx.device.pop_error_scope());
    let out_of_memory = pollster::block_on(ctx.device.pop_error_scope());
    if let Some(err) = validation.or(out_of_memory) {
        return Err(GpuError::Device(err.to_string()));
    }

    let slice = readback.slice(..);
    let (tx, rx) = mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    let _ = ctx.device.poll(wgpu::Maintain::wait());
    let map_result = rx
        .recv()
        .map_err(|_| GpuError::Readback("map callback dropped".to_string()))?;
    map_result.map_err(|err| GpuError::Readback(err.to_string()))?;

    let mapped = slice.get_mapped_range();
    let out: Vec<u8> = mapped
        .chunks_exact(4)
        .map(|word| u32::from_le_bytes([word[0], word[1], word[2], word[3]]).min(255) as u8)
        .collect();
    drop(mapped);
    readback.unmap();

    if out.len() as u64 != out_len {
        return Err(GpuError::Readback(format!(
            "expected {} elements, got {}",
            out_len,
            out.len()
        )));
    }
    Ok(out)
}

fn gpu_context() -> Option<&'static GpuContext> {
    if gpu_disabled() {
        return None;
    }
    let ctx = GPU_CONTEXT.get_or_init(init_gpu_context).as_ref();
    if ctx.is_none() && !GPU_UNAVAILABLE_REPORTED.swap(true, Ordering::Relaxed) {
        warn!("no usable gpu adapter; accelerator filters will run on the cpu");
    }
    ctx
}

fn create_pipeline_bundle(device: &wgpu::Device, label: &str, shader_src: &str) -> PipelineBundle {
    let bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &kernel_entries(),
    });
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(shader_src.into()),
    });
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[&bgl],
        push_constant_ranges: &[],
    });
    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(&layout),
        module: &shader,
        entry_point: Some("main"),
        cache: None,
        compilation_options: wgpu::PipelineCompilationOptions::default(),
    });
    PipelineBundle { pipeline, bgl }
}

/// Read-only input buffer, read-write output buffer, uniform params.
fn kernel_entries() -> [wgpu::BindGroupLayoutEntry; 3] {
    [
        wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: true },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        },
        wgpu::BindGroupLayoutEntry {
            binding: 1,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: false },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        },
        wgpu::BindGroupLayoutEntry {
            binding: 2,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        },
    ]
}

fn init_gpu_context() -> Option<GpuContext> {
    let instance = wgpu::Instance::default();
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        force_fallback_adapter: false,
        compatible_surface: None,
    }))?;
    let adapter_info = adapter.get_info();
    let adapter_name = adapter_info.name;
    let adapter_backend = adapter_info.backend.to_string();
    let adapter_driver = if adapter_info.driver.trim().is_empty() {
        "unknown".to_string()
    } else {
        adapter_info.driver
    };
    let (device, queue) = pollster::block_on(adapter.request_device(
        &wgpu::DeviceDescriptor {
            label: Some("imageflow_device"),
            required_features: wgpu::Features::empty(),
            required_limits: adapter.limits(),
            memory_hints: wgpu::MemoryHints::Performance,
        },
        None,
    ))
    .ok()?;

    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let grayscale = create_pipeline_bundle(&device, "gpu_grayscale", GRAYSCALE_SHADER_SRC);
    let box_blur = create_pipeline_bundle(&device, "gpu_box_blur", BOX_BLUR_SHADER_SRC);
    if let Some(err) = pollster::block_on(device.pop_error_scope()) {
        warn!(error = %err, "gpu kernels failed to build");
        return None;
    }

    info!(
        adapter = %adapter_name,
        backend = %adapter_backend,
        driver = %adapter_driver,
        "gpu context ready"
    );
    Some(GpuContext {
        device,
        queue,
        submit_lock: Mutex::new(()),
        grayscale,
        box_blur,
        adapter_name,
        adapter_backend,
        adapter_driver,
    })
}

/// Prepends the shared bindings and byte loader to a kernel body.
macro_rules! kernel_source {
    ($body:literal) => {
        concat!(
            r#"
struct Params {
    width: u32,
    height: u32,
    channels: u32,
    radius: u32,
};

@group(0) @binding(0)
var<storage, read> src: array<u32>;
@group(0) @binding(1)
var<storage, read_write> dst: array<u32>;
@group(0) @binding(2)
var<uniform> params: Params;

fn load_byte(i: u32) -> u32 {
    return (src[i >> 2u] >> ((i & 3u) * 8u)) & 0xffu;
}
"#,
            $body
        )
    };
}

const GRAYSCALE_SHADER_SRC: &str = kernel_source!(
    r#"
@compute @workgroup_size(16, 16, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (gid.x >= params.width || gid.y >= params.height) {
        return;
    }
    let pixel = gid.y * params.width + gid.x;
    let base = pixel * params.channels;
    let r = f32(load_byte(base));
    let g = f32(load_byte(base + 1u));
    let b = f32(load_byte(base + 2u));
    let gray = 0.299 * r + 0.587 * g + 0.114 * b;
    dst[pixel] = min(u32(gray), 255u);
}
"#
);

const BOX_BLUR_SHADER_SRC: &str = kernel_source!(
    r#"
@compute @workgroup_size(16, 16, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (gid.x >= params.width || gid.y >= params.height) {
        return;
    }
    let w = i32(params.width);
    let h = i32(params.height);
    let r = i32(params.radius);
    let x = i32(gid.x);
    let y = i32(gid.y);
    let y0 = max(y - r, 0);
    let y1 = min(y + r, h - 1);
    let x0 = max(x - r, 0);
    let x1 = min(x + r, w - 1);
    let count = u32((y1 - y0 + 1) * (x1 - x0 + 1));
    let pixel = gid.y * params.width + gid.x;

    for (var c = 0u; c < params.channels; c = c + 1u) {
        var sum = 0u;
        for (var ny = y0; ny <= y1; ny = ny + 1) {
            let row = u32(ny) * params.width;
            for (var nx = x0; nx <= x1; nx = nx + 1) {
                sum = sum + load_byte((row + u32(nx)) * params.channels + c);
            }
        }
        dst[pixel * params.channels + c] = sum / count;
    }
}
"#
);
