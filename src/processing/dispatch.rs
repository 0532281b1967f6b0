use std::time::Instant;

use tracing::warn;

use super::gpu::GpuError;
use super::{Backend, RunStats};
use crate::image::Image;

/// Runs `gpu` when `use_gpu` is set, re-running `cpu` if the device path fails.
///
/// The device path must leave `output` untouched on error. Elapsed time covers
/// the device attempt plus any fallback.
pub fn run_with_fallback<G, C>(
    filter: &str,
    use_gpu: bool,
    output: &mut Image,
    gpu: G,
    cpu: C,
) -> RunStats
where
    G: FnOnce(&mut Image) -> Result<(), GpuError>,
    C: FnOnce(&mut Image),
{
    let start = Instant::now();
    let backend = if use_gpu {
        match gpu(output) {
            Ok(()) => Backend::Gpu,
            Err(err) => {
                warn!(filter = filter, error = %err, "gpu execution failed; falling back to cpu");
                cpu(output);
                Backend::Cpu
            }
        }
    } else {
        cpu(output);
        Backend::Cpu
    };
    RunStats {
        backend,
        elapsed: start.elapsed(),
    }
}

/// Times a filter that only has a CPU path.
pub fn run_cpu<C>(output: &mut Image, cpu: C) -> RunStats
where
    C: FnOnce(&mut Image),
{
    let start = Instant::now();
    cpu(output);
    RunStats {
        backend: Backend::Cpu,
        elapsed: start.elapsed(),
    }
}
