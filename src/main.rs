mod prompt;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clap::error::ErrorKind;

use imageflow::config::{AppConfig, parse_processing_mode};
use imageflow::image::DEFAULT_JPEG_QUALITY;
use imageflow::processing::gpu;
use imageflow::{FilterPipeline, FilterRegistry, Image, ProcessingMode, files};

#[derive(Parser, Debug)]
#[command(name = "imageflow", version, disable_help_subcommand = true)]
struct Cli {
    /// Processing mode: cpu, gpu or auto.
    #[arg(long, global = true)]
    mode: Option<String>,

    /// Worker threads for the CPU path (0 = one per core).
    #[arg(short = 'j', long, global = true)]
    threads: Option<usize>,

    /// Store the resolved mode and thread count in the config file.
    #[arg(long, global = true)]
    save_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List images in the current directory.
    List,
    /// Build a pipeline interactively and apply it to one image.
    Process { file: PathBuf },
    /// Apply one pipeline to every image in the current directory.
    Batch,
    /// Show usage and the available filters.
    Help,
}

struct Settings {
    mode: ProcessingMode,
    jpeg_quality: u8,
}

fn usage(registry: &FilterRegistry) -> String {
    let mut text = String::from(
        "USAGE:\n  imageflow [--mode cpu|gpu|auto] [-j N] [--save-config] <command>\n\n\
         COMMANDS:\n  \
         list             List images in the current directory\n  \
         process <image>  Process a single image\n  \
         batch            Process every image in the current directory\n  \
         help             Show this help\n\n\
         FILTERS:\n",
    );
    for info in registry.iter() {
        let gpu_tag = if info.has_gpu_version() { " [GPU]" } else { "" };
        text.push_str(&format!(
            "  {:<12} {}{}\n",
            info.id, info.description, gpu_tag
        ));
    }
    text.push_str("\nEXAMPLES:\n  imageflow list\n  imageflow process photo.jpg\n  imageflow batch\n");
    text
}

fn resolve_mode(flag: Option<&str>, config: &AppConfig) -> ProcessingMode {
    match flag {
        Some(raw) => parse_processing_mode(raw),
        None => config.resolve_processing_mode(),
    }
}

fn configure_threads(threads: Option<usize>) {
    let Some(n) = threads.filter(|&n| n > 0) else {
        return;
    };
    if let Err(err) = rayon::ThreadPoolBuilder::new()
        .num_threads(n)
        .build_global()
    {
        tracing::warn!(error = %err, "could not size the rayon pool");
    }
}

fn report_processing_mode(mode: ProcessingMode) {
    let status = gpu::runtime_status();
    let adapter_desc = match (
        status.adapter_name.as_deref(),
        status.adapter_backend.as_deref(),
    ) {
        (Some(name), Some(api)) => format!("{} ({})", name, api),
        (Some(name), None) => name.to_string(),
        _ => "n/a".to_string(),
    };
    match mode {
        ProcessingMode::CpuOnly => eprintln!("imageflow: processing mode = cpu"),
        _ if status.available => {
            eprintln!("imageflow: processing mode = {} (gpu: {})", mode, adapter_desc)
        }
        _ if status.disabled_by_env => eprintln!(
            "imageflow: processing mode = {} (gpu disabled by {})",
            mode,
            gpu::DISABLE_GPU_ENV
        ),
        _ => eprintln!(
            "imageflow: processing mode = {} (gpu unavailable; cpu fallback)",
            mode
        ),
    }
}

fn cmd_list(dir: &Path) -> Result<()> {
    let images = files::list_images(dir)
        .with_context(|| format!("read_dir failed for {}", dir.display()))?;
    if images.is_empty() {
        println!("No images found in the current directory.");
        return Ok(());
    }
    println!("Available images ({}):", images.len());
    println!("{}", "-".repeat(60));
    for (i, path) in images.iter().enumerate() {
        println!("{:>3}. {}", i + 1, display_name(path));
    }
    println!("{}", "-".repeat(60));
    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn interactive_pipeline(registry: &FilterRegistry, mode: ProcessingMode) -> Result<FilterPipeline> {
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut out = io::stdout();
    let pipeline = prompt::build_pipeline(&mut input, &mut out, registry, mode)
        .context("reading filter choices")?;
    out.flush()?;
    Ok(pipeline)
}

fn load(path: &Path) -> Result<Image> {
    Image::load(path).with_context(|| format!("load failed for {}", path.display()))
}

fn apply_and_save(
    image: Image,
    output_path: &Path,
    pipeline: &mut FilterPipeline,
    settings: &Settings,
) -> Result<()> {
    let start = Instant::now();
    let processed = pipeline.apply(image);
    println!(
        "  processed in {:.1} ms",
        start.elapsed().as_secs_f64() * 1000.0
    );
    processed
        .save_with_quality(output_path, settings.jpeg_quality)
        .with_context(|| format!("save failed for {}", output_path.display()))?;
    println!("  saved {}", output_path.display());
    Ok(())
}

fn cmd_process(file: &Path, registry: &FilterRegistry, settings: &Settings) -> Result<ExitCode> {
    if !file.is_file() {
        eprintln!("imageflow: file not found: {}", file.display());
        return Ok(ExitCode::from(1));
    }
    let image = load(file)?;
    println!("Loaded {}", file.display());
    println!("  Dimensions: {}x{}", image.width(), image.height());
    println!("  Channels: {}", image.channels());

    let mut pipeline = interactive_pipeline(registry, settings.mode)?;
    if pipeline.is_empty() {
        println!("No filter selected. Aborting.");
        return Ok(ExitCode::SUCCESS);
    }
    println!("Applying {} filter(s)...", pipeline.len());
    let output = files::output_path(file, "processed");
    apply_and_save(image, &output, &mut pipeline, settings)?;
    Ok(ExitCode::SUCCESS)
}

fn cmd_batch(dir: &Path, registry: &FilterRegistry, settings: &Settings) -> Result<ExitCode> {
    let images = files::list_images(dir)
        .with_context(|| format!("read_dir failed for {}", dir.display()))?;
    if images.is_empty() {
        println!("No images found.");
        return Ok(ExitCode::SUCCESS);
    }
    cmd_list(dir)?;

    println!("\nBuild the pipeline for batch processing:");
    let mut pipeline = interactive_pipeline(registry, settings.mode)?;
    if pipeline.is_empty() {
        println!("No filter selected. Aborting.");
        return Ok(ExitCode::SUCCESS);
    }
    println!("\nPipeline: {}", pipeline.describe());
    println!("Processing {} image(s)...", images.len());
    println!("{}", "=".repeat(60));

    let (mut succeeded, mut failed) = (0usize, 0usize);
    for path in &images {
        println!("{}", display_name(path));
        let output = files::output_path(path, "batch");
        let result =
            load(path).and_then(|image| apply_and_save(image, &output, &mut pipeline, settings));
        match result {
            Ok(()) => succeeded += 1,
            Err(err) => {
                eprintln!("  failed: {:#}", err);
                failed += 1;
            }
        }
        println!("{}", "-".repeat(60));
    }

    println!("{}", "=".repeat(60));
    println!("SUMMARY:");
    println!("  Succeeded: {}", succeeded);
    if failed > 0 {
        println!("  Failed: {}", failed);
    }
    Ok(ExitCode::SUCCESS)
}

fn save_settings(config: &mut AppConfig, mode: ProcessingMode, threads: Option<usize>) {
    config.remember(mode, threads);
    match config.save() {
        Ok(path) => eprintln!("imageflow: settings saved to {}", path.display()),
        Err(err) => eprintln!("imageflow: could not save settings: {}", err),
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = AppConfig::load();
    let registry = FilterRegistry::with_builtin_filters();
    let settings = Settings {
        mode: resolve_mode(cli.mode.as_deref(), &config),
        jpeg_quality: config.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
    };
    if cli.save_config {
        save_settings(&mut config, settings.mode, cli.threads);
    }

    let Some(command) = cli.command else {
        if !cli.save_config {
            print!("{}", usage(&registry));
        }
        return Ok(ExitCode::SUCCESS);
    };

    configure_threads(cli.threads.or(config.threads));
    let cwd = std::env::current_dir().context("current directory unavailable")?;

    match command {
        Command::Help => {
            print!("{}", usage(&registry));
            Ok(ExitCode::SUCCESS)
        }
        Command::List => {
            cmd_list(&cwd)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Process { file } => {
            report_processing_mode(settings.mode);
            cmd_process(&file, &registry, &settings)
        }
        Command::Batch => {
            report_processing_mode(settings.mode);
            cmd_batch(&cwd, &registry, &settings)
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(1),
            };
            let _ = err.print();
            return code;
        }
    };

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("imageflow: {:#}", err);
            ExitCode::from(1)
        }
    }
}
