use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::processing::ProcessingMode;

pub const PROCESSING_MODE_ENV: &str = "IMAGEFLOW_PROCESSING_MODE";

#[derive(Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Persisted settings for the imageflow tools.
pub struct AppConfig {
    pub processing_mode: Option<String>,
    /// Worker threads for the CPU path; 0 or absent means one per core.
    pub threads: Option<usize>,
    pub jpeg_quality: Option<u8>,
}

impl AppConfig {
    /// Returns the user config file path, if a config directory is available.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("imageflow").join("config.toml"))
    }

    /// Loads the user config, falling back to defaults on any error.
    pub fn load() -> Self {
        Self::config_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    pub fn load_from(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .map(|contents| Self::from_toml(&contents))
            .unwrap_or_default()
    }

    pub fn from_toml(contents: &str) -> Self {
        toml::from_str(contents).unwrap_or_default()
    }

    /// Writes the user config, creating its directory. Returns the path written.
    pub fn save(&self) -> io::Result<PathBuf> {
        let path = Self::config_path()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no config directory"))?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self).map_err(io::Error::other)?;
        std::fs::write(path, contents)
    }

    /// Records the settings a run resolved, so later runs start from them.
    pub fn remember(&mut self, mode: ProcessingMode, threads: Option<usize>) {
        self.processing_mode = Some(mode.label().to_string());
        if threads.is_some() {
            self.threads = threads;
        }
    }

    /// Mode from the environment, then the file, then [`ProcessingMode::Auto`].
    pub fn resolve_processing_mode(&self) -> ProcessingMode {
        let env = std::env::var(PROCESSING_MODE_ENV).ok();
        self.resolve_processing_mode_from(env.as_deref())
    }

    fn resolve_processing_mode_from(&self, env: Option<&str>) -> ProcessingMode {
        resolve_mode(env, self.processing_mode.as_deref())
    }
}

pub fn parse_processing_mode(value: &str) -> ProcessingMode {
    match value.trim().to_ascii_lowercase().as_str() {
        "cpu" | "cpu_only" => ProcessingMode::CpuOnly,
        "gpu" | "gpu_preferred" | "wgpu" => ProcessingMode::GpuPreferred,
        _ => ProcessingMode::Auto,
    }
}

fn resolve_mode(env: Option<&str>, file: Option<&str>) -> ProcessingMode {
    env.or(file)
        .map(parse_processing_mode)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::{AppConfig, parse_processing_mode, resolve_mode};
    use crate::processing::ProcessingMode;

    #[test]
    fn parse_processing_mode_handles_supported_values() {
        assert_eq!(parse_processing_mode("cpu"), ProcessingMode::CpuOnly);
        assert_eq!(parse_processing_mode(" GPU "), ProcessingMode::GpuPreferred);
        assert_eq!(parse_processing_mode("auto"), ProcessingMode::Auto);
        assert_eq!(
            parse_processing_mode("gpu_preferred"),
            ProcessingMode::GpuPreferred
        );
    }

    #[test]
    fn parse_processing_mode_defaults_to_auto_for_unknown_values() {
        assert_eq!(parse_processing_mode("quantum"), ProcessingMode::Auto);
    }

    #[test]
    fn environment_overrides_file() {
        assert_eq!(resolve_mode(Some("cpu"), Some("gpu")), ProcessingMode::CpuOnly);
        assert_eq!(resolve_mode(None, Some("gpu")), ProcessingMode::GpuPreferred);
        assert_eq!(resolve_mode(None, None), ProcessingMode::Auto);
    }

    #[test]
    fn remembered_settings_survive_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = AppConfig {
            jpeg_quality: Some(80),
            ..Default::default()
        };
        config.remember(ProcessingMode::CpuOnly, Some(3));
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path);
        assert_eq!(loaded, config);
        assert_eq!(loaded.resolve_processing_mode_from(None), ProcessingMode::CpuOnly);
        assert_eq!(loaded.threads, Some(3));
    }

    #[test]
    fn remember_keeps_threads_when_not_given() {
        let mut config = AppConfig {
            threads: Some(6),
            ..Default::default()
        };
        config.remember(ProcessingMode::GpuPreferred, None);
        assert_eq!(config.threads, Some(6));
        assert_eq!(config.processing_mode.as_deref(), Some("gpu"));
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(AppConfig::load_from(&dir.path().join("absent.toml")), AppConfig::default());
    }

    #[test]
    fn parses_toml_and_ignores_garbage() {
        let config = AppConfig::from_toml("processing_mode = \"cpu\"\nthreads = 4\n");
        assert_eq!(config.processing_mode.as_deref(), Some("cpu"));
        assert_eq!(config.threads, Some(4));
        assert_eq!(config.jpeg_quality, None);

        let config = AppConfig::from_toml("threads = [not valid");
        assert!(config.threads.is_none());
    }
}
