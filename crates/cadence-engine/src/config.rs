//! Host configuration.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use cadence_kernel::RegistryConfig;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Default config file name.
pub const CONFIG_FILE: &str = "cadence.toml";

/// Everything the host needs to bring the sound runtime up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    // === Output ===
    /// Frames per second of the host loop.
    pub target_fps: u32,
    /// Channels the backend plays at once.
    pub max_channels: usize,
    /// Start with every channel muted.
    pub muted: bool,
    /// Rebuild the output stream after long silences, for devices that drop
    /// idle streams.
    pub recover_stale_output: bool,

    // === Assets ===
    /// Directory source paths are resolved against.
    pub asset_root: PathBuf,
    /// Worker threads reading sound files.
    pub loader_threads: usize,
    /// Manifests registered at startup, in order.
    pub manifests: Vec<PathBuf>,

    // === Registry ===
    /// Settings handed to the registry.
    pub registry: RegistryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            target_fps: 60,
            max_channels: 32,
            muted: false,
            recover_stale_output: false,

            asset_root: PathBuf::from("assets"),
            loader_threads: 2,
            manifests: Vec::new(),

            registry: RegistryConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a specific path.
    /// Returns the default config if the file is missing or invalid.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            info!("Config file {} not found, using defaults", path.display());
            return Self::default();
        }

        match fs::File::open(path) {
            Ok(mut file) => {
                let mut contents = String::new();
                if let Err(e) = file.read_to_string(&mut contents) {
                    warn!("Failed to read config file: {e}");
                    return Self::default();
                }

                match toml::from_str::<Self>(&contents) {
                    Ok(mut config) => {
                        config.validate();
                        info!("Loaded config from {}", path.display());
                        config
                    },
                    Err(e) => {
                        warn!("Failed to parse config file: {e}");
                        Self::default()
                    },
                }
            },
            Err(e) => {
                warn!("Failed to open config file: {e}");
                Self::default()
            },
        }
    }

    /// Save configuration to a specific path.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents =
            toml::to_string_pretty(self).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let mut file = fs::File::create(path)?;
        file.write_all(contents.as_bytes())?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Clamp values to sensible ranges.
    pub fn validate(&mut self) {
        self.target_fps = self.target_fps.clamp(10, 240);
        self.max_channels = self.max_channels.clamp(1, 256);
        self.loader_threads = self.loader_threads.clamp(1, 16);
        self.registry.pool_capacity = self.registry.pool_capacity.min(4096);
        if self.registry.preferred_types.is_empty() {
            warn!("No preferred file types configured, restoring defaults");
            self.registry.preferred_types = RegistryConfig::default().preferred_types;
        }
    }

    /// Resolve manifest paths that are relative to the config file's folder.
    #[must_use]
    pub fn manifests_relative_to(&self, base: &Path) -> Vec<PathBuf> {
        self.manifests
            .iter()
            .map(|m| if m.is_absolute() { m.clone() } else { base.join(m) })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.target_fps, 60);
        assert_eq!(config.max_channels, 32);
        assert!(!config.muted);
        assert!(!config.recover_stale_output);
        assert_eq!(config.registry.preferred_types, vec!["ogg", "mp3"]);
    }

    #[test]
    fn test_config_validation() {
        let mut config = EngineConfig::default();
        config.target_fps = 1000;
        config.max_channels = 0;
        config.loader_threads = 0;
        config.registry.preferred_types.clear();

        config.validate();

        assert_eq!(config.target_fps, 240);
        assert_eq!(config.max_channels, 1);
        assert_eq!(config.loader_threads, 1);
        assert_eq!(config.registry.preferred_types.len(), 2);
    }

    #[test]
    fn test_config_save_load() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("nested").join("cadence.toml");

        let mut config = EngineConfig::default();
        config.max_channels = 8;
        config.muted = true;
        config.recover_stale_output = true;
        config.manifests.push(PathBuf::from("sounds.toml"));
        config.registry.stale_context_threshold_ms = 5_000;

        config.save_to(&config_path).expect("Failed to save config");

        let loaded = EngineConfig::load_from(&config_path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_load_missing_file() {
        let config = EngineConfig::load_from("/nonexistent/path/cadence.toml");
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_config_load_invalid_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("cadence.toml");
        fs::write(&config_path, "target_fps = \"fast\"").expect("write");

        assert_eq!(EngineConfig::load_from(&config_path), EngineConfig::default());
    }

    #[test]
    fn test_partial_config_is_clamped() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("cadence.toml");
        fs::write(&config_path, "target_fps = 5\n\n[registry]\npreferred_types = [\"wav\"]\n")
            .expect("write");

        let config = EngineConfig::load_from(&config_path);
        assert_eq!(config.target_fps, 10);
        assert_eq!(config.registry.preferred_types, vec!["wav"]);
        assert_eq!(config.max_channels, 32);
    }

    #[test]
    fn test_manifest_paths_resolve_against_base() {
        let mut config = EngineConfig::default();
        config.manifests = vec![PathBuf::from("a.toml"), PathBuf::from("/abs/b.json")];

        let resolved = config.manifests_relative_to(Path::new("/etc/cadence"));
        assert_eq!(resolved[0], PathBuf::from("/etc/cadence/a.toml"));
        assert_eq!(resolved[1], PathBuf::from("/abs/b.json"));
    }
}
