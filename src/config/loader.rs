// src/config/loader.rs
//! Layered configuration loading: defaults, TOML files, environment

use crate::config::{constants::paths, PipelineConfig};
use crate::error::{ScopeError, ScopeResult};
use config::{Config, Environment, File, FileFormat};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Configuration loader
///
/// Later sources override earlier ones: built-in defaults, then each
/// existing file in `config_paths`, then `SCOPE_*` environment variables
/// (e.g. `SCOPE_PRE_SAMPLES=250`).
pub struct ConfigLoader {
    config_paths: Vec<PathBuf>,
    env_prefix: String,
}

impl ConfigLoader {
    /// Create new configuration loader
    pub fn new() -> Self {
        Self {
            config_paths: Self::discover_config_paths(),
            env_prefix: paths::ENV_PREFIX.to_string(),
        }
    }

    /// Create loader with custom paths
    pub fn with_paths(paths: Vec<PathBuf>) -> Self {
        Self {
            config_paths: paths,
            env_prefix: paths::ENV_PREFIX.to_string(),
        }
    }

    /// Use a different environment variable prefix
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = prefix.to_string();
        self
    }

    /// Load and validate the pipeline configuration
    pub fn load(&self) -> ScopeResult<PipelineConfig> {
        let mut builder = Config::builder().add_source(Config::try_from(&PipelineConfig::default())?);

        for path in &self.config_paths {
            if path.exists() {
                debug!(path = %path.display(), "merging configuration file");
                builder = builder.add_source(File::from(path.as_path()).format(FileFormat::Toml).required(true));
            }
        }

        builder = builder.add_source(Environment::with_prefix(&self.env_prefix).try_parsing(true));

        let config: PipelineConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        info!(
            threshold = config.threshold,
            pre_samples = config.pre_samples,
            post_samples = config.post_samples,
            outstanding_slots = config.outstanding_slots,
            "pipeline configuration loaded"
        );
        Ok(config)
    }

    /// Validate a single configuration file without environment overrides
    pub fn validate_config_file<P: AsRef<Path>>(&self, path: P) -> ScopeResult<()> {
        let config: PipelineConfig = Config::builder()
            .add_source(Config::try_from(&PipelineConfig::default())?)
            .add_source(File::from(path.as_ref()).format(FileFormat::Toml).required(true))
            .build()?
            .try_deserialize()?;
        config.validate()
    }

    /// Export a configuration to a TOML file
    pub fn export_config<P: AsRef<Path>>(config: &PipelineConfig, path: P) -> ScopeResult<()> {
        let content = config.to_toml_string()?;
        std::fs::write(path.as_ref(), content)
            .map_err(|e| ScopeError::configuration("export", e.to_string()))
    }

    /// Files consulted by [`ConfigLoader::new`]
    pub fn config_paths(&self) -> &[PathBuf] {
        &self.config_paths
    }

    fn discover_config_paths() -> Vec<PathBuf> {
        vec![
            PathBuf::from(paths::SYSTEM_CONFIG_PATH),
            PathBuf::from(paths::DEFAULT_CONFIG_FILE),
            PathBuf::from(paths::LOCAL_CONFIG_FILE),
        ]
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
