//! Configuration management for admissions-intake
//!
//! Configuration is loaded from multiple sources with clear precedence:
//!
//! 1. Environment variables (highest priority, `INTAKE_` prefix, `__` for nesting)
//! 2. `./intake.toml` (development)
//! 3. `~/.config/admissions-intake/{service}/config.toml` (user config, XDG)
//! 4. `/etc/admissions-intake/{service}/config.toml` (system config)
//! 5. Hardcoded defaults (fallback)
//!
//! Environment variable format: `INTAKE_SECTION__FIELD_NAME`, for example
//! `INTAKE_COMPRESSION__TARGET_BYTES=8192`.
//!
//! # Example Configuration
//!
//! ```toml
//! # intake.toml
//! [upload]
//! max_bytes = 15728640
//! allowed_extensions = ["pdf", "jpg", "jpeg", "png", "doc", "docx"]
//! compressible_extensions = ["jpg", "jpeg", "png"]
//!
//! [compression]
//! enabled = true
//! target_bytes = 5120
//! start_quality = 95
//! quality_step = 5
//! min_quality = 10
//! strategy = "linear"
//!
//! [storage]
//! root = "./uploads"
//! owner_dir_prefix = "applicant_"
//!
//! [database]
//! url = "postgres://localhost/admissions"
//! max_connections = 5
//! ```
//!
//! # Usage
//!
//! ```rust
//! use admissions_intake::config::IntakeConfig;
//!
//! let config = IntakeConfig::default();
//! assert_eq!(config.upload.max_bytes, 15 * 1024 * 1024);
//! assert_eq!(config.compression.target_bytes, 5 * 1024);
//! ```

use crate::storage::processing::{
    DEFAULT_MIN_QUALITY, DEFAULT_QUALITY_STEP, DEFAULT_START_QUALITY, DEFAULT_TARGET_BYTES,
};
use crate::storage::validation::{DEFAULT_ALLOWED_EXTENSIONS, extension_of};
use crate::storage::{ExtensionValidator, ImageCompressor, QualitySearch, DEFAULT_OWNER_DIR_PREFIX};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Name of the per-project configuration file
pub const LOCAL_CONFIG_FILE: &str = "intake.toml";

/// Directory holding the per-service system config files
pub const SYSTEM_CONFIG_DIR: &str = "/etc/admissions-intake";

/// Prefix of configuration environment variables
pub const ENV_PREFIX: &str = "INTAKE_";

/// Upload acceptance rules
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadSettings {
    /// Largest accepted upload in bytes
    pub max_bytes: u64,

    /// Extensions accepted on declared filenames
    pub allowed_extensions: Vec<String>,

    /// Extensions whose uploads go through the image compressor
    pub compressible_extensions: Vec<String>,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            max_bytes: 15 * 1024 * 1024,
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|ext| (*ext).to_string())
                .collect(),
            compressible_extensions: vec!["jpg".to_string(), "jpeg".to_string(), "png".to_string()],
        }
    }
}

impl UploadSettings {
    /// Builds the extension validator for these settings
    #[must_use]
    pub fn validator(&self) -> ExtensionValidator {
        ExtensionValidator::new(&self.allowed_extensions)
    }

    /// Whether an upload named `filename` should be compressed
    #[must_use]
    pub fn is_compressible(&self, filename: &str) -> bool {
        extension_of(filename).is_some_and(|ext| {
            self.compressible_extensions
                .iter()
                .any(|candidate| candidate.eq_ignore_ascii_case(&ext))
        })
    }
}

/// Image compression settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionSettings {
    /// Compress images at all
    pub enabled: bool,

    /// Target ceiling in bytes
    pub target_bytes: u64,

    /// First quality tried
    pub start_quality: u8,

    /// Quality decrement per trial
    pub quality_step: u8,

    /// Lowest quality tried
    pub min_quality: u8,

    /// Search strategy over the quality grid
    pub strategy: QualitySearch,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            target_bytes: DEFAULT_TARGET_BYTES,
            start_quality: DEFAULT_START_QUALITY,
            quality_step: DEFAULT_QUALITY_STEP,
            min_quality: DEFAULT_MIN_QUALITY,
            strategy: QualitySearch::Linear,
        }
    }
}

impl CompressionSettings {
    /// Builds the compressor for these settings
    #[must_use]
    pub fn compressor(&self) -> ImageCompressor {
        ImageCompressor::new(self.target_bytes)
            .with_quality_range(self.start_quality, self.quality_step, self.min_quality)
            .with_search(self.strategy)
    }
}

/// Storage location settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Root directory holding all owner directories
    pub root: PathBuf,

    /// Prefix of owner directory names
    pub owner_dir_prefix: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./uploads"),
            owner_dir_prefix: DEFAULT_OWNER_DIR_PREFIX.to_string(),
        }
    }
}

/// Metadata database settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Connection URL; the CLI refuses to ingest without one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Pool size
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
        }
    }
}

/// Complete admissions-intake configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IntakeConfig {
    /// Upload acceptance rules
    #[serde(default)]
    pub upload: UploadSettings,

    /// Image compression settings
    #[serde(default)]
    pub compression: CompressionSettings,

    /// Storage location settings
    #[serde(default)]
    pub storage: StorageSettings,

    /// Metadata database settings
    #[serde(default)]
    pub database: DatabaseSettings,
}

impl IntakeConfig {
    /// Load configuration for a specific service
    ///
    /// Searches the locations listed in the module docs, later sources
    /// overriding earlier ones.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Default configuration cannot be serialized to TOML
    /// - A configuration file cannot be read or parsed
    /// - Values fail type conversion
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use admissions_intake::config::IntakeConfig;
    ///
    /// # fn example() -> anyhow::Result<()> {
    /// let config = IntakeConfig::load_for_service("admissions")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn load_for_service(service_name: &str) -> anyhow::Result<Self> {
        let mut figment = Self::defaults()?;

        let system_config = Self::system_path(service_name);
        if system_config.exists() {
            figment = figment.merge(Toml::file(&system_config));
        }

        let user_config = Self::recommended_path(service_name);
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }

        let local_config = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_config.exists() {
            figment = figment.merge(Toml::file(&local_config));
        }

        let config = figment.merge(Self::env()).extract()?;
        Ok(config)
    }

    /// Load configuration from a specific file, with environment overrides
    ///
    /// # Errors
    ///
    /// Returns an error if the file contains invalid TOML or values fail
    /// type conversion. A missing file falls back to defaults.
    pub fn load_from(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let config = Self::defaults()?
            .merge(Toml::file(path.into()))
            .merge(Self::env())
            .extract()?;
        Ok(config)
    }

    /// System-wide config path for a service
    #[must_use]
    pub fn system_path(service_name: &str) -> PathBuf {
        PathBuf::from(SYSTEM_CONFIG_DIR)
            .join(service_name)
            .join("config.toml")
    }

    /// Get the recommended XDG config path for a service
    ///
    /// ```rust
    /// use admissions_intake::config::IntakeConfig;
    ///
    /// let path = IntakeConfig::recommended_path("admissions");
    /// assert!(path.ends_with("config.toml"));
    /// ```
    #[must_use]
    pub fn recommended_path(service_name: &str) -> PathBuf {
        dirs::config_dir().map_or_else(
            || PathBuf::from(LOCAL_CONFIG_FILE),
            |config_dir| {
                config_dir
                    .join("admissions-intake")
                    .join(service_name)
                    .join("config.toml")
            },
        )
    }

    /// Serializes the configuration as TOML
    ///
    /// # Errors
    ///
    /// Returns an error if a value cannot be represented in TOML.
    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn defaults() -> anyhow::Result<Figment> {
        Ok(Figment::new().merge(Toml::string(&toml::to_string(&Self::default())?)))
    }

    fn env() -> Env {
        Env::prefixed(ENV_PREFIX).split("__").lowercase(true)
    }
}
