//! Configuration loading and root folder resolution

use crate::{Error, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "MIXDB_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "mixdb.db";

/// Contents of `config.toml`
///
/// Every key is optional. Missing keys fall back to compiled defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    pub log_level: Option<String>,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
}

/// Tolerances and rounding used by ratio reconciliation
///
/// Comparison rounding and storage rounding are separate settings: stored
/// and displayed ratios keep three places while mismatch checks compare at
/// two.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Decimal places both sides are rounded to before a mismatch comparison
    pub comparison_rounding_places: u32,
    /// Decimal places used for stored and displayed ratios
    pub storage_rounding_places: u32,
    /// Audit flags a mismatch when |calculated - stored| exceeds this
    pub mismatch_tolerance: Decimal,
    /// Correction overwrites stored w/b when the difference exceeds this
    pub correction_tolerance: Decimal,
    /// Lowest plausible calculated w/c
    pub wc_plausible_min: Decimal,
    /// Highest plausible calculated w/c
    pub wc_plausible_max: Decimal,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            comparison_rounding_places: 2,
            storage_rounding_places: 3,
            mismatch_tolerance: Decimal::new(2, 2),
            correction_tolerance: Decimal::new(1, 3),
            wc_plausible_min: Decimal::new(2, 1),
            wc_plausible_max: Decimal::new(12, 1),
        }
    }
}

impl ReconcileConfig {
    /// Reject settings that would make every comparison meaningless
    pub fn validate(&self) -> Result<()> {
        if self.mismatch_tolerance.is_sign_negative() || self.correction_tolerance.is_sign_negative() {
            return Err(Error::Config("Tolerances must not be negative".to_string()));
        }
        if self.wc_plausible_min >= self.wc_plausible_max {
            return Err(Error::Config(format!(
                "wc_plausible_min ({}) must be below wc_plausible_max ({})",
                self.wc_plausible_min, self.wc_plausible_max
            )));
        }
        if self.comparison_rounding_places > 10 || self.storage_rounding_places > 10 {
            return Err(Error::Config("Rounding places must be 10 or fewer".to_string()));
        }
        Ok(())
    }
}

impl TomlConfig {
    /// Parse a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Parse config text and validate the reconcile section
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.reconcile.validate()?;
        Ok(config)
    }

    /// Load an explicit config file, or the platform default if present
    ///
    /// An explicit path that does not exist is an error. A missing default
    /// file is not: the compiled defaults are used and a warning is logged.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        match default_config_path() {
            Some(path) if path.exists() => {
                debug!("Loading config from {}", path.display());
                Self::load(&path)
            }
            _ => {
                warn!("No config file found, using compiled defaults");
                Ok(Self::default())
            }
        }
    }
}

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// Path of the database file inside a root folder
pub fn database_path(root_folder: &Path) -> PathBuf {
    root_folder.join(DATABASE_FILE_NAME)
}

/// Default configuration file path for the platform
fn default_config_path() -> Option<PathBuf> {
    if cfg!(target_os = "linux") {
        let user_config = dirs::config_dir().map(|d| d.join("mixdb").join("config.toml"));
        match user_config {
            Some(path) if path.exists() => Some(path),
            _ => Some(PathBuf::from("/etc/mixdb/config.toml")),
        }
    } else {
        dirs::config_dir().map(|d| d.join("mixdb").join("config.toml"))
    }
}

/// OS-dependent default root folder
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("mixdb"))
        .unwrap_or_else(|| PathBuf::from("./mixdb_data"))
}
