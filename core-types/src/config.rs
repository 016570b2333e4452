// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::path::Path;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

pub const ENV_PREFIX: &str = "GRIDD";
pub const DEFAULT_SETTINGS_FILE: &str = "gridd.toml";

/// Layered service settings: optional toml file, then `GRIDD_*` environment overrides.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServiceSettings {
    #[serde(default)]
    pub state_dir: Option<String>,
    #[serde(default)]
    pub grid: GridSettings,
    #[serde(default)]
    pub pricing: PricingSettings,
    #[serde(default)]
    pub content: ContentSettings,
    #[serde(default)]
    pub ledger: LedgerSettings,
    #[serde(default)]
    pub settlement: SettlementSettings,
    #[serde(default)]
    pub server: ServerSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridSettings {
    #[serde(default = "default_grid_size")]
    pub grid_size: u32,
    #[serde(default = "default_total_pages")]
    pub total_pages: u32,
    #[serde(default = "default_unit_pixels")]
    pub unit_pixels: u32,
    #[serde(default = "default_bucket_size")]
    pub bucket_size: u32,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            grid_size: default_grid_size(),
            total_pages: default_total_pages(),
            unit_pixels: default_unit_pixels(),
            bucket_size: default_bucket_size(),
        }
    }
}

fn default_grid_size() -> u32 {
    316
}

fn default_total_pages() -> u32 {
    100
}

fn default_unit_pixels() -> u32 {
    10
}

fn default_bucket_size() -> u32 {
    16
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingSettings {
    /// Decimal string, parsed by the consumer.
    #[serde(default = "default_rate_per_pixel")]
    pub rate_per_pixel: String,
    #[serde(default = "default_animated_multiplier")]
    pub animated_multiplier: u32,
    #[serde(default = "default_minor_unit_scale")]
    pub minor_unit_scale: u32,
}

impl Default for PricingSettings {
    fn default() -> Self {
        Self {
            rate_per_pixel: default_rate_per_pixel(),
            animated_multiplier: default_animated_multiplier(),
            minor_unit_scale: default_minor_unit_scale(),
        }
    }
}

fn default_rate_per_pixel() -> String {
    "0.01".to_string()
}

fn default_animated_multiplier() -> u32 {
    2
}

fn default_minor_unit_scale() -> u32 {
    2
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentSettings {
    #[serde(default = "default_max_title_chars")]
    pub max_title_chars: usize,
}

impl Default for ContentSettings {
    fn default() -> Self {
        Self {
            max_title_chars: default_max_title_chars(),
        }
    }
}

fn default_max_title_chars() -> usize {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSettings {
    /// Payment proofs are trusted as reported unless this is set; nothing verifies them on-chain yet.
    #[serde(default)]
    pub verify_on_chain: bool,
    #[serde(default = "default_sync_writes")]
    pub sync_writes: bool,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            verify_on_chain: false,
            sync_writes: default_sync_writes(),
        }
    }
}

fn default_sync_writes() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementSettings {
    /// Reject an already-taken selection before its payment proof is spent.
    #[serde(default = "default_precheck")]
    pub precheck: bool,
}

impl Default for SettlementSettings {
    fn default() -> Self {
        Self {
            precheck: default_precheck(),
        }
    }
}

fn default_precheck() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_max_body_bytes() -> usize {
    64 * 1024
}

impl ServiceSettings {
    /// Loads `gridd.toml` from the working directory (if present) plus environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Path::new(DEFAULT_SETTINGS_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;
        let loaded: Self = settings.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grid.grid_size == 0 {
            return Err(ConfigError::Message("grid.grid_size must be positive".to_string()));
        }
        if self.grid.total_pages == 0 || self.grid.total_pages > u16::MAX as u32 {
            return Err(ConfigError::Message(format!(
                "grid.total_pages must be within 1..={}",
                u16::MAX
            )));
        }
        if self.grid.unit_pixels == 0 {
            return Err(ConfigError::Message("grid.unit_pixels must be positive".to_string()));
        }
        if self.grid.bucket_size == 0 {
            return Err(ConfigError::Message("grid.bucket_size must be positive".to_string()));
        }
        if self.pricing.animated_multiplier == 0 {
            return Err(ConfigError::Message(
                "pricing.animated_multiplier must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
