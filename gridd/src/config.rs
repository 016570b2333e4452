use std::{net::SocketAddr, path::PathBuf, str::FromStr};

use core_types::ServiceSettings;
use ledger::LedgerConfig;
use rust_decimal::Decimal;
use settlement::SettlementConfig;
use slot_space::{Pricing, SlotSpaceConfig};
use thiserror::Error;

const DEV_STATE_DIR: &str = "gridd.state";

/// Deployment target for the binary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Prod,
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            other => Err(ConfigError::UnknownEnvironment {
                value: other.to_string(),
            }),
        }
    }
}

/// Settings resolved into the per-crate configs the service is built from.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub env: Environment,
    pub slot_space: SlotSpaceConfig,
    pub ledger: LedgerConfig,
    pub settlement: SettlementConfig,
    pub listen_addr: SocketAddr,
    pub max_body_bytes: usize,
}

impl AppConfig {
    pub fn load(env: Environment) -> Result<Self, ConfigError> {
        Self::from_settings(env, ServiceSettings::load()?)
    }

    pub fn from_settings(env: Environment, settings: ServiceSettings) -> Result<Self, ConfigError> {
        settings.validate()?;
        if settings.ledger.verify_on_chain {
            return Err(ConfigError::OnChainVerificationUnsupported);
        }
        let state_dir = match (env, settings.state_dir.as_deref()) {
            (_, Some(dir)) if !dir.trim().is_empty() => PathBuf::from(dir.trim()),
            (Environment::Dev, _) => PathBuf::from(DEV_STATE_DIR),
            (Environment::Prod, _) => return Err(ConfigError::MissingStateDir),
        };
        let rate_per_pixel = Decimal::from_str(settings.pricing.rate_per_pixel.trim())
            .ok()
            .filter(|rate| !rate.is_sign_negative())
            .ok_or_else(|| ConfigError::InvalidRate {
                value: settings.pricing.rate_per_pixel.clone(),
            })?;
        let listen_addr = settings
            .server
            .listen_addr
            .parse()
            .map_err(|_| ConfigError::InvalidListenAddr {
                value: settings.server.listen_addr.clone(),
            })?;

        let mut slot_space = SlotSpaceConfig::new(state_dir.clone());
        slot_space.grid_size = settings.grid.grid_size;
        slot_space.total_pages = settings.grid.total_pages;
        slot_space.bucket_size = settings.grid.bucket_size;
        slot_space.pricing = Pricing {
            rate_per_pixel,
            unit_pixels: settings.grid.unit_pixels,
            animated_multiplier: settings.pricing.animated_multiplier,
            minor_unit_scale: settings.pricing.minor_unit_scale,
        };
        slot_space.max_title_chars = settings.content.max_title_chars;
        slot_space.sync_writes = settings.ledger.sync_writes;

        let mut ledger = LedgerConfig::new(state_dir.clone());
        ledger.sync_writes = settings.ledger.sync_writes;
        ledger.verify_on_chain = settings.ledger.verify_on_chain;

        let mut settlement = SettlementConfig::new(state_dir);
        settlement.sync_writes = settings.ledger.sync_writes;
        settlement.precheck = settings.settlement.precheck;

        Ok(Self {
            env,
            slot_space,
            ledger,
            settlement,
            listen_addr,
            max_body_bytes: settings.server.max_body_bytes,
        })
    }

    pub fn env_label(&self) -> &'static str {
        match self.env {
            Environment::Dev => "dev",
            Environment::Prod => "prod",
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown environment '{value}' (expected 'dev' or 'prod')")]
    UnknownEnvironment { value: String },
    #[error("settings error: {0}")]
    Settings(#[from] ::config::ConfigError),
    #[error("state_dir must be set explicitly in prod")]
    MissingStateDir,
    #[error("pricing.rate_per_pixel '{value}' is not a non-negative decimal")]
    InvalidRate { value: String },
    #[error("server.listen_addr '{value}' is not a socket address")]
    InvalidListenAddr { value: String },
    #[error("ledger.verify_on_chain is set but no on-chain verifier is available")]
    OnChainVerificationUnsupported,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_parses_case_insensitively() {
        assert_eq!("DEV".parse::<Environment>().unwrap(), Environment::Dev);
        assert_eq!("prod".parse::<Environment>().unwrap(), Environment::Prod);
        assert!(matches!(
            "staging".parse::<Environment>(),
            Err(ConfigError::UnknownEnvironment { .. })
        ));
    }

    #[test]
    fn dev_defaults_resolve() {
        let config = AppConfig::from_settings(Environment::Dev, ServiceSettings::default()).unwrap();
        assert_eq!(config.slot_space.state_dir, PathBuf::from(DEV_STATE_DIR));
        assert_eq!(config.slot_space.pricing.rate_per_pixel, Decimal::new(1, 2));
        assert_eq!(config.ledger.ledger_path(), PathBuf::from("gridd.state/ledger.map"));
        assert_eq!(config.listen_addr.port(), 3000);
        assert!(config.settlement.precheck);
        assert_eq!(config.env_label(), "dev");
    }

    #[test]
    fn prod_requires_state_dir() {
        assert!(matches!(
            AppConfig::from_settings(Environment::Prod, ServiceSettings::default()),
            Err(ConfigError::MissingStateDir)
        ));
        let settings = ServiceSettings {
            state_dir: Some("/var/lib/gridd".to_string()),
            ..Default::default()
        };
        let config = AppConfig::from_settings(Environment::Prod, settings).unwrap();
        assert_eq!(
            config.settlement.reconciliation_path(),
            PathBuf::from("/var/lib/gridd/reconciliation.map")
        );
    }

    #[test]
    fn invalid_settings_rejected() {
        let mut settings = ServiceSettings::default();
        settings.pricing.rate_per_pixel = "-0.01".to_string();
        assert!(matches!(
            AppConfig::from_settings(Environment::Dev, settings),
            Err(ConfigError::InvalidRate { .. })
        ));

        let mut settings = ServiceSettings::default();
        settings.ledger.verify_on_chain = true;
        assert!(matches!(
            AppConfig::from_settings(Environment::Dev, settings),
            Err(ConfigError::OnChainVerificationUnsupported)
        ));

        let mut settings = ServiceSettings::default();
        settings.server.listen_addr = "nowhere".to_string();
        assert!(matches!(
            AppConfig::from_settings(Environment::Dev, settings),
            Err(ConfigError::InvalidListenAddr { .. })
        ));

        let mut settings = ServiceSettings::default();
        settings.grid.bucket_size = 0;
        assert!(matches!(
            AppConfig::from_settings(Environment::Dev, settings),
            Err(ConfigError::Settings(_))
        ));
    }
}
