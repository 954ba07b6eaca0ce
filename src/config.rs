//! Configuration management with validation and defaults
//!
//! Configuration is fixed once an engine is constructed. It comes from a TOML
//! file (or the defaults), then `ROULETTE_*` environment overrides, then
//! validation.

use crate::errors::{ConfigurationError, EngineResult};
use crate::games::types::AccountId;
use crate::units::{parse_units, serde_amount, Amount};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

/// Chain id of a local development node
pub const LOCAL_CHAIN_ID: u64 = 31337;

/// Chain id of the Sepolia test network
pub const SEPOLIA_CHAIN_ID: u64 = 11155111;

const SEPOLIA_COORDINATOR: &str = "0x8103B0A8A00be2DDC778e6e7eaa21791Cd364625";

/// 30 gwei gas lane
const DEFAULT_KEY_HASH: &str = "0x474e34a077df58807dbe9c96d3c009b23b3c6d0cce433e59bbf5b34f823bc56c";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub ledger: LedgerConfig,
    pub table: TableConfig,
    pub randomness: RandomnessConfig,
    pub monitoring: MonitoringConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::development(AccountId::new("owner"))
    }
}

/// Account bounds and the privileged owner
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub owner: AccountId,
    #[serde(with = "serde_amount")]
    pub min_balance: Amount,
    #[serde(with = "serde_amount")]
    pub max_balance: Amount,
}

/// Stake per wager
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    #[serde(with = "serde_amount")]
    pub straight_unit: Amount,
    #[serde(with = "serde_amount")]
    pub outside_unit: Amount,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// In-process coordinator mock, fulfilled explicitly
    Mock,
    /// Self-hosted VRF provider
    Vrf,
}

/// Randomness provider connection parameters
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomnessConfig {
    pub provider: ProviderKind,
    pub chain_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinator_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<u64>,
    pub key_hash: String,
    pub callback_gas_limit: u32,
    pub request_confirmations: u16,
    /// Delay before the VRF provider delivers an outcome
    pub fulfillment_delay_ms: u64,
    /// Age after which the owner may refund a pending request
    pub request_timeout_secs: u64,
}

impl RandomnessConfig {
    /// Known network presets
    pub fn for_chain(chain_id: u64) -> Self {
        match chain_id {
            SEPOLIA_CHAIN_ID => Self {
                provider: ProviderKind::Vrf,
                chain_id,
                coordinator_address: Some(SEPOLIA_COORDINATOR.to_string()),
                subscription_id: None,
                key_hash: DEFAULT_KEY_HASH.to_string(),
                callback_gas_limit: 500_000,
                request_confirmations: 3,
                fulfillment_delay_ms: 1_000,
                request_timeout_secs: 3_600,
            },
            _ => Self {
                provider: ProviderKind::Mock,
                chain_id,
                coordinator_address: None,
                subscription_id: None,
                key_hash: DEFAULT_KEY_HASH.to_string(),
                callback_gas_limit: 500_000,
                request_confirmations: 1,
                fulfillment_delay_ms: 0,
                request_timeout_secs: 600,
            },
        }
    }
}

impl Default for RandomnessConfig {
    fn default() -> Self {
        Self::for_chain(LOCAL_CHAIN_ID)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Default filter directive for the tracing subscriber
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Error => "roulette_engine=error",
            LogLevel::Warn => "roulette_engine=warn",
            LogLevel::Info => "roulette_engine=info",
            LogLevel::Debug => "roulette_engine=debug",
            LogLevel::Trace => "roulette_engine=trace",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(ConfigurationError::InvalidValue {
                field: "log_level".to_string(),
                value: s.to_string(),
                reason: "expected error, warn, info, debug or trace".to_string(),
            }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub log_level: LogLevel,
    /// Capacity of the event broadcast channel
    pub event_buffer: usize,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            event_buffer: 1_024,
        }
    }
}

impl EngineConfig {
    /// Local development deployment: 0.01 to 0.1 balances, 0.0005 / 0.0025 stakes
    pub fn development(owner: AccountId) -> Self {
        Self {
            ledger: LedgerConfig {
                owner,
                min_balance: 10_000_000_000_000_000,   // 0.01
                max_balance: 100_000_000_000_000_000,  // 0.1
            },
            table: TableConfig {
                straight_unit: 500_000_000_000_000,    // 0.0005
                outside_unit: 2_500_000_000_000_000,   // 0.0025
            },
            randomness: RandomnessConfig::for_chain(LOCAL_CHAIN_ID),
            monitoring: MonitoringConfig::default(),
        }
    }

    /// Same table as development, with the network preset for `chain_id`
    pub fn for_chain(owner: AccountId, chain_id: u64) -> Self {
        Self {
            randomness: RandomnessConfig::for_chain(chain_id),
            ..Self::development(owner)
        }
    }
}

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load configuration from file and environment variables
    pub fn load(&self) -> EngineResult<EngineConfig> {
        let mut config = match self.config_path {
            Some(ref path) => self.load_from_file(path)?,
            None => EngineConfig::default(),
        };

        self.apply_env_overrides(&mut config)?;
        self.validate(&config)?;

        Ok(config)
    }

    fn load_from_file(&self, path: &str) -> Result<EngineConfig, ConfigurationError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to read {}: {}", path, e)))?;

        toml::from_str(&content)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to parse TOML: {}", e)))
    }

    fn apply_env_overrides(&self, config: &mut EngineConfig) -> Result<(), ConfigurationError> {
        self.apply_overrides_from(config, |key| env::var(key).ok())
    }

    /// Apply `ROULETTE_*` overrides from any key lookup
    pub fn apply_overrides_from<F>(&self, config: &mut EngineConfig, lookup: F) -> Result<(), ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let amount = |key: &str, raw: String| {
            parse_units(&raw).map_err(|_| ConfigurationError::InvalidValue {
                field: key.to_string(),
                value: raw,
                reason: "Invalid decimal amount".to_string(),
            })
        };

        if let Some(owner) = lookup("ROULETTE_OWNER") {
            config.ledger.owner = AccountId::new(owner);
        }
        if let Some(raw) = lookup("ROULETTE_MIN_BALANCE") {
            config.ledger.min_balance = amount("ROULETTE_MIN_BALANCE", raw)?;
        }
        if let Some(raw) = lookup("ROULETTE_MAX_BALANCE") {
            config.ledger.max_balance = amount("ROULETTE_MAX_BALANCE", raw)?;
        }
        if let Some(raw) = lookup("ROULETTE_STRAIGHT_UNIT") {
            config.table.straight_unit = amount("ROULETTE_STRAIGHT_UNIT", raw)?;
        }
        if let Some(raw) = lookup("ROULETTE_OUTSIDE_UNIT") {
            config.table.outside_unit = amount("ROULETTE_OUTSIDE_UNIT", raw)?;
        }
        if let Some(raw) = lookup("ROULETTE_PROVIDER") {
            config.randomness.provider = match raw.to_ascii_lowercase().as_str() {
                "mock" => ProviderKind::Mock,
                "vrf" => ProviderKind::Vrf,
                _ => {
                    return Err(ConfigurationError::InvalidValue {
                        field: "ROULETTE_PROVIDER".to_string(),
                        value: raw,
                        reason: "expected mock or vrf".to_string(),
                    })
                }
            };
        }
        if let Some(raw) = lookup("ROULETTE_LOG_LEVEL") {
            config.monitoring.log_level = raw.parse()?;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self, config: &EngineConfig) -> Result<(), ConfigurationError> {
        if config.ledger.owner.as_str().trim().is_empty() {
            return Err(ConfigurationError::MissingRequired("ledger.owner".to_string()));
        }

        if config.ledger.max_balance == 0 {
            return Err(ConfigurationError::InvalidValue {
                field: "ledger.max_balance".to_string(),
                value: "0".to_string(),
                reason: "Max balance cannot be zero".to_string(),
            });
        }

        if config.ledger.min_balance > config.ledger.max_balance {
            return Err(ConfigurationError::ValidationFailed(format!(
                "ledger.min_balance ({}) exceeds ledger.max_balance ({})",
                config.ledger.min_balance, config.ledger.max_balance
            )));
        }

        for (field, unit) in [
            ("table.straight_unit", config.table.straight_unit),
            ("table.outside_unit", config.table.outside_unit),
        ] {
            if unit == 0 {
                return Err(ConfigurationError::InvalidValue {
                    field: field.to_string(),
                    value: "0".to_string(),
                    reason: "Stake unit cannot be zero".to_string(),
                });
            }
        }

        if config.randomness.callback_gas_limit == 0 {
            return Err(ConfigurationError::InvalidValue {
                field: "randomness.callback_gas_limit".to_string(),
                value: "0".to_string(),
                reason: "Callback gas limit cannot be zero".to_string(),
            });
        }

        if config.randomness.provider == ProviderKind::Vrf && config.randomness.key_hash.trim().is_empty() {
            return Err(ConfigurationError::MissingRequired("randomness.key_hash".to_string()));
        }

        if config.monitoring.event_buffer == 0 {
            return Err(ConfigurationError::InvalidValue {
                field: "monitoring.event_buffer".to_string(),
                value: "0".to_string(),
                reason: "Event buffer cannot be zero".to_string(),
            });
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, config: &EngineConfig, path: &str) -> EngineResult<()> {
        let toml_string = toml::to_string_pretty(config)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, toml_string)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to write to {}: {}", path, e)).into())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate a sample configuration file
pub fn generate_sample_config(path: &str) -> EngineResult<()> {
    ConfigLoader::new().save(&EngineConfig::default(), path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::EngineError;
    use std::collections::HashMap;
    use tempfile::NamedTempFile;

    #[test]
    fn test_development_defaults() {
        let config = EngineConfig::development("deployer".into());
        assert_eq!(config.ledger.min_balance, parse_units("0.01").unwrap());
        assert_eq!(config.ledger.max_balance, parse_units("0.1").unwrap());
        assert_eq!(config.table.straight_unit, parse_units("0.0005").unwrap());
        assert_eq!(config.table.outside_unit, parse_units("0.0025").unwrap());
        assert_eq!(config.randomness.provider, ProviderKind::Mock);
        assert!(ConfigLoader::new().validate(&config).is_ok());
    }

    #[test]
    fn test_network_presets() {
        let sepolia = RandomnessConfig::for_chain(SEPOLIA_CHAIN_ID);
        assert_eq!(sepolia.provider, ProviderKind::Vrf);
        assert_eq!(sepolia.coordinator_address.as_deref(), Some(SEPOLIA_COORDINATOR));
        assert_eq!(sepolia.callback_gas_limit, 500_000);

        let local = RandomnessConfig::for_chain(LOCAL_CHAIN_ID);
        assert_eq!(local.provider, ProviderKind::Mock);
        assert!(local.coordinator_address.is_none());
    }

    #[test]
    fn test_config_validation() {
        let loader = ConfigLoader::new();
        let mut config = EngineConfig::default();

        config.ledger.min_balance = config.ledger.max_balance + 1;
        assert!(matches!(
            loader.validate(&config),
            Err(ConfigurationError::ValidationFailed(_))
        ));

        let mut config = EngineConfig::default();
        config.table.outside_unit = 0;
        assert!(loader.validate(&config).is_err());

        let mut config = EngineConfig::default();
        config.ledger.owner = AccountId::new("  ");
        assert_eq!(
            loader.validate(&config),
            Err(ConfigurationError::MissingRequired("ledger.owner".to_string()))
        );
    }

    #[test]
    fn test_env_overrides() {
        let loader = ConfigLoader::new();
        let mut config = EngineConfig::default();
        let vars: HashMap<&str, &str> = HashMap::from([
            ("ROULETTE_OWNER", "house"),
            ("ROULETTE_MAX_BALANCE", "0.5"),
            ("ROULETTE_PROVIDER", "vrf"),
            ("ROULETTE_LOG_LEVEL", "debug"),
        ]);

        loader
            .apply_overrides_from(&mut config, |key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.ledger.owner, AccountId::new("house"));
        assert_eq!(config.ledger.max_balance, parse_units("0.5").unwrap());
        assert_eq!(config.randomness.provider, ProviderKind::Vrf);
        assert_eq!(config.monitoring.log_level, LogLevel::Debug);
    }

    #[test]
    fn test_bad_env_override_is_rejected() {
        let loader = ConfigLoader::new();
        let mut config = EngineConfig::default();

        let err = loader
            .apply_overrides_from(&mut config, |key| {
                (key == "ROULETTE_STRAIGHT_UNIT").then(|| "lots".to_string())
            })
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidValue { .. }));
    }

    #[test]
    fn test_save_and_load_config() -> EngineResult<()> {
        let temp_file = NamedTempFile::new()?;
        let path = temp_file.path().to_string_lossy().to_string();

        let saved = EngineConfig::for_chain("deployer".into(), SEPOLIA_CHAIN_ID);
        ConfigLoader::new().save(&saved, &path)?;

        let written = std::fs::read_to_string(&path)?;
        assert!(written.contains("straight_unit = \"0.0005\""));

        let loaded = ConfigLoader::new().with_path(&path).load_from_file(&path)?;
        assert_eq!(loaded, saved);
        Ok(())
    }

    #[test]
    fn test_missing_file_fails_to_load() {
        let result = ConfigLoader::new().with_path("/nonexistent/roulette.toml").load();
        assert!(matches!(
            result,
            Err(EngineError::Configuration(ConfigurationError::LoadFailed(_)))
        ));
    }
}
