//! Configuration management for the relay hub
//!
//! Loads configuration from TOML files with environment variable substitution.

use crate::crypto::Address;
use crate::directory::Appchain;
use crate::hub::DEFAULT_MAX_BATCH_SIZE;
use crate::interchain::QuorumPolicy;

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::env;
use std::path::{Path, PathBuf};

lazy_static! {
    static ref ENV_VAR: Regex = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub hub: HubConfig,
    pub api: ApiConfig,
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub admins: Vec<Address>,
    /// Genesis directory contents
    #[serde(default)]
    pub appchains: Vec<Appchain>,
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    pub instance_id: String,
    #[serde(default = "default_quorum_numerator")]
    pub quorum_numerator: u64,
    #[serde(default = "default_quorum_denominator")]
    pub quorum_denominator: u64,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

fn default_quorum_numerator() -> u64 {
    2
}

fn default_quorum_denominator() -> u64 {
    3
}

fn default_max_batch_size() -> usize {
    DEFAULT_MAX_BATCH_SIZE
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

/// Validation rule binding, either for one chain or for a chain type
#[derive(Debug, Clone, Deserialize)]
pub struct RuleConfig {
    pub chain_id: Option<String>,
    pub chain_type: Option<String>,
    pub address: String,
}

impl Settings {
    /// Load settings from the file named by `RELAY_HUB_CONFIG`
    pub fn load() -> Result<Self> {
        let config_path = env::var("RELAY_HUB_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));
        Self::from_file(&config_path)
    }

    pub fn from_file(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;
        Self::from_toml(&config_str)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(raw);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        self.quorum()?;

        if self.hub.max_batch_size == 0 {
            anyhow::bail!("hub.max_batch_size must be positive");
        }

        let mut seen = BTreeSet::new();
        for chain in &self.appchains {
            if !seen.insert(chain.id.as_str()) {
                anyhow::bail!("Appchain {} is configured twice", chain.id);
            }
            if chain.public_key.is_empty() {
                tracing::warn!("Appchain {} has no public key - it cannot submit packets", chain.id);
            }
        }

        for rule in &self.rules {
            if rule.chain_id.is_none() && rule.chain_type.is_none() {
                anyhow::bail!("Rule {} names neither a chain nor a chain type", rule.address);
            }
        }

        if self.admins.is_empty() {
            tracing::warn!("No admin accounts configured - register calls will be rejected");
        }

        Ok(())
    }

    pub fn quorum(&self) -> Result<QuorumPolicy> {
        QuorumPolicy::new(self.hub.quorum_numerator, self.hub.quorum_denominator)
            .map_err(|e| anyhow::anyhow!(e))
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();

    for cap in ENV_VAR.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::directory::ChainStatus;
    use std::io::Write;

    fn sample(admin: &str, public_key: &str) -> String {
        format!(
            r#"
admins = ["{admin}"]

[hub]
instance_id = "hub-test"
quorum_numerator = 1
quorum_denominator = 2

[api]
host = "127.0.0.1"
port = 8080

[metrics]
enabled = false
port = 9090

[[appchains]]
id = "did:bitxhub:appchain1:."
name = "A"
chain_type = "fabric"
status = "available"
public_key = "{public_key}"

[[rules]]
chain_type = "fabric"
address = "0x00000000000000000000000000000000000000a1"
"#
        )
    }

    #[test]
    fn test_env_var_substitution() {
        env::set_var("RELAY_HUB_TEST_VAR", "test_value");
        let input = "url = \"https://api.example.com/${RELAY_HUB_TEST_VAR}/endpoint\"";
        let result = substitute_env_vars(input);
        assert_eq!(result, "url = \"https://api.example.com/test_value/endpoint\"");
    }

    #[test]
    fn test_load_from_file() {
        let admin = KeyPair::from_seed("admin").unwrap();
        let chain = KeyPair::from_seed("a").unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "{}",
            sample(&admin.address().to_string(), &chain.public_key_base64())
        )
        .unwrap();

        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(settings.hub.instance_id, "hub-test");
        assert_eq!(settings.hub.max_batch_size, DEFAULT_MAX_BATCH_SIZE);
        assert_eq!(settings.admins, vec![admin.address()]);
        assert_eq!(settings.appchains[0].status, ChainStatus::Available);
        assert!(settings.appchains[0].validators.is_empty());
        assert_eq!(settings.quorum().unwrap(), QuorumPolicy::new(1, 2).unwrap());
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        let admin = KeyPair::from_seed("admin").unwrap().address().to_string();

        let bad_quorum = sample(&admin, "").replace("quorum_numerator = 1", "quorum_numerator = 2");
        assert!(Settings::from_toml(&bad_quorum).is_err());

        let bad_admin = sample("0x1234", "");
        assert!(Settings::from_toml(&bad_admin).is_err());

        let orphan_rule = sample(&admin, "").replace("chain_type = \"fabric\"\naddress", "address");
        assert!(Settings::from_toml(&orphan_rule).is_err());
    }
}
