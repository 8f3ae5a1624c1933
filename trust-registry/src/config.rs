//! Registry configuration
//!
//! Deployment addresses and network for the three registries, plus the
//! storage location and port used by the service.

use std::str::FromStr;

use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

pub const DEFAULT_NETWORK_ID: u64 = 31337;
pub const DEFAULT_DB_PATH: &str = "./trust_registry.db";
pub const DEFAULT_PORT: u16 = 9110;

// First three deployments from the default local dev account
const DEFAULT_IDENTITY_ADDRESS: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";
const DEFAULT_REPUTATION_ADDRESS: &str = "0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512";
const DEFAULT_VALIDATION_ADDRESS: &str = "0x9fE46736679d2D9a65F0992F2272dE9f3c7fa6e0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub network_id: U256,
    pub identity_address: Address,
    pub reputation_address: Address,
    pub validation_address: Address,
    /// SQLite path; `:memory:` keeps everything in RAM
    pub db_path: String,
    pub port: u16,
}

impl RegistryConfig {
    /// Local development defaults
    pub fn local() -> Self {
        Self {
            network_id: U256::from(DEFAULT_NETWORK_ID),
            identity_address: default_address(DEFAULT_IDENTITY_ADDRESS),
            reputation_address: default_address(DEFAULT_REPUTATION_ADDRESS),
            validation_address: default_address(DEFAULT_VALIDATION_ADDRESS),
            db_path: DEFAULT_DB_PATH.to_string(),
            port: DEFAULT_PORT,
        }
    }

    /// Load from environment or use defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unparseable values fall back to the default
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::local();

        if let Some(raw) = lookup("TRUST_REGISTRY_NETWORK_ID") {
            match parse_u256(&raw) {
                Some(id) => config.network_id = id,
                None => log::warn!(
                    "[CONFIG] Invalid TRUST_REGISTRY_NETWORK_ID '{}', using {}",
                    raw,
                    DEFAULT_NETWORK_ID
                ),
            }
        }
        override_address(&lookup, "TRUST_REGISTRY_IDENTITY_ADDRESS", &mut config.identity_address);
        override_address(&lookup, "TRUST_REGISTRY_REPUTATION_ADDRESS", &mut config.reputation_address);
        override_address(&lookup, "TRUST_REGISTRY_VALIDATION_ADDRESS", &mut config.validation_address);

        if let Some(path) = lookup("TRUST_REGISTRY_DB_PATH") {
            if !path.trim().is_empty() {
                config.db_path = path;
            }
        }
        if let Some(raw) = lookup("TRUST_REGISTRY_PORT") {
            match raw.trim().parse() {
                Ok(port) => config.port = port,
                Err(_) => log::warn!("[CONFIG] Invalid TRUST_REGISTRY_PORT '{}', using {}", raw, DEFAULT_PORT),
            }
        }

        config
    }

    /// CAIP-10 style registry string, e.g. `eip155:31337:0x5fbd...`
    pub fn agent_registry_string(&self) -> String {
        format!("eip155:{}:{:?}", self.network_id, self.identity_address)
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::local()
    }
}

fn default_address(s: &str) -> Address {
    Address::from_str(s).unwrap_or_default()
}

fn override_address(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut Address) {
    if let Some(raw) = lookup(key) {
        match Address::from_str(raw.trim()) {
            Ok(addr) => *target = addr,
            Err(_) => log::warn!("[CONFIG] Invalid {} '{}', keeping {:?}", key, raw, target),
        }
    }
}

/// Decimal or 0x-prefixed hex
fn parse_u256(raw: &str) -> Option<U256> {
    let raw = raw.trim();
    match raw.strip_prefix("0x") {
        Some(hex) => U256::from_str_radix(hex, 16).ok(),
        None => U256::from_dec_str(raw).ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_local_defaults() {
        let config = RegistryConfig::from_lookup(|_| None);
        assert_eq!(config, RegistryConfig::local());
        assert_eq!(config.network_id, U256::from(31337));
        assert_eq!(config.port, 9110);
        assert!(!config.identity_address.is_zero());
        assert_ne!(config.identity_address, config.reputation_address);
    }

    #[test]
    fn test_overrides() {
        let config = RegistryConfig::from_lookup(lookup_from(&[
            ("TRUST_REGISTRY_NETWORK_ID", "0x2105"),
            ("TRUST_REGISTRY_REPUTATION_ADDRESS", "0x000000000000000000000000000000000000bEEF"),
            ("TRUST_REGISTRY_DB_PATH", ":memory:"),
            ("TRUST_REGISTRY_PORT", "8088"),
        ]));
        assert_eq!(config.network_id, U256::from(8453));
        assert_eq!(config.reputation_address, Address::from_low_u64_be(0xbeef));
        assert_eq!(config.db_path, ":memory:");
        assert_eq!(config.port, 8088);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = RegistryConfig::from_lookup(lookup_from(&[
            ("TRUST_REGISTRY_NETWORK_ID", "mainnet"),
            ("TRUST_REGISTRY_IDENTITY_ADDRESS", "0x1234"),
            ("TRUST_REGISTRY_PORT", "99999"),
        ]));
        assert_eq!(config, RegistryConfig::local());
    }

    #[test]
    fn test_registry_string() {
        let config = RegistryConfig::local();
        assert_eq!(
            config.agent_registry_string(),
            "eip155:31337:0x5fbdb2315678afecb367f032d93f642f64180aa3"
        );
    }
}
