//! Configuration loader for tangle-spammer.
//!
//! Values come from a TOML file, then CLI flags override them field by
//! field. A missing file is created from the resolved values, including a
//! freshly generated seed, so later runs reuse the same addresses.

use crate::bundle::TAG_LEN;
use crate::crypto::{Address, SecurityLevel, Seed};
use crate::supply::{SpamMode, SupplyParams, DEFAULT_STATIC_BALANCE};
use crate::worker::{WorkerSettings, DEFAULT_DEPTH, DEFAULT_MWM};
use clap::Args;
use core_logic::{ConfigError, LoopConfig, NodeEndpoint};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

pub const DEFAULT_CONFIG_PATH: &str = "config/spammer.toml";
pub const DEFAULT_NODE: &str = "http://localhost:14265";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpammerConfig {
    /// Nodes to spam. Every node gets `instances` workers.
    pub nodes: Vec<String>,
    /// Optional node that does the proof-of-work.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pow_node: Option<String>,
    pub instances: usize,
    /// `0value`, `static` or `conflicting`.
    pub mode: String,
    pub target_address: String,
    pub tag: String,
    pub message: String,
    /// Minimum transactions per bundle.
    pub bundle_size: usize,
    pub cycle_length: usize,
    pub security: u8,
    /// 64 hex chars. Generated and persisted when missing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<String>,
    pub mwm: u8,
    pub depth: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_after: Option<u64>,
    pub request_timeout_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff_base_ms: Option<u64>,
    pub static_balance: u64,
    pub conflict_value: u64,
}

impl Default for SpammerConfig {
    fn default() -> Self {
        Self {
            nodes: vec![DEFAULT_NODE.to_string()],
            pow_node: None,
            instances: 6,
            mode: SpamMode::ZeroValue.to_string(),
            target_address: default_target_address(),
            tag: "TANGLESPAMMER".to_string(),
            message: "This is a spam message sent via the tangle spammer".to_string(),
            bundle_size: 4,
            cycle_length: 2,
            security: SecurityLevel::Medium as u8,
            seed: None,
            mwm: DEFAULT_MWM,
            depth: DEFAULT_DEPTH,
            stop_after: None,
            request_timeout_secs: 30,
            backoff_base_ms: None,
            static_balance: DEFAULT_STATIC_BALANCE,
            conflict_value: 1,
        }
    }
}

fn default_target_address() -> String {
    Address::from_hash([0u8; 32]).to_string()
}

/// Command-line overrides. Unset flags keep the file value.
#[derive(Debug, Clone, Default, Args)]
pub struct ConfigOverrides {
    /// Node URL; repeat for several nodes
    #[arg(short, long = "node")]
    pub nodes: Vec<String>,
    #[arg(long)]
    pub pow_node: Option<String>,
    /// Workers per node
    #[arg(short, long)]
    pub instances: Option<usize>,
    /// 0value, static or conflicting
    #[arg(short, long)]
    pub mode: Option<String>,
    #[arg(short, long = "address")]
    pub target_address: Option<String>,
    #[arg(long)]
    pub tag: Option<String>,
    #[arg(long)]
    pub message: Option<String>,
    #[arg(short, long)]
    pub bundle_size: Option<usize>,
    #[arg(long)]
    pub cycle_length: Option<usize>,
    #[arg(short, long)]
    pub security: Option<u8>,
    #[arg(long)]
    pub seed: Option<String>,
    #[arg(long)]
    pub mwm: Option<u8>,
    #[arg(long)]
    pub depth: Option<u32>,
    /// Stop each worker after this many broadcast bundles
    #[arg(long)]
    pub stop_after: Option<u64>,
    #[arg(long)]
    pub backoff_base_ms: Option<u64>,
}

impl SpammerConfig {
    /// Reads `path` and applies `overrides`. When the file doesn't exist the
    /// defaults are used instead and the resolved config, seed included, is
    /// written there. Returns the config and whether the file was created.
    pub fn load_or_create(
        path: &Path,
        overrides: ConfigOverrides,
    ) -> Result<(Self, bool), ConfigError> {
        if path.exists() {
            let mut config = Self::from_path(path)?;
            config.apply(overrides);
            return Ok((config, false));
        }

        let mut config = Self::default();
        config.apply(overrides);
        config.validate()?;
        if config.seed.is_none() {
            config.seed = Some(Seed::generate().to_hex().to_string());
        }
        config.save(path)?;
        info!(target: "spam", "Created config file {}", path.display());
        Ok((config, true))
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            msg: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            msg: e.to_string(),
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_error = |e: std::io::Error| ConfigError::IoError {
            path: path.display().to_string(),
            msg: e.to_string(),
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize {
            msg: e.to_string(),
        })?;
        fs::write(path, content).map_err(io_error)
    }

    pub fn apply(&mut self, overrides: ConfigOverrides) {
        if !overrides.nodes.is_empty() {
            self.nodes = overrides.nodes;
        }
        if overrides.pow_node.is_some() {
            self.pow_node = overrides.pow_node;
        }
        if overrides.seed.is_some() {
            self.seed = overrides.seed;
        }
        if overrides.stop_after.is_some() {
            self.stop_after = overrides.stop_after;
        }
        if overrides.backoff_base_ms.is_some() {
            self.backoff_base_ms = overrides.backoff_base_ms;
        }
        if let Some(mode) = overrides.mode {
            self.mode = mode;
        }
        if let Some(address) = overrides.target_address {
            self.target_address = address;
        }
        if let Some(tag) = overrides.tag {
            self.tag = tag;
        }
        if let Some(message) = overrides.message {
            self.message = message;
        }
        self.instances = overrides.instances.unwrap_or(self.instances);
        self.bundle_size = overrides.bundle_size.unwrap_or(self.bundle_size);
        self.cycle_length = overrides.cycle_length.unwrap_or(self.cycle_length);
        self.security = overrides.security.unwrap_or(self.security);
        self.mwm = overrides.mwm.unwrap_or(self.mwm);
        self.depth = overrides.depth.unwrap_or(self.depth);
    }

    /// Checks everything that can be checked without building bundles.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &str, reason: String| ConfigError::InvalidValue {
            field: field.to_string(),
            reason,
        };

        self.node_endpoints()?;
        self.pow_endpoint()?;
        if self.instances == 0 {
            return Err(invalid("instances", "must be at least 1".to_string()));
        }
        if self.bundle_size == 0 {
            return Err(invalid("bundle_size", "must be at least 1".to_string()));
        }
        self.security_level()?;
        if self.tag.len() > TAG_LEN {
            return Err(invalid("tag", format!("at most {} bytes", TAG_LEN)));
        }
        Address::parse(&self.target_address)
            .map_err(|e| invalid("target_address", e.to_string()))?;
        if self.mode.parse::<SpamMode>() == Ok(SpamMode::Conflicting) && self.cycle_length < 2 {
            return Err(invalid("cycle_length", "needs at least 2 addresses".to_string()));
        }
        if let Some(seed) = &self.seed {
            Seed::parse(seed).map_err(|e| invalid("seed", e.to_string()))?;
        }
        if self.static_balance == 0 {
            return Err(invalid("static_balance", "must be at least 1".to_string()));
        }
        if self.conflict_value == 0 {
            return Err(invalid("conflict_value", "must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn node_endpoints(&self) -> Result<Vec<NodeEndpoint>, ConfigError> {
        if self.nodes.is_empty() {
            return Err(ConfigError::MissingField {
                field: "nodes".to_string(),
            });
        }
        self.nodes
            .iter()
            .map(|url| NodeEndpoint::new(url, self.request_timeout_secs))
            .collect()
    }

    pub fn pow_endpoint(&self) -> Result<Option<NodeEndpoint>, ConfigError> {
        self.pow_node
            .as_deref()
            .map(|url| NodeEndpoint::new(url, self.request_timeout_secs))
            .transpose()
    }

    pub fn spam_mode(&self) -> SpamMode {
        SpamMode::parse_lenient(&self.mode)
    }

    pub fn security_level(&self) -> Result<SecurityLevel, ConfigError> {
        SecurityLevel::try_from(self.security).map_err(|e| ConfigError::InvalidValue {
            field: "security".to_string(),
            reason: e.to_string(),
        })
    }

    /// The configured seed, or a throwaway one when the file has none.
    pub fn resolve_seed(&mut self) -> Result<Seed, ConfigError> {
        match &self.seed {
            Some(hex) => Seed::parse(hex).map_err(|e| ConfigError::InvalidValue {
                field: "seed".to_string(),
                reason: e.to_string(),
            }),
            None => {
                warn!(target: "spam", "No seed configured; using a new seed for this run only");
                let seed = Seed::generate();
                self.seed = Some(seed.to_hex().to_string());
                Ok(seed)
            }
        }
    }

    pub fn supply_params(&self, seed: Seed) -> Result<SupplyParams, ConfigError> {
        Ok(SupplyParams {
            bundle_size: self.bundle_size,
            cycle_length: self.cycle_length,
            security: self.security_level()?,
            target: self.target_address.clone(),
            tag: self.tag.clone(),
            message: self.message.clone(),
            seed,
            static_balance: self.static_balance,
            conflict_value: self.conflict_value,
            timestamp: None,
        })
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            depth: self.depth,
            mwm: self.mwm,
            loop_config: LoopConfig {
                stop_after: self.stop_after,
                backoff_base_ms: self.backoff_base_ms,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_is_created_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config").join("spammer.toml");

        let (created, was_created) =
            SpammerConfig::load_or_create(&path, ConfigOverrides::default()).unwrap();
        assert!(was_created);
        assert!(path.exists());
        let seed = created.seed.clone().unwrap();
        assert_eq!(seed.len(), 64);

        let (loaded, was_created) =
            SpammerConfig::load_or_create(&path, ConfigOverrides::default()).unwrap();
        assert!(!was_created);
        assert_eq!(loaded, created);
    }

    #[test]
    fn test_created_file_keeps_cli_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("spammer.toml");
        let seed = "ab".repeat(32);

        let (mut config, was_created) = SpammerConfig::load_or_create(
            &path,
            ConfigOverrides {
                seed: Some(seed.clone()),
                mode: Some("conflicting".to_string()),
                cycle_length: Some(3),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(was_created);
        assert_eq!(config.resolve_seed().unwrap().to_hex().as_str(), seed);

        let persisted = SpammerConfig::from_path(&path).unwrap();
        assert_eq!(persisted.seed.as_deref(), Some(seed.as_str()));
        assert_eq!(persisted.spam_mode(), SpamMode::Conflicting);
        assert_eq!(persisted.cycle_length, 3);
        assert_eq!(persisted, config);
    }

    #[test]
    fn test_invalid_overrides_write_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("spammer.toml");

        let result = SpammerConfig::load_or_create(
            &path,
            ConfigOverrides {
                security: Some(7),
                ..Default::default()
            },
        );
        assert!(result.is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("spammer.toml");
        fs::write(&path, "mode = \"conflicting\"\ncycle_length = 5\n").unwrap();

        let config = SpammerConfig::from_path(&path).unwrap();
        assert_eq!(config.spam_mode(), SpamMode::Conflicting);
        assert_eq!(config.cycle_length, 5);
        assert_eq!(config.instances, 6);
        assert_eq!(config.mwm, 14);
        assert!(config.seed.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("spammer.toml");
        fs::write(&path, "instances = \"many\"").unwrap();

        assert!(matches!(
            SpammerConfig::from_path(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_cli_overrides_win() {
        let mut config = SpammerConfig::default();
        config.apply(ConfigOverrides {
            nodes: vec!["http://a:14265".to_string(), "http://b:14265".to_string()],
            mode: Some("static".to_string()),
            security: Some(3),
            stop_after: Some(10),
            ..Default::default()
        });

        assert_eq!(config.node_endpoints().unwrap().len(), 2);
        assert_eq!(config.spam_mode(), SpamMode::Static);
        assert_eq!(config.security_level().unwrap(), SecurityLevel::High);
        assert_eq!(config.worker_settings().loop_config.stop_after, Some(10));
        assert_eq!(config.bundle_size, 4);
        assert!(config.tag.len() <= TAG_LEN);
    }

    #[test]
    fn test_validation_errors() {
        let config = SpammerConfig {
            security: 4,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "security"
        ));

        let config = SpammerConfig {
            nodes: vec!["localhost:14265".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidNodeUrl { .. })
        ));

        let config = SpammerConfig {
            mode: "conflicting".to_string(),
            cycle_length: 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        for (field, config) in [
            (
                "static_balance",
                SpammerConfig {
                    mode: "static".to_string(),
                    static_balance: 0,
                    ..Default::default()
                },
            ),
            (
                "conflict_value",
                SpammerConfig {
                    mode: "conflicting".to_string(),
                    conflict_value: 0,
                    ..Default::default()
                },
            ),
        ] {
            assert!(matches!(
                config.validate(),
                Err(ConfigError::InvalidValue { field: ref f, .. }) if f == field
            ));
        }
    }

    #[test]
    fn test_resolve_seed() {
        let mut config = SpammerConfig {
            seed: Some(String::new()),
            ..Default::default()
        };
        assert!(config.resolve_seed().is_err());

        let mut config = SpammerConfig::default();
        let seed = config.resolve_seed().unwrap();
        assert_eq!(config.seed.as_deref(), Some(seed.to_hex().as_str()));
    }
}
