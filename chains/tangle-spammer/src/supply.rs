//! Bundle supply strategies.
//!
//! Each strategy precomputes the whole pool once at startup. A strategy
//! either returns every bundle or an error; there is no partial pool.

use crate::bundle::{prepare_transfers, BundleRequest, Input, SignedBundle, Transfer};
use crate::crypto::{Address, SecurityLevel, Seed, SigningScheme};
use crate::error::BundleError;
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

/// Balance each static-mode input claims and moves to itself.
pub const DEFAULT_STATIC_BALANCE: u64 = 142_650_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpamMode {
    #[default]
    ZeroValue,
    Static,
    Conflicting,
}

impl SpamMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpamMode::ZeroValue => "0value",
            SpamMode::Static => "static",
            SpamMode::Conflicting => "conflicting",
        }
    }

    /// Unknown names fall back to zero-value spam with a warning.
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or_else(|_| {
            warn!(target: "spam", "Unknown spam mode '{}', spamming 0value", s);
            SpamMode::ZeroValue
        })
    }

    pub fn supply(&self) -> Box<dyn BundleSupply> {
        match self {
            SpamMode::ZeroValue => Box::new(ZeroValueSupply),
            SpamMode::Static => Box::new(StaticValueSupply),
            SpamMode::Conflicting => Box::new(ConflictingCycleSupply),
        }
    }
}

impl FromStr for SpamMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "0value" => Ok(SpamMode::ZeroValue),
            "static" => Ok(SpamMode::Static),
            "conflicting" => Ok(SpamMode::Conflicting),
            other => Err(format!("unknown spam mode '{}'", other)),
        }
    }
}

impl fmt::Display for SpamMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs shared by every strategy.
#[derive(Debug, Clone)]
pub struct SupplyParams {
    /// Minimum transactions per bundle.
    pub bundle_size: usize,
    pub cycle_length: usize,
    pub security: SecurityLevel,
    /// Receiver of zero-value transfers and padding.
    pub target: String,
    pub tag: String,
    pub message: String,
    pub seed: Seed,
    pub static_balance: u64,
    pub conflict_value: u64,
    /// Fixed bundle timestamp; now when unset.
    pub timestamp: Option<u64>,
}

pub trait BundleSupply: Send + Sync {
    fn name(&self) -> &'static str;

    fn build_pool(
        &self,
        scheme: &dyn SigningScheme,
        params: &SupplyParams,
    ) -> Result<Vec<SignedBundle>, BundleError>;
}

/// One bundle of `bundle_size` zero-value transfers to the target.
pub struct ZeroValueSupply;

impl BundleSupply for ZeroValueSupply {
    fn name(&self) -> &'static str {
        "0value"
    }

    fn build_pool(
        &self,
        scheme: &dyn SigningScheme,
        params: &SupplyParams,
    ) -> Result<Vec<SignedBundle>, BundleError> {
        let transfers = (0..params.bundle_size)
            .map(|_| {
                Transfer::new(params.target.clone(), 0)
                    .with_tag(&params.tag)
                    .with_message(&params.message)
            })
            .collect();

        let bundle = prepare_transfers(
            scheme,
            &params.seed,
            BundleRequest {
                transfers,
                inputs: Vec::new(),
                remainder: None,
                timestamp: params.timestamp,
            },
        )?;
        Ok(vec![bundle])
    }
}

/// One bundle where each fresh address spends its nominal balance to
/// itself. Enough inputs are used that outputs plus signature slots reach
/// `bundle_size`.
pub struct StaticValueSupply;

impl StaticValueSupply {
    pub fn spend_count(bundle_size: usize, security: SecurityLevel) -> usize {
        bundle_size.div_ceil(security.fragments() + 1)
    }
}

impl BundleSupply for StaticValueSupply {
    fn name(&self) -> &'static str {
        "static"
    }

    fn build_pool(
        &self,
        scheme: &dyn SigningScheme,
        params: &SupplyParams,
    ) -> Result<Vec<SignedBundle>, BundleError> {
        let spend_count = Self::spend_count(params.bundle_size, params.security);
        let mut transfers = Vec::with_capacity(spend_count);
        let mut inputs = Vec::with_capacity(spend_count);

        for key_index in 0..spend_count as u64 {
            let address = scheme
                .derive_address(&params.seed, key_index, params.security)?
                .to_string();
            transfers.push(
                Transfer::new(address.clone(), params.static_balance)
                    .with_tag(&params.tag)
                    .with_message(&params.message),
            );
            inputs.push(Input {
                address,
                key_index,
                security: params.security,
                balance: params.static_balance,
            });
        }

        let bundle = prepare_transfers(
            scheme,
            &params.seed,
            BundleRequest {
                transfers,
                inputs,
                remainder: None,
                timestamp: params.timestamp,
            },
        )?;
        Ok(vec![bundle])
    }
}

/// `cycle_length` bundles where address i sends `conflict_value` to
/// address (i + 1) mod C. Broadcast together they double-spend around the
/// cycle.
pub struct ConflictingCycleSupply;

impl ConflictingCycleSupply {
    pub fn cycle_addresses(
        scheme: &dyn SigningScheme,
        params: &SupplyParams,
    ) -> Result<Vec<Address>, BundleError> {
        if params.cycle_length < 2 {
            return Err(BundleError::InvalidCycleLength {
                length: params.cycle_length,
            });
        }
        (0..params.cycle_length as u64)
            .map(|key_index| scheme.derive_address(&params.seed, key_index, params.security))
            .collect()
    }
}

impl BundleSupply for ConflictingCycleSupply {
    fn name(&self) -> &'static str {
        "conflicting"
    }

    fn build_pool(
        &self,
        scheme: &dyn SigningScheme,
        params: &SupplyParams,
    ) -> Result<Vec<SignedBundle>, BundleError> {
        let addresses = Self::cycle_addresses(scheme, params)?;
        info!(target: "spam", "Addresses used for conflicting spam:");
        for address in &addresses {
            info!(target: "spam", "  {}", address);
        }

        let padding = params
            .bundle_size
            .saturating_sub(params.security.fragments() + 1);
        let cycle = addresses.len();

        let mut pool = Vec::with_capacity(cycle);
        for (i, from) in addresses.iter().enumerate() {
            let to = addresses[(i + 1) % cycle];
            let mut transfers = vec![Transfer::new(to.to_string(), params.conflict_value)
                .with_tag(&params.tag)
                .with_message(&params.message)];
            transfers.extend(
                (0..padding).map(|_| Transfer::new(params.target.clone(), 0).with_tag(&params.tag)),
            );

            pool.push(prepare_transfers(
                scheme,
                &params.seed,
                BundleRequest {
                    transfers,
                    inputs: vec![Input {
                        address: from.to_string(),
                        key_index: i as u64,
                        security: params.security,
                        balance: params.conflict_value,
                    }],
                    remainder: None,
                    timestamp: params.timestamp,
                },
            )?);
        }
        Ok(pool)
    }
}
