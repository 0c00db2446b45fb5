//! Precomputed bundle pool shared by every submission worker.

use crate::bundle::SignedBundle;
use crate::crypto::SigningScheme;
use crate::error::ProviderError;
use crate::supply::{SpamMode, SupplyParams};
use rand::Rng;
use std::sync::OnceLock;
use tracing::info;

/// Holds the bundle pool behind a one-shot barrier.
///
/// The pool is written exactly once by [`BundleProvider::init`] (or
/// [`BundleProvider::install`]) and is read-only afterwards. Reads before
/// that point return [`ProviderError::NotReady`].
#[derive(Debug, Default)]
pub struct BundleProvider {
    pool: OnceLock<Vec<SignedBundle>>,
}

impl BundleProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the pool for `mode` and marks the provider ready.
    pub fn init(
        &self,
        mode: SpamMode,
        scheme: &dyn SigningScheme,
        params: &SupplyParams,
    ) -> Result<usize, ProviderError> {
        if self.is_ready() {
            return Err(ProviderError::AlreadyInitialized);
        }
        let supply = mode.supply();
        let pool = supply.build_pool(scheme, params)?;
        info!(
            target: "spam",
            "Bundle pool ready: mode={} bundles={} security={}",
            supply.name(),
            pool.len(),
            params.security
        );
        self.install(pool)
    }

    pub fn install(&self, pool: Vec<SignedBundle>) -> Result<usize, ProviderError> {
        if pool.is_empty() {
            return Err(ProviderError::EmptyPool);
        }
        let len = pool.len();
        self.pool
            .set(pool)
            .map_err(|_| ProviderError::AlreadyInitialized)?;
        Ok(len)
    }

    pub fn is_ready(&self) -> bool {
        self.pool.get().is_some()
    }

    pub fn len(&self) -> usize {
        self.pool.get().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bundles(&self) -> Result<&[SignedBundle], ProviderError> {
        self.pool
            .get()
            .map(Vec::as_slice)
            .ok_or(ProviderError::NotReady)
    }

    /// One bundle per call, uniformly at random across the pool.
    pub fn get_next_bundle<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
    ) -> Result<&SignedBundle, ProviderError> {
        let pool = self.pool.get().ok_or(ProviderError::NotReady)?;
        match pool.len() {
            0 => Err(ProviderError::EmptyPool),
            1 => Ok(&pool[0]),
            len => Ok(&pool[rng.gen_range(0..len)]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::{prepare_transfers, BundleRequest, Transfer};
    use crate::crypto::{Address, Seed, WinternitzSha256, HASH_LEN};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn zero_value_pool(size: u8) -> Vec<SignedBundle> {
        let seed = Seed::parse(&"01".repeat(32)).unwrap();
        (0..size)
            .map(|i| {
                prepare_transfers(
                    &WinternitzSha256,
                    &seed,
                    BundleRequest {
                        transfers: vec![Transfer::new(
                            Address::from_hash([i; HASH_LEN]).to_string(),
                            0,
                        )],
                        timestamp: Some(1_700_000_000),
                        ..Default::default()
                    },
                )
                .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_not_ready_before_init() {
        let provider = BundleProvider::new();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(!provider.is_ready());
        assert_eq!(
            provider.get_next_bundle(&mut rng).unwrap_err(),
            ProviderError::NotReady
        );
        assert_eq!(provider.bundles().unwrap_err(), ProviderError::NotReady);
    }

    #[test]
    fn test_single_bundle_always_returned() {
        let provider = BundleProvider::new();
        provider.install(zero_value_pool(1)).unwrap();
        let mut rng = StdRng::seed_from_u64(7);

        let first = *provider.get_next_bundle(&mut rng).unwrap().hash();
        for _ in 0..100 {
            assert_eq!(provider.get_next_bundle(&mut rng).unwrap().hash(), &first);
        }
    }

    #[test]
    fn test_selection_is_uniform() {
        let provider = BundleProvider::new();
        provider.install(zero_value_pool(5)).unwrap();
        let mut rng = StdRng::seed_from_u64(42);

        let calls = 100_000;
        let mut counts: HashMap<[u8; HASH_LEN], usize> = HashMap::new();
        for _ in 0..calls {
            let bundle = provider.get_next_bundle(&mut rng).unwrap();
            *counts.entry(*bundle.hash()).or_default() += 1;
        }

        assert_eq!(counts.len(), 5);
        let expected = calls / 5;
        let tolerance = expected / 20;
        for count in counts.values() {
            assert!(
                count.abs_diff(expected) <= tolerance,
                "count {} outside {}±{}",
                count,
                expected,
                tolerance
            );
        }
    }

    #[test]
    fn test_barrier_is_one_shot() {
        let provider = BundleProvider::new();
        assert_eq!(provider.install(Vec::new()).unwrap_err(), ProviderError::EmptyPool);
        assert_eq!(provider.install(zero_value_pool(2)).unwrap(), 2);
        assert_eq!(
            provider.install(zero_value_pool(1)).unwrap_err(),
            ProviderError::AlreadyInitialized
        );
        assert_eq!(provider.len(), 2);
    }

    #[test]
    fn test_init_surfaces_supply_errors() {
        let provider = BundleProvider::new();
        let params = SupplyParams {
            bundle_size: 0,
            cycle_length: 2,
            security: Default::default(),
            target: Address::from_hash([3; HASH_LEN]).to_string(),
            tag: String::new(),
            message: String::new(),
            seed: Seed::parse(&"02".repeat(32)).unwrap(),
            static_balance: 1,
            conflict_value: 1,
            timestamp: Some(1),
        };

        let err = provider
            .init(SpamMode::ZeroValue, &WinternitzSha256, &params)
            .unwrap_err();
        assert!(matches!(err, ProviderError::Supply(_)));
        assert!(!provider.is_ready());

        let params = SupplyParams {
            bundle_size: 2,
            ..params
        };
        assert_eq!(
            provider
                .init(SpamMode::ZeroValue, &WinternitzSha256, &params)
                .unwrap(),
            1
        );
        assert!(provider.is_ready());
    }
}
