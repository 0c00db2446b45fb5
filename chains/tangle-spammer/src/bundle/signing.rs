use super::{FinalizedBundle, Input};
use crate::crypto::{Seed, SigningScheme};
use crate::error::BundleError;

/// Produces every signature fragment for a finalized bundle.
///
/// All fragments are computed before anything is written back, so a failure
/// on any input leaves the bundle untouched.
pub struct SignatureEngine<'a> {
    scheme: &'a dyn SigningScheme,
}

impl<'a> SignatureEngine<'a> {
    pub fn new(scheme: &'a dyn SigningScheme) -> Self {
        Self { scheme }
    }

    /// Returns fragments in slot order: inputs in request order, each
    /// contributing `security` fragments.
    pub fn sign(
        &self,
        seed: &Seed,
        bundle: &FinalizedBundle,
        inputs: &[Input],
    ) -> Result<Vec<Vec<u8>>, BundleError> {
        let normalized = bundle.normalized_hash();
        let mut fragments = Vec::with_capacity(bundle.reserved_slots());

        for input in inputs {
            let subkey = self.scheme.derive_subkey(seed, input.key_index)?;
            let key = self.scheme.derive_key(&subkey, input.security)?;

            for index in 0..input.security.fragments() {
                let key_fragment = key.fragment(index).ok_or_else(|| BundleError::KeyDerivation {
                    key_index: input.key_index,
                    reason: format!(
                        "key has {} fragments, security {} needs {}",
                        key.fragment_count(),
                        input.security,
                        input.security.fragments()
                    ),
                })?;
                fragments.push(self.scheme.sign_fragment(normalized.chunk(index), key_fragment)?);
            }
        }

        if fragments.len() != bundle.reserved_slots() {
            return Err(BundleError::FragmentCountMismatch {
                expected: bundle.reserved_slots(),
                actual: fragments.len(),
            });
        }
        Ok(fragments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::{prepare_transfers, BundleBuilder, BundleRequest, Transfer};
    use crate::crypto::{
        Address, Hash, NormalizedHash, PrivateKey, SecurityLevel, Seed, Subkey, WinternitzSha256,
        HASH_LEN,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn seed() -> Seed {
        Seed::parse(&"42".repeat(32)).unwrap()
    }

    fn input_at(scheme: &WinternitzSha256, key_index: u64, security: SecurityLevel, balance: u64) -> Input {
        Input {
            address: scheme
                .derive_address(&seed(), key_index, security)
                .unwrap()
                .to_string(),
            key_index,
            security,
            balance,
        }
    }

    fn two_input_request(scheme: &WinternitzSha256) -> BundleRequest {
        BundleRequest {
            transfers: vec![Transfer::new(Address::from_hash([5; HASH_LEN]).to_string(), 12)],
            inputs: vec![
                input_at(scheme, 0, SecurityLevel::Medium, 8),
                input_at(scheme, 1, SecurityLevel::High, 4),
            ],
            remainder: None,
            timestamp: Some(1_650_000_000),
        }
    }

    #[test]
    fn test_fragments_recover_each_input_address() {
        let scheme = WinternitzSha256;
        let request = two_input_request(&scheme);
        let finalized = BundleBuilder::new(&scheme).build(&request).unwrap();

        let fragments = SignatureEngine::new(&scheme)
            .sign(&seed(), &finalized, &request.inputs)
            .unwrap();
        assert_eq!(fragments.len(), 2 + 3);

        let normalized = finalized.normalized_hash();
        assert_eq!(
            scheme.recover_address(normalized, &fragments[..2]).unwrap(),
            Address::parse(&request.inputs[0].address).unwrap()
        );
        assert_eq!(
            scheme.recover_address(normalized, &fragments[2..]).unwrap(),
            Address::parse(&request.inputs[1].address).unwrap()
        );
    }

    #[test]
    fn test_splice_keeps_transaction_count() {
        let scheme = WinternitzSha256;
        let request = two_input_request(&scheme);
        let finalized = BundleBuilder::new(&scheme).build(&request).unwrap();
        let count = finalized.transactions().len();
        let hash = *finalized.hash();

        let fragments = SignatureEngine::new(&scheme)
            .sign(&seed(), &finalized, &request.inputs)
            .unwrap();
        let expected_first = fragments[0].clone();
        let signed = finalized.into_signed(fragments).unwrap();

        assert_eq!(signed.len(), count);
        assert_eq!(signed.hash(), &hash);
        assert_eq!(signed.transactions()[1].signature_message_fragment, expected_first);
        assert_eq!(signed.value_sum(), 0);
    }

    #[test]
    fn test_fragment_count_mismatch() {
        let scheme = WinternitzSha256;
        let request = two_input_request(&scheme);
        let finalized = BundleBuilder::new(&scheme).build(&request).unwrap();

        // one input left out of the signing pass
        let err = SignatureEngine::new(&scheme)
            .sign(&seed(), &finalized, &request.inputs[..1])
            .unwrap_err();
        assert_eq!(
            err,
            BundleError::FragmentCountMismatch {
                expected: 5,
                actual: 2
            }
        );
    }

    /// Delegates to the real scheme, counting key derivations and failing
    /// on a chosen key index.
    struct ProbeScheme {
        inner: WinternitzSha256,
        fail_on: Option<u64>,
        derivations: AtomicUsize,
    }

    impl ProbeScheme {
        fn new(fail_on: Option<u64>) -> Self {
            Self {
                inner: WinternitzSha256,
                fail_on,
                derivations: AtomicUsize::new(0),
            }
        }
    }

    impl SigningScheme for ProbeScheme {
        fn derive_subkey(&self, seed: &Seed, key_index: u64) -> Result<Subkey, BundleError> {
            self.derivations.fetch_add(1, Ordering::SeqCst);
            if self.fail_on == Some(key_index) {
                return Err(BundleError::KeyDerivation {
                    key_index,
                    reason: "probe".to_string(),
                });
            }
            self.inner.derive_subkey(seed, key_index)
        }

        fn derive_key(&self, subkey: &Subkey, security: SecurityLevel) -> Result<PrivateKey, BundleError> {
            self.inner.derive_key(subkey, security)
        }

        fn normalize_hash(&self, hash: &Hash) -> NormalizedHash {
            self.inner.normalize_hash(hash)
        }

        fn sign_fragment(&self, chunk: &[u8], key_fragment: &[u8]) -> Result<Vec<u8>, BundleError> {
            self.inner.sign_fragment(chunk, key_fragment)
        }

        fn derive_address(
            &self,
            seed: &Seed,
            key_index: u64,
            security: SecurityLevel,
        ) -> Result<Address, BundleError> {
            self.inner.derive_address(seed, key_index, security)
        }
    }

    #[test]
    fn test_failure_on_any_input_aborts() {
        let scheme = ProbeScheme::new(Some(1));
        let request = two_input_request(&WinternitzSha256);

        let err = prepare_transfers(&scheme, &seed(), request).unwrap_err();
        assert!(matches!(err, BundleError::KeyDerivation { key_index: 1, .. }));
    }

    #[test]
    fn test_insufficient_balance_never_signs() {
        let scheme = ProbeScheme::new(None);
        let mut request = two_input_request(&WinternitzSha256);
        request.transfers[0].value = 100;

        let err = prepare_transfers(&scheme, &seed(), request).unwrap_err();
        assert!(matches!(err, BundleError::InsufficientBalance { .. }));
        assert_eq!(scheme.derivations.load(Ordering::SeqCst), 0);
    }
}
