//! Bundles: ordered transaction groups whose values sum to zero.
//!
//! Construction goes through three type states so a half-signed bundle can
//! never escape:
//!
//! 1. [`BundleBuilder::build`] validates transfers and inputs, lays out the
//!    transactions and finalizes the bundle hash → [`FinalizedBundle`]
//! 2. [`SignatureEngine::sign`] produces every signature fragment up front
//! 3. [`FinalizedBundle::into_signed`] consumes the finalized bundle and
//!    splices the fragments in → [`SignedBundle`]
//!
//! [`prepare_transfers`] runs all three.

mod builder;
mod signing;

pub use builder::BundleBuilder;
pub use signing::SignatureEngine;

use crate::crypto::{
    Address, Hash, NormalizedHash, Seed, SecurityLevel, SigningScheme, FRAGMENT_LEN, HASH_LEN,
};
use crate::error::BundleError;
use std::fmt;

pub const TAG_LEN: usize = 16;
pub const NONCE_LEN: usize = 16;
pub const TRANSACTION_LEN: usize =
    FRAGMENT_LEN + HASH_LEN + 8 + TAG_LEN + 3 * 8 + 3 * HASH_LEN + TAG_LEN + 3 * 8 + NONCE_LEN;

#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Tag([u8; TAG_LEN]);

impl Tag {
    pub fn parse(s: &str) -> Result<Self, BundleError> {
        let bytes = s.as_bytes();
        if bytes.len() > TAG_LEN {
            return Err(BundleError::InvalidTag {
                tag: s.to_string(),
                max: TAG_LEN,
            });
        }
        let mut tag = [0u8; TAG_LEN];
        tag[..bytes.len()].copy_from_slice(bytes);
        Ok(Self(tag))
    }

    pub fn as_bytes(&self) -> &[u8; TAG_LEN] {
        &self.0
    }

    /// Little-endian increment, wrapping.
    fn increment(&mut self) {
        for byte in self.0.iter_mut() {
            let (next, carry) = byte.overflowing_add(1);
            *byte = next;
            if !carry {
                break;
            }
        }
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let end = self.0.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        write!(f, "Tag({:?})", String::from_utf8_lossy(&self.0[..end]))
    }
}

/// A desired outgoing payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub address: String,
    pub value: u64,
    pub tag: String,
    pub message: String,
}

impl Transfer {
    pub fn new(address: impl Into<String>, value: u64) -> Self {
        Self {
            address: address.into(),
            value,
            tag: String::new(),
            message: String::new(),
        }
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tag = tag.to_string();
        self
    }

    pub fn with_message(mut self, message: &str) -> Self {
        self.message = message.to_string();
        self
    }
}

/// A spending source owned by the seed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Input {
    pub address: String,
    pub key_index: u64,
    pub security: SecurityLevel,
    pub balance: u64,
}

/// One line item before layout. Expands to `length` transactions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleEntry {
    pub address: Address,
    pub value: i64,
    pub length: usize,
    pub timestamp: u64,
    pub tag: Tag,
    pub message: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct BundleRequest {
    pub transfers: Vec<Transfer>,
    pub inputs: Vec<Input>,
    /// Receives `inputs - outputs` when positive.
    pub remainder: Option<Address>,
    /// Seconds since the epoch; now when unset.
    pub timestamp: Option<u64>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct Transaction {
    pub signature_message_fragment: Vec<u8>,
    pub address: Address,
    pub value: i64,
    pub obsolete_tag: Tag,
    pub timestamp: u64,
    pub current_index: u64,
    pub last_index: u64,
    pub bundle: Hash,
    pub trunk: Hash,
    pub branch: Hash,
    pub tag: Tag,
    pub attachment_timestamp: u64,
    pub attachment_timestamp_lower: u64,
    pub attachment_timestamp_upper: u64,
    pub nonce: [u8; NONCE_LEN],
}

impl Transaction {
    fn from_entry(entry: &BundleEntry, slot: usize) -> Self {
        let mut fragment = vec![0u8; FRAGMENT_LEN];
        if slot == 0 {
            fragment[..entry.message.len()].copy_from_slice(&entry.message);
        }
        Self {
            signature_message_fragment: fragment,
            address: entry.address,
            value: if slot == 0 { entry.value } else { 0 },
            obsolete_tag: entry.tag,
            timestamp: entry.timestamp,
            current_index: 0,
            last_index: 0,
            bundle: [0u8; HASH_LEN],
            trunk: [0u8; HASH_LEN],
            branch: [0u8; HASH_LEN],
            tag: entry.tag,
            attachment_timestamp: 0,
            attachment_timestamp_lower: 0,
            attachment_timestamp_upper: 0,
            nonce: [0u8; NONCE_LEN],
        }
    }

    /// Fields covered by the bundle hash. Fragments are not.
    pub fn essence(&self) -> Vec<u8> {
        let mut essence = Vec::with_capacity(HASH_LEN + 8 + TAG_LEN + 3 * 8);
        essence.extend_from_slice(self.address.as_bytes());
        essence.extend_from_slice(&self.value.to_le_bytes());
        essence.extend_from_slice(self.obsolete_tag.as_bytes());
        essence.extend_from_slice(&self.timestamp.to_le_bytes());
        essence.extend_from_slice(&self.current_index.to_le_bytes());
        essence.extend_from_slice(&self.last_index.to_le_bytes());
        essence
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(TRANSACTION_LEN);
        bytes.extend_from_slice(&self.signature_message_fragment);
        bytes.extend_from_slice(&self.essence());
        bytes.extend_from_slice(&self.bundle);
        bytes.extend_from_slice(&self.trunk);
        bytes.extend_from_slice(&self.branch);
        bytes.extend_from_slice(self.tag.as_bytes());
        bytes.extend_from_slice(&self.attachment_timestamp.to_le_bytes());
        bytes.extend_from_slice(&self.attachment_timestamp_lower.to_le_bytes());
        bytes.extend_from_slice(&self.attachment_timestamp_upper.to_le_bytes());
        bytes.extend_from_slice(&self.nonce);
        bytes
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("address", &self.address)
            .field("value", &self.value)
            .field("current_index", &self.current_index)
            .field("last_index", &self.last_index)
            .field("bundle", &hex::encode(&self.bundle[..6]))
            .finish_non_exhaustive()
    }
}

/// Hashed, laid-out bundle waiting for its signature fragments.
#[derive(Debug, Clone)]
pub struct FinalizedBundle {
    transactions: Vec<Transaction>,
    hash: Hash,
    normalized: NormalizedHash,
    /// Index of the first input transaction. Outputs are laid out first.
    first_input: Option<usize>,
    reserved_slots: usize,
}

impl FinalizedBundle {
    pub fn hash(&self) -> &Hash {
        &self.hash
    }

    pub fn normalized_hash(&self) -> &NormalizedHash {
        &self.normalized
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Transaction slots held by inputs, one per signature fragment.
    pub fn reserved_slots(&self) -> usize {
        self.reserved_slots
    }

    /// Writes `fragments` into consecutive slots from the first input on.
    pub fn into_signed(mut self, fragments: Vec<Vec<u8>>) -> Result<SignedBundle, BundleError> {
        if fragments.len() != self.reserved_slots {
            return Err(BundleError::FragmentCountMismatch {
                expected: self.reserved_slots,
                actual: fragments.len(),
            });
        }
        if let Some(bad) = fragments.iter().find(|f| f.len() != FRAGMENT_LEN) {
            return Err(BundleError::Signing {
                reason: format!("fragment has {} bytes, expected {}", bad.len(), FRAGMENT_LEN),
            });
        }

        if !fragments.is_empty() {
            let start = self
                .first_input
                .filter(|start| start + fragments.len() <= self.transactions.len())
                .ok_or_else(|| BundleError::Signing {
                    reason: format!(
                        "no room for {} fragments in a bundle of {} transactions",
                        fragments.len(),
                        self.transactions.len()
                    ),
                })?;
            for (slot, fragment) in self.transactions[start..].iter_mut().zip(fragments) {
                slot.signature_message_fragment = fragment;
            }
        }

        let payloads = self
            .transactions
            .iter()
            .map(|tx| hex::encode(tx.to_bytes()))
            .collect();

        Ok(SignedBundle {
            transactions: self.transactions,
            hash: self.hash,
            payloads,
        })
    }
}

/// Signed bundle ready for attachment. Immutable; shared by every worker.
#[derive(Debug, Clone)]
pub struct SignedBundle {
    transactions: Vec<Transaction>,
    hash: Hash,
    payloads: Vec<String>,
}

impl SignedBundle {
    pub fn hash(&self) -> &Hash {
        &self.hash
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Hex-encoded transactions in ascending index order, as submitted.
    pub fn payloads(&self) -> &[String] {
        &self.payloads
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Addresses debited by this bundle, in input order.
    pub fn spent_addresses(&self) -> Vec<Address> {
        self.transactions
            .iter()
            .filter(|tx| tx.value < 0)
            .map(|tx| tx.address)
            .collect()
    }

    pub fn value_sum(&self) -> i64 {
        self.transactions.iter().map(|tx| tx.value).sum()
    }
}

/// Builds, finalizes and signs a bundle in one step.
///
/// If inputs exceed outputs and `request.remainder` is unset, the surplus
/// goes to a fresh address at the next key index after the highest input.
pub fn prepare_transfers(
    scheme: &dyn SigningScheme,
    seed: &Seed,
    mut request: BundleRequest,
) -> Result<SignedBundle, BundleError> {
    let builder = BundleBuilder::new(scheme);
    let finalized = match builder.build(&request) {
        Err(BundleError::MissingRemainderAddress { .. }) => {
            let next_index = request
                .inputs
                .iter()
                .map(|input| input.key_index)
                .max()
                .map_or(0, |index| index + 1);
            let security = request
                .inputs
                .first()
                .map(|input| input.security)
                .unwrap_or_default();
            request.remainder = Some(scheme.derive_address(seed, next_index, security)?);
            builder.build(&request)?
        }
        other => other?,
    };

    let fragments = SignatureEngine::new(scheme).sign(seed, &finalized, &request.inputs)?;
    finalized.into_signed(fragments)
}
