//! Hash and signature primitives.
//!
//! The bundle engine only talks to [`SigningScheme`]. [`WinternitzSha256`] is
//! the scheme shipped with the spammer: a Winternitz one-time signature over
//! SHA-256 with three 16-digit chunks of normalized bundle hash, one chunk per
//! security level.

use crate::error::BundleError;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroizing;

pub const HASH_LEN: usize = 32;
pub const CHECKSUM_LEN: usize = 4;
pub const SEED_LEN: usize = 32;

/// Digits per normalized chunk, also key segments per key fragment.
pub const NORMALIZED_CHUNK_LEN: usize = 16;
pub const NORMALIZED_LEN: usize = NORMALIZED_CHUNK_LEN * 3;
/// A signature segment for this digit is the raw private-key segment.
pub const MAX_DIGIT: u8 = 15;
const CHUNK_TARGET_SUM: u32 = 120;

pub const SEGMENT_LEN: usize = HASH_LEN;
pub const KEY_FRAGMENT_LEN: usize = NORMALIZED_CHUNK_LEN * SEGMENT_LEN;
/// Signature or message bytes carried by one transaction.
pub const FRAGMENT_LEN: usize = KEY_FRAGMENT_LEN;

pub type Hash = [u8; HASH_LEN];

pub fn sha256(parts: &[&[u8]]) -> Hash {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

fn hash_chain(segment: &[u8], times: u8) -> Hash {
    let mut out = [0u8; HASH_LEN];
    out.copy_from_slice(segment);
    for _ in 0..times {
        out = sha256(&[&out[..]]);
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum SecurityLevel {
    Low = 1,
    #[default]
    Medium = 2,
    High = 3,
}

impl SecurityLevel {
    /// Signature fragments (and transaction slots) an input at this level needs.
    pub fn fragments(self) -> usize {
        self as usize
    }
}

impl TryFrom<u8> for SecurityLevel {
    type Error = BundleError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            1 => Ok(SecurityLevel::Low),
            2 => Ok(SecurityLevel::Medium),
            3 => Ok(SecurityLevel::High),
            _ => Err(BundleError::InvalidSecurityLevel { level }),
        }
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

/// Ledger address. Rendered as 64 hex chars of hash plus 8 of checksum.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(Hash);

impl Address {
    pub fn from_hash(hash: Hash) -> Self {
        Self(hash)
    }

    pub fn as_bytes(&self) -> &Hash {
        &self.0
    }

    pub fn checksum(&self) -> [u8; CHECKSUM_LEN] {
        let digest = sha256(&[&self.0[..]]);
        let mut checksum = [0u8; CHECKSUM_LEN];
        checksum.copy_from_slice(&digest[..CHECKSUM_LEN]);
        checksum
    }

    /// Accepts the bare 64-char hash or the 72-char checksummed form.
    pub fn parse(s: &str) -> Result<Self, BundleError> {
        let invalid = |reason: &str| BundleError::InvalidAddress {
            address: s.to_string(),
            reason: reason.to_string(),
        };

        let bytes = hex::decode(s.trim()).map_err(|e| invalid(&e.to_string()))?;
        match bytes.len() {
            HASH_LEN => {
                let mut hash = [0u8; HASH_LEN];
                hash.copy_from_slice(&bytes);
                Ok(Self(hash))
            }
            len if len == HASH_LEN + CHECKSUM_LEN => {
                let mut hash = [0u8; HASH_LEN];
                hash.copy_from_slice(&bytes[..HASH_LEN]);
                let address = Self(hash);
                if address.checksum()[..] != bytes[HASH_LEN..] {
                    return Err(invalid("checksum mismatch"));
                }
                Ok(address)
            }
            len => Err(invalid(&format!(
                "expected {} or {} bytes, got {}",
                HASH_LEN,
                HASH_LEN + CHECKSUM_LEN,
                len
            ))),
        }
    }

    /// Like [`Address::parse`] but the checksum is mandatory. Used for any
    /// address that moves value.
    pub fn parse_checked(s: &str) -> Result<Self, BundleError> {
        if s.trim().len() != 2 * (HASH_LEN + CHECKSUM_LEN) {
            return Err(BundleError::InvalidAddress {
                address: s.to_string(),
                reason: "value transfers require a checksummed address".to_string(),
            });
        }
        Self::parse(s)
    }
}

impl FromStr for Address {
    type Err = BundleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", hex::encode(self.0), hex::encode(self.checksum()))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({}..)", &hex::encode(self.0)[..12])
    }
}

/// Spending seed. Never printed.
#[derive(Clone)]
pub struct Seed(Zeroizing<[u8; SEED_LEN]>);

impl Seed {
    pub fn parse(s: &str) -> Result<Self, BundleError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(BundleError::EmptySeed);
        }
        let bytes = Zeroizing::new(hex::decode(s).map_err(|e| BundleError::InvalidSeed {
            reason: e.to_string(),
        })?);
        if bytes.len() != SEED_LEN {
            return Err(BundleError::InvalidSeed {
                reason: format!("expected {} bytes, got {}", SEED_LEN, bytes.len()),
            });
        }
        let mut seed = Zeroizing::new([0u8; SEED_LEN]);
        seed.copy_from_slice(&bytes);
        Ok(Self(seed))
    }

    pub fn generate() -> Self {
        let mut seed = Zeroizing::new([0u8; SEED_LEN]);
        rand::thread_rng().fill_bytes(&mut seed[..]);
        Self(seed)
    }

    pub fn as_bytes(&self) -> &[u8; SEED_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(&self.0[..]))
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Seed(***)")
    }
}

/// Per-key-index secret derived from the seed.
pub struct Subkey(Zeroizing<Hash>);

/// `security * 16` segments of [`SEGMENT_LEN`] bytes.
pub struct PrivateKey(Zeroizing<Vec<u8>>);

impl PrivateKey {
    pub fn fragment_count(&self) -> usize {
        self.0.len() / KEY_FRAGMENT_LEN
    }

    pub fn fragment(&self, index: usize) -> Option<&[u8]> {
        self.0
            .get(index * KEY_FRAGMENT_LEN..(index + 1) * KEY_FRAGMENT_LEN)
    }
}

/// Bundle hash as [`NORMALIZED_LEN`] digits in `0..=MAX_DIGIT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizedHash([u8; NORMALIZED_LEN]);

impl NormalizedHash {
    pub fn digits(&self) -> &[u8; NORMALIZED_LEN] {
        &self.0
    }

    /// Digits signed by the `index`-th fragment of an input.
    pub fn chunk(&self, index: usize) -> &[u8] {
        let index = index % (NORMALIZED_LEN / NORMALIZED_CHUNK_LEN);
        &self.0[index * NORMALIZED_CHUNK_LEN..(index + 1) * NORMALIZED_CHUNK_LEN]
    }

    /// True when signing would publish a raw private-key segment.
    pub fn is_insecure(&self) -> bool {
        self.0.contains(&MAX_DIGIT)
    }
}

/// Hash and one-time-signature primitives consumed by the bundle engine.
pub trait SigningScheme: Send + Sync {
    fn derive_subkey(&self, seed: &Seed, key_index: u64) -> Result<Subkey, BundleError>;

    fn derive_key(&self, subkey: &Subkey, security: SecurityLevel)
        -> Result<PrivateKey, BundleError>;

    fn normalize_hash(&self, hash: &Hash) -> NormalizedHash;

    /// Signs one normalized chunk with the matching key fragment.
    fn sign_fragment(
        &self,
        normalized_chunk: &[u8],
        key_fragment: &[u8],
    ) -> Result<Vec<u8>, BundleError>;

    fn derive_address(
        &self,
        seed: &Seed,
        key_index: u64,
        security: SecurityLevel,
    ) -> Result<Address, BundleError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WinternitzSha256;

impl WinternitzSha256 {
    fn fragment_digest<'a>(public_segments: impl Iterator<Item = Hash> + 'a) -> Hash {
        let mut hasher = Sha256::new();
        for segment in public_segments {
            hasher.update(segment);
        }
        hasher.finalize().into()
    }

    /// Rebuilds the signing address from an input's signature fragments.
    /// Equal to the input address iff every fragment is valid.
    pub fn recover_address(
        &self,
        normalized: &NormalizedHash,
        fragments: &[Vec<u8>],
    ) -> Result<Address, BundleError> {
        let mut hasher = Sha256::new();
        for (index, fragment) in fragments.iter().enumerate() {
            if fragment.len() != FRAGMENT_LEN {
                return Err(BundleError::Signing {
                    reason: format!("fragment {} has {} bytes", index, fragment.len()),
                });
            }
            let chunk = normalized.chunk(index);
            let digest = Self::fragment_digest(
                fragment
                    .chunks(SEGMENT_LEN)
                    .zip(chunk)
                    .map(|(segment, &digit)| hash_chain(segment, digit)),
            );
            hasher.update(digest);
        }
        Ok(Address(hasher.finalize().into()))
    }
}

impl SigningScheme for WinternitzSha256 {
    fn derive_subkey(&self, seed: &Seed, key_index: u64) -> Result<Subkey, BundleError> {
        Ok(Subkey(Zeroizing::new(sha256(&[
            &seed.as_bytes()[..],
            &key_index.to_le_bytes()[..],
        ]))))
    }

    fn derive_key(
        &self,
        subkey: &Subkey,
        security: SecurityLevel,
    ) -> Result<PrivateKey, BundleError> {
        let segments = security.fragments() * NORMALIZED_CHUNK_LEN;
        let mut key = Zeroizing::new(Vec::with_capacity(segments * SEGMENT_LEN));
        for j in 0..segments as u32 {
            key.extend_from_slice(&sha256(&[&subkey.0[..], &j.to_le_bytes()[..]]));
        }
        Ok(PrivateKey(key))
    }

    fn normalize_hash(&self, hash: &Hash) -> NormalizedHash {
        let mut digits = [0u8; NORMALIZED_LEN];
        for (i, digit) in digits.iter_mut().enumerate() {
            let byte = hash[i / 2];
            *digit = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };
        }

        for chunk in digits.chunks_mut(NORMALIZED_CHUNK_LEN) {
            let mut sum: u32 = chunk.iter().map(|&d| d as u32).sum();
            while sum > CHUNK_TARGET_SUM {
                if let Some(d) = chunk.iter_mut().find(|d| **d > 0) {
                    *d -= 1;
                    sum -= 1;
                }
            }
            while sum < CHUNK_TARGET_SUM {
                if let Some(d) = chunk.iter_mut().find(|d| **d < MAX_DIGIT) {
                    *d += 1;
                    sum += 1;
                }
            }
        }
        NormalizedHash(digits)
    }

    fn sign_fragment(
        &self,
        normalized_chunk: &[u8],
        key_fragment: &[u8],
    ) -> Result<Vec<u8>, BundleError> {
        if normalized_chunk.len() != NORMALIZED_CHUNK_LEN || key_fragment.len() != KEY_FRAGMENT_LEN
        {
            return Err(BundleError::Signing {
                reason: format!(
                    "chunk of {} digits against key fragment of {} bytes",
                    normalized_chunk.len(),
                    key_fragment.len()
                ),
            });
        }

        let mut fragment = Vec::with_capacity(FRAGMENT_LEN);
        for (segment, &digit) in key_fragment.chunks(SEGMENT_LEN).zip(normalized_chunk) {
            if digit > MAX_DIGIT {
                return Err(BundleError::Signing {
                    reason: format!("digit {} out of range", digit),
                });
            }
            fragment.extend_from_slice(&hash_chain(segment, MAX_DIGIT - digit));
        }
        Ok(fragment)
    }

    fn derive_address(
        &self,
        seed: &Seed,
        key_index: u64,
        security: SecurityLevel,
    ) -> Result<Address, BundleError> {
        let key = self.derive_key(&self.derive_subkey(seed, key_index)?, security)?;
        let mut hasher = Sha256::new();
        for index in 0..key.fragment_count() {
            let fragment = key.fragment(index).ok_or_else(|| BundleError::KeyDerivation {
                key_index,
                reason: format!("missing key fragment {}", index),
            })?;
            let digest = Self::fragment_digest(
                fragment
                    .chunks(SEGMENT_LEN)
                    .map(|segment| hash_chain(segment, MAX_DIGIT)),
            );
            hasher.update(digest);
        }
        Ok(Address(hasher.finalize().into()))
    }
}
