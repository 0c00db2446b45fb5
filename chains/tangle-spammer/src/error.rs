//! Error types for bundle construction and the bundle pool.

use thiserror::Error;

/// Everything that can stop a bundle from being built or signed.
///
/// All of these are fatal at startup: the pool is built once and the
/// provider cannot become ready without it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BundleError {
    #[error("Invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Invalid security level {level}: expected 1, 2 or 3")]
    InvalidSecurityLevel { level: u8 },

    #[error("Seed must not be empty")]
    EmptySeed,

    #[error("Invalid seed: {reason}")]
    InvalidSeed { reason: String },

    #[error("Invalid tag '{tag}': at most {max} bytes")]
    InvalidTag { tag: String, max: usize },

    #[error("Message of {length} bytes does not fit in one {max}-byte fragment")]
    MessageTooLong { length: usize, max: usize },

    #[error("A bundle needs at least one transfer")]
    EmptyTransfers,

    #[error("Value {value} exceeds the signed ledger range")]
    ValueOutOfRange { value: u64 },

    #[error("Input at key index {key_index} has no balance to spend")]
    EmptyInput { key_index: u64 },

    #[error("Insufficient balance: outputs need {required}, inputs hold {available}")]
    InsufficientBalance { required: u64, available: u64 },

    #[error("Inputs exceed outputs by {surplus} but no remainder address was given")]
    MissingRemainderAddress { surplus: u64 },

    #[error("Key derivation failed for key index {key_index}: {reason}")]
    KeyDerivation { key_index: u64, reason: String },

    #[error("Signing failed: {reason}")]
    Signing { reason: String },

    #[error("Bundle reserves {expected} signature slots but {actual} fragments were supplied")]
    FragmentCountMismatch { expected: usize, actual: usize },

    #[error("Conflicting cycle needs at least 2 addresses, got {length}")]
    InvalidCycleLength { length: usize },
}

/// Bundle pool errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Queried before the pool was installed. A startup-ordering bug.
    #[error("Bundle provider queried before it was ready")]
    NotReady,

    #[error("Bundle provider was already initialized")]
    AlreadyInitialized,

    #[error("Refusing to install an empty bundle pool")]
    EmptyPool,

    #[error("Failed to build bundle pool: {0}")]
    Supply(#[from] BundleError),
}
