//! Tangle Spammer - Load generator for tangle ledger nodes
//!
//! Builds a pool of signed bundles once at startup, then drives many
//! concurrent submission workers that fetch tips, attach and broadcast those
//! bundles as fast as the node accepts them.
//!
//! # Architecture
//!
//! - **[`crypto`]**: hash and one-time-signature primitives behind the
//!   [`SigningScheme`] trait, with the [`WinternitzSha256`] reference scheme
//! - **[`bundle`]**: [`BundleBuilder`] and [`SignatureEngine`], composed by
//!   [`prepare_transfers`]
//! - **[`supply`]**: the three pool strategies (`0value`, `static`,
//!   `conflicting`)
//! - **[`provider`]**: [`BundleProvider`], the read-only pool behind a
//!   one-shot readiness barrier
//! - **[`client`]**: the [`TangleApi`] node trait and its HTTP implementation
//! - **[`worker`]**: [`SubmissionWorker`], one per instance and node
//! - **[`reporter`]**: the once-per-second status line
//!
//! # Quick Start
//!
//! ```bash
//! # Zero-value spam against a local node
//! cargo run -p tangle-spammer --bin tangle-spammer
//!
//! # Conflicting spam over a 4-address cycle, build the pool and exit
//! cargo run -p tangle-spammer --bin tangle-spammer -- --mode conflicting --cycle-length 4 --init
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use tangle_spammer::{prepare_transfers, BundleRequest, Seed, Transfer, WinternitzSha256};
//!
//! # fn example(target: &str) -> Result<(), tangle_spammer::BundleError> {
//! let bundle = prepare_transfers(
//!     &WinternitzSha256,
//!     &Seed::generate(),
//!     BundleRequest {
//!         transfers: vec![Transfer::new(target, 0).with_tag("SPAM")],
//!         ..Default::default()
//!     },
//! )?;
//! assert_eq!(bundle.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod bundle;
pub mod client;
pub mod config;
pub mod crypto;
pub mod error;
pub mod provider;
pub mod reporter;
pub mod supply;
pub mod worker;

pub use bundle::{
    prepare_transfers, BundleBuilder, BundleRequest, FinalizedBundle, Input, SignatureEngine,
    SignedBundle, Transaction, Transfer,
};
pub use client::{HttpNode, NodeInfo, TangleApi, Tips};
pub use config::{ConfigOverrides, SpammerConfig};
pub use crypto::{Address, SecurityLevel, Seed, SigningScheme, WinternitzSha256};
pub use error::{BundleError, ProviderError};
pub use provider::BundleProvider;
pub use supply::{BundleSupply, SpamMode, SupplyParams};
pub use worker::{SubmissionWorker, WorkerSettings};
