//! Tranche-based structured portfolio accounting engine
//!
//! Tracks a pool of capital split across ordered risk tranches (index 0 is the
//! equity tranche, higher indices are more senior), accrues target yield and
//! protocol fees through lazily computed checkpoints, and allocates any
//! shortfall junior-first through the loss waterfall.
//!
//! Guarantees:
//! 1. Balances are computed with checked integer math and never go negative
//! 2. Every mutator is all-or-nothing: a failed call leaves no trace
//! 3. Nothing accrues past the portfolio end date
//! 4. A senior tranche never carries a deficit while a junior one has value

#![forbid(unsafe_code)]

#[cfg(kani)]
extern crate kani;

pub mod access;
pub mod checkpoint;
pub mod collaborators;
pub mod error;
pub mod events;
pub mod fees;
pub mod math;
pub mod portfolio;
pub mod tranche;
pub mod types;
pub mod upgrade;
pub mod vaults;
pub mod waterfall;

// Re-export commonly used types
pub use access::AccessControl;
pub use checkpoint::Checkpoint;
pub use collaborators::*;
pub use error::{PortfolioError, Result};
pub use events::{Event, EventLog};
pub use fees::{FeeRateSource, ProtocolConfig};
pub use math::{min, saturating_sub, with_interest};
pub use portfolio::{Collaborators, Portfolio, PortfolioParams};
pub use tranche::{Tranche, TrancheParams};
pub use types::*;
pub use upgrade::{migrate, Implementation, StorageLayout};
pub use vaults::VaultsRegistry;
