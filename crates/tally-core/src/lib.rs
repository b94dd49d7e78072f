//! # Tally Core
//!
//! Shared building blocks for reconciling incentive flows over a block range:
//!
//! - identifiers (`AccountId`, `GroupId`, `BlockHash`) and integer balances
//! - `Perbill` commission and the single rounding rule used by every split
//! - the `TallyError` taxonomy

pub mod error;
pub mod numeric;
pub mod types;

pub use error::*;
pub use numeric::*;
pub use types::*;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Result, TallyError};
    pub use crate::numeric::{div_round, mul_div_round, signed_sub, Perbill};
    pub use crate::types::*;
}
