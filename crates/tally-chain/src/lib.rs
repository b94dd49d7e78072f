//! # Tally Chain
//!
//! Contracts for the collaborators the reconciliation engine reads from:
//!
//! - `ChainSnapshotReader` - storage values at a finalized block hash
//! - `EventRangeReader` - indexed events inside a block range
//! - `MemberDirectory` - memberships resolved by root or controller account
//!
//! `MemoryChain` implements all three over a JSON `ChainFixture`.

pub mod events;
pub mod memory;
pub mod reader;
pub mod storage;

pub use events::*;
pub use memory::{ChainFixture, EraFixture, EventLog, MemoryChain};
pub use reader::{ChainSnapshotReader, EventRangeReader, MemberDirectory};
pub use storage::*;
