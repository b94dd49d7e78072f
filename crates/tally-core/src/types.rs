//! Core type definitions for Tally
//!
//! Chain-level identifiers and amounts shared by every reconciliation
//! component. Balances are kept as plain integers in the chain's smallest
//! unit; nothing in the reward split goes through floating point.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Block height
pub type BlockNumber = u32;

/// Staking era index
pub type EraIndex = u32;

/// Unsigned balance in the smallest chain unit
pub type Balance = u128;

/// Signed balance for ledger deltas and net earnings
pub type SignedBalance = i128;

/// Membership registry identifier
pub type MemberId = u64;

/// Worker identifier, unique within one working group
pub type WorkerId = u64;

/// Proposal identifier
pub type ProposalId = u64;

/// Bounty identifier
pub type BountyId = u64;

/// Account address (SS58 text form)
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", self.0)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// BlockHash - 256-bit hash identifying a finalized block
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlockHash {
    hash: [u8; 32],
}

impl BlockHash {
    /// Create a new BlockHash from raw bytes
    pub fn new(hash: [u8; 32]) -> Self {
        Self { hash }
    }

    /// Derive a hash from arbitrary bytes using BLAKE3
    pub fn from_content(content: &[u8]) -> Self {
        Self {
            hash: *blake3::hash(content).as_bytes(),
        }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.hash
    }

    /// `0x`-prefixed hex form, as chain RPCs print it
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.hash))
    }

    /// Parse from hex, with or without the `0x` prefix
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let mut hash = [0u8; 32];
        hex::decode_to_slice(s, &mut hash)?;
        Ok(Self { hash })
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash({})", &self.to_hex()[..18])
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for BlockHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for BlockHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        BlockHash::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Budget-holding group: a working group by its runtime module name, or the council
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(String);

impl GroupId {
    /// Name of the synthetic council group
    pub const COUNCIL: &'static str = "council";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn council() -> Self {
        Self(Self::COUNCIL.to_string())
    }

    pub fn is_council(&self) -> bool {
        self.0 == Self::COUNCIL
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for GroupId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Debug for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GroupId({})", self.0)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Half-open block interval `[start, end)`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockRange {
    pub start: BlockNumber,
    pub end: BlockNumber,
}

impl BlockRange {
    pub fn new(start: BlockNumber, end: BlockNumber) -> Self {
        Self { start, end }
    }

    /// Number of blocks covered
    pub fn len(&self) -> BlockNumber {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn contains(&self, block: BlockNumber) -> bool {
        block >= self.start && block < self.end
    }

    /// True if `[start, end)` shares at least one block with `self`
    pub fn overlaps(&self, start: BlockNumber, end: BlockNumber) -> bool {
        start < self.end && end > self.start
    }
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_hash_hex_roundtrip() {
        let hash = BlockHash::from_content(b"block-100");
        let parsed = BlockHash::from_hex(&hash.to_hex()).unwrap();
        assert_eq!(hash, parsed);
        assert!(hash.to_hex().starts_with("0x"));
    }

    #[test]
    fn test_block_hash_rejects_short_input() {
        assert!(BlockHash::from_hex("0xabcd").is_err());
    }

    #[test]
    fn test_block_hash_serde_as_string() {
        let hash = BlockHash::new([7u8; 32]);
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", hash.to_hex()));
    }

    #[test]
    fn test_council_group() {
        assert!(GroupId::council().is_council());
        assert!(!GroupId::from("forumWorkingGroup").is_council());
    }

    #[test]
    fn test_block_range_overlap() {
        let range = BlockRange::new(100, 200);
        assert!(range.contains(100));
        assert!(!range.contains(200));
        assert!(range.overlaps(50, 101));
        assert!(!range.overlaps(200, 300));
        assert!(!range.overlaps(0, 100));
        assert_eq!(range.len(), 100);
    }
}
