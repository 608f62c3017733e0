//! # Types
//!
//! Shared data structures used across all modules of the round engine.
//!
//! ## Design decisions
//!
//! ### Opaque 32-byte identities
//!
//! [`Address`] and [`ProjectId`] are fixed-size byte newtypes rather than
//! strings: the engine never interprets them, it only routes funds between
//! them and copies them into ledger events. Both display as hex.
//!
//! ### Signed amounts
//!
//! Amounts are `i128` with non-positive values rejected at the decoding
//! boundary ([`crate::codec::decode_donation`]), so every amount the engine
//! moves is strictly positive and balance arithmetic stays in one type.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque 32-byte account identity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(pub [u8; 32]);

impl Address {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Build a deterministic address from a namespace byte and an index.
    ///
    /// Used by the factory to allocate unique instance addresses.
    pub fn derive(namespace: u8, index: u64) -> Self {
        let mut bytes = [0u8; 32];
        bytes[0] = namespace;
        bytes[24..].copy_from_slice(&index.to_be_bytes());
        Self(bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

/// Opaque fixed-size project tag carried through donation records unchanged.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectId(pub [u8; 32]);

impl ProjectId {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProjectId({self})")
    }
}

/// Payment denomination of a donation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Medium {
    /// The native currency of the ledger.
    Native,
    /// A specific fungible token, identified by its address.
    Token(Address),
}

impl fmt::Display for Medium {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Medium::Native => f.write_str("native"),
            Medium::Token(token) => write!(f, "token:{token}"),
        }
    }
}

/// One weighted, recipient-targeted fund transfer within a batch.
///
/// Travels as an opaque byte-record; see [`crate::codec`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Donation {
    pub medium: Medium,
    /// Token-decimal-denominated amount; strictly positive after decoding.
    pub amount: i128,
    /// Grant address absorbing the funds.
    pub recipient: Address,
    pub project_id: ProjectId,
    /// Disambiguates multiple applications under one project.
    pub application_index: u32,
}

/// One-time initialization parameters for a round instance.
///
/// Decoded from caller-supplied bytes by the template at creation time and
/// held by the instance for its lifetime.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundParams {
    /// Ledger timestamp at which the round opens for donations.
    pub round_start: u64,
    /// Ledger timestamp at which the round closes.
    pub round_end: u64,
    /// Off-process location of the round's metadata document.
    pub metadata_uri: String,
}
