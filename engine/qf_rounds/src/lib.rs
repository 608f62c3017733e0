//! # Quadratic-Funding Round Engine
//!
//! Core of a quadratic-funding round mechanism: a factory that stamps out
//! lightweight round instances from a single shared template, and a batch
//! contribution processor that fans heterogeneous donations out to grant
//! recipients while recording one auditable ledger event per donation.
//!
//! | Concern        | Entry point(s)                                        |
//! |----------------|-------------------------------------------------------|
//! | Template admin | [`RoundFactory::set_template`]                        |
//! | Instantiation  | [`RoundFactory::create_instance`]                     |
//! | Binding        | [`ContributionProcessor::initialize`]                 |
//! | Funding        | [`ContributionProcessor::process_donations`]          |
//! | Audit trail    | [`EventLog`]                                          |
//!
//! ## Architecture
//!
//! Fund movement is fully delegated to [`ledger`], which provides journaled
//! batches: everything a donation batch does is reverted unless the batch
//! commits, so a failing donation anywhere in a batch leaves no observable
//! effect. Byte-record decoding is fully delegated to [`codec`]. The public
//! entry points in [`factory`] and [`processor`] contain the authorization
//! and reconciliation rules and the event emissions.
//!
//! The emitted [`ProtocolEvent`] stream is the only persisted donation
//! history; quadratic-matching math is reconstructed off-process from it.

pub mod codec;
pub mod errors;
pub mod events;
pub mod factory;
pub mod ledger;
pub mod processor;
pub mod types;

#[cfg(test)]
mod test_processor;

pub use errors::{ProtocolError, Result};
pub use events::{
    DonationRecorded, EventKind, EventLog, InstanceCreated, ProtocolEvent, TemplateUpdated,
};
pub use factory::{QfRoundTemplate, RoundBehavior, RoundFactory, RoundInstance};
pub use ledger::Ledger;
pub use processor::ContributionProcessor;
pub use types::{Address, Donation, Medium, ProjectId, RoundParams};

/// Engine version string, surfaced for off-process consumers of the event log.
pub const VERSION: &str = "0.2.0";
