//! Canonical events emitted by the round engine.
//!
//! The event stream is the engine's only persisted audit trail: per-donation
//! funding history exists nowhere else, and off-process consumers rebuild
//! quadratic-matching totals from [`DonationRecorded`] records alone. All
//! payloads are serde-serializable so a sink can ship them as JSON.

use std::cell::RefCell;

use serde::{Deserialize, Serialize};

use crate::types::{Address, Medium, ProjectId};

/// All recognised event kinds emitted by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// The factory's template pointer was replaced.
    TemplateUpdated,
    /// A new round instance was created and initialized.
    InstanceCreated,
    /// One donation inside a committed batch.
    DonationRecorded,
}

impl EventKind {
    /// Short identifier string suitable for logs and storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TemplateUpdated => "template_updated",
            Self::InstanceCreated => "instance_created",
            Self::DonationRecorded => "donation_recorded",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateUpdated {
    pub template: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceCreated {
    pub instance: Address,
    pub owner: Address,
}

/// The full provenance of one settled donation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonationRecorded {
    pub medium: Medium,
    pub amount: i128,
    /// True transaction initiator. Distinct from `payer`, which may be a
    /// relaying intermediary fronting the funds.
    pub originator: Address,
    pub payer: Address,
    pub recipient: Address,
    pub project_id: ProjectId,
    pub application_index: u32,
    /// The round instance that authorized the transfer.
    pub round: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolEvent {
    TemplateUpdated(TemplateUpdated),
    InstanceCreated(InstanceCreated),
    DonationRecorded(DonationRecorded),
}

impl ProtocolEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::TemplateUpdated(_) => EventKind::TemplateUpdated,
            Self::InstanceCreated(_) => EventKind::InstanceCreated,
            Self::DonationRecorded(_) => EventKind::DonationRecorded,
        }
    }
}

/// Append-only in-process event sink.
#[derive(Default)]
pub struct EventLog {
    records: RefCell<Vec<ProtocolEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, event: ProtocolEvent) {
        tracing::debug!(kind = event.kind().as_str(), "event published");
        self.records.borrow_mut().push(event);
    }

    pub fn all(&self) -> Vec<ProtocolEvent> {
        self.records.borrow().clone()
    }

    pub fn last(&self) -> Option<ProtocolEvent> {
        self.records.borrow().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }
}
