//! # Contribution Processor
//!
//! Stateless donation-batch engine. Each processor is bound once to the
//! single round instance allowed to invoke it, then accepts batches of
//! encoded weighted donations: native-medium donations are paid out of the
//! round's own balance, token donations are pulled from the payer under a
//! pre-granted allowance, and every settled donation is recorded as one
//! ledger event.
//!
//! A batch either settles completely or leaves no trace: transfers run
//! inside a journaled [`Ledger`] batch that reverts unless committed, and
//! events are buffered until the final value reconciliation passes. The
//! reconciliation deliberately runs after the loop, so a transfer to an
//! uncooperative recipient fails with [`ProtocolError::TransferFailed`]
//! before any aggregate check is reached.

use std::cell::{Cell, OnceCell};

use tracing::{debug, info};

use crate::codec;
use crate::errors::{ProtocolError, Result};
use crate::events::{DonationRecorded, EventLog, ProtocolEvent};
use crate::ledger::Ledger;
use crate::types::{Address, Medium};

/// Scoped hold on the processor's reentrancy flag. Released on every exit
/// path, including early failure.
struct ReentrancyGuard<'a> {
    flag: &'a Cell<bool>,
}

impl<'a> ReentrancyGuard<'a> {
    fn acquire(flag: &'a Cell<bool>) -> Result<Self> {
        if flag.replace(true) {
            return Err(ProtocolError::ReentrantCall);
        }
        Ok(Self { flag })
    }
}

impl Drop for ReentrancyGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

pub struct ContributionProcessor {
    address: Address,
    authorized_caller: OnceCell<Address>,
    processing: Cell<bool>,
}

impl ContributionProcessor {
    /// A new, unbound processor. `address` is the identity payers grant
    /// token allowances to.
    pub fn new(address: Address) -> Self {
        Self {
            address,
            authorized_caller: OnceCell::new(),
            processing: Cell::new(false),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// The round this processor is bound to, if already initialized.
    pub fn authorized_caller(&self) -> Option<Address> {
        self.authorized_caller.get().copied()
    }

    /// Bind this processor to the one round allowed to invoke it.
    ///
    /// The binding is set at most once and is immutable thereafter.
    pub fn initialize(&self, round: Address) -> Result<()> {
        self.authorized_caller
            .set(round)
            .map_err(|_| ProtocolError::AlreadyInitialized)?;
        info!(processor = %self.address, round = %round, "processor bound to round");
        Ok(())
    }

    /// Settle a batch of encoded donations, in order.
    ///
    /// `caller` must be the bound round. `attached_value` declares the
    /// native total this batch is expected to spend out of the round's
    /// balance; the batch fails with [`ProtocolError::ValueMismatch`] unless
    /// the native-medium donations sum to exactly that amount. `originator`
    /// is the true transaction initiator recorded in every event; `payer` is
    /// the account token donations are pulled from.
    ///
    /// Any failure aborts the whole batch: all transfers revert and no
    /// events are published. The caller resubmits a corrected batch.
    #[allow(clippy::too_many_arguments)]
    pub fn process_donations(
        &self,
        ledger: &Ledger,
        events: &EventLog,
        caller: &Address,
        originator: &Address,
        encoded_donations: &[Vec<u8>],
        payer: &Address,
        attached_value: i128,
    ) -> Result<()> {
        let round = match self.authorized_caller.get() {
            Some(bound) if bound == caller => *bound,
            _ => return Err(ProtocolError::Unauthorized),
        };
        let _guard = ReentrancyGuard::acquire(&self.processing)?;

        let mut batch = ledger.begin();
        let mut recorded = Vec::with_capacity(encoded_donations.len());
        let mut total_native: i128 = 0;

        for encoded in encoded_donations {
            let donation = codec::decode_donation(encoded)?;
            match donation.medium {
                Medium::Native => {
                    total_native = total_native.checked_add(donation.amount).ok_or_else(|| {
                        ProtocolError::TransferFailed("native donation total overflows".into())
                    })?;
                    batch.transfer_native(&round, &donation.recipient, donation.amount)?;
                }
                Medium::Token(token) => {
                    batch.transfer_token(
                        &token,
                        payer,
                        &donation.recipient,
                        &self.address,
                        donation.amount,
                    )?;
                }
            }
            debug!(
                recipient = %donation.recipient,
                medium = %donation.medium,
                amount = donation.amount,
                "donation settled"
            );
            recorded.push(DonationRecorded {
                medium: donation.medium,
                amount: donation.amount,
                originator: *originator,
                payer: *payer,
                recipient: donation.recipient,
                project_id: donation.project_id,
                application_index: donation.application_index,
                round,
            });
        }

        if total_native != attached_value {
            return Err(ProtocolError::ValueMismatch {
                declared: attached_value,
                spent: total_native,
            });
        }

        batch.commit();
        let donations = recorded.len();
        for record in recorded {
            events.publish(ProtocolEvent::DonationRecorded(record));
        }
        info!(
            round = %round,
            donations,
            native_total = total_native,
            "donation batch processed"
        );
        Ok(())
    }
}
