//! Byte-record codec for donations and round parameters.
//!
//! Donations and initialization parameters cross the engine boundary as
//! opaque byte-records (JSON). Decoding failures map onto the engine's
//! error taxonomy: a bad donation record aborts its whole batch with
//! [`ProtocolError::MalformedDonation`], bad round parameters surface as
//! [`ProtocolError::InitializationFailed`] from the factory.

use crate::errors::{ProtocolError, Result};
use crate::types::{Donation, RoundParams};

pub fn encode_donation(donation: &Donation) -> Result<Vec<u8>> {
    serde_json::to_vec(donation).map_err(|e| ProtocolError::MalformedDonation(e.to_string()))
}

/// Decode one donation record.
///
/// Rejects syntactically invalid records and non-positive amounts.
pub fn decode_donation(bytes: &[u8]) -> Result<Donation> {
    let donation: Donation = serde_json::from_slice(bytes)
        .map_err(|e| ProtocolError::MalformedDonation(e.to_string()))?;
    if donation.amount <= 0 {
        return Err(ProtocolError::MalformedDonation(format!(
            "non-positive amount {}",
            donation.amount
        )));
    }
    Ok(donation)
}

pub fn encode_round_params(params: &RoundParams) -> Result<Vec<u8>> {
    serde_json::to_vec(params).map_err(|e| ProtocolError::InitializationFailed(e.to_string()))
}

pub fn decode_round_params(bytes: &[u8]) -> Result<RoundParams> {
    serde_json::from_slice(bytes).map_err(|e| ProtocolError::InitializationFailed(e.to_string()))
}
