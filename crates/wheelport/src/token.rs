//! Possession tokens.
//!
//! A token is issued when a booking is confirmed, shown to the user as a QR
//! code, and scanned at the unit to start the trip. The payload names the
//! unit and the reservation; the store keeps a BLAKE3 digest of the payload
//! so a scan can be checked against what was actually issued.

use async_trait::async_trait;
use qrcode::render::unicode;
use qrcode::{EcLevel, QrCode};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::inventory::Inventory;
use crate::unit::UnitStatus;

/// The decoded content of a scanned code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofPayload {
    /// The unit the reservation is for.
    #[serde(alias = "wheelchairId")]
    pub unit: String,
    /// The reservation being proven.
    #[serde(alias = "bookingId")]
    pub reservation: Uuid,
}

impl ProofPayload {
    /// Create a payload for the given unit and reservation.
    #[must_use]
    pub fn new(unit: impl Into<String>, reservation: Uuid) -> Self {
        Self {
            unit: unit.into(),
            reservation,
        }
    }

    /// Decode a scanned string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedProof`] if the string is not a JSON object
    /// with a unit and a reservation identifier.
    pub fn parse(scanned: &str) -> Result<Self> {
        serde_json::from_str(scanned.trim()).map_err(|e| Error::malformed_proof(e.to_string()))
    }

    /// Canonical encoding; field order and spelling are fixed.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// BLAKE3 digest of the canonical encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn digest(&self) -> Result<String> {
        Ok(compute_digest(&self.encode()?))
    }
}

/// Compute the BLAKE3 digest of an encoded payload.
#[must_use]
pub fn compute_digest(encoded: &str) -> String {
    blake3::hash(encoded.as_bytes()).to_hex().to_string()
}

/// An issued proof of possession for one reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PossessionToken {
    payload: ProofPayload,
    encoded: String,
    digest: String,
}

impl PossessionToken {
    /// Build a token for the given unit and reservation.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be encoded.
    pub fn new(unit_id: impl Into<String>, reservation_id: Uuid) -> Result<Self> {
        let payload = ProofPayload::new(unit_id, reservation_id);
        let encoded = payload.encode()?;
        let digest = compute_digest(&encoded);
        Ok(Self {
            payload,
            encoded,
            digest,
        })
    }

    /// The structured payload.
    #[must_use]
    pub fn payload(&self) -> &ProofPayload {
        &self.payload
    }

    /// The string embedded in the scannable code.
    #[must_use]
    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    /// Digest recorded in the store.
    #[must_use]
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Render the token as a QR code made of unicode half blocks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CodeRender`] if the payload does not fit in a QR code.
    pub fn render_code(&self) -> Result<String> {
        let code = QrCode::with_error_correction_level(self.encoded.as_bytes(), EcLevel::M)
            .map_err(|e| Error::CodeRender(e.to_string()))?;
        Ok(code
            .render::<unicode::Dense1x2>()
            .dark_color(unicode::Dense1x2::Light)
            .light_color(unicode::Dense1x2::Dark)
            .build())
    }
}

/// Issues possession tokens at confirmation time.
#[async_trait]
pub trait TokenIssuer: Send + Sync + std::fmt::Debug {
    /// Issue a token bound to `unit_id` and `reservation_id`.
    async fn issue(&self, unit_id: &str, reservation_id: Uuid) -> Result<PossessionToken>;
}

/// Issues tokens in-process.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalIssuer;

#[async_trait]
impl TokenIssuer for LocalIssuer {
    async fn issue(&self, unit_id: &str, reservation_id: Uuid) -> Result<PossessionToken> {
        let token = PossessionToken::new(unit_id, reservation_id)?;
        debug!("Issued token {} for unit {}", &token.digest[..16], unit_id);
        Ok(token)
    }
}

/// Check a scanned payload against the reservation recorded for `expected_unit`.
///
/// Succeeds only if the payload names `expected_unit`, the store still holds
/// that unit `reserved` under the payload's reservation, and the payload's
/// digest matches the one recorded at issuance.
///
/// # Errors
///
/// - [`Error::MalformedProof`] if the payload cannot be decoded
/// - [`Error::ProofMismatch`] if unit, reservation or digest differ
/// - [`Error::NotFound`] if the unit no longer exists
/// - [`Error::Unavailable`] if the store cannot be read
pub async fn verify(
    inventory: &dyn Inventory,
    scanned: &str,
    expected_unit: &str,
) -> Result<ProofPayload> {
    let proof = ProofPayload::parse(scanned)?;
    if proof.unit != expected_unit {
        return Err(Error::proof_mismatch(expected_unit));
    }

    let unit = inventory
        .get_unit(expected_unit)
        .await
        .map_err(|e| Error::unavailable(e.to_string()))?
        .ok_or_else(|| Error::not_found(expected_unit))?;

    let digest = proof.digest()?;
    let matches = unit.status == UnitStatus::Reserved
        && unit.is_held_by(proof.reservation)
        && unit.token_digest.as_deref() == Some(digest.as_str());
    if !matches {
        debug!("Proof for unit {} does not match the stored record", unit.id);
        return Err(Error::proof_mismatch(expected_unit));
    }

    Ok(proof)
}
