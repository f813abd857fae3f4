//! Core inventory types for wheelport.
//!
//! A [`Unit`] is one reservable wheelchair, a [`Reservation`] binds a booking
//! attempt to a unit, and a [`Trip`] is the archived record of a finished
//! session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Maximum battery level.
pub const MAX_BATTERY: u8 = 100;

/// Availability of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    /// Free to be selected.
    Available,
    /// Held by a reservation that has not been proven yet.
    Reserved,
    /// Riding; a verified reservation has an active session.
    InUse,
}

impl UnitStatus {
    /// The canonical string form, as stored.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Reserved => "reserved",
            Self::InUse => "in_use",
        }
    }

    /// Parse the canonical string form.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "available" => Some(Self::Available),
            "reserved" => Some(Self::Reserved),
            "in_use" => Some(Self::InUse),
            _ => None,
        }
    }
}

impl std::fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reservable wheelchair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    /// Unique identifier, e.g. `W-1`.
    pub id: String,

    /// Where the unit is parked.
    pub location: String,

    /// Distance from the user, precomputed upstream.
    pub distance: String,

    /// Estimated walking time to the unit, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_time: Option<String>,

    /// Battery level, 0 to 100.
    pub battery: u8,

    /// Current availability.
    pub status: UnitStatus,

    /// Reservation currently holding the unit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reservation_id: Option<Uuid>,

    /// BLAKE3 digest of the issued possession token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_digest: Option<String>,

    /// When the current reservation was created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reserved_at: Option<DateTime<Utc>>,
}

impl Unit {
    /// Create a new available unit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUnit`] if the identifier is blank or the
    /// battery level exceeds 100.
    pub fn new(
        id: impl Into<String>,
        location: impl Into<String>,
        distance: impl Into<String>,
        battery: u8,
    ) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(Error::invalid_unit("identifier must not be empty"));
        }
        if battery > MAX_BATTERY {
            return Err(Error::invalid_unit(format!(
                "battery level {battery} is above {MAX_BATTERY}"
            )));
        }

        Ok(Self {
            id,
            location: location.into(),
            distance: distance.into(),
            estimated_time: None,
            battery,
            status: UnitStatus::Available,
            reservation_id: None,
            token_digest: None,
            reserved_at: None,
        })
    }

    /// Set the estimated walking time.
    #[must_use]
    pub fn with_estimated_time(mut self, estimated_time: impl Into<String>) -> Self {
        self.estimated_time = Some(estimated_time.into());
        self
    }

    /// Check if the unit can be selected.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.status == UnitStatus::Available
    }

    /// Check if the unit is held by the given reservation.
    #[must_use]
    pub fn is_held_by(&self, reservation_id: Uuid) -> bool {
        self.reservation_id == Some(reservation_id)
    }
}

/// A booking attempt bound to one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Random identifier; unguessable.
    pub id: Uuid,
    /// When the unit was first held.
    pub created_at: DateTime<Utc>,
}

impl Reservation {
    /// Create a fresh reservation.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
        }
    }
}

impl Default for Reservation {
    fn default() -> Self {
        Self::new()
    }
}

/// The archived record of a completed session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trip {
    /// Storage identifier, assigned when archived.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// The unit that was ridden.
    pub unit_id: String,
    /// The reservation that was used.
    pub reservation_id: Uuid,
    /// When the unit was first held.
    pub reserved_at: DateTime<Utc>,
    /// When the proof was accepted.
    pub started_at: DateTime<Utc>,
    /// When the session ended.
    pub ended_at: DateTime<Utc>,
    /// Elapsed session time in whole seconds.
    pub elapsed_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_status_round_trip_strings() {
        for status in [UnitStatus::Available, UnitStatus::Reserved, UnitStatus::InUse] {
            assert_eq!(UnitStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(UnitStatus::parse("broken"), None);
    }

    #[test]
    fn test_unit_status_display() {
        assert_eq!(UnitStatus::InUse.to_string(), "in_use");
    }

    #[test]
    fn test_unit_new() {
        let unit = Unit::new("W-1", "Gate 4", "120m", 80).unwrap();

        assert_eq!(unit.id, "W-1");
        assert_eq!(unit.battery, 80);
        assert!(unit.is_available());
        assert!(unit.reservation_id.is_none());
        assert!(unit.token_digest.is_none());
    }

    #[test]
    fn test_unit_rejects_battery_over_max() {
        let err = Unit::new("W-1", "Gate 4", "120m", 101).unwrap_err();
        assert!(err.to_string().contains("battery"));
    }

    #[test]
    fn test_unit_rejects_blank_id() {
        assert!(Unit::new("  ", "Gate 4", "120m", 50).is_err());
    }

    #[test]
    fn test_unit_with_estimated_time() {
        let unit = Unit::new("W-2", "Gate 1", "40m", 55)
            .unwrap()
            .with_estimated_time("2 min");
        assert_eq!(unit.estimated_time.as_deref(), Some("2 min"));
    }

    #[test]
    fn test_is_held_by() {
        let reservation = Reservation::new();
        let mut unit = Unit::new("W-3", "Gate 2", "10m", 90).unwrap();
        assert!(!unit.is_held_by(reservation.id));

        unit.reservation_id = Some(reservation.id);
        assert!(unit.is_held_by(reservation.id));
        assert!(!unit.is_held_by(Reservation::new().id));
    }

    #[test]
    fn test_reservations_are_unique() {
        assert_ne!(Reservation::new().id, Reservation::new().id);
    }

    #[test]
    fn test_unit_serialization_skips_empty_fields() {
        let unit = Unit::new("W-1", "Gate 4", "120m", 80).unwrap();
        let json = serde_json::to_string(&unit).unwrap();
        assert!(json.contains("\"status\":\"available\""));
        assert!(!json.contains("reservation_id"));
    }
}
