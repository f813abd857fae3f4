//! Booking session state machine.
//!
//! A [`BookingSession`] drives one user's reservation attempt:
//!
//! ```text
//! Browsing -> Confirming -> AwaitingProof -> Active -> Completed
//!     ^           |               |                        |
//!     +-- cancel -+---------------+         browse --------+
//! ```
//!
//! Every store mutation is a conditional write, and every failure path
//! leaves the store consistent: a unit is only `reserved` or `in_use` while
//! this session holds the matching reservation.

pub mod timer;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::{Config, FacilityConfig};
use crate::error::{Error, Result};
use crate::inventory::{Inventory, StatusUpdate};
use crate::token::{self, PossessionToken, ProofPayload, TokenIssuer};
use crate::unit::{Reservation, Trip, Unit, UnitStatus};
use crate::view::View;

pub use timer::{format_elapsed, TripTimer};

/// Tunables for a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionOptions {
    /// Holds older than this are released on the next browse.
    pub hold_timeout: Option<Duration>,
}

impl From<&Config> for SessionOptions {
    fn from(config: &Config) -> Self {
        Self {
            hold_timeout: config.hold_timeout(),
        }
    }
}

/// Where a session is in the booking lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Looking at the map; nothing held.
    Browsing,
    /// A unit is held and waiting for the user to confirm.
    Confirming {
        /// The held unit.
        unit: Unit,
        /// The provisional reservation.
        reservation: Reservation,
    },
    /// Confirmed; waiting for the code to be scanned at the unit.
    AwaitingProof {
        /// The held unit.
        unit: Unit,
        /// The confirmed reservation.
        reservation: Reservation,
        /// The issued token.
        token: PossessionToken,
    },
    /// Riding.
    Active {
        /// The unit in use.
        unit: Unit,
        /// The verified reservation.
        reservation: Reservation,
        /// The verified token.
        token: PossessionToken,
        /// Trip timer.
        timer: TripTimer,
    },
    /// The trip ended.
    Completed {
        /// The archived trip.
        trip: Trip,
    },
}

impl SessionState {
    /// Short name for messages and logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Browsing => "browsing",
            Self::Confirming { .. } => "confirming",
            Self::AwaitingProof { .. } => "awaiting proof",
            Self::Active { .. } => "active",
            Self::Completed { .. } => "completed",
        }
    }
}

/// One user's booking session.
#[derive(Debug)]
pub struct BookingSession {
    inventory: Arc<dyn Inventory>,
    issuer: Arc<dyn TokenIssuer>,
    options: SessionOptions,
    state: SessionState,
    units: Vec<Unit>,
    last_error: Option<String>,
}

impl BookingSession {
    /// Create a session in the `Browsing` state.
    #[must_use]
    pub fn new(
        inventory: Arc<dyn Inventory>,
        issuer: Arc<dyn TokenIssuer>,
        options: SessionOptions,
    ) -> Self {
        Self {
            inventory,
            issuer,
            options,
            state: SessionState::Browsing,
            units: Vec::new(),
            last_error: None,
        }
    }

    /// The current state.
    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Units seen by the last successful [`browse`](Self::browse).
    #[must_use]
    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    /// The error from the last failed operation, cleared on success.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// The issued token, once confirmed.
    #[must_use]
    pub fn token(&self) -> Option<&PossessionToken> {
        match &self.state {
            SessionState::AwaitingProof { token, .. } | SessionState::Active { token, .. } => {
                Some(token)
            }
            _ => None,
        }
    }

    /// The trip timer, while active.
    #[must_use]
    pub fn timer(&self) -> Option<TripTimer> {
        match &self.state {
            SessionState::Active { timer, .. } => Some(*timer),
            _ => None,
        }
    }

    /// Elapsed trip time as `m:ss`, while active.
    #[must_use]
    pub fn elapsed_display(&self) -> Option<String> {
        self.timer().map(|t| t.display())
    }

    /// The screen to show for the current state.
    #[must_use]
    pub fn view<'a>(&'a self, facility: &'a FacilityConfig) -> View<'a> {
        View::of(self, facility)
    }

    /// Refresh the unit list.
    ///
    /// Expired holds are released first when a hold timeout is configured.
    /// From `Completed` this starts a new booking.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] if the store cannot be read, or
    /// [`Error::InvalidTransition`] while a booking is in progress.
    pub async fn browse(&mut self) -> Result<&[Unit]> {
        let result = self.try_browse().await;
        self.record(result)?;
        Ok(&self.units)
    }

    async fn try_browse(&mut self) -> Result<()> {
        match self.state {
            SessionState::Browsing | SessionState::Completed { .. } => {}
            _ => return Err(self.invalid("browse")),
        }

        if let Some(timeout) = self.options.hold_timeout {
            let timeout = chrono::Duration::from_std(timeout)
                .map_err(|e| Error::internal(format!("hold timeout out of range: {e}")))?;
            let released = self
                .inventory
                .release_expired(Utc::now() - timeout)
                .await
                .map_err(|e| Error::unavailable(e.to_string()))?;
            if released > 0 {
                info!("Released {} expired holds", released);
            }
        }

        self.units = self
            .inventory
            .list_units()
            .await
            .map_err(|e| Error::unavailable(e.to_string()))?;
        debug!("Listed {} units", self.units.len());
        self.state = SessionState::Browsing;
        Ok(())
    }

    /// Select a unit, placing a provisional hold on it.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the unit does not exist
    /// - [`Error::InvalidSelection`] if it is not available or another
    ///   session took it first
    /// - [`Error::Unavailable`] if the store cannot be reached
    pub async fn select(&mut self, unit_id: &str) -> Result<()> {
        let result = self.try_select(unit_id).await;
        self.record(result)
    }

    async fn try_select(&mut self, unit_id: &str) -> Result<()> {
        match self.state {
            SessionState::Browsing | SessionState::Completed { .. } => {}
            _ => return Err(self.invalid("select a unit")),
        }

        let mut unit = self
            .inventory
            .get_unit(unit_id)
            .await
            .map_err(|e| Error::unavailable(e.to_string()))?
            .ok_or_else(|| Error::not_found(unit_id))?;

        if !unit.is_available() {
            return Err(Error::invalid_selection(
                unit_id,
                format!("unit is {}", unit.status),
            ));
        }

        let reservation = Reservation::new();
        let held = self
            .inventory
            .compare_and_set(&StatusUpdate::hold(unit_id, reservation))
            .await
            .map_err(|e| Error::unavailable(e.to_string()))?;
        if !held {
            return Err(Error::invalid_selection(
                unit_id,
                "taken by another booking",
            ));
        }

        unit.status = UnitStatus::Reserved;
        unit.reservation_id = Some(reservation.id);
        unit.reserved_at = Some(reservation.created_at);

        info!("Holding unit {} for reservation {}", unit.id, reservation.id);
        self.state = SessionState::Confirming { unit, reservation };
        Ok(())
    }

    /// Confirm the held unit and issue its possession token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BookingFailed`] if issuance or the store write fails;
    /// the hold is rolled back and the session returns to `Browsing`.
    pub async fn confirm(&mut self) -> Result<()> {
        let result = self.try_confirm().await;
        self.record(result)
    }

    async fn try_confirm(&mut self) -> Result<()> {
        let SessionState::Confirming { unit, reservation } = &self.state else {
            return Err(self.invalid("confirm"));
        };
        let (mut unit, reservation) = (unit.clone(), *reservation);

        let token = match self.issuer.issue(&unit.id, reservation.id).await {
            Ok(token) => token,
            Err(e) => {
                self.rollback(&unit.id, reservation).await;
                return Err(Error::booking_failed(&unit.id, e.to_string()));
            }
        };

        let update = StatusUpdate::attach_token(&unit.id, reservation, token.digest());
        match self.inventory.compare_and_set(&update).await {
            Ok(true) => {}
            Ok(false) => {
                // The hold expired and is no longer ours to release
                self.state = SessionState::Browsing;
                return Err(Error::booking_failed(&unit.id, "hold expired"));
            }
            Err(e) => {
                self.rollback(&unit.id, reservation).await;
                return Err(Error::booking_failed(&unit.id, e.to_string()));
            }
        }

        unit.token_digest = Some(token.digest().to_string());
        info!("Confirmed reservation {} for unit {}", reservation.id, unit.id);
        self.state = SessionState::AwaitingProof {
            unit,
            reservation,
            token,
        };
        Ok(())
    }

    /// Present a scanned payload to start the trip.
    ///
    /// On failure the session stays in `AwaitingProof` and the unit is not
    /// touched, so the user can scan again.
    ///
    /// # Errors
    ///
    /// - [`Error::MalformedProof`] if the payload cannot be decoded
    /// - [`Error::ProofMismatch`] if it names another unit or reservation,
    ///   or the store no longer records this reservation
    /// - [`Error::NotFound`] if the unit disappeared from the store
    pub async fn present_proof(&mut self, scanned: &str) -> Result<()> {
        let result = self.try_present_proof(scanned).await;
        self.record(result)
    }

    async fn try_present_proof(&mut self, scanned: &str) -> Result<()> {
        let SessionState::AwaitingProof {
            unit,
            reservation,
            token,
        } = &self.state
        else {
            return Err(self.invalid("present proof"));
        };
        let (mut unit, reservation, token) = (unit.clone(), *reservation, token.clone());

        let proof = ProofPayload::parse(scanned)?;
        if proof.unit != unit.id || proof.reservation != reservation.id {
            warn!(
                "Scanned proof for unit {} does not match held unit {}",
                proof.unit, unit.id
            );
            return Err(Error::proof_mismatch(&unit.id));
        }

        token::verify(self.inventory.as_ref(), scanned, &unit.id).await?;

        let activated = self
            .inventory
            .compare_and_set(&StatusUpdate::activate(
                &unit.id,
                reservation,
                token.digest(),
            ))
            .await
            .map_err(|e| Error::unavailable(e.to_string()))?;
        if !activated {
            return Err(Error::proof_mismatch(&unit.id));
        }

        unit.status = UnitStatus::InUse;
        info!("Trip started on unit {}", unit.id);
        self.state = SessionState::Active {
            unit,
            reservation,
            token,
            timer: TripTimer::start(),
        };
        Ok(())
    }

    /// End the active trip, release the unit and archive the trip.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] unless active, or
    /// [`Error::Unavailable`] if the release could not be written; the
    /// session then stays active so the call can be retried.
    pub async fn end_session(&mut self) -> Result<Trip> {
        let result = self.try_end_session().await;
        self.record(result)
    }

    async fn try_end_session(&mut self) -> Result<Trip> {
        let SessionState::Active {
            unit,
            reservation,
            timer,
            ..
        } = &self.state
        else {
            return Err(self.invalid("end the session"));
        };
        let (unit_id, reservation, timer) = (unit.id.clone(), *reservation, *timer);

        // The trip ends when asked, not when the store answers
        let mut trip = Trip {
            id: None,
            unit_id,
            reservation_id: reservation.id,
            reserved_at: reservation.created_at,
            started_at: timer.started_at(),
            ended_at: Utc::now(),
            elapsed_secs: timer.elapsed_secs(),
        };

        let released = self
            .inventory
            .compare_and_set(&StatusUpdate::release(
                &trip.unit_id,
                UnitStatus::InUse,
                reservation.id,
            ))
            .await
            .map_err(|e| Error::unavailable(e.to_string()))?;
        if !released {
            warn!("Unit {} was changed outside this session", trip.unit_id);
        }

        match self.inventory.archive_trip(&trip).await {
            Ok(id) => trip.id = Some(id),
            Err(e) => warn!("Failed to archive trip on unit {}: {}", trip.unit_id, e),
        }

        info!(
            "Trip on unit {} ended after {}",
            trip.unit_id,
            format_elapsed(trip.elapsed_secs)
        );
        self.state = SessionState::Completed { trip: trip.clone() };
        Ok(trip)
    }

    /// Abandon a booking before the trip starts, releasing the hold.
    ///
    /// Does nothing when no booking is in progress.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] while a trip is active, or
    /// [`Error::Unavailable`] if the release could not be written.
    pub async fn cancel(&mut self) -> Result<()> {
        let result = self.try_cancel().await;
        self.record(result)
    }

    async fn try_cancel(&mut self) -> Result<()> {
        let (unit_id, reservation) = match &self.state {
            SessionState::Confirming { unit, reservation }
            | SessionState::AwaitingProof {
                unit, reservation, ..
            } => (unit.id.clone(), *reservation),
            SessionState::Active { .. } => return Err(self.invalid("cancel")),
            SessionState::Browsing | SessionState::Completed { .. } => return Ok(()),
        };

        let released = self
            .inventory
            .compare_and_set(&StatusUpdate::release(
                &unit_id,
                UnitStatus::Reserved,
                reservation.id,
            ))
            .await
            .map_err(|e| Error::unavailable(e.to_string()))?;
        if !released {
            warn!("Hold on unit {} was already gone", unit_id);
        }

        info!("Cancelled booking of unit {}", unit_id);
        self.state = SessionState::Browsing;
        Ok(())
    }

    /// Release a provisional hold after a failed confirmation.
    async fn rollback(&mut self, unit_id: &str, reservation: Reservation) {
        let update = StatusUpdate::release(unit_id, UnitStatus::Reserved, reservation.id);
        match self.inventory.compare_and_set(&update).await {
            Ok(true) => debug!("Rolled back hold on unit {}", unit_id),
            Ok(false) => warn!("Hold on unit {} was gone before rollback", unit_id),
            // Left for the hold timeout to reclaim
            Err(e) => warn!("Failed to roll back hold on unit {}: {}", unit_id, e),
        }
        self.state = SessionState::Browsing;
    }

    fn invalid(&self, operation: &'static str) -> Error {
        Error::InvalidTransition {
            operation,
            state: self.state.name(),
        }
    }

    fn record<T>(&mut self, result: Result<T>) -> Result<T> {
        match &result {
            Ok(_) => self.last_error = None,
            Err(e) => self.last_error = Some(e.to_string()),
        }
        result
    }
}
