//! Screens derived from session state.
//!
//! Each [`SessionState`] maps to exactly one [`View`], so the screen shown
//! can never disagree with where the booking actually is.

use std::fmt;

use crate::config::FacilityConfig;
use crate::session::{BookingSession, SessionState};
use crate::token::PossessionToken;
use crate::unit::{Trip, Unit};

/// What to show the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View<'a> {
    /// The map: where the user is and the units around them.
    Map {
        /// The user's current location.
        location: &'a str,
        /// Units from the last browse.
        units: &'a [Unit],
        /// Error from the last failed operation.
        error: Option<&'a str>,
    },
    /// Confirm or cancel the held unit.
    Booking {
        /// The held unit.
        unit: &'a Unit,
    },
    /// Waiting for the code to be scanned at the unit.
    Scanner {
        /// The issued token.
        token: &'a PossessionToken,
        /// Error from the last scan, shown inline.
        error: Option<&'a str>,
    },
    /// Riding.
    Active {
        /// The unit in use.
        unit: &'a Unit,
        /// Elapsed time as `m:ss`.
        elapsed: String,
        /// Support contact.
        support: &'a str,
    },
    /// The trip just ended.
    Summary {
        /// The archived trip.
        trip: &'a Trip,
    },
}

impl<'a> View<'a> {
    /// The view for a session's current state.
    #[must_use]
    pub fn of(session: &'a BookingSession, facility: &'a FacilityConfig) -> Self {
        match session.state() {
            SessionState::Browsing => Self::Map {
                location: &facility.current_location,
                units: session.units(),
                error: session.last_error(),
            },
            SessionState::Confirming { unit, .. } => Self::Booking { unit },
            SessionState::AwaitingProof { token, .. } => Self::Scanner {
                token,
                error: session.last_error(),
            },
            SessionState::Active { unit, timer, .. } => Self::Active {
                unit,
                elapsed: timer.display(),
                support: &facility.support_contact,
            },
            SessionState::Completed { trip } => Self::Summary { trip },
        }
    }

    /// Short screen name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Map { .. } => "map",
            Self::Booking { .. } => "booking",
            Self::Scanner { .. } => "scanner",
            Self::Active { .. } => "active",
            Self::Summary { .. } => "summary",
        }
    }
}

impl fmt::Display for View<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Map {
                location,
                units,
                error,
            } => {
                writeln!(f, "Current Location: {location}")?;
                writeln!(f)?;
                writeln!(f, "Available Wheelchairs")?;
                if units.is_empty() {
                    writeln!(f, "  (none)")?;
                }
                for unit in *units {
                    writeln!(
                        f,
                        "  {:<8} {:<24} {:>8}  {:>3}%  {}",
                        unit.id, unit.location, unit.distance, unit.battery, unit.status
                    )?;
                }
                if let Some(error) = error {
                    writeln!(f)?;
                    writeln!(f, "! {error}")?;
                }
            }
            Self::Booking { unit } => {
                writeln!(f, "Confirm Booking")?;
                writeln!(f, "  {} at {}", unit.id, unit.location)?;
                writeln!(f, "  Distance: {}", unit.distance)?;
                writeln!(
                    f,
                    "  Estimated time: {}",
                    unit.estimated_time.as_deref().unwrap_or("N/A")
                )?;
                writeln!(f, "  Battery: {}%", unit.battery)?;
                writeln!(f)?;
                writeln!(
                    f,
                    "Please read the usage instructions on the wheelchair before proceeding."
                )?;
            }
            Self::Scanner { token, error } => {
                writeln!(f, "Scan the QR Code to Start Your Trip")?;
                writeln!(f, "  Unit: {}", token.payload().unit)?;
                writeln!(f, "  Payload: {}", token.encoded())?;
                if let Some(error) = error {
                    writeln!(f, "! {error}")?;
                }
            }
            Self::Active {
                unit,
                elapsed,
                support,
            } => {
                writeln!(f, "Active Booking")?;
                writeln!(f, "  {} at {}", unit.id, unit.location)?;
                writeln!(f, "  Time: {elapsed}")?;
                writeln!(f, "  Battery: {}%", unit.battery)?;
                writeln!(f)?;
                writeln!(f, "Need help? Call support at {support}.")?;
            }
            Self::Summary { trip } => {
                writeln!(f, "Trip Complete")?;
                writeln!(f, "  Unit: {}", trip.unit_id)?;
                writeln!(
                    f,
                    "  Duration: {}",
                    crate::session::format_elapsed(trip.elapsed_secs)
                )?;
            }
        }
        Ok(())
    }
}
