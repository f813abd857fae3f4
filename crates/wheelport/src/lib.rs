//! `wheelport` - Booking shared wheelchairs at a facility
//!
//! This library provides the inventory store, the booking session state
//! machine, possession tokens and the screens shown along the way.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod error;
pub mod inventory;
pub mod logging;
pub mod scanner;
pub mod session;
pub mod token;
pub mod unit;
pub mod view;

pub use config::Config;
pub use error::{Error, Recovery, Result};
pub use inventory::{Inventory, InventoryStats, SqliteInventory, StatusUpdate};
pub use logging::init_logging;
pub use scanner::{CodeReader, LineReader, ScanEvent};
pub use session::{format_elapsed, BookingSession, SessionOptions, SessionState, TripTimer};
pub use token::{LocalIssuer, PossessionToken, ProofPayload, TokenIssuer};
pub use unit::{Reservation, Trip, Unit, UnitStatus};
pub use view::View;
