//! Error types for wheelport.
//!
//! This module defines all error types used throughout the wheelport crate.
//! Booking errors carry a [`Recovery`] hint so callers can decide whether to
//! retry, send the user back to the map, or ask for another scan.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for wheelport operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Booking Errors ===
    /// The inventory store could not be reached.
    #[error("inventory unavailable: {message}")]
    Unavailable {
        /// Description of what went wrong.
        message: String,
    },

    /// The unit is not available (stale read or lost race).
    #[error("unit '{unit_id}' cannot be selected: {reason}")]
    InvalidSelection {
        /// The unit that was selected.
        unit_id: String,
        /// Why the selection was rejected.
        reason: String,
    },

    /// Confirmation failed and the hold was rolled back.
    #[error("booking failed for unit '{unit_id}': {message}")]
    BookingFailed {
        /// The unit being booked.
        unit_id: String,
        /// Description of what went wrong.
        message: String,
    },

    /// A scanned payload could not be decoded.
    #[error("malformed proof: {message}")]
    MalformedProof {
        /// Description of the decoding failure.
        message: String,
    },

    /// A scanned payload does not match the held reservation.
    #[error("proof does not match the reservation for unit '{unit_id}'")]
    ProofMismatch {
        /// The unit the reservation is for.
        unit_id: String,
    },

    /// The referenced unit does not exist.
    #[error("unit '{unit_id}' not found")]
    NotFound {
        /// The unit that was looked up.
        unit_id: String,
    },

    /// The operation is not valid in the current session state.
    #[error("cannot {operation} while {state}")]
    InvalidTransition {
        /// The attempted operation.
        operation: &'static str,
        /// The state the session was in.
        state: &'static str,
    },

    /// Unit attributes failed validation.
    #[error("invalid unit: {message}")]
    InvalidUnit {
        /// Description of the validation failure.
        message: String,
    },

    /// The possession token could not be rendered as a scannable code.
    #[error("failed to render code: {0}")]
    CodeRender(String),

    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for wheelport operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

/// What the user should do after a booking error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Show a retry affordance; nothing changed.
    Retry,
    /// Go back to the map and pick again.
    Rebrowse,
    /// Stay on the scanner and scan again.
    Rescan,
    /// Not a booking error.
    None,
}

impl Error {
    /// Create a new unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Create a new invalid selection error.
    #[must_use]
    pub fn invalid_selection(unit_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSelection {
            unit_id: unit_id.into(),
            reason: reason.into(),
        }
    }

    /// Create a new booking failed error.
    #[must_use]
    pub fn booking_failed(unit_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BookingFailed {
            unit_id: unit_id.into(),
            message: message.into(),
        }
    }

    /// Create a new malformed proof error.
    #[must_use]
    pub fn malformed_proof(message: impl Into<String>) -> Self {
        Self::MalformedProof {
            message: message.into(),
        }
    }

    /// Create a new proof mismatch error.
    #[must_use]
    pub fn proof_mismatch(unit_id: impl Into<String>) -> Self {
        Self::ProofMismatch {
            unit_id: unit_id.into(),
        }
    }

    /// Create a new not found error.
    #[must_use]
    pub fn not_found(unit_id: impl Into<String>) -> Self {
        Self::NotFound {
            unit_id: unit_id.into(),
        }
    }

    /// Create a new invalid unit error.
    #[must_use]
    pub fn invalid_unit(message: impl Into<String>) -> Self {
        Self::InvalidUnit {
            message: message.into(),
        }
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// How a session should recover from this error.
    #[must_use]
    pub fn recovery(&self) -> Recovery {
        match self {
            Self::Unavailable { .. } => Recovery::Retry,
            Self::InvalidSelection { .. } | Self::BookingFailed { .. } => Recovery::Rebrowse,
            Self::MalformedProof { .. } | Self::ProofMismatch { .. } | Self::NotFound { .. } => {
                Recovery::Rescan
            }
            _ => Recovery::None,
        }
    }

    /// Check if this error happened while validating a scanned code.
    #[must_use]
    pub fn is_scan_error(&self) -> bool {
        self.recovery() == Recovery::Rescan
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::not_found("W-9");
        assert_eq!(err.to_string(), "unit 'W-9' not found");

        let err = Error::unavailable("connection refused");
        assert_eq!(
            err.to_string(),
            "inventory unavailable: connection refused"
        );
    }

    #[test]
    fn test_invalid_selection_display() {
        let err = Error::invalid_selection("W-1", "unit is in use");
        let msg = err.to_string();
        assert!(msg.contains("W-1"));
        assert!(msg.contains("in use"));
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = Error::InvalidTransition {
            operation: "end the session",
            state: "browsing",
        };
        assert_eq!(err.to_string(), "cannot end the session while browsing");
    }

    #[test]
    fn test_recovery_classification() {
        assert_eq!(Error::unavailable("x").recovery(), Recovery::Retry);
        assert_eq!(
            Error::invalid_selection("W-1", "taken").recovery(),
            Recovery::Rebrowse
        );
        assert_eq!(
            Error::booking_failed("W-1", "issuer down").recovery(),
            Recovery::Rebrowse
        );
        assert_eq!(Error::malformed_proof("x").recovery(), Recovery::Rescan);
        assert_eq!(Error::proof_mismatch("W-1").recovery(), Recovery::Rescan);
        assert_eq!(Error::not_found("W-1").recovery(), Recovery::Rescan);
        assert_eq!(Error::internal("bug").recovery(), Recovery::None);
    }

    #[test]
    fn test_is_scan_error() {
        assert!(Error::malformed_proof("bad json").is_scan_error());
        assert!(!Error::unavailable("down").is_scan_error());
    }

    #[test]
    fn test_internal_error() {
        let err = Error::internal("something went wrong");
        assert_eq!(err.to_string(), "internal error: something went wrong");
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_rusqlite_error() {
        let result = rusqlite::Connection::open_with_flags(
            "/nonexistent/path/db.sqlite",
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        );
        if let Err(sqlite_err) = result {
            let err: Error = sqlite_err.into();
            assert!(matches!(err, Error::DatabaseQuery(_)));
        }
    }

    #[test]
    fn test_from_json_error() {
        let json_result: std::result::Result<i32, serde_json::Error> =
            serde_json::from_str("not valid json");
        if let Err(json_err) = json_result {
            let err: Error = json_err.into();
            assert!(matches!(err, Error::Json(_)));
        }
    }

    #[test]
    fn test_config_validation_error_display() {
        let err = Error::ConfigValidation {
            message: "tick_interval_ms must be greater than 0".to_string(),
        };
        assert!(err.to_string().contains("tick_interval_ms"));
    }

    #[test]
    fn test_directory_create_error_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = Error::DirectoryCreate {
            path: PathBuf::from("/root/forbidden"),
            source: io_err,
        };
        assert!(err.to_string().contains("/root/forbidden"));
    }
}
