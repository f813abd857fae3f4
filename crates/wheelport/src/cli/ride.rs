//! Interactive booking flow for the `book` command.
//!
//! Drives a [`BookingSession`] from selection to the trip summary, reading
//! answers and scanned payloads from a [`CodeReader`] and writing each
//! screen to `out`.

use std::io::Write;
use std::time::Duration;

use tracing::warn;

use crate::config::FacilityConfig;
use crate::error::{Error, Result};
use crate::scanner::{CodeReader, ScanEvent};
use crate::session::BookingSession;
use crate::unit::Trip;

/// Attempts at releasing the unit before giving up.
const END_ATTEMPTS: u32 = 3;

/// Run one booking of `unit_id` to completion.
///
/// Returns the archived trip, or `None` if the user cancelled or the input
/// closed before the trip started.
///
/// Once a unit is held, every exit releases it: a failure before the trip
/// cancels the booking, and a failure or Ctrl-C during the trip ends it.
///
/// # Errors
///
/// Returns an error if the unit cannot be selected or confirmed, if the
/// trip cannot be ended, or if writing to `out` fails.
pub async fn run<R, W>(
    session: &mut BookingSession,
    unit_id: &str,
    reader: &mut R,
    out: &mut W,
    facility: &FacilityConfig,
    tick: Duration,
) -> Result<Option<Trip>>
where
    R: CodeReader + ?Sized,
    W: Write,
{
    session.browse().await?;
    session.select(unit_id).await?;

    match book(session, reader, out, facility).await {
        Ok(true) => {}
        Ok(false) => {
            session.cancel().await?;
            writeln!(out, "Booking cancelled.")?;
            return Ok(None);
        }
        Err(e) => {
            if let Err(cancel_err) = session.cancel().await {
                warn!("Failed to release hold after error: {}", cancel_err);
            }
            return Err(e);
        }
    }

    let ridden = ride(session, reader, out, facility, tick).await;
    let trip = match (ridden, end(session, tick).await) {
        (Ok(()), ended) => ended?,
        (Err(e), Ok(_)) => return Err(e),
        (Err(e), Err(end_err)) => {
            warn!("Trip display failed: {}", e);
            return Err(end_err);
        }
    };
    write!(out, "{}", session.view(facility))?;
    Ok(Some(trip))
}

/// Confirm the held unit and wait for its code to be scanned; `false`
/// means the user backed out.
async fn book<R, W>(
    session: &mut BookingSession,
    reader: &mut R,
    out: &mut W,
    facility: &FacilityConfig,
) -> Result<bool>
where
    R: CodeReader + ?Sized,
    W: Write,
{
    write!(out, "{}", session.view(facility))?;
    if !confirm(reader, out).await? {
        return Ok(false);
    }
    session.confirm().await?;
    scan(session, reader, out, facility).await
}

/// Ask for confirmation; `false` means cancel.
async fn confirm<R, W>(reader: &mut R, out: &mut W) -> Result<bool>
where
    R: CodeReader + ?Sized,
    W: Write,
{
    loop {
        writeln!(out, "Type 'yes' to confirm or 'cancel' to go back.")?;
        out.flush()?;
        match reader.next_event().await {
            Some(ScanEvent::Payload(answer)) => match answer.to_ascii_lowercase().as_str() {
                "yes" | "y" => return Ok(true),
                "cancel" | "no" | "n" => return Ok(false),
                _ => {}
            },
            Some(ScanEvent::Warning(message)) => writeln!(out, "! {message}")?,
            None => {
                warn!("Input closed before the booking was confirmed");
                return Ok(false);
            }
        }
    }
}

/// Show the code and wait for a matching scan; `false` means cancel.
async fn scan<R, W>(
    session: &mut BookingSession,
    reader: &mut R,
    out: &mut W,
    facility: &FacilityConfig,
) -> Result<bool>
where
    R: CodeReader + ?Sized,
    W: Write,
{
    if let Some(token) = session.token() {
        match token.render_code() {
            Ok(code) => writeln!(out, "{code}")?,
            Err(e) => warn!("{}", e),
        }
    }
    write!(out, "{}", session.view(facility))?;

    loop {
        writeln!(out, "Scan the code at the unit, or type 'cancel'.")?;
        out.flush()?;
        match reader.next_event().await {
            Some(ScanEvent::Payload(payload)) if payload.eq_ignore_ascii_case("cancel") => {
                return Ok(false);
            }
            Some(ScanEvent::Payload(payload)) => match session.present_proof(&payload).await {
                Ok(()) => return Ok(true),
                // The session stays on the scanner; show why and wait again
                Err(e) => writeln!(out, "! {}", scan_message(&e))?,
            },
            Some(ScanEvent::Warning(message)) => writeln!(out, "! {message}")?,
            None => {
                warn!("Input closed before the code was scanned");
                return Ok(false);
            }
        }
    }
}

/// Show the ticking timer until the user types `end` or presses Ctrl-C.
async fn ride<R, W>(
    session: &BookingSession,
    reader: &mut R,
    out: &mut W,
    facility: &FacilityConfig,
    tick: Duration,
) -> Result<()>
where
    R: CodeReader + ?Sized,
    W: Write,
{
    let Some(timer) = session.timer() else {
        return Err(Error::internal("trip started without a timer"));
    };
    write!(out, "{}", session.view(facility))?;
    writeln!(out, "Type 'end' to finish your trip.")?;
    out.flush()?;

    let mut ticks = timer.ticks(tick);
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);
    let mut interruptible = true;
    loop {
        tokio::select! {
            _ = ticks.tick() => {
                writeln!(out, "Time: {}", timer.display())?;
                out.flush()?;
            }
            signal = &mut interrupt, if interruptible => match signal {
                Ok(()) => {
                    warn!("Interrupted during the trip; ending it");
                    return Ok(());
                }
                Err(e) => {
                    warn!("Cannot listen for Ctrl-C: {}", e);
                    interruptible = false;
                }
            },
            event = reader.next_event() => match event {
                Some(ScanEvent::Payload(input)) if input.eq_ignore_ascii_case("end") => {
                    return Ok(());
                }
                Some(ScanEvent::Payload(_)) => writeln!(out, "Type 'end' to finish your trip.")?,
                Some(ScanEvent::Warning(message)) => writeln!(out, "! {message}")?,
                None => {
                    warn!("Input closed during the trip; ending it");
                    return Ok(());
                }
            },
        }
    }
}

/// End the trip, retrying while the store is unreachable.
async fn end(session: &mut BookingSession, delay: Duration) -> Result<Trip> {
    let mut attempt = 1;
    loop {
        match session.end_session().await {
            Ok(trip) => return Ok(trip),
            Err(e @ Error::Unavailable { .. }) if attempt < END_ATTEMPTS => {
                warn!("Ending trip failed (attempt {}): {}", attempt, e);
                attempt += 1;
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

fn scan_message(err: &Error) -> &'static str {
    match err {
        Error::MalformedProof { .. } => "Invalid QR code format",
        Error::NotFound { .. } => "Wheelchair not found",
        Error::ProofMismatch { .. } => "Invalid or expired QR code",
        _ => "Could not check the code, try again",
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::mpsc;

    use super::*;
    use crate::inventory::SqliteInventory;
    use crate::session::SessionOptions;
    use crate::token::{LocalIssuer, PossessionToken};
    use crate::unit::{Unit, UnitStatus};

    fn setup() -> (Arc<SqliteInventory>, BookingSession) {
        let inventory = Arc::new(SqliteInventory::open_in_memory().unwrap());
        inventory
            .provision(&Unit::new("W-1", "Gate 4", "120m", 80).unwrap())
            .unwrap();
        let session = BookingSession::new(
            inventory.clone(),
            Arc::new(LocalIssuer),
            SessionOptions::default(),
        );
        (inventory, session)
    }

    fn payload(text: &str) -> ScanEvent {
        ScanEvent::Payload(text.to_string())
    }

    /// Wait until the unit carries a token, then rebuild its payload.
    async fn issued_payload(inventory: &SqliteInventory, unit_id: &str) -> String {
        loop {
            let unit = inventory.unit(unit_id).unwrap().unwrap();
            if let (Some(reservation), Some(_)) = (unit.reservation_id, unit.token_digest) {
                let token = PossessionToken::new(unit_id, reservation).unwrap();
                return token.encoded().to_string();
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    async fn wait_for_status(inventory: &SqliteInventory, unit_id: &str, status: UnitStatus) {
        while inventory.unit(unit_id).unwrap().unwrap().status != status {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    /// Accepts output until `marker` has been written, then fails.
    struct BrokenAfter {
        written: Vec<u8>,
        marker: &'static str,
    }

    impl BrokenAfter {
        fn new(marker: &'static str) -> Self {
            Self {
                written: Vec::new(),
                marker,
            }
        }
    }

    impl Write for BrokenAfter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if String::from_utf8_lossy(&self.written).contains(self.marker) {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "pipe closed",
                ));
            }
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_ride() {
        let (inventory, mut session) = setup();
        let facility = FacilityConfig::default();
        let (tx, mut rx) = mpsc::channel(8);
        let mut out = Vec::new();

        let feeder = async {
            tx.send(payload("yes")).await.unwrap();
            let scanned = issued_payload(&inventory, "W-1").await;
            tx.send(payload(&scanned)).await.unwrap();
            wait_for_status(&inventory, "W-1", UnitStatus::InUse).await;
            tokio::time::sleep(Duration::from_millis(65_500)).await;
            tx.send(payload("end")).await.unwrap();
        };
        let ride = run(
            &mut session,
            "W-1",
            &mut rx,
            &mut out,
            &facility,
            Duration::from_secs(1),
        );
        let (trip, ()) = tokio::join!(ride, feeder);

        let trip = trip.unwrap().unwrap();
        assert_eq!(trip.unit_id, "W-1");
        assert_eq!(trip.elapsed_secs, 65);

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Confirm Booking"));
        assert!(text.contains("Scan the QR Code to Start Your Trip"));
        assert!(text.contains("Active Booking"));
        assert!(text.contains("Time: 0:01"));
        assert!(text.contains("Time: 1:04"));
        assert!(text.contains("Duration: 1:05"));

        let unit = inventory.unit("W-1").unwrap().unwrap();
        assert_eq!(unit.status, UnitStatus::Available);
        assert!(unit.token_digest.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_broken_output_during_trip_ends_it() {
        let (inventory, mut session) = setup();
        let (tx, mut rx) = mpsc::channel(8);
        let mut out = BrokenAfter::new("Active Booking");

        let feeder = async {
            tx.send(payload("yes")).await.unwrap();
            let scanned = issued_payload(&inventory, "W-1").await;
            tx.send(payload(&scanned)).await.unwrap();
        };
        let facility = FacilityConfig::default();
        let ride = run(
            &mut session,
            "W-1",
            &mut rx,
            &mut out,
            &facility,
            Duration::from_secs(1),
        );
        let (result, ()) = tokio::join!(ride, feeder);

        let err = result.unwrap_err();
        assert!(matches!(err, Error::Io(_)), "{err}");
        assert_eq!(session.state().name(), "completed");

        let unit = inventory.unit("W-1").unwrap().unwrap();
        assert_eq!(unit.status, UnitStatus::Available);
        assert!(unit.reservation_id.is_none());
        assert!(unit.token_digest.is_none());
        assert_eq!(inventory.recent_trips(10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_broken_output_while_scanning_releases_hold() {
        let (inventory, mut session) = setup();
        let (tx, mut rx) = mpsc::channel(8);
        tx.send(payload("yes")).await.unwrap();
        let mut out = BrokenAfter::new("Scan the QR Code");

        let err = run(
            &mut session,
            "W-1",
            &mut rx,
            &mut out,
            &FacilityConfig::default(),
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Io(_)), "{err}");
        assert_eq!(session.state(), &crate::session::SessionState::Browsing);
        let unit = inventory.unit("W-1").unwrap().unwrap();
        assert!(unit.is_available());
        assert!(unit.reservation_id.is_none());
    }

    #[tokio::test]
    async fn test_broken_output_before_confirming_releases_hold() {
        let (inventory, mut session) = setup();
        let (_tx, mut rx) = mpsc::channel::<ScanEvent>(1);
        let mut out = BrokenAfter::new("Confirm Booking");

        let err = run(
            &mut session,
            "W-1",
            &mut rx,
            &mut out,
            &FacilityConfig::default(),
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Io(_)), "{err}");
        assert!(inventory.unit("W-1").unwrap().unwrap().is_available());
    }

    #[tokio::test]
    async fn test_cancel_at_confirmation() {
        let (inventory, mut session) = setup();
        let (tx, mut rx) = mpsc::channel(8);
        tx.send(payload("maybe")).await.unwrap();
        tx.send(payload("cancel")).await.unwrap();
        let mut out = Vec::new();

        let trip = run(
            &mut session,
            "W-1",
            &mut rx,
            &mut out,
            &FacilityConfig::default(),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        assert!(trip.is_none());
        assert!(inventory.unit("W-1").unwrap().unwrap().is_available());
        assert!(String::from_utf8(out).unwrap().contains("Booking cancelled."));
    }

    #[tokio::test]
    async fn test_bad_scan_shown_inline() {
        let (inventory, mut session) = setup();
        let (tx, mut rx) = mpsc::channel(8);
        tx.send(payload("yes")).await.unwrap();
        tx.send(payload("wheelchair:W-1")).await.unwrap();
        tx.send(ScanEvent::Warning("camera unavailable".to_string()))
            .await
            .unwrap();
        tx.send(payload("cancel")).await.unwrap();
        let mut out = Vec::new();

        let trip = run(
            &mut session,
            "W-1",
            &mut rx,
            &mut out,
            &FacilityConfig::default(),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        assert!(trip.is_none());
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("! Invalid QR code format"));
        assert!(text.contains("! camera unavailable"));

        let unit = inventory.unit("W-1").unwrap().unwrap();
        assert!(unit.is_available());
        assert!(unit.reservation_id.is_none());
    }

    #[tokio::test]
    async fn test_closed_input_releases_hold() {
        let (inventory, mut session) = setup();
        let (tx, mut rx) = mpsc::channel(8);
        tx.send(payload("yes")).await.unwrap();
        drop(tx);
        let mut out = Vec::new();

        let trip = run(
            &mut session,
            "W-1",
            &mut rx,
            &mut out,
            &FacilityConfig::default(),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        assert!(trip.is_none());
        assert!(inventory.unit("W-1").unwrap().unwrap().is_available());
    }

    #[tokio::test]
    async fn test_unknown_unit_fails_before_prompt() {
        let (_, mut session) = setup();
        let (_tx, mut rx) = mpsc::channel::<ScanEvent>(1);
        let mut out = Vec::new();

        let err = run(
            &mut session,
            "W-404",
            &mut rx,
            &mut out,
            &FacilityConfig::default(),
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::NotFound { .. }));
        assert!(out.is_empty());
    }

    #[test]
    fn test_scan_messages() {
        assert_eq!(
            scan_message(&Error::malformed_proof("x")),
            "Invalid QR code format"
        );
        assert_eq!(
            scan_message(&Error::proof_mismatch("W-1")),
            "Invalid or expired QR code"
        );
        assert_eq!(scan_message(&Error::not_found("W-1")), "Wheelchair not found");
    }
}
