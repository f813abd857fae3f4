//! Code-capture input.
//!
//! A [`CodeReader`] yields whatever the capture device decoded, one event at
//! a time. Device errors are reported as [`ScanEvent::Warning`] so the
//! session can keep waiting for a good scan instead of aborting.

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc;
use tracing::warn;

/// One event from a capture device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    /// A decoded payload or typed command.
    Payload(String),
    /// The device failed to read; not fatal.
    Warning(String),
}

/// Source of scanned payloads.
///
/// `next_event` must be cancel safe: it is raced against timers.
#[async_trait]
pub trait CodeReader: Send {
    /// The name of this reader (for logging).
    fn name(&self) -> &'static str;

    /// Wait for the next event; `None` once the source is closed.
    async fn next_event(&mut self) -> Option<ScanEvent>;
}

/// Reads one payload per line, skipping blank lines.
#[derive(Debug)]
pub struct LineReader<R> {
    lines: Lines<R>,
    failed: bool,
}

impl<R: AsyncBufRead + Unpin + Send> LineReader<R> {
    /// Wrap a buffered reader.
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            failed: false,
        }
    }
}

impl LineReader<BufReader<Stdin>> {
    /// Read payloads typed or piped into standard input.
    #[must_use]
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> CodeReader for LineReader<R> {
    fn name(&self) -> &'static str {
        "lines"
    }

    async fn next_event(&mut self) -> Option<ScanEvent> {
        if self.failed {
            return None;
        }
        loop {
            match self.lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if !line.is_empty() {
                        return Some(ScanEvent::Payload(line.to_string()));
                    }
                }
                Ok(None) => return None,
                Err(e) => {
                    // A broken stream will not recover; report once then close
                    warn!("Scanner read failed: {}", e);
                    self.failed = true;
                    return Some(ScanEvent::Warning(format!("Error scanning QR code: {e}")));
                }
            }
        }
    }
}

#[async_trait]
impl CodeReader for mpsc::Receiver<ScanEvent> {
    fn name(&self) -> &'static str {
        "channel"
    }

    async fn next_event(&mut self) -> Option<ScanEvent> {
        self.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_line_reader_skips_blank_lines() {
        let input: &[u8] = b"\n  {\"unit\":\"W-1\"}  \n\nend\n";
        let mut reader = LineReader::new(input);

        assert_eq!(
            reader.next_event().await,
            Some(ScanEvent::Payload("{\"unit\":\"W-1\"}".to_string()))
        );
        assert_eq!(
            reader.next_event().await,
            Some(ScanEvent::Payload("end".to_string()))
        );
        assert_eq!(reader.next_event().await, None);
    }

    #[tokio::test]
    async fn test_line_reader_reports_invalid_utf8_as_warning() {
        let input: &[u8] = b"\xff\xfe\n";
        let mut reader = LineReader::new(input);

        let event = reader.next_event().await;
        assert!(matches!(event, Some(ScanEvent::Warning(_))));
        assert_eq!(reader.next_event().await, None);
    }

    #[tokio::test]
    async fn test_channel_reader() {
        let (tx, mut rx) = mpsc::channel(4);
        tx.send(ScanEvent::Warning("camera busy".to_string()))
            .await
            .unwrap();
        drop(tx);

        assert_eq!(rx.name(), "channel");
        assert_eq!(
            rx.next_event().await,
            Some(ScanEvent::Warning("camera busy".to_string()))
        );
        assert_eq!(rx.next_event().await, None);
    }
}
