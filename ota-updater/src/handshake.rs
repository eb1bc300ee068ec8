//! One stop-and-wait exchange: write a frame, read its response.
//!
//! # Contract
//! - The whole frame is written before anything is read.  Partial writes are
//!   retried by the transport until the timeout; a frame that still is not
//!   fully sent is a [`Phase::Write`] failure.
//! - Exactly one response frame is read.  Fewer bytes than expected within
//!   the timeout is a [`Phase::Read`] failure and is never taken as an Ack.
//! - Nothing is retried at the protocol level.  The caller decides what a
//!   non-Ack verdict means (for a transfer: abort).

use std::time::{Duration, Instant};

use crate::error::{HandshakeError, Phase, ProtocolError, TransportError};
use crate::packet::decode_response;
use crate::response::{classify, Verdict};
use crate::transport::Transport;

/// Write `segments` back to back as one frame, then read and classify a
/// `response_len`-byte response.
///
/// The write budget is shared across all segments; the read gets a fresh
/// `timeout` of its own.
///
/// A hard I/O error from the transport discards the byte count of the call
/// that failed, so a failed read reports `transferred: 0`.
pub fn exchange<T>(
    transport: &mut T,
    segments: &[&[u8]],
    response_len: usize,
    timeout: Duration,
) -> Result<Verdict, HandshakeError>
where
    T: Transport + ?Sized,
{
    let frame_len: usize = segments.iter().map(|s| s.len()).sum();
    let deadline = Instant::now() + timeout;
    let mut sent = 0;

    for segment in segments {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let n = transport
            .write_all(segment, remaining)
            .map_err(|e| transport_error(Phase::Write, sent, frame_len, Some(e)))?;
        sent += n;
        if n < segment.len() {
            log::debug!("timed out, {sent}/{frame_len} bytes sent");
            return Err(transport_error(Phase::Write, sent, frame_len, None));
        }
    }
    log::trace!("→ {frame_len} byte frame");

    let mut buf = vec![0u8; response_len];
    let got = transport
        .read_exact(&mut buf, timeout)
        .map_err(|e| transport_error(Phase::Read, 0, response_len, Some(e)))?;
    if got < response_len {
        log::debug!("timed out reading response, {got}/{response_len} bytes received");
        return Err(transport_error(Phase::Read, got, response_len, None));
    }

    let response = decode_response(&buf).map_err(ProtocolError::Format)?;
    let verdict = classify(response);
    log::trace!("← {verdict}");
    Ok(verdict)
}

/// [`exchange`] for a frame already held in one buffer.
pub fn exchange_frame<T>(
    transport: &mut T,
    frame: &[u8],
    response_len: usize,
    timeout: Duration,
) -> Result<Verdict, HandshakeError>
where
    T: Transport + ?Sized,
{
    exchange(transport, &[frame], response_len, timeout)
}

/// Turn anything but an Ack into an error.
pub fn require_ack(verdict: Verdict) -> Result<(), HandshakeError> {
    if verdict.is_ack() {
        Ok(())
    } else {
        Err(ProtocolError::UnexpectedStatus(verdict).into())
    }
}

fn transport_error(
    phase: Phase,
    transferred: usize,
    expected: usize,
    source: Option<std::io::Error>,
) -> HandshakeError {
    TransportError {
        phase,
        transferred,
        expected,
        source,
    }
    .into()
}
