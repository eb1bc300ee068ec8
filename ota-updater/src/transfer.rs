//! Drives a complete firmware transfer over one [`Transport`].
//!
//! # Sequence
//!
//! ```text
//!  host                                 device
//!   │ ── Command(Start) ─────────────────▶ │
//!   │ ◀──────────────────────────── ACK ── │
//!   │ ── Header(FileInfo) ───────────────▶ │
//!   │ ◀──────────────────────────── ACK ── │
//!   │ ── Data(1) … Data(N) ──────────────▶ │   one at a time,
//!   │ ◀──────────────────────────── ACK ── │   each ACKed before the next
//!   │ ── Command(End) ───────────────────▶ │
//!   │ ◀──────────────────────────── ACK ── │
//! ```
//!
//! `N = ceil(size / max_payload)`.  An image that is an exact multiple of
//! `max_payload` is sent in exactly `size / max_payload` packets: no
//! zero-length trailing Data packet is ever produced.  An empty image sends
//! no Data packets at all.
//!
//! The first handshake that does not end in an ACK aborts the transfer.
//! Nothing else is sent afterwards (not even an Abort command) and the
//! transport is left for the caller to close.

use std::time::{Duration, Instant};

use crate::config::TransferConfig;
use crate::error::{Step, TransferError};
use crate::handshake::{exchange, require_ack};
use crate::packet::{
    encode_command, encode_header, Command, DataFrame, FileInfo, RESPONSE_FRAME_LEN,
};
use crate::state::TransferState;
use crate::transport::Transport;

/// Number of Data packets needed for `size` bytes.
pub fn data_packet_count(size: usize, max_payload: usize) -> usize {
    size.div_ceil(max_payload)
}

/// Splits an image into framed, sequence-numbered Data packets.
///
/// Sequence numbers start at 1 and increase by one per packet.  Payloads are
/// borrowed from the image.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    rest: &'a [u8],
    max_payload: usize,
    next_seq: u16,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = DataFrame<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        let (chunk, rest) = self.rest.split_at(self.rest.len().min(self.max_payload));
        self.rest = rest;
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        Some(DataFrame::from_chunk(seq, chunk))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = data_packet_count(self.rest.len(), self.max_payload);
        (n, Some(n))
    }
}

impl ExactSizeIterator for Chunks<'_> {}

/// Check every precondition that can be checked without I/O and return the
/// Data packets `image` will be sent as.
///
/// Fails with [`TransferError::Config`], [`TransferError::Size`] or
/// [`TransferError::TooManyChunks`].
pub fn plan<'a>(image: &'a [u8], config: &TransferConfig) -> Result<Chunks<'a>, TransferError> {
    config.validate()?;
    let size = image.len();
    if size > config.max_image_size || u32::try_from(size).is_err() {
        return Err(TransferError::Size {
            size,
            max: config.max_image_size,
        });
    }
    let chunks = data_packet_count(size, config.max_payload);
    if chunks > usize::from(u16::MAX) {
        return Err(TransferError::TooManyChunks { chunks });
    }
    Ok(Chunks {
        rest: image,
        max_payload: config.max_payload,
        next_seq: 1,
    })
}

/// Summary of a completed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub data_packets: usize,
    pub bytes_sent: usize,
    pub elapsed: Duration,
}

/// One transfer attempt over a borrowed transport.
///
/// The transport is exclusively borrowed for the whole attempt, so no other
/// reader or writer can interleave with the stop-and-wait exchange.
pub struct Transfer<'t, T: Transport + ?Sized> {
    transport: &'t mut T,
    config: TransferConfig,
    state: TransferState,
}

impl<'t, T: Transport + ?Sized> Transfer<'t, T> {
    pub fn new(transport: &'t mut T, config: TransferConfig) -> Self {
        Self {
            transport,
            config,
            state: TransferState::Idle,
        }
    }

    /// Where the state machine stopped.  After a failed [`Transfer::run`]
    /// this is [`TransferState::Aborted`].
    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Send `image` to the device.
    ///
    /// A `Transfer` runs once; calling this again after it has left
    /// [`TransferState::Idle`] fails with [`TransferError::AlreadyRun`]
    /// without touching the transport.
    pub fn run(&mut self, image: &[u8]) -> Result<TransferReport, TransferError> {
        if self.state != TransferState::Idle {
            return Err(TransferError::AlreadyRun(self.state));
        }
        let chunks = plan(image, &self.config)?;
        let total = chunks.len();
        let started = Instant::now();
        log::info!(
            "sending firmware image: {} bytes in {} data packets",
            image.len(),
            total
        );

        // Idle → StartSent
        let start = encode_command(Command::Start);
        self.step(Step::Start, &[&start[..]], TransferState::StartSent)?;

        // StartSent → HeaderSent.  `plan` guarantees the size fits in u32.
        let info = FileInfo::new(image.len() as u32);
        let header = encode_header(info);
        self.step(Step::Header, &[&header[..]], TransferState::HeaderSent)?;

        // HeaderSent → Sending(1) → … → Sending(N)
        for frame in chunks {
            let seq = frame.seq();
            let sending = TransferState::Sending { seq };
            self.state = sending;
            self.step(Step::Data(seq), &frame.segments(), sending)?;
            log::info!("sent data packet {seq}/{total} ({} bytes)", frame.payload.len());
        }

        // → EndSent → Done
        let end = encode_command(Command::End);
        self.step(Step::End, &[&end[..]], TransferState::EndSent)?;
        self.state = TransferState::Done;

        let report = TransferReport {
            data_packets: total,
            bytes_sent: image.len(),
            elapsed: started.elapsed(),
        };
        log::info!(
            "firmware update complete: {} bytes in {:.2?}",
            report.bytes_sent,
            report.elapsed
        );
        Ok(report)
    }

    /// One handshake that must end in an ACK.  Moves to `next` on success
    /// and to [`TransferState::Aborted`] on anything else.
    fn step(
        &mut self,
        step: Step,
        segments: &[&[u8]],
        next: TransferState,
    ) -> Result<(), TransferError> {
        log::debug!("sending {step}");
        let outcome = exchange(
            &mut *self.transport,
            segments,
            RESPONSE_FRAME_LEN,
            self.config.timeout,
        )
        .and_then(require_ack);

        match outcome {
            Ok(()) => {
                log::debug!("{step} acknowledged");
                self.state = next;
                Ok(())
            }
            Err(source) => {
                log::warn!("{step} failed in state {}: {source}", self.state);
                self.state = TransferState::Aborted;
                Err(TransferError::Aborted { step, source })
            }
        }
    }
}

/// Run one transfer of `image` over `transport` with `config`.
pub fn send_firmware<T>(
    transport: &mut T,
    image: &[u8],
    config: &TransferConfig,
) -> Result<TransferReport, TransferError>
where
    T: Transport + ?Sized,
{
    Transfer::new(transport, config.clone()).run(image)
}
