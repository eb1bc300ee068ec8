//! Device-side reference receiver.
//!
//! The [`Receiver`] is what the firmware on the other end of the link does
//! with the frames a [`crate::transfer::Transfer`] sends, minus the flash
//! writes:
//! - Delimiting frames in a raw byte stream.
//! - Enforcing the session order Start → Header → Data(1..N) → End.
//! - Reassembling the image and checking it against the announced size.
//! - Producing the Ack/Nack response for every frame.
//!
//! It backs [`crate::simulator::Simulator`] and the TCP loopback tests.  It
//! does **not** validate the image contents; that stays the device's job.

use crate::packet::{
    encode_response, frame_len, Command, FileInfo, Packet, Status, MAX_FRAME_LEN,
    RESPONSE_FRAME_LEN, START_MARKER,
};

/// One unit cut from the front of a byte stream by [`next_frame`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delimited {
    /// A complete frame, not yet decoded.
    Frame(Vec<u8>),
    /// The header announced a frame of this many bytes, more than
    /// [`MAX_FRAME_LEN`].  The buffered bytes were discarded.
    Oversized(usize),
}

/// Cut the next frame off the front of `buf`.
///
/// Bytes before a start marker are discarded.  Returns `None` until a whole
/// frame is buffered.  An announcement longer than [`MAX_FRAME_LEN`] clears
/// `buf` so the stream can resynchronise on the next start marker.
pub fn next_frame(buf: &mut Vec<u8>) -> Option<Delimited> {
    let skip = buf
        .iter()
        .position(|&b| b == START_MARKER)
        .unwrap_or(buf.len());
    if skip > 0 {
        log::debug!("skipping {skip} bytes before start marker");
        buf.drain(..skip);
    }

    let len = frame_len(buf)?;
    if len > MAX_FRAME_LEN {
        log::debug!("discarding frame announcing {len} bytes");
        buf.clear();
        return Some(Delimited::Oversized(len));
    }
    if buf.len() < len {
        return None;
    }
    Some(Delimited::Frame(buf.drain(..len).collect()))
}

/// Where a device-side session stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Waiting for a Start command.
    #[default]
    Idle,
    /// Start accepted; waiting for the Header.
    Started,
    /// Header accepted; Data packet `next_seq` expected, or End once
    /// `size` bytes have arrived.
    Receiving { size: u32, next_seq: u16 },
    /// End accepted; the image is complete.
    Complete,
}

/// Reassembles one image from an OTA frame stream.
#[derive(Debug, Default)]
pub struct Receiver {
    state: SessionState,
    image: Vec<u8>,
    /// Bytes received but not yet forming a complete frame.
    pending: Vec<u8>,
}

impl Receiver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Bytes accepted so far.
    pub fn image(&self) -> &[u8] {
        &self.image
    }

    pub fn is_complete(&self) -> bool {
        self.state == SessionState::Complete
    }

    /// Apply one decoded packet and return the status to answer with.
    pub fn on_packet(&mut self, packet: &Packet) -> Status {
        let accepted = match (packet, self.state) {
            (Packet::Command(Command::Abort), _) => {
                self.reset();
                true
            }
            (Packet::Command(Command::Start), SessionState::Idle | SessionState::Complete) => {
                self.reset();
                self.state = SessionState::Started;
                true
            }
            (Packet::Header(info), SessionState::Started) => self.on_header(*info),
            (Packet::Data { seq, payload }, SessionState::Receiving { size, next_seq }) => {
                self.on_data(size, next_seq, *seq, payload)
            }
            (Packet::Command(Command::End), SessionState::Receiving { size, .. }) => {
                let complete = self.image.len() == size as usize;
                if complete {
                    self.state = SessionState::Complete;
                }
                complete
            }
            _ => false,
        };

        if accepted {
            Status::Ack
        } else {
            log::debug!("rejecting {:?} in state {:?}", packet.kind(), self.state);
            Status::Nack
        }
    }

    /// Decode and apply one complete frame.  Undecodable frames are Nacked.
    pub fn on_frame(&mut self, frame: &[u8]) -> Status {
        match Packet::decode(frame) {
            Ok(packet) => self.on_packet(&packet),
            Err(e) => {
                log::debug!("rejecting undecodable frame: {e}");
                Status::Nack
            }
        }
    }

    /// Buffer raw bytes from the link and answer every frame they complete.
    ///
    /// Framing follows [`next_frame`]; an oversized announcement is Nacked.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<[u8; RESPONSE_FRAME_LEN]> {
        self.pending.extend_from_slice(bytes);
        let mut responses = Vec::new();

        while let Some(next) = next_frame(&mut self.pending) {
            let status = match next {
                Delimited::Frame(frame) => self.on_frame(&frame),
                Delimited::Oversized(_) => Status::Nack,
            };
            responses.push(encode_response(status));
        }

        responses
    }

    fn on_header(&mut self, info: FileInfo) -> bool {
        self.image.reserve(info.size as usize);
        self.state = SessionState::Receiving {
            size: info.size,
            next_seq: 1,
        };
        true
    }

    fn on_data(&mut self, size: u32, next_seq: u16, seq: u16, payload: &[u8]) -> bool {
        if seq != next_seq {
            log::debug!("expected data packet {next_seq}, got {seq}");
            return false;
        }
        if self.image.len() + payload.len() > size as usize {
            log::debug!("data packet {seq} overruns announced size {size}");
            return false;
        }
        self.image.extend_from_slice(payload);
        self.state = SessionState::Receiving {
            size,
            next_seq: next_seq.wrapping_add(1),
        };
        true
    }

    fn reset(&mut self) {
        self.state = SessionState::Idle;
        self.image.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{encode_command, encode_data_frame, encode_header};

    fn data(seq: u16, payload: &[u8]) -> Vec<u8> {
        encode_data_frame(seq, payload).unwrap().to_vec()
    }

    fn started(size: u32) -> Receiver {
        let mut rx = Receiver::new();
        assert_eq!(rx.on_frame(&encode_command(Command::Start)), Status::Ack);
        assert_eq!(rx.on_frame(&encode_header(FileInfo::new(size))), Status::Ack);
        rx
    }

    #[test]
    fn full_session() {
        let mut rx = started(5);
        assert_eq!(rx.on_frame(&data(1, b"abc")), Status::Ack);
        assert_eq!(rx.on_frame(&data(2, b"de")), Status::Ack);
        assert_eq!(rx.on_frame(&encode_command(Command::End)), Status::Ack);
        assert!(rx.is_complete());
        assert_eq!(rx.image(), b"abcde");
    }

    #[test]
    fn header_before_start_is_nacked() {
        let mut rx = Receiver::new();
        assert_eq!(rx.on_frame(&encode_header(FileInfo::new(1))), Status::Nack);
        assert_eq!(rx.state(), SessionState::Idle);
    }

    #[test]
    fn sequence_gap_is_nacked() {
        let mut rx = started(10);
        assert_eq!(rx.on_frame(&data(2, b"x")), Status::Nack);
        assert_eq!(rx.on_frame(&data(1, b"x")), Status::Ack);
        assert_eq!(rx.on_frame(&data(1, b"x")), Status::Nack, "repeat");
    }

    #[test]
    fn overrun_and_early_end_are_nacked() {
        let mut rx = started(3);
        assert_eq!(rx.on_frame(&data(1, b"abcd")), Status::Nack);
        assert_eq!(rx.on_frame(&data(1, b"ab")), Status::Ack);
        assert_eq!(rx.on_frame(&encode_command(Command::End)), Status::Nack);
        assert!(!rx.is_complete());
    }

    #[test]
    fn empty_image_completes_without_data() {
        let mut rx = started(0);
        assert_eq!(rx.on_frame(&encode_command(Command::End)), Status::Ack);
        assert!(rx.is_complete());
    }

    #[test]
    fn abort_resets() {
        let mut rx = started(3);
        rx.on_frame(&data(1, b"ab"));
        assert_eq!(rx.on_frame(&encode_command(Command::Abort)), Status::Ack);
        assert_eq!(rx.state(), SessionState::Idle);
        assert!(rx.image().is_empty());
    }

    #[test]
    fn garbage_frame_is_nacked() {
        let mut rx = Receiver::new();
        assert_eq!(rx.on_frame(&[0x02, 0x09, 0, 0, 0, 0, 0, 0, 0, 0, 0x03]), Status::Nack);
    }

    #[test]
    fn feed_delimits_split_frames() {
        let mut rx = Receiver::new();
        let mut stream = encode_command(Command::Start).to_vec();
        stream.extend_from_slice(&encode_header(FileInfo::new(2)));
        stream.extend_from_slice(&data(1, b"hi"));
        stream.extend_from_slice(&encode_command(Command::End));

        let mut responses = Vec::new();
        // Leading noise, then the stream in awkward pieces.
        responses.extend(rx.feed(&[0xff, 0x00]));
        for piece in stream.chunks(5) {
            responses.extend(rx.feed(piece));
        }

        assert_eq!(responses, vec![encode_response(Status::Ack); 4]);
        assert!(rx.is_complete());
        assert_eq!(rx.image(), b"hi");
    }

    #[test]
    fn next_frame_resynchronises() {
        let mut buf = vec![0xff, 0x00];
        buf.extend_from_slice(&[0x02, 0x02, 0x01, 0x00, 0xff, 0xff]);
        assert_eq!(next_frame(&mut buf), Some(Delimited::Oversized(0xffff + 11)));
        assert!(buf.is_empty());

        let start = encode_command(Command::Start);
        buf.extend_from_slice(&[0x55]);
        buf.extend_from_slice(&start[..7]);
        assert_eq!(next_frame(&mut buf), None);
        buf.extend_from_slice(&start[7..]);
        assert_eq!(next_frame(&mut buf), Some(Delimited::Frame(start.to_vec())));
        assert_eq!(next_frame(&mut buf), None);
    }

    #[test]
    fn feed_nacks_oversized_announcement() {
        let mut rx = Receiver::new();
        let responses = rx.feed(&[0x02, 0x02, 0x01, 0x00, 0xff, 0xff]);
        assert_eq!(responses, vec![encode_response(Status::Nack)]);
        assert!(rx.feed(&[]).is_empty());
    }
}
