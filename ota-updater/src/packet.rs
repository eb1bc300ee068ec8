//! Wire-format definitions for OTA packets.
//!
//! Every frame exchanged with the target device is one of four packet kinds
//! sharing a common header.  This module is responsible for:
//! - Defining the on-wire binary layout (markers, kind, sequence, length).
//! - Serialising each packet kind into a byte buffer ready for transmission.
//! - Deserialising a raw byte slice back into a [`Packet`], returning errors
//!   for malformed or truncated input.
//!
//! No I/O happens here; this is pure data transformation.
//!
//! # Wire format
//!
//! All multi-byte integers are **little-endian**.  There is no padding.
//!
//! ```text
//! +-------+------+----------+-------------+-----------------+----------+-----+
//! |  u8   |  u8  |   u16    |     u16     |  payload_len B  |   u32    | u8  |
//! +-------+------+----------+-------------+-----------------+----------+-----+
//! | 0x02  | kind | sequence | payload_len |     payload     | checksum | 0x03|
//! +-------+------+----------+-------------+-----------------+----------+-----+
//! ```
//!
//! Fixed per-frame overhead: [`OVERHEAD`] = 11 bytes.
//! start(1) + kind(1) + sequence(2) + payload_len(2) + checksum(4) + end(1)
//!
//! The sequence field is meaningful only for [`PacketKind::Data`]; every other
//! kind is serialised with `0` and decoders ignore it.
//!
//! The checksum field is **not an integrity check**.  Encoders always write
//! zero and decoders never verify it; see [`Checksum`].

use thiserror::Error;

/// Start-of-frame sentinel.
pub const START_MARKER: u8 = 0x02;
/// End-of-frame sentinel.
pub const END_MARKER: u8 = 0x03;

/// Largest payload a single frame may carry.
pub const MAX_PAYLOAD: usize = 256;
/// Bytes used by every field except the payload.
pub const OVERHEAD: usize = 11;
/// Largest frame on the wire.
pub const MAX_FRAME_LEN: usize = MAX_PAYLOAD + OVERHEAD;

/// start + kind + sequence + payload_len.
pub const HEADER_LEN: usize = 6;
/// checksum + end.
pub const FOOTER_LEN: usize = 5;

/// Encoded size of a [`FileInfo`].
pub const FILE_INFO_LEN: usize = 8;

/// Size of a complete Command frame.
pub const COMMAND_FRAME_LEN: usize = OVERHEAD + 1;
/// Size of a complete Header frame.
pub const HEADER_FRAME_LEN: usize = OVERHEAD + FILE_INFO_LEN;
/// Size of a complete Response frame.
pub const RESPONSE_FRAME_LEN: usize = OVERHEAD + 1;

// Byte offsets of each field within the serialised frame.
const OFF_START: usize = 0;
const OFF_KIND: usize = 1;
const OFF_SEQ: usize = 2;
const OFF_PAYLOAD_LEN: usize = 4;
const OFF_PAYLOAD: usize = HEADER_LEN;

/// The `kind` header field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketKind {
    Command = 0,
    Header = 1,
    Data = 2,
    Response = 3,
}

impl TryFrom<u8> for PacketKind {
    type Error = PacketError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Command),
            1 => Ok(Self::Header),
            2 => Ok(Self::Data),
            3 => Ok(Self::Response),
            other => Err(PacketError::UnknownKind(other)),
        }
    }
}

/// Command codes carried by a Command packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Begin an update session.
    Start = 0,
    /// All data has been sent; the device may finalise the image.
    End = 1,
    /// Discard the session.
    Abort = 2,
}

impl TryFrom<u8> for Command {
    type Error = PacketError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Start),
            1 => Ok(Self::End),
            2 => Ok(Self::Abort),
            other => Err(PacketError::UnknownCommand(other)),
        }
    }
}

/// Status codes a well-behaved device puts in a Response packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Ack = 0x00,
    Nack = 0x01,
}

/// Placeholder for the 32-bit checksum fields.
///
/// No checksum algorithm is implemented on either side of the link.  The
/// encoder always emits [`Checksum::Unimplemented`] (four zero bytes).  A
/// nonzero value read off the wire is surfaced as [`Checksum::Unverified`]
/// and must not be treated as proof of integrity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Checksum {
    #[default]
    Unimplemented,
    Unverified(u32),
}

impl Checksum {
    fn to_wire(self) -> u32 {
        match self {
            Self::Unimplemented => 0,
            Self::Unverified(raw) => raw,
        }
    }

    fn from_wire(raw: u32) -> Self {
        if raw == 0 {
            Self::Unimplemented
        } else {
            Self::Unverified(raw)
        }
    }
}

/// Firmware image metadata carried by the Header packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileInfo {
    /// Image size in bytes.
    pub size: u32,
    /// Image checksum; always [`Checksum::Unimplemented`] when produced here.
    pub checksum: Checksum,
}

impl FileInfo {
    pub fn new(size: u32) -> Self {
        Self {
            size,
            checksum: Checksum::Unimplemented,
        }
    }

    fn to_bytes(self) -> [u8; FILE_INFO_LEN] {
        let mut out = [0u8; FILE_INFO_LEN];
        out[..4].copy_from_slice(&self.size.to_le_bytes());
        out[4..].copy_from_slice(&self.checksum.to_wire().to_le_bytes());
        out
    }

    fn from_bytes(buf: &[u8]) -> Self {
        Self {
            size: read_u32(buf, 0),
            checksum: Checksum::from_wire(read_u32(buf, 4)),
        }
    }
}

/// A decoded Response packet.
///
/// The status byte is kept raw; [`crate::response::classify`] decides what it
/// means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    pub status: u8,
}

/// A decoded frame of any kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Command(Command),
    Header(FileInfo),
    Data { seq: u16, payload: Vec<u8> },
    Response(Response),
}

impl Packet {
    pub fn kind(&self) -> PacketKind {
        match self {
            Self::Command(_) => PacketKind::Command,
            Self::Header(_) => PacketKind::Header,
            Self::Data { .. } => PacketKind::Data,
            Self::Response(_) => PacketKind::Response,
        }
    }

    /// Serialise this packet into a newly allocated byte vector.
    ///
    /// Fails only for a Data packet whose payload is empty or longer than
    /// [`MAX_PAYLOAD`].
    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        Ok(match self {
            Self::Command(cmd) => encode_command(*cmd).to_vec(),
            Self::Header(info) => encode_header(*info).to_vec(),
            Self::Data { seq, payload } => encode_data_frame(*seq, payload)?.to_vec(),
            Self::Response(resp) => encode_frame::<RESPONSE_FRAME_LEN>(
                PacketKind::Response,
                &[resp.status],
            )
            .to_vec(),
        })
    }

    /// Parse a [`Packet`] of any kind from a complete frame.
    ///
    /// Returns [`Err`] if:
    /// - `buf` is shorter than [`OVERHEAD`],
    /// - either marker is wrong,
    /// - the kind or command code is unknown,
    /// - the `payload_len` field disagrees with `buf.len()`, or
    /// - the payload length is not legal for the packet kind.
    ///
    /// The sequence field is only read for Data packets and the checksum
    /// field is never verified.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < OVERHEAD {
            return Err(PacketError::BufferTooShort);
        }
        if buf[OFF_START] != START_MARKER {
            return Err(PacketError::BadStartMarker(buf[OFF_START]));
        }
        let kind = PacketKind::try_from(buf[OFF_KIND])?;
        let payload_len = usize::from(read_u16(buf, OFF_PAYLOAD_LEN));
        if buf.len() != OVERHEAD + payload_len {
            return Err(PacketError::LengthMismatch {
                declared: payload_len,
                actual: buf.len() - OVERHEAD,
            });
        }
        let end = buf[buf.len() - 1];
        if end != END_MARKER {
            return Err(PacketError::BadEndMarker(end));
        }

        let payload = &buf[OFF_PAYLOAD..OFF_PAYLOAD + payload_len];
        match kind {
            PacketKind::Command => {
                expect_payload_len(kind, payload, 1)?;
                Ok(Self::Command(Command::try_from(payload[0])?))
            }
            PacketKind::Header => {
                expect_payload_len(kind, payload, FILE_INFO_LEN)?;
                Ok(Self::Header(FileInfo::from_bytes(payload)))
            }
            PacketKind::Data => {
                if payload.is_empty() || payload.len() > MAX_PAYLOAD {
                    return Err(PacketError::PayloadLength {
                        kind,
                        len: payload.len(),
                    });
                }
                Ok(Self::Data {
                    seq: read_u16(buf, OFF_SEQ),
                    payload: payload.to_vec(),
                })
            }
            PacketKind::Response => {
                expect_payload_len(kind, payload, 1)?;
                Ok(Self::Response(Response { status: payload[0] }))
            }
        }
    }
}

/// A Data frame split into three segments.
///
/// The payload is borrowed from the caller's image buffer so it can be
/// written straight to the transport without being copied into a staging
/// buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataFrame<'a> {
    pub header: [u8; HEADER_LEN],
    pub payload: &'a [u8],
    pub footer: [u8; FOOTER_LEN],
}

impl<'a> DataFrame<'a> {
    /// Frame an already validated chunk of 1..=[`MAX_PAYLOAD`] bytes.
    pub(crate) fn from_chunk(seq: u16, payload: &'a [u8]) -> Self {
        debug_assert!(!payload.is_empty() && payload.len() <= MAX_PAYLOAD);
        Self {
            header: frame_header(PacketKind::Data, seq, payload.len() as u16),
            payload,
            footer: frame_footer(Checksum::Unimplemented),
        }
    }

    pub fn seq(&self) -> u16 {
        read_u16(&self.header, OFF_SEQ)
    }

    /// The three segments in wire order.
    pub fn segments(&self) -> [&[u8]; 3] {
        [&self.header, self.payload, &self.footer]
    }

    /// Total bytes on the wire.
    pub fn len(&self) -> usize {
        HEADER_LEN + self.payload.len() + FOOTER_LEN
    }

    /// Always `false`: even the header alone is non-empty.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Concatenate the segments into one contiguous frame.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        for segment in self.segments() {
            out.extend_from_slice(segment);
        }
        out
    }
}

/// Build a complete Command frame.
pub fn encode_command(cmd: Command) -> [u8; COMMAND_FRAME_LEN] {
    encode_frame(PacketKind::Command, &[cmd as u8])
}

/// Build a complete Header frame carrying `info`.
pub fn encode_header(info: FileInfo) -> [u8; HEADER_FRAME_LEN] {
    encode_frame(PacketKind::Header, &info.to_bytes())
}

/// Build a complete Response frame.
pub fn encode_response(status: Status) -> [u8; RESPONSE_FRAME_LEN] {
    encode_frame(PacketKind::Response, &[status as u8])
}

/// Build the header and footer of a Data frame around `payload`.
///
/// `payload` must hold 1..=[`MAX_PAYLOAD`] bytes; anything else is rejected,
/// never truncated.
pub fn encode_data_frame(seq: u16, payload: &[u8]) -> Result<DataFrame<'_>, PacketError> {
    if payload.is_empty() || payload.len() > MAX_PAYLOAD {
        return Err(PacketError::PayloadLength {
            kind: PacketKind::Data,
            len: payload.len(),
        });
    }
    Ok(DataFrame::from_chunk(seq, payload))
}

/// Decode a Response frame, requiring exactly [`RESPONSE_FRAME_LEN`] bytes.
pub fn decode_response(buf: &[u8]) -> Result<Response, PacketError> {
    if buf.len() != RESPONSE_FRAME_LEN {
        return Err(PacketError::FrameSize {
            expected: RESPONSE_FRAME_LEN,
            actual: buf.len(),
        });
    }
    match Packet::decode(buf)? {
        Packet::Response(resp) => Ok(resp),
        other => Err(PacketError::UnexpectedKind(other.kind())),
    }
}

/// Total frame length announced by the common header at the front of
/// `prefix`, or `None` until [`HEADER_LEN`] bytes are available.
///
/// Stream receivers use this to delimit frames.  Markers are not checked.
pub fn frame_len(prefix: &[u8]) -> Option<usize> {
    if prefix.len() < HEADER_LEN {
        return None;
    }
    Some(OVERHEAD + usize::from(read_u16(prefix, OFF_PAYLOAD_LEN)))
}

/// Errors that can arise when building or parsing a frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("frame is {actual} bytes, expected exactly {expected}")]
    FrameSize { expected: usize, actual: usize },
    #[error("buffer too short to contain a frame")]
    BufferTooShort,
    #[error("bad start marker 0x{0:02x}")]
    BadStartMarker(u8),
    #[error("bad end marker 0x{0:02x}")]
    BadEndMarker(u8),
    #[error("unknown packet kind {0}")]
    UnknownKind(u8),
    #[error("unknown command code {0}")]
    UnknownCommand(u8),
    #[error("unexpected {0:?} packet")]
    UnexpectedKind(PacketKind),
    #[error("payload_len field says {declared} bytes but frame carries {actual}")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("{len}-byte payload is not valid for a {kind:?} packet")]
    PayloadLength { kind: PacketKind, len: usize },
}

fn expect_payload_len(kind: PacketKind, payload: &[u8], len: usize) -> Result<(), PacketError> {
    if payload.len() != len {
        return Err(PacketError::PayloadLength {
            kind,
            len: payload.len(),
        });
    }
    Ok(())
}

/// Assemble a fixed-size frame for the non-Data kinds.  `N` must equal
/// `OVERHEAD + payload.len()`.
fn encode_frame<const N: usize>(kind: PacketKind, payload: &[u8]) -> [u8; N] {
    debug_assert_eq!(N, OVERHEAD + payload.len());
    let mut buf = [0u8; N];
    buf[..HEADER_LEN].copy_from_slice(&frame_header(kind, 0, payload.len() as u16));
    buf[OFF_PAYLOAD..OFF_PAYLOAD + payload.len()].copy_from_slice(payload);
    buf[N - FOOTER_LEN..].copy_from_slice(&frame_footer(Checksum::Unimplemented));
    buf
}

fn frame_header(kind: PacketKind, seq: u16, payload_len: u16) -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    header[OFF_START] = START_MARKER;
    header[OFF_KIND] = kind as u8;
    header[OFF_SEQ..OFF_SEQ + 2].copy_from_slice(&seq.to_le_bytes());
    header[OFF_PAYLOAD_LEN..OFF_PAYLOAD_LEN + 2].copy_from_slice(&payload_len.to_le_bytes());
    header
}

fn frame_footer(checksum: Checksum) -> [u8; FOOTER_LEN] {
    let mut footer = [0u8; FOOTER_LEN];
    footer[..4].copy_from_slice(&checksum.to_wire().to_le_bytes());
    footer[4] = END_MARKER;
    footer
}

fn read_u16(buf: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([buf[off], buf[off + 1]])
}

fn read_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}
