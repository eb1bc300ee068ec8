//! `ota-updater`: host side of a stop-and-wait firmware-over-the-air
//! update protocol, over a serial line or a TCP socket.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────────────────────────────┐
//!  │            Transfer              │  Start → Header → Data(1..N) → End
//!  │  (owns state machine + chunking) │
//!  └────┬─────────────────────────────┘
//!       │ one frame at a time
//!  ┌────▼──────────┐   ┌──────────┐   ┌──────────┐
//!  │   Handshake   │──▶│  Packet  │──▶│ Response │
//!  │ write → read  │   │  codec   │   │ classify │
//!  └────┬──────────┘   └──────────┘   └──────────┘
//!       │ raw bytes
//!  ┌────▼──────────────────────────────────────┐
//!  │ Transport: TcpTransport | SerialTransport │
//!  └───────────────────────────────────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]: wire format (serialise / deserialise)
//! - [`response`]: Ack / Nack / Malformed classification
//! - [`handshake`]: one write-then-read exchange
//! - [`transfer`]: chunking and the transfer sequence
//! - [`state`]: finite-state-machine types
//! - [`config`]: timeouts and size limits
//! - [`error`]: error taxonomy
//! - [`transport`]: the duplex byte-stream trait
//! - [`socket`]: TCP transport
//! - [`serial`]: serial-line transport
//! - [`receiver`]: device-side reference receiver
//! - [`simulator`]: in-memory fault-injecting device for testing

pub mod config;
pub mod error;
pub mod handshake;
pub mod packet;
pub mod receiver;
pub mod response;
pub mod serial;
pub mod simulator;
pub mod socket;
pub mod state;
pub mod transfer;
pub mod transport;

pub use config::TransferConfig;
pub use error::{HandshakeError, Phase, ProtocolError, Step, TransferError, TransportError};
pub use packet::{Command, FileInfo, Packet, PacketError, Status};
pub use response::Verdict;
pub use state::TransferState;
pub use transfer::{send_firmware, Transfer, TransferReport};
pub use transport::Transport;
