//! Error types for the handshake and transfer layers.
//!
//! Nothing here is retried.  Every error ends the transfer and is reported to
//! the caller as a single [`TransferError`] naming the step that failed.

use std::fmt;
use std::io;

use thiserror::Error;

use crate::config::ConfigError;
use crate::packet::PacketError;
use crate::response::Verdict;
use crate::state::TransferState;

/// Which half of a handshake failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Write,
    Read,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Write => write!(f, "write"),
            Self::Read => write!(f, "read"),
        }
    }
}

/// Partial I/O or a timeout at the byte level.
#[derive(Debug, Error)]
#[error("{phase} stopped after {transferred}/{expected} bytes")]
pub struct TransportError {
    pub phase: Phase,
    /// Bytes actually moved before the failure.  When `source` is set this
    /// only counts bytes confirmed before the failing transport call: the
    /// earlier segments of a write, and always 0 for a read.
    pub transferred: usize,
    /// Bytes the handshake needed to move.
    pub expected: usize,
    /// Set when the adapter hit a hard I/O error rather than running out of
    /// time.
    #[source]
    pub source: Option<io::Error>,
}

/// The device answered, but not with something we can accept.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed response frame: {0}")]
    Format(#[from] PacketError),
    #[error("device replied {0}")]
    UnexpectedStatus(Verdict),
}

/// Everything a single write-then-read exchange can fail with.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// The step of a transfer a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Start,
    Header,
    Data(u16),
    End,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "start command"),
            Self::Header => write!(f, "header"),
            Self::Data(seq) => write!(f, "data packet {seq}"),
            Self::End => write!(f, "end command"),
        }
    }
}

/// Terminal failure of a whole transfer.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("invalid transfer configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("firmware image of {size} bytes exceeds maximum allowed size of {max} bytes")]
    Size { size: usize, max: usize },
    #[error("firmware image needs {chunks} data packets; sequence numbers stop at 65535")]
    TooManyChunks { chunks: usize },
    #[error("transfer already ran (state {0})")]
    AlreadyRun(TransferState),
    #[error("{step} failed")]
    Aborted {
        step: Step,
        #[source]
        source: HandshakeError,
    },
}

impl TransferError {
    /// The failing step, for transfers that got as far as the wire.
    pub fn step(&self) -> Option<Step> {
        match self {
            Self::Aborted { step, .. } => Some(*step),
            _ => None,
        }
    }

    /// The handshake failure behind an aborted transfer.
    pub fn handshake(&self) -> Option<&HandshakeError> {
        match self {
            Self::Aborted { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn transport_error_message() {
        let err = TransportError {
            phase: Phase::Write,
            transferred: 5,
            expected: 12,
            source: None,
        };
        assert_eq!(err.to_string(), "write stopped after 5/12 bytes");
        assert!(err.source().is_none());
    }

    #[test]
    fn aborted_names_the_step() {
        let err = TransferError::Aborted {
            step: Step::Data(3),
            source: ProtocolError::UnexpectedStatus(Verdict::Nack).into(),
        };
        assert_eq!(err.to_string(), "data packet 3 failed");
        assert_eq!(err.step(), Some(Step::Data(3)));
        assert_eq!(
            err.source().map(ToString::to_string).as_deref(),
            Some("device replied NACK")
        );
    }

    #[test]
    fn io_source_is_chained() {
        let err = HandshakeError::from(TransportError {
            phase: Phase::Read,
            transferred: 0,
            expected: 12,
            source: Some(io::Error::new(io::ErrorKind::BrokenPipe, "gone")),
        });
        // `Transport` is transparent, so the I/O error is the direct source.
        assert_eq!(err.to_string(), "read stopped after 0/12 bytes");
        assert_eq!(err.source().map(ToString::to_string).as_deref(), Some("gone"));
    }

    #[test]
    fn size_error_has_no_step() {
        let err = TransferError::Size { size: 10, max: 5 };
        assert_eq!(err.step(), None);
        assert!(err.handshake().is_none());
    }
}
