//! Interpretation of a device's Response status byte.
//!
//! Both [`Verdict::Nack`] and [`Verdict::Malformed`] abort a transfer; they
//! are kept apart so diagnostics can tell a deliberate rejection from a
//! device that answered with garbage.

use std::fmt;

use crate::packet::{Response, Status};

/// Outcome of classifying one Response packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Ack,
    Nack,
    /// Status byte that is neither Ack nor Nack.
    Malformed(u8),
}

impl Verdict {
    pub fn is_ack(self) -> bool {
        self == Self::Ack
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ack => write!(f, "ACK"),
            Self::Nack => write!(f, "NACK"),
            Self::Malformed(status) => write!(f, "malformed status 0x{status:02x}"),
        }
    }
}

/// Map a decoded response onto a [`Verdict`].
pub fn classify(response: Response) -> Verdict {
    match response.status {
        s if s == Status::Ack as u8 => Verdict::Ack,
        s if s == Status::Nack as u8 => Verdict::Nack,
        other => Verdict::Malformed(other),
    }
}
