//! Transfer finite-state machine (FSM) types.
//!
//! This module defines every state a [`crate::transfer::Transfer`] can
//! occupy.  Transitions are driven by [`crate::transfer`]; this module only
//! names the states and answers which ones are terminal.
//!
//! ```text
//!  Idle ──Start/ACK──▶ StartSent ──Header/ACK──▶ HeaderSent
//!                                                    │ Data(1)
//!                                                    ▼
//!                  Sending(seq) ──ACK, more data──▶ Sending(seq+1)
//!                       │
//!                       │ ACK, nothing left; End/ACK
//!                       ▼
//!                    EndSent ──▶ Done
//!
//!  any non-terminal state ──non-ACK──▶ Aborted
//! ```

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferState {
    /// Nothing sent yet.
    #[default]
    Idle,
    /// Start command acknowledged.
    StartSent,
    /// Header acknowledged; data transfer may begin.
    HeaderSent,
    /// Data transfer under way; `seq` is the packet most recently put on
    /// the wire.
    Sending { seq: u16 },
    /// End command acknowledged.
    EndSent,
    /// Every step acknowledged.
    Done,
    /// A handshake failed; nothing further is sent.
    Aborted,
}

impl TransferState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sending { seq } => write!(f, "Sending({seq})"),
            other => write!(f, "{other:?}"),
        }
    }
}
