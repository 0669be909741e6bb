use std::fmt;

use crate::tls::types::AlertDescription;

/// Why a connection stopped carrying records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultReason {
    /// Short read or write, or an I/O error from the transport
    Transport,
    /// Malformed framing or an unacceptable header from the peer
    Protocol,
    /// MAC, decryption or decompression failure
    Crypto,
    /// The peer sent a fatal alert
    AlertReceived(AlertDescription),
    /// Sequence numbers ran out
    Internal,
}

/// Lifecycle of a connection.
///
/// `Open` carries records both ways. `HalfClosed` means our close_notify has
/// gone out and only reads remain. A graceful shutdown ends in `Closed`,
/// which is the only state a session may be resumed from; every error that
/// invalidates the connection ends in `Faulted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Open,
    HalfClosed,
    Closed { resumable: bool },
    Faulted(FaultReason),
}

impl ConnectionStatus {
    pub fn can_send(&self) -> bool {
        matches!(self, ConnectionStatus::Open)
    }

    pub fn can_receive(&self) -> bool {
        matches!(self, ConnectionStatus::Open | ConnectionStatus::HalfClosed)
    }

    pub fn is_resumable(&self) -> bool {
        match self {
            ConnectionStatus::Open | ConnectionStatus::HalfClosed => true,
            ConnectionStatus::Closed { resumable } => *resumable,
            ConnectionStatus::Faulted(_) => false,
        }
    }

    // We sent close_notify
    pub fn half_close(self) -> Self {
        match self {
            ConnectionStatus::Open => ConnectionStatus::HalfClosed,
            other => other,
        }
    }

    // Graceful end of the connection; a fault is never undone
    pub fn close(self) -> Self {
        match self {
            ConnectionStatus::Faulted(_) | ConnectionStatus::Closed { .. } => self,
            _ => ConnectionStatus::Closed { resumable: true },
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Open => write!(f, "open"),
            ConnectionStatus::HalfClosed => write!(f, "half-closed"),
            ConnectionStatus::Closed { resumable: true } => write!(f, "closed (resumable)"),
            ConnectionStatus::Closed { resumable: false } => write!(f, "closed"),
            ConnectionStatus::Faulted(reason) => write!(f, "faulted ({:?})", reason),
        }
    }
}
