use thiserror::Error;
use crate::tls::types::AlertDescription;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid session: the connection can no longer carry records")]
    InvalidSession,

    #[error("Unable to send data: {0}")]
    UnableToSend(String),

    #[error("Unsupported version in record header: {major}.{minor}")]
    UnsupportedVersion { major: u8, minor: u8 },

    #[error("Unexpected packet length: {0}")]
    UnexpectedPacketLength(String),

    #[error("Record MAC verification failed")]
    MacFailed,

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Decompression failed: {0}")]
    DecompressionFailed(String),

    #[error("Peer closed the connection (close_notify received)")]
    ClosureAlertReceived,

    #[error("Fatal alert received: {0:?}")]
    FatalAlertReceived(AlertDescription),

    #[error("Warning alert received: {0:?}")]
    WarningAlertReceived(AlertDescription),

    #[error("Unexpected packet: {0}")]
    UnexpectedPacket(String),

    #[error("Received bad message: {0}")]
    ReceivedBadMessage(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Crypto error: {0}")]
    CryptoError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Error {
    /// The fatal alert a receiver sends to its peer before giving up on the
    /// connection because of this error, if any.
    pub fn alert_description(&self) -> Option<AlertDescription> {
        match self {
            Error::MacFailed => Some(AlertDescription::BadRecordMac),
            Error::DecryptionFailed(_) => Some(AlertDescription::DecryptionFailed),
            Error::DecompressionFailed(_) => Some(AlertDescription::DecompressionFailure),
            Error::UnsupportedVersion { .. } => Some(AlertDescription::ProtocolVersion),
            _ => None,
        }
    }

    /// Caller-side faults and warning alerts; every other error means the
    /// connection has been invalidated.
    pub fn leaves_connection_usable(&self) -> bool {
        matches!(
            self,
            Error::UnexpectedPacket(_)
                | Error::ReceivedBadMessage(_)
                | Error::WarningAlertReceived(_)
                | Error::InvalidRequest(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
