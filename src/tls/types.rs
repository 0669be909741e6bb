use std::fmt;
use super::constants;

/// Record-layer protocol version, carried in every record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProtocolVersion {
    pub major: u8,
    pub minor: u8,
}

impl ProtocolVersion {
    pub const SSL3: ProtocolVersion = ProtocolVersion::new(constants::SSL3.0, constants::SSL3.1);
    pub const TLS10: ProtocolVersion = ProtocolVersion::new(constants::TLS10.0, constants::TLS10.1);
    pub const TLS11: ProtocolVersion = ProtocolVersion::new(constants::TLS11.0, constants::TLS11.1);
    pub const TLS12: ProtocolVersion = ProtocolVersion::new(constants::TLS12.0, constants::TLS12.1);

    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    // SSL 3.0 predates the PRF, the HMAC record MAC and padding checks
    pub fn is_legacy(&self) -> bool {
        *self == Self::SSL3
    }

    // TLS 1.1 and later carry an explicit IV in every CBC record
    pub fn has_explicit_iv(&self) -> bool {
        *self >= Self::TLS11
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::SSL3 => write!(f, "SSL 3.0"),
            Self::TLS10 => write!(f, "TLS 1.0"),
            Self::TLS11 => write!(f, "TLS 1.1"),
            Self::TLS12 => write!(f, "TLS 1.2"),
            ProtocolVersion { major, minor } => write!(f, "{}.{}", major, minor),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Warning = 1,
    Fatal = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertDescription {
    CloseNotify = 0,
    UnexpectedMessage = 10,
    BadRecordMac = 20,
    DecryptionFailed = 21,
    RecordOverflow = 22,
    DecompressionFailure = 30,
    HandshakeFailure = 40,
    NoCertificate = 41,
    BadCertificate = 42,
    UnsupportedCertificate = 43,
    CertificateRevoked = 44,
    CertificateExpired = 45,
    CertificateUnknown = 46,
    IllegalParameter = 47,
    UnknownCa = 48,
    AccessDenied = 49,
    DecodeError = 50,
    DecryptError = 51,
    ExportRestriction = 60,
    ProtocolVersion = 70,
    InsufficientSecurity = 71,
    InternalError = 80,
    UserCanceled = 90,
    NoRenegotiation = 100,
}

/// Which side of the connection this session plays; selects the write and
/// read halves of a CipherSpec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEnd {
    Client,
    Server,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Null = 0,
}
