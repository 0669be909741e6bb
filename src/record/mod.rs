use crate::error::{Error, Result};
use crate::tls::constants::{
    RECORD_HEADER_SIZE, RECORD_TYPE_ALERT, RECORD_TYPE_APPLICATION_DATA,
    RECORD_TYPE_CHANGE_CIPHER_SPEC, RECORD_TYPE_HANDSHAKE,
};
use crate::tls::types::ProtocolVersion;
use crate::utils;

pub mod codec;
pub mod receive;
pub mod transmit;

pub use codec::RecordCodec;
pub use receive::PeekedRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    ChangeCipherSpec = 20,
    Alert = 21,
    Handshake = 22,
    ApplicationData = 23,
}

impl ContentType {
    // Types whose plaintext is reassembled before it is handed out
    pub fn is_buffered(&self) -> bool {
        matches!(self, ContentType::ApplicationData | ContentType::Handshake)
    }
}

impl TryFrom<u8> for ContentType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            RECORD_TYPE_CHANGE_CIPHER_SPEC => Ok(ContentType::ChangeCipherSpec),
            RECORD_TYPE_ALERT => Ok(ContentType::Alert),
            RECORD_TYPE_HANDSHAKE => Ok(ContentType::Handshake),
            RECORD_TYPE_APPLICATION_DATA => Ok(ContentType::ApplicationData),
            _ => Err(Error::ParseError(format!("Invalid ContentType value: {}", value))),
        }
    }
}

/// The 5-byte record header: type, version, big-endian ciphertext length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub content_type: ContentType,
    pub version: ProtocolVersion,
    pub length: u16,
}

impl RecordHeader {
    pub fn new(content_type: ContentType, version: ProtocolVersion, length: u16) -> Self {
        Self {
            content_type,
            version,
            length,
        }
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut pos = 0;

        if data.len() < RECORD_HEADER_SIZE {
            return Err(Error::ParseError("Record header too short".to_string()));
        }

        let content_type = ContentType::try_from(utils::read_u8(data, &mut pos)?)?;
        let major = utils::read_u8(data, &mut pos)?;
        let minor = utils::read_u8(data, &mut pos)?;
        let length = utils::read_u16(data, &mut pos)?;

        Ok(Self::new(content_type, ProtocolVersion::new(major, minor), length))
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut result = Vec::with_capacity(RECORD_HEADER_SIZE + usize::from(self.length));

        utils::write_u8(&mut result, self.content_type as u8);
        utils::write_u8(&mut result, self.version.major);
        utils::write_u8(&mut result, self.version.minor);
        utils::write_u16(&mut result, self.length);

        result
    }

    /// Header followed by the protected fragment, ready for one transport write.
    pub fn serialize_record(
        content_type: ContentType,
        version: ProtocolVersion,
        fragment: &[u8],
    ) -> Result<Vec<u8>> {
        let length = u16::try_from(fragment.len()).map_err(|_| {
            Error::InternalError(format!("Record fragment of {} bytes", fragment.len()))
        })?;

        let mut result = Self::new(content_type, version, length).encode();
        result.extend_from_slice(fragment);

        Ok(result)
    }
}
