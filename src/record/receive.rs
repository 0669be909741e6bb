use log::{debug, warn};

use super::{ContentType, RecordHeader};
use crate::alert::Alert;
use crate::error::{Error, Result};
use crate::session::Session;
use crate::state::FaultReason;
use crate::tls::constants::{CHANGE_CIPHER_SPEC_BODY, MAX_RECV_SIZE, RECORD_HEADER_SIZE};
use crate::tls::types::AlertDescription;
use crate::transport::{ReadMode, Transport};

/// An application record that has been decrypted into the session buffer
/// while its raw bytes are still queued in the transport. Hand it back to
/// [`Session::commit_application_record`] to consume them.
#[derive(Debug, PartialEq, Eq)]
pub struct PeekedRecord {
    raw_len: usize,
    buffered_len: usize,
}

impl PeekedRecord {
    /// Ciphertext bytes left in the transport.
    pub fn raw_len(&self) -> usize {
        self.raw_len
    }

    /// Decrypted application bytes buffered when the record was peeked.
    pub fn buffered_len(&self) -> usize {
        self.buffered_len
    }
}

// What a single record turned into
enum Delivery {
    Data,
    ChangeCipherSpec,
    Closed,
}

impl<T: Transport> Session<T> {
    /// Reads up to `buf.len()` bytes of `content_type`.
    ///
    /// Buffered plaintext is served before anything is read from the
    /// transport. Alerts always surface as errors, except a peer that hangs up
    /// while we wait for its close_notify, which reads as `Ok(0)`. An expected
    /// change cipher spec reads as `Ok(1)`.
    pub fn recv(&mut self, content_type: ContentType, buf: &mut [u8]) -> Result<usize> {
        if content_type.is_buffered() && self.buffered_len(content_type) > 0 {
            return self.serve_buffered(content_type, buf);
        }

        loop {
            match self.read_record(content_type)? {
                Delivery::Data if self.buffered_len(content_type) > 0 => {
                    return self.serve_buffered(content_type, buf);
                }
                // Padding-only record
                Delivery::Data => continue,
                Delivery::ChangeCipherSpec => return Ok(1),
                Delivery::Closed => return Ok(0),
            }
        }
    }

    /// Decrypts the next application record into the buffer but leaves its
    /// raw bytes in the transport. A record peeked earlier and not yet
    /// committed is returned again instead.
    pub fn peek_application_record(&mut self) -> Result<PeekedRecord> {
        if self.pending_peek.is_none() {
            self.read_record(ContentType::ApplicationData)?;
        }

        match self.pending_peek {
            Some(raw_len) => Ok(PeekedRecord {
                raw_len,
                buffered_len: self.application_buffer.len(),
            }),
            None => Err(Error::InternalError(
                "Application record was read without a peek".to_string(),
            )),
        }
    }

    /// Consumes the raw bytes of a peeked record. The decrypted data stays
    /// buffered for `recv`.
    pub fn commit_application_record(&mut self, record: PeekedRecord) -> Result<()> {
        match self.pending_peek {
            Some(raw_len) if raw_len == record.raw_len => self.commit_pending_peek(),
            _ => Err(Error::InvalidRequest(
                "Record handle does not match the pending peek".to_string(),
            )),
        }
    }

    fn serve_buffered(&mut self, content_type: ContentType, buf: &mut [u8]) -> Result<usize> {
        let n = self.take_buffered(content_type, buf);

        if content_type == ContentType::ApplicationData && self.application_buffer.is_empty() {
            self.commit_pending_peek()?;
        }
        Ok(n)
    }

    fn commit_pending_peek(&mut self) -> Result<()> {
        if let Some(raw_len) = self.pending_peek.take() {
            let mut scratch = vec![0u8; raw_len];
            let n = self.read_transport(&mut scratch, ReadMode::Consume)?;
            if n != raw_len {
                self.fault(FaultReason::Transport);
                return Err(Error::UnexpectedPacketLength(format!(
                    "Peeked record shrank from {} to {} bytes",
                    raw_len, n
                )));
            }
        }
        Ok(())
    }

    fn read_transport(&mut self, buf: &mut [u8], mode: ReadMode) -> Result<usize> {
        match self.transport.read(buf, mode) {
            Ok(n) => Ok(n),
            Err(e) => {
                self.fault(FaultReason::Transport);
                Err(Error::IoError(e))
            }
        }
    }

    // Reads, checks and decrypts one record, then routes its plaintext
    fn read_record(&mut self, expected: ContentType) -> Result<Delivery> {
        if !self.status.can_receive() {
            return Err(Error::InvalidSession);
        }

        self.commit_pending_peek()?;

        let mut header = [0u8; RECORD_HEADER_SIZE];
        let n = self.read_transport(&mut header, ReadMode::Consume)?;

        if n == 0 && expected == ContentType::Alert {
            // Peer went away without its close_notify
            debug!("Transport closed while waiting for an alert");
            self.status = self.status.close();
            return Ok(Delivery::Closed);
        }

        if n < RECORD_HEADER_SIZE {
            self.fault(FaultReason::Transport);
            return Err(Error::UnexpectedPacketLength(format!(
                "Record header cut short at {} bytes",
                n
            )));
        }

        let RecordHeader {
            content_type,
            version,
            length,
        } = match RecordHeader::parse(&header) {
            Ok(header) => header,
            Err(e) => {
                return Err(self.fail_with_alert(
                    AlertDescription::UnexpectedMessage,
                    FaultReason::Protocol,
                    e,
                ))
            }
        };

        if !self.config.supports(version) {
            warn!("Record carries unsupported version {}", version);
            return Err(self.fail_with_alert(
                AlertDescription::ProtocolVersion,
                FaultReason::Protocol,
                Error::UnsupportedVersion {
                    major: version.major,
                    minor: version.minor,
                },
            ));
        }
        self.version = version;

        let length = usize::from(length);
        if length > MAX_RECV_SIZE {
            return Err(self.fail_with_alert(
                AlertDescription::RecordOverflow,
                FaultReason::Protocol,
                Error::UnexpectedPacketLength(format!(
                    "Record of {} bytes exceeds the {} byte limit",
                    length, MAX_RECV_SIZE
                )),
            ));
        }

        let mode = if expected == ContentType::ApplicationData && content_type == ContentType::ApplicationData {
            ReadMode::Peek
        } else {
            ReadMode::Consume
        };

        let mut fragment = vec![0u8; length];
        let n = self.read_transport(&mut fragment, mode)?;
        if n != length {
            self.fault(FaultReason::Transport);
            return Err(Error::UnexpectedPacketLength(format!(
                "Expected {} record bytes, received {}",
                length, n
            )));
        }
        if mode == ReadMode::Peek {
            self.pending_peek = Some(length);
        }

        if content_type == ContentType::ChangeCipherSpec && expected == ContentType::ChangeCipherSpec {
            if fragment != [CHANGE_CIPHER_SPEC_BODY] {
                self.fault(FaultReason::Protocol);
                return Err(Error::UnexpectedPacketLength(format!(
                    "Change cipher spec of {} bytes",
                    length
                )));
            }
            debug!("Received change cipher spec");
            return Ok(Delivery::ChangeCipherSpec);
        }

        let next_seq = match self.read_seq.checked_add(1) {
            Some(next) => next,
            None => {
                return Err(self.fail_with_alert(
                    AlertDescription::InternalError,
                    FaultReason::Internal,
                    Error::InternalError("Read sequence number exhausted".to_string()),
                ))
            }
        };

        let plaintext = match self
            .read_codec
            .decrypt(self.read_seq, content_type, version, &fragment)
        {
            Ok(plaintext) => plaintext,
            Err(e) => {
                let description = e.alert_description().unwrap_or(AlertDescription::InternalError);
                return Err(self.fail_with_alert(description, FaultReason::Crypto, e));
            }
        };

        debug!(
            "Received {:?} record #{}: {} bytes on the wire, {} bytes plaintext",
            content_type,
            self.read_seq,
            length,
            plaintext.len()
        );
        self.read_seq = next_seq;

        match content_type {
            ContentType::Alert => Err(self.handle_alert(expected, &plaintext)),
            ContentType::ChangeCipherSpec => Err(Error::UnexpectedPacket(format!(
                "Change cipher spec while expecting {:?}",
                expected
            ))),
            received => {
                if let Some(buffer) = self.buffer_mut(received) {
                    buffer.extend_from_slice(&plaintext);
                }
                if received == expected {
                    Ok(Delivery::Data)
                } else {
                    Err(Error::ReceivedBadMessage(format!(
                        "Received {:?} while expecting {:?}",
                        received, expected
                    )))
                }
            }
        }
    }

    fn handle_alert(&mut self, expected: ContentType, plaintext: &[u8]) -> Error {
        let alert = match Alert::parse(plaintext) {
            Ok(alert) => alert,
            Err(e) => return self.fail_with_alert(AlertDescription::DecodeError, FaultReason::Protocol, e),
        };
        self.last_alert = Some(alert);

        if alert.is_close_notify() {
            debug!("Received close_notify");
            // Unless we are already closing, answer with our own close_notify
            if expected != ContentType::Alert && self.status.can_send() {
                if let Err(e) = self.close_nowait() {
                    debug!("Could not answer close_notify: {}", e);
                }
            }
            self.status = self.status.close();
            return Error::ClosureAlertReceived;
        }

        if alert.is_fatal() {
            warn!("Received fatal alert: {:?}", alert.description);
            self.fault(FaultReason::AlertReceived(alert.description));
            Error::FatalAlertReceived(alert.description)
        } else {
            warn!("Received warning alert: {:?}", alert.description);
            Error::WarningAlertReceived(alert.description)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::state::ConnectionStatus;
    use crate::tls::types::ProtocolVersion;
    use crate::transport::MemoryTransport;

    fn session() -> (Session<MemoryTransport>, MemoryTransport) {
        let (transport, peer) = MemoryTransport::pair();
        (Session::new(SessionConfig::server(), transport).unwrap(), peer)
    }

    fn written(peer: &mut MemoryTransport) -> Vec<u8> {
        let mut buf = vec![0u8; peer.pending()];
        peer.read(&mut buf, ReadMode::Consume).unwrap();
        buf
    }

    #[test]
    fn test_plain_handshake_record() {
        let (mut session, peer) = session();
        peer.clone().write(&[22, 3, 1, 0, 3, 1, 2, 3]).unwrap();

        let mut buf = [0u8; 2];
        assert_eq!(session.recv(ContentType::Handshake, &mut buf).unwrap(), 2);
        assert_eq!(buf, [1, 2]);
        assert_eq!(session.buffered_len(ContentType::Handshake), 1);
        assert_eq!(session.read_sequence_number(), 1);

        assert_eq!(session.recv(ContentType::Handshake, &mut buf).unwrap(), 1);
        assert_eq!(buf[0], 3);
    }

    #[test]
    fn test_unknown_content_type_sends_unexpected_message() {
        let (mut session, mut peer) = session();
        peer.write(&[99, 3, 1, 0, 1, 0]).unwrap();

        assert!(matches!(
            session.recv(ContentType::ApplicationData, &mut [0u8; 4]),
            Err(Error::ParseError(_))
        ));
        assert_eq!(session.status(), ConnectionStatus::Faulted(FaultReason::Protocol));
        assert_eq!(written(&mut peer), [21, 3, 1, 0, 2, 2, 10]);
    }

    #[test]
    fn test_unsupported_version_sends_protocol_version_alert() {
        let (mut session, mut peer) = session();
        peer.write(&[23, 3, 9, 0, 1, 0]).unwrap();

        assert!(matches!(
            session.recv(ContentType::ApplicationData, &mut [0u8; 4]),
            Err(Error::UnsupportedVersion { major: 3, minor: 9 })
        ));
        assert!(!session.is_resumable());
        assert_eq!(written(&mut peer), [21, 3, 1, 0, 2, 2, 70]);
    }

    #[test]
    fn test_record_version_is_adopted() {
        let (mut session, mut peer) = session();
        peer.write(&[22, 3, 2, 0, 1, 9]).unwrap();

        session.recv(ContentType::Handshake, &mut [0u8; 1]).unwrap();
        assert_eq!(session.version(), ProtocolVersion::TLS11);
    }

    #[test]
    fn test_oversized_record_is_rejected_before_its_body() {
        let (mut session, mut peer) = session();
        // 18433 declared; no body follows
        peer.write(&[23, 3, 1, 0x48, 0x01]).unwrap();

        assert!(matches!(
            session.recv(ContentType::ApplicationData, &mut [0u8; 4]),
            Err(Error::UnexpectedPacketLength(_))
        ));
        assert!(!session.is_valid());
        assert_eq!(written(&mut peer), [21, 3, 1, 0, 2, 2, 22]);
    }

    #[test]
    fn test_truncated_body_faults() {
        let (mut session, mut peer) = session();
        peer.write(&[22, 3, 1, 0, 10, 1, 2, 3]).unwrap();
        peer.shutdown();

        assert!(matches!(
            session.recv(ContentType::Handshake, &mut [0u8; 16]),
            Err(Error::UnexpectedPacketLength(_))
        ));
        assert_eq!(session.status(), ConnectionStatus::Faulted(FaultReason::Transport));
        assert!(matches!(session.recv(ContentType::Handshake, &mut [0u8; 16]), Err(Error::InvalidSession)));
    }

    #[test]
    fn test_change_cipher_spec_body() {
        let (mut session, mut peer) = session();
        peer.write(&[20, 3, 1, 0, 1, 1]).unwrap();
        assert_eq!(session.recv(ContentType::ChangeCipherSpec, &mut []).unwrap(), 1);
        assert_eq!(session.read_sequence_number(), 0);

        peer.write(&[20, 3, 1, 0, 2, 1, 1]).unwrap();
        assert!(matches!(
            session.recv(ContentType::ChangeCipherSpec, &mut []),
            Err(Error::UnexpectedPacketLength(_))
        ));
        assert!(!session.is_valid());
    }

    #[test]
    fn test_unexpected_change_cipher_spec_leaves_session_usable() {
        let (mut session, mut peer) = session();
        peer.write(&[20, 3, 1, 0, 1, 1]).unwrap();

        let err = session.recv(ContentType::Handshake, &mut [0u8; 4]).unwrap_err();
        assert!(matches!(err, Error::UnexpectedPacket(_)));
        assert!(err.leaves_connection_usable());
        assert_eq!(session.status(), ConnectionStatus::Open);
    }

    #[test]
    fn test_mismatched_data_is_kept_for_later() {
        let (mut session, mut peer) = session();
        peer.write(&[23, 3, 1, 0, 2, b'h', b'i']).unwrap();

        assert!(matches!(
            session.recv(ContentType::Handshake, &mut [0u8; 4]),
            Err(Error::ReceivedBadMessage(_))
        ));
        assert_eq!(session.status(), ConnectionStatus::Open);

        let mut buf = [0u8; 4];
        assert_eq!(session.recv(ContentType::ApplicationData, &mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"hi");
    }

    #[test]
    fn test_implicit_close_while_waiting_for_alert() {
        let (mut session, peer) = session();
        peer.shutdown();
        assert_eq!(session.recv(ContentType::Alert, &mut []).unwrap(), 0);
        assert_eq!(session.status(), ConnectionStatus::Closed { resumable: true });
    }

    #[test]
    fn test_empty_transport_is_a_short_header() {
        let (mut session, peer) = session();
        drop(peer);
        assert!(matches!(
            session.recv(ContentType::ApplicationData, &mut [0u8; 4]),
            Err(Error::UnexpectedPacketLength(_))
        ));
        assert!(!session.is_resumable());
    }

    #[test]
    fn test_peek_and_commit() {
        let (mut session, mut peer) = session();
        peer.write(&[23, 3, 1, 0, 4, b'd', b'a', b't', b'a']).unwrap();

        let record = session.peek_application_record().unwrap();
        assert_eq!(record.raw_len(), 4);
        assert_eq!(record.buffered_len(), 4);
        assert_eq!(session.transport().pending(), 4);

        // Peeking again hands out the same record
        let again = session.peek_application_record().unwrap();
        assert_eq!(again, record);

        session.commit_application_record(record).unwrap();
        assert_eq!(session.transport().pending(), 0);
        assert!(matches!(
            session.commit_application_record(again),
            Err(Error::InvalidRequest(_))
        ));

        let mut buf = [0u8; 8];
        assert_eq!(session.recv(ContentType::ApplicationData, &mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], b"data");
    }

    #[test]
    fn test_partial_reads_drain_peeked_bytes_last() {
        let (mut session, mut peer) = session();
        peer.write(&[23, 3, 1, 0, 4, b'a', b'b', b'c', b'd']).unwrap();

        let mut buf = [0u8; 3];
        assert_eq!(session.recv(ContentType::ApplicationData, &mut buf).unwrap(), 3);
        assert_eq!(session.transport().pending(), 4);

        assert_eq!(session.recv(ContentType::ApplicationData, &mut buf).unwrap(), 1);
        assert_eq!(buf[0], b'd');
        assert_eq!(session.transport().pending(), 0);
    }

    #[test]
    fn test_exhausted_read_sequence_refuses_to_wrap() {
        let (mut session, mut peer) = session();
        session.read_seq = u64::MAX;
        peer.write(&[22, 3, 1, 0, 1, 9]).unwrap();

        assert!(matches!(
            session.recv(ContentType::Handshake, &mut [0u8; 4]),
            Err(Error::InternalError(_))
        ));
        assert_eq!(session.status(), ConnectionStatus::Faulted(FaultReason::Internal));
        assert_eq!(session.read_sequence_number(), u64::MAX);
        assert_eq!(session.buffered_len(ContentType::Handshake), 0);
        assert_eq!(written(&mut peer), [21, 3, 1, 0, 2, 2, 80]);
    }
}
