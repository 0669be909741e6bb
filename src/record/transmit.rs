use log::{debug, warn};

use super::{ContentType, RecordHeader};
use crate::alert::Alert;
use crate::error::{Error, Result};
use crate::session::Session;
use crate::state::FaultReason;
use crate::tls::constants::CHANGE_CIPHER_SPEC_BODY;
use crate::tls::types::{AlertDescription, AlertLevel};
use crate::transport::Transport;

impl<T: Transport> Session<T> {
    /// Sends `data` as one or more records of `content_type`, each carrying at
    /// most the configured fragment size. Returns the number of bytes sent.
    pub fn send(&mut self, content_type: ContentType, data: &[u8]) -> Result<usize> {
        if !self.status.can_send() {
            return Err(Error::InvalidSession);
        }

        if data.is_empty() {
            return Ok(0);
        }

        let max_fragment = self.config.max_fragment_size;
        for chunk in data.chunks(max_fragment) {
            self.write_record(content_type, chunk, chunk.len())?;
        }

        Ok(data.len())
    }

    /// Protects and writes one record. `target_len` above `data.len()` asks the
    /// codec to pad the record to look like it carries `target_len` bytes.
    pub(crate) fn write_record(
        &mut self,
        content_type: ContentType,
        data: &[u8],
        target_len: usize,
    ) -> Result<usize> {
        if !self.status.can_send() {
            return Err(Error::InvalidSession);
        }

        // A sequence number must never repeat under one key
        let next_seq = match self.write_seq.checked_add(1) {
            Some(next) => next,
            None => {
                self.fault(FaultReason::Internal);
                return Err(Error::InternalError("Write sequence number exhausted".to_string()));
            }
        };

        let fragment = self
            .write_codec
            .encrypt(self.write_seq, content_type, self.version, data, target_len)?;
        let record = RecordHeader::serialize_record(content_type, self.version, &fragment)?;

        self.write_all_or_fault(&record)?;

        debug!(
            "Sent {:?} record #{}: {} bytes plaintext, {} bytes on the wire",
            content_type,
            self.write_seq,
            data.len(),
            fragment.len()
        );
        self.write_seq = next_seq;

        Ok(data.len())
    }

    pub fn send_alert(&mut self, level: AlertLevel, description: AlertDescription) -> Result<usize> {
        self.write_alert(Alert::new(level, description))
    }

    pub(crate) fn write_alert(&mut self, alert: Alert) -> Result<usize> {
        if alert.is_close_notify() {
            debug!("Sending close_notify");
        } else {
            warn!("Sending {:?} alert: {:?}", alert.level, alert.description);
        }

        self.write_record(ContentType::Alert, &alert.serialize(), 2)
    }

    /// Writes the single-byte change cipher spec record. It is sent in the
    /// clear and does not consume a sequence number.
    pub fn send_change_cipher_spec(&mut self) -> Result<usize> {
        if !self.status.can_send() {
            return Err(Error::InvalidSession);
        }

        let record = RecordHeader::serialize_record(
            ContentType::ChangeCipherSpec,
            self.version,
            &[CHANGE_CIPHER_SPEC_BODY],
        )?;
        self.write_all_or_fault(&record)?;

        debug!("Sent change cipher spec");
        Ok(1)
    }

    // A record that reaches the wire only in part cannot be recovered from
    fn write_all_or_fault(&mut self, record: &[u8]) -> Result<()> {
        match self.transport.write(record) {
            Ok(n) if n == record.len() => Ok(()),
            Ok(n) => {
                self.fault(FaultReason::Transport);
                Err(Error::UnableToSend(format!(
                    "Short write: {} of {} bytes",
                    n,
                    record.len()
                )))
            }
            Err(e) => {
                self.fault(FaultReason::Transport);
                Err(Error::UnableToSend(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::state::ConnectionStatus;
    use crate::tls::types::ProtocolVersion;
    use crate::transport::{MemoryTransport, ReadMode};

    fn drain(transport: &mut MemoryTransport) -> Vec<u8> {
        let mut buf = vec![0u8; transport.pending()];
        transport.read(&mut buf, ReadMode::Consume).unwrap();
        buf
    }

    #[test]
    fn test_null_record_on_the_wire() {
        let (transport, mut peer) = MemoryTransport::pair();
        let mut session = Session::new(SessionConfig::client(), transport).unwrap();

        assert_eq!(session.send(ContentType::Handshake, b"hello").unwrap(), 5);
        assert_eq!(drain(&mut peer), [22, 3, 1, 0, 5, b'h', b'e', b'l', b'l', b'o']);
        assert_eq!(session.write_sequence_number(), 1);
    }

    #[test]
    fn test_empty_send_writes_nothing() {
        let (transport, peer) = MemoryTransport::pair();
        let mut session = Session::new(SessionConfig::client(), transport).unwrap();

        assert_eq!(session.send(ContentType::ApplicationData, &[]).unwrap(), 0);
        assert_eq!(peer.pending(), 0);
        assert_eq!(session.write_sequence_number(), 0);
    }

    #[test]
    fn test_alert_record() {
        let (transport, mut peer) = MemoryTransport::pair();
        let config = SessionConfig::client().with_initial_version(ProtocolVersion::TLS12);
        let mut session = Session::new(config, transport).unwrap();

        session.send_alert(AlertLevel::Fatal, AlertDescription::HandshakeFailure).unwrap();
        assert_eq!(drain(&mut peer), [21, 3, 3, 0, 2, 2, 40]);
    }

    #[test]
    fn test_change_cipher_spec_keeps_sequence_number() {
        let (transport, mut peer) = MemoryTransport::pair();
        let mut session = Session::new(SessionConfig::client(), transport).unwrap();

        assert_eq!(session.send_change_cipher_spec().unwrap(), 1);
        assert_eq!(drain(&mut peer), [20, 3, 1, 0, 1, 1]);
        assert_eq!(session.write_sequence_number(), 0);
    }

    #[test]
    fn test_short_write_faults_connection() {
        let (transport, _peer) = MemoryTransport::pair();
        let mut session = Session::new(SessionConfig::client(), transport.with_write_limit(7)).unwrap();

        assert!(matches!(
            session.send(ContentType::ApplicationData, b"0123456789"),
            Err(Error::UnableToSend(_))
        ));
        assert_eq!(session.status(), ConnectionStatus::Faulted(FaultReason::Transport));
        assert!(!session.is_resumable());
        assert_eq!(session.write_sequence_number(), 0);
        assert!(matches!(session.send(ContentType::ApplicationData, b"x"), Err(Error::InvalidSession)));
    }

    #[test]
    fn test_exhausted_write_sequence_refuses_to_wrap() {
        let (transport, peer) = MemoryTransport::pair();
        let mut session = Session::new(SessionConfig::client(), transport).unwrap();
        session.write_seq = u64::MAX;

        assert!(matches!(
            session.send(ContentType::ApplicationData, b"x"),
            Err(Error::InternalError(_))
        ));
        assert_eq!(session.status(), ConnectionStatus::Faulted(FaultReason::Internal));
        assert_eq!(session.write_sequence_number(), u64::MAX);
        assert_eq!(peer.pending(), 0);
    }

    #[test]
    fn test_close_nowait_sends_close_notify() {
        let (transport, mut peer) = MemoryTransport::pair();
        let mut session = Session::new(SessionConfig::client(), transport).unwrap();

        session.close_nowait().unwrap();
        assert_eq!(drain(&mut peer), [21, 3, 1, 0, 2, 1, 0]);
        assert_eq!(session.status(), ConnectionStatus::Closed { resumable: true });
    }
}
