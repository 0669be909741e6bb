use bytes::{Buf, BytesMut};
use log::{debug, warn};
use std::time::{Duration, SystemTime};

use crate::alert::Alert;
use crate::config::SessionConfig;
use crate::crypto::{BulkCipherAlgorithm, MacAlgorithm};
use crate::error::{Error, Result};
use crate::key_schedule::{self, CipherSpec, SecurityParameters};
use crate::record::{ContentType, RecordCodec};
use crate::state::{ConnectionStatus, FaultReason};
use crate::tls::types::{AlertDescription, CompressionMethod, ConnectionEnd, ProtocolVersion};
use crate::transport::Transport;

/// One TLS connection's record layer: sequence numbers, the active read and
/// write protection, the pending spec from the handshake and the plaintext
/// buffers for application and handshake data.
pub struct Session<T: Transport> {
    pub(crate) config: SessionConfig,
    pub(crate) transport: T,
    pub(crate) version: ProtocolVersion,
    pub(crate) status: ConnectionStatus,
    pub(crate) read_seq: u64,
    pub(crate) write_seq: u64,
    pub(crate) read_codec: RecordCodec,
    pub(crate) write_codec: RecordCodec,
    pub(crate) security_parameters: Option<SecurityParameters>,
    pub(crate) pending: Option<CipherSpec>,
    pub(crate) application_buffer: BytesMut,
    pub(crate) handshake_buffer: BytesMut,
    // Raw length of an application record still sitting unconsumed in the transport
    pub(crate) pending_peek: Option<usize>,
    pub(crate) last_alert: Option<Alert>,
    pub(crate) created_at: SystemTime,
}

impl<T: Transport> Session<T> {
    pub fn new(config: SessionConfig, transport: T) -> Result<Self> {
        config.validate()?;

        let created_at = config.time_source.now();
        let version = config.initial_version;
        let extra_padding = config.extra_padding;

        debug!("New {:?} session at {}", config.entity, version);
        Ok(Self {
            config,
            transport,
            version,
            status: ConnectionStatus::Open,
            read_seq: 0,
            write_seq: 0,
            read_codec: RecordCodec::null(extra_padding),
            write_codec: RecordCodec::null(extra_padding),
            security_parameters: None,
            pending: None,
            application_buffer: BytesMut::new(),
            handshake_buffer: BytesMut::new(),
            pending_peek: None,
            last_alert: None,
            created_at,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn entity(&self) -> ConnectionEnd {
        self.config.entity
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// Sets the negotiated version; it must be one this session supports.
    pub fn set_version(&mut self, version: ProtocolVersion) -> Result<()> {
        if !self.config.supports(version) {
            return Err(Error::UnsupportedVersion {
                major: version.major,
                minor: version.minor,
            });
        }
        self.version = version;
        Ok(())
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn is_valid(&self) -> bool {
        self.status.can_receive()
    }

    pub fn is_resumable(&self) -> bool {
        self.status.is_resumable()
    }

    pub fn read_sequence_number(&self) -> u64 {
        self.read_seq
    }

    pub fn write_sequence_number(&self) -> u64 {
        self.write_seq
    }

    pub fn current_cipher(&self) -> BulkCipherAlgorithm {
        self.write_codec.cipher_algorithm()
    }

    pub fn current_mac_algorithm(&self) -> MacAlgorithm {
        self.write_codec.mac_algorithm()
    }

    pub fn current_compression_method(&self) -> CompressionMethod {
        self.security_parameters
            .as_ref()
            .map(|params| params.compression_method)
            .unwrap_or(CompressionMethod::Null)
    }

    pub fn security_parameters(&self) -> Option<&SecurityParameters> {
        self.security_parameters.as_ref()
    }

    pub fn last_alert(&self) -> Option<Alert> {
        self.last_alert
    }

    /// Decrypted bytes of `content_type` waiting to be read.
    pub fn buffered_len(&self, content_type: ContentType) -> usize {
        match content_type {
            ContentType::ApplicationData => self.application_buffer.len(),
            ContentType::Handshake => self.handshake_buffer.len(),
            _ => 0,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn age(&self) -> Duration {
        self.config
            .time_source
            .now()
            .duration_since(self.created_at)
            .unwrap_or(Duration::ZERO)
    }

    pub fn is_expired(&self) -> bool {
        self.config
            .time_source
            .now()
            .duration_since(self.created_at)
            .map(|elapsed| elapsed > self.config.session_timeout)
            .unwrap_or(true) // If clock went backwards, consider expired
    }

    /// Installs what the handshake negotiated and derives the pending keys
    /// from it under the current version.
    pub fn set_security_parameters(&mut self, params: SecurityParameters) -> Result<()> {
        let spec = key_schedule::set_keys(&params, self.version)?;
        debug!(
            "Pending cipher spec ready: {} / {}",
            spec.cipher_algorithm, spec.mac_algorithm
        );
        self.pending = Some(spec);
        self.security_parameters = Some(params);
        Ok(())
    }

    pub fn pending_cipher_spec(&self) -> Option<&CipherSpec> {
        self.pending.as_ref()
    }

    /// Starts protecting outgoing records with the pending spec. Called right
    /// after our change cipher spec goes out.
    pub fn activate_pending_write(&mut self) -> Result<()> {
        let spec = self
            .pending
            .as_ref()
            .ok_or_else(|| Error::InvalidRequest("No pending cipher spec".to_string()))?;

        self.write_codec = RecordCodec::new(spec, spec.write_keys(self.config.entity), self.config.extra_padding)?;
        self.write_seq = 0;
        debug!("Write epoch switched to {} / {}", spec.cipher_algorithm, spec.mac_algorithm);
        Ok(())
    }

    /// Starts expecting protected records from the peer. Called once the
    /// peer's change cipher spec has been received.
    pub fn activate_pending_read(&mut self) -> Result<()> {
        let spec = self
            .pending
            .as_ref()
            .ok_or_else(|| Error::InvalidRequest("No pending cipher spec".to_string()))?;

        self.read_codec = RecordCodec::new(spec, spec.read_keys(self.config.entity), self.config.extra_padding)?;
        self.read_seq = 0;
        debug!("Read epoch switched to {} / {}", spec.cipher_algorithm, spec.mac_algorithm);
        Ok(())
    }

    /// Sends close_notify and waits for the peer's.
    pub fn close(&mut self) -> Result<()> {
        self.write_alert(Alert::close_notify())?;
        self.status = self.status.half_close();

        match self.recv(ContentType::Alert, &mut []) {
            Ok(_) | Err(Error::ClosureAlertReceived) => {}
            Err(e) => debug!("No close_notify from the peer: {}", e),
        }

        self.status = self.status.close();
        Ok(())
    }

    /// Sends close_notify without waiting for the peer.
    pub fn close_nowait(&mut self) -> Result<()> {
        let result = self.write_alert(Alert::close_notify());
        self.status = self.status.close();
        result.map(|_| ())
    }

    /// `Ok(true)` when a read would find data: either decrypted bytes are
    /// buffered or the transport became readable within `timeout`.
    pub fn check_pending(&mut self, timeout: Duration) -> Result<bool> {
        if !self.application_buffer.is_empty() || !self.handshake_buffer.is_empty() {
            return Ok(true);
        }
        Ok(self.transport.wait_readable(timeout)?)
    }

    pub(crate) fn fault(&mut self, reason: FaultReason) {
        if !matches!(self.status, ConnectionStatus::Faulted(_)) {
            warn!("Connection faulted ({:?}) in state {}", reason, self.status);
        }
        self.status = ConnectionStatus::Faulted(reason);
    }

    // Tells the peer why we are giving up, if it can still hear us, then
    // invalidates the connection
    pub(crate) fn fail_with_alert(
        &mut self,
        description: AlertDescription,
        reason: FaultReason,
        error: Error,
    ) -> Error {
        if self.status.can_send() {
            if let Err(e) = self.write_alert(Alert::fatal(description)) {
                debug!("Could not deliver {:?} alert: {}", description, e);
            }
        }
        self.fault(reason);
        error
    }

    pub(crate) fn buffer_mut(&mut self, content_type: ContentType) -> Option<&mut BytesMut> {
        match content_type {
            ContentType::ApplicationData => Some(&mut self.application_buffer),
            ContentType::Handshake => Some(&mut self.handshake_buffer),
            _ => None,
        }
    }

    // Copies buffered plaintext of `content_type` into `buf`
    pub(crate) fn take_buffered(&mut self, content_type: ContentType, buf: &mut [u8]) -> usize {
        match self.buffer_mut(content_type) {
            Some(buffer) => {
                let n = buf.len().min(buffer.len());
                buf[..n].copy_from_slice(&buffer[..n]);
                buffer.advance(n);
                n
            }
            None => 0,
        }
    }
}
