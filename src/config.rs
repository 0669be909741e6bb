use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::error::{Error, Result};
use crate::tls::constants::MAX_FRAGMENT_SIZE;
use crate::tls::types::{ConnectionEnd, ProtocolVersion};

/// Source of the current time, injected so tests can control session age.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> SystemTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Per-session settings, fixed when the session is created.
#[derive(Clone)]
pub struct SessionConfig {
    pub entity: ConnectionEnd,
    pub supported_versions: Vec<ProtocolVersion>,
    pub initial_version: ProtocolVersion,
    /// Largest plaintext fragment this end sends in one record.
    pub max_fragment_size: usize,
    /// Whether the extra-padding extension was negotiated.
    pub extra_padding: bool,
    pub time_source: Arc<dyn TimeSource>,
    pub session_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            entity: ConnectionEnd::Client,
            supported_versions: vec![
                ProtocolVersion::SSL3,
                ProtocolVersion::TLS10,
                ProtocolVersion::TLS11,
                ProtocolVersion::TLS12,
            ],
            initial_version: ProtocolVersion::TLS10,
            max_fragment_size: MAX_FRAGMENT_SIZE,
            extra_padding: false,
            time_source: Arc::new(SystemTimeSource),
            session_timeout: Duration::from_secs(3600), // 1 hour default
        }
    }
}

impl SessionConfig {
    pub fn client() -> Self {
        Self::default()
    }

    pub fn server() -> Self {
        Self {
            entity: ConnectionEnd::Server,
            ..Self::default()
        }
    }

    pub fn with_supported_versions(mut self, versions: Vec<ProtocolVersion>) -> Self {
        self.supported_versions = versions;
        self
    }

    pub fn with_initial_version(mut self, version: ProtocolVersion) -> Self {
        self.initial_version = version;
        self
    }

    pub fn with_max_fragment_size(mut self, size: usize) -> Self {
        self.max_fragment_size = size;
        self
    }

    pub fn with_extra_padding(mut self, enabled: bool) -> Self {
        self.extra_padding = enabled;
        self
    }

    pub fn with_time_source(mut self, time_source: Arc<dyn TimeSource>) -> Self {
        self.time_source = time_source;
        self
    }

    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    pub fn supports(&self, version: ProtocolVersion) -> bool {
        self.supported_versions.contains(&version)
    }

    pub fn validate(&self) -> Result<()> {
        if self.supported_versions.is_empty() {
            return Err(Error::InvalidRequest("No protocol versions enabled".to_string()));
        }

        if !self.supports(self.initial_version) {
            return Err(Error::InvalidRequest(format!(
                "Initial version {} is not among the supported versions",
                self.initial_version
            )));
        }

        if self.max_fragment_size == 0 || self.max_fragment_size > MAX_FRAGMENT_SIZE {
            return Err(Error::InvalidRequest(format!(
                "Maximum fragment size must be between 1 and {}, got {}",
                MAX_FRAGMENT_SIZE, self.max_fragment_size
            )));
        }

        Ok(())
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("entity", &self.entity)
            .field("supported_versions", &self.supported_versions)
            .field("initial_version", &self.initial_version)
            .field("max_fragment_size", &self.max_fragment_size)
            .field("extra_padding", &self.extra_padding)
            .field("session_timeout", &self.session_timeout)
            .finish_non_exhaustive()
    }
}
