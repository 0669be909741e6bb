pub mod alert;
pub mod config;
pub mod crypto;
pub mod error;
pub mod key_schedule;
pub mod range;
pub mod record;
pub mod session;
pub mod state;
pub mod tls;
pub mod transport;
pub mod utils;

pub use alert::Alert;
pub use config::{SessionConfig, SystemTimeSource, TimeSource};
pub use crypto::{BulkCipherAlgorithm, CipherType, KeyDerivation, MacAlgorithm};
pub use error::{Error, Result};
pub use key_schedule::{derive_key_block, derive_master_secret, set_keys, CipherSpec, SecurityParameters};
pub use range::{Range, PaddingProfile};
pub use record::{ContentType, PeekedRecord, RecordHeader};
pub use session::Session;
pub use state::{ConnectionStatus, FaultReason};
pub use tls::{AlertDescription, AlertLevel, ConnectionEnd, ProtocolVersion};
pub use transport::{MemoryTransport, ReadMode, TcpTransport, Transport};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn init_logging() {
    let _ = env_logger::builder().try_init();
}
