// TLS/SSL record layer constants

// Protocol versions as (major, minor)
pub const SSL3: (u8, u8) = (3, 0);
pub const TLS10: (u8, u8) = (3, 1);
pub const TLS11: (u8, u8) = (3, 2);
pub const TLS12: (u8, u8) = (3, 3);

// Record types
pub const RECORD_TYPE_CHANGE_CIPHER_SPEC: u8 = 20;
pub const RECORD_TYPE_ALERT: u8 = 21;
pub const RECORD_TYPE_HANDSHAKE: u8 = 22;
pub const RECORD_TYPE_APPLICATION_DATA: u8 = 23;

// Change cipher spec body
pub const CHANGE_CIPHER_SPEC_BODY: u8 = 1;

// Limits
pub const RECORD_HEADER_SIZE: usize = 5;
pub const MAX_FRAGMENT_SIZE: usize = 16384; // 2^14 plaintext bytes per record
pub const MAX_RECV_SIZE: usize = 16384 + 2048; // Largest ciphertext accepted from the peer
pub const MAX_PAD_SIZE: usize = 255; // CBC padding length is a single byte

// Inner plaintext overhead per padding scheme
pub const CBC_PAD_LENGTH_FIELD: usize = 1;
pub const EXTRA_PAD_LENGTH_FIELD: usize = 2;

// Key schedule
pub const MASTER_SECRET_SIZE: usize = 48;
pub const RANDOM_SIZE: usize = 32;
pub const LABEL_KEY_EXPANSION: &[u8] = b"key expansion";
pub const LABEL_MASTER_SECRET: &[u8] = b"master secret";
