pub mod cipher;
pub mod mac;
pub mod prf;

pub use cipher::{BulkCipher, BulkCipherAlgorithm, CipherType};
pub use mac::MacAlgorithm;
pub use prf::KeyDerivation;
