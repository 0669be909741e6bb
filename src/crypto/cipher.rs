// Bulk ciphers used by the record codec
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128, Aes256, Block};
use std::fmt;

use crate::error::{Error, Result};

pub const AES_BLOCK_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherType {
    Stream,
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkCipherAlgorithm {
    Null,
    Aes128Cbc,
    Aes256Cbc,
}

impl BulkCipherAlgorithm {
    pub fn key_len(&self) -> usize {
        match self {
            BulkCipherAlgorithm::Null => 0,
            BulkCipherAlgorithm::Aes128Cbc => 16,
            BulkCipherAlgorithm::Aes256Cbc => 32,
        }
    }

    pub fn iv_len(&self) -> usize {
        match self {
            BulkCipherAlgorithm::Null => 0,
            BulkCipherAlgorithm::Aes128Cbc | BulkCipherAlgorithm::Aes256Cbc => AES_BLOCK_SIZE,
        }
    }

    // 1 for stream ciphers
    pub fn block_size(&self) -> usize {
        match self {
            BulkCipherAlgorithm::Null => 1,
            BulkCipherAlgorithm::Aes128Cbc | BulkCipherAlgorithm::Aes256Cbc => AES_BLOCK_SIZE,
        }
    }

    pub fn cipher_type(&self) -> CipherType {
        match self {
            BulkCipherAlgorithm::Null => CipherType::Stream,
            BulkCipherAlgorithm::Aes128Cbc | BulkCipherAlgorithm::Aes256Cbc => CipherType::Block,
        }
    }
}

impl fmt::Display for BulkCipherAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BulkCipherAlgorithm::Null => write!(f, "NULL"),
            BulkCipherAlgorithm::Aes128Cbc => write!(f, "AES-128-CBC"),
            BulkCipherAlgorithm::Aes256Cbc => write!(f, "AES-256-CBC"),
        }
    }
}

enum CipherKey {
    Null,
    Aes128(Box<Aes128>),
    Aes256(Box<Aes256>),
}

/// A keyed bulk cipher. Block ciphers run in CBC mode; the caller owns the
/// chaining IV.
pub struct BulkCipher {
    algorithm: BulkCipherAlgorithm,
    key: CipherKey,
}

impl BulkCipher {
    pub fn new(algorithm: BulkCipherAlgorithm, key_material: &[u8]) -> Result<Self> {
        if key_material.len() != algorithm.key_len() {
            return Err(Error::CryptoError(format!(
                "Invalid key length {} for {}, expected {}",
                key_material.len(),
                algorithm,
                algorithm.key_len()
            )));
        }

        let key = match algorithm {
            BulkCipherAlgorithm::Null => CipherKey::Null,
            BulkCipherAlgorithm::Aes128Cbc => CipherKey::Aes128(Box::new(
                Aes128::new_from_slice(key_material)
                    .map_err(|_| Error::CryptoError("Failed to create AES-128 key".to_string()))?,
            )),
            BulkCipherAlgorithm::Aes256Cbc => CipherKey::Aes256(Box::new(
                Aes256::new_from_slice(key_material)
                    .map_err(|_| Error::CryptoError("Failed to create AES-256 key".to_string()))?,
            )),
        };

        Ok(Self { algorithm, key })
    }

    pub fn null() -> Self {
        Self {
            algorithm: BulkCipherAlgorithm::Null,
            key: CipherKey::Null,
        }
    }

    pub fn algorithm(&self) -> BulkCipherAlgorithm {
        self.algorithm
    }

    /// CBC-encrypts `data` in place. Returns the last ciphertext block, which
    /// chains into the next record.
    pub fn encrypt_cbc(&self, iv: &[u8], data: &mut [u8]) -> Result<Vec<u8>> {
        self.check_cbc_input(iv, data)?;

        let mut previous = iv.to_vec();
        for chunk in data.chunks_exact_mut(AES_BLOCK_SIZE) {
            for (byte, prev) in chunk.iter_mut().zip(previous.iter()) {
                *byte ^= prev;
            }
            let block = Block::from_mut_slice(chunk);
            match &self.key {
                CipherKey::Aes128(cipher) => cipher.encrypt_block(block),
                CipherKey::Aes256(cipher) => cipher.encrypt_block(block),
                CipherKey::Null => {}
            }
            previous.copy_from_slice(chunk);
        }

        Ok(previous)
    }

    /// CBC-decrypts `data` in place. Returns the last ciphertext block.
    pub fn decrypt_cbc(&self, iv: &[u8], data: &mut [u8]) -> Result<Vec<u8>> {
        self.check_cbc_input(iv, data)?;

        let mut previous = iv.to_vec();
        let mut saved = vec![0u8; AES_BLOCK_SIZE];
        for chunk in data.chunks_exact_mut(AES_BLOCK_SIZE) {
            saved.copy_from_slice(chunk);
            let block = Block::from_mut_slice(chunk);
            match &self.key {
                CipherKey::Aes128(cipher) => cipher.decrypt_block(block),
                CipherKey::Aes256(cipher) => cipher.decrypt_block(block),
                CipherKey::Null => {}
            }
            for (byte, prev) in chunk.iter_mut().zip(previous.iter()) {
                *byte ^= prev;
            }
            std::mem::swap(&mut previous, &mut saved);
        }

        Ok(previous)
    }

    fn check_cbc_input(&self, iv: &[u8], data: &[u8]) -> Result<()> {
        if self.algorithm.cipher_type() != CipherType::Block {
            return Err(Error::InternalError(format!("{} is not a block cipher", self.algorithm)));
        }
        if iv.len() != AES_BLOCK_SIZE {
            return Err(Error::CryptoError(format!("Invalid CBC IV length {}", iv.len())));
        }
        if data.len() % AES_BLOCK_SIZE != 0 {
            return Err(Error::DecryptionFailed(format!(
                "CBC input length {} is not a multiple of the block size",
                data.len()
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for BulkCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BulkCipher")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aes128_cbc_known_answer() {
        // NIST SP 800-38A F.2.1, first block
        let key = hex::decode("2b7e151628aed2a6abf7158809cf4f3c").unwrap();
        let iv = hex::decode("000102030405060708090a0b0c0d0e0f").unwrap();
        let mut data = hex::decode("6bc1bee22e409f96e93d7e117393172a").unwrap();

        let cipher = BulkCipher::new(BulkCipherAlgorithm::Aes128Cbc, &key).unwrap();
        let last = cipher.encrypt_cbc(&iv, &mut data).unwrap();

        assert_eq!(hex::encode(&data), "7649abac8119b246cee98e9b12e9197d");
        assert_eq!(last, data);
    }

    #[test]
    fn test_cbc_chaining_roundtrip() {
        let cipher = BulkCipher::new(BulkCipherAlgorithm::Aes256Cbc, &[7u8; 32]).unwrap();
        let iv = [9u8; 16];
        let plaintext: Vec<u8> = (0..64u8).collect();

        let mut data = plaintext.clone();
        let enc_last = cipher.encrypt_cbc(&iv, &mut data).unwrap();
        assert_ne!(data, plaintext);

        let dec_last = cipher.decrypt_cbc(&iv, &mut data).unwrap();
        assert_eq!(data, plaintext);
        assert_eq!(enc_last, dec_last);
    }

    #[test]
    fn test_rejects_misaligned_input_and_bad_keys() {
        let cipher = BulkCipher::new(BulkCipherAlgorithm::Aes128Cbc, &[0u8; 16]).unwrap();
        let mut data = vec![0u8; 15];
        assert!(matches!(
            cipher.decrypt_cbc(&[0u8; 16], &mut data),
            Err(Error::DecryptionFailed(_))
        ));

        assert!(BulkCipher::new(BulkCipherAlgorithm::Aes128Cbc, &[0u8; 15]).is_err());
        assert!(BulkCipher::null().encrypt_cbc(&[0u8; 16], &mut [0u8; 16]).is_err());
    }
}
