// Record MAC and hash primitives
use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use ring::digest;
use ring::hmac as ring_hmac;
use std::fmt;

use crate::error::{Error, Result};

type HmacMd5 = Hmac<Md5>;

const SSL3_PAD1: u8 = 0x36;
const SSL3_PAD2: u8 = 0x5c;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacAlgorithm {
    Null,
    Md5,
    Sha1,
}

impl MacAlgorithm {
    // Digest size, which is also the MAC secret size
    pub fn hash_len(&self) -> usize {
        match self {
            MacAlgorithm::Null => 0,
            MacAlgorithm::Md5 => 16,
            MacAlgorithm::Sha1 => 20,
        }
    }

    // SSL 3.0 pads: 48 bytes for MD5, 40 for SHA-1
    fn ssl3_pad_len(&self) -> usize {
        match self {
            MacAlgorithm::Null => 0,
            MacAlgorithm::Md5 => 48,
            MacAlgorithm::Sha1 => 40,
        }
    }

    /// HMAC over the concatenation of `parts`.
    pub fn hmac(&self, key: &[u8], parts: &[&[u8]]) -> Result<Vec<u8>> {
        match self {
            MacAlgorithm::Null => Ok(Vec::new()),
            MacAlgorithm::Md5 => {
                let mut mac = <HmacMd5 as Mac>::new_from_slice(key)
                    .map_err(|_| Error::CryptoError("Failed to create HMAC-MD5 key".to_string()))?;
                for part in parts {
                    Mac::update(&mut mac, part);
                }
                Ok(mac.finalize().into_bytes().to_vec())
            }
            MacAlgorithm::Sha1 => {
                let key = ring_hmac::Key::new(ring_hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, key);
                let mut context = ring_hmac::Context::with_key(&key);
                for part in parts {
                    context.update(part);
                }
                Ok(context.sign().as_ref().to_vec())
            }
        }
    }

    /// Plain hash over the concatenation of `parts`.
    pub fn digest(&self, parts: &[&[u8]]) -> Vec<u8> {
        match self {
            MacAlgorithm::Null => Vec::new(),
            MacAlgorithm::Md5 => {
                let mut context = Md5::new();
                for part in parts {
                    Digest::update(&mut context, part);
                }
                context.finalize().to_vec()
            }
            MacAlgorithm::Sha1 => {
                let mut context = digest::Context::new(&digest::SHA1_FOR_LEGACY_USE_ONLY);
                for part in parts {
                    context.update(part);
                }
                context.finish().as_ref().to_vec()
            }
        }
    }

    /// SSL 3.0 keyed hash: H(secret || pad2 || H(secret || pad1 || data)).
    pub fn ssl3_mac(&self, secret: &[u8], parts: &[&[u8]]) -> Vec<u8> {
        if *self == MacAlgorithm::Null {
            return Vec::new();
        }

        let pad1 = vec![SSL3_PAD1; self.ssl3_pad_len()];
        let pad2 = vec![SSL3_PAD2; self.ssl3_pad_len()];

        let mut inner_parts: Vec<&[u8]> = Vec::with_capacity(parts.len() + 2);
        inner_parts.push(secret);
        inner_parts.push(&pad1);
        inner_parts.extend_from_slice(parts);
        let inner = self.digest(&inner_parts);

        self.digest(&[secret, pad2.as_slice(), inner.as_slice()])
    }
}

impl fmt::Display for MacAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MacAlgorithm::Null => write!(f, "NULL"),
            MacAlgorithm::Md5 => write!(f, "MD5"),
            MacAlgorithm::Sha1 => write!(f, "SHA1"),
        }
    }
}
