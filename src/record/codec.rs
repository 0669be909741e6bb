//! Record protection for one direction of traffic.
//!
//! A record fragment is `inner || MAC` pushed through the bulk cipher, where
//! `MAC = HMAC(mac_secret, seq(8) || type(1) || version(2) || length(2) || inner)`
//! (SSL 3.0 uses its own keyed hash over the same fields minus the version).
//!
//! Block ciphers run in CBC mode. Without the extra-padding extension the
//! standard CBC padding follows the MAC (every pad byte equals the pad length)
//! and any length-hiding padding is folded into it. With the extension the
//! inner plaintext is `pad_len(2) || data || zeros(pad_len)` and carries the
//! block alignment itself.

use log::trace;
use ring::rand::{SecureRandom, SystemRandom};
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use super::ContentType;
use crate::crypto::cipher::AES_BLOCK_SIZE;
use crate::crypto::{BulkCipher, BulkCipherAlgorithm, CipherType, MacAlgorithm};
use crate::error::{Error, Result};
use crate::key_schedule::{CipherSpec, DirectionKeys};
use crate::range::PaddingProfile;
use crate::tls::constants::{CBC_PAD_LENGTH_FIELD, EXTRA_PAD_LENGTH_FIELD, MAX_FRAGMENT_SIZE, MAX_PAD_SIZE};
use crate::tls::types::ProtocolVersion;
use crate::utils;

pub struct RecordCodec {
    cipher: BulkCipher,
    mac_algorithm: MacAlgorithm,
    mac_secret: Zeroizing<Vec<u8>>,
    // CBC residue for versions with an implicit IV
    chain_iv: Zeroizing<Vec<u8>>,
    extra_padding: bool,
    rng: SystemRandom,
}

// Bytes needed to bring `len` up to a multiple of `block_size`
fn alignment(len: usize, block_size: usize) -> usize {
    (block_size - len % block_size) % block_size
}

impl RecordCodec {
    /// The NULL cipher / NULL MAC state of a fresh connection.
    pub fn null(extra_padding: bool) -> Self {
        Self {
            cipher: BulkCipher::null(),
            mac_algorithm: MacAlgorithm::Null,
            mac_secret: Zeroizing::new(Vec::new()),
            chain_iv: Zeroizing::new(Vec::new()),
            extra_padding,
            rng: SystemRandom::new(),
        }
    }

    pub fn new(spec: &CipherSpec, keys: DirectionKeys<'_>, extra_padding: bool) -> Result<Self> {
        if keys.mac_secret.len() != spec.hash_len() || keys.iv.len() != spec.iv_len() {
            return Err(Error::CryptoError(format!(
                "Key material does not match {} / {}",
                spec.cipher_algorithm, spec.mac_algorithm
            )));
        }

        Ok(Self {
            cipher: BulkCipher::new(spec.cipher_algorithm, keys.key)?,
            mac_algorithm: spec.mac_algorithm,
            mac_secret: Zeroizing::new(keys.mac_secret.to_vec()),
            chain_iv: Zeroizing::new(keys.iv.to_vec()),
            extra_padding,
            rng: SystemRandom::new(),
        })
    }

    pub fn cipher_algorithm(&self) -> BulkCipherAlgorithm {
        self.cipher.algorithm()
    }

    pub fn mac_algorithm(&self) -> MacAlgorithm {
        self.mac_algorithm
    }

    pub fn tag_len(&self) -> usize {
        self.mac_algorithm.hash_len()
    }

    pub fn padding_profile(&self) -> PaddingProfile {
        let algorithm = self.cipher.algorithm();
        PaddingProfile {
            cipher_type: algorithm.cipher_type(),
            block_size: algorithm.block_size(),
            tag_len: self.tag_len(),
            extra_padding: self.extra_padding,
        }
    }

    /// Protects `data` as one record fragment. `target_len` is the plaintext
    /// length the record should appear to carry (`data.len()` for no hiding).
    pub fn encrypt(
        &mut self,
        seq: u64,
        content_type: ContentType,
        version: ProtocolVersion,
        data: &[u8],
        target_len: usize,
    ) -> Result<Vec<u8>> {
        if target_len < data.len() {
            return Err(Error::InternalError(format!(
                "Padding target {} is below the data length {}",
                target_len,
                data.len()
            )));
        }

        let extra = target_len - data.len();
        let cipher_type = self.cipher.algorithm().cipher_type();
        let block_size = self.cipher.algorithm().block_size();
        let tag_len = self.tag_len();

        let mut inner = Vec::with_capacity(target_len + EXTRA_PAD_LENGTH_FIELD + block_size);
        if self.extra_padding {
            let pad = match cipher_type {
                CipherType::Stream => extra,
                CipherType::Block => {
                    extra + alignment(EXTRA_PAD_LENGTH_FIELD + target_len + tag_len, block_size)
                }
            };
            utils::write_length_u16(&mut inner, pad)?;
            inner.extend_from_slice(data);
            inner.resize(inner.len() + pad, 0);
        } else {
            if extra > 0 && (cipher_type == CipherType::Stream || version.is_legacy()) {
                return Err(Error::InvalidRequest(format!(
                    "{} under {} cannot carry length-hiding padding",
                    self.cipher.algorithm(),
                    version
                )));
            }
            inner.extend_from_slice(data);
        }

        let mac = self.compute_mac(seq, content_type, version, &inner)?;

        let mut body = inner;
        body.extend_from_slice(&mac);

        let fragment = match cipher_type {
            CipherType::Stream => body,
            CipherType::Block => {
                if !self.extra_padding {
                    let pad_len = extra + alignment(body.len() + extra + CBC_PAD_LENGTH_FIELD, block_size);
                    if pad_len > MAX_PAD_SIZE {
                        return Err(Error::InvalidRequest(format!(
                            "CBC padding of {} bytes exceeds the {} byte limit",
                            pad_len, MAX_PAD_SIZE
                        )));
                    }
                    body.resize(body.len() + pad_len + CBC_PAD_LENGTH_FIELD, pad_len as u8);
                }
                self.encrypt_cbc(version, body)?
            }
        };

        trace!(
            "Protected {:?} record: {} data bytes, target {}, {} bytes on the wire",
            content_type,
            data.len(),
            target_len,
            fragment.len()
        );
        Ok(fragment)
    }

    /// Recovers the plaintext of one record fragment.
    pub fn decrypt(
        &mut self,
        seq: u64,
        content_type: ContentType,
        version: ProtocolVersion,
        fragment: &[u8],
    ) -> Result<Vec<u8>> {
        let tag_len = self.tag_len();

        let (inner, received_mac, padding_ok) = match self.cipher.algorithm().cipher_type() {
            CipherType::Stream => {
                if fragment.len() < tag_len {
                    return Err(Error::DecryptionFailed(format!(
                        "Fragment of {} bytes is shorter than the {} byte MAC",
                        fragment.len(),
                        tag_len
                    )));
                }
                let split = fragment.len() - tag_len;
                (fragment[..split].to_vec(), fragment[split..].to_vec(), true)
            }
            CipherType::Block => {
                let body = self.decrypt_cbc(version, fragment)?;
                self.strip_cbc_padding(version, body)?
            }
        };

        let expected_mac = self.compute_mac(seq, content_type, version, &inner)?;
        let mac_ok: bool = expected_mac.ct_eq(&received_mac).into();
        if !(mac_ok && padding_ok) {
            return Err(Error::MacFailed);
        }

        let data = if self.extra_padding {
            let mut pos = 0;
            let pad = utils::read_u16(&inner, &mut pos)
                .map_err(|_| Error::DecryptionFailed("Missing padding length field".to_string()))? as usize;
            let data_len = inner.len().checked_sub(EXTRA_PAD_LENGTH_FIELD + pad).ok_or_else(|| {
                Error::DecryptionFailed(format!(
                    "Padding length {} exceeds the {} byte record",
                    pad,
                    inner.len()
                ))
            })?;
            utils::read_bytes(&inner, &mut pos, data_len)?.to_vec()
        } else {
            inner
        };

        // Null compression: anything past 2^14 cannot be a valid fragment
        if data.len() > MAX_FRAGMENT_SIZE {
            return Err(Error::DecompressionFailed(format!(
                "Fragment expands to {} bytes",
                data.len()
            )));
        }

        Ok(data)
    }

    fn compute_mac(
        &self,
        seq: u64,
        content_type: ContentType,
        version: ProtocolVersion,
        inner: &[u8],
    ) -> Result<Vec<u8>> {
        if self.mac_algorithm == MacAlgorithm::Null {
            return Ok(Vec::new());
        }

        // seq_num || type || version || length; SSL 3.0 leaves out the version
        let mut header = Vec::with_capacity(13);
        utils::write_u64(&mut header, seq);
        utils::write_u8(&mut header, content_type as u8);
        if !version.is_legacy() {
            utils::write_u8(&mut header, version.major);
            utils::write_u8(&mut header, version.minor);
        }
        utils::write_length_u16(&mut header, inner.len())?;

        if version.is_legacy() {
            Ok(self.mac_algorithm.ssl3_mac(&self.mac_secret, &[header.as_slice(), inner]))
        } else {
            self.mac_algorithm.hmac(&self.mac_secret, &[header.as_slice(), inner])
        }
    }

    fn encrypt_cbc(&mut self, version: ProtocolVersion, mut body: Vec<u8>) -> Result<Vec<u8>> {
        if version.has_explicit_iv() {
            let mut iv = vec![0u8; AES_BLOCK_SIZE];
            self.rng
                .fill(&mut iv)
                .map_err(|_| Error::CryptoError("Failed to generate record IV".to_string()))?;
            self.cipher.encrypt_cbc(&iv, &mut body)?;
            iv.extend_from_slice(&body);
            Ok(iv)
        } else {
            let last = self.cipher.encrypt_cbc(&self.chain_iv, &mut body)?;
            self.chain_iv = Zeroizing::new(last);
            Ok(body)
        }
    }

    fn decrypt_cbc(&mut self, version: ProtocolVersion, fragment: &[u8]) -> Result<Vec<u8>> {
        let block_size = AES_BLOCK_SIZE;
        let explicit_iv_len = if version.has_explicit_iv() { block_size } else { 0 };
        let min_body = (self.tag_len() + CBC_PAD_LENGTH_FIELD).max(block_size);
        let min_len = explicit_iv_len + min_body + alignment(min_body, block_size);

        if fragment.len() % block_size != 0 || fragment.len() < min_len {
            return Err(Error::DecryptionFailed(format!(
                "Fragment of {} bytes is not a valid CBC record",
                fragment.len()
            )));
        }

        if explicit_iv_len > 0 {
            let (iv, ciphertext) = fragment.split_at(explicit_iv_len);
            let mut body = ciphertext.to_vec();
            self.cipher.decrypt_cbc(iv, &mut body)?;
            Ok(body)
        } else {
            let mut body = fragment.to_vec();
            let last = self.cipher.decrypt_cbc(&self.chain_iv, &mut body)?;
            self.chain_iv = Zeroizing::new(last);
            Ok(body)
        }
    }

    // Splits a decrypted CBC body into (inner, mac, padding_ok). A bad pad
    // still yields a MAC to check so both failures look the same.
    fn strip_cbc_padding(&self, version: ProtocolVersion, body: Vec<u8>) -> Result<(Vec<u8>, Vec<u8>, bool)> {
        let tag_len = self.tag_len();

        if self.extra_padding {
            let split = body.len() - tag_len;
            return Ok((body[..split].to_vec(), body[split..].to_vec(), true));
        }

        let pad_len = body[body.len() - 1] as usize;
        let mut padding_ok = pad_len + CBC_PAD_LENGTH_FIELD + tag_len <= body.len();

        if padding_ok {
            if version.is_legacy() {
                padding_ok = pad_len < AES_BLOCK_SIZE;
            } else {
                let pad_start = body.len() - pad_len - CBC_PAD_LENGTH_FIELD;
                let mut diff = 0u8;
                for byte in &body[pad_start..] {
                    diff |= byte ^ pad_len as u8;
                }
                padding_ok = diff == 0;
            }
        }

        let strip = if padding_ok { pad_len + CBC_PAD_LENGTH_FIELD } else { 0 };
        let mac_start = body.len() - strip - tag_len;
        Ok((
            body[..mac_start].to_vec(),
            body[mac_start..body.len() - strip].to_vec(),
            padding_ok,
        ))
    }
}

impl fmt::Debug for RecordCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordCodec")
            .field("cipher", &self.cipher.algorithm())
            .field("mac", &self.mac_algorithm)
            .field("extra_padding", &self.extra_padding)
            .finish_non_exhaustive()
    }
}
