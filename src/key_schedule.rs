// Traffic key derivation from the master secret
use log::debug;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::crypto::prf;
use crate::crypto::{BulkCipherAlgorithm, CipherType, MacAlgorithm};
use crate::error::{Error, Result};
use crate::tls::constants::{LABEL_KEY_EXPANSION, LABEL_MASTER_SECRET, MASTER_SECRET_SIZE, RANDOM_SIZE};
use crate::tls::types::{CompressionMethod, ConnectionEnd, ProtocolVersion};

/// What the handshake negotiated: algorithms, the master secret and both
/// hello randoms.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecurityParameters {
    #[zeroize(skip)]
    pub cipher_algorithm: BulkCipherAlgorithm,
    #[zeroize(skip)]
    pub mac_algorithm: MacAlgorithm,
    #[zeroize(skip)]
    pub compression_method: CompressionMethod,
    pub master_secret: Vec<u8>,
    pub client_random: [u8; RANDOM_SIZE],
    pub server_random: [u8; RANDOM_SIZE],
}

impl SecurityParameters {
    pub fn new(
        cipher_algorithm: BulkCipherAlgorithm,
        mac_algorithm: MacAlgorithm,
        master_secret: Vec<u8>,
        client_random: [u8; RANDOM_SIZE],
        server_random: [u8; RANDOM_SIZE],
    ) -> Self {
        Self {
            cipher_algorithm,
            mac_algorithm,
            compression_method: CompressionMethod::Null,
            master_secret,
            client_random,
            server_random,
        }
    }

    pub fn key_block_len(&self) -> usize {
        2 * self.mac_algorithm.hash_len()
            + 2 * self.cipher_algorithm.key_len()
            + 2 * self.cipher_algorithm.iv_len()
    }
}

impl fmt::Debug for SecurityParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityParameters")
            .field("cipher_algorithm", &self.cipher_algorithm)
            .field("mac_algorithm", &self.mac_algorithm)
            .field("compression_method", &self.compression_method)
            .finish_non_exhaustive()
    }
}

/// Six traffic secrets plus the algorithms they belong to. Built as the
/// pending spec and installed per direction on change cipher spec.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CipherSpec {
    #[zeroize(skip)]
    pub cipher_algorithm: BulkCipherAlgorithm,
    #[zeroize(skip)]
    pub mac_algorithm: MacAlgorithm,
    #[zeroize(skip)]
    pub compression_method: CompressionMethod,
    pub client_write_mac_secret: Vec<u8>,
    pub server_write_mac_secret: Vec<u8>,
    pub client_write_key: Vec<u8>,
    pub server_write_key: Vec<u8>,
    pub client_write_iv: Vec<u8>,
    pub server_write_iv: Vec<u8>,
}

/// One direction's slice of a CipherSpec.
#[derive(Clone, Copy)]
pub struct DirectionKeys<'a> {
    pub mac_secret: &'a [u8],
    pub key: &'a [u8],
    pub iv: &'a [u8],
}

impl CipherSpec {
    pub fn hash_len(&self) -> usize {
        self.mac_algorithm.hash_len()
    }

    pub fn key_len(&self) -> usize {
        self.cipher_algorithm.key_len()
    }

    pub fn iv_len(&self) -> usize {
        self.cipher_algorithm.iv_len()
    }

    pub fn cipher_type(&self) -> CipherType {
        self.cipher_algorithm.cipher_type()
    }

    // Keys this end protects its outgoing records with
    pub fn write_keys(&self, entity: ConnectionEnd) -> DirectionKeys<'_> {
        match entity {
            ConnectionEnd::Client => self.client_keys(),
            ConnectionEnd::Server => self.server_keys(),
        }
    }

    // Keys the peer protects its records with
    pub fn read_keys(&self, entity: ConnectionEnd) -> DirectionKeys<'_> {
        match entity {
            ConnectionEnd::Client => self.server_keys(),
            ConnectionEnd::Server => self.client_keys(),
        }
    }

    fn client_keys(&self) -> DirectionKeys<'_> {
        DirectionKeys {
            mac_secret: &self.client_write_mac_secret,
            key: &self.client_write_key,
            iv: &self.client_write_iv,
        }
    }

    fn server_keys(&self) -> DirectionKeys<'_> {
        DirectionKeys {
            mac_secret: &self.server_write_mac_secret,
            key: &self.server_write_key,
            iv: &self.server_write_iv,
        }
    }
}

impl fmt::Debug for CipherSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherSpec")
            .field("cipher_algorithm", &self.cipher_algorithm)
            .field("mac_algorithm", &self.mac_algorithm)
            .field("compression_method", &self.compression_method)
            .finish_non_exhaustive()
    }
}

/// Expands the master secret into `total_bytes` of key material with the
/// derivation the version calls for. The seed is server_random || client_random.
pub fn derive_key_block(
    master_secret: &[u8],
    client_random: &[u8; RANDOM_SIZE],
    server_random: &[u8; RANDOM_SIZE],
    label: &[u8],
    total_bytes: usize,
    version: ProtocolVersion,
) -> Result<Zeroizing<Vec<u8>>> {
    let mut seed = Zeroizing::new(Vec::with_capacity(2 * RANDOM_SIZE));
    seed.extend_from_slice(server_random);
    seed.extend_from_slice(client_random);

    prf::for_version(version).expand(master_secret, label, &seed, total_bytes)
}

/// Derives the pending CipherSpec from the negotiated parameters.
pub fn set_keys(params: &SecurityParameters, version: ProtocolVersion) -> Result<CipherSpec> {
    if params.master_secret.len() != MASTER_SECRET_SIZE {
        return Err(Error::InvalidRequest(format!(
            "Master secret must be {} bytes, got {}",
            MASTER_SECRET_SIZE,
            params.master_secret.len()
        )));
    }

    let hash_len = params.mac_algorithm.hash_len();
    let key_len = params.cipher_algorithm.key_len();
    let iv_len = params.cipher_algorithm.iv_len();

    let key_block = derive_key_block(
        &params.master_secret,
        &params.client_random,
        &params.server_random,
        LABEL_KEY_EXPANSION,
        params.key_block_len(),
        version,
    )?;

    // client MAC, server MAC, client key, server key, client IV, server IV
    let mut pos = 0;
    let mut take = |len: usize| {
        let slice = key_block[pos..pos + len].to_vec();
        pos += len;
        slice
    };

    let spec = CipherSpec {
        cipher_algorithm: params.cipher_algorithm,
        mac_algorithm: params.mac_algorithm,
        compression_method: params.compression_method,
        client_write_mac_secret: take(hash_len),
        server_write_mac_secret: take(hash_len),
        client_write_key: take(key_len),
        server_write_key: take(key_len),
        client_write_iv: take(iv_len),
        server_write_iv: take(iv_len),
    };

    debug!(
        "Derived {} byte key block for {} / {} using {}",
        params.key_block_len(),
        params.cipher_algorithm,
        params.mac_algorithm,
        prf::for_version(version).name()
    );
    Ok(spec)
}

/// master_secret = PRF(pre_master_secret, "master secret",
///                     client_random || server_random)[0..47]
pub fn derive_master_secret(
    pre_master_secret: &[u8],
    client_random: &[u8; RANDOM_SIZE],
    server_random: &[u8; RANDOM_SIZE],
    version: ProtocolVersion,
) -> Result<Zeroizing<Vec<u8>>> {
    if pre_master_secret.is_empty() {
        return Err(Error::InvalidRequest("Empty pre-master secret".to_string()));
    }

    let mut seed = Zeroizing::new(Vec::with_capacity(2 * RANDOM_SIZE));
    seed.extend_from_slice(client_random);
    seed.extend_from_slice(server_random);

    prf::for_version(version).expand(pre_master_secret, LABEL_MASTER_SECRET, &seed, MASTER_SECRET_SIZE)
}
