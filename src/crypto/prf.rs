//! Secret expansion for the record layer key schedule.
//!
//! TLS 1.0/1.1 PRF (RFC 2246 Section 5):
//!
//! PRF(secret, label, seed) = P_MD5(S1, label + seed) XOR P_SHA-1(S2, label + seed)
//!
//! where S1 and S2 are the two halves of the secret (sharing the middle byte
//! when its length is odd) and
//!
//! P_hash(secret, seed) = HMAC_hash(secret, A(1) + seed) +
//!                        HMAC_hash(secret, A(2) + seed) + ...
//! A(0) = seed
//! A(i) = HMAC_hash(secret, A(i-1))
//!
//! SSL 3.0 has no PRF; its key generator is selected through the same
//! `KeyDerivation` seam.

use log::trace;
use zeroize::Zeroizing;

use super::mac::MacAlgorithm;
use crate::error::{Error, Result};
use crate::tls::types::ProtocolVersion;

/// A secret expansion strategy.
pub trait KeyDerivation: Send + Sync {
    fn expand(
        &self,
        secret: &[u8],
        label: &[u8],
        seed: &[u8],
        total_bytes: usize,
    ) -> Result<Zeroizing<Vec<u8>>>;

    fn name(&self) -> &'static str;
}

/// The TLS 1.0 MD5/SHA-1 PRF.
#[derive(Debug, Clone, Copy, Default)]
pub struct TlsPrf;

/// The SSL 3.0 MD5(secret + SHA-1("A"... + secret + seed)) generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ssl3KeyGenerator;

static TLS_PRF: TlsPrf = TlsPrf;
static SSL3_KEY_GENERATOR: Ssl3KeyGenerator = Ssl3KeyGenerator;

/// Picks the expansion strategy for a negotiated version.
pub fn for_version(version: ProtocolVersion) -> &'static dyn KeyDerivation {
    if version.is_legacy() {
        &SSL3_KEY_GENERATOR
    } else {
        &TLS_PRF
    }
}

/// P_hash: expands `secret` and `seed` into exactly `total_bytes` bytes.
pub fn p_hash(
    algorithm: MacAlgorithm,
    secret: &[u8],
    seed: &[u8],
    total_bytes: usize,
) -> Result<Zeroizing<Vec<u8>>> {
    let block_size = algorithm.hash_len();
    if block_size == 0 {
        return Err(Error::CryptoError("P_hash requires a real hash algorithm".to_string()));
    }

    let mut output = Zeroizing::new(Vec::with_capacity(total_bytes + block_size));

    // A(0) = seed
    let mut a = Zeroizing::new(seed.to_vec());

    while output.len() < total_bytes {
        // A(i) = HMAC_hash(secret, A(i-1))
        a = Zeroizing::new(algorithm.hmac(secret, &[a.as_slice()])?);

        let block = Zeroizing::new(algorithm.hmac(secret, &[a.as_slice(), seed])?);
        output.extend_from_slice(&block);
    }

    output.truncate(total_bytes);
    Ok(output)
}

/// TLS 1.0 PRF over `label || seed`.
pub fn prf(secret: &[u8], label: &[u8], seed: &[u8], total_bytes: usize) -> Result<Zeroizing<Vec<u8>>> {
    let mut label_seed = Vec::with_capacity(label.len() + seed.len());
    label_seed.extend_from_slice(label);
    label_seed.extend_from_slice(seed);

    // Halves of ceil(len/2) bytes, overlapping by one byte for odd lengths
    let half = secret.len() / 2;
    let half_len = secret.len() - half;
    let s1 = &secret[..half_len];
    let s2 = &secret[half..];

    let mut output = p_hash(MacAlgorithm::Md5, s1, &label_seed, total_bytes)?;
    let sha1_stream = p_hash(MacAlgorithm::Sha1, s2, &label_seed, total_bytes)?;

    for (byte, other) in output.iter_mut().zip(sha1_stream.iter()) {
        *byte ^= other;
    }

    trace!(
        "PRF expanded {} bytes for label {:?}",
        total_bytes,
        String::from_utf8_lossy(label)
    );
    Ok(output)
}

/// SSL 3.0 key generator: block i is MD5(secret || SHA-1(salt_i || secret || seed))
/// with salt_i = "A", "BB", "CCC", ...
pub fn ssl3_generate_random(secret: &[u8], seed: &[u8], total_bytes: usize) -> Result<Zeroizing<Vec<u8>>> {
    let block_size = MacAlgorithm::Md5.hash_len();
    let rounds = total_bytes.div_ceil(block_size);
    if rounds > 26 {
        return Err(Error::CryptoError(format!(
            "SSL 3.0 key generator cannot produce {} bytes",
            total_bytes
        )));
    }

    let mut output = Zeroizing::new(Vec::with_capacity(rounds * block_size));
    for i in 0..rounds {
        let salt = vec![b'A' + i as u8; i + 1];
        let inner = Zeroizing::new(MacAlgorithm::Sha1.digest(&[salt.as_slice(), secret, seed]));
        let block = Zeroizing::new(MacAlgorithm::Md5.digest(&[secret, inner.as_slice()]));
        output.extend_from_slice(&block);
    }

    output.truncate(total_bytes);
    Ok(output)
}

impl KeyDerivation for TlsPrf {
    fn expand(
        &self,
        secret: &[u8],
        label: &[u8],
        seed: &[u8],
        total_bytes: usize,
    ) -> Result<Zeroizing<Vec<u8>>> {
        prf(secret, label, seed, total_bytes)
    }

    fn name(&self) -> &'static str {
        "TLS PRF"
    }
}

impl KeyDerivation for Ssl3KeyGenerator {
    // SSL 3.0 does not mix a label into its key generator
    fn expand(
        &self,
        secret: &[u8],
        _label: &[u8],
        seed: &[u8],
        total_bytes: usize,
    ) -> Result<Zeroizing<Vec<u8>>> {
        ssl3_generate_random(secret, seed, total_bytes)
    }

    fn name(&self) -> &'static str {
        "SSL3 key generator"
    }
}
