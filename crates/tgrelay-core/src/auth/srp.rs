//! SRP-6a proof for the two-factor password step.
//!
//! The client never sends the password. It derives a password hash `x` from
//! the salts the server hands out, then proves knowledge of it against the
//! server's ephemeral value `B`:
//!
//! ```text
//! k  = H(p | g)            u = H(A | B)
//! A  = g^a mod p           S = (B - k * g^x) ^ (a + u * x) mod p
//! K  = H(S)                M1 = H(H(p) xor H(g) | H(salt1) | H(salt2) | A | B | K)
//! ```
//!
//! `H` is SHA-256 and every group element is padded to 256 bytes big-endian.

use std::num::NonZeroU32;

use num_bigint::BigUint;
use rand::RngCore;
use ring::pbkdf2;
use sha2::{Digest, Sha256};

use crate::{errors::Error, Result};

/// Constructor name of the platform's current password KDF.
pub const PLATFORM_KDF: &str =
    "passwordKdfAlgoSHA256SHA256PBKDF2HMACSHA512iter100000SHA256ModPow";

const PLATFORM_KDF_ITERATIONS: u32 = 100_000;
const SRP_BYTES: usize = 256;
const SRP_BITS: u64 = 2048;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PasswordKdf {
    /// `PH2(password, salt1, salt2)` as documented by the platform.
    PlatformModPow,
    /// Three-stage PBKDF2-HMAC-SHA512 chain, see [`derive_password_secret`].
    Pbkdf2Chain { iterations: u32 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PasswordAlgo {
    pub kdf: PasswordKdf,
    pub salt1: Vec<u8>,
    pub salt2: Vec<u8>,
    pub g: u32,
    pub p: Vec<u8>,
}

/// Result of `account.getPassword`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PasswordParams {
    pub srp_id: i64,
    pub srp_b: Vec<u8>,
    pub algo: PasswordAlgo,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SrpProof {
    pub srp_id: i64,
    pub a: Vec<u8>,
    pub m1: Vec<u8>,
}

pub fn pbkdf2_sha512(secret: &[u8], salt: &[u8], iterations: u32) -> [u8; 64] {
    let iterations = NonZeroU32::new(iterations).unwrap_or(NonZeroU32::MIN);
    let mut out = [0u8; 64];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA512,
        iterations,
        salt,
        secret,
        &mut out,
    );
    out
}

/// `h3 = PBKDF2(PBKDF2(PBKDF2(password, salt1, n), salt2, n), salt1, 1)`.
pub fn derive_password_secret(
    password: &[u8],
    salt1: &[u8],
    salt2: &[u8],
    iterations: u32,
) -> [u8; 64] {
    let h1 = pbkdf2_sha512(password, salt1, iterations);
    let h2 = pbkdf2_sha512(&h1, salt2, iterations);
    pbkdf2_sha512(&h2, salt1, 1)
}

pub fn compute_proof(password: &str, params: &PasswordParams) -> Result<SrpProof> {
    let mut a = [0u8; SRP_BYTES];
    rand::thread_rng().fill_bytes(&mut a);
    compute_proof_with_secret(password, params, &a)
}

pub(crate) fn compute_proof_with_secret(
    password: &str,
    params: &PasswordParams,
    a_secret: &[u8],
) -> Result<SrpProof> {
    let algo = &params.algo;

    let p = BigUint::from_bytes_be(&algo.p);
    if p.bits() != SRP_BITS {
        return Err(Error::Srp(format!("p must be {SRP_BITS} bits, got {}", p.bits())));
    }
    if algo.g < 2 {
        return Err(Error::Srp(format!("invalid generator g={}", algo.g)));
    }
    let g = BigUint::from(algo.g);

    let b = BigUint::from_bytes_be(&params.srp_b);
    if b <= BigUint::from(1u32) || b >= p {
        return Err(Error::Srp("server value B out of range".to_string()));
    }

    let p_bytes = pad(&algo.p)?;
    let g_bytes = pad(&g.to_bytes_be())?;
    let b_bytes = pad(&params.srp_b)?;

    let x = BigUint::from_bytes_be(&password_hash(password.as_bytes(), algo));
    let a = BigUint::from_bytes_be(a_secret);

    let ga = g.modpow(&a, &p);
    let a_bytes = pad(&ga.to_bytes_be())?;

    let k = BigUint::from_bytes_be(&sha256(&[&p_bytes, &g_bytes]));
    let u = BigUint::from_bytes_be(&sha256(&[&a_bytes, &b_bytes]));
    if u == BigUint::from(0u32) {
        return Err(Error::Srp("u must not be zero".to_string()));
    }

    let kgx = (k * g.modpow(&x, &p)) % &p;
    let base = (&b + &p - kgx) % &p;
    let s = base.modpow(&(a + u * x), &p);
    let key = sha256(&[&pad(&s.to_bytes_be())?]);

    let hp = sha256(&[&p_bytes]);
    let hg = sha256(&[&g_bytes]);
    let hpg: Vec<u8> = hp.iter().zip(hg.iter()).map(|(l, r)| l ^ r).collect();

    let m1 = sha256(&[
        &hpg,
        &sha256(&[&algo.salt1]),
        &sha256(&[&algo.salt2]),
        &a_bytes,
        &b_bytes,
        &key,
    ]);

    Ok(SrpProof {
        srp_id: params.srp_id,
        a: a_bytes,
        m1: m1.to_vec(),
    })
}

fn password_hash(password: &[u8], algo: &PasswordAlgo) -> Vec<u8> {
    match algo.kdf {
        PasswordKdf::PlatformModPow => {
            let ph1 = salted(&salted(password, &algo.salt1), &algo.salt2);
            let stretched = pbkdf2_sha512(&ph1, &algo.salt1, PLATFORM_KDF_ITERATIONS);
            salted(&stretched, &algo.salt2).to_vec()
        }
        PasswordKdf::Pbkdf2Chain { iterations } => {
            derive_password_secret(password, &algo.salt1, &algo.salt2, iterations).to_vec()
        }
    }
}

fn sha256(parts: &[&[u8]]) -> [u8; 32] {
    let mut h = Sha256::new();
    for part in parts {
        h.update(part);
    }
    h.finalize().into()
}

/// `SH(data, salt) = H(salt | data | salt)`
fn salted(data: &[u8], salt: &[u8]) -> [u8; 32] {
    sha256(&[salt, data, salt])
}

fn pad(bytes: &[u8]) -> Result<Vec<u8>> {
    if bytes.len() > SRP_BYTES {
        return Err(Error::Srp(format!(
            "value of {} bytes exceeds {SRP_BYTES}",
            bytes.len()
        )));
    }
    let mut out = vec![0u8; SRP_BYTES - bytes.len()];
    out.extend_from_slice(bytes);
    Ok(out)
}

// Any 2048-bit odd modulus is enough to check the algebra of the exchange.
#[cfg(test)]
pub(crate) fn test_modulus() -> Vec<u8> {
    let mut p = vec![0xff; SRP_BYTES];
    p[SRP_BYTES - 1] = 0xc5;
    p
}

#[cfg(test)]
pub(crate) fn params_with_server_secret(
    algo: PasswordAlgo,
    password: &str,
    b_secret: &[u8],
) -> PasswordParams {
    let p = BigUint::from_bytes_be(&algo.p);
    let g = BigUint::from(algo.g);
    let x = BigUint::from_bytes_be(&password_hash(password.as_bytes(), &algo));
    let v = g.modpow(&x, &p);
    let k = BigUint::from_bytes_be(&sha256(&[
        &pad(&algo.p).unwrap(),
        &pad(&g.to_bytes_be()).unwrap(),
    ]));
    let b = BigUint::from_bytes_be(b_secret);
    let big_b = (k * v + g.modpow(&b, &p)) % &p;
    PasswordParams {
        srp_id: 42,
        srp_b: big_b.to_bytes_be(),
        algo,
    }
}
