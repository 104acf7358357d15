// ============================
// crates/portal-lib/src/auth/unix_hash.rs
// ============================
//! Crypt-style password hash parsing and verification.
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Algorithm named by a crypt hash prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashAlgorithm {
    /// `$6$`
    Sha512,
    /// `$5$`
    Sha256,
    /// `$1$`
    Md5,
    /// bcrypt, traditional DES, or an unrecognized `$id$` scheme
    Other(String),
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashAlgorithm::Sha512 => f.write_str("sha512-crypt"),
            HashAlgorithm::Sha256 => f.write_str("sha256-crypt"),
            HashAlgorithm::Md5 => f.write_str("md5-crypt"),
            HashAlgorithm::Other(id) => write!(f, "other({id})"),
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum HashParseError {
    #[error("empty hash")]
    Empty,
    #[error("account is locked or has no password")]
    Locked,
    #[error("malformed hash")]
    Malformed,
}

/// A password hash as stored by the remote system
#[derive(Clone, PartialEq, Eq)]
pub struct StoredHash {
    pub algorithm: HashAlgorithm,
    pub salt: String,
    pub digest: String,
    raw: String,
}

impl StoredHash {
    /// The hash exactly as stored
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Check a plaintext password against this hash
    pub fn verify(&self, plaintext: &str) -> bool {
        pwhash::unix::verify(plaintext, &self.raw)
    }
}

impl fmt::Debug for StoredHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredHash")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl FromStr for StoredHash {
    type Err = HashParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        if raw.is_empty() {
            return Err(HashParseError::Empty);
        }
        if raw == "*" || raw.starts_with('!') || raw == "x" {
            return Err(HashParseError::Locked);
        }

        let (algorithm, salt, digest) = match raw.strip_prefix('$') {
            Some(rest) => parse_modular(rest)?,
            None => parse_des(raw)?,
        };

        Ok(Self {
            algorithm,
            salt: salt.to_string(),
            digest: digest.to_string(),
            raw: raw.to_string(),
        })
    }
}

/// `id$[rounds=N$]salt$digest`
fn parse_modular(rest: &str) -> Result<(HashAlgorithm, &str, &str), HashParseError> {
    let mut fields = rest.split('$');
    let id = fields.next().filter(|s| !s.is_empty()).ok_or(HashParseError::Malformed)?;

    let algorithm = match id {
        "6" => HashAlgorithm::Sha512,
        "5" => HashAlgorithm::Sha256,
        "1" => HashAlgorithm::Md5,
        other => HashAlgorithm::Other(other.to_string()),
    };

    let mut salt = fields.next().ok_or(HashParseError::Malformed)?;
    if salt.starts_with("rounds=") {
        salt = fields.next().ok_or(HashParseError::Malformed)?;
    }

    // bcrypt packs salt and digest into one field after the cost
    if matches!(id, "2a" | "2b" | "2y") {
        let packed = fields.next().ok_or(HashParseError::Malformed)?;
        if packed.len() != 53 || !packed.is_ascii() || fields.next().is_some() {
            return Err(HashParseError::Malformed);
        }
        let (bsalt, bdigest) = packed.split_at(22);
        return Ok((algorithm, bsalt, bdigest));
    }

    let digest = fields.next().ok_or(HashParseError::Malformed)?;
    if digest.is_empty() || fields.next().is_some() {
        return Err(HashParseError::Malformed);
    }

    Ok((algorithm, salt, digest))
}

/// Traditional DES: 2-char salt followed by an 11-char digest
fn parse_des(raw: &str) -> Result<(HashAlgorithm, &str, &str), HashParseError> {
    if raw.len() != 13 || !raw.bytes().all(is_crypt64) {
        return Err(HashParseError::Malformed);
    }
    let (salt, digest) = raw.split_at(2);
    Ok((HashAlgorithm::Other("des".to_string()), salt, digest))
}

fn is_crypt64(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'.' || b == b'/'
}

/// Verify `plaintext` against a crypt-style `stored_hash`.
///
/// Fails closed: anything that does not parse, or uses a scheme the
/// verifier cannot compute, yields `false`.
pub fn verify(plaintext: &str, stored_hash: &str) -> bool {
    match stored_hash.parse::<StoredHash>() {
        Ok(hash) => hash.verify(plaintext),
        Err(_) => false,
    }
}
