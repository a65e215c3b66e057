//! LFS object identity: OIDs, hash algorithms and storage keys.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Length of a hex-encoded SHA-256 digest.
pub const OID_HEX_LEN: usize = 64;

/// Content address of an LFS object: 64 lowercase hex characters.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Oid(String);

impl Oid {
    /// Parse and validate an OID.
    ///
    /// Uppercase hex is rejected rather than normalised: the OID is also the
    /// object-store key, and two spellings of one digest must not coexist.
    pub fn parse(s: &str) -> crate::Result<Self> {
        if s.len() != OID_HEX_LEN {
            return Err(crate::Error::InvalidOid(format!(
                "expected {OID_HEX_LEN} hex chars, got {}",
                s.len()
            )));
        }
        if !s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(crate::Error::InvalidOid(
                "oid must be lowercase hex".to_string(),
            ));
        }
        Ok(Self(s.to_string()))
    }

    /// Get the OID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode the OID into its 32 digest bytes.
    pub fn digest(&self) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        // Validated on construction.
        let _ = hex::decode_to_slice(&self.0, &mut bytes);
        bytes
    }

    /// Whether a computed digest matches this OID.
    pub fn matches_digest(&self, digest: &[u8]) -> bool {
        digest.len() == 32 && hex::encode(digest) == self.0
    }
}

impl fmt::Debug for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Oid({})", &self.0[..16])
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Oid {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Oid {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::parse(&value)
    }
}

impl From<Oid> for String {
    fn from(oid: Oid) -> Self {
        oid.0
    }
}

/// Hash algorithm used to derive OIDs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgo {
    #[default]
    Sha256,
}

impl HashAlgo {
    /// Parse a hash algorithm name, rejecting anything but `sha256`.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "sha256" => Ok(Self::Sha256),
            other => Err(crate::Error::InvalidHashAlgo(other.to_string())),
        }
    }

    /// Wire name of the algorithm.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
        }
    }
}

impl fmt::Display for HashAlgo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgo {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::parse(s)
    }
}

/// Object-store key for an LFS object: `objects/<algo>/<oid[0:2]>/<oid[2:4]>/<oid>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StorageKey(String);

impl StorageKey {
    /// Derive the storage key for an object.
    pub fn derive(algo: HashAlgo, oid: &Oid) -> Self {
        let oid = oid.as_str();
        Self(format!(
            "objects/{}/{}/{}/{}",
            algo.as_str(),
            &oid[0..2],
            &oid[2..4],
            oid
        ))
    }

    /// Get the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
