use std::{fmt, str::FromStr};

use ed25519_dalek::VerifyingKey;
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

pub const IDENTITY_LEN: usize = 20;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum IdentityError {
    #[error("invalid identity hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
    #[error("identity must be 20 bytes, got {0}")]
    InvalidLength(usize),
}

/// Opaque account address of whoever deposited a letter.
///
/// Rendered as `0x` + 40 lowercase hex digits.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identity([u8; IDENTITY_LEN]);

impl Identity {
    pub const fn from_bytes(bytes: [u8; IDENTITY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; IDENTITY_LEN] {
        &self.0
    }

    /// Address owned by an ed25519 key: the trailing 20 bytes of
    /// `sha256(public key)`.
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        let digest: [u8; 32] = Sha256::digest(key.as_bytes()).into();
        let mut bytes = [0u8; IDENTITY_LEN];
        bytes.copy_from_slice(&digest[32 - IDENTITY_LEN..]);
        Self(bytes)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({self})")
    }
}

impl FromStr for Identity {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        let bytes = hex::decode(digits)?;
        let bytes: [u8; IDENTITY_LEN] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| IdentityError::InvalidLength(bytes.len()))?;
        Ok(Self(bytes))
    }
}

impl Serialize for Identity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        encoded.parse().map_err(D::Error::custom)
    }
}
