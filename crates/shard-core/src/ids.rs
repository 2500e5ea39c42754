//! Newtype identifiers for bridge resources.
//!
//! Both ids are hex strings as returned by the bridge (12-byte bucket ids,
//! 12-byte file ids). We keep them as validated newtypes rather than bare
//! `String` so a bucket id can never be passed where a file id is expected.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A bridge-assigned bucket identifier (hex string).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BucketId(String);

/// A bridge-assigned file identifier (hex string).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(String);

/// A hex string failed validation (empty, or contains non-hex characters).
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid hex id: {0:?}")]
pub struct InvalidHexId(String);

fn validate_hex(s: &str) -> Result<(), InvalidHexId> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(InvalidHexId(s.to_string()));
    }
    Ok(())
}

macro_rules! hex_id {
    ($name:ident) => {
        impl $name {
            /// Wrap a hex string, validating that it contains only hex digits.
            pub fn new(value: impl Into<String>) -> Result<Self, InvalidHexId> {
                let value = value.into();
                validate_hex(&value)?;
                Ok(Self(value))
            }

            /// Borrow the underlying hex string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = InvalidHexId;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

hex_id!(BucketId);
hex_id!(FileId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_hex() {
        assert!(BucketId::new("368be0816766b28fd5f43af5").is_ok());
        assert!(FileId::new("998960317b6725a3f8080c2b").is_ok());
    }

    #[test]
    fn rejects_empty_and_non_hex() {
        assert!(BucketId::new("").is_err());
        assert!(BucketId::new("not-hex!").is_err());
    }

    #[test]
    fn display_round_trips() {
        let id = FileId::new("998960317b6725a3f8080c2b").unwrap();
        assert_eq!(id.to_string(), "998960317b6725a3f8080c2b");
        assert_eq!(id.as_str(), "998960317b6725a3f8080c2b");
    }
}
