use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;
use crate::kind::ObjectType;

/// Length in bytes of every digest used as an identifier.
pub const DIGEST_LEN: usize = 32;

macro_rules! digest_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name([u8; DIGEST_LEN]);

        impl $name {
            /// Create an identifier from a pre-computed digest.
            pub const fn from_hash(hash: [u8; DIGEST_LEN]) -> Self {
                Self(hash)
            }

            /// The all-zero identifier.
            pub const fn null() -> Self {
                Self([0u8; DIGEST_LEN])
            }

            /// Returns `true` if every byte is zero.
            pub fn is_null(&self) -> bool {
                self.0 == [0u8; DIGEST_LEN]
            }

            /// The raw digest bytes.
            pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
                &self.0
            }

            /// Lowercase hex encoding (64 characters).
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// First 8 hex characters, for logs.
            pub fn short_hex(&self) -> String {
                hex::encode(&self.0[..4])
            }

            /// Parse from a 64-character hex string.
            pub fn from_hex(s: &str) -> Result<Self, TypeError> {
                let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
                let arr: [u8; DIGEST_LEN] =
                    bytes.as_slice().try_into().map_err(|_| TypeError::InvalidLength {
                        expected: DIGEST_LEN,
                        actual: bytes.len(),
                    })?;
                Ok(Self(arr))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.short_hex())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl FromStr for $name {
            type Err = TypeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_hex(s)
            }
        }

        impl From<[u8; DIGEST_LEN]> for $name {
            fn from(bytes: [u8; DIGEST_LEN]) -> Self {
                Self(bytes)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::from_hex(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

digest_id!(
    /// Content-addressed identifier of an object.
    ///
    /// The backend treats ids as opaque keys handed to it by the host engine;
    /// the only place that derives an id from content is the pack indexer,
    /// via [`ObjectId::hash_object`].
    ObjectId
);

digest_id!(
    /// Identifier of a pack/index pair: the BLAKE3 checksum of the pack body.
    PackId
);

impl ObjectId {
    /// Hash an object the way the pack indexer names pack members:
    /// BLAKE3 over `"<type> <len>\0"` followed by the object bytes.
    pub fn hash_object(ty: ObjectType, data: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(ty.name().as_bytes());
        hasher.update(b" ");
        hasher.update(data.len().to_string().as_bytes());
        hasher.update(b"\0");
        hasher.update(data);
        Self(*hasher.finalize().as_bytes())
    }
}

impl PackId {
    /// Checksum a pack body.
    pub fn checksum(pack_body: &[u8]) -> Self {
        Self(*blake3::hash(pack_body).as_bytes())
    }
}
