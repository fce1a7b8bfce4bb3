use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// The type of a stored object, as understood by the host object database.
///
/// The numeric codes are the wire type codes written into blob headers and
/// pack entries. They match the codes the host engine uses for the same
/// object types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    Commit,
    Tree,
    Blob,
    Tag,
}

impl ObjectType {
    /// All object types, in code order.
    pub const ALL: [ObjectType; 4] = [Self::Commit, Self::Tree, Self::Blob, Self::Tag];

    /// Wire type code.
    pub fn code(&self) -> u8 {
        match self {
            Self::Commit => 1,
            Self::Tree => 2,
            Self::Blob => 3,
            Self::Tag => 4,
        }
    }

    /// Parse a wire type code.
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            1 => Some(Self::Commit),
            2 => Some(Self::Tree),
            3 => Some(Self::Blob),
            4 => Some(Self::Tag),
            _ => None,
        }
    }

    /// Lowercase name used in object hashing and display.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::Tree => "tree",
            Self::Blob => "blob",
            Self::Tag => "tag",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ObjectType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| TypeError::UnknownObjectType(s.to_string()))
    }
}

/// Type and length of an object, known without its body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectHeader {
    pub object_type: ObjectType,
    pub length: u64,
}

impl ObjectHeader {
    pub fn new(object_type: ObjectType, length: u64) -> Self {
        Self {
            object_type,
            length,
        }
    }
}
