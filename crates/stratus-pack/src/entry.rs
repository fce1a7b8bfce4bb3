use stratus_types::{ObjectId, ObjectType};

/// Type byte written for delta entries. Readers reject them.
pub const DELTA_TYPE_BYTE: u8 = 6;

/// Type tag for pack entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    /// Complete object with its full data.
    Full(ObjectType),
    /// Delta-compressed against a base object.
    Delta { base: ObjectId },
}

impl EntryKind {
    /// Serialize to a type byte for the pack format.
    pub fn type_byte(&self) -> u8 {
        match self {
            Self::Full(ty) => ty.code(),
            Self::Delta { .. } => DELTA_TYPE_BYTE,
        }
    }

    /// Parse from a type byte (full objects only; deltas need the base ID).
    pub fn from_type_byte(byte: u8) -> Option<Self> {
        ObjectType::from_code(byte as u64).map(Self::Full)
    }
}

/// A single entry queued in a pack writer.
#[derive(Clone, Debug)]
pub struct PackEntry {
    pub id: ObjectId,
    pub kind: EntryKind,
    /// Uncompressed data.
    pub data: Vec<u8>,
}
