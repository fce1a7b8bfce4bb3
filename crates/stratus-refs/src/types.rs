//! Core reference types.

use serde::{Deserialize, Serialize};
use stratus_types::ObjectId;

/// A named reference: either a direct pointer to an object or a symbolic
/// pointer to another ref (as `HEAD` usually is).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ref {
    Direct { name: String, target: ObjectId },
    Symbolic { name: String, target: String },
}

impl Ref {
    pub fn direct(name: impl Into<String>, target: ObjectId) -> Self {
        Self::Direct {
            name: name.into(),
            target,
        }
    }

    pub fn symbolic(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::Symbolic {
            name: name.into(),
            target: target.into(),
        }
    }

    /// The full ref name (e.g. "refs/heads/main").
    pub fn name(&self) -> &str {
        match self {
            Self::Direct { name, .. } | Self::Symbolic { name, .. } => name,
        }
    }

    pub fn is_symbolic(&self) -> bool {
        matches!(self, Self::Symbolic { .. })
    }

    /// The object a direct ref points at.
    pub fn target_id(&self) -> Option<&ObjectId> {
        match self {
            Self::Direct { target, .. } => Some(target),
            Self::Symbolic { .. } => None,
        }
    }

    /// Render the target as text: object hex for direct refs, ref name otherwise.
    pub fn target_string(&self) -> String {
        match self {
            Self::Direct { target, .. } => target.to_hex(),
            Self::Symbolic { target, .. } => target.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors() {
        let id = ObjectId::from_hash([1; 32]);
        let direct = Ref::direct("refs/heads/main", id);
        assert_eq!(direct.name(), "refs/heads/main");
        assert_eq!(direct.target_id(), Some(&id));
        assert!(!direct.is_symbolic());
        assert_eq!(direct.target_string(), id.to_hex());

        let head = Ref::symbolic("HEAD", "refs/heads/main");
        assert_eq!(head.name(), "HEAD");
        assert!(head.is_symbolic());
        assert!(head.target_id().is_none());
        assert_eq!(head.target_string(), "refs/heads/main");
    }
}
