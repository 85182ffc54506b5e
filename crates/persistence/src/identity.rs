use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable id minted once per world save. Namespaces the snapshot directory so
/// saves branched from the same world never share files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersistentIdentity(Uuid);

impl PersistentIdentity {
    pub fn mint() -> Self {
        Self(Uuid::new_v4())
    }

    /// Accepts only the lowercase hyphenated form this type renders, so a
    /// parsed identity always maps back to the same directory name.
    pub fn parse(raw: &str) -> Option<Self> {
        let uuid = Uuid::parse_str(raw).ok()?;
        let identity = Self(uuid);
        (identity.to_string() == raw).then_some(identity)
    }
}

impl fmt::Display for PersistentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_identities_are_unique_and_parse_back() {
        let first = PersistentIdentity::mint();
        let second = PersistentIdentity::mint();
        assert_ne!(first, second);
        assert_eq!(PersistentIdentity::parse(&first.to_string()), Some(first));
    }

    #[test]
    fn parse_rejects_non_canonical_names() {
        assert!(PersistentIdentity::parse("..").is_none());
        assert!(PersistentIdentity::parse("not-an-id").is_none());
        assert!(PersistentIdentity::parse("67E55044-10B1-426F-9247-BB680E5FE0C8").is_none());
        assert!(PersistentIdentity::parse("67e5504410b1426f9247bb680e5fe0c8").is_none());
        assert!(PersistentIdentity::parse("67e55044-10b1-426f-9247-bb680e5fe0c8").is_some());
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = PersistentIdentity::parse("67e55044-10b1-426f-9247-bb680e5fe0c8").expect("id");
        let json = serde_json::to_string(&id).expect("json");
        assert_eq!(json, "\"67e55044-10b1-426f-9247-bb680e5fe0c8\"");
    }
}
