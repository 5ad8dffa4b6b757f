//! Composite key for per-project role actors.
//!
//! A `ProjectRoleKey` can only be built from both halves, so a project-actor
//! entry is never addressed by role or project alone.

use roster_core::{ProjectId, RoleId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator byte between role_id and project_id.
const SEPARATOR: u8 = 0xFF;

/// Encoded key length.
pub const ENCODED_LEN: usize = 17;

/// Length of the prefix shared by every key of one role.
pub const ROLE_PREFIX_LEN: usize = 9;

/// Key of a [`ProjectActors`](roster_core::ProjectActors) entry.
///
/// # Binary Format
///
/// The key encodes to a fixed 17-byte array:
/// - Bytes 0-7: role_id (i64, big-endian)
/// - Byte 8: separator (0xFF)
/// - Bytes 9-16: project_id (i64, big-endian)
///
/// Encoded keys of one role share the first 9 bytes, so a sorted key space
/// can be range-scanned per role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProjectRoleKey {
    role_id: RoleId,
    project_id: ProjectId,
}

impl ProjectRoleKey {
    pub fn new(role_id: RoleId, project_id: ProjectId) -> Self {
        Self {
            role_id,
            project_id,
        }
    }

    pub fn role_id(&self) -> RoleId {
        self.role_id
    }

    pub fn project_id(&self) -> ProjectId {
        self.project_id
    }

    /// Encode this key to its fixed-size byte form.
    pub fn encode(&self) -> [u8; ENCODED_LEN] {
        let mut bytes = [0u8; ENCODED_LEN];
        bytes[0..8].copy_from_slice(&self.role_id.get().to_be_bytes());
        bytes[8] = SEPARATOR;
        bytes[9..17].copy_from_slice(&self.project_id.get().to_be_bytes());
        bytes
    }

    /// Decode a key from bytes.
    ///
    /// Returns `None` if the slice is not exactly 17 bytes or the separator
    /// byte is wrong.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != ENCODED_LEN || bytes[8] != SEPARATOR {
            return None;
        }

        let role = i64::from_be_bytes(bytes[0..8].try_into().ok()?);
        let project = i64::from_be_bytes(bytes[9..17].try_into().ok()?);

        Some(Self::new(RoleId::new(role), ProjectId::new(project)))
    }

    /// Prefix shared by every encoded key of `role_id`.
    pub fn role_prefix(role_id: RoleId) -> [u8; ROLE_PREFIX_LEN] {
        let mut prefix = [0u8; ROLE_PREFIX_LEN];
        prefix[0..8].copy_from_slice(&role_id.get().to_be_bytes());
        prefix[8] = SEPARATOR;
        prefix
    }
}

impl fmt::Display for ProjectRoleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "role {} in project {}", self.role_id, self.project_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(role: i64, project: i64) -> ProjectRoleKey {
        ProjectRoleKey::new(RoleId::new(role), ProjectId::new(project))
    }

    #[test]
    fn test_new_and_getters() {
        let key = key(3, 10_010);
        assert_eq!(key.role_id(), RoleId::new(3));
        assert_eq!(key.project_id(), ProjectId::new(10_010));
    }

    #[test]
    fn test_encode_layout() {
        let encoded = key(1, 2).encode();
        assert_eq!(
            encoded,
            [0, 0, 0, 0, 0, 0, 0, 1, 0xFF, 0, 0, 0, 0, 0, 0, 0, 2]
        );
    }

    #[test]
    fn test_encode_decode_negative_ids() {
        let original = key(-1, i64::MIN);
        let decoded = ProjectRoleKey::decode(&original.encode()).expect("decode should succeed");
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_decode_wrong_length() {
        assert!(ProjectRoleKey::decode(&[0u8; 16]).is_none());
        assert!(ProjectRoleKey::decode(&[0u8; 18]).is_none());
        assert!(ProjectRoleKey::decode(&[]).is_none());
    }

    #[test]
    fn test_decode_wrong_separator() {
        let mut bytes = key(1, 2).encode();
        bytes[8] = 0x00;
        assert!(ProjectRoleKey::decode(&bytes).is_none());
    }

    #[test]
    fn test_role_prefix() {
        let prefix = ProjectRoleKey::role_prefix(RoleId::new(7));
        assert_eq!(prefix, [0, 0, 0, 0, 0, 0, 0, 7, 0xFF]);
    }

    #[test]
    fn test_swapped_ids_differ() {
        assert_ne!(key(1, 2), key(2, 1));
        assert_ne!(key(1, 2).encode(), key(2, 1).encode());
    }

    #[test]
    fn test_serde_json_roundtrip() {
        let original = key(4, 10_000);
        let json = serde_json::to_string(&original).expect("serialize should succeed");
        assert_eq!(json, r#"{"role_id":4,"project_id":10000}"#);

        let restored: ProjectRoleKey = serde_json::from_str(&json).expect("deserialize should succeed");
        assert_eq!(original, restored);
    }

    #[test]
    fn test_display() {
        assert_eq!(key(2, 5).to_string(), "role 2 in project 5");
    }
}
