//! Group membership view used to authorize votes

use crate::types::hex_bytes;
use crate::{Error, MemberIndex, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Read-only view of the group taking part in a session
pub trait GroupMembership: Send + Sync {
    /// Public key registered for `index`, or `None` if it is not a member
    fn expected_public_key(&self, index: MemberIndex) -> Option<&[u8]>;

    /// Number of members in the group
    fn group_size(&self) -> usize;
}

/// Member entry as stored in a group file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub index: MemberIndex,
    #[serde(with = "hex_bytes")]
    pub public_key: Vec<u8>,
}

/// Membership snapshot taken for the duration of one session
#[derive(Debug, Clone, Default)]
pub struct GroupSnapshot {
    members: BTreeMap<MemberIndex, Vec<u8>>,
}

impl GroupSnapshot {
    /// Build a snapshot from public keys ordered by member index, starting at 1
    pub fn from_public_keys(keys: impl IntoIterator<Item = Vec<u8>>) -> Self {
        let members = (1..).zip(keys).collect();
        Self { members }
    }

    /// Build a snapshot from explicit member entries
    pub fn from_members(members: impl IntoIterator<Item = Member>) -> Result<Self> {
        let mut snapshot = BTreeMap::new();
        for member in members {
            if member.index == 0 {
                return Err(Error::InvalidConfig("Member indices start at 1".into()));
            }
            if snapshot.insert(member.index, member.public_key).is_some() {
                return Err(Error::InvalidConfig(format!(
                    "Member {} listed twice",
                    member.index
                )));
            }
        }
        Ok(Self { members: snapshot })
    }

    /// Load a snapshot from a JSON array of members
    pub fn from_json(json: &str) -> Result<Self> {
        let members: Vec<Member> =
            serde_json::from_str(json).map_err(|e| Error::Deserialization(e.to_string()))?;
        Self::from_members(members)
    }

    /// Members in index order
    pub fn members(&self) -> impl Iterator<Item = Member> + '_ {
        self.members.iter().map(|(index, key)| Member {
            index: *index,
            public_key: key.clone(),
        })
    }
}

impl GroupMembership for GroupSnapshot {
    fn expected_public_key(&self, index: MemberIndex) -> Option<&[u8]> {
        self.members.get(&index).map(Vec::as_slice)
    }

    fn group_size(&self) -> usize {
        self.members.len()
    }
}
