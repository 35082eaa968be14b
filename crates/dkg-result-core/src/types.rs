//! Core types for DKG result agreement

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

/// 1-based position of a member within the DKG group
pub type MemberIndex = u32;

/// Identifier of one agreement session (the broadcast topic)
pub type SessionId = [u8; 32];

/// Default collection window for peer votes
pub const DEFAULT_COLLECTION_WINDOW: Duration = Duration::from_secs(60);

/// Keccak-256 digest of `data`
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// Derive a session id from the name of the group's broadcast channel
pub fn session_id_for_channel(channel: &str) -> SessionId {
    keccak256(channel.as_bytes())
}

/// Digest of a candidate DKG result
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResultHash(#[serde(with = "hex_array")] [u8; 32]);

impl ResultHash {
    pub const LEN: usize = 32;

    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse a hash received from the wire
    pub fn from_slice(bytes: &[u8]) -> crate::Result<Self> {
        let array: [u8; 32] = bytes.try_into().map_err(|_| {
            crate::Error::Deserialization(format!(
                "result hash must be {} bytes, got {}",
                Self::LEN,
                bytes.len()
            ))
        })?;
        Ok(Self(array))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for ResultHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for ResultHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResultHash({})", hex::encode(self.0))
    }
}

/// Output of a DKG run that members vote on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DkgResult {
    /// Group public key
    #[serde(with = "hex_bytes")]
    pub group_public_key: Vec<u8>,

    /// Members judged to have misbehaved during the protocol
    #[serde(default)]
    pub misbehaved_members: Vec<MemberIndex>,
}

impl DkgResult {
    pub fn new(group_public_key: Vec<u8>, misbehaved_members: Vec<MemberIndex>) -> Self {
        Self {
            group_public_key,
            misbehaved_members,
        }
    }

    /// Canonical hash of the result.
    ///
    /// Misbehaved members are hashed in ascending order without repeats, so
    /// members that disagree only on list order still vote for the same hash.
    pub fn hash(&self) -> ResultHash {
        let misbehaved: BTreeSet<MemberIndex> = self.misbehaved_members.iter().copied().collect();

        let mut hasher = Keccak256::new();
        hasher.update(&self.group_public_key);
        for member in misbehaved {
            hasher.update(member.to_be_bytes());
        }
        ResultHash(hasher.finalize().into())
    }
}

/// Configuration for one agreement session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgreementConfig {
    /// Session identifier
    pub session_id: SessionId,

    /// This member's index
    pub member_index: MemberIndex,

    /// Number of members in the group
    pub group_size: usize,

    /// Distinct supporters required for one result hash
    pub threshold: usize,

    /// How long to collect votes before abandoning the session
    pub collection_window: Duration,
}

impl AgreementConfig {
    /// Create a new configuration with an honest-majority threshold
    pub fn new(
        session_id: SessionId,
        group_size: usize,
        member_index: MemberIndex,
    ) -> crate::Result<Self> {
        if group_size == 0 {
            return Err(crate::Error::InvalidConfig(
                "Group must have at least one member".into(),
            ));
        }
        if member_index == 0 || member_index as usize > group_size {
            return Err(crate::Error::InvalidConfig(format!(
                "Member index {} outside of group 1..={}",
                member_index, group_size
            )));
        }

        Ok(Self {
            session_id,
            member_index,
            group_size,
            threshold: honest_majority(group_size),
            collection_window: DEFAULT_COLLECTION_WINDOW,
        })
    }

    /// Override the support threshold
    pub fn with_threshold(mut self, threshold: usize) -> crate::Result<Self> {
        if threshold == 0 {
            return Err(crate::Error::InvalidConfig(
                "Threshold must be at least 1".into(),
            ));
        }
        if threshold > self.group_size {
            return Err(crate::Error::InvalidConfig(
                "Threshold cannot exceed group size".into(),
            ));
        }
        self.threshold = threshold;
        Ok(self)
    }

    /// Override the vote collection window
    pub fn with_collection_window(mut self, window: Duration) -> Self {
        self.collection_window = window;
        self
    }
}

/// Smallest number of members forming a strict majority of the group
pub fn honest_majority(group_size: usize) -> usize {
    group_size / 2 + 1
}

pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)
    }
}

mod hex_array {
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        super::hex_bytes::serialize(bytes, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes = super::hex_bytes::deserialize(deserializer)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("Invalid hash length"))
    }
}
