//! Result hash votes and their wire encoding

use crate::signing::Signer;
use crate::{MemberIndex, Result, ResultHash};
use prost::Message as _;

/// Wire messages exchanged on the group broadcast channel
pub mod pb {
    /// Hash of the DKG result preferred by the sender, a signature over this
    /// hash, and the sender's public key used to verify the signature.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct DkgResultHashSignature {
        #[prost(uint32, tag = "1")]
        pub sender_index: u32,
        #[prost(bytes = "vec", tag = "2")]
        pub result_hash: ::prost::alloc::vec::Vec<u8>,
        #[prost(bytes = "vec", tag = "3")]
        pub signature: ::prost::alloc::vec::Vec<u8>,
        #[prost(bytes = "vec", tag = "4")]
        pub public_key: ::prost::alloc::vec::Vec<u8>,
    }
}

/// Claim by one member that it supports a result hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vote {
    sender_index: MemberIndex,
    result_hash: ResultHash,
    signature: Vec<u8>,
    public_key: Vec<u8>,
}

impl Vote {
    pub fn new(
        sender_index: MemberIndex,
        result_hash: ResultHash,
        signature: Vec<u8>,
        public_key: Vec<u8>,
    ) -> Self {
        Self {
            sender_index,
            result_hash,
            signature,
            public_key,
        }
    }

    /// Sign `result_hash` as member `sender_index`
    pub fn sign(
        sender_index: MemberIndex,
        result_hash: ResultHash,
        signer: &dyn Signer,
    ) -> Result<Self> {
        let signature = signer.sign(result_hash.as_bytes())?;
        Ok(Self::new(
            sender_index,
            result_hash,
            signature,
            signer.public_key(),
        ))
    }

    pub fn sender_index(&self) -> MemberIndex {
        self.sender_index
    }

    pub fn result_hash(&self) -> &ResultHash {
        &self.result_hash
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Encode for the broadcast channel
    pub fn to_bytes(&self) -> Vec<u8> {
        pb::DkgResultHashSignature::from(self).encode_to_vec()
    }

    /// Decode a vote received from the broadcast channel
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let message = pb::DkgResultHashSignature::decode(bytes)?;
        Self::try_from(message)
    }
}

impl From<&Vote> for pb::DkgResultHashSignature {
    fn from(vote: &Vote) -> Self {
        Self {
            sender_index: vote.sender_index,
            result_hash: vote.result_hash.as_bytes().to_vec(),
            signature: vote.signature.clone(),
            public_key: vote.public_key.clone(),
        }
    }
}

impl TryFrom<pb::DkgResultHashSignature> for Vote {
    type Error = crate::Error;

    fn try_from(message: pb::DkgResultHashSignature) -> Result<Self> {
        Ok(Self {
            sender_index: message.sender_index,
            result_hash: ResultHash::from_slice(&message.result_hash)?,
            signature: message.signature,
            public_key: message.public_key,
        })
    }
}
