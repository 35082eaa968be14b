//! Vote authentication against the group membership

use super::Vote;
use crate::membership::GroupMembership;
use crate::signing::SignatureVerifier;
use crate::{Error, Result};
use std::sync::Arc;

/// Checks that a vote comes from a group member and carries a valid signature
#[derive(Clone)]
pub struct VoteVerifier {
    membership: Arc<dyn GroupMembership>,
    signatures: Arc<dyn SignatureVerifier>,
}

impl VoteVerifier {
    pub fn new(
        membership: Arc<dyn GroupMembership>,
        signatures: Arc<dyn SignatureVerifier>,
    ) -> Self {
        Self {
            membership,
            signatures,
        }
    }

    /// Number of members in the group this verifier checks against
    pub fn group_size(&self) -> usize {
        self.membership.group_size()
    }

    /// Accept or reject `vote`.
    ///
    /// Membership is checked first, then the claimed public key against the
    /// one on file, and only then the signature.
    pub fn verify(&self, vote: &Vote) -> Result<()> {
        let expected = self
            .membership
            .expected_public_key(vote.sender_index())
            .ok_or(Error::UnknownSender(vote.sender_index()))?;

        if expected != vote.public_key() {
            return Err(Error::KeyMismatch(vote.sender_index()));
        }

        self.signatures.verify(
            vote.result_hash().as_bytes(),
            vote.signature(),
            vote.public_key(),
        )
    }
}
