//! Off-chain agreement on a DKG result
//!
//! Members broadcast a signed vote for the hash of the result they computed.
//! Each incoming vote is checked by the [`VoteVerifier`], counted once per
//! sender by the [`ResultTally`], and the [`AgreementSession`] resolves its
//! promise with the first hash supported by at least `threshold` members.

mod coordinator;
mod tally;
mod verifier;
mod vote;

pub use coordinator::{AgreementSession, Phase};
pub use tally::{RecordOutcome, ResultTally};
pub use verifier::VoteVerifier;
pub use vote::{pb, Vote};
