//! # DKG Result Core
//!
//! Off-chain agreement on the result of a Distributed Key Generation run.
//!
//! Before a group submits its DKG result on-chain, every member broadcasts a
//! signed vote for the hash of the result it computed. This crate provides:
//! - Vote encoding, verification against the group membership, and tallying
//! - An agreement session deciding on the hash backed by a threshold of members
//! - A single-fulfillment [`Promise`] used to report asynchronous outcomes
//!
//! ## Example
//!
//! ```rust,ignore
//! use dkg_result_core::{AgreementConfig, AgreementSession};
//!
//! let session = AgreementSession::new(config, signer, verifier, gossip)?;
//! let promise = session.start(&dkg_result).await?;
//!
//! promise.on_success(|hash| println!("agreed on {hash}"));
//! ```

pub mod error;
pub mod gossip;
pub mod membership;
pub mod promise;
pub mod result;
pub mod signing;
pub mod types;

pub use error::{Error, Result};
pub use promise::Promise;
pub use result::{AgreementSession, Phase, RecordOutcome, ResultTally, Vote, VoteVerifier};
pub use types::{
    honest_majority, keccak256, session_id_for_channel, AgreementConfig, DkgResult, MemberIndex,
    ResultHash, SessionId,
};

/// Protocol version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
