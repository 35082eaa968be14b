//! DKG Party CLI
//!
//! Command-line interface for a DKG group member:
//! - Operator key generation
//! - Result hashing
//! - Off-chain result agreement over the vote relay

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use dkg_result_core::gossip::Gossip;
use dkg_result_core::membership::GroupSnapshot;
use dkg_result_core::signing::{Secp256k1Signer, Secp256k1Verifier, Signer};
use dkg_result_core::{
    session_id_for_channel, AgreementConfig, AgreementSession, DkgResult, MemberIndex,
    ResultHash, VoteVerifier,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use vote_relay_client::RelayClient;

/// DKG Party - result agreement member node
#[derive(Parser)]
#[command(name = "dkg-party")]
#[command(about = "DKG result agreement member node")]
#[command(version)]
struct Cli {
    /// Relay service URL
    #[arg(short, long, env = "RELAY_URL", default_value = "http://127.0.0.1:8080")]
    relay: String,

    /// Member index (1-based)
    #[arg(short, long, env = "MEMBER_INDEX")]
    member_index: MemberIndex,

    /// Data directory for operator keys and agreed results
    #[arg(short, long, env = "DEST", default_value = "./data")]
    dest: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate an operator key for signing votes
    Keygen,

    /// Print the hash of a DKG result
    Hash {
        /// DKG result file (JSON)
        #[arg(short, long)]
        result: PathBuf,
    },

    /// Agree on a DKG result with the rest of the group
    Agree {
        /// DKG result file (JSON)
        #[arg(short, long)]
        result: PathBuf,

        /// Group membership file (JSON array of members)
        #[arg(short, long)]
        group: PathBuf,

        /// Broadcast channel name of the group
        #[arg(short, long)]
        channel: String,

        /// Supporters required (defaults to an honest majority)
        #[arg(short, long)]
        threshold: Option<usize>,

        /// Vote collection window in seconds
        #[arg(short, long, default_value = "60")]
        window_secs: u64,

        /// Relay request timeout in seconds
        #[arg(long, default_value = "30")]
        request_timeout_secs: u64,
    },

    /// Show operator key info
    Info,
}

/// Agreed result with the signatures backing it
#[derive(Debug, Serialize, Deserialize)]
struct SignedResult {
    /// Session identifier (hex)
    session_id: String,
    /// Agreed result hash
    result_hash: ResultHash,
    /// Vote signature (hex) of every supporting member
    signatures: BTreeMap<MemberIndex, String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    std::fs::create_dir_all(&cli.dest)?;

    match cli.command {
        Commands::Keygen => run_keygen(&cli)?,
        Commands::Hash { ref result } => {
            println!("Result Hash: {}", load_result(result)?.hash());
        }
        Commands::Agree {
            ref result,
            ref group,
            ref channel,
            threshold,
            window_secs,
            request_timeout_secs,
        } => {
            run_agree(
                &cli,
                result,
                group,
                channel,
                threshold,
                Duration::from_secs(window_secs),
                Duration::from_secs(request_timeout_secs),
            )
            .await?;
        }
        Commands::Info => show_info(&cli)?,
    }

    Ok(())
}

fn run_keygen(cli: &Cli) -> Result<()> {
    let signer = Secp256k1Signer::random();

    let key_path = key_path(&cli.dest, cli.member_index);
    std::fs::write(&key_path, hex::encode(signer.to_bytes()))?;

    info!(
        member_index = cli.member_index,
        public_key = hex::encode(signer.public_key()),
        path = ?key_path,
        "Operator key generated"
    );

    println!("Public Key: {}", hex::encode(signer.public_key()));

    Ok(())
}

async fn run_agree(
    cli: &Cli,
    result_path: &Path,
    group_path: &Path,
    channel: &str,
    threshold: Option<usize>,
    window: Duration,
    request_timeout: Duration,
) -> Result<()> {
    let signer = load_signer(&cli.dest, cli.member_index)?;
    let result = load_result(result_path)?;

    let group_json = std::fs::read_to_string(group_path)
        .with_context(|| format!("reading group file {}", group_path.display()))?;
    let group = GroupSnapshot::from_json(&group_json)?;

    let session_id = session_id_for_channel(channel);
    let mut config = AgreementConfig::new(session_id, group.members().count(), cli.member_index)?
        .with_collection_window(window);
    if let Some(threshold) = threshold {
        config = config.with_threshold(threshold)?;
    }

    info!(
        member_index = cli.member_index,
        channel = channel,
        threshold = config.threshold,
        "Starting result agreement"
    );

    let relay =
        Arc::new(RelayClient::new(&cli.relay, cli.member_index).with_timeout(request_timeout));
    let signed = agree(config, Arc::new(signer), group, relay, &result).await?;

    let path = cli
        .dest
        .join(format!("result.{}.json", hex::encode(&session_id[..8])));
    let json = serde_json::to_string_pretty(&signed)?;
    std::fs::write(&path, &json)?;

    info!(
        result_hash = %signed.result_hash,
        supporters = signed.signatures.len(),
        path = ?path,
        "Result agreed and saved"
    );

    println!("{}", json);

    Ok(())
}

/// Run one agreement session to completion
async fn agree(
    config: AgreementConfig,
    signer: Arc<dyn Signer>,
    group: GroupSnapshot,
    gossip: Arc<dyn Gossip>,
    result: &DkgResult,
) -> Result<SignedResult> {
    let session_id = config.session_id;
    let verifier = VoteVerifier::new(Arc::new(group), Arc::new(Secp256k1Verifier));
    let session = AgreementSession::new(config, signer, verifier, gossip)?;

    let promise = session.start(result).await?;
    let outcome = promise.wait().await;

    let result_hash = match outcome {
        Ok(hash) => hash,
        Err(e) => {
            session.close()?;
            return Err(anyhow!("result agreement failed: {}", e));
        }
    };

    session.begin_submission()?;
    let signatures = session
        .supporting_signatures(&result_hash)
        .into_iter()
        .map(|(member, signature)| (member, hex::encode(signature)))
        .collect();
    session.close()?;

    Ok(SignedResult {
        session_id: hex::encode(session_id),
        result_hash,
        signatures,
    })
}

fn show_info(cli: &Cli) -> Result<()> {
    let signer = load_signer(&cli.dest, cli.member_index)?;

    println!("Operator Key Info:");
    println!("  Member Index: {}", cli.member_index);
    println!("  Public Key: {}", hex::encode(signer.public_key()));

    Ok(())
}

fn key_path(dest: &Path, member_index: MemberIndex) -> PathBuf {
    dest.join(format!("operator.{}.key", member_index))
}

fn load_signer(dest: &Path, member_index: MemberIndex) -> Result<Secp256k1Signer> {
    let path = key_path(dest, member_index);
    let encoded = std::fs::read_to_string(&path)
        .with_context(|| format!("reading operator key {}", path.display()))?;
    let bytes = hex::decode(encoded.trim())?;
    Ok(Secp256k1Signer::from_bytes(&bytes)?)
}

fn load_result(path: &Path) -> Result<DkgResult> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading DKG result {}", path.display()))?;
    Ok(serde_json::from_str(&json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dkg_result_core::gossip::MemoryGossip;

    fn group(signers: &[Arc<Secp256k1Signer>]) -> GroupSnapshot {
        GroupSnapshot::from_public_keys(signers.iter().map(|s| s.public_key()))
    }

    #[tokio::test]
    async fn test_group_agrees_over_shared_gossip() {
        let signers: Vec<Arc<Secp256k1Signer>> =
            (0..3).map(|_| Arc::new(Secp256k1Signer::random())).collect();
        let gossip = Arc::new(MemoryGossip::new());
        let result = DkgResult::new(vec![2; 33], vec![]);
        let session_id = session_id_for_channel("party-test");

        let mut runs = Vec::new();
        for (i, signer) in signers.iter().enumerate() {
            let config = AgreementConfig::new(session_id, 3, i as MemberIndex + 1)
                .unwrap()
                .with_collection_window(Duration::from_secs(5));
            let snapshot = group(&signers);
            let signer: Arc<dyn Signer> = signer.clone();
            let gossip: Arc<dyn Gossip> = gossip.clone();
            let result = result.clone();
            runs.push(tokio::spawn(async move {
                agree(config, signer, snapshot, gossip, &result).await
            }));
        }

        for run in runs {
            let signed = run.await.unwrap().unwrap();
            assert_eq!(signed.result_hash, result.hash());
            assert!(signed.signatures.len() >= 2);
            assert_eq!(signed.session_id, hex::encode(session_id));
        }
    }

    #[tokio::test]
    async fn test_agreement_without_quorum_fails() {
        let signers: Vec<Arc<Secp256k1Signer>> =
            (0..3).map(|_| Arc::new(Secp256k1Signer::random())).collect();
        let config = AgreementConfig::new(session_id_for_channel("alone"), 3, 1)
            .unwrap()
            .with_collection_window(Duration::from_millis(50));
        let signer: Arc<dyn Signer> = signers[0].clone();

        let err = agree(
            config,
            signer,
            group(&signers),
            Arc::new(MemoryGossip::new()),
            &DkgResult::new(vec![2; 33], vec![]),
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("No quorum"));
    }

    #[test]
    fn test_agree_arguments() {
        let cli = Cli::try_parse_from([
            "dkg-party",
            "--member-index",
            "2",
            "agree",
            "--result",
            "result.json",
            "--group",
            "group.json",
            "--channel",
            "group-7",
            "--request-timeout-secs",
            "5",
        ])
        .unwrap();

        assert_eq!(cli.member_index, 2);
        match cli.command {
            Commands::Agree {
                channel,
                threshold,
                window_secs,
                request_timeout_secs,
                ..
            } => {
                assert_eq!(channel, "group-7");
                assert_eq!(threshold, None);
                assert_eq!(window_secs, 60);
                assert_eq!(request_timeout_secs, 5);
            }
            _ => panic!("expected agree"),
        }
    }

    #[test]
    fn test_operator_key_round_trip() {
        let dest = std::env::temp_dir().join(format!("dkg-party-{}", std::process::id()));
        std::fs::create_dir_all(&dest).unwrap();

        let signer = Secp256k1Signer::random();
        std::fs::write(key_path(&dest, 4), hex::encode(signer.to_bytes())).unwrap();

        let loaded = load_signer(&dest, 4).unwrap();
        assert_eq!(loaded.public_key(), signer.public_key());
        assert!(load_signer(&dest, 5).is_err());

        std::fs::remove_dir_all(&dest).unwrap();
    }
}
