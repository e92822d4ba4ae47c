// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # hfc
//!
//! Entry point for the `hfc` binary. Parses CLI arguments, initializes
//! logging, and runs one subcommand:
//!
//! - `txid`     — derive a transaction id from a nonce and identity seed
//! - `identity` — generate a development signing identity
//! - `simulate` — run the whole transaction lifecycle on an in-memory network
//! - `version`  — print build version information

mod cli;
mod logging;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde_json::json;
use tokio::sync::oneshot;

use hfc_core::config::{ClientConfig, EndpointConfig, NetworkConfig};
use hfc_core::crypto::{Nonce, SigningKeypair};
use hfc_core::identity::{derive_transaction_id, SigningIdentity};
use hfc_core::transaction::{validate, ProposalBuilder, ProposalKind, SubmissionOutcome};
use hfc_core::transport::{MemoryKeyValueStore, MemoryOrderer, MemoryPeerNetwork, PeerRef};
use hfc_core::{Channel, Client};

use cli::{Commands, HfcCli};
use logging::LogFormat;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = HfcCli::parse();
    logging::init_logging("hfc=info,hfc_core=info", LogFormat::from_str_lossy(&cli.log_format));

    match cli.command {
        Commands::Txid(args) => print_txid(args),
        Commands::Identity(args) => print_identity(args),
        Commands::Simulate(args) => simulate(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

fn print_txid(args: cli::TxidArgs) -> Result<()> {
    let nonce = Nonce::from_hex(&args.nonce).context("nonce is not valid hex")?;
    let keypair = SigningKeypair::from_hex(&args.seed)
        .map_err(|e| anyhow::anyhow!("invalid seed: {e}"))?;
    let identity = SigningIdentity::from_keypair(args.name, args.msp_id, keypair);
    let tx_id = derive_transaction_id(&nonce, &identity)?;
    println!("{tx_id}");
    Ok(())
}

fn print_identity(args: cli::IdentityArgs) -> Result<()> {
    let keypair = SigningKeypair::generate();
    let seed = keypair.secret_key_hex();
    let identity = SigningIdentity::from_keypair(args.name, args.msp_id, keypair);
    let creator = identity.serialize();

    let out = json!({
        "name": identity.name(),
        "msp_id": creator.msp_id,
        "certificate": String::from_utf8_lossy(&creator.id_bytes),
        "creator_hex": hex::encode(creator.to_bytes()),
        "seed": seed,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// simulate
// ---------------------------------------------------------------------------

/// Network used when no configuration file is given.
fn default_network() -> NetworkConfig {
    NetworkConfig {
        channel: "mychannel".into(),
        orderer: Some(EndpointConfig::new("orderer0", "grpcs://localhost:7050")),
        peers: vec![
            EndpointConfig::new("peer1", "grpcs://localhost:7051"),
            EndpointConfig::new("peer2", "grpcs://localhost:8051"),
        ],
    }
}

async fn simulate(args: cli::SimulateArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => ClientConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => ClientConfig::default(),
    };
    if config.network.peers.is_empty() {
        config.network = default_network();
    }
    if config.network.orderer.is_none() {
        bail!("configuration has no orderer; nothing can be submitted");
    }
    let wait = Duration::from_millis(args.timeout_ms);
    let cc = args.chaincode.as_str();

    let peers = Arc::new(MemoryPeerNetwork::new());
    for peer in &config.network.peers {
        peers.add_peer(&PeerRef::from(peer), "Org1MSP");
    }
    let orderer = Arc::new(MemoryOrderer::new());
    orderer.add_organization("Org1MSP");

    let client = Client::new(config.clone(), peers.clone(), orderer.clone());
    client.set_event_transport(Arc::new(orderer.event_source()));
    client.set_state_store(Arc::new(MemoryKeyValueStore::new()));
    client
        .set_user_context(SigningIdentity::generate("admin", "Org1MSP"))
        .await?;
    let channel = client.channel_from_config()?;
    channel.initialize().await?;
    tracing::info!(channel = %channel.name(), peers = channel.peers().len(), chaincode = cc, "simulated network ready");

    // --- Deploy ---
    for kind in [ProposalKind::Install, ProposalKind::Instantiate] {
        let request = channel.build_request(
            ProposalBuilder::new(kind)
                .chaincode(cc)
                .version("v0")
                .path("github.com/example_cc")
                .function("init")
                .args(["a", "100", "b", "200"]),
        )?;
        let results = channel.send_proposal(&request).await?;
        if !validate(&results.responses) {
            bail!("{kind} of {cc}:v0 was not endorsed by every peer");
        }
        tracing::info!(chaincode = cc, version = "v0", "{kind} endorsed");
    }

    // --- Invoke ---
    let hub = client.new_event_hub();
    let event_peer = channel
        .peers()
        .first()
        .cloned()
        .context("channel has no peers")?;
    hub.connect(event_peer).await?;

    let request = channel.create_request(cc, Vec::new(), "move", ["a", "b", "100"])?;
    let tx_id = request.tx_id().clone();
    let results = channel.send_proposal(&request).await?;

    let (commit_tx, commit_rx) = oneshot::channel();
    hub.register_tx_event(tx_id.clone(), wait, move |res| {
        let _ = commit_tx.send(res);
    })?;
    let (event_tx, event_rx) = oneshot::channel();
    hub.register_chaincode_event(cc, "^move$", wait, move |res| {
        let _ = event_tx.send(res);
    })?;

    let outcome = channel.send_transaction(Some(results.into())).await?;
    if !outcome.is_accepted() {
        bail!("invoke was not accepted by the orderer: {outcome:?}");
    }
    let commit = commit_rx
        .await
        .context("commit listener dropped")?
        .context("commit event")?;
    let event = event_rx
        .await
        .context("chaincode event listener dropped")?
        .context("chaincode event")?;
    tracing::info!(tx_id = %tx_id, block = commit.block_number, code = %commit.validation_code, "invoke committed");

    // --- Failing upgrades ---
    let mut upgrades = Vec::new();
    for (id, version) in [(cc, "v0"), ("dummy", "v1"), (cc, "v333333999")] {
        let reason = failing_upgrade(&channel, id, version).await?;
        tracing::warn!(chaincode = id, version, reason = %reason, "upgrade rejected");
        upgrades.push(json!({ "chaincode": id, "version": version, "reason": reason }));
    }

    hub.disconnect();

    let report = json!({
        "channel": channel.name(),
        "chaincode": cc,
        "organizations": channel.organization_units(),
        "invoke": {
            "tx_id": tx_id.as_str(),
            "block": commit.block_number,
            "validation_code": commit.validation_code.as_str(),
            "event": event.event_name,
        },
        "rejected_upgrades": upgrades,
        "blocks": orderer.height(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Proposes an upgrade expected to fail and returns the rejection reason.
async fn failing_upgrade(channel: &Channel, chaincode: &str, version: &str) -> Result<String> {
    let request = channel.build_request(
        ProposalBuilder::new(ProposalKind::Upgrade)
            .chaincode(chaincode)
            .version(version)
            .function("init")
            .args(["a", "100", "b", "200"]),
    )?;
    let results = channel.send_upgrade_proposal(&request).await?;
    match channel.send_transaction(Some(results.into())).await? {
        SubmissionOutcome::Rejected { message, .. } => Ok(message),
        SubmissionOutcome::OrdererUnreachable { reason } => Ok(reason),
        SubmissionOutcome::Accepted { .. } => {
            bail!("upgrade of {chaincode} to {version} unexpectedly succeeded")
        }
    }
}

/// Prints version information to stdout.
fn print_version() {
    println!("hfc      {}", env!("CARGO_PKG_VERSION"));
    println!("rustc    {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}
