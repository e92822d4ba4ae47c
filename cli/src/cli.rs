//! # CLI Interface
//!
//! Defines the command-line argument structure for `hfc` using `clap`
//! derive. Supports four subcommands: `txid`, `identity`, `simulate`, and
//! `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Client toolkit for permissioned ledger networks.
///
/// Derives transaction ids, generates development identities, and drives
/// the full proposal / endorsement / ordering / event lifecycle against an
/// in-memory network.
#[derive(Parser, Debug)]
#[command(
    name = "hfc",
    about = "Permissioned-ledger client toolkit",
    version,
    propagate_version = true
)]
pub struct HfcCli {
    /// Log output format: `pretty` or `json`.
    #[arg(long, global = true, env = "HFC_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the `hfc` binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Derive the transaction id for a nonce and signing identity.
    Txid(TxidArgs),
    /// Generate a development signing identity.
    Identity(IdentityArgs),
    /// Run install, instantiate, invoke and upgrade against an in-memory
    /// network and report each step.
    Simulate(SimulateArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `txid` subcommand.
#[derive(Parser, Debug)]
pub struct TxidArgs {
    /// Hex-encoded nonce.
    #[arg(long)]
    pub nonce: String,

    /// MSP the identity belongs to.
    #[arg(long, default_value = "Org1MSP")]
    pub msp_id: String,

    /// Hex-encoded 32-byte Ed25519 seed of the identity.
    #[arg(long, env = "HFC_SEED")]
    pub seed: String,

    /// Enrollment name embedded in the certificate.
    #[arg(long, default_value = "admin")]
    pub name: String,
}

/// Arguments for the `identity` subcommand.
#[derive(Parser, Debug)]
pub struct IdentityArgs {
    /// Enrollment name embedded in the certificate.
    #[arg(long, default_value = "admin")]
    pub name: String,

    /// MSP the identity belongs to.
    #[arg(long, default_value = "Org1MSP")]
    pub msp_id: String,
}

/// Arguments for the `simulate` subcommand.
#[derive(Parser, Debug)]
pub struct SimulateArgs {
    /// Path to a JSON client configuration.
    ///
    /// When omitted, a two-peer network on channel `mychannel` is used.
    #[arg(long, short = 'c', env = "HFC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Chaincode id to deploy and exercise.
    #[arg(long, default_value = "end2end")]
    pub chaincode: String,

    /// How long to wait for commit and chaincode events, in milliseconds.
    #[arg(long, default_value_t = 3_000)]
    pub timeout_ms: u64,
}
