use std::io;
use std::sync::Arc;

use clap::Parser;
use env_logger::Env;
use log::{info, warn};

use pow_ballot::api;
use pow_ballot::client::{LedgerClient, TrustedPartyClient};
use pow_ballot::config::{
    Cli, Command, MinerArgs, NodeConfig, Tp1Args, Tp2Args, TrustedPartyConfig, VoterArgs,
    VoterConfig,
};
use pow_ballot::jobs;
use pow_ballot::node::LedgerNode;
use pow_ballot::trusted::{BlindSigner, EncryptionService};
use pow_ballot::voter::{VoterProtocol, VoterSession};

fn to_io<E: std::fmt::Display>(err: E) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err.to_string())
}

async fn run_miner(args: MinerArgs) -> io::Result<()> {
    let config = NodeConfig::from(args);
    let peers = LedgerClient::new(config.peer_timeout).map_err(to_io)?;
    let node = Arc::new(LedgerNode::new(&config, Arc::new(peers)).map_err(to_io)?);
    info!(
        "miner on {}:{} with difficulty {} and {} seeded peers",
        config.host,
        config.port,
        config.difficulty,
        node.peers().await.len()
    );

    if let Some(period) = config.auto_mine {
        jobs::spawn_auto_miner(node.clone(), period);
    }

    let on_signal = node.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.shutdown();
        }
    });

    api::serve_ledger(node, &config.host, config.port).await
}

async fn run_tp1(args: Tp1Args) -> io::Result<()> {
    let config = TrustedPartyConfig::from(args);
    let service = EncryptionService::generate(config.key_bits).map_err(to_io)?;
    api::serve_encryption(service, &config.host, config.port).await
}

async fn run_tp2(args: Tp2Args) -> io::Result<()> {
    let config = TrustedPartyConfig::from(args);
    let signer = BlindSigner::generate(config.key_bits, config.signer_id).map_err(to_io)?;
    api::serve_signing(signer, &config.host, config.port).await
}

async fn run_voter(args: VoterArgs) -> io::Result<()> {
    let config = VoterConfig::from(&args);
    let tp1 = TrustedPartyClient::new(&config.tp1, config.request_timeout).map_err(to_io)?;
    let tp2 = TrustedPartyClient::new(&config.tp2, config.request_timeout).map_err(to_io)?;
    let ledgers = LedgerClient::new(config.request_timeout).map_err(to_io)?;

    let protocol = VoterProtocol::new(config, Arc::new(tp1), Arc::new(tp2), Arc::new(ledgers));
    let mut session = VoterSession::new(args.voter_id(), args.candidate.clone());
    match protocol.cast(&mut session).await {
        Ok(_) => Ok(()),
        Err(e) => {
            warn!("{} ended in {:?}", session.voter_id(), session.state());
            Err(to_io(e))
        }
    }
}

#[tokio::main]
async fn main() -> io::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    match Cli::parse().command {
        Command::Miner(args) => run_miner(args).await,
        Command::Tp1(args) => run_tp1(args).await,
        Command::Tp2(args) => run_tp2(args).await,
        Command::Voter(args) => run_voter(args).await,
    }
}
