use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::ledger::DEFAULT_DIFFICULTY;

pub const DEFAULT_HOST: &str = "127.0.0.1";

pub const DEFAULT_MINERS: [&str; 3] = ["127.0.0.1:6001", "127.0.0.1:6002", "127.0.0.1:6003"];

/// Settings of one ledger node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Interface the HTTP server binds to.
    pub host: String,
    pub port: u16,
    pub difficulty: usize,
    pub peers: Vec<String>,
    pub peer_timeout: Duration,
    /// Period of the background mine-then-resolve job, if any.
    pub auto_mine: Option<Duration>,
    pub reject_duplicates: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            host: DEFAULT_HOST.to_string(),
            port: 6001,
            difficulty: DEFAULT_DIFFICULTY,
            peers: Vec::new(),
            peer_timeout: Duration::from_secs(5),
            auto_mine: None,
            reject_duplicates: false,
        }
    }
}

/// Settings shared by the encryption and blind-signing services.
#[derive(Debug, Clone)]
pub struct TrustedPartyConfig {
    pub host: String,
    pub port: u16,
    pub key_bits: usize,
    pub signer_id: String,
}

impl Default for TrustedPartyConfig {
    fn default() -> Self {
        TrustedPartyConfig {
            host: DEFAULT_HOST.to_string(),
            port: 5001,
            key_bits: 2048,
            signer_id: "33".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VoterConfig {
    pub tp1: String,
    pub tp2: String,
    pub miners: Vec<String>,
    pub quorum: usize,
    pub poll_interval: Duration,
    pub confirmation_timeout: Duration,
    pub request_timeout: Duration,
    pub client_blinding: bool,
}

impl Default for VoterConfig {
    fn default() -> Self {
        VoterConfig {
            tp1: "127.0.0.1:5001".to_string(),
            tp2: "127.0.0.1:5002".to_string(),
            miners: DEFAULT_MINERS.iter().map(|m| m.to_string()).collect(),
            quorum: 2,
            poll_interval: Duration::from_secs(5),
            confirmation_timeout: Duration::from_secs(120),
            request_timeout: Duration::from_secs(5),
            client_blinding: false,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "pow_ballot", version, about = "Proof-of-work e-voting ledger")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a ledger (miner) node
    Miner(MinerArgs),
    /// Run the encryption service
    Tp1(Tp1Args),
    /// Run the blind-signing service
    Tp2(Tp2Args),
    /// Cast a single vote
    Voter(VoterArgs),
}

#[derive(Debug, Args)]
pub struct MinerArgs {
    /// Use 0.0.0.0 to accept peers on other hosts.
    #[arg(long, env = "BIND_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    #[arg(long, env = "SERVER_PORT", default_value_t = 6001)]
    pub port: u16,

    #[arg(long, env = "POW_DIFFICULTY", default_value_t = DEFAULT_DIFFICULTY)]
    pub difficulty: usize,

    /// Peer ledger, as `host:port` or URL. Repeatable.
    #[arg(long = "peer", env = "POW_PEERS", value_delimiter = ',')]
    pub peers: Vec<String>,

    #[arg(long, default_value_t = 5000)]
    pub peer_timeout_ms: u64,

    /// Mine and resolve in the background every N seconds.
    #[arg(long)]
    pub auto_mine_secs: Option<u64>,

    /// Refuse votes whose signed_hash was already admitted.
    #[arg(long)]
    pub reject_duplicates: bool,
}

impl From<MinerArgs> for NodeConfig {
    fn from(args: MinerArgs) -> Self {
        NodeConfig {
            host: args.host,
            port: args.port,
            difficulty: args.difficulty,
            peers: args.peers,
            peer_timeout: Duration::from_millis(args.peer_timeout_ms),
            auto_mine: args.auto_mine_secs.filter(|s| *s > 0).map(Duration::from_secs),
            reject_duplicates: args.reject_duplicates,
        }
    }
}

#[derive(Debug, Args)]
pub struct Tp1Args {
    #[arg(long, env = "BIND_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    #[arg(long, env = "TP1_PORT", default_value_t = 5001)]
    pub port: u16,

    #[arg(long, default_value_t = 2048)]
    pub key_bits: usize,
}

impl From<Tp1Args> for TrustedPartyConfig {
    fn from(args: Tp1Args) -> Self {
        TrustedPartyConfig {
            host: args.host,
            port: args.port,
            key_bits: args.key_bits,
            ..TrustedPartyConfig::default()
        }
    }
}

#[derive(Debug, Args)]
pub struct Tp2Args {
    #[arg(long, env = "BIND_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    #[arg(long, env = "TP2_PORT", default_value_t = 5002)]
    pub port: u16,

    #[arg(long, default_value_t = 2048)]
    pub key_bits: usize,

    #[arg(long, env = "TP2_SIGNER_ID", default_value = "33")]
    pub signer_id: String,
}

impl From<Tp2Args> for TrustedPartyConfig {
    fn from(args: Tp2Args) -> Self {
        TrustedPartyConfig {
            host: args.host,
            port: args.port,
            key_bits: args.key_bits,
            signer_id: args.signer_id,
        }
    }
}

#[derive(Debug, Args)]
pub struct VoterArgs {
    /// Voter number; the ballot carries `Voter<N>`.
    #[arg(long)]
    pub voter: u32,

    #[arg(long)]
    pub candidate: String,

    #[arg(long, env = "TP1_ADDR", default_value = "127.0.0.1:5001")]
    pub tp1: String,

    #[arg(long, env = "TP2_ADDR", default_value = "127.0.0.1:5002")]
    pub tp2: String,

    #[arg(long = "miner", env = "POW_MINERS", value_delimiter = ',')]
    pub miners: Vec<String>,

    #[arg(long, default_value_t = 2)]
    pub quorum: usize,

    #[arg(long, default_value_t = 5)]
    pub poll_secs: u64,

    #[arg(long, default_value_t = 120)]
    pub timeout_secs: u64,

    /// Blind the digest locally instead of letting the signer do it.
    #[arg(long)]
    pub client_blinding: bool,
}

impl VoterArgs {
    pub fn voter_id(&self) -> String {
        format!("Voter{}", self.voter)
    }
}

impl From<&VoterArgs> for VoterConfig {
    fn from(args: &VoterArgs) -> Self {
        let defaults = VoterConfig::default();
        VoterConfig {
            tp1: args.tp1.clone(),
            tp2: args.tp2.clone(),
            miners: if args.miners.is_empty() {
                defaults.miners
            } else {
                args.miners.clone()
            },
            quorum: args.quorum,
            poll_interval: Duration::from_secs(args.poll_secs),
            confirmation_timeout: Duration::from_secs(args.timeout_secs),
            client_blinding: args.client_blinding,
            ..defaults
        }
    }
}
