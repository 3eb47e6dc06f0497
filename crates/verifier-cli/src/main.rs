//! Optimism Verifier CLI
//!
//! Command-line interface for running a verifier node and inspecting its
//! attestation log.

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use verifier_core::{
    Address, CoreError, Ed25519Verifier, LocalSigner, OptimismSignature, SignatureId,
    SignatureVerifier, VerifyingKey, H256,
};
use verifier_node::{keys, open_log, BatchVerdict, LogFormat, NodeConfig, VerifierNode};
use verifier_storage::{SequentialFinder, SignatureLog};

const DEFAULT_CONFIG: &str = "verifier.toml";

#[derive(Parser)]
#[command(name = "verifier")]
#[command(version)]
#[command(about = "Optimism verifier - signature log and peer-to-peer replication", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true, env = "VERIFIER_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory, overrides the configuration file
    #[arg(short, long, global = true, env = "VERIFIER_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log filter, e.g. "info" or "verifier_sync=debug"
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a verifier node
    Start {
        /// Listen multiaddr, repeatable
        #[arg(long = "listen")]
        listens: Vec<String>,

        /// Bootnode multiaddr, repeatable
        #[arg(long = "bootnode")]
        bootnodes: Vec<String>,

        /// Tip announcement period in milliseconds; 0 disables it
        #[arg(long)]
        publish_interval_ms: Option<u64>,
    },

    /// Generate the node's attestation key
    Keygen {
        /// Replace an existing key
        #[arg(long)]
        force: bool,
    },

    /// Sign a batch verdict and append it to the local chain
    Attest {
        /// State commitment chain contract
        #[arg(long)]
        scc: Address,

        #[arg(long)]
        batch_index: u64,

        /// Batch state root (hex)
        #[arg(long)]
        batch_root: H256,

        #[arg(long, default_value_t = 0)]
        batch_size: u64,

        #[arg(long, default_value_t = 0)]
        prev_total_elements: u64,

        /// Record a rejection instead of an approval
        #[arg(long)]
        reject: bool,
    },

    /// Show chain tips, or one signer's newest records
    Latest {
        #[arg(long)]
        signer: Option<Address>,

        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Replay the log in causal order
    Replay {
        /// Start after this record id
        #[arg(long)]
        from: Option<SignatureId>,

        /// Stop after this many frontiers
        #[arg(long)]
        max_frontiers: Option<usize>,
    },

    /// Print the effective configuration
    Config,
}

/// One record as printed on stdout
#[derive(Serialize)]
struct RecordView {
    id: String,
    previous_id: Option<String>,
    signer: String,
    scc: String,
    batch_index: u64,
    batch_root: String,
    approved: bool,
    signature: String,
}

impl From<&OptimismSignature> for RecordView {
    fn from(record: &OptimismSignature) -> Self {
        Self {
            id: record.id.to_string(),
            previous_id: record.previous_id.map(|id| id.to_string()),
            signer: record.signer.to_string(),
            scc: record.scc.to_string(),
            batch_index: record.batch_index,
            batch_root: record.batch_root.to_string(),
            approved: record.approved,
            signature: hex::encode(&record.signature),
        }
    }
}

fn print_record(record: &OptimismSignature) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(&RecordView::from(record))?);
    Ok(())
}

/// Keys of configured stakeholders plus this node's own signer
fn known_keys(config: &NodeConfig) -> anyhow::Result<HashMap<Address, VerifyingKey>> {
    let mut keys: HashMap<Address, VerifyingKey> = config
        .signers
        .stakeholders()?
        .into_iter()
        .map(|s| (s.address, s.public_key))
        .collect();
    let own = keys::keys_dir(&config.data_dir()).join("signer.key");
    if own.exists() {
        let signer = LocalSigner::from_bytes(&keys::read_secret(&own)?);
        keys.insert(signer.address(), signer.verifying_key());
    }
    Ok(keys)
}

#[derive(Debug, Default)]
struct ReplayReport {
    records: usize,
    broken_links: usize,
    bad_signatures: usize,
    unverified: usize,
}

/// Print the log in causal order, checking links and signatures on the way
fn replay(
    log: &SignatureLog,
    from: Option<SignatureId>,
    max_frontiers: Option<usize>,
    verifier: &dyn SignatureVerifier,
) -> anyhow::Result<ReplayReport> {
    let mut report = ReplayReport::default();
    let mut heads: HashMap<Address, SignatureId> = HashMap::new();

    let frontiers = SequentialFinder::new(log, from).take(max_frontiers.unwrap_or(usize::MAX));
    for level in frontiers {
        for record in &level {
            report.records += 1;
            // a signer's first record is only checked when replaying from the start
            let expected = heads.get(&record.signer).copied();
            if (expected.is_some() || from.is_none()) && record.previous_id != expected {
                tracing::warn!("Record {} does not link to {:?}", record.id, expected);
                report.broken_links += 1;
            }
            heads.insert(record.signer, record.id);

            match verifier.verify(record) {
                Ok(()) => {}
                Err(CoreError::UnknownSigner(_)) => report.unverified += 1,
                Err(e) => {
                    tracing::warn!("Record {}: {}", record.id, e);
                    report.bad_signatures += 1;
                }
            }
            print_record(record)?;
        }
    }
    Ok(report)
}

fn init_logging(level: &str, format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<NodeConfig> {
    let mut config = match &cli.config {
        Some(path) => NodeConfig::load(path)?,
        None if Path::new(DEFAULT_CONFIG).exists() => NodeConfig::load(DEFAULT_CONFIG)?,
        None => NodeConfig::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config.node.data_dir = dir.to_string_lossy().into_owned();
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    } else if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    if cli.json {
        config.logging.format = LogFormat::Json;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(&cli)?;
    init_logging(&config.logging.level, config.logging.format);

    match cli.command {
        Commands::Start {
            listens,
            bootnodes,
            publish_interval_ms,
        } => {
            if !listens.is_empty() {
                config.p2p.listens = listens;
            }
            config.p2p.bootnodes.extend(bootnodes);
            if let Some(ms) = publish_interval_ms {
                config.sync.publish_interval_ms = ms;
            }

            let mut node = VerifierNode::new(config)?;
            node.run().await?;
        }

        Commands::Keygen { force } => {
            let path = keys::keys_dir(&config.data_dir()).join("signer.key");
            if path.exists() && !force {
                anyhow::bail!("key already exists at {:?}; pass --force to replace it", path);
            }
            let signer = LocalSigner::generate();
            keys::write_secret(&path, &signer.to_bytes())?;
            println!("Address:    {}", signer.address());
            println!("Public key: {}", hex::encode(signer.verifying_key().as_bytes()));
            println!("Saved to:   {}", path.display());
        }

        Commands::Attest {
            scc,
            batch_index,
            batch_root,
            batch_size,
            prev_total_elements,
            reject,
        } => {
            let node = VerifierNode::new(config)?;
            let record = node.attestor().attest(BatchVerdict {
                scc,
                batch_index,
                batch_root,
                batch_size,
                prev_total_elements,
                extra_data: Vec::new(),
                approved: !reject,
            })?;
            print_record(&record)?;
        }

        Commands::Latest { signer, limit } => {
            let log = open_log(&config)?;
            let records = match signer {
                Some(signer) => log.latest_by_signer(&signer, limit, 0),
                None => log.latest_per_signer(),
            };
            for record in &records {
                print_record(record)?;
            }
        }

        Commands::Replay {
            from,
            max_frontiers,
        } => {
            let log = open_log(&config)?;
            let verifier = Ed25519Verifier::new(config.node.chain_id, known_keys(&config)?);
            let report = replay(&log, from, max_frontiers, &verifier)?;
            eprintln!(
                "{} records, {} broken links, {} bad signatures, {} unverified",
                report.records, report.broken_links, report.bad_signatures, report.unverified
            );
            if report.broken_links > 0 || report.bad_signatures > 0 {
                anyhow::bail!("log failed verification");
            }
        }

        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}
