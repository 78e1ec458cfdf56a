use clap::Parser;
use anyhow::{Result, Context, bail};
use perfseal_api::{metrics::Metrics, AppState};
use perfseal_crypto::fhe::MockCoprocessor;
use perfseal_genesis::{create_genesis_state, GenesisConfig, DEFAULT_THRESHOLD};
use perfseal_storage::db::Storage;
use perfseal_types::{Address, SubmissionPolicy};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::RwLock;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(author, version, about = "PerfSeal encrypted driver performance node", long_about = None)]
struct Args {
    #[arg(short, long, default_value = "./data")]
    data_dir: String,
    #[arg(short, long, default_value = "127.0.0.1:3000")]
    listen: SocketAddr,
    /// Contract owner (hex ed25519 public key). Only read on first start.
    #[arg(long, env = "PERFSEAL_OWNER")]
    owner: Option<Address>,
    /// Minimum order count for a driver to meet the target. Only read on first start.
    #[arg(long, env = "CONTRACT_THRESHOLD", default_value_t = DEFAULT_THRESHOLD)]
    threshold: u32,
    /// Accept order counts for addresses that are not registered.
    #[arg(long)]
    open_submissions: bool,
    /// JSON genesis file; overrides --owner, --threshold and --open-submissions.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, default_value = "info")]
    log_level: Level,
    #[arg(long, default_value_t = 1024)]
    queue_capacity: usize,
}

impl Args {
    fn genesis_config(&self) -> Result<GenesisConfig> {
        if let Some(path) = &self.config {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read genesis config {}", path.display()))?;
            return serde_json::from_str(&raw).context("Invalid genesis config");
        }

        let Some(owner) = self.owner else {
            bail!("No existing state: pass --owner (or PERFSEAL_OWNER) or --config to create genesis");
        };
        let mut config = GenesisConfig::new(owner);
        config.target_threshold = self.threshold;
        if self.open_submissions {
            config.submission_policy = SubmissionPolicy::Open;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Setup Logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")?;

    info!("Starting PerfSeal node...");

    // 2. Init Storage
    let storage = Arc::new(Storage::new(&args.data_dir).context("Failed to initialize storage")?);
    info!("Storage initialized at {}", args.data_dir);

    // 3. Load or Create State
    let state = match storage.load_state().context("Failed to load state")? {
        Some(state) => {
            info!(
                "Loaded existing state: contract {}, {} drivers",
                state.contract_id,
                state.drivers.len()
            );
            if args.config.is_some() || args.owner.is_some() {
                warn!("Genesis options are ignored once state exists");
            }
            state
        }
        None => {
            info!("No state found, creating genesis...");
            let genesis = create_genesis_state(&args.genesis_config()?);
            storage.save_state(&genesis).context("Failed to save genesis state")?;
            genesis
        }
    };

    let coprocessor = match storage.load_coprocessor().context("Failed to load coprocessor")? {
        Some(coprocessor) => coprocessor,
        None => {
            let coprocessor = MockCoprocessor::generate();
            storage.save_coprocessor(&coprocessor).context("Failed to save coprocessor")?;
            coprocessor
        }
    };
    warn!("Using the mock FHE coprocessor: ciphertexts are NOT confidential");

    let shared_state = Arc::new(RwLock::new(state));
    let shared_coprocessor = Arc::new(RwLock::new(coprocessor));

    // 4. Init Sequencer
    let (sequencer, handle) = perfseal_sequencer::channel(
        shared_state.clone(),
        shared_coprocessor.clone(),
        storage.clone(),
        args.queue_capacity,
    )?;
    tokio::spawn(sequencer.run());

    // 5. Init API
    let api_state = AppState {
        contract: shared_state,
        coprocessor: shared_coprocessor,
        storage,
        sequencer: handle,
        metrics: Arc::new(Metrics::new()),
    };
    let api = tokio::spawn(perfseal_api::start_server(args.listen, api_state));

    info!("Node running. Press Ctrl+C to stop.");
    tokio::select! {
        res = signal::ctrl_c() => {
            res?;
            info!("Shutting down");
        }
        res = api => {
            res.context("API task panicked")??;
        }
    }

    Ok(())
}
