use activity_feed::broadcast::{BroadcastConfig, Broadcaster};
use activity_feed::config::{parse_origins, FeedConfig, DEFAULT_PORT};
use activity_feed::gateway::{self, ApiKey, AppState};
use activity_feed::store::{ActivityStore, FileStore, MemoryStore};
use activity_feed::Feed;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "activity-feed", about = "Activity feed with live event streaming")]
struct Cli {
    /// HTTP port
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Store directory
    #[arg(long, env = "ACTIVITY_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// Keep activities in memory only
    #[arg(long, env = "ACTIVITY_IN_MEMORY")]
    in_memory: bool,

    /// Key required to submit activities (generated when unset)
    #[arg(long, env = "ACTIVITY_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Comma separated origins allowed to submit without a key
    #[arg(long, env = "ALLOWED_ORIGINS", default_value = "")]
    allowed_origins: String,

    /// Seconds between keep-alive comments
    #[arg(long, env = "ACTIVITY_HEARTBEAT_SECS", default_value_t = 30)]
    heartbeat_secs: u64,

    /// Activities replayed to a reconnecting listener
    #[arg(long, env = "ACTIVITY_CATCHUP_BATCH", default_value_t = 50)]
    catchup_batch: usize,
}

impl Cli {
    fn into_config(self) -> FeedConfig {
        FeedConfig {
            data_dir: self.data_dir,
            in_memory: self.in_memory,
            bind: SocketAddr::from(([0, 0, 0, 0], self.port)),
            api_key: self.api_key.filter(|key| !key.is_empty()),
            allowed_origins: parse_origins(&self.allowed_origins),
            broadcast: BroadcastConfig {
                heartbeat_interval: Duration::from_secs(self.heartbeat_secs.max(1)),
                ..Default::default()
            },
            catchup_batch: self.catchup_batch,
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,activity_feed=debug".into()),
        )
        .init();

    let config = Cli::parse().into_config();

    if let Err(e) = run(config).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(config: FeedConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store: Arc<dyn ActivityStore> = if config.in_memory {
        tracing::warn!("using in-memory store; activities will not survive a restart");
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(FileStore::open_or_create(config.store())?)
    };

    let api_key = match config.api_key.clone() {
        Some(key) => key,
        None => {
            let key = ApiKey::generate();
            tracing::info!(api_key = %key, "generated API key; set ACTIVITY_API_KEY to keep it");
            key
        }
    };

    let broadcaster = Arc::new(Broadcaster::new(config.broadcast.clone()));
    let feed = Arc::new(Feed::new(
        store,
        Arc::clone(&broadcaster),
        config.catchup_batch,
    ));
    let state = AppState {
        feed,
        auth: Arc::new(ApiKey::new(&api_key, config.allowed_origins.clone())),
    };

    let shutdown = CancellationToken::new();
    let heartbeat = broadcaster.spawn_heartbeat(shutdown.clone());

    tokio::spawn(gateway::watch_shutdown(
        tokio::signal::ctrl_c(),
        shutdown.clone(),
        Arc::clone(&broadcaster),
    ));

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    gateway::serve(listener, state, shutdown.clone()).await?;

    shutdown.cancel();
    let _ = heartbeat.await;

    let stats = broadcaster.stats();
    tracing::info!(
        published = stats.published,
        heartbeats = stats.heartbeats,
        evicted = stats.evicted,
        "stopped"
    );
    Ok(())
}
