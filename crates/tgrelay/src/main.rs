use std::{process, sync::Arc};

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tgrelay_bridge::{BridgeClient, BridgeConfig};
use tgrelay_core::{
    app::App,
    config::Config,
    rpc::{GuardedRpc, RpcClient},
    store::MessageStore,
};
use tgrelay_sqlite::SqliteStore;

mod operator;

use operator::StdinOperator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tgrelay_core::logging::init("tgrelay")?;

    let cfg = Arc::new(Config::load()?);

    let bridge = BridgeClient::new(BridgeConfig::from_config(&cfg))?;
    let rpc: Arc<dyn RpcClient> = Arc::new(GuardedRpc::new(Arc::new(bridge), cfg.guard()));

    let sqlite = SqliteStore::connect(&cfg.database_url)
        .await
        .with_context(|| format!("opening message store {}", cfg.database_url))?;
    info!(records = sqlite.count_relayed().await?, "message store opened");
    let store: Arc<dyn MessageStore> = Arc::new(sqlite);

    let app = App::new(cfg, rpc, store.clone(), Arc::new(StdinOperator::new()));

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                shutdown.cancel();
            }
        }
    });

    let outcome = tokio::select! {
        _ = shutdown.cancelled() => None,
        res = app.run() => Some(res),
    };

    if let Err(e) = store.close().await {
        warn!(error = %e, "failed to close message store");
    }

    match outcome {
        None => {
            info!("interrupted, shutting down");
            println!("\nShutting down...");
            // A pending stdin read would keep the runtime from shutting down.
            process::exit(0);
        }
        Some(res) => res.context("relay stopped"),
    }
}
