use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use log::{info, warn};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::{path::PathBuf, sync::Arc};
use tokio_stream::{wrappers::WatchStream, StreamExt};

use eth_exposure::{
    config::{AppConfig, RuntimeConfig},
    decimals::EthPrice,
    explorer::ExplorerClient,
    exposure::ExposureView,
    query::QueryClient,
    render::{render_snapshot, render_watchlist},
    utils::{setup_logger, short_address},
    watchlist::{FileStore, Watchlist},
};

#[derive(Parser)]
#[command(name = "eth-exposure")]
#[command(about = "Track the USD value held by a watchlist of Ethereum addresses")]
struct Args {
    /// Explorer API key, overrides ETHERSCAN_API_KEY
    #[arg(long)]
    api_key: Option<String>,
    /// Directory holding the persisted watchlist
    #[arg(long, env = "DATA_DIR")]
    data_dir: Option<PathBuf>,
    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<String>,
    /// Serve Prometheus metrics on this port while watching
    #[arg(long, env = "METRICS_PORT")]
    metrics_port: Option<u16>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the watched addresses
    List,
    /// Start monitoring an address
    Add { address: String },
    /// Stop monitoring an address
    Remove { address: String },
    /// Fetch balances and the ETH price and render the exposure table
    Watch {
        /// Render once after every request settled, then exit
        #[arg(long)]
        once: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let mut runtime_config = RuntimeConfig::from_env();
    if let Some(level) = args.log_level {
        runtime_config.log_level = level;
    }
    if let Some(dir) = args.data_dir {
        runtime_config.data_dir = dir;
    }
    runtime_config.metrics_port = args.metrics_port;
    setup_logger(&runtime_config.log_level)?;

    let mut config = AppConfig::from_env()?;
    if let Some(key) = args.api_key {
        config.api_key = Some(key);
    }
    config.validate_all()?;

    let storage = Arc::new(FileStore::new(&runtime_config.data_dir));
    let watchlist = Arc::new(Watchlist::load(storage));

    match args.command {
        Commands::List => {
            print!("{}", render_watchlist(&watchlist.snapshot(), Utc::now()));
        }
        Commands::Add { address } => {
            let address = address.trim();
            let added = watchlist
                .add_address(address)
                .with_context(|| format!("cannot add {address}"))?;
            println!("Added {}", short_address(added.as_str()));
        }
        Commands::Remove { address } => {
            let address = address.trim();
            if !watchlist.contains(address) {
                warn!("{} is not being monitored", address);
            }
            watchlist.remove_address(address);
            println!("{} addresses monitored", watchlist.len());
        }
        Commands::Watch { once } => {
            watch(config, runtime_config, watchlist, once).await?;
        }
    }

    Ok(())
}

async fn watch(
    config: AppConfig,
    runtime_config: RuntimeConfig,
    watchlist: Arc<Watchlist>,
    once: bool,
) -> Result<()> {
    if let Some(port) = runtime_config.metrics_port {
        PrometheusBuilder::new()
            .with_http_listener(([127, 0, 0, 1], port))
            .install()
            .context("installing prometheus exporter")?;
        info!("Serving metrics on 127.0.0.1:{}", port);
    }

    let explorer = Arc::new(ExplorerClient::from_config(&config)?);
    let balances = QueryClient::<String>::from_config(&config);
    let prices = QueryClient::<EthPrice>::from_config(&config);
    let _gc = (
        balances.spawn_gc(config.gc_interval()),
        prices.spawn_gc(config.gc_interval()),
    );

    let mut view = ExposureView::new(watchlist.clone(), explorer, balances, prices);
    if once {
        view.settled().await;
        print!("{}", render_snapshot(&view.snapshot(), Utc::now()));
        return Ok(());
    }

    view.spawn_price_refresh(config.refresh_interval);
    let mut changes = WatchStream::new(watchlist.subscribe());
    let mut render = tokio::time::interval(runtime_config.render_interval);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        "Watching {} addresses, refreshing the price every {:?}",
        view.address_count(),
        config.refresh_interval
    );
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutting down");
                break;
            }
            Some(_) = changes.next() => view.sync(),
            _ = render.tick() => {
                print!("\x1B[2J\x1B[H{}", render_snapshot(&view.snapshot(), Utc::now()));
            }
        }
    }

    Ok(())
}
