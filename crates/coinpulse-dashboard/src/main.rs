/*
[INPUT]:  CLI arguments, YAML configuration file, OS shutdown signals
[OUTPUT]: Running headless dashboard logging live updates, graceful shutdown
[POS]:    Binary entry point
[UPDATE]: When changing CLI flags, startup flow, or shutdown handling
*/

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use coinpulse_adapter::{ConnectionState, PriceUpdate, Trade};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use coinpulse_dashboard::{Dashboard, DashboardConfig, Widget, WidgetKind};

#[derive(Parser, Debug)]
#[command(name = "coinpulse-dashboard", version, about = "Headless Mobula token dashboard")]
struct Cli {
    #[arg(long = "config", value_name = "PATH")]
    config_path: Option<PathBuf>,
    #[arg(long = "layout", value_name = "PATH")]
    layout_path: Option<PathBuf>,
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    log_level: String,
    #[arg(long = "dry-run")]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(&args.log_level)?;

    info!(
        config_path = ?args.config_path,
        dry_run = args.dry_run,
        "starting coinpulse-dashboard"
    );

    let config = load_config(args.config_path.as_deref())?;
    let layout_path = match args.layout_path {
        Some(path) => path,
        None => config.layout_path().context("resolve layout path")?,
    };
    info!(
        seed_widgets = config.widgets.len(),
        blockchain = %config.feed.blockchain,
        layout_path = %layout_path.display(),
        "configuration loaded"
    );

    if args.dry_run {
        config.api_key()?;
        info!("dry-run requested; configuration validated");
        return Ok(());
    }

    let (dashboard, websocket) = Dashboard::mobula(&config, layout_path)?;
    let dashboard = Arc::new(dashboard);

    let shutdown = CancellationToken::new();
    setup_signal_handlers(shutdown.clone());
    spawn_connection_logger(websocket.subscribe_connection_state(), shutdown.clone());
    dashboard.stream().on_error(|err| warn!(error = %err, "stream error"));

    let widgets = dashboard
        .restore_layout(&config.widgets)
        .await
        .context("restore layout")?;
    info!(widgets, "layout ready");

    if let Err(err) = dashboard.start().await {
        dashboard.shutdown().await;
        return Err(err.context("start dashboard"));
    }
    for widget in dashboard.widgets().await {
        spawn_widget_logger(&dashboard, &widget, shutdown.clone());
    }

    shutdown.cancelled().await;
    info!("shutdown signal received");

    dashboard.shutdown().await;
    info!("dashboard shutdown complete");

    Ok(())
}

fn init_tracing(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(log_level).context("invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| anyhow!(err))
        .context("initialize tracing subscriber")?;
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<DashboardConfig> {
    match path {
        Some(path) => DashboardConfig::from_file(path).context("load config"),
        None => {
            info!("no config file given; using defaults");
            Ok(DashboardConfig::default())
        }
    }
}

fn spawn_connection_logger(mut states: watch::Receiver<ConnectionState>, shutdown: CancellationToken) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                changed = states.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = *states.borrow_and_update();
                    match state {
                        ConnectionState::Connected => info!("stream connected"),
                        ConnectionState::Connecting => info!("stream connecting"),
                        ConnectionState::Reconnecting { attempt } => {
                            warn!(attempt, "stream disconnected; reconnecting")
                        }
                        ConnectionState::Disconnected => warn!("stream disconnected"),
                    }
                }
            }
        }
    });
}

fn spawn_widget_logger(dashboard: &Dashboard, widget: &Widget, shutdown: CancellationToken) {
    match widget.kind {
        WidgetKind::LivePrice => {
            let updates = dashboard.prices().watch(&widget.contract_address);
            tokio::spawn(log_prices(updates, shutdown));
        }
        WidgetKind::TradeFeed => {
            let updates = dashboard.trades().watch(&widget.contract_address);
            tokio::spawn(log_trades(updates, shutdown));
        }
    }
}

async fn log_prices(mut updates: watch::Receiver<Option<PriceUpdate>>, shutdown: CancellationToken) {
    loop {
        let current = updates.borrow_and_update().clone();
        if let Some(update) = current {
            info!(
                address = %update.contract_address,
                symbol = %update.metadata.symbol,
                price_usd = %update.price_usd,
                price_sol = %update.price_sol,
                variation_24h = %update.variation_24h,
                "price"
            );
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}

async fn log_trades(mut updates: watch::Receiver<Vec<Trade>>, shutdown: CancellationToken) {
    let mut newest: Option<String> = None;
    loop {
        let trades = updates.borrow_and_update().clone();
        match newest.as_deref() {
            None if !trades.is_empty() => {
                info!(
                    address = %trades[0].contract_address,
                    trades = trades.len(),
                    "trade history loaded"
                );
            }
            _ => {
                for trade in trades
                    .iter()
                    .take_while(|trade| Some(trade.transaction_hash.as_str()) != newest.as_deref())
                {
                    info!(
                        address = %trade.contract_address,
                        symbol = %trade.metadata.symbol,
                        side = %trade.side,
                        amount = %trade.amount,
                        wallet = %trade.wallet_address,
                        hash = %trade.transaction_hash,
                        "trade"
                    );
                }
            }
        }
        if let Some(first) = trades.first() {
            newest = Some(first.transaction_hash.clone());
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}

fn setup_signal_handlers(shutdown: CancellationToken) {
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to install SIGINT handler");
            return;
        }
        info!("received SIGINT");
        shutdown_clone.cancel();
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let shutdown_clone = shutdown.clone();
        tokio::spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                    info!("received SIGTERM");
                    shutdown_clone.cancel();
                }
                Err(err) => {
                    warn!(error = %err, "failed to install SIGTERM handler");
                }
            }
        });
    }
}
