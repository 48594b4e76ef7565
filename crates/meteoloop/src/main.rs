//! Meteoloop
//!
//! Live weather readings for a fixed set of cities.
//!
//! # Subcommands
//!
//! - `run`: everything in one process (acquisition, history, relay, HTTP)
//! - `publish`: acquisition and history, broadcasting over Zenoh
//! - `serve`: viewer-facing HTTP/WebSocket server fed from Zenoh
//! - `watch`: terminal viewer for a running server

use argh::FromArgs;
use meteoloop::aggregator::Series;
use meteoloop::reading::units;
use meteoloop::{
    open_session, run_acquisition, run_http_server, Acquirer, AppState, BroadcastChannel,
    BroadcastRelay, ChannelPublisher, Config, HistoryQueryable, LocalChannel, MemoryHistory,
    ViewerClient, ZenohChannel, ZenohHistoryClient,
};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(FromArgs)]
/// Meteoloop - live weather sensor distribution
struct Args {
    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Command {
    Run(RunArgs),
    Publish(PublishArgs),
    Serve(ServeArgs),
    Watch(WatchArgs),
}

#[derive(FromArgs)]
/// Run acquisition, history and the viewer server in one process
#[argh(subcommand, name = "run")]
struct RunArgs {
    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    config: Option<String>,

    /// HTTP port (overrides config and PORT)
    #[argh(option, short = 'p')]
    port: Option<u16>,
}

#[derive(FromArgs)]
/// Acquire readings and broadcast them over Zenoh
#[argh(subcommand, name = "publish")]
struct PublishArgs {
    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    config: Option<String>,

    /// zenoh router endpoint (overrides config and ZENOH_ENDPOINT)
    #[argh(option, short = 'z')]
    zenoh_endpoint: Option<String>,
}

#[derive(FromArgs)]
/// Serve viewers from readings broadcast over Zenoh
#[argh(subcommand, name = "serve")]
struct ServeArgs {
    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    config: Option<String>,

    /// zenoh router endpoint (overrides config and ZENOH_ENDPOINT)
    #[argh(option, short = 'z')]
    zenoh_endpoint: Option<String>,

    /// HTTP port (overrides config and PORT)
    #[argh(option, short = 'p')]
    port: Option<u16>,
}

#[derive(FromArgs)]
/// Follow a running server from the terminal
#[argh(subcommand, name = "watch")]
struct WatchArgs {
    /// server base URL (default: http://127.0.0.1:3000)
    #[argh(option, short = 'u', default = "String::from(\"http://127.0.0.1:3000\")")]
    url: String,

    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    config: Option<String>,

    /// points kept per sensor (overrides config)
    #[argh(option, short = 'w')]
    window: Option<usize>,
}

fn load_config(
    path: Option<&str>,
    port: Option<u16>,
    zenoh_endpoint: Option<String>,
) -> anyhow::Result<Config> {
    let mut config = match path {
        Some(path) => {
            log::info!("Loading configuration from {}", path);
            Config::from_file(path)?
        }
        None => Config::default(),
    }
    .apply_env();

    if let Some(port) = port {
        config.http_port = port;
    }
    if let Some(endpoint) = zenoh_endpoint {
        config.zenoh_endpoint = endpoint;
    }
    config.validate()?;

    log::info!(
        "Configuration: {} sensors, every {}s, history {} per sensor",
        config.sensors.len(),
        config.interval_secs,
        config.history_capacity
    );
    Ok(config)
}

fn spawn_http(state: AppState, port: u16) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = run_http_server(state, port).await {
            log::error!("HTTP server error: {}", e);
        }
    })
}

async fn run(args: RunArgs, shutdown_rx: watch::Receiver<()>) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref(), args.port, None)?;
    let registry = config.registry()?;

    let history = Arc::new(MemoryHistory::new(&registry, config.history_capacity));
    let channel = Arc::new(LocalChannel::default());
    let relay = Arc::new(BroadcastRelay::new());

    // Relay subscribes before the first tick
    let subscription = channel.subscribe().await?;
    let relay_task = tokio::spawn(relay.clone().run(subscription, shutdown_rx.clone()));

    let http_task = spawn_http(
        AppState {
            registry: registry.clone(),
            history: history.clone(),
            relay,
            session_buffer: config.session_buffer,
            shutdown: shutdown_rx.clone(),
        },
        config.http_port,
    );

    let acquirer = Acquirer::from_config(&config, registry)?;
    let publisher = ChannelPublisher::new(history, channel);

    log::info!("Meteoloop running. Press Ctrl+C to exit.");
    log::info!("  Viewers: http://0.0.0.0:{}/ws", config.http_port);

    run_acquisition(&acquirer, &publisher, config.interval(), shutdown_rx).await;

    let _ = relay_task.await;
    let _ = http_task.await;
    Ok(())
}

async fn publish(args: PublishArgs, shutdown_rx: watch::Receiver<()>) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref(), None, args.zenoh_endpoint)?;
    let registry = config.registry()?;

    let session = open_session(&config).await?;

    let history = Arc::new(MemoryHistory::new(&registry, config.history_capacity));
    let channel = Arc::new(ZenohChannel::new(session.clone(), config.channel_key.clone()));

    let queryable = HistoryQueryable::new(session.clone(), history.clone());
    let queryable_shutdown = shutdown_rx.clone();
    let queryable_task = tokio::spawn(async move {
        if let Err(e) = queryable.run(queryable_shutdown).await {
            log::error!("History queryable error: {}", e);
        }
    });

    let acquirer = Acquirer::from_config(&config, registry)?;
    let publisher = ChannelPublisher::new(history, channel);

    log::info!("Meteoloop publisher running. Press Ctrl+C to exit.");
    log::info!("  Broadcast key: {}", config.channel_key);
    log::info!(
        "  History queryable: {}",
        meteoloop::history_api::keys::READINGS_WILDCARD
    );

    run_acquisition(&acquirer, &publisher, config.interval(), shutdown_rx).await;

    let _ = queryable_task.await;
    Ok(())
}

async fn serve(args: ServeArgs, shutdown_rx: watch::Receiver<()>) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref(), args.port, args.zenoh_endpoint)?;
    let registry = config.registry()?;

    let session = open_session(&config).await?;

    let channel = ZenohChannel::new(session.clone(), config.channel_key.clone());
    let relay = Arc::new(BroadcastRelay::new());
    let subscription = channel.subscribe().await?;
    let relay_task = tokio::spawn(relay.clone().run(subscription, shutdown_rx.clone()));

    let history = Arc::new(ZenohHistoryClient::new(session, config.fetch_timeout()));

    log::info!("Meteoloop server running. Press Ctrl+C to exit.");
    log::info!("  Subscribed to: {}", config.channel_key);

    let http_task = spawn_http(
        AppState {
            registry,
            history,
            relay,
            session_buffer: config.session_buffer,
            shutdown: shutdown_rx,
        },
        config.http_port,
    );

    let _ = http_task.await;
    let _ = relay_task.await;
    Ok(())
}

fn print_series(series: &Series) {
    match series.latest() {
        Some(point) => println!(
            "{:<10} {:<12} {:>3} pts  {:>6.1}{}  {:>5.1}{}  {:>7.1}{}  {:>5.1}{}",
            series.sensor_id,
            series.city,
            series.points.len(),
            point.temperature,
            units::TEMPERATURE,
            point.humidity,
            units::HUMIDITY,
            point.pressure,
            units::PRESSURE,
            point.wind_speed,
            units::WIND_SPEED,
        ),
        None => println!("{:<10} {:<12}   0 pts", series.sensor_id, series.city),
    }
}

async fn watch_viewer(args: WatchArgs, shutdown_rx: watch::Receiver<()>) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref(), None, None)?;
    let window = args.window.unwrap_or(config.window_capacity);

    let client = ViewerClient::new(args.url)?;
    log::info!("Watching {} (window {})", client.base_url(), window);
    client.watch(window, print_series, shutdown_rx).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let env = env_logger::Env::default().default_filter_or("info");
    env_logger::init_from_env(env);

    let args: Args = argh::from_env();

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(());

    // Set up Ctrl+C handler
    ctrlc::set_handler({
        let shutdown_tx = shutdown_tx.clone();
        move || {
            log::info!("Received Ctrl+C, shutting down gracefully...");
            shutdown_tx.send(()).ok();
        }
    })?;

    match args.command {
        Command::Run(args) => run(args, shutdown_rx).await?,
        Command::Publish(args) => publish(args, shutdown_rx).await?,
        Command::Serve(args) => serve(args, shutdown_rx).await?,
        Command::Watch(args) => watch_viewer(args, shutdown_rx).await?,
    }

    log::info!("Meteoloop stopped.");
    Ok(())
}
