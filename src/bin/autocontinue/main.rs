mod dom;
mod face;
mod hands;
mod runloop;

use anyhow::{Context, Result};
use autocontinue::{ConfigStore, JsonFileStore, Supervisor};
use clap::Parser;
use dotenvy::dotenv;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Keeps a chat tab's "continue" button pressed and re-sends stalled messages.
#[derive(Parser, Debug)]
#[command(name = "autocontinue", version, about)]
struct Args {
    /// Chat page to supervise.
    #[arg(long, env = "AUTOCONTINUE_URL", default_value = "https://kindroid.ai/home")]
    url: String,

    /// DevTools port of an already running Chrome to attach to.
    #[arg(long, env = "AUTOCONTINUE_DEBUG_PORT", default_value_t = 9222)]
    debug_port: u16,

    /// Chrome executable used when launching.
    #[arg(long, env = "CHROME_PATH")]
    chrome: Option<PathBuf>,

    /// Profile directory used when launching.
    #[arg(long, env = "AUTOCONTINUE_PROFILE")]
    profile: Option<PathBuf>,

    /// Configuration file.
    #[arg(long, env = "AUTOCONTINUE_CONFIG")]
    config: Option<PathBuf>,

    /// First port tried for the status panel.
    #[arg(long, env = "AUTOCONTINUE_PORT", default_value_t = 3000)]
    port: u16,

    /// Set max auto-clicks before starting (0 = continuous mode).
    #[arg(long)]
    max_actions: Option<u32>,

    #[arg(long, env = "AUTOCONTINUE_LOG", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("autocontinue v{}", env!("CARGO_PKG_VERSION"));

    let (cmd_rx, status_tx) = face::start_server(args.port).await?;

    let settings = hands::LaunchSettings {
        chat_url: args.url.clone(),
        debug_port: args.debug_port,
        chrome_path: args.chrome.clone(),
        profile_dir: args.profile.clone(),
    };
    let session = tokio::task::spawn_blocking(move || hands::BrowserSession::launch(&settings))
        .await
        .context("browser launch panicked")??;

    let config_path = args.config.clone().unwrap_or_else(JsonFileStore::default_path);
    info!(path = %config_path.display(), "config store");
    let store: Box<dyn ConfigStore> = Box::new(JsonFileStore::new(config_path));

    let page = dom::ChromePage::new(session.tab.clone());
    let sink = runloop::PanelSink::new(status_tx, session.tab.clone());
    let mut sup = Supervisor::new(store, page, sink);
    if let Some(value) = args.max_actions {
        sup.set_max_actions(value, 0);
    }

    // A plain thread, so Ctrl-C does not wait on the loop during runtime shutdown.
    let (done_tx, done_rx) = tokio::sync::oneshot::channel::<()>();
    std::thread::Builder::new()
        .name("supervisor".into())
        .spawn(move || {
            // the browser connection must outlive the loop
            let _session = session;
            runloop::run(sup, cmd_rx);
            let _ = done_tx.send(());
        })
        .context("spawning supervisor thread")?;

    tokio::select! {
        finished = done_rx => finished.context("supervisor loop panicked")?,
        _ = tokio::signal::ctrl_c() => info!("interrupted, exiting"),
    }

    Ok(())
}
