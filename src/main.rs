//! Switchyard server.
//!
//! ```text
//!  config file ──▶ Instance::load ──▶ Context ──▶ apps (http, ...)
//!        ▲                │
//!  --watch / POST /load   └──▶ generation ──▶ ListenerSet ──▶ Server ──▶ RouteList
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use switchyard::admin::{self, AdminState};
use switchyard::config::{load_config, Config, ConfigWatcher};
use switchyard::lifecycle::{Instance, Shutdown};
use switchyard::modules::standard_registry;
use switchyard::net::ListenerSet;
use switchyard::observability::logging::LogHandle;

#[derive(Parser)]
#[command(name = "switchyard", version)]
#[command(about = "Config-driven server core", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a config and serve until interrupted
    Run {
        /// JSON or TOML config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Reload when the config file changes
        #[arg(short, long)]
        watch: bool,
    },
    /// Provision a config without starting it
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Print registered module ids
    ListModules,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let registry = standard_registry()?.seal();

    match cli.command {
        Commands::ListModules => {
            for id in registry.ids() {
                println!("{}", id);
            }
            Ok(())
        }
        Commands::Validate { config } => {
            init_tracing(None);
            let doc = load_config(&config)?;
            Instance::new(registry).validate(doc)?;
            println!("Valid configuration");
            Ok(())
        }
        Commands::Run { config, watch } => {
            let handle = LogHandle::new();
            init_tracing(Some(&handle));
            run(Instance::new(registry).with_log_handle(handle), config, watch).await
        }
    }
}

fn init_tracing(handle: Option<&LogHandle>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "switchyard=info,tower_http=info".into());
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(filter))
        .with(handle.map(LogHandle::layer))
        .init();
}

async fn run(instance: Instance, path: Option<PathBuf>, watch: bool) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "switchyard starting");

    let doc = match &path {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };
    let admin_config = doc.admin.clone();
    let instance = Arc::new(instance);
    let shutdown = Shutdown::new();
    let mut tasks = vec![tokio::spawn(instance.clone().follow_loaders(shutdown.signal()))];
    instance.load(doc)?;

    let listeners = Arc::new(ListenerSet::new(instance.clone()));
    tasks.push(tokio::spawn(listeners.clone().run(shutdown.signal())));

    if !admin_config.disabled {
        let mut addresses = vec![admin_config.listen.clone()];
        if let Some(remote) = admin_config.remote.as_ref().filter(|r| !r.listen.is_empty()) {
            addresses.push(remote.listen.clone());
        }
        for address in addresses {
            let listener = TcpListener::bind(&address).await?;
            let state = AdminState::new(instance.clone());
            let stop = shutdown.signal();
            tasks.push(tokio::spawn(async move {
                if let Err(e) = admin::serve(listener, state, stop).await {
                    tracing::error!(error = %e, "Admin endpoint failed");
                }
            }));
        }
    }

    if let (true, Some(path)) = (watch, path) {
        let reloader = instance.clone();
        let signal = shutdown.signal();
        tasks.push(tokio::spawn(async move {
            let watcher = ConfigWatcher::new(&path);
            if let Err(e) = watcher.run(move |doc| reloader.load(doc), signal).await {
                tracing::error!(error = %e, "Config watcher failed");
            }
        }));
    }

    shutdown.trigger_on_signal().await;
    tracing::info!("Shutting down");
    for task in tasks {
        let _ = task.await;
    }

    let instance_for_stop = instance.clone();
    tokio::task::spawn_blocking(move || instance_for_stop.stop()).await?;
    tracing::info!("Shutdown complete");
    Ok(())
}
