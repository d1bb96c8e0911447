//! Running configuration and reloads.
//!
//! # Reload
//! ```text
//! load(config)                           (serialized by the reload mutex)
//!     → root Context
//!     → storage → logging pipelines → apps (document order)
//!     → start apps in order; on failure stop started ones in reverse
//!     → swap active snapshot, bump generation
//!     → retire previous snapshot (stop apps, tear down its Context)
//!     → admin.config.load, if set: run the loader now, or after
//!       load_delay and then on every interval until the config is retired
//! ```
//!
//! # Design Decisions
//! - All-or-nothing: any failure tears down the new Context and leaves the
//!   previous snapshot serving
//! - Requests hold an `Arc<Running>` and never wait on provisioning
//! - Retirement runs on the blocking pool when a runtime is present
//! - A loaded document equal to the running one is skipped, which ends
//!   self-referential load chains

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use crate::admin::auth::AdminAccessControl;
use crate::config::Config;
use crate::context::{Context, Teardown};
use crate::error::{Error, Result};
use crate::http::{HttpApp, Server};
use crate::lifecycle::ShutdownSignal;
use crate::modules::{App, ConfigLoader, Registry};
use crate::observability::logging::{provision_pipelines, LogHandle, LogPipeline};
use crate::observability::metrics;
use crate::storage::{MemoryStorage, Storage};

/// Storage key of the last successfully loaded document.
pub const AUTOSAVE_KEY: &str = "autosave.json";

/// A provisioned, started configuration.
pub struct Running {
    generation: u64,
    config: Config,
    context: Context,
    teardown: Teardown,
    storage: Arc<dyn Storage>,
    pipelines: Vec<Arc<LogPipeline>>,
    apps: Vec<(String, Arc<dyn App>)>,
    access: Arc<AdminAccessControl>,
    loader: Option<Arc<dyn ConfigLoader>>,
}

struct Provisioned {
    storage: Arc<dyn Storage>,
    pipelines: Vec<Arc<LogPipeline>>,
    apps: Vec<(String, Arc<dyn App>)>,
    loader: Option<Arc<dyn ConfigLoader>>,
}

impl Running {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn access(&self) -> Arc<AdminAccessControl> {
        self.access.clone()
    }

    pub fn app(&self, name: &str) -> Option<&Arc<dyn App>> {
        self.apps.iter().find(|(n, _)| n == name).map(|(_, app)| app)
    }

    pub fn app_names(&self) -> impl Iterator<Item = &str> {
        self.apps.iter().map(|(name, _)| name.as_str())
    }

    pub fn http_app(&self) -> Option<&HttpApp> {
        self.app(HttpApp::ID)?.as_any().downcast_ref::<HttpApp>()
    }

    /// The HTTP server bound to `addr` in this snapshot.
    pub fn http_server_for(&self, addr: &std::net::SocketAddr) -> Option<Arc<Server>> {
        self.http_app()?.server_for(addr)
    }

    fn start_apps(&self) -> Result<()> {
        for (i, (name, app)) in self.apps.iter().enumerate() {
            if let Err(source) = app.start() {
                tracing::error!(app = %name, error = %source, "App failed to start");
                for (started, app) in self.apps[..i].iter().rev() {
                    if let Err(e) = app.stop() {
                        tracing::warn!(app = %started, error = %e, "Stopping app after failed start");
                    }
                }
                return Err(Error::AppStart {
                    app: name.clone(),
                    source,
                });
            }
            tracing::debug!(app = %name, "App started");
        }
        Ok(())
    }

    fn stop_apps(&self) {
        for (name, app) in self.apps.iter().rev() {
            if let Err(e) = app.stop() {
                tracing::warn!(app = %name, error = %e, "App failed to stop");
            }
        }
    }

    /// Stop apps in reverse order, then tear down the Context.
    fn shutdown(&self) {
        self.stop_apps();
        finish_teardown(&self.teardown, self.generation);
    }
}

fn finish_teardown(teardown: &Teardown, generation: u64) {
    let failures = teardown.run();
    metrics::record_cleanup_failures(failures.len());
    for failure in &failures {
        tracing::warn!(generation, error = %failure, "Cleanup failed");
    }
}

/// Owner of the active configuration.
pub struct Instance {
    registry: Arc<Registry>,
    active: ArcSwapOption<Running>,
    reload: Mutex<u64>,
    generation_tx: watch::Sender<u64>,
    log_handle: Option<LogHandle>,
    loaded_tx: mpsc::UnboundedSender<Vec<u8>>,
    loaded_rx: Mutex<Option<mpsc::UnboundedReceiver<Vec<u8>>>>,
}

impl Instance {
    pub fn new(registry: Arc<Registry>) -> Self {
        let (generation_tx, _) = watch::channel(0);
        let (loaded_tx, loaded_rx) = mpsc::unbounded_channel();
        Self {
            registry,
            active: ArcSwapOption::empty(),
            reload: Mutex::new(0),
            generation_tx,
            log_handle: None,
            loaded_tx,
            loaded_rx: Mutex::new(Some(loaded_rx)),
        }
    }

    /// Route provisioned log pipelines into `handle` on each reload.
    pub fn with_log_handle(mut self, handle: LogHandle) -> Self {
        self.log_handle = Some(handle);
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn current(&self) -> Option<Arc<Running>> {
        self.active.load_full()
    }

    /// Fires with the new generation after every successful load or stop.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.generation_tx.subscribe()
    }

    /// Provision and start `config`, then make it the active snapshot.
    pub fn load(&self, config: Config) -> Result<()> {
        let mut generation = self.reload.lock();
        let next = *generation + 1;

        let running = match self.provision(config, next) {
            Ok(running) => running,
            Err(e) => {
                metrics::record_reload("failure");
                tracing::error!(generation = next, error = %e, "Config rejected");
                return Err(e);
            }
        };

        if let Err(e) = running.start_apps() {
            finish_teardown(&running.teardown, next);
            metrics::record_reload("failure");
            return Err(e);
        }

        if let Some(handle) = &self.log_handle {
            handle.replace(running.pipelines.clone());
        }
        if running.config.admin.persist() {
            persist(&running);
        }

        let follow_up = running.loader.clone().map(|loader| {
            let delay = running
                .config
                .admin
                .config
                .as_ref()
                .map(|c| c.load_delay)
                .unwrap_or_default();
            (loader, running.context.clone(), delay)
        });

        *generation = next;
        let previous = self.active.swap(Some(Arc::new(running)));
        self.generation_tx.send_replace(next);
        metrics::record_reload("success");
        tracing::info!(generation = next, "Config loaded");
        drop(generation);

        if let Some(previous) = previous {
            retire(previous);
        }
        if let Some((loader, ctx, delay)) = follow_up {
            self.run_loader(loader, ctx, delay);
        }
        Ok(())
    }

    /// Load a document produced by a config loader, unless it matches the
    /// running config. Returns whether a load happened.
    pub fn apply_loaded(&self, bytes: &[u8]) -> Result<bool> {
        let config: Config = serde_json::from_slice(bytes).map_err(|e| Error::Parse {
            path: "admin.config.load".to_string(),
            reason: e.to_string(),
        })?;
        if let Some(current) = self.current() {
            if serde_json::to_value(&config).ok() == serde_json::to_value(current.config()).ok() {
                tracing::debug!(generation = current.generation, "Loaded config unchanged");
                return Ok(false);
            }
        }
        self.load(config)?;
        Ok(true)
    }

    /// Apply documents from delayed config loaders until `shutdown` fires.
    pub async fn follow_loaders(self: Arc<Self>, mut shutdown: ShutdownSignal) {
        let Some(mut loaded) = self.loaded_rx.lock().take() else {
            tracing::warn!("Config loader output already followed");
            return;
        };
        loop {
            tokio::select! {
                doc = loaded.recv() => {
                    let Some(doc) = doc else { break };
                    let instance = self.clone();
                    match tokio::task::spawn_blocking(move || instance.apply_loaded(&doc)).await {
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => tracing::error!(error = %e, "Loaded config rejected; keeping current configuration"),
                        Err(e) => tracing::error!(error = %e, "Loaded config task failed"),
                    }
                }
                _ = shutdown.recv() => break,
            }
        }
    }

    fn run_loader(&self, loader: Arc<dyn ConfigLoader>, ctx: Context, delay: Duration) {
        if delay.is_zero() {
            let result = loader
                .load_config(&ctx)
                .map_err(|e| e.to_string())
                .and_then(|doc| self.apply_loaded(&doc).map_err(|e| e.to_string()));
            if let Err(e) = result {
                tracing::error!(error = %e, "Config load failed; keeping current configuration");
            }
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(?delay, "No runtime for delayed config load");
            return;
        };
        let tx = self.loaded_tx.clone();
        handle.spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = ctx.cancelled() => return,
                }
                let (loader, loader_ctx) = (loader.clone(), ctx.clone());
                match tokio::task::spawn_blocking(move || loader.load_config(&loader_ctx)).await {
                    Ok(Ok(doc)) => {
                        if tx.send(doc).is_err() {
                            return;
                        }
                    }
                    Ok(Err(e)) => tracing::error!(error = %e, "Config loader failed"),
                    Err(e) => tracing::error!(error = %e, "Config loader task failed"),
                }
            }
        });
    }

    /// Parse a JSON document and [`Instance::load`] it.
    pub fn load_raw(&self, bytes: &[u8]) -> Result<()> {
        let config: Config = serde_json::from_slice(bytes).map_err(|e| Error::Parse {
            path: "<document>".to_string(),
            reason: e.to_string(),
        })?;
        self.load(config)
    }

    /// Provision `config` without starting it, then tear it down.
    pub fn validate(&self, config: Config) -> Result<()> {
        let running = self.provision(config, 0)?;
        finish_teardown(&running.teardown, 0);
        Ok(())
    }

    /// Stop the active config, if any, and wait for its teardown.
    pub fn stop(&self) {
        let mut generation = self.reload.lock();
        if let Some(running) = self.active.swap(None) {
            running.shutdown();
            *generation += 1;
            self.generation_tx.send_replace(*generation);
            tracing::info!(generation = running.generation, "Config stopped");
        }
    }

    fn provision(&self, config: Config, generation: u64) -> Result<Running> {
        let (context, teardown) = Context::root(self.registry.clone());

        match self.provision_in(&context, &config) {
            Ok(provisioned) => Ok(Running {
                generation,
                access: Arc::new(AdminAccessControl::from_config(&config.admin)),
                config,
                context,
                teardown,
                storage: provisioned.storage,
                pipelines: provisioned.pipelines,
                apps: provisioned.apps,
                loader: provisioned.loader,
            }),
            Err(e) => {
                finish_teardown(&teardown, generation);
                Err(e)
            }
        }
    }

    fn provision_in(&self, ctx: &Context, config: &Config) -> Result<Provisioned> {
        let storage: Arc<dyn Storage> = match &config.storage {
            Some(raw) => ctx.load_storage(raw, "storage")?,
            None => Arc::new(MemoryStorage::default()),
        };
        ctx.set_storage(storage.clone());

        let pipelines = provision_pipelines(&config.logging, ctx)?;

        let mut apps = Vec::with_capacity(config.apps.len());
        for (name, raw) in &config.apps {
            let app = ctx.load_app(name, raw, &format!("apps.{}", name))?;
            apps.push((name.clone(), app));
        }

        let loader = match config.admin.config.as_ref().and_then(|c| c.load.as_ref()) {
            Some(raw) => Some(ctx.load_config_loader(raw, "admin.config.load")?),
            None => None,
        };
        Ok(Provisioned {
            storage,
            pipelines,
            apps,
            loader,
        })
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        if let Some(running) = self.active.swap(None) {
            running.shutdown();
        }
    }
}

fn persist(running: &Running) {
    match serde_json::to_vec(&running.config) {
        Ok(doc) => {
            if let Err(e) = running.storage.store(AUTOSAVE_KEY, doc) {
                tracing::warn!(error = %e, "Failed to persist config");
            }
        }
        Err(e) => tracing::warn!(error = %e, "Failed to encode config for persistence"),
    }
}

/// Stop and tear down a replaced snapshot without blocking the caller.
fn retire(previous: Arc<Running>) {
    let work = move || previous.shutdown();
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn_blocking(work);
        }
        Err(_) => work(),
    }
}
