//! Config file following for hot reload.
//!
//! The parent directory is watched so editors that replace the file on save
//! are still seen. Bursts of events settle for `debounce` before the file is
//! read, and a document equal to the last applied one is skipped.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::Config;
use crate::lifecycle::ShutdownSignal;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);

pub struct ConfigWatcher {
    path: PathBuf,
    debounce: Duration,
}

impl ConfigWatcher {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            debounce: DEFAULT_DEBOUNCE,
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Follow the file until `shutdown`, handing each changed document to `apply`.
    ///
    /// `apply` runs on the blocking pool. A document that fails to parse or
    /// apply is logged and the running config is left alone; the next save
    /// is tried again.
    pub async fn run<F>(self, apply: F, mut shutdown: ShutdownSignal) -> Result<(), notify::Error>
    where
        F: Fn(Config) -> crate::error::Result<()> + Send + Sync + 'static,
    {
        let (tx, mut events) = mpsc::unbounded_channel();
        let name = self.path.file_name().map(OsString::from);
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if touches(&event, name.as_deref()) => {
                    let _ = tx.send(());
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Watch error"),
            },
            NotifyConfig::default(),
        )?;
        watcher.watch(watch_root(&self.path), RecursiveMode::NonRecursive)?;
        tracing::info!(path = %self.path.display(), "Config watcher started");

        let apply = Arc::new(apply);
        let mut last = load_config(&self.path).ok().and_then(|c| snapshot(&c));

        loop {
            tokio::select! {
                event = events.recv() => {
                    if event.is_none() {
                        break;
                    }
                }
                _ = shutdown.recv() => break,
            }
            self.settle(&mut events).await;

            let config = match load_config(&self.path) {
                Ok(config) => config,
                Err(e) => {
                    tracing::error!(error = %e, "Changed config unreadable; keeping current configuration");
                    continue;
                }
            };
            let doc = snapshot(&config);
            if doc.is_some() && doc == last {
                tracing::debug!(path = %self.path.display(), "Config file unchanged");
                continue;
            }

            let apply = apply.clone();
            match tokio::task::spawn_blocking(move || (*apply)(config)).await {
                Ok(Ok(())) => {
                    last = doc;
                    tracing::info!(path = %self.path.display(), "Config reloaded from file");
                }
                Ok(Err(e)) => tracing::error!(error = %e, "Config reload failed; keeping previous config"),
                Err(e) => tracing::error!(error = %e, "Config reload task failed"),
            }
        }

        drop(watcher);
        tracing::info!(path = %self.path.display(), "Config watcher stopped");
        Ok(())
    }

    /// Wait until no event has arrived for `debounce`.
    async fn settle(&self, events: &mut mpsc::UnboundedReceiver<()>) {
        while let Ok(Some(())) = tokio::time::timeout(self.debounce, events.recv()).await {}
    }
}

fn watch_root(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn touches(event: &Event, name: Option<&std::ffi::OsStr>) -> bool {
    if !(event.kind.is_modify() || event.kind.is_create()) {
        return false;
    }
    match name {
        Some(name) => event.paths.iter().any(|p| p.file_name() == Some(name)),
        None => true,
    }
}

fn snapshot(config: &Config) -> Option<Value> {
    serde_json::to_value(config).ok()
}
