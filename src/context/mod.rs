//! Provisioning contexts.
//!
//! # Data Flow
//! ```text
//! Context::root(registry)            → (root, Teardown)
//!     load_module(fragment, ns, key) → resolve, construct, decode
//!         → child context owned by the module → Provisioner::provision(child)
//!         → instance recorded on the loading context
//!
//! Teardown::run()
//!     → cancel context + descendants
//!     → cleanup callbacks (LIFO), instance cleanups (record order)
//!     → descendants, newest first
//! ```
//!
//! # Design Decisions
//! - Contexts are cheap handles (`Clone`) onto a shared arena
//! - Cancellation is cooperative: observers poll `is_cancelled` or await `cancelled`
//! - Teardown is best-effort and exhaustive; failures are collected, not raised

mod arena;
mod load;

use std::sync::Arc;

use tokio::sync::watch;

use crate::error::{BoxError, CleanupError};
use crate::modules::{Module, ModuleId, Registry};
use crate::storage::Storage;

pub use arena::ContextId;
pub use load::{expect_capability, ModuleMap};

use arena::ContextTree;

/// Lifecycle and ownership scope for provisioned modules.
#[derive(Clone)]
pub struct Context {
    id: ContextId,
    owner: Option<ModuleId>,
    tree: Arc<ContextTree>,
    done: watch::Receiver<bool>,
}

impl Context {
    /// Create the root of a new lifecycle tree.
    pub fn root(registry: Arc<Registry>) -> (Context, Teardown) {
        let tree = ContextTree::new(registry);
        let ctx = Self::attach(tree, None, None);
        let teardown = ctx.teardown_handle();
        (ctx, teardown)
    }

    /// Create a child context sharing this context's cancellation ancestry.
    pub fn child(&self) -> (Context, Teardown) {
        let ctx = Self::attach(self.tree.clone(), Some(self.id), self.owner.clone());
        let teardown = ctx.teardown_handle();
        (ctx, teardown)
    }

    /// Child context in which `owner` provisions.
    pub(crate) fn child_for(&self, owner: ModuleId) -> Context {
        Self::attach(self.tree.clone(), Some(self.id), Some(owner))
    }

    fn attach(tree: Arc<ContextTree>, parent: Option<ContextId>, owner: Option<ModuleId>) -> Self {
        let (id, done) = tree.insert(parent, owner.clone());
        Self {
            id,
            owner,
            tree,
            done,
        }
    }

    fn teardown_handle(&self) -> Teardown {
        Teardown {
            id: self.id,
            tree: self.tree.clone(),
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Module this context was created for, if any.
    pub fn owner(&self) -> Option<&ModuleId> {
        self.owner.as_ref()
    }

    pub fn registry(&self) -> &Arc<Registry> {
        self.tree.registry()
    }

    /// Storage backend of the config this context belongs to.
    pub fn storage(&self) -> Option<Arc<dyn Storage>> {
        self.tree.storage()
    }

    pub(crate) fn set_storage(&self, storage: Arc<dyn Storage>) {
        self.tree.set_storage(storage);
    }

    /// Register a callback to run when this context is torn down.
    pub fn on_cleanup<F>(&self, callback: F)
    where
        F: FnOnce() -> Result<(), BoxError> + Send + 'static,
    {
        self.tree.push_cleanup(self.id, Box::new(callback));
    }

    /// Instances of `id` recorded on this context, in load order.
    pub fn instances(&self, id: &str) -> Vec<Arc<dyn Module>> {
        self.tree.instances_of(self.id, &ModuleId::new(id))
    }

    pub fn is_cancelled(&self) -> bool {
        *self.done.borrow() || !self.tree.is_alive(self.id)
    }

    /// Resolves once the context (or an ancestor) is cancelled.
    pub async fn cancelled(&self) {
        let mut done = self.done.clone();
        // a dropped sender means the node was torn down
        let _ = done.wait_for(|cancelled| *cancelled).await;
    }

    /// Raw cancellation signal for `select!` loops.
    pub fn done(&self) -> watch::Receiver<bool> {
        self.done.clone()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .finish()
    }
}

/// Handle that tears a context down. Safe to run more than once.
#[derive(Clone)]
pub struct Teardown {
    id: ContextId,
    tree: Arc<ContextTree>,
}

impl Teardown {
    pub fn context_id(&self) -> ContextId {
        self.id
    }

    /// Signal cancellation without releasing anything.
    pub fn cancel(&self) {
        self.tree.cancel(self.id);
    }

    /// Cancel, run cleanups, free the subtree. Returns the recorded failures.
    pub fn run(&self) -> Vec<CleanupError> {
        self.tree.teardown(self.id)
    }
}

impl std::fmt::Debug for Teardown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Teardown").field(&self.id).finish()
    }
}
