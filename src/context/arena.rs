//! Arena of context nodes.
//!
//! Nodes are keyed by a monotonically increasing [`ContextId`] and only hold
//! their parent's id, so the tree has no ownership cycles and a node is freed
//! as soon as its context is torn down. Ids are never reused: a stale id
//! simply misses.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;

use crate::error::{BoxError, CleanupError};
use crate::modules::{Module, ModuleId, Registry};
use crate::storage::Storage;

/// Generation id of a context node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

pub(crate) type CleanupFn = Box<dyn FnOnce() -> Result<(), BoxError> + Send>;

struct Node {
    parent: Option<ContextId>,
    owner: Option<ModuleId>,
    instances: Vec<(ModuleId, Arc<dyn Module>)>,
    cleanups: Vec<CleanupFn>,
    in_progress: HashSet<ModuleId>,
    cancel: watch::Sender<bool>,
}

impl Node {
    /// Run callbacks (LIFO) then instance cleanups (record order).
    fn release(self, errors: &mut Vec<CleanupError>) {
        for callback in self.cleanups.into_iter().rev() {
            if let Err(source) = callback() {
                tracing::error!(
                    module = self.owner.as_ref().map(ModuleId::as_str).unwrap_or("<root>"),
                    error = %source,
                    "Cleanup callback failed"
                );
                errors.push(CleanupError {
                    owner: self.owner.clone(),
                    source,
                });
            }
        }

        for (id, instance) in self.instances {
            let Some(cleaner) = instance.cleaner() else {
                continue;
            };
            if let Err(source) = cleaner.cleanup() {
                tracing::error!(module = %id, error = %source, "Module cleanup failed");
                errors.push(CleanupError {
                    owner: Some(id),
                    source,
                });
            }
        }
    }
}

/// Shared state behind every [`super::Context`] of one lifecycle tree.
pub(crate) struct ContextTree {
    registry: Arc<Registry>,
    nodes: Mutex<HashMap<ContextId, Node>>,
    next_id: AtomicU64,
    storage: RwLock<Option<Arc<dyn Storage>>>,
}

impl ContextTree {
    pub(crate) fn new(registry: Arc<Registry>) -> Arc<Self> {
        Arc::new(Self {
            registry,
            nodes: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            storage: RwLock::new(None),
        })
    }

    pub(crate) fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub(crate) fn storage(&self) -> Option<Arc<dyn Storage>> {
        self.storage.read().clone()
    }

    pub(crate) fn set_storage(&self, storage: Arc<dyn Storage>) {
        *self.storage.write() = Some(storage);
    }

    /// Insert a node. A child of a cancelled (or vanished) parent starts cancelled.
    pub(crate) fn insert(
        &self,
        parent: Option<ContextId>,
        owner: Option<ModuleId>,
    ) -> (ContextId, watch::Receiver<bool>) {
        let id = ContextId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut nodes = self.nodes.lock();
        let cancelled = match parent {
            Some(parent) => nodes.get(&parent).map_or(true, |p| *p.cancel.borrow()),
            None => false,
        };
        let (cancel, done) = watch::channel(cancelled);
        nodes.insert(
            id,
            Node {
                parent,
                owner,
                instances: Vec::new(),
                cleanups: Vec::new(),
                in_progress: HashSet::new(),
                cancel,
            },
        );
        (id, done)
    }

    pub(crate) fn is_alive(&self, id: ContextId) -> bool {
        self.nodes.lock().contains_key(&id)
    }

    /// Record a module instance for cleanup at teardown.
    pub(crate) fn record(&self, id: ContextId, module_id: ModuleId, instance: Arc<dyn Module>) {
        let mut nodes = self.nodes.lock();
        if let Some(node) = nodes.get_mut(&id) {
            node.instances.push((module_id, instance));
            return;
        }
        drop(nodes);

        tracing::warn!(context = %id, module = %module_id, "Context already torn down, cleaning up instance now");
        if let Some(cleaner) = instance.cleaner() {
            if let Err(error) = cleaner.cleanup() {
                tracing::error!(module = %module_id, error = %error, "Module cleanup failed");
            }
        }
    }

    pub(crate) fn push_cleanup(&self, id: ContextId, callback: CleanupFn) {
        let mut nodes = self.nodes.lock();
        if let Some(node) = nodes.get_mut(&id) {
            node.cleanups.push(callback);
            return;
        }
        drop(nodes);

        tracing::warn!(context = %id, "Context already torn down, running cleanup callback now");
        if let Err(error) = callback() {
            tracing::error!(context = %id, error = %error, "Cleanup callback failed");
        }
    }

    pub(crate) fn instances_of(&self, id: ContextId, module_id: &ModuleId) -> Vec<Arc<dyn Module>> {
        self.nodes
            .lock()
            .get(&id)
            .map(|node| {
                node.instances
                    .iter()
                    .filter(|(recorded, _)| recorded == module_id)
                    .map(|(_, instance)| instance.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Mark `module_id` in progress on `id`. Returns false if `id` or one of its
    /// ancestors is already provisioning the same module.
    pub(crate) fn begin_provision(&self, id: ContextId, module_id: &ModuleId) -> bool {
        let mut nodes = self.nodes.lock();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let Some(node) = nodes.get(&current) else {
                break;
            };
            if node.in_progress.contains(module_id) {
                return false;
            }
            cursor = node.parent;
        }
        if let Some(node) = nodes.get_mut(&id) {
            node.in_progress.insert(module_id.clone());
        }
        true
    }

    pub(crate) fn end_provision(&self, id: ContextId, module_id: &ModuleId) {
        if let Some(node) = self.nodes.lock().get_mut(&id) {
            node.in_progress.remove(module_id);
        }
    }

    /// Signal cancellation on `id` and every descendant.
    pub(crate) fn cancel(&self, id: ContextId) {
        let nodes = self.nodes.lock();
        for sid in subtree(&nodes, id) {
            if let Some(node) = nodes.get(&sid) {
                node.cancel.send_replace(true);
            }
        }
    }

    /// Tear down `id` and its descendants. A second call finds nothing and
    /// returns no errors.
    pub(crate) fn teardown(&self, id: ContextId) -> Vec<CleanupError> {
        let released: Vec<Node> = {
            let mut nodes = self.nodes.lock();
            let members = subtree(&nodes, id);
            if members.is_empty() {
                return Vec::new();
            }
            for sid in &members {
                if let Some(node) = nodes.get(sid) {
                    node.cancel.send_replace(true);
                }
            }

            // this context first, then descendants newest first
            let order = members[..1].iter().chain(members[1..].iter().rev());
            order.filter_map(|sid| nodes.remove(sid)).collect()
        };

        let mut errors = Vec::new();
        for node in released {
            node.release(&mut errors);
        }
        tracing::debug!(context = %id, failures = errors.len(), "Context torn down");
        errors
    }
}

/// `root` followed by its descendants in creation order. Empty if `root` is gone.
fn subtree(nodes: &HashMap<ContextId, Node>, root: ContextId) -> Vec<ContextId> {
    if !nodes.contains_key(&root) {
        return Vec::new();
    }
    let mut ids: Vec<ContextId> = nodes.keys().copied().filter(|id| *id > root).collect();
    ids.sort_unstable();

    // parents always have smaller ids than their children
    let mut members = vec![root];
    let mut seen: HashSet<ContextId> = HashSet::from([root]);
    for id in ids {
        let parent = nodes.get(&id).and_then(|node| node.parent);
        if parent.is_some_and(|p| seen.contains(&p)) {
            seen.insert(id);
            members.push(id);
        }
    }
    members
}
