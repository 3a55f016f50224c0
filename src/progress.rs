//! Hierarchical progress tracking with cancellation.
//!
//! A [`Progress`] is a cheap, cloneable handle to a node in a tree. Leaves
//! carry their own completed/total unit counts. A node with children never
//! uses its own counters: its completion is always the sum over its live
//! children, recomputed on every read. A parent therefore cannot report
//! 100% because someone assigned its counters while the children lag.
//!
//! Cancellation flows down the tree and never up. Finishing flows up: a
//! parent is finished once every child is.

use log::{debug, error, warn};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

/// Runs once when a node reaches a terminal state.
pub type Handler = Box<dyn FnOnce() + Send>;

/// Runs after every change to a node or any of its descendants.
pub type ProgressHandler = Arc<dyn Fn(&Progress) + Send + Sync>;

#[derive(Default)]
struct NodeState {
    completed: u64,
    total: u64,
    children: Vec<Progress>,
    /// `finish()` was called.
    finish_requested: bool,
    /// Latched terminal state.
    finished: bool,
    cancelled: bool,
    cancellable: bool,
    finished_handler: Option<Handler>,
    cancelled_handler: Option<Handler>,
    progress_handler: Option<ProgressHandler>,
    title: Option<String>,
    description: Option<String>,
}

struct Node {
    state: Mutex<NodeState>,
    parent: Mutex<Weak<Node>>,
}

/// Handle to one node of a progress tree.
#[derive(Clone)]
pub struct Progress {
    node: Arc<Node>,
}

impl Progress {
    /// A leaf expecting `total` units of work.
    pub fn new(total: u64) -> Self {
        Self {
            node: Arc::new(Node {
                state: Mutex::new(NodeState {
                    total,
                    cancellable: true,
                    ..NodeState::default()
                }),
                parent: Mutex::new(Weak::new()),
            }),
        }
    }

    /// A node whose progress comes entirely from children added later.
    pub fn group() -> Self {
        Self::new(0)
    }

    pub fn with_title(self, title: impl Into<String>) -> Self {
        self.state().title = Some(title.into());
        self
    }

    fn state(&self) -> MutexGuard<'_, NodeState> {
        self.node.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn children(&self) -> Vec<Progress> {
        self.state().children.clone()
    }

    pub fn parent(&self) -> Option<Progress> {
        self.node
            .parent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .upgrade()
            .map(|node| Progress { node })
    }

    pub fn child_count(&self) -> usize {
        self.state().children.len()
    }

    pub fn ptr_eq(&self, other: &Progress) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }

    // -------------------------------------------------------------------------
    // Tree
    // -------------------------------------------------------------------------

    /// Attach `child`. Rejected (returns false) if this node is finished.
    /// A child added to a cancelled node is cancelled at once.
    pub fn add_child(&self, child: &Progress) -> bool {
        let cancelled = {
            let mut state = self.state();
            if state.finished {
                warn!("not adding a child to a finished progress node");
                return false;
            }
            state.children.push(child.clone());
            state.cancelled
        };
        *child.node.parent.lock().unwrap_or_else(|e| e.into_inner()) = Arc::downgrade(&self.node);
        if cancelled {
            child.cancel_tree();
        }
        self.notify();
        self.try_finish();
        true
    }

    // -------------------------------------------------------------------------
    // Counters
    // -------------------------------------------------------------------------

    /// Completed units: the node's own count for a leaf, the sum over the
    /// children otherwise.
    pub fn completed_units(&self) -> u64 {
        let (own, children) = {
            let state = self.state();
            (state.completed, state.children.clone())
        };
        if children.is_empty() {
            own
        } else {
            children.iter().map(|c| c.completed_units()).sum()
        }
    }

    /// Total units, derived the same way as [`Progress::completed_units`].
    pub fn total_units(&self) -> u64 {
        let (own, children) = {
            let state = self.state();
            (state.total, state.children.clone())
        };
        if children.is_empty() {
            own
        } else {
            children.iter().map(|c| c.total_units()).sum()
        }
    }

    /// Completed over total; 0.0 when there is no work.
    pub fn fraction_completed(&self) -> f64 {
        let total = self.total_units();
        if total == 0 {
            0.0
        } else {
            (self.completed_units() as f64 / total as f64).min(1.0)
        }
    }

    pub fn set_total(&self, total: u64) {
        self.mutate(|state| state.total = total);
    }

    pub fn set_completed(&self, completed: u64) {
        self.mutate(|state| state.completed = completed);
    }

    pub fn increment(&self, units: u64) {
        self.mutate(|state| state.completed = state.completed.saturating_add(units));
    }

    fn mutate(&self, f: impl FnOnce(&mut NodeState)) {
        {
            let mut state = self.state();
            if state.finished {
                error!(
                    "ignoring counter change on finished progress node {:?}",
                    state.title
                );
                return;
            }
            f(&mut state);
        }
        self.notify();
        self.try_finish();
    }

    // -------------------------------------------------------------------------
    // Finish / cancel
    // -------------------------------------------------------------------------

    /// Declare this node's own work done. A node with children becomes
    /// finished only once all of them are.
    pub fn finish(&self) {
        {
            let mut state = self.state();
            if state.finished {
                return;
            }
            state.finish_requested = true;
        }
        self.try_finish();
    }

    pub fn is_finished(&self) -> bool {
        self.state().finished
    }

    /// Cancel this node and every descendant. Ancestors are untouched.
    ///
    /// Returns false, doing nothing, if this node is not cancellable.
    pub fn cancel(&self) -> bool {
        if !self.is_cancellable() {
            debug!("progress node {:?} is not cancellable", self.title());
            return false;
        }
        self.cancel_tree();
        true
    }

    fn cancel_tree(&self) {
        let children = {
            let mut state = self.state();
            if state.cancelled || state.finished {
                return;
            }
            state.cancelled = true;
            state.children.clone()
        };
        for child in &children {
            child.cancel_tree();
        }
        self.notify();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state().cancelled
    }

    pub fn is_cancellable(&self) -> bool {
        self.state().cancellable
    }

    pub fn set_cancellable(&self, cancellable: bool) {
        self.state().cancellable = cancellable;
    }

    /// Latch the finished state if this node qualifies, fire its handlers,
    /// then give the parent the same chance.
    fn try_finish(&self) {
        let children = {
            let state = self.state();
            if state.finished {
                return;
            }
            state.children.clone()
        };
        let children_done = children.iter().all(|c| c.is_finished());

        let handlers = {
            let mut state = self.state();
            if state.finished {
                return;
            }
            let done = if children.is_empty() {
                state.finish_requested || (state.total > 0 && state.completed >= state.total)
            } else {
                // Children may have been added since the snapshot.
                children_done && state.children.len() == children.len()
            };
            if !done {
                return;
            }
            state.finished = true;
            let cancelled = if state.cancelled {
                state.cancelled_handler.take()
            } else {
                None
            };
            (state.finished_handler.take(), cancelled)
        };

        if let Some(handler) = handlers.0 {
            handler();
        }
        if let Some(handler) = handlers.1 {
            handler();
        }
        self.notify();
        if let Some(parent) = self.parent() {
            parent.try_finish();
        }
    }

    // -------------------------------------------------------------------------
    // Handlers and labels
    // -------------------------------------------------------------------------

    /// Run `handler` once when this node finishes, cancelled or not. Runs
    /// immediately if the node is already finished.
    pub fn set_finished_handler(&self, handler: impl FnOnce() + Send + 'static) {
        let mut state = self.state();
        if state.finished {
            drop(state);
            handler();
        } else {
            state.finished_handler = Some(Box::new(handler));
        }
    }

    /// Run `handler` once when this node finishes after being cancelled.
    pub fn set_cancelled_handler(&self, handler: impl FnOnce() + Send + 'static) {
        let mut state = self.state();
        if state.finished && state.cancelled {
            drop(state);
            handler();
        } else if !state.finished {
            state.cancelled_handler = Some(Box::new(handler));
        }
    }

    /// Called with this node after any change to it or its descendants.
    pub fn set_progress_handler(&self, handler: impl Fn(&Progress) + Send + Sync + 'static) {
        self.state().progress_handler = Some(Arc::new(handler));
    }

    fn notify(&self) {
        let mut node = Some(self.clone());
        while let Some(current) = node {
            let handler = current.state().progress_handler.clone();
            if let Some(handler) = handler {
                handler(&current);
            }
            node = current.parent();
        }
    }

    pub fn title(&self) -> Option<String> {
        self.state().title.clone()
    }

    pub fn set_title(&self, title: impl Into<String>) {
        self.state().title = Some(title.into());
    }

    pub fn description(&self) -> Option<String> {
        self.state().description.clone()
    }

    pub fn set_description(&self, description: impl Into<String>) {
        self.state().description = Some(description.into());
    }
}

impl fmt::Debug for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (title, finished, cancelled) = {
            let state = self.state();
            (state.title.clone(), state.finished, state.cancelled)
        };
        f.debug_struct("Progress")
            .field("title", &title)
            .field("completed", &self.completed_units())
            .field("total", &self.total_units())
            .field("finished", &finished)
            .field("cancelled", &cancelled)
            .finish()
    }
}
