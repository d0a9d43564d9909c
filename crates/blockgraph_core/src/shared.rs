// SPDX-License-Identifier: MIT OR Apache-2.0
//! Thread-shareable graph handle.

use crate::graph::Graph;
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

/// A graph behind a mutex, cloneable across threads
#[derive(Clone, Default)]
pub struct SharedGraph {
    inner: Arc<Mutex<Graph>>,
}

impl SharedGraph {
    /// Wrap a graph
    pub fn new(graph: Graph) -> Self {
        Self {
            inner: Arc::new(Mutex::new(graph)),
        }
    }

    /// Lock the graph for the lifetime of the guard
    pub fn lock(&self) -> MutexGuard<'_, Graph> {
        self.inner.lock()
    }

    /// Run a closure with exclusive access to the graph
    pub fn with<R>(&self, f: impl FnOnce(&mut Graph) -> R) -> R {
        let mut graph = self.inner.lock();
        f(&mut graph)
    }

    /// Take the graph back if this is the last handle
    pub fn try_unwrap(self) -> Result<Graph, Self> {
        Arc::try_unwrap(self.inner)
            .map(Mutex::into_inner)
            .map_err(|inner| Self { inner })
    }
}

impl From<Graph> for SharedGraph {
    fn from(graph: Graph) -> Self {
        Self::new(graph)
    }
}

impl std::fmt::Debug for SharedGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.inner.try_lock() {
            Some(graph) => f
                .debug_struct("SharedGraph")
                .field("name", &graph.name)
                .field("blocks", &graph.block_count())
                .finish(),
            None => f.write_str("SharedGraph(<locked>)"),
        }
    }
}
