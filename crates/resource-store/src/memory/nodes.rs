//! Node operations for InMemoryStore

use super::InMemoryStore;
use crds::Node;
use tracing::debug;

pub(crate) fn list(store: &InMemoryStore) -> Vec<Node> {
    store.state().nodes.values().cloned().collect()
}

/// Insert or replace a node (join, relabel, cordon).
pub(crate) fn put(store: &InMemoryStore, node: Node) {
    let mut state = store.state();
    let name = node.name.clone();
    state.nodes.insert(name.clone(), node);
    let revision = state.bump();
    store.notify(revision);
    debug!("Node {} stored at revision {}", name, revision);
}

pub(crate) fn delete(store: &InMemoryStore, name: &str) -> bool {
    let mut state = store.state();
    if state.nodes.remove(name).is_none() {
        return false;
    }
    let revision = state.bump();
    store.notify(revision);
    debug!("Node {} removed at revision {}", name, revision);
    true
}
