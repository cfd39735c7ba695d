use std::time::Duration;

use crate::config::TreeConfig;
use crate::display::DisplayTree;
use crate::error::{FragmentError, Result, TreeError};
use crate::tree::TreeStore;
use crate::wire::InitialPayload;

/// Data and view state of one visualization.
///
/// Created once at session start and kept for the lifetime of the view.
/// Renderers read it; only the controller mutates it.
pub struct Session {
    pub(crate) store: TreeStore,
    pub(crate) display: DisplayTree,
    transition: Duration,
}

impl Session {
    /// Seed the store from the page-load payload and materialize the initial
    /// display levels without fetching.
    pub fn start(payload: &InitialPayload, config: &TreeConfig) -> Result<Self> {
        let store = TreeStore::from_payload(payload).map_err(TreeError::MalformedPayload)?;
        if !store.contains(config.root_id) {
            return Err(TreeError::MalformedPayload(FragmentError::UnrenderableRoot(
                config.root_id,
            )));
        }

        let mut display = DisplayTree::new(config.root_id);
        let root = display.root();
        display.expand_known(root, config.initial_expand_depth, &store);

        let visible = display.visible_nodes().len();
        tracing::info!(
            nodes = store.len(),
            frontier = store.frontier_len(),
            visible,
            "session started"
        );

        Ok(Self {
            store,
            display,
            transition: config.initial_transition_duration(),
        })
    }

    pub fn store(&self) -> &TreeStore {
        &self.store
    }

    pub fn display(&self) -> &DisplayTree {
        &self.display
    }

    /// Animation length a renderer should use for reveal transitions.
    pub fn transition_duration(&self) -> Duration {
        self.transition
    }
}
