//! Subtree fetching: the fetcher seam and the worker-thread dispatcher.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::error::FetchError;
use crate::id::NodeId;
use crate::wire::WireFragment;

/// Source of subtree fragments.
///
/// Implementations block; the [`FetchDispatcher`] runs them off the control
/// thread.
pub trait SubtreeFetcher: Send + Sync {
    fn fetch(&self, id: NodeId) -> Result<WireFragment, FetchError>;
}

/// Result of one fetch, delivered back to the control thread.
#[derive(Debug)]
pub struct FetchCompletion {
    pub id: NodeId,
    pub result: Result<WireFragment, FetchError>,
}

/// Runs fetches on worker threads and hands completions back over a channel.
///
/// Completions are only observed when the owner drains them, so every store
/// mutation happens on the thread that owns the dispatcher.
pub struct FetchDispatcher {
    fetcher: Arc<dyn SubtreeFetcher>,
    tx: Sender<FetchCompletion>,
    rx: Receiver<FetchCompletion>,
}

impl FetchDispatcher {
    pub fn new(fetcher: Arc<dyn SubtreeFetcher>) -> Self {
        let (tx, rx) = mpsc::channel();
        Self { fetcher, tx, rx }
    }

    /// Start fetching `id` in the background.
    pub fn dispatch(&self, id: NodeId) {
        let fetcher = Arc::clone(&self.fetcher);
        let tx = self.tx.clone();
        tracing::debug!(node = %id, "dispatching fetch");

        thread::spawn(move || {
            let result = catch_unwind(AssertUnwindSafe(|| fetcher.fetch(id)))
                .unwrap_or(Err(FetchError::WorkerPanicked));
            let _ = tx.send(FetchCompletion { id, result });
        });
    }

    /// All completions that have arrived so far.
    pub fn try_completions(&self) -> Vec<FetchCompletion> {
        let mut done = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(completion) => done.push(completion),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        done
    }

    /// Block for the next completion, up to `timeout`.
    pub fn wait_completion(&self, timeout: Duration) -> Option<FetchCompletion> {
        match self.rx.recv_timeout(timeout) {
            Ok(completion) => Some(completion),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}
