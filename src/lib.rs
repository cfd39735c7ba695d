//! Lazily materialized trees for interactive viewers.
//!
//! A [`TreeStore`] holds whatever part of a large tree has been discovered so
//! far. Nodes whose children are unknown sit in the frontier until a fetch
//! returns a fragment for them. A separate [`DisplayTree`] carries the
//! expand/collapse view state, and the [`InteractionController`] maps user
//! gestures onto both, fetching on demand.
//!
//! ```no_run
//! use lazytree::{InitialPayload, InteractionController, Session, TreeConfig};
//! use std::time::Duration;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = TreeConfig::default();
//!     let payload = InitialPayload::from_json(r#"{"children": [null], "text": ["root"], "unexpanded_children": [1]}"#)?;
//!     let session = Session::start(&payload, &config)?;
//!     let mut controller = InteractionController::new(session, config.build_fetcher()?, &config);
//!
//!     let root = controller.display().root();
//!     controller.reveal(root)?;
//!     for event in controller.wait_idle(Duration::from_secs(5)) {
//!         println!("{event:?}");
//!     }
//!     Ok(())
//! }
//! ```

#![warn(clippy::unwrap_used)]

pub mod config;
pub mod controller;
pub mod display;
pub mod error;
pub mod fetch;
pub mod gesture;
#[cfg(feature = "live")]
pub mod http;
pub mod id;
pub mod mock;
pub mod session;
pub mod tree;
pub mod wire;

pub use config::{SourceConfig, TreeConfig};
pub use controller::{ControllerEvent, InteractionController, Transition};
pub use display::{DisplayId, DisplayTree, Expansion, VisibleNode};
pub use error::{ConfigError, FetchError, FragmentError, Result, TreeError};
pub use fetch::{FetchDispatcher, SubtreeFetcher};
pub use gesture::{ClickDebouncer, ClickPolicy, Gesture, GestureAction};
#[cfg(feature = "live")]
pub use http::{HttpFetcher, HttpFetcherConfig};
pub use id::NodeId;
pub use mock::{MockFetcher, SourceTree};
pub use session::Session;
pub use tree::{MergeSummary, Presentation, TreeStore, MAX_NODES};
pub use wire::{InitialPayload, SubtreeFragment, WireFragment};
