//! Session configuration.
//!
//! Loaded from a JSON file; every field has a default so an empty object is a
//! valid configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ConfigError, Result, TreeError};
use crate::fetch::SubtreeFetcher;
use crate::id::NodeId;
use crate::mock::{MockFetcher, SourceTree};

/// Where fragments come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Synthetic in-memory tree.
    Mock {
        #[serde(default = "default_branching")]
        branching: usize,
        #[serde(default = "default_source_depth")]
        depth: usize,
        #[serde(default = "default_prefetch_depth")]
        prefetch_depth: usize,
        #[serde(default)]
        latency_ms: u64,
    },
    /// Remote server.
    Live {
        endpoint: String,
        session: String,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self::Mock {
            branching: default_branching(),
            depth: default_source_depth(),
            prefetch_depth: default_prefetch_depth(),
            latency_ms: 0,
        }
    }
}

fn default_branching() -> usize {
    3
}

fn default_source_depth() -> usize {
    6
}

fn default_prefetch_depth() -> usize {
    2
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    pub root_id: NodeId,
    /// Display levels materialized at start, from known data only.
    pub initial_expand_depth: usize,
    pub initial_transition_duration_ms: u64,
    /// Depth of the deep-reveal gesture. `<= 1` means plain toggling.
    pub click_expand_depth: usize,
    /// Put deep reveal on double click and toggling on single click.
    pub deep_reveal_on_double_click: bool,
    pub double_click_window_ms: u64,
    pub source: SourceConfig,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            root_id: NodeId::new(0),
            initial_expand_depth: 1,
            initial_transition_duration_ms: 750,
            click_expand_depth: 1,
            deep_reveal_on_double_click: false,
            double_click_window_ms: 250,
            source: SourceConfig::default(),
        }
    }
}

impl TreeConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.ensure_valid()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| TreeError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn initial_transition_duration(&self) -> Duration {
        Duration::from_millis(self.initial_transition_duration_ms)
    }

    pub fn double_click_window(&self) -> Duration {
        Duration::from_millis(self.double_click_window_ms)
    }

    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        if self.double_click_window_ms > 2_000 {
            errors.push(ConfigError {
                field: "double_click_window_ms".to_string(),
                message: format!("{} ms is too long (max 2000)", self.double_click_window_ms),
            });
        }
        match &self.source {
            SourceConfig::Mock {
                branching,
                prefetch_depth,
                ..
            } => {
                if *branching == 0 {
                    errors.push(ConfigError {
                        field: "source.branching".to_string(),
                        message: "must be at least 1".to_string(),
                    });
                }
                if *prefetch_depth == 0 {
                    errors.push(ConfigError {
                        field: "source.prefetch_depth".to_string(),
                        message: "must be at least 1".to_string(),
                    });
                }
            }
            SourceConfig::Live {
                endpoint,
                session,
                timeout_secs,
            } => {
                if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                    errors.push(ConfigError {
                        field: "source.endpoint".to_string(),
                        message: format!("'{endpoint}' is not an http(s) URL"),
                    });
                }
                if session.is_empty() {
                    errors.push(ConfigError {
                        field: "source.session".to_string(),
                        message: "must not be empty".to_string(),
                    });
                }
                if *timeout_secs == 0 {
                    errors.push(ConfigError {
                        field: "source.timeout_secs".to_string(),
                        message: "must be at least 1".to_string(),
                    });
                }
            }
        }
        errors
    }

    pub fn ensure_valid(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(TreeError::Config(errors))
        }
    }

    /// Build the fetcher the configuration selects.
    pub fn build_fetcher(&self) -> Result<Arc<dyn SubtreeFetcher>> {
        match &self.source {
            SourceConfig::Mock {
                branching,
                depth,
                prefetch_depth,
                latency_ms,
            } => Ok(Arc::new(
                MockFetcher::new(SourceTree::generate(*branching, *depth))
                    .with_prefetch_depth(*prefetch_depth)
                    .with_latency(Duration::from_millis(*latency_ms)),
            )),
            #[cfg(feature = "live")]
            SourceConfig::Live {
                endpoint,
                session,
                timeout_secs,
            } => {
                let fetcher = crate::http::HttpFetcher::new(crate::http::HttpFetcherConfig {
                    endpoint: endpoint.clone(),
                    session: session.clone(),
                    timeout: Duration::from_secs(*timeout_secs),
                })
                .map_err(|source| TreeError::Fetch {
                    node: self.root_id,
                    source,
                })?;
                Ok(Arc::new(fetcher))
            }
            #[cfg(not(feature = "live"))]
            SourceConfig::Live { .. } => Err(TreeError::Config(vec![ConfigError {
                field: "source.kind".to_string(),
                message: "built without the 'live' feature".to_string(),
            }])),
        }
    }
}
