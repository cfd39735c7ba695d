//! Live fetcher talking to the visualization server over HTTP.

use reqwest::blocking::Client;
use std::time::Duration;

use crate::error::FetchError;
use crate::fetch::SubtreeFetcher;
use crate::id::NodeId;
use crate::wire::{encode_id, WireFragment};

/// HTTP fetcher configuration.
#[derive(Debug, Clone)]
pub struct HttpFetcherConfig {
    /// Base URL, without a trailing slash.
    pub endpoint: String,
    /// Per-visualization session identifier.
    pub session: String,
    pub timeout: Duration,
}

/// Fetches `GET {endpoint}/{session}/{wire id}`.
pub struct HttpFetcher {
    client: Client,
    config: HttpFetcherConfig,
}

fn network_error(err: &reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Network(err.to_string())
    }
}

impl HttpFetcher {
    pub fn new(config: HttpFetcherConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .map_err(|e| network_error(&e))?;

        Ok(Self { client, config })
    }

    /// Request URL for a node. The wire id is 1-based.
    pub fn url_for(&self, id: NodeId) -> String {
        format!(
            "{}/{}/{}",
            self.config.endpoint.trim_end_matches('/'),
            self.config.session,
            encode_id(id)
        )
    }
}

impl SubtreeFetcher for HttpFetcher {
    fn fetch(&self, id: NodeId) -> Result<WireFragment, FetchError> {
        let url = self.url_for(id);
        tracing::debug!(%url, "fetching subtree");

        let response = self.client.get(&url).send().map_err(|e| network_error(&e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        response
            .json::<WireFragment>()
            .map_err(|e| FetchError::InvalidResponse(e.to_string()))
    }
}
