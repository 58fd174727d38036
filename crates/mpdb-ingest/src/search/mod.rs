//! RCSB search
//!
//! The configured expression is compiled into a query tree before anything
//! touches the network, so a bad expression never costs a request.

pub mod query;
pub mod request;

use crate::config::SearchConfig;
use crate::providers::{HttpClient, ProviderError};
use mpdb_common::IdentifierSet;
use tracing::{debug, info};

pub use query::{compile, parse, transform, Expr, LogicalOperator, QueryError, QueryNode};
pub use request::{parse_result_set, SearchRequest};

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Invalid search expression: {0}")]
    Query(#[from] QueryError),

    #[error("Search request failed: {0}")]
    Request(#[from] ProviderError),

    #[error("Unexpected search response: {0}")]
    UnexpectedResponse(String),
}

/// Compile the configured expression into a ready-to-send request
pub fn build_request(config: &SearchConfig) -> Result<SearchRequest, QueryError> {
    info!(expression = %config.expression, "Compiling search expression");
    let tree = compile(&config.expression, &config.parameters())?;
    Ok(SearchRequest::new(tree))
}

/// Run the configured search and return the matching entry identifiers
pub async fn search(
    http: &HttpClient,
    endpoint: &str,
    config: &SearchConfig,
) -> Result<IdentifierSet, SearchError> {
    let request = build_request(config)?;
    execute(http, endpoint, &request).await
}

/// Send a compiled request; `204 No Content` means zero hits
pub async fn execute(
    http: &HttpClient,
    endpoint: &str,
    request: &SearchRequest,
) -> Result<IdentifierSet, SearchError> {
    info!("Sending search query to RCSB Search API");
    if let Ok(payload) = serde_json::to_string_pretty(request) {
        debug!(payload = %payload, "Search payload");
    }

    let ids = match http.post_json(endpoint, request).await? {
        Some(body) => parse_result_set(&body)?,
        None => IdentifierSet::new(),
    };

    info!(entries = ids.len(), "Search returned entries");
    Ok(ids)
}
