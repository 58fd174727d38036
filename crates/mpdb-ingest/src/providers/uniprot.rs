//! UniProt SPARQL queries

use crate::providers::http::HttpClient;
use crate::providers::ProviderError;
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Placeholder in a query replaced by the requested entries
pub const ENTRIES_PLACEHOLDER: &str = "$entries";

const SPARQL_RESULTS_JSON: &str = "application/sparql-results+json";

/// UniProt SPARQL endpoint adapter
pub struct UniProt {
    http: HttpClient,
    endpoint: String,
}

impl UniProt {
    pub fn new(http: HttpClient, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }

    /// Run `query` with `$entries` bound to a `VALUES`-style row list and
    /// return the result bindings.
    pub async fn query(&self, query: &str, entries: &[String]) -> Result<Vec<Value>, ProviderError> {
        let query = bind_entries(query, entries);
        info!(entries = entries.len(), "Fetching UniProt SPARQL data");
        debug!(query = %query.trim(), "SPARQL payload");

        let Some(body) = self
            .http
            .post_form(&self.endpoint, &[("query", query.as_str())], SPARQL_RESULTS_JSON)
            .await?
        else {
            return Ok(Vec::new());
        };

        match body.pointer("/results/bindings") {
            Some(Value::Array(bindings)) => {
                info!(bindings = bindings.len(), "UniProt query complete");
                Ok(bindings.clone())
            }
            None => Ok(Vec::new()),
            Some(other) => Err(ProviderError::UnexpectedShape(format!(
                "results.bindings is not a list: {other}"
            ))),
        }
    }
}

/// Replace the placeholder with `('a') ('b') ...`, entries sorted and deduplicated
pub fn bind_entries(query: &str, entries: &[String]) -> String {
    let rows: BTreeSet<&str> = entries
        .iter()
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .collect();
    let values = rows
        .iter()
        .map(|entry| format!("('{}')", entry.replace('\'', "\\'")))
        .collect::<Vec<_>>()
        .join(" ");
    query.replace(ENTRIES_PLACEHOLDER, &values)
}
