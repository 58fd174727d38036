//! RCSB GraphQL entry details (primary provider)

use crate::providers::http::HttpClient;
use crate::providers::{PrimaryProvider, ProviderBatch, ProviderError};
use async_trait::async_trait;
use mpdb_common::{Identifier, IdentifierSet};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

#[derive(Debug, Serialize)]
struct GraphqlRequest<'a> {
    query: &'a str,
    variables: GraphqlVariables<'a>,
}

#[derive(Debug, Serialize)]
struct GraphqlVariables<'a> {
    ids: Vec<&'a str>,
}

/// RCSB data API adapter
///
/// Sends the caller's detail query with `$ids` bound to the working set, in
/// chunks of `batch_size` identifiers.
pub struct RcsbGraphql {
    http: HttpClient,
    endpoint: String,
    batch_size: usize,
}

impl RcsbGraphql {
    pub fn new(http: HttpClient, endpoint: impl Into<String>, batch_size: usize) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            batch_size: batch_size.max(1),
        }
    }

    async fn fetch_chunk(&self, ids: &[&Identifier], query: &str) -> Result<Vec<Value>, ProviderError> {
        let request = GraphqlRequest {
            query,
            variables: GraphqlVariables {
                ids: ids.iter().map(|id| id.as_str()).collect(),
            },
        };

        let Some(body) = self.http.post_json(&self.endpoint, &request).await? else {
            return Ok(Vec::new());
        };

        if let Some(errors) = body.get("errors").filter(|e| !e.is_null()) {
            warn!(errors = %errors, "RCSB GraphQL reported errors");
        }

        match body.pointer("/data/entries") {
            Some(Value::Array(entries)) => Ok(entries.clone()),
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(other) => Err(ProviderError::UnexpectedShape(format!(
                "data.entries is not a list: {other}"
            ))),
        }
    }
}

/// Entry id of one GraphQL result (`rcsb_id` or `entry.id`)
fn entry_id(entry: &Value) -> Option<Identifier> {
    entry
        .get("rcsb_id")
        .or_else(|| entry.pointer("/entry/id"))
        .and_then(Value::as_str)
        .and_then(|raw| Identifier::new(raw).ok())
}

#[async_trait]
impl PrimaryProvider for RcsbGraphql {
    async fn fetch(&self, ids: &IdentifierSet, detail_query: &str) -> ProviderBatch {
        info!(entries = ids.len(), "Fetching RCSB metadata");
        let mut batch = ProviderBatch::default();
        let ordered: Vec<&Identifier> = ids.iter().collect();

        for chunk in ordered.chunks(self.batch_size) {
            match self.fetch_chunk(chunk, detail_query).await {
                Ok(entries) => {
                    for entry in entries.into_iter().filter(|e| !e.is_null()) {
                        match entry_id(&entry) {
                            Some(id) if ids.contains(&id) => {
                                batch.found.insert(id, entry);
                            }
                            Some(id) => debug!(entry = %id, "Ignoring entry outside the request"),
                            None => warn!("RCSB entry without an id; add rcsb_id to the detail query"),
                        }
                    }
                    for id in chunk {
                        if !batch.found.contains_key(*id) {
                            batch.missing.insert((*id).clone());
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, entries = chunk.len(), "RCSB GraphQL request failed");
                    let failed: IdentifierSet = chunk.iter().map(|id| (*id).clone()).collect();
                    let failures = ProviderBatch::all_failed(&failed, &e);
                    batch.failed.extend(failures.failed);
                }
            }
        }

        info!(
            found = batch.found.len(),
            missing = batch.missing.len(),
            failed = batch.failed.len(),
            "RCSB metadata query complete"
        );
        batch
    }
}
