//! Shared HTTP client with retry and bounded fan-out

use crate::config::HttpSettings;
use crate::providers::{ProviderBatch, ProviderError};
use futures::stream::{self, StreamExt};
use mpdb_common::{Identifier, IdentifierSet};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// reqwest client plus the retry and concurrency policy every adapter shares
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    max_retries: u32,
    retry_backoff: Duration,
    concurrency: usize,
}

impl HttpClient {
    pub fn new(settings: &HttpSettings) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(settings.user_agent.as_str())
            .build()?;

        Ok(Self {
            client,
            max_retries: settings.max_retries.max(1),
            retry_backoff: Duration::from_millis(settings.retry_backoff_ms),
            concurrency: settings.concurrency.max(1),
        })
    }

    /// Maximum in-flight requests per stage
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// GET a JSON document; `None` when the resource does not exist
    pub async fn get_json(&self, url: &str) -> Result<Option<Value>, ProviderError> {
        let response = self
            .send(url, || self.client.get(url).header("Accept", "application/json"))
            .await?;
        decode(response).await
    }

    /// POST a JSON body and decode the JSON answer
    pub async fn post_json<B>(&self, url: &str, body: &B) -> Result<Option<Value>, ProviderError>
    where
        B: Serialize + ?Sized,
    {
        let response = self
            .send(url, || {
                self.client
                    .post(url)
                    .header("Accept", "application/json")
                    .json(body)
            })
            .await?;
        decode(response).await
    }

    /// POST without a body, as MemProtMD expects for reference lookups
    pub async fn post_empty(&self, url: &str) -> Result<Option<Value>, ProviderError> {
        let response = self
            .send(url, || self.client.post(url).header("Accept", "application/json"))
            .await?;
        decode(response).await
    }

    /// POST an urlencoded form and decode the JSON answer
    pub async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
        accept: &str,
    ) -> Result<Option<Value>, ProviderError> {
        let response = self
            .send(url, || self.client.post(url).header("Accept", accept).form(form))
            .await?;
        decode(response).await
    }

    /// GET raw bytes (structure files)
    pub async fn get_bytes(&self, url: &str) -> Result<Option<Vec<u8>>, ProviderError> {
        match self.send(url, || self.client.get(url)).await? {
            Some(response) => Ok(Some(response.bytes().await?.to_vec())),
            None => Ok(None),
        }
    }

    /// Send with exponential backoff on transport errors, 429 and 5xx.
    ///
    /// 404 and 204 are answers, not failures: both come back as `None`.
    async fn send<F>(&self, url: &str, build: F) -> Result<Option<Response>, ProviderError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 1;
        loop {
            let error = match build().send().await {
                Ok(response) => {
                    let status = response.status();
                    if status == StatusCode::NOT_FOUND || status == StatusCode::NO_CONTENT {
                        debug!(url, status = status.as_u16(), "No content");
                        return Ok(None);
                    }
                    if status.is_success() {
                        return Ok(Some(response));
                    }
                    let error = ProviderError::Status {
                        url: url.to_string(),
                        status: status.as_u16(),
                    };
                    let retriable =
                        status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS;
                    if !retriable {
                        return Err(error);
                    }
                    error
                }
                Err(e) => ProviderError::Http(e),
            };

            if attempt >= self.max_retries {
                return Err(error);
            }

            let backoff = self.retry_backoff * 2u32.saturating_pow(attempt - 1);
            warn!(
                url,
                attempt,
                max_attempts = self.max_retries,
                error = %error,
                "Request failed, retrying in {:?}",
                backoff
            );
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }
}

async fn decode(response: Option<Response>) -> Result<Option<Value>, ProviderError> {
    match response {
        Some(response) => {
            let bytes = response.bytes().await?;
            Ok(Some(serde_json::from_slice(&bytes)?))
        }
        None => Ok(None),
    }
}

/// Run one lookup per identifier, at most `concurrency` at a time.
///
/// Returns only once every lookup has finished.
pub async fn lookup_each<F, Fut>(
    provider: &str,
    ids: &IdentifierSet,
    concurrency: usize,
    lookup: F,
) -> ProviderBatch
where
    F: Fn(Identifier) -> Fut,
    Fut: Future<Output = Result<Option<Value>, ProviderError>>,
{
    let outcomes: Vec<(Identifier, Result<Option<Value>, ProviderError>)> =
        stream::iter(ids.iter().cloned())
            .map(|id| {
                let request = lookup(id.clone());
                async move { (id, request.await) }
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;

    let mut batch = ProviderBatch::default();
    for (id, outcome) in outcomes {
        batch.record(provider, id, outcome);
    }
    batch
}

/// True for `null`, `{}`, `[]` and `""`
pub fn is_empty_payload(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}
