//! HTTP resource client.
//!
//! Stateless per call: each operation issues exactly one request with the
//! precomputed authorization header and JSON content negotiation, then
//! either decodes the JSON body (expected status) or classifies the failure
//! payload (anything else). No retries at this layer.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, LOCATION};
use reqwest::Method;
use serde_json::Value as Json;

use graphwire_core::error::{classify_body, GraphError, Result};

use crate::instrument::{RequestEvent, RequestObserver};

/// One decoded response: status, optional `Location` header, optional body.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub location: Option<String>,
    pub body: Option<Json>,
}

pub struct Resource {
    client: reqwest::Client,
    base_url: String,
    authorization: String,
    observers: RwLock<Vec<Arc<dyn RequestObserver>>>,
}

impl Resource {
    pub fn new(
        base_url: &str,
        authorization: String,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| GraphError::Transport {
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            authorization,
            observers: RwLock::new(Vec::new()),
        })
    }

    /// Attach an instrumentation hook. Hooks receive one event per request,
    /// fired after the response body is fully read.
    pub fn observe(&self, observer: Arc<dyn RequestObserver>) {
        if let Ok(mut observers) = self.observers.write() {
            observers.push(observer);
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve a path against the base URL; absolute URLs (e.g. a
    /// server-assigned transaction URL) pass through unchanged.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    /// GET expecting `200` with a JSON body.
    pub async fn get(&self, path: &str) -> Result<Json> {
        let response = self.request(Method::GET, path, None, &[200]).await?;
        response.body.ok_or(GraphError::Protocol {
            status: Some(response.status),
            message: "expected a JSON body".to_string(),
        })
    }

    pub async fn post(&self, path: &str, body: &Json, expected: &[u16]) -> Result<HttpResponse> {
        self.request(Method::POST, path, Some(body), expected).await
    }

    /// A response with no body is a valid success for delete-style calls.
    pub async fn delete(&self, path: &str, expected: &[u16]) -> Result<HttpResponse> {
        self.request(Method::DELETE, path, None, expected).await
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Json>,
        expected: &[u16],
    ) -> Result<HttpResponse> {
        // An empty expected set would classify every response as a failure.
        if expected.is_empty() {
            return Err(GraphError::Protocol {
                status: None,
                message: "expected-status set must be non-empty".to_string(),
            });
        }
        let url = self.url(path);
        let mut request = self
            .client
            .request(method.clone(), &url)
            .header(AUTHORIZATION, &self.authorization)
            .header(ACCEPT, "application/json");
        if let Some(body) = body {
            request = request.header(CONTENT_TYPE, "application/json").json(body);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status().as_u16();
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let bytes = response.bytes().await.map_err(transport_error)?;

        self.notify(&method, &url, status, bytes.len());
        tracing::debug!(%method, %url, status, bytes = bytes.len(), "response");

        if !expected.contains(&status) {
            return Err(classify_body(status, &bytes));
        }
        let body = if bytes.is_empty() {
            None
        } else {
            Some(
                serde_json::from_slice(&bytes).map_err(|e| GraphError::Protocol {
                    status: Some(status),
                    message: format!("malformed JSON body: {e}"),
                })?,
            )
        };
        Ok(HttpResponse {
            status,
            location,
            body,
        })
    }

    fn notify(&self, method: &Method, url: &str, status: u16, body_bytes: usize) {
        let Ok(observers) = self.observers.read() else {
            return;
        };
        if observers.is_empty() {
            return;
        }
        let event = RequestEvent {
            method: method.to_string(),
            url: url.to_string(),
            status,
            body_bytes,
        };
        for observer in observers.iter() {
            observer.on_response(&event);
        }
    }
}

fn transport_error(err: reqwest::Error) -> GraphError {
    if err.is_timeout() {
        GraphError::TransportTimeout {
            message: err.to_string(),
        }
    } else {
        GraphError::Transport {
            message: err.to_string(),
        }
    }
}
