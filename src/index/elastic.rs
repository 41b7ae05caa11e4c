// src/index/elastic.rs
//! Minimal Elasticsearch REST client shared by the index adapters.

use reqwest::{Client, Method};
use serde_json::Value;
use std::time::Duration;

use super::IndexError;

/// Response status and body (JSON when parseable, raw text otherwise).
#[derive(Debug, Clone)]
pub struct EsResponse {
    pub status: u16,
    pub body: Value,
}

impl EsResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// `error.type` of an Elasticsearch error body, if any.
    pub fn error_type(&self) -> Option<&str> {
        self.body.pointer("/error/type").and_then(Value::as_str)
    }

    pub fn into_error(self) -> IndexError {
        IndexError::Status {
            status: self.status,
            body: self.body.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct ElasticClient {
    hosts: Vec<String>,
    client: Client,
    timeout: Duration,
}

impl ElasticClient {
    pub fn new(hosts: Vec<String>) -> Self {
        Self {
            hosts: hosts
                .into_iter()
                .map(|h| h.trim_end_matches('/').to_string())
                .filter(|h| !h.is_empty())
                .collect(),
            client: Client::new(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    /// Send a request to the first host that answers. Only connect and
    /// timeout failures move on to the next host.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<EsResponse, IndexError> {
        let mut last_err = None;
        for host in &self.hosts {
            let url = format!("{host}/{}", path.trim_start_matches('/'));
            let mut req = self
                .client
                .request(method.clone(), &url)
                .timeout(self.timeout);
            if let Some(b) = body {
                req = req.json(b);
            }
            match req.send().await {
                Ok(rsp) => {
                    let status = rsp.status().as_u16();
                    let text = rsp.text().await?;
                    let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
                    return Ok(EsResponse { status, body });
                }
                Err(e) if e.is_connect() || e.is_timeout() => {
                    tracing::warn!(host = %host, error = %e, "index host unreachable, trying next");
                    last_err = Some(e);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(last_err.map(IndexError::from).unwrap_or(IndexError::NoHosts))
    }

    /// `PUT /{index}` with the given mapping; an existing index is fine.
    pub async fn create_index(&self, index: &str, properties: Value) -> Result<(), IndexError> {
        let body = serde_json::json!({ "mappings": { "properties": properties } });
        let rsp = self.send(Method::PUT, index, Some(&body)).await?;
        if rsp.is_success() {
            tracing::info!(index, "index created");
            return Ok(());
        }
        if rsp.status == 400 && rsp.error_type() == Some("resource_already_exists_exception") {
            tracing::debug!(index, "index already exists");
            return Ok(());
        }
        Err(rsp.into_error())
    }

    /// `POST /{index}/_search`, returning `hits.hits`.
    pub async fn search(&self, index: &str, query: &Value) -> Result<Vec<Value>, IndexError> {
        let rsp = self
            .send(Method::POST, &format!("{index}/_search"), Some(query))
            .await?;
        if !rsp.is_success() {
            return Err(rsp.into_error());
        }
        match rsp.body.pointer("/hits/hits") {
            Some(Value::Array(hits)) => Ok(hits.clone()),
            _ => Err(IndexError::Decode(format!(
                "search response without hits.hits: {}",
                rsp.body
            ))),
        }
    }
}
