//! Generic JSON-over-HTTP polling source
//!
//! Fetches one JSON document per cycle. A JSON pointer can select the record
//! inside the response and a field can supply the document id.

use super::{IngestionRecord, Source};
use crate::config::SourceConfig;
use crate::error::{FabricError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_API_KEY_HEADER: &str = "X-API-Key";
const REQUEST_TIMEOUT_SECS: u64 = 30;

pub struct HttpJsonSource {
    name: String,
    url: String,
    http: Client,
    api_key: Option<(String, String)>,
    pointer: Option<String>,
    id_field: Option<String>,
    retry_fetch: bool,
}

impl HttpJsonSource {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            name: name.into(),
            url: url.into(),
            http,
            api_key: None,
            pointer: None,
            id_field: None,
            retry_fetch: false,
        }
    }

    /// Build from config; the API key is read from the named environment variable
    pub fn from_config(config: &SourceConfig) -> Self {
        let mut source = Self::new(&config.name, &config.url);
        source.pointer = config.pointer.clone();
        source.id_field = config.id_field.clone();
        source.retry_fetch = config.retry_fetch;

        if let Some(var) = &config.api_key_env {
            match std::env::var(var) {
                Ok(key) if !key.is_empty() => {
                    let header = config
                        .api_key_header
                        .clone()
                        .unwrap_or_else(|| DEFAULT_API_KEY_HEADER.to_string());
                    source.api_key = Some((header, key));
                }
                _ => warn!(source = %config.name, "API key variable {} is not set", var),
            }
        }

        source
    }

    pub fn with_pointer(mut self, pointer: impl Into<String>) -> Self {
        self.pointer = Some(pointer.into());
        self
    }

    pub fn with_id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = Some(field.into());
        self
    }

    pub fn with_api_key(mut self, header: impl Into<String>, key: impl Into<String>) -> Self {
        self.api_key = Some((header.into(), key.into()));
        self
    }

    pub fn with_retry_fetch(mut self, retry: bool) -> Self {
        self.retry_fetch = retry;
        self
    }

    fn document_id(&self, fields: &Map<String, Value>) -> Result<Option<String>> {
        let Some(field) = &self.id_field else {
            return Ok(None);
        };
        match fields.get(field) {
            Some(Value::String(s)) if !s.is_empty() => Ok(Some(s.clone())),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            _ => Err(FabricError::source_failure(
                &self.name,
                format!("id field '{}' missing or not a string/number", field),
            )),
        }
    }
}

/// 4xx other than 408/429 will not get better by asking again
fn is_permanent_status(status: u16) -> bool {
    (400..500).contains(&status) && status != 408 && status != 429
}

#[async_trait]
impl Source for HttpJsonSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<Value> {
        let mut request = self.http.get(&self.url);
        if let Some((header, key)) = &self.api_key {
            request = request.header(header.as_str(), key.as_str());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FabricError::HttpStatus {
                source_name: self.name.clone(),
                status: status.as_u16(),
            });
        }

        let body = response.json::<Value>().await?;
        debug!(source = %self.name, "Fetched payload from {}", self.url);
        Ok(body)
    }

    fn normalize(&self, raw: Value) -> Result<IngestionRecord> {
        let selected = match &self.pointer {
            Some(pointer) => raw.pointer(pointer).cloned().ok_or_else(|| {
                FabricError::source_failure(
                    &self.name,
                    format!("pointer '{}' not found in payload", pointer),
                )
            })?,
            None => raw,
        };

        let fields = match selected {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };

        let document_id = self.document_id(&fields)?;
        Ok(IngestionRecord {
            fields,
            document_id,
        })
    }

    fn retry_fetch(&self) -> bool {
        self.retry_fetch
    }

    fn is_retryable(&self, error: &FabricError) -> bool {
        match error {
            FabricError::HttpStatus { status, .. } => !is_permanent_status(*status),
            FabricError::Json(_) => false,
            _ => true,
        }
    }
}
