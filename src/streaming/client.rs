//! Ollama API client
//!
//! Completion provider over `POST /api/generate`:
//! - `stream: false` for whole answers, bounded by the request timeout
//! - `stream: true` for NDJSON fragments over a held-open connection; only
//!   the connect phase is time-limited so long answers are not cut off
//!
//! A stream that ends without a `done: true` frame, or that carries an
//! `error` field, is reported as a mid-stream failure.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, BoxStream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::GenerationConfig;
use crate::errors::{RagError, Result};
use crate::generation::{CompletionProvider, CompletionRequest, FragmentStream};
use crate::streaming::parser::ChunkParser;

/// Connect timeout for provider requests
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Ollama completion client
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    temperature: f64,
    timeout: Duration,
}

/// Ollama generate request
#[derive(Debug, Clone, Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    system: &'a str,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Clone, Serialize)]
struct GenerateOptions {
    temperature: f64,
}

/// Non-streaming generate response
#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    error: Option<String>,
}

/// Reader state for one streamed response
struct FrameReader {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    parser: ChunkParser,
    finished: bool,
}

impl OllamaClient {
    /// Create a client from the generation settings
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(RagError::Http)?;

        Ok(Self {
            client,
            base_url: config.ollama_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn body<'a>(&'a self, request: &'a CompletionRequest, stream: bool) -> OllamaGenerateRequest<'a> {
        OllamaGenerateRequest {
            model: &self.model,
            system: &request.system_prompt,
            prompt: request.prompt(),
            stream,
            options: GenerateOptions {
                temperature: self.temperature,
            },
        }
    }

    fn send_error(&self, err: reqwest::Error) -> RagError {
        if err.is_timeout() {
            RagError::Timeout {
                duration_ms: self.timeout.as_millis() as u64,
            }
        } else if err.is_connect() {
            RagError::ModelUnavailable(format!("Failed to reach Ollama at {}: {}", self.base_url, err))
        } else {
            RagError::Generation(format!("Failed to send request: {}", err))
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(RagError::Generation(format!("HTTP {}: {}", status, error_text)))
    }
}

#[async_trait]
impl CompletionProvider for OllamaClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&self.body(request, false))
            .send()
            .await
            .map_err(|e| self.send_error(e))?;

        let response = Self::check_status(response).await?;
        let body: OllamaGenerateResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                self.send_error(e)
            } else {
                RagError::Generation(format!("Malformed provider response: {}", e))
            }
        })?;

        match body.error {
            Some(error) => Err(RagError::Generation(error)),
            None => Ok(body.response.trim().to_string()),
        }
    }

    async fn complete_stream(&self, request: &CompletionRequest) -> Result<FragmentStream> {
        let url = format!("{}/api/generate", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&self.body(request, true))
            .send()
            .await
            .map_err(|e| self.send_error(e))?;

        let response = Self::check_status(response).await?;

        let reader = FrameReader {
            body: response.bytes_stream().boxed(),
            parser: ChunkParser::new(),
            finished: false,
        };

        Ok(stream::unfold(reader, read_fragment).boxed())
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// Next fragment from the NDJSON body
async fn read_fragment(mut reader: FrameReader) -> Option<(Result<String>, FrameReader)> {
    if reader.finished {
        return None;
    }

    loop {
        match reader.parser.next_frame() {
            Err(err) => {
                reader.finished = true;
                return Some((Err(err), reader));
            }
            Ok(Some(frame)) => {
                if let Some(error) = frame.error {
                    reader.finished = true;
                    return Some((Err(RagError::Generation(error)), reader));
                }
                if frame.done {
                    reader.finished = true;
                    if frame.response.is_empty() {
                        return None;
                    }
                }
                return Some((Ok(frame.response), reader));
            }
            Ok(None) => {}
        }

        match reader.body.next().await {
            Some(Ok(bytes)) => {
                if let Err(err) = reader.parser.add_bytes(&bytes) {
                    reader.finished = true;
                    return Some((Err(err), reader));
                }
            }
            Some(Err(err)) => {
                reader.finished = true;
                return Some((
                    Err(RagError::Generation(format!("Provider stream interrupted: {}", err))),
                    reader,
                ));
            }
            None => {
                reader.finished = true;
                return Some((
                    Err(RagError::Generation(
                        "Provider closed the stream before completion".to_string(),
                    )),
                    reader,
                ));
            }
        }
    }
}
