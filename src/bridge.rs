//! Stdin/stdout JSON bridge for the search service.
//!
//! Reads one [`SearchRequest`] per line as JSON, validates and normalises
//! it, runs the search, and writes one [`ResponseEnvelope`] per line.
//! Requests are served in order; a malformed line produces an error
//! envelope and the bridge keeps reading.
//!
//! Stdout is exclusively reserved for the JSON protocol; all diagnostic
//! output (tracing, logs) must be routed to stderr.

use std::collections::HashSet;
use std::sync::Arc;

use panhub_search::{
    SearchRequest, SearchResponse, SearchService, SourceSelector, TelegramChannel,
};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};

use crate::config::AppConfig;
use crate::error::{HostError, Result};

/// Longest accepted keyword, in characters.
pub const MAX_KEYWORD_CHARS: usize = 200;

/// Longest accepted channel, plugin or cloud-type list.
pub const MAX_LIST_LEN: usize = 50;

/// Concurrency overrides accepted from callers.
pub const CONCURRENCY_RANGE: std::ops::RangeInclusive<usize> = 1..=20;

/// One line of bridge output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Whether the search ran.
    pub ok: bool,
    /// The search response, when `ok`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<SearchResponse>,
    /// Why the request failed, when not `ok`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseEnvelope {
    /// Successful response.
    pub fn ok(data: SearchResponse) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    /// Error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Build a service from configuration and register the default channels.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or a channel's HTTP
/// client cannot be built.
pub fn build_service(config: &AppConfig) -> Result<Arc<SearchService>> {
    let service = SearchService::new(config.search.clone(), config.cache.clone())?
        .with_breaker(config.breaker.clone());

    for channel in &config.search.default_channels {
        let source = TelegramChannel::new(channel.as_str(), &config.search)?;
        if !service.register_plugin(Arc::new(source)) {
            tracing::warn!(channel = %channel, "channel not registered (empty or duplicate name)");
        }
    }
    tracing::info!(sources = service.registry().len(), "search service ready");

    Ok(Arc::new(service))
}

/// Check caller-supplied bounds and normalise a request for the core.
///
/// Trims and de-duplicates name lists, and drops the list the source
/// selector makes irrelevant.
///
/// # Errors
///
/// Returns a message describing the first violated bound.
pub fn validate_request(mut request: SearchRequest) -> std::result::Result<SearchRequest, String> {
    request.keyword = request.keyword.trim().to_string();
    if request.keyword.is_empty() {
        return Err("keyword must not be empty".into());
    }
    if request.keyword.chars().count() > MAX_KEYWORD_CHARS {
        return Err(format!("keyword longer than {MAX_KEYWORD_CHARS} characters"));
    }
    if let Some(concurrency) = request.concurrency {
        if !CONCURRENCY_RANGE.contains(&concurrency) {
            return Err(format!(
                "concurrency must be between {} and {}",
                CONCURRENCY_RANGE.start(),
                CONCURRENCY_RANGE.end()
            ));
        }
    }
    if request.channels.len() > MAX_LIST_LEN
        || request.plugins.len() > MAX_LIST_LEN
        || request.cloud_types.len() > MAX_LIST_LEN
    {
        return Err(format!("lists are limited to {MAX_LIST_LEN} entries"));
    }

    request.channels = normalise_names(request.channels);
    request.plugins = normalise_names(request.plugins);
    match request.source_type {
        SourceSelector::Tg => request.plugins.clear(),
        SourceSelector::Plugin => request.channels.clear(),
        SourceSelector::All => {}
    }
    Ok(request)
}

fn normalise_names(names: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .into_iter()
        .map(|name| name.trim().trim_start_matches('@').to_string())
        .filter(|name| !name.is_empty() && seen.insert(name.clone()))
        .collect()
}

/// Parse, validate and serve one input line.
///
/// Returns `None` for blank lines.
pub async fn handle_line(service: &SearchService, line: &str) -> Option<ResponseEnvelope> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let request: SearchRequest = match serde_json::from_str(trimmed) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(error = %e, "failed to parse search request from stdin");
            return Some(ResponseEnvelope::error(format!("failed to parse request: {e}")));
        }
    };

    let request = match validate_request(request) {
        Ok(request) => request,
        Err(message) => return Some(ResponseEnvelope::error(message)),
    };

    Some(match service.search(&request).await {
        Ok(response) => ResponseEnvelope::ok(response),
        Err(e) => {
            tracing::error!(error = %e, "search failed");
            ResponseEnvelope::error(e.to_string())
        }
    })
}

/// Serve requests from `reader` until EOF, writing envelopes to `writer`.
///
/// # Errors
///
/// Returns an error if reading input or writing output fails.
pub async fn run_bridge<R, W>(service: &SearchService, reader: R, writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut writer = BufWriter::new(writer);

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| HostError::Protocol(format!("failed to read input: {e}")))?
    {
        let Some(envelope) = handle_line(service, &line).await else {
            continue;
        };
        let json = serde_json::to_string(&envelope)
            .map_err(|e| HostError::Protocol(format!("failed to serialize response: {e}")))?;
        write_line(&mut writer, &json).await?;
    }

    tracing::info!("input closed (EOF); shutting down bridge");
    Ok(())
}

/// Run the bridge over the process's stdin and stdout.
///
/// # Errors
///
/// Same as [`run_bridge`].
pub async fn run_stdio_bridge(service: &SearchService) -> Result<()> {
    run_bridge(service, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await
}

/// Write a single JSON line to the buffered writer and flush.
async fn write_line<W: AsyncWrite + Unpin>(writer: &mut BufWriter<W>, json: &str) -> Result<()> {
    writer
        .write_all(json.as_bytes())
        .await
        .map_err(|e| HostError::Protocol(format!("failed to write output: {e}")))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| HostError::Protocol(format!("failed to write newline: {e}")))?;
    writer
        .flush()
        .await
        .map_err(|e| HostError::Protocol(format!("failed to flush output: {e}")))?;
    Ok(())
}
