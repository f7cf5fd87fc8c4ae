//! Telegram public channel source.
//!
//! Scrapes the channel preview page at `https://t.me/s/<channel>?q=<keyword>`,
//! which renders recent matching posts as static HTML and needs no login.
//! Every post that carries at least one resource link becomes a
//! [`SearchResult`].

use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use scraper::{ElementRef, Html, Node, Selector};
use url::Url;

use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::links;
use crate::plugin::{PluginContext, SearchPlugin};
use crate::types::{Ext, SearchResult, SourceKind};

const PREVIEW_BASE: &str = "https://t.me/s/";

/// Default priority for channel sources.
pub const DEFAULT_CHANNEL_PRIORITY: u32 = 1;

/// Prefixes stripped from the first line of a post when used as a title.
const TITLE_PREFIXES: &[&str] = &["资源名称：", "资源名称:", "名称：", "名称:", "标题：", "标题:"];

/// Desktop browsers; `t.me/s/` serves the mobile app banner page to
/// anything it does not recognise as one.
const DESKTOP_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:133.0) Gecko/20100101 Firefox/133.0",
];

/// A single Telegram channel queried through its public preview page.
///
/// Each channel owns one HTTP client, built on construction and reused for
/// every search so connections and the `t.me` session cookie carry over.
#[derive(Debug)]
pub struct TelegramChannel {
    channel: String,
    priority: u32,
    client: reqwest::Client,
}

impl TelegramChannel {
    /// Create a source for `channel` (the public username, with or without
    /// a leading `@`).
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Http`] if the HTTP client cannot be built.
    pub fn new(channel: impl Into<String>, config: &SearchConfig) -> Result<Self, SearchError> {
        let channel = channel.into();
        Ok(Self {
            channel: channel.trim().trim_start_matches('@').to_string(),
            priority: DEFAULT_CHANNEL_PRIORITY,
            client: preview_client(config)?,
        })
    }

    /// Override the registry priority.
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Preview page URL for `keyword`.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::InvalidRequest`] if the channel name does not
    /// form a valid URL.
    pub fn preview_url(&self, keyword: &str) -> Result<Url, SearchError> {
        Url::parse_with_params(&format!("{PREVIEW_BASE}{}", self.channel), &[("q", keyword)])
            .map_err(|e| SearchError::InvalidRequest(format!("bad channel {}: {e}", self.channel)))
    }
}

/// Client for `t.me` preview pages: HTTPS only, HTML accept headers, a
/// desktop User-Agent fixed for the client's lifetime.
fn preview_client(config: &SearchConfig) -> Result<reqwest::Client, SearchError> {
    let agent = config
        .user_agent
        .clone()
        .unwrap_or_else(|| desktop_agent().to_string());

    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("text/html,application/xhtml+xml"));
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static("zh-CN,zh;q=0.9,en;q=0.8"),
    );

    reqwest::Client::builder()
        .https_only(true)
        .cookie_store(true)
        .default_headers(headers)
        .user_agent(agent)
        .timeout(Duration::from_secs(config.request_timeout_seconds))
        .redirect(reqwest::redirect::Policy::limited(3))
        .build()
        .map_err(|e| SearchError::Http(format!("telegram client: {e}")))
}

fn desktop_agent() -> &'static str {
    DESKTOP_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(DESKTOP_AGENTS[0])
}

#[async_trait]
impl SearchPlugin for TelegramChannel {
    fn name(&self) -> &str {
        &self.channel
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Channel
    }

    async fn search(
        &self,
        keyword: &str,
        _ext: &Ext,
        _context: &PluginContext,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let url = self.preview_url(keyword)?;
        tracing::trace!(channel = %self.channel, %url, "telegram channel search");

        let html = self
            .client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| SearchError::Http(format!("telegram {}: {e}", self.channel)))?
            .text()
            .await
            .map_err(|e| SearchError::Http(format!("telegram {} body: {e}", self.channel)))?;

        tracing::trace!(channel = %self.channel, bytes = html.len(), "telegram page received");

        parse_channel_html(&html, &self.channel)
    }
}

/// Parse a channel preview page into results, newest first.
///
/// Posts without any resource link are dropped. Extracted as a separate
/// function for testability with fixture HTML.
pub(crate) fn parse_channel_html(html: &str, channel: &str) -> Result<Vec<SearchResult>, SearchError> {
    let document = Html::parse_document(html);

    let message_sel = selector(".tgme_widget_message[data-post]")?;
    let text_sel = selector(".tgme_widget_message_text")?;
    let time_sel = selector("time[datetime]")?;
    let anchor_sel = selector("a[href]")?;

    let mut results = Vec::new();

    for message in document.select(&message_sel) {
        let Some(post) = message.value().attr("data-post") else {
            continue;
        };
        let message_id = post.rsplit('/').next().unwrap_or(post);

        let text_el = message.select(&text_sel).next();
        let text = text_el.map(message_text).unwrap_or_default();

        let hrefs: Vec<&str> = text_el
            .into_iter()
            .flat_map(|el| el.select(&anchor_sel))
            .filter_map(|a| a.value().attr("href"))
            .collect();
        let links = links::merge_hrefs(links::extract_links(&text), hrefs);
        if links.is_empty() {
            continue;
        }

        let datetime = message
            .select(&time_sel)
            .next()
            .and_then(|t| t.value().attr("datetime"))
            .unwrap_or_default()
            .to_string();

        results.push(SearchResult {
            unique_id: format!("{channel}-{message_id}"),
            channel: channel.to_string(),
            datetime,
            title: title_of(&text),
            content: text.trim().to_string(),
            links,
        });
    }

    results.reverse();
    tracing::debug!(channel, count = results.len(), "telegram results parsed");
    Ok(results)
}

fn selector(css: &str) -> Result<Selector, SearchError> {
    Selector::parse(css).map_err(|e| SearchError::Parse(format!("invalid selector {css}: {e:?}")))
}

/// Message text with `<br>` rendered as newlines.
fn message_text(element: ElementRef<'_>) -> String {
    let mut text = String::new();
    for node in element.descendants() {
        match node.value() {
            Node::Text(chunk) => text.push_str(chunk),
            Node::Element(el) if el.name() == "br" => text.push('\n'),
            _ => {}
        }
    }
    text
}

fn title_of(text: &str) -> String {
    let first = text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default();
    TITLE_PREFIXES
        .iter()
        .find_map(|prefix| first.strip_prefix(prefix))
        .unwrap_or(first)
        .trim()
        .to_string()
}
