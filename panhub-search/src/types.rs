//! Core types: search results, links, storage types, requests and responses.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Free-form per-request extension parameters passed through to plugins.
pub type Ext = serde_json::Map<String, serde_json::Value>;

/// Links grouped by storage type, each list in first-seen order with
/// unique URLs.
pub type MergedLinks = BTreeMap<CloudType, Vec<Link>>;

/// Cloud storage provider a link points at.
///
/// Known providers get their own variant; anything else is classified as
/// [`CloudType::Others`]. Serialises as the lowercase tag used on the wire
/// (`"baidu"`, `"115"`, `"magnet"`, ...), and unknown tags deserialise to
/// [`CloudType::Others`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CloudType {
    /// Baidu Netdisk.
    Baidu,
    /// Aliyun Drive / Alipan.
    Aliyun,
    /// Quark Drive.
    Quark,
    /// China Telecom Tianyi Cloud.
    Tianyi,
    /// UC Drive.
    Uc,
    /// China Mobile Caiyun.
    Mobile,
    /// 115 Drive.
    Pan115,
    /// 123 Pan.
    Pan123,
    /// Xunlei (Thunder) Drive.
    Xunlei,
    /// PikPak.
    Pikpak,
    /// BitTorrent magnet URI.
    Magnet,
    /// eDonkey link.
    Ed2k,
    /// Anything not recognised above.
    Others,
}

impl CloudType {
    /// Returns the wire tag for this storage type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Baidu => "baidu",
            Self::Aliyun => "aliyun",
            Self::Quark => "quark",
            Self::Tianyi => "tianyi",
            Self::Uc => "uc",
            Self::Mobile => "mobile",
            Self::Pan115 => "115",
            Self::Pan123 => "123",
            Self::Xunlei => "xunlei",
            Self::Pikpak => "pikpak",
            Self::Magnet => "magnet",
            Self::Ed2k => "ed2k",
            Self::Others => "others",
        }
    }

    /// Parse a wire tag. Unknown tags map to [`CloudType::Others`].
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "baidu" => Self::Baidu,
            "aliyun" | "alipan" => Self::Aliyun,
            "quark" => Self::Quark,
            "tianyi" => Self::Tianyi,
            "uc" => Self::Uc,
            "mobile" => Self::Mobile,
            "115" => Self::Pan115,
            "123" => Self::Pan123,
            "xunlei" => Self::Xunlei,
            "pikpak" => Self::Pikpak,
            "magnet" => Self::Magnet,
            "ed2k" => Self::Ed2k,
            _ => Self::Others,
        }
    }

    /// Returns all storage types, [`CloudType::Others`] last.
    pub fn all() -> &'static [CloudType] {
        &[
            Self::Baidu,
            Self::Aliyun,
            Self::Quark,
            Self::Tianyi,
            Self::Uc,
            Self::Mobile,
            Self::Pan115,
            Self::Pan123,
            Self::Xunlei,
            Self::Pikpak,
            Self::Magnet,
            Self::Ed2k,
            Self::Others,
        ]
    }
}

impl fmt::Display for CloudType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for CloudType {
    fn from(tag: String) -> Self {
        Self::from_tag(&tag)
    }
}

impl From<CloudType> for String {
    fn from(cloud_type: CloudType) -> Self {
        cloud_type.as_str().to_string()
    }
}

/// A single resource link inside a search result.
///
/// Two links are the same resource when their URLs are equal; the other
/// fields are descriptive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Storage provider the URL belongs to.
    #[serde(rename = "type")]
    pub cloud_type: CloudType,
    /// The share URL (or magnet/ed2k URI).
    pub url: String,
    /// Extraction code, when the share requires one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Human-readable title for the resource.
    #[serde(default)]
    pub title: String,
    /// Where the link came from, e.g. `tg:channel` or `plugin:name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Timestamp of the result the link was found in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,
}

impl Link {
    /// Create a link with no password, title or provenance.
    pub fn new(cloud_type: CloudType, url: impl Into<String>) -> Self {
        Self {
            cloud_type,
            url: url.into(),
            password: None,
            title: String::new(),
            source: None,
            datetime: None,
        }
    }

    /// Attach an extraction code.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Attach a title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }
}

/// One hit returned by a source plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Stable identifier, unique per source (e.g. `channel-1234`).
    pub unique_id: String,
    /// Name of the channel or plugin that produced the hit.
    pub channel: String,
    /// ISO 8601 timestamp of the underlying post.
    #[serde(default)]
    pub datetime: String,
    /// Post title.
    pub title: String,
    /// Post body or summary.
    #[serde(default)]
    pub content: String,
    /// Resource links found in the post, in order of appearance.
    #[serde(default)]
    pub links: Vec<Link>,
}

/// Shape of the response requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResultShape {
    /// Only the flat result list.
    #[serde(rename = "results")]
    Results,
    /// Only links grouped by storage type.
    #[default]
    #[serde(rename = "merged_by_type", alias = "merge")]
    MergedByType,
    /// Both the flat list and the grouped links.
    #[serde(rename = "all")]
    All,
}

impl ResultShape {
    /// Whether the response carries the flat result list.
    pub fn includes_results(&self) -> bool {
        matches!(self, Self::Results | Self::All)
    }

    /// Whether the response carries the grouped links.
    pub fn includes_merged(&self) -> bool {
        matches!(self, Self::MergedByType | Self::All)
    }
}

/// Which kinds of sources a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceSelector {
    /// Channels and plugins.
    #[default]
    All,
    /// Telegram-style channels only.
    Tg,
    /// Plugin scrapers only.
    Plugin,
}

impl SourceSelector {
    /// Returns the wire tag for this selector.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Tg => "tg",
            Self::Plugin => "plugin",
        }
    }

    /// Whether sources of `kind` take part in a search with this selector.
    pub fn admits(&self, kind: SourceKind) -> bool {
        match self {
            Self::All => true,
            Self::Tg => kind == SourceKind::Channel,
            Self::Plugin => kind == SourceKind::Plugin,
        }
    }
}

/// Kind of a registered source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// A message/feed channel, selected by the `tg` selector.
    Channel,
    /// A scraper plugin, selected by the `plugin` selector.
    Plugin,
}

impl SourceKind {
    /// Prefix used when tagging link provenance.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Channel => "tg",
            Self::Plugin => "plugin",
        }
    }
}

/// An already-validated search request.
///
/// Field aliases accept the short query-string names used by HTTP clients
/// (`kw`, `conc`, `refresh`, `res`, `src`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchRequest {
    /// Search keyword.
    #[serde(alias = "kw")]
    pub keyword: String,
    /// Channel names to query; empty means every registered channel.
    pub channels: Vec<String>,
    /// Concurrency override; falls back to the configured default.
    #[serde(alias = "conc")]
    pub concurrency: Option<usize>,
    /// Bypass the cache read (results are still written back).
    #[serde(alias = "refresh")]
    pub force_refresh: bool,
    /// Requested response shape.
    #[serde(alias = "res")]
    pub result_type: ResultShape,
    /// Which kinds of sources to query.
    #[serde(alias = "src")]
    pub source_type: SourceSelector,
    /// Plugin names to query; empty means every registered plugin.
    pub plugins: Vec<String>,
    /// Storage types to keep in the grouped output; empty keeps all.
    pub cloud_types: Vec<CloudType>,
    /// Extension parameters forwarded to plugins.
    pub ext: Ext,
}

impl SearchRequest {
    /// Create a request for `keyword` with default options.
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            ..Default::default()
        }
    }

    /// Set the response shape.
    pub fn with_result_type(mut self, result_type: ResultShape) -> Self {
        self.result_type = result_type;
        self
    }

    /// Set the source selector.
    pub fn with_source_type(mut self, source_type: SourceSelector) -> Self {
        self.source_type = source_type;
        self
    }

    /// Restrict the search to the named plugins.
    pub fn with_plugins<I, S>(mut self, plugins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.plugins = plugins.into_iter().map(Into::into).collect();
        self
    }

    /// Restrict the search to the named channels.
    pub fn with_channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channels = channels.into_iter().map(Into::into).collect();
        self
    }

    /// Keep only these storage types in the grouped output.
    pub fn with_cloud_types(mut self, cloud_types: Vec<CloudType>) -> Self {
        self.cloud_types = cloud_types;
        self
    }

    /// Override the concurrency limit.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    /// Skip the cache read.
    pub fn with_force_refresh(mut self, force_refresh: bool) -> Self {
        self.force_refresh = force_refresh;
        self
    }

    /// Add an extension parameter.
    pub fn with_ext(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.ext.insert(key.into(), value);
        self
    }
}

/// Response returned to the HTTP layer.
///
/// `total` is always the number of raw results, regardless of shape or of
/// how many links the grouped output holds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Number of underlying raw results.
    pub total: usize,
    /// Flat result list, present for the `results` and `all` shapes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<SearchResult>>,
    /// Grouped links, present for the `merged_by_type` and `all` shapes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_by_type: Option<MergedLinks>,
}
