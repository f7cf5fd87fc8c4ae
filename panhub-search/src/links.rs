//! Link recognition and storage-type classification.
//!
//! Free text from channel posts is scanned for share URLs, magnet URIs and
//! ed2k links. Each link is classified into a [`CloudType`] by host, and
//! paired with an extraction code when one is given either in the URL
//! (`?pwd=`) or in the text that follows it.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::types::{CloudType, Link};

/// Host suffixes for each known storage provider.
const PROVIDER_HOSTS: &[(CloudType, &[&str])] = &[
    (CloudType::Baidu, &["pan.baidu.com", "yun.baidu.com"]),
    (CloudType::Aliyun, &["aliyundrive.com", "alipan.com"]),
    (CloudType::Quark, &["pan.quark.cn"]),
    (CloudType::Tianyi, &["cloud.189.cn"]),
    (CloudType::Uc, &["drive.uc.cn"]),
    (CloudType::Mobile, &["caiyun.139.com", "yun.139.com"]),
    (CloudType::Pan115, &["115.com", "115cdn.com", "anxia.com"]),
    (
        CloudType::Pan123,
        &["123pan.com", "123pan.cn", "123684.com", "123685.com", "123912.com", "123865.com"],
    ),
    (CloudType::Xunlei, &["pan.xunlei.com"]),
    (CloudType::Pikpak, &["mypikpak.com"]),
];

/// Hosts that only link back to the chat platform itself.
const IGNORED_HOSTS: &[&str] = &["t.me", "telegram.me", "telegram.org", "telegra.ph"];

/// Query keys that carry an extraction code.
const PASSWORD_PARAMS: &[&str] = &["pwd", "password", "passcode"];

/// Characters commonly glued to the end of a URL in prose.
const TRAILING_PUNCTUATION: &[char] = &[
    '.', ',', ';', ':', '!', '?', ')', ']', '}', '>', '\'', '"', '，', '。', '；', '：', '！',
    '？', '）', '】', '」', '》',
];

static LINK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)(magnet:\?xt=urn:btih:[0-9a-z]{32,40}[^\s<>"']*|ed2k://\|file\|[^\s<>"']+?\|/|https?://[^\s<>"'（）【】「」《》]+)"#,
    )
    .expect("link pattern compiles")
});

static PASSWORD_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:提取码|密码|访问码|pwd|code)\s*[:：=]?\s*([0-9a-z]{4,8})\b")
        .expect("password pattern compiles")
});

/// Classify a URL by storage provider.
///
/// Magnet and ed2k URIs are recognised by scheme; everything else by host
/// (exact host or any subdomain of a known provider host). Unparseable or
/// unknown URLs are [`CloudType::Others`].
pub fn classify_url(raw: &str) -> CloudType {
    let lower = raw.trim().to_ascii_lowercase();
    if lower.starts_with("magnet:") {
        return CloudType::Magnet;
    }
    if lower.starts_with("ed2k://") {
        return CloudType::Ed2k;
    }

    let Some(host) = host_of(raw) else {
        return CloudType::Others;
    };

    PROVIDER_HOSTS
        .iter()
        .find(|(_, hosts)| hosts.iter().any(|suffix| host_matches(&host, suffix)))
        .map_or(CloudType::Others, |(cloud_type, _)| *cloud_type)
}

/// Extract the extraction code carried in a share URL's query string.
pub fn password_from_url(raw: &str) -> Option<String> {
    let parsed = Url::parse(raw).ok()?;
    parsed
        .query_pairs()
        .find(|(key, _)| PASSWORD_PARAMS.contains(&key.to_ascii_lowercase().as_str()))
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Find every resource link in `text`, in order of appearance.
///
/// Links pointing back at the chat platform are skipped, duplicates (by
/// URL) keep their first occurrence. A link without a `pwd` query
/// parameter takes the first extraction code mentioned between it and the
/// next link.
pub fn extract_links(text: &str) -> Vec<Link> {
    let matches: Vec<(usize, usize, String)> = LINK_PATTERN
        .find_iter(text)
        .map(|m| {
            let url = m.as_str().trim_end_matches(TRAILING_PUNCTUATION).to_string();
            (m.start(), m.start() + url.len(), url)
        })
        .collect();

    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for (index, (_, end, url)) in matches.iter().enumerate() {
        if url.is_empty() || is_ignored(url) || !seen.insert(url.clone()) {
            continue;
        }

        let cloud_type = classify_url(url);
        let next_start = matches.get(index + 1).map_or(text.len(), |(start, _, _)| *start);
        let password = password_from_url(url).or_else(|| {
            text.get(*end..next_start)
                .and_then(|tail| PASSWORD_PATTERN.captures(tail))
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string())
        });

        let mut link = Link::new(cloud_type, url.clone());
        link.password = password;
        links.push(link);
    }

    links
}

/// Merge anchor hrefs into links extracted from text, classifying each.
///
/// Hrefs whose URL is already present are skipped, so a URL that appears
/// both as visible text and as an anchor is reported once.
pub fn merge_hrefs<'a>(mut links: Vec<Link>, hrefs: impl IntoIterator<Item = &'a str>) -> Vec<Link> {
    let mut seen: HashSet<String> = links.iter().map(|l| l.url.clone()).collect();
    for href in hrefs {
        let href = href.trim();
        let is_resource = href.starts_with("http://")
            || href.starts_with("https://")
            || href.starts_with("magnet:")
            || href.starts_with("ed2k://");
        if !is_resource || is_ignored(href) || !seen.insert(href.to_string()) {
            continue;
        }
        let mut link = Link::new(classify_url(href), href);
        link.password = password_from_url(href);
        links.push(link);
    }
    links
}

fn host_of(raw: &str) -> Option<String> {
    Url::parse(raw.trim())
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
}

fn host_matches(host: &str, suffix: &str) -> bool {
    host == suffix
        || host
            .strip_suffix(suffix)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

fn is_ignored(raw: &str) -> bool {
    host_of(raw).is_some_and(|host| IGNORED_HOSTS.iter().any(|h| host_matches(&host, h)))
}
