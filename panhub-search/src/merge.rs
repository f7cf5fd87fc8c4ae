//! Grouping and merging of links by storage type.
//!
//! All functions here are pure: inputs are never mutated and a fresh
//! mapping is returned on every call. The orchestrator folds per-source
//! groupings together in priority order, so the first source to report a
//! URL decides its position and metadata.

use std::collections::HashSet;

use crate::types::{CloudType, Link, MergedLinks, SearchResult};

/// Fold `incoming` into `target`, skipping URLs already present per type.
///
/// Returns `target` unchanged when `incoming` is `None`. Types present only
/// in `target` are carried through untouched; new links are appended in
/// `incoming`'s order.
pub fn merge_merged_by_type(target: &MergedLinks, incoming: Option<&MergedLinks>) -> MergedLinks {
    let mut merged = target.clone();
    let Some(incoming) = incoming else {
        return merged;
    };

    for (cloud_type, links) in incoming {
        let existing = merged.entry(*cloud_type).or_default();
        let mut seen: HashSet<String> = existing.iter().map(|l| l.url.clone()).collect();
        existing.extend(
            links
                .iter()
                .filter(|link| seen.insert(link.url.clone()))
                .cloned(),
        );
    }

    merged
}

/// Group the links of `results` by storage type, tagging provenance.
///
/// `source` is recorded on every link (e.g. `tg:channel` or
/// `plugin:name`). Links inherit the result's datetime, and the result's
/// title when they carry none of their own. Duplicate URLs within one type
/// keep their first occurrence.
pub fn group_links_by_type(results: &[SearchResult], source: &str) -> MergedLinks {
    let mut grouped = MergedLinks::new();
    let mut seen: HashSet<(CloudType, &str)> = HashSet::new();

    for result in results {
        for link in &result.links {
            if link.url.is_empty() || !seen.insert((link.cloud_type, link.url.as_str())) {
                continue;
            }
            grouped
                .entry(link.cloud_type)
                .or_default()
                .push(tagged(link, result, source));
        }
    }

    grouped
}

/// Keep only the requested storage types.
///
/// An empty filter keeps everything. Types outside the filter are removed
/// from the mapping entirely rather than left as empty lists.
pub fn filter_by_cloud_types(merged: &MergedLinks, cloud_types: &[CloudType]) -> MergedLinks {
    if cloud_types.is_empty() {
        return merged.clone();
    }
    merged
        .iter()
        .filter(|(cloud_type, _)| cloud_types.contains(cloud_type))
        .map(|(cloud_type, links)| (*cloud_type, links.clone()))
        .collect()
}

fn tagged(link: &Link, result: &SearchResult, source: &str) -> Link {
    let mut link = link.clone();
    if link.title.trim().is_empty() {
        link.title = result.title.clone();
    }
    if link.datetime.is_none() && !result.datetime.is_empty() {
        link.datetime = Some(result.datetime.clone());
    }
    link.source = Some(source.to_string());
    link
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(cloud_type: CloudType, url: &str) -> Link {
        Link::new(cloud_type, url)
    }

    fn merged(entries: &[(CloudType, &[&str])]) -> MergedLinks {
        entries
            .iter()
            .map(|(cloud_type, urls)| {
                (
                    *cloud_type,
                    urls.iter().map(|u| link(*cloud_type, u)).collect(),
                )
            })
            .collect()
    }

    fn urls(merged: &MergedLinks, cloud_type: CloudType) -> Vec<&str> {
        merged
            .get(&cloud_type)
            .map(|links| links.iter().map(|l| l.url.as_str()).collect())
            .unwrap_or_default()
    }

    #[test]
    fn absent_incoming_is_identity() {
        let target = merged(&[(CloudType::Baidu, &["u1"])]);
        assert_eq!(merge_merged_by_type(&target, None), target);
    }

    #[test]
    fn first_seen_order_without_duplicates() {
        let first = merged(&[(CloudType::Baidu, &["url1"])]);
        let second = merged(&[(CloudType::Baidu, &["url2", "url1"])]);
        let result = merge_merged_by_type(&first, Some(&second));
        assert_eq!(urls(&result, CloudType::Baidu), vec!["url1", "url2"]);
    }

    #[test]
    fn remerging_adds_nothing() {
        let a = merged(&[(CloudType::Others, &["x", "y"])]);
        let b = merged(&[(CloudType::Others, &["y", "z"]), (CloudType::Quark, &["q"])]);
        let once = merge_merged_by_type(&a, Some(&b));
        let twice = merge_merged_by_type(&once, Some(&b));
        assert_eq!(once, twice);
        assert_eq!(urls(&twice, CloudType::Others), vec!["x", "y", "z"]);
    }

    #[test]
    fn target_only_types_carried_through() {
        let target = merged(&[(CloudType::Aliyun, &["a"])]);
        let incoming = merged(&[(CloudType::Quark, &["q"])]);
        let result = merge_merged_by_type(&target, Some(&incoming));
        assert_eq!(urls(&result, CloudType::Aliyun), vec!["a"]);
        assert_eq!(urls(&result, CloudType::Quark), vec!["q"]);
    }

    #[test]
    fn inputs_not_mutated() {
        let target = merged(&[(CloudType::Baidu, &["u1"])]);
        let incoming = merged(&[(CloudType::Baidu, &["u2"])]);
        let target_before = target.clone();
        let incoming_before = incoming.clone();
        let _ = merge_merged_by_type(&target, Some(&incoming));
        assert_eq!(target, target_before);
        assert_eq!(incoming, incoming_before);
    }

    #[test]
    fn first_writer_keeps_metadata() {
        let mut target = MergedLinks::new();
        target.insert(
            CloudType::Baidu,
            vec![link(CloudType::Baidu, "u").with_password("aaaa")],
        );
        let mut incoming = MergedLinks::new();
        incoming.insert(
            CloudType::Baidu,
            vec![link(CloudType::Baidu, "u").with_password("bbbb")],
        );
        let result = merge_merged_by_type(&target, Some(&incoming));
        assert_eq!(result[&CloudType::Baidu].len(), 1);
        assert_eq!(result[&CloudType::Baidu][0].password.as_deref(), Some("aaaa"));
    }

    #[test]
    fn grouping_tags_provenance() {
        let results = vec![SearchResult {
            unique_id: "c-1".into(),
            channel: "c".into(),
            datetime: "2024-05-01T10:00:00+00:00".into(),
            title: "Show S01".into(),
            content: String::new(),
            links: vec![
                link(CloudType::Quark, "https://pan.quark.cn/s/1"),
                link(CloudType::Baidu, "https://pan.baidu.com/s/2").with_title("Own title"),
                link(CloudType::Quark, "https://pan.quark.cn/s/1"),
            ],
        }];

        let grouped = group_links_by_type(&results, "tg:c");
        assert_eq!(grouped[&CloudType::Quark].len(), 1);
        let quark = &grouped[&CloudType::Quark][0];
        assert_eq!(quark.title, "Show S01");
        assert_eq!(quark.source.as_deref(), Some("tg:c"));
        assert_eq!(quark.datetime.as_deref(), Some("2024-05-01T10:00:00+00:00"));
        assert_eq!(grouped[&CloudType::Baidu][0].title, "Own title");
    }

    #[test]
    fn filter_drops_unrequested_types() {
        let all = merged(&[
            (CloudType::Aliyun, &["a"]),
            (CloudType::Baidu, &["b"]),
            (CloudType::Quark, &["q"]),
        ]);
        let filtered = filter_by_cloud_types(&all, &[CloudType::Aliyun]);
        assert_eq!(filtered.len(), 1);
        assert!(filtered.contains_key(&CloudType::Aliyun));
    }

    #[test]
    fn filter_never_adds_empty_lists() {
        let all = merged(&[(CloudType::Baidu, &["b"])]);
        let filtered = filter_by_cloud_types(&all, &[CloudType::Aliyun]);
        assert!(filtered.is_empty());
    }

    #[test]
    fn empty_filter_keeps_everything() {
        let all = merged(&[(CloudType::Baidu, &["b"]), (CloudType::Others, &["o"])]);
        assert_eq!(filter_by_cloud_types(&all, &[]), all);
    }
}
