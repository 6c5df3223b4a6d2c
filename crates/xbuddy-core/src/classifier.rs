//! Link classification
//!
//! Turns the anchors scraped from the aggregator page into an ordered
//! candidate list. All patterns are data in [`LinkRules`] so selector and
//! host drift is a configuration change, not a code change.

use std::collections::{BTreeMap, HashSet};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, XbuddyError};
use crate::types::{Anchor, Bucket, Candidate, CandidateList};

/// Maps an href substring to a bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRule {
    pub bucket: Bucket,
    pub pattern: String,
}

impl HostRule {
    fn new(bucket: Bucket, pattern: &str) -> Self {
        Self {
            bucket,
            pattern: pattern.to_string(),
        }
    }
}

/// Selectors, blocklist and bucket definitions for the aggregator page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkRules {
    /// Anchors that may carry download links
    pub anchor_selector: String,
    /// Element that appears once the page has rendered its results
    pub result_selector: String,
    /// Single-click download button that bypasses link extraction
    pub direct_button_selector: String,
    /// Format label cells ("mp4", "mpeg"), diagnostic only
    pub format_selector: String,
    /// Resolution label cells, diagnostic only
    pub resolution_selector: String,
    /// Regexes for share links, recursive process redirects and ad hosts
    pub blocklist: Vec<String>,
    /// Parent-text substring that marks a resolution-tagged link
    pub resolution_hint: String,
    /// Host substrings checked in order after the resolution hint
    pub host_buckets: Vec<HostRule>,
    /// Controls clicked by the browser-click download method, first present wins
    pub download_control_selectors: Vec<String>,
}

impl Default for LinkRules {
    fn default() -> Self {
        Self {
            anchor_selector: r#"main#root a[rel="noreferrer nofollow noopener"]"#.to_string(),
            result_selector: "main#root section.w-full.max-w-4xl div.mb-4.mt-8.text-center"
                .to_string(),
            direct_button_selector: "a.btn.btn-success.btn-lg.w-full.mt-4".to_string(),
            format_selector: r"div.w-24.text-blue-500.uppercase".to_string(),
            resolution_selector: "div.truncate".to_string(),
            blocklist: [
                r"facebook\.com/sharer",
                r"twitter\.com/intent",
                r"vk\.com/share\.php",
                r"//9xbud\.com/https://",
                r"offmp3\.net/process",
                r"savegif\.com/process",
                r"123sudo\.com",
                r"/process\?url=https://vstream\.id/embed/",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            resolution_hint: "480".to_string(),
            host_buckets: vec![
                HostRule::new(Bucket::WorkersDev, ".workers.dev"),
                HostRule::new(Bucket::NineXBud, ".9xbud.com"),
                HostRule::new(Bucket::VideoSrc, ".video-src.com"),
            ],
            download_control_selectors: [
                r#"a[href*="download"]"#,
                r#"button[onclick*="download"]"#,
                ".download-btn",
                ".btn-download",
                "a[download]",
                r#"input[type="submit"][value*="download"]"#,
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Filters and buckets scraped anchors
pub struct LinkClassifier {
    blocklist: Vec<Regex>,
    resolution_hint: String,
    host_buckets: Vec<HostRule>,
}

impl LinkClassifier {
    /// Compiles the rule set
    ///
    /// # Errors
    /// Returns `Config` if a blocklist entry is not a valid regex
    pub fn new(rules: &LinkRules) -> Result<Self> {
        let blocklist = rules
            .blocklist
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| {
                    XbuddyError::Config(format!("invalid blocklist pattern `{}`: {}", pattern, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            blocklist,
            resolution_hint: rules.resolution_hint.clone(),
            host_buckets: rules.host_buckets.clone(),
        })
    }

    /// Checks an href against the blocklist
    pub fn is_blocked(&self, href: &str) -> bool {
        self.blocklist.iter().any(|re| re.is_match(href))
    }

    /// Assigns a bucket; the resolution hint beats every host rule
    pub fn bucket_for(&self, anchor: &Anchor) -> Bucket {
        if !self.resolution_hint.is_empty() && anchor.parent_text.contains(&self.resolution_hint) {
            return Bucket::Resolution480;
        }

        self.host_buckets
            .iter()
            .find(|rule| anchor.href.contains(&rule.pattern))
            .map(|rule| rule.bucket)
            .unwrap_or(Bucket::Other)
    }

    /// Builds the ordered candidate list
    ///
    /// Every resolution-tagged link comes first, followed by the first link
    /// of each host bucket in priority order. Blocklisted, empty and
    /// repeated hrefs are dropped.
    pub fn classify(&self, anchors: &[Anchor]) -> CandidateList {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut buckets: BTreeMap<Bucket, Vec<&str>> = BTreeMap::new();

        for anchor in anchors {
            let href = anchor.href.trim();
            if href.is_empty() || !seen.insert(href) {
                continue;
            }
            if self.is_blocked(href) {
                debug!(href, "dropping blocklisted link");
                continue;
            }
            let bucket = self.bucket_for(anchor);
            debug!(href, ?bucket, "classified link");
            buckets.entry(bucket).or_default().push(href);
        }

        buckets
            .into_iter()
            .flat_map(|(bucket, urls)| {
                let keep = if bucket.is_front_only() { 1 } else { urls.len() };
                urls.into_iter().take(keep).map(move |url| Candidate {
                    url: url.to_string(),
                    bucket,
                })
            })
            .collect()
    }
}
