// src/transform/rules.rs
//! Default rule-based transform: blacklist scrubbing for news channels and
//! config extraction for proxy channels.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{ContentTransform, PublishPayload};
use crate::config::RelayConfig;
use crate::ingest::types::{ChannelCategory, RawMessage};

static RE_PROXY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:vmess|vless|trojan|ss)://[a-zA-Z0-9\-_@:/?=&%.#+]+").expect("proxy regex")
});
static RE_MENTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"@[a-zA-Z0-9_]+").expect("mention regex"));
static RE_BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("newline regex"));

/// Document extensions that count as a shareable proxy config.
pub const CONFIG_FILE_EXTENSIONS: &[&str] = &["npvt", "ovpn", "conf", "json", "hc", "ehi"];

#[derive(Debug, Clone)]
pub struct RuleTransform {
    blacklist: Vec<String>,
    min_proxy_len: usize,
}

impl RuleTransform {
    pub fn new(blacklist: Vec<String>, min_proxy_len: usize) -> Self {
        // Longest phrases first so "@BBCPersian" goes before "BBC".
        let mut blacklist = blacklist;
        blacklist.sort_by_key(|b| std::cmp::Reverse(b.chars().count()));
        Self {
            blacklist,
            min_proxy_len,
        }
    }

    pub fn from_config(cfg: &RelayConfig) -> Self {
        Self::new(cfg.blacklist.clone(), cfg.min_proxy_len)
    }

    /// Distinct configs longer than `min_proxy_len`, first-seen order.
    pub fn extract_configs(&self, text: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for m in RE_PROXY.find_iter(text) {
            let c = m.as_str();
            if c.chars().count() > self.min_proxy_len && !out.iter().any(|o| o == c) {
                out.push(c.to_string());
            }
        }
        out
    }

    /// Scrub blacklisted phrases and mentions; `None` when nothing is left.
    pub fn scrub_news(&self, text: &str) -> Option<String> {
        if text.trim().is_empty() {
            return None;
        }
        let mut out = text.to_string();
        for bad in &self.blacklist {
            if out.contains(bad.as_str()) {
                out = out.replace(bad.as_str(), "");
            }
        }
        out = RE_MENTION.replace_all(&out, "").to_string();
        out = RE_BLANK_RUNS.replace_all(&out, "\n\n").trim().to_string();
        if out.is_empty() {
            None
        } else {
            Some(out)
        }
    }
}

fn is_config_file(name: &str) -> bool {
    name.rsplit_once('.')
        .map(|(_, ext)| {
            CONFIG_FILE_EXTENSIONS
                .iter()
                .any(|e| e.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

impl ContentTransform for RuleTransform {
    fn classify(&self, raw: &RawMessage, category: ChannelCategory) -> Vec<PublishPayload> {
        match category {
            ChannelCategory::Proxy => {
                let mut out: Vec<PublishPayload> = self
                    .extract_configs(&raw.text)
                    .into_iter()
                    .map(|c| PublishPayload::proxy_text(&raw.channel, c))
                    .collect();
                if let Some(doc) = &raw.document {
                    if is_config_file(&doc.file_name) {
                        out.push(PublishPayload::proxy_file(&raw.channel, doc.clone()));
                    }
                }
                out
            }
            ChannelCategory::News => self
                .scrub_news(&raw.text)
                .map(|t| vec![PublishPayload::news(&raw.channel, t, raw.media.clone())])
                .unwrap_or_default(),
        }
    }
}
