// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::{FixedOffset, Offset, Utc};
use serde::Deserialize;
use tracing::{debug, info};

/// Upper bound on any page body we read into memory
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    pub site: SiteConfig,
    pub selectors: Selectors,
    pub feed: FeedConfig,
    pub paths: PathsConfig,
    pub notify: NotifyConfig,
}

impl Config {
    pub fn resolve_relative_paths(&mut self, config_dir: impl AsRef<Path>) {
        let config_dir = config_dir.as_ref();

        self.paths.state = config_dir.join(&self.paths.state);
        self.paths.feed = config_dir.join(&self.paths.feed);
        self.paths.token = config_dir.join(&self.paths.token);
    }
}

/// The scraped project and how its URLs are laid out
#[derive(Deserialize, Debug, Clone)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct SiteConfig {
    pub base_url: String,
    pub project_id: String,
    /// Offset applied to scraped dates, in minutes east of UTC
    pub utc_offset_minutes: i32,
    pub max_body_bytes: usize,
}

impl SiteConfig {
    pub fn project_url(&self) -> String {
        format!("{}/project/{}", self.base_url, self.project_id)
    }

    pub fn listing_url(&self) -> String {
        format!("{}/episodes", self.project_url())
    }

    pub fn detail_url(&self, episode_id: &str) -> String {
        format!("{}/episode/{}", self.base_url, episode_id)
    }

    /// The configured offset, falling back to UTC when out of range
    pub fn utc_offset(&self) -> FixedOffset {
        self.utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix())
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://m.newsfund.media.daum.net".into(),
            project_id: "139".into(),
            utc_offset_minutes: 9 * 60,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// CSS selectors locating episode data in the listing and detail pages
#[derive(Deserialize, Debug, Clone)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Selectors {
    pub listing_link: String,
    pub listing_title: String,
    pub listing_thumbnail: String,
    /// Stripped from a listing link's href to obtain the episode id
    pub episode_path_prefix: String,
    pub detail_date_marker: String,
    pub detail_audio: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            listing_link: "a.link_thumb".into(),
            listing_title: ".tit_thumb".into(),
            listing_thumbnail: "img.thumb_g".into(),
            episode_path_prefix: "/episode/".into(),
            detail_date_marker: "span.txt_bar".into(),
            detail_audio: "audio".into(),
        }
    }
}

/// Static channel metadata for the published feed
#[derive(Deserialize, Debug, Clone)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct FeedConfig {
    pub title: String,
    pub author: String,
    pub subtitle: String,
    pub copyright: String,
    pub language: String,
    pub categories: Vec<String>,
    pub logo_url: String,
    /// Prefix of the rewritten enclosure URLs, served by a redirecting proxy
    pub redirect_base_url: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            title: "Unofficial episode feed".into(),
            author: "Unknown".into(),
            subtitle: "Episodes scraped from the project page".into(),
            copyright: "All rights reserved by the original authors".into(),
            language: "ko-KR".into(),
            categories: vec!["News & Politics".into(), "Society & Culture".into()],
            logo_url: String::new(),
            redirect_base_url: "http://example.com/feed/redir".into(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct PathsConfig {
    pub state: PathBuf,
    pub feed: PathBuf,
    pub token: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state: "./scrapecast-state.json".into(),
            feed: "./feed.xml".into(),
            token: "./purge.tkn".into(),
        }
    }
}

/// Side effects fired after a run that found new episodes
#[derive(Deserialize, Debug, Clone)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct NotifyConfig {
    pub enabled: bool,
    pub purge_url: String,
    pub purge_email: String,
    pub purge_domain: String,
    /// Public URL of the feed, the entry to purge
    pub feed_url: String,
    pub directory_ping_url: String,
    pub pause_secs: u64,
}

impl NotifyConfig {
    pub fn pause(&self) -> Duration {
        Duration::from_secs(self.pause_secs)
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            purge_url: "https://www.cloudflare.com/api_json.html".into(),
            purge_email: "cdn@example.com".into(),
            purge_domain: "example.com".into(),
            feed_url: "http://example.com/feed/feed.xml".into(),
            directory_ping_url: "http://www.podbbang.com/mypage/cast_update?request=ch".into(),
            pause_secs: 3,
        }
    }
}

/// Load the first config file found in `search_paths`, or the defaults if none exist
pub fn load(search_paths: &[PathBuf]) -> Result<Config> {
    for path in search_paths {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,

            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(file = %path.display(), "No scrapecast config here, trying the next path");
                continue;
            }

            Err(e) => {
                return Err(e).with_context(|| {
                    anyhow!("could not read the scrapecast config `{}`", path.display())
                });
            }
        };

        let mut cfg: Config = toml::from_str(&contents)
            .with_context(|| anyhow!("invalid scrapecast config `{}`", path.display()))?;

        if let Some(parent) = path.parent() {
            cfg.resolve_relative_paths(parent);
        }

        info!(file = %path.display(), "Loaded scrapecast config");

        return Ok(cfg);
    }

    info!("No scrapecast config found, using built-in defaults");

    Ok(Default::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn site_urls_are_derived_from_base_and_project() {
        let site = SiteConfig {
            base_url: "http://site".into(),
            project_id: "7".into(),
            ..Default::default()
        };

        assert_eq!(site.project_url(), "http://site/project/7");
        assert_eq!(site.listing_url(), "http://site/project/7/episodes");
        assert_eq!(site.detail_url("101"), "http://site/episode/101");
    }

    #[test]
    fn default_offset_is_nine_hours_east() {
        let site = SiteConfig::default();
        assert_eq!(site.utc_offset().local_minus_utc(), 9 * 3600);
    }

    #[test]
    fn out_of_range_offset_falls_back_to_utc() {
        let site = SiteConfig {
            utc_offset_minutes: 100_000,
            ..Default::default()
        };
        assert_eq!(site.utc_offset().local_minus_utc(), 0);
    }

    #[test]
    fn load_skips_missing_files_and_uses_defaults() {
        let dir = tempdir().unwrap();
        let cfg = load(&[dir.path().join("missing.toml")]).unwrap();

        assert!(cfg.notify.enabled);
        assert_eq!(cfg.selectors.listing_link, "a.link_thumb");
    }

    #[test]
    fn load_reads_partial_file_and_resolves_paths() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scrapecast.toml");
        std::fs::write(
            &path,
            r#"
[site]
project-id = "42"

[feed]
title = "My Feed"
categories = ["Comedy"]

[paths]
state = "state.json"
"#,
        )
        .unwrap();

        let cfg = load(&[path]).unwrap();

        assert_eq!(cfg.site.project_id, "42");
        assert_eq!(cfg.site.base_url, SiteConfig::default().base_url);
        assert_eq!(cfg.feed.title, "My Feed");
        assert_eq!(cfg.feed.categories, vec!["Comedy".to_string()]);
        assert_eq!(cfg.paths.state, dir.path().join("state.json"));
    }

    #[test]
    fn load_rejects_unknown_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scrapecast.toml");
        std::fs::write(&path, "[site]\nbogus = 1\n").unwrap();

        assert!(load(&[path]).is_err());
    }
}
