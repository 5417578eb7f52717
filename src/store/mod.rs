// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod persist;

pub use persist::{Restored, STATE_VERSION};

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{Selectors, SiteConfig};
use crate::error::EnrichError;
use crate::extract::{
    Candidate, full_size_thumbnail, parse_detail, parse_http_date, parse_published,
};
use crate::http::HttpClient;

/// The audio attached to an episode, with the headers its host reported
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stream {
    pub url: String,
    pub content_type: String,
    pub byte_length: String,
    pub last_modified_at: DateTime<FixedOffset>,
}

/// A discovered episode
///
/// `id`, `title`, the thumbnails and `detail_page_url` come from the listing page and never
/// change once stored. The rest is filled in by enrichment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    pub id: String,
    pub title: String,
    pub thumbnail_url: String,
    pub thumbnail_full_url: String,
    pub detail_page_url: String,
    pub enriched: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub stream: Option<Stream>,
}

impl Episode {
    fn discovered(candidate: &Candidate, site: &SiteConfig) -> Self {
        Self {
            id: candidate.id.clone(),
            title: candidate.title.clone(),
            thumbnail_url: candidate.thumbnail_url.clone(),
            thumbnail_full_url: full_size_thumbnail(&candidate.thumbnail_url),
            detail_page_url: site.detail_url(&candidate.id),
            enriched: false,
            published_at: None,
            stream: None,
        }
    }

    /// The original stream URL, empty when the episode has no audio
    pub fn stream_url(&self) -> &str {
        self.stream.as_ref().map_or("", |stream| stream.url.as_str())
    }

    pub fn is_renderable(&self) -> bool {
        !self.stream_url().is_empty()
    }
}

/// Outcome of merging one listing into the store
#[derive(Debug, Clone, Default)]
pub struct MergeReport {
    /// Ids inserted by this merge, in insertion order
    pub inserted: Vec<String>,
    /// Previously stored ids whose pending enrichment succeeded
    pub re_enriched: Vec<String>,
    /// Candidates already known and enriched
    pub skipped: usize,
    /// Episodes whose enrichment failed (id, error message)
    pub failed: Vec<(String, String)>,
}

/// Ordered, deduplicated collection of episodes for one run
#[derive(Debug, Clone)]
pub struct EpisodeStore {
    episodes: Vec<Episode>,
    index: HashMap<String, usize>,
    changed: bool,
    site: SiteConfig,
    selectors: Selectors,
}

impl EpisodeStore {
    pub fn new(site: SiteConfig, selectors: Selectors) -> Self {
        Self {
            episodes: Vec::new(),
            index: HashMap::new(),
            changed: false,
            site,
            selectors,
        }
    }

    fn with_episodes(episodes: Vec<Episode>, site: SiteConfig, selectors: Selectors) -> Self {
        let mut store = Self::new(site, selectors);
        for episode in episodes {
            if store.index.contains_key(&episode.id) {
                warn!(episode = %episode.id, "Dropping duplicate episode from saved state");
                continue;
            }
            store.insert(episode);
        }
        store
    }

    fn insert(&mut self, episode: Episode) {
        self.index.insert(episode.id.clone(), self.episodes.len());
        self.episodes.push(episode);
    }

    pub fn len(&self) -> usize {
        self.episodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Episode> {
        self.index.get(id).map(|&pos| &self.episodes[pos])
    }

    /// All episodes in discovery order
    pub fn episodes(&self) -> &[Episode] {
        &self.episodes
    }

    /// Whether the last merge inserted any episode
    pub fn changed(&self) -> bool {
        self.changed
    }

    /// Episodes with an audio stream, in discovery order
    pub fn renderable_episodes(&self) -> impl Iterator<Item = &Episode> + Clone + '_ {
        self.episodes.iter().filter(|episode| episode.is_renderable())
    }

    /// Merge listing candidates into the store, in listing order
    ///
    /// Unknown ids are enriched and appended. Known ids are left untouched, except that an
    /// episode whose earlier enrichment failed is enriched again. A failing episode never
    /// stops the rest of the batch.
    pub async fn merge_candidates<C: HttpClient>(
        &mut self,
        client: &C,
        candidates: &[Candidate],
    ) -> MergeReport {
        self.changed = false;

        let mut report = MergeReport::default();
        let mut attempted = HashSet::new();

        for candidate in candidates {
            if !attempted.insert(candidate.id.as_str()) {
                debug!(episode = %candidate.id, "Duplicate candidate in listing, ignoring");
                continue;
            }

            let pos = match self.index.get(&candidate.id).copied() {
                Some(pos) => pos,
                None => {
                    self.insert_new(client, candidate, &mut report).await;
                    continue;
                }
            };

            if self.episodes[pos].enriched {
                report.skipped += 1;
                continue;
            }

            let mut episode = self.episodes[pos].clone();
            match self.enrich(client, &mut episode).await {
                Ok(()) => {
                    info!(episode = %episode.id, "Enriched previously pending episode");
                    report.re_enriched.push(episode.id.clone());
                    self.episodes[pos] = episode;
                }
                Err(e) => {
                    warn!(
                        episode = %episode.id,
                        stage = e.stage(),
                        url = %failed_url(&e, &episode),
                        error = %e,
                        "Enrichment retry failed"
                    );
                    report.failed.push((episode.id.clone(), e.to_string()));
                }
            }
        }

        report
    }

    async fn insert_new<C: HttpClient>(
        &mut self,
        client: &C,
        candidate: &Candidate,
        report: &mut MergeReport,
    ) {
        let mut episode = Episode::discovered(candidate, &self.site);
        if let Err(e) = self.enrich(client, &mut episode).await {
            warn!(
                episode = %episode.id,
                stage = e.stage(),
                url = %failed_url(&e, &episode),
                error = %e,
                "Enrichment failed, will retry on next run"
            );
            report.failed.push((episode.id.clone(), e.to_string()));
        }

        info!(episode = %episode.id, title = %episode.title, "New episode");
        report.inserted.push(episode.id.clone());
        self.insert(episode);
        self.changed = true;
    }

    /// Fetch the detail page (and stream headers, if the page has audio) for an episode
    ///
    /// The episode is only modified when every field was obtained.
    pub async fn enrich<C: HttpClient>(
        &self,
        client: &C,
        episode: &mut Episode,
    ) -> Result<(), EnrichError> {
        let offset = self.site.utc_offset();

        debug!(episode = %episode.id, url = %episode.detail_page_url, "Fetching detail page");
        let body = client
            .get_bytes(&episode.detail_page_url, self.site.max_body_bytes)
            .await
            .map_err(EnrichError::DetailFetch)?;

        let page = parse_detail(&String::from_utf8_lossy(&body), &self.selectors)?;
        let published_at = parse_published(&page.published_raw, offset)?;

        let stream = match page.stream_url {
            Some(url) => Some(fetch_stream(client, url, offset).await?),
            None => {
                debug!(episode = %episode.id, "Detail page has no audio");
                None
            }
        };

        episode.published_at = Some(published_at);
        episode.stream = stream;
        episode.enriched = true;

        Ok(())
    }
}

/// The URL of the request that failed, for logging
fn failed_url<'a>(error: &'a EnrichError, episode: &'a Episode) -> &'a str {
    error.stream_url().unwrap_or(&episode.detail_page_url)
}

async fn fetch_stream<C: HttpClient>(
    client: &C,
    url: String,
    offset: FixedOffset,
) -> Result<Stream, EnrichError> {
    debug!(%url, "Fetching stream headers");
    let headers = client.head(&url).await.map_err(EnrichError::StreamHeaders)?;

    let header = |name: &'static str| {
        headers
            .get(name)
            .map(String::from)
            .ok_or_else(|| EnrichError::MissingHeader {
                url: url.clone(),
                header: name,
            })
    };

    let content_type = header("Content-Type")?;
    let byte_length = header("Content-Length")?;
    let last_modified_at = parse_http_date(&header("Last-Modified")?, offset).map_err(|e| {
        EnrichError::InvalidLastModified {
            url: url.clone(),
            source: e,
        }
    })?;

    Ok(Stream {
        url,
        content_type,
        byte_length,
        last_modified_at,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::http::mock::MockHttpClient;

    pub(crate) const LAST_MODIFIED: &str = "Fri, 27 Feb 2015 01:00:00 GMT";

    pub(crate) fn site() -> SiteConfig {
        SiteConfig {
            base_url: "http://site".into(),
            project_id: "1".into(),
            ..Default::default()
        }
    }

    pub(crate) fn store() -> EpisodeStore {
        EpisodeStore::new(site(), Selectors::default())
    }

    pub(crate) fn candidate(id: &str, title: &str) -> Candidate {
        Candidate {
            id: id.into(),
            title: title.into(),
            thumbnail_url: format!("http://x/{id}.jpg?ignored"),
        }
    }

    pub(crate) fn detail_html(stream_url: Option<&str>) -> String {
        let audio = stream_url
            .map(|url| format!(r#"<audio src="{url}"></audio>"#))
            .unwrap_or_default();
        format!(r#"<p><span class="txt_bar">|</span>2015.02.27 10:30</p>{audio}"#)
    }

    /// Mock serving detail pages for `ids`, each with a stream at `http://cdn/{id}?sig=abc`
    pub(crate) fn client_with_streams(ids: &[&str]) -> MockHttpClient {
        ids.iter().fold(MockHttpClient::new(), |client, id| {
            let stream = format!("http://cdn/{id}?sig=abc");
            client
                .with_body(
                    &format!("http://site/episode/{id}"),
                    &detail_html(Some(&stream)),
                )
                .with_headers(
                    &stream,
                    &[
                        ("Content-Type", "audio/mpeg"),
                        ("Content-Length", "123"),
                        ("Last-Modified", LAST_MODIFIED),
                    ],
                )
        })
    }

    fn ids(store: &EpisodeStore) -> Vec<&str> {
        store.episodes().iter().map(|e| e.id.as_str()).collect()
    }

    #[tokio::test]
    async fn merge_enriches_new_episode() {
        let client = client_with_streams(&["101"]);
        let mut store = store();

        let report = store
            .merge_candidates(&client, &[candidate("101", "A")])
            .await;

        assert!(store.changed());
        assert_eq!(report.inserted, vec!["101".to_string()]);
        assert!(report.failed.is_empty());

        let episode = store.get("101").unwrap();
        assert!(episode.enriched);
        assert_eq!(episode.title, "A");
        assert_eq!(episode.detail_page_url, "http://site/episode/101");
        assert_eq!(episode.thumbnail_full_url, "http://x/101.jpg?ignored");
        assert_eq!(
            episode.published_at.unwrap().to_rfc3339(),
            "2015-02-27T10:30:00+09:00"
        );

        let stream = episode.stream.as_ref().unwrap();
        assert_eq!(stream.url, "http://cdn/101?sig=abc");
        assert_eq!(stream.content_type, "audio/mpeg");
        assert_eq!(stream.byte_length, "123");
        assert_eq!(stream.last_modified_at.to_rfc3339(), "2015-02-27T10:00:00+09:00");
    }

    #[tokio::test]
    async fn merging_same_candidates_twice_is_idempotent() {
        let client = client_with_streams(&["101", "102"]);
        let mut store = store();
        let candidates = [candidate("101", "A"), candidate("102", "B")];

        store.merge_candidates(&client, &candidates).await;
        let first = store.episodes().to_vec();
        assert!(store.changed());

        let report = store.merge_candidates(&client, &candidates).await;

        assert!(!store.changed());
        assert!(report.inserted.is_empty());
        assert_eq!(report.skipped, 2);
        assert_eq!(store.episodes(), first.as_slice());
        assert_eq!(client.count("GET http://site/episode/101"), 1);
        assert_eq!(client.count("HEAD http://cdn/101?sig=abc"), 1);
    }

    #[tokio::test]
    async fn merge_preserves_listing_order() {
        let client = client_with_streams(&["5", "3", "9"]);
        let mut store = store();

        store
            .merge_candidates(
                &client,
                &[candidate("5", "e"), candidate("3", "c"), candidate("9", "i")],
            )
            .await;

        assert_eq!(ids(&store), vec!["5", "3", "9"]);
    }

    #[tokio::test]
    async fn merge_appends_after_existing_episodes() {
        let client = client_with_streams(&["1", "2"]);
        let mut store = store();

        store.merge_candidates(&client, &[candidate("1", "a")]).await;
        store
            .merge_candidates(&client, &[candidate("2", "b"), candidate("1", "a")])
            .await;

        assert!(store.changed());
        assert_eq!(ids(&store), vec!["1", "2"]);
    }

    #[tokio::test]
    async fn repeated_id_keeps_first_occurrence() {
        let client = client_with_streams(&["7"]);
        let mut store = store();

        store
            .merge_candidates(&client, &[candidate("7", "first"), candidate("7", "second")])
            .await;

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("7").unwrap().title, "first");
        assert_eq!(client.count("GET http://site/episode/7"), 1);
    }

    #[tokio::test]
    async fn existing_listing_fields_are_authoritative() {
        let client = client_with_streams(&["7"]);
        let mut store = store();

        store.merge_candidates(&client, &[candidate("7", "old")]).await;
        store.merge_candidates(&client, &[candidate("7", "new")]).await;

        assert_eq!(store.get("7").unwrap().title, "old");
    }

    #[tokio::test]
    async fn episode_without_audio_is_stored_but_not_renderable() {
        let client = client_with_streams(&["1"])
            .with_body("http://site/episode/2", &detail_html(None));
        let mut store = store();

        store
            .merge_candidates(&client, &[candidate("1", "a"), candidate("2", "b")])
            .await;

        let silent = store.get("2").unwrap();
        assert!(silent.enriched);
        assert_eq!(silent.stream_url(), "");
        assert!(silent.stream.is_none());

        let rendered: Vec<_> = store.renderable_episodes().map(|e| e.id.as_str()).collect();
        assert_eq!(rendered, vec!["1"]);
    }

    #[tokio::test]
    async fn renderable_episodes_can_be_iterated_again() {
        let client = client_with_streams(&["1", "2"]);
        let mut store = store();
        store
            .merge_candidates(&client, &[candidate("1", "a"), candidate("2", "b")])
            .await;

        let iter = store.renderable_episodes();
        assert_eq!(iter.clone().count(), 2);
        assert_eq!(iter.count(), 2);
    }

    #[tokio::test]
    async fn failed_enrichment_does_not_abort_batch() {
        let client = client_with_streams(&["1", "3"]).with_status("http://site/episode/2", 500);
        let mut store = store();

        let report = store
            .merge_candidates(
                &client,
                &[candidate("1", "a"), candidate("2", "b"), candidate("3", "c")],
            )
            .await;

        assert_eq!(ids(&store), vec!["1", "2", "3"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "2");

        let pending = store.get("2").unwrap();
        assert!(!pending.enriched);
        assert!(pending.published_at.is_none());
        assert!(store.get("3").unwrap().enriched);
    }

    #[tokio::test]
    async fn stream_header_failure_leaves_episode_pending() {
        let client = MockHttpClient::new()
            .with_body("http://site/episode/1", &detail_html(Some("http://cdn/gone")))
            .with_status("http://cdn/gone", 403);
        let mut store = store();

        let report = store.merge_candidates(&client, &[candidate("1", "a")]).await;

        let episode = store.get("1").unwrap();
        assert!(!episode.enriched);
        assert!(episode.stream.is_none());
        assert!(episode.published_at.is_none());
        assert_eq!(report.failed.len(), 1);
    }

    #[tokio::test]
    async fn missing_stream_header_fails_enrichment() {
        let client = MockHttpClient::new()
            .with_body("http://site/episode/1", &detail_html(Some("http://cdn/1")))
            .with_headers("http://cdn/1", &[("Content-Type", "audio/mpeg")]);
        let store = store();
        let mut episode = Episode::discovered(&candidate("1", "a"), &site());

        let result = store.enrich(&client, &mut episode).await;

        assert!(matches!(
            result,
            Err(EnrichError::MissingHeader {
                header: "Content-Length",
                ..
            })
        ));
        assert!(!episode.enriched);
    }

    #[tokio::test]
    async fn enrich_errors_name_the_failing_request() {
        let client = MockHttpClient::new()
            .with_body("http://site/episode/1", &detail_html(Some("http://cdn/1?sig=x")))
            .with_status("http://cdn/1?sig=x", 403)
            .with_status("http://site/episode/2", 500);
        let store = store();

        let mut first = Episode::discovered(&candidate("1", "a"), &site());
        let err = store.enrich(&client, &mut first).await.unwrap_err();
        assert_eq!(err.stage(), "stream");
        assert_eq!(failed_url(&err, &first), "http://cdn/1?sig=x");

        let mut second = Episode::discovered(&candidate("2", "b"), &site());
        let err = store.enrich(&client, &mut second).await.unwrap_err();
        assert_eq!(err.stage(), "detail");
        assert_eq!(failed_url(&err, &second), "http://site/episode/2");
    }

    #[tokio::test]
    async fn unparsable_last_modified_fails_at_stream_stage() {
        let client = MockHttpClient::new()
            .with_body("http://site/episode/1", &detail_html(Some("http://cdn/1")))
            .with_headers(
                "http://cdn/1",
                &[
                    ("Content-Type", "audio/mpeg"),
                    ("Content-Length", "123"),
                    ("Last-Modified", "yesterday"),
                ],
            );
        let mut episode = Episode::discovered(&candidate("1", "a"), &site());

        let result = store().enrich(&client, &mut episode).await;

        assert!(matches!(
            result,
            Err(EnrichError::InvalidLastModified { ref url, .. }) if url == "http://cdn/1"
        ));
        assert!(!episode.enriched);
    }

    #[tokio::test]
    async fn pending_episode_is_enriched_on_later_merge() {
        let failing = MockHttpClient::new().with_status("http://site/episode/1", 503);
        let mut store = store();
        store.merge_candidates(&failing, &[candidate("1", "a")]).await;
        assert!(!store.get("1").unwrap().enriched);

        let working = client_with_streams(&["1"]);
        let report = store.merge_candidates(&working, &[candidate("1", "a")]).await;

        assert!(!store.changed());
        assert_eq!(report.re_enriched, vec!["1".to_string()]);
        assert_eq!(store.len(), 1);
        assert!(store.get("1").unwrap().enriched);
        assert!(store.get("1").unwrap().is_renderable());
    }

    #[test]
    fn with_episodes_drops_duplicates() {
        let first = Episode::discovered(&candidate("1", "first"), &site());
        let second = Episode::discovered(&candidate("1", "second"), &site());

        let store = EpisodeStore::with_episodes(vec![first, second], site(), Selectors::default());

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("1").unwrap().title, "first");
        assert!(!store.changed());
    }
}
