// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use tracing::{Instrument, error, info, info_span};

use crate::config::Config;
use crate::error::RunError;
use crate::extract::parse_listing;
use crate::feed::FeedEmitter;
use crate::http::HttpClient;
use crate::notify::{notify_change, read_token};
use crate::store::{EpisodeStore, Restored};

/// Options for a single scrape run
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Send change notifications (also requires `notify.enabled` in the config)
    pub notify: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self { notify: true }
    }
}

/// Result of a scrape run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Episodes in the store after the run
    pub total_episodes: usize,
    /// Episodes written to the feed
    pub renderable_episodes: usize,
    /// Ids discovered by this run
    pub new_episodes: Vec<String>,
    /// Stored ids whose pending enrichment succeeded this run
    pub re_enriched: Vec<String>,
    /// Episodes whose enrichment failed (id, error message)
    pub failed_episodes: Vec<(String, String)>,
    /// Saved state was missing or unusable and the run started empty
    pub started_fresh: bool,
    /// Cache purge and directory ping were sent
    pub notified: bool,
}

/// Scrape the listing, update the store, and publish the feed
///
/// This is the main entry point for the library. It:
/// 1. Reads the purge token (when notifying), so a missing token fails before any write
/// 2. Restores the episode store saved by the previous run
/// 3. Fetches and parses the listing page
/// 4. Merges the listing into the store, enriching new and previously failed episodes
/// 5. Stages the feed, saves the store, then replaces the feed
/// 6. Purges the cache and pings the directory if episodes were added or completed
pub async fn run<C: HttpClient>(
    client: &C,
    config: &Config,
    options: &RunOptions,
) -> Result<RunSummary, RunError> {
    let token = if options.notify && config.notify.enabled {
        Some(read_token(&config.paths.token)?)
    } else {
        None
    };

    let restored = EpisodeStore::restore(
        &config.paths.state,
        config.site.clone(),
        config.selectors.clone(),
    );
    let started_fresh = !matches!(restored, Restored::Loaded(_));
    let mut store = restored.into_store();

    let listing_url = config.site.listing_url();
    let listing = client
        .get_bytes(&listing_url, config.site.max_body_bytes)
        .instrument(info_span!("listing", url = %listing_url))
        .await
        .inspect_err(|e| {
            error!(stage = "listing", url = %listing_url, error = %e, "Listing fetch failed")
        })
        .map_err(RunError::Listing)?;
    let candidates = parse_listing(&String::from_utf8_lossy(&listing), &config.selectors)?;
    info!(
        stage = "listing",
        url = %listing_url,
        candidates = candidates.len(),
        "Fetched listing"
    );

    let report = store.merge_candidates(client, &candidates).await;

    // Nothing is replaced until both outputs are known to be writable
    let emitter = FeedEmitter::new(config.feed.clone(), config.site.project_url());
    let staged_feed = emitter.stage(store.renderable_episodes(), &config.paths.feed)?;
    store.persist(&config.paths.state)?;
    FeedEmitter::commit(staged_feed)?;

    let feed_changed = store.changed() || !report.re_enriched.is_empty();
    let mut notified = false;
    if feed_changed {
        match token {
            Some(token) => {
                info!(
                    new = report.inserted.len(),
                    re_enriched = report.re_enriched.len(),
                    "Episode store changed, sending notifications"
                );
                notify_change(client, &config.notify, &token).await?;
                notified = true;
            }
            None => info!("Episode store changed, notifications disabled"),
        }
    }

    let summary = RunSummary {
        total_episodes: store.len(),
        renderable_episodes: store.renderable_episodes().count(),
        new_episodes: report.inserted,
        re_enriched: report.re_enriched,
        failed_episodes: report.failed,
        started_fresh,
        notified,
    };

    info!(
        total = summary.total_episodes,
        renderable = summary.renderable_episodes,
        new = summary.new_episodes.len(),
        failed = summary.failed_episodes.len(),
        notified,
        "Run complete"
    );

    Ok(summary)
}
