// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;
use rss::extension::itunes::{
    self, ITunesCategoryBuilder, ITunesChannelExtensionBuilder, ITunesItemExtensionBuilder,
};
use rss::{
    CategoryBuilder, Channel, ChannelBuilder, EnclosureBuilder, GuidBuilder, ImageBuilder, Item,
    ItemBuilder,
};
use tracing::{debug, info};

use crate::atomic_write::StagedWrite;
use crate::config::FeedConfig;
use crate::error::FeedError;
use crate::store::Episode;

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// File name appended to rewritten enclosure URLs
const ENCLOSURE_FILE_NAME: &str = "episode.mp3";

/// Rewrite a stream URL into a path-only form under `redirect_base`
///
/// Podcast clients that infer the media type from the URL suffix choke on a trailing query
/// string, so `http://host/path?query` becomes `{redirect_base}/host/path_query/episode.mp3`.
/// URLs without a query are returned unchanged.
pub fn redirect_url(stream_url: &str, redirect_base: &str) -> String {
    let Some(rest) = stream_url
        .strip_prefix("http://")
        .or_else(|| stream_url.strip_prefix("https://"))
    else {
        return stream_url.to_string();
    };

    match rest.rsplit_once('?') {
        Some((path, query)) => format!(
            "{}/{}_{}/{}",
            redirect_base.trim_end_matches('/'),
            path,
            query,
            ENCLOSURE_FILE_NAME
        ),
        None => stream_url.to_string(),
    }
}

/// Renders stored episodes as an RSS 2.0 podcast feed
#[derive(Debug, Clone)]
pub struct FeedEmitter {
    feed: FeedConfig,
    project_url: String,
}

impl FeedEmitter {
    pub fn new(feed: FeedConfig, project_url: impl Into<String>) -> Self {
        Self {
            feed,
            project_url: project_url.into(),
        }
    }

    /// Render the feed document, one item per episode with a stream, in the given order
    pub fn render<'a>(
        &self,
        episodes: impl IntoIterator<Item = &'a Episode>,
    ) -> Result<String, FeedError> {
        let items: Vec<Item> = episodes
            .into_iter()
            .filter_map(|episode| self.item(episode))
            .collect();
        debug!(items = items.len(), "Rendering feed");

        let channel = self.channel(items);
        let xml = String::from_utf8(channel.pretty_write_to(Vec::new(), b' ', 2)?)?;

        if xml.starts_with("<?xml") {
            Ok(xml)
        } else {
            Ok(format!("{XML_DECLARATION}\n{xml}"))
        }
    }

    /// Render the feed next to `path` without replacing it yet
    pub(crate) fn stage<'a>(
        &self,
        episodes: impl IntoIterator<Item = &'a Episode>,
        path: &Path,
    ) -> Result<StagedWrite, FeedError> {
        let xml = self.render(episodes)?;
        StagedWrite::stage(path, xml.as_bytes()).map_err(|e| FeedError::WriteFailed {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Move a staged render over the feed file
    pub(crate) fn commit(staged: StagedWrite) -> Result<(), FeedError> {
        let path = staged.path().to_path_buf();
        staged.commit().map_err(|e| FeedError::WriteFailed {
            path: path.clone(),
            source: e,
        })?;

        info!(path = %path.display(), "Wrote feed");
        Ok(())
    }

    /// Render the feed and replace the file at `path` with it
    pub fn write<'a>(
        &self,
        episodes: impl IntoIterator<Item = &'a Episode>,
        path: &Path,
    ) -> Result<(), FeedError> {
        Self::commit(self.stage(episodes, path)?)
    }

    fn channel(&self, items: Vec<Item>) -> Channel {
        let feed = &self.feed;

        let itunes_categories = feed
            .categories
            .first()
            .map(|category| vec![ITunesCategoryBuilder::default().text(category.clone()).build()])
            .unwrap_or_default();

        let itunes_ext = ITunesChannelExtensionBuilder::default()
            .author(Some(feed.author.clone()))
            .subtitle(Some(feed.subtitle.clone()))
            .summary(Some(feed.subtitle.clone()))
            .image(Some(feed.logo_url.clone()).filter(|url| !url.is_empty()))
            .categories(itunes_categories)
            .explicit(Some("no".to_string()))
            .build();

        let image = Some(feed.logo_url.clone())
            .filter(|url| !url.is_empty())
            .map(|url| {
                ImageBuilder::default()
                    .url(url)
                    .title(feed.title.clone())
                    .link(self.project_url.clone())
                    .build()
            });

        let categories = feed
            .categories
            .iter()
            .map(|name| CategoryBuilder::default().name(name.clone()).build())
            .collect::<Vec<_>>();

        let namespaces: BTreeMap<String, String> =
            [("itunes".to_string(), itunes::NAMESPACE.to_string())].into();

        ChannelBuilder::default()
            .namespaces(namespaces)
            .title(feed.title.clone())
            .link(self.project_url.clone())
            .description(feed.subtitle.clone())
            .language(Some(feed.language.clone()))
            .copyright(Some(feed.copyright.clone()))
            .categories(categories)
            .image(image)
            .last_build_date(Some(Utc::now().to_rfc2822()))
            .generator(Some(format!("scrapecast {}", env!("CARGO_PKG_VERSION"))))
            .itunes_ext(Some(itunes_ext))
            .items(items)
            .build()
    }

    fn item(&self, episode: &Episode) -> Option<Item> {
        let stream = episode.stream.as_ref().filter(|stream| !stream.url.is_empty())?;

        let enclosure = EnclosureBuilder::default()
            .url(redirect_url(&stream.url, &self.feed.redirect_base_url))
            .length(stream.byte_length.clone())
            .mime_type(stream.content_type.clone())
            .build();

        let itunes_ext = ITunesItemExtensionBuilder::default()
            .author(Some(self.feed.author.clone()))
            .image(Some(episode.thumbnail_full_url.clone()))
            .explicit(Some("no".to_string()))
            .order(Some(episode.id.clone()))
            .build();

        Some(
            ItemBuilder::default()
                .title(Some(episode.title.clone()))
                .link(Some(episode.detail_page_url.clone()))
                .guid(Some(
                    GuidBuilder::default()
                        .value(episode.detail_page_url.clone())
                        .permalink(true)
                        .build(),
                ))
                .pub_date(episode.published_at.map(|dt| dt.to_rfc2822()))
                .enclosure(Some(enclosure))
                .itunes_ext(Some(itunes_ext))
                .build(),
        )
    }
}
