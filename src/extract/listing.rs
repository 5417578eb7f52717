// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use crate::config::Selectors;
use crate::error::ExtractError;

use super::selector;

/// An entry of the listing page, not yet known to be new
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub id: String,
    pub title: String,
    pub thumbnail_url: String,
}

/// Extract episode candidates from the listing page, in page order
///
/// Entries lacking a link, title or thumbnail are logged and skipped.
pub fn parse_listing(html: &str, selectors: &Selectors) -> Result<Vec<Candidate>, ExtractError> {
    let document = Html::parse_document(html);
    let link_selector = selector(&selectors.listing_link)?;
    let title_selector = selector(&selectors.listing_title)?;
    let thumbnail_selector = selector(&selectors.listing_thumbnail)?;

    let mut candidates = Vec::new();

    for link in document.select(&link_selector) {
        match parse_candidate(
            link,
            &title_selector,
            &thumbnail_selector,
            &selectors.episode_path_prefix,
        ) {
            Some(candidate) => candidates.push(candidate),
            None => warn!(html = %link.html(), "Skipping malformed listing entry"),
        }
    }

    debug!(count = candidates.len(), "Parsed listing page");

    Ok(candidates)
}

fn parse_candidate(
    link: ElementRef<'_>,
    title_selector: &Selector,
    thumbnail_selector: &Selector,
    path_prefix: &str,
) -> Option<Candidate> {
    let href = link.value().attr("href")?;
    let id = href.replace(path_prefix, "").trim().to_string();
    if id.is_empty() {
        return None;
    }

    let title = link
        .select(title_selector)
        .next()?
        .text()
        .collect::<String>()
        .trim()
        .to_string();

    let thumbnail_url = link
        .select(thumbnail_selector)
        .next()?
        .value()
        .attr("src")?
        .to_string();

    Some(Candidate {
        id,
        title,
        thumbnail_url,
    })
}

/// Strip the resizing proxy from a thumbnail URL, keeping the wrapped image URL
pub fn full_size_thumbnail(thumbnail_url: &str) -> String {
    match thumbnail_url.rfind("fname=") {
        Some(pos) => thumbnail_url[pos + "fname=".len()..].to_string(),
        None => thumbnail_url.to_string(),
    }
}
