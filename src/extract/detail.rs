// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use scraper::{ElementRef, Html};

use crate::config::Selectors;
use crate::error::ExtractError;

use super::selector;

/// Raw fields scraped from an episode's detail page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailPage {
    /// Publish date text as printed next to the date marker
    pub published_raw: String,
    /// Source of the first audio element, if the page has one
    pub stream_url: Option<String>,
}

pub fn parse_detail(html: &str, selectors: &Selectors) -> Result<DetailPage, ExtractError> {
    let document = Html::parse_document(html);
    let marker_selector = selector(&selectors.detail_date_marker)?;
    let audio_selector = selector(&selectors.detail_audio)?;
    let source_selector = selector("source")?;

    let marker = document
        .select(&marker_selector)
        .next()
        .ok_or_else(|| ExtractError::MissingElement {
            selector: selectors.detail_date_marker.clone(),
        })?;

    let published_raw = marker
        .next_siblings()
        .find_map(|node| {
            let text = match node.value().as_text() {
                Some(text) => text.trim().to_string(),
                None => ElementRef::wrap(node)?
                    .text()
                    .collect::<String>()
                    .trim()
                    .to_string(),
            };
            (!text.is_empty()).then_some(text)
        })
        .ok_or_else(|| ExtractError::MissingDateText {
            selector: selectors.detail_date_marker.clone(),
        })?;

    // <audio src> or <audio><source src></audio>
    let stream_url = document.select(&audio_selector).next().and_then(|audio| {
        audio
            .value()
            .attr("src")
            .or_else(|| {
                audio
                    .select(&source_selector)
                    .find_map(|source| source.value().attr("src"))
            })
            .map(str::trim)
            .filter(|src| !src.is_empty())
            .map(String::from)
    });

    Ok(DetailPage {
        published_raw,
        stream_url,
    })
}
