// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the HTTP transport
#[derive(Error, Debug)]
pub enum HttpError {
    #[error("HTTP request failed for {url}: {source}")]
    RequestFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Failed to read response body from {url}: {source}")]
    BodyFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl HttpError {
    /// The URL of the failed request
    pub fn url(&self) -> &str {
        match self {
            Self::RequestFailed { url, .. } | Self::Status { url, .. } | Self::BodyFailed { url, .. } => {
                url
            }
        }
    }
}

/// Errors that can occur while pulling fields out of page markup
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Invalid CSS selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("No element matches '{selector}'")]
    MissingElement { selector: String },

    #[error("No date text follows '{selector}'")]
    MissingDateText { selector: String },

    #[error("Failed to parse date '{date_str}': {reason}")]
    InvalidDate { date_str: String, reason: String },
}

/// Errors that can occur while enriching a single episode
#[derive(Error, Debug)]
pub enum EnrichError {
    #[error("Failed to fetch detail page: {0}")]
    DetailFetch(#[source] HttpError),

    #[error("Failed to fetch stream headers: {0}")]
    StreamHeaders(#[source] HttpError),

    #[error("Failed to parse detail page: {0}")]
    Extract(#[from] ExtractError),

    #[error("Stream {url} did not send a {header} header")]
    MissingHeader { url: String, header: &'static str },

    #[error("Stream {url} sent an unusable Last-Modified header: {source}")]
    InvalidLastModified {
        url: String,
        #[source]
        source: ExtractError,
    },
}

impl EnrichError {
    /// Which request the failure belongs to: `"detail"` or `"stream"`
    pub fn stage(&self) -> &'static str {
        match self {
            Self::DetailFetch(_) | Self::Extract(_) => "detail",
            Self::StreamHeaders(_) | Self::MissingHeader { .. } | Self::InvalidLastModified { .. } => {
                "stream"
            }
        }
    }

    /// The stream URL, for failures past the detail page
    pub fn stream_url(&self) -> Option<&str> {
        match self {
            Self::StreamHeaders(e) => Some(e.url()),
            Self::MissingHeader { url, .. } | Self::InvalidLastModified { url, .. } => Some(url),
            Self::DetailFetch(_) | Self::Extract(_) => None,
        }
    }
}

/// Errors that can occur when saving or restoring the episode store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to read state file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write state file {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse state JSON: {0}")]
    JsonParseFailed(#[source] serde_json::Error),

    #[error("Unsupported state version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("Failed to serialize state: {0}")]
    JsonSerializeFailed(#[from] serde_json::Error),
}

/// Errors that can occur when rendering or writing the podcast feed
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Failed to render feed: {0}")]
    RenderFailed(#[from] rss::Error),

    #[error("Rendered feed is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("Failed to write feed file {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that can occur while sending change notifications
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Failed to read token file {path}: {source}")]
    TokenReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Token file {0} is empty")]
    EmptyToken(PathBuf),

    #[error("Cache purge failed: {0}")]
    PurgeFailed(#[source] HttpError),

    #[error("Directory ping failed: {0}")]
    PingFailed(#[source] HttpError),
}

/// Top-level errors for a scrape run
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Failed to fetch listing page: {0}")]
    Listing(#[source] HttpError),

    #[error("Failed to parse listing page: {0}")]
    Extract(#[from] ExtractError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),
}
