// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;

use tracing::info;

use crate::config::NotifyConfig;
use crate::error::NotifyError;
use crate::http::HttpClient;

/// The directory answers with a page we never look at
const PING_MAX_BYTES: usize = 64 * 1024;

/// Read the cache purge token: the first line of `path`, trimmed
pub fn read_token(path: &Path) -> Result<String, NotifyError> {
    let contents = std::fs::read_to_string(path).map_err(|e| NotifyError::TokenReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;

    let token = contents.lines().next().unwrap_or_default().trim();
    if token.is_empty() {
        return Err(NotifyError::EmptyToken(path.to_path_buf()));
    }

    Ok(token.to_string())
}

/// Purge the cached feed, wait, then ask the podcast directory to refresh
///
/// The first failing request aborts; nothing is retried.
pub async fn notify_change<C: HttpClient>(
    client: &C,
    config: &NotifyConfig,
    token: &str,
) -> Result<(), NotifyError> {
    purge_cache(client, config, token).await?;

    tokio::time::sleep(config.pause()).await;

    ping_directory(client, config).await
}

async fn purge_cache<C: HttpClient>(
    client: &C,
    config: &NotifyConfig,
    token: &str,
) -> Result<(), NotifyError> {
    info!(url = %config.purge_url, target = %config.feed_url, "Purging cached feed");

    let fields = [
        ("a", "zone_file_purge"),
        ("tkn", token),
        ("email", config.purge_email.as_str()),
        ("z", config.purge_domain.as_str()),
        ("url", config.feed_url.as_str()),
    ];

    client
        .post_form(&config.purge_url, &fields)
        .await
        .map_err(NotifyError::PurgeFailed)
}

async fn ping_directory<C: HttpClient>(client: &C, config: &NotifyConfig) -> Result<(), NotifyError> {
    info!(url = %config.directory_ping_url, "Pinging podcast directory");

    client
        .get_bytes(&config.directory_ping_url, PING_MAX_BYTES)
        .await
        .map(|_| ())
        .map_err(NotifyError::PingFailed)
}
