// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;

use crate::error::HttpError;

/// Response headers keyed by lowercased name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderFields(HashMap<String, String>);

impl HeaderFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.0.insert(name.to_ascii_lowercase(), value.into());
    }

    /// Look up a header, ignoring case
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for HeaderFields {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        let mut fields = Self::new();
        for (name, value) in iter {
            fields.insert(name, value);
        }
        fields
    }
}

/// HTTP client abstraction for testability
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Fetch a response body, keeping at most `max_bytes` of it
    async fn get_bytes(&self, url: &str, max_bytes: usize) -> Result<Bytes, HttpError>;

    /// Issue a HEAD request and return the response headers
    async fn head(&self, url: &str) -> Result<HeaderFields, HttpError>;

    /// POST an urlencoded form, discarding the response body
    async fn post_form(&self, url: &str, fields: &[(&str, &str)]) -> Result<(), HttpError>;
}

/// Default HTTP client implementation using reqwest
#[derive(Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Create a new ReqwestClient with default settings
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Create a new ReqwestClient with a custom reqwest::Client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestClient {
    fn default() -> Self {
        Self::new()
    }
}

fn check_status(url: &str, response: &reqwest::Response) -> Result<(), HttpError> {
    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        return Err(HttpError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(())
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get_bytes(&self, url: &str, max_bytes: usize) -> Result<Bytes, HttpError> {
        let response =
            self.client
                .get(url)
                .send()
                .await
                .map_err(|e| HttpError::RequestFailed {
                    url: url.to_string(),
                    source: e,
                })?;
        check_status(url, &response)?;

        let mut body = BytesMut::new();
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| HttpError::BodyFailed {
                url: url.to_string(),
                source: e,
            })?;

            let remaining = max_bytes - body.len();
            body.extend_from_slice(&chunk[..chunk.len().min(remaining)]);

            if body.len() >= max_bytes {
                tracing::debug!(%url, max_bytes, "Response body truncated");
                break;
            }
        }

        Ok(body.freeze())
    }

    async fn head(&self, url: &str) -> Result<HeaderFields, HttpError> {
        let response =
            self.client
                .head(url)
                .send()
                .await
                .map_err(|e| HttpError::RequestFailed {
                    url: url.to_string(),
                    source: e,
                })?;
        check_status(url, &response)?;

        let mut fields = HeaderFields::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                fields.insert(name.as_str(), value);
            }
        }

        Ok(fields)
    }

    async fn post_form(&self, url: &str, fields: &[(&str, &str)]) -> Result<(), HttpError> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();

        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| HttpError::RequestFailed {
                url: url.to_string(),
                source: e,
            })?;

        check_status(url, &response)
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use std::sync::Mutex;

    use super::*;

    /// A canned response for [`MockHttpClient`]
    #[derive(Debug, Clone)]
    pub enum MockResponse {
        Body(String),
        Headers(HeaderFields),
        Status(u16),
    }

    /// Replays canned responses per URL and records every request
    #[derive(Default)]
    pub struct MockHttpClient {
        responses: HashMap<String, MockResponse>,
        requests: Mutex<Vec<String>>,
    }

    impl MockHttpClient {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_body(mut self, url: &str, body: &str) -> Self {
            self.responses
                .insert(url.to_string(), MockResponse::Body(body.to_string()));
            self
        }

        pub fn with_headers(mut self, url: &str, headers: &[(&str, &str)]) -> Self {
            self.responses.insert(
                url.to_string(),
                MockResponse::Headers(headers.iter().copied().collect()),
            );
            self
        }

        pub fn with_status(mut self, url: &str, status: u16) -> Self {
            self.responses
                .insert(url.to_string(), MockResponse::Status(status));
            self
        }

        /// Requests seen so far, formatted as `METHOD url`
        pub fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }

        pub fn count(&self, request: &str) -> usize {
            self.requests().iter().filter(|r| *r == request).count()
        }

        fn respond(&self, method: &str, url: &str) -> Result<&MockResponse, HttpError> {
            self.requests
                .lock()
                .unwrap()
                .push(format!("{method} {url}"));

            match self.responses.get(url) {
                Some(MockResponse::Status(status)) => Err(HttpError::Status {
                    url: url.to_string(),
                    status: *status,
                }),
                Some(response) => Ok(response),
                None => Err(HttpError::Status {
                    url: url.to_string(),
                    status: 404,
                }),
            }
        }
    }

    #[async_trait]
    impl HttpClient for MockHttpClient {
        async fn get_bytes(&self, url: &str, max_bytes: usize) -> Result<Bytes, HttpError> {
            match self.respond("GET", url)? {
                MockResponse::Body(body) => {
                    let body = body.as_bytes();
                    Ok(Bytes::copy_from_slice(&body[..body.len().min(max_bytes)]))
                }
                _ => Ok(Bytes::new()),
            }
        }

        async fn head(&self, url: &str) -> Result<HeaderFields, HttpError> {
            match self.respond("HEAD", url)? {
                MockResponse::Headers(headers) => Ok(headers.clone()),
                _ => Ok(HeaderFields::new()),
            }
        }

        async fn post_form(&self, url: &str, _fields: &[(&str, &str)]) -> Result<(), HttpError> {
            self.respond("POST", url).map(|_| ())
        }
    }
}
