// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod atomic_write;
pub mod config;
pub mod error;
pub mod extract;
pub mod feed;
pub mod http;
pub mod notify;
pub mod run;
pub mod store;

// Re-export main types for convenience
pub use config::Config;
pub use error::{EnrichError, ExtractError, FeedError, HttpError, NotifyError, RunError, StoreError};
pub use extract::{Candidate, parse_detail, parse_listing};
pub use feed::{FeedEmitter, redirect_url};
pub use http::{HeaderFields, HttpClient, ReqwestClient};
pub use run::{RunOptions, RunSummary, run};
pub use store::{Episode, EpisodeStore, MergeReport, Restored, Stream};
