// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod date;
mod detail;
mod listing;

pub use date::{parse_http_date, parse_published};
pub use detail::{DetailPage, parse_detail};
pub use listing::{Candidate, full_size_thumbnail, parse_listing};

use scraper::Selector;

use crate::error::ExtractError;

fn selector(css: &str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|e| ExtractError::InvalidSelector {
        selector: css.to_string(),
        reason: e.to_string(),
    })
}
