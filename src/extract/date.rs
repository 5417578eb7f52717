// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};

use crate::error::ExtractError;

const DATETIME_FORMATS: &[&str] = &[
    "%Y.%m.%d %H:%M:%S",
    "%Y.%m.%d %H:%M",
    "%Y.%m.%d. %H:%M:%S",
    "%Y.%m.%d. %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y.%m.%d", "%Y.%m.%d.", "%Y-%m-%d", "%Y/%m/%d"];

/// Parse a publish date as printed on a detail page
///
/// Dates without a zone are taken to be local to `offset`; dates with one are converted to it.
pub fn parse_published(text: &str, offset: FixedOffset) -> Result<DateTime<FixedOffset>, ExtractError> {
    let text = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text).or_else(|_| DateTime::parse_from_rfc2822(text))
    {
        return Ok(dt.with_timezone(&offset));
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .and_then(|naive| naive.and_local_timezone(offset).single())
        .ok_or_else(|| ExtractError::InvalidDate {
            date_str: text.to_string(),
            reason: "unrecognized date format".to_string(),
        })
}

/// Parse an HTTP date header (RFC 2822 style) and convert it to `offset`
pub fn parse_http_date(text: &str, offset: FixedOffset) -> Result<DateTime<FixedOffset>, ExtractError> {
    DateTime::parse_from_rfc2822(text.trim())
        .map(|dt| dt.with_timezone(&offset))
        .map_err(|e| ExtractError::InvalidDate {
            date_str: text.to_string(),
            reason: e.to_string(),
        })
}
