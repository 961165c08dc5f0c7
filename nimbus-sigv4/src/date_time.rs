/*
 * Copyright Nimbus Contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

//! SigV4 timestamp formatting (`yyyymmdd` and ISO 8601 basic format).

use chrono::{DateTime, Utc};
use std::time::SystemTime;

const DATE_FORMAT: &str = "%Y%m%d";
const DATE_TIME_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Formats a `SystemTime` as `yyyymmdd` for the credential scope.
pub(crate) fn format_date(time: SystemTime) -> String {
    let utc: DateTime<Utc> = time.into();
    utc.format(DATE_FORMAT).to_string()
}

/// Formats a `SystemTime` as `yyyymmddThhmmssZ` for `x-amz-date`.
pub(crate) fn format_date_time(time: SystemTime) -> String {
    let utc: DateTime<Utc> = time.into();
    utc.format(DATE_TIME_FORMAT).to_string()
}

#[cfg(test)]
pub(crate) mod test_parsers {
    use super::DATE_TIME_FORMAT;
    use chrono::{NaiveDateTime, TimeZone, Utc};
    use std::time::SystemTime;

    pub(crate) fn parse_date_time(date_time: &str) -> SystemTime {
        let naive = NaiveDateTime::parse_from_str(date_time, DATE_TIME_FORMAT)
            .expect("valid test timestamp");
        Utc.from_utc_datetime(&naive).into()
    }
}
