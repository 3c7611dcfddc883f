// ebird_alerter - Slack alerts for new eBird sightings near a site
//
// Copyright 2024 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use crate::client::{Sighting, Site};
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode, Url};
use serde::Serialize;
use std::error;
use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

#[derive(Debug)]
pub enum RecordError {
    Internal(reqwest::Error),
    Unexpected(StatusCode, Url),
    Io(io::Error),
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal(e) => write!(f, "{}", e),
            Self::Unexpected(status, url) => write!(f, "unexpected status {} for {}", status, url),
            Self::Io(e) => write!(f, "{}", e),
        }
    }
}

impl error::Error for RecordError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Internal(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

/// One spreadsheet row per alerted sighting. Field names follow the column
/// headers the receiving Apps Script expects.
#[derive(Serialize, Debug, Clone)]
pub struct AlertRow {
    pub ts: DateTime<Utc>,
    #[serde(rename = "siteId")]
    pub site_id: String,
    #[serde(rename = "siteName")]
    pub site_name: String,
    #[serde(rename = "comName")]
    pub com_name: String,
    #[serde(rename = "sciName")]
    pub sci_name: String,
    #[serde(rename = "locName")]
    pub loc_name: String,
    #[serde(rename = "obsDt")]
    pub obs_dt: String,
    pub lat: f64,
    pub lng: f64,
}

impl AlertRow {
    pub fn new(site: &Site, sighting: &Sighting, ts: DateTime<Utc>) -> Self {
        AlertRow {
            ts,
            site_id: site.id.clone(),
            site_name: site.name.clone(),
            com_name: sighting.com_name.clone(),
            sci_name: sighting.sci_name.clone(),
            loc_name: sighting.loc_name.clone(),
            obs_dt: sighting.obs_dt.clone(),
            lat: sighting.lat,
            lng: sighting.lng,
        }
    }
}

/// Client for the Google Apps Script webhook that appends rows to the
/// spreadsheet. The sheet is append-only from this side; rows are never
/// rewritten or deleted.
#[derive(Debug)]
pub struct SheetClient {
    client: Client,
    webhook_url: Url,
}

impl SheetClient {
    pub fn new(client: Client, webhook_url: &str) -> Self {
        SheetClient {
            client,
            webhook_url: Url::parse(webhook_url).expect("invalid spreadsheet webhook URL"),
        }
    }

    /// Append rows one POST at a time, stopping at the first failure. Rows
    /// before the failure stay in the sheet; the caller must not mark the
    /// batch as alerted unless every row landed.
    pub async fn append(&self, rows: &[AlertRow]) -> Result<(), RecordError> {
        for row in rows {
            tracing::debug!(message = "appending spreadsheet row", url = %self.webhook_url, species = %row.com_name);

            let res = self
                .client
                .post(self.webhook_url.clone())
                .json(row)
                .send()
                .await
                .map_err(RecordError::Internal)?;

            let status = res.status();
            if !status.is_success() {
                return Err(RecordError::Unexpected(status, self.webhook_url.clone()));
            }
        }

        Ok(())
    }
}

const CSV_HEADER: &str = "ts,siteId,siteName,comName,sciName,locName,obsDt,lat,lng";

/// Append rows to a local CSV file, writing the header when the file is
/// created. Mirrors the spreadsheet schema.
pub fn append_csv(path: &Path, rows: &[AlertRow]) -> Result<(), RecordError> {
    let new = !path.exists();
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(RecordError::Io)?;

    if new {
        writeln!(file, "{}", CSV_HEADER).map_err(RecordError::Io)?;
    }

    for row in rows {
        writeln!(
            file,
            "{},{},{},{},{},{},{},{},{}",
            row.ts.to_rfc3339(),
            csv_field(&row.site_id),
            csv_field(&row.site_name),
            csv_field(&row.com_name),
            csv_field(&row.sci_name),
            csv_field(&row.loc_name),
            csv_field(&row.obs_dt),
            row.lat,
            row.lng
        )
        .map_err(RecordError::Io)?;
    }

    Ok(())
}

/// Quote a field if it contains a separator, quote, or newline.
fn csv_field(value: &str) -> String {
    if value.contains(&[',', '"', '\n'][..]) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_owned()
    }
}
