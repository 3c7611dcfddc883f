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

use crate::client::{EbirdClient, FetchError, Site};
use crate::notify::{NotifyError, SlackClient};
use crate::record::{self, AlertRow, RecordError, SheetClient};
use crate::watch::{SeenCache, WatchList};
use chrono::Utc;
use std::error;
use std::fmt;
use std::path::Path;

/// Most sightings alerted in one run. Anything past the cap stays out of the
/// seen cache and is picked up by a later run. Also keeps the alert message
/// within Slack's ceiling of 50 blocks.
pub const MAX_ALERTS_PER_RUN: usize = 50;

#[derive(Debug)]
pub enum RunError {
    Fetch(FetchError),
    Notify(NotifyError),
    Record(RecordError),
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch(e) => write!(f, "unable to fetch sightings: {}", e),
            Self::Notify(e) => write!(f, "unable to post chat message: {}", e),
            Self::Record(e) => write!(f, "unable to record sightings: {}", e),
        }
    }
}

impl error::Error for RunError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Fetch(e) => Some(e),
            Self::Notify(e) => Some(e),
            Self::Record(e) => Some(e),
        }
    }
}

impl From<FetchError> for RunError {
    fn from(e: FetchError) -> Self {
        Self::Fetch(e)
    }
}

impl From<NotifyError> for RunError {
    fn from(e: NotifyError) -> Self {
        Self::Notify(e)
    }
}

impl From<RecordError> for RunError {
    fn from(e: RecordError) -> Self {
        Self::Record(e)
    }
}

/// Counts from one completed run, for the final log line.
#[derive(Debug, Copy, Clone, Default)]
pub struct RunSummary {
    pub fetched: usize,
    pub matched: usize,
    pub alerted: usize,
}

/// Run the pipeline once: fetch, filter, drop already-alerted sightings,
/// notify, record.
///
/// The seen cache is only marked and saved after the chat post and the
/// spreadsheet append both succeed, so any failure leaves this run's
/// sightings as candidates for the next scheduled invocation. That makes a
/// retried run idempotent with respect to the sheet, at the cost of a
/// possible duplicate chat message when a failure lands between the post
/// and the cache write.
#[allow(clippy::too_many_arguments)]
pub async fn run_once(
    ebird: &EbirdClient,
    slack: &SlackClient,
    sheet: &SheetClient,
    site: &Site,
    watchlist: &WatchList,
    back_days: u32,
    csv_path: Option<&Path>,
    seen: &mut SeenCache,
) -> Result<RunSummary, RunError> {
    let sightings = ebird.recent_nearby(site, back_days).await?;
    tracing::info!(message = "fetched recent observations", site = %site.id, count = sightings.len());

    let matched = watchlist.filter(&sightings);
    let mut fresh = seen.novel(&site.id, &matched);
    tracing::info!(message = "checked sightings against watch-list", site = %site.id, matched = matched.len(), new = fresh.len());

    if fresh.len() > MAX_ALERTS_PER_RUN {
        tracing::warn!(message = "capping alerts for this run", new = fresh.len(), cap = MAX_ALERTS_PER_RUN);
        fresh.truncate(MAX_ALERTS_PER_RUN);
    }

    let summary = RunSummary {
        fetched: sightings.len(),
        matched: matched.len(),
        alerted: fresh.len(),
    };

    if fresh.is_empty() {
        slack.no_news().await?;
        return Ok(summary);
    }

    slack.alert(site, &fresh).await?;

    let now = Utc::now();
    let rows: Vec<AlertRow> = fresh.iter().map(|s| AlertRow::new(site, s, now)).collect();
    sheet.append(&rows).await?;
    if let Some(path) = csv_path {
        record::append_csv(path, &rows)?;
    }

    seen.mark(&site.id, &fresh);
    if let Err(e) = seen.save() {
        // The alerts were delivered and recorded; the worst case here is a
        // repeat alert next run.
        tracing::warn!(message = "unable to save seen cache", path = %seen.path().display(), error = %e);
    }

    Ok(summary)
}
