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
use reqwest::{Client, StatusCode, Url};
use serde_json::{json, Value};
use std::error;
use std::fmt;

/// Message posted when a run finds nothing new.
pub const NO_NEWS_TEXT: &str = "No new sightings";

#[derive(Debug)]
pub enum NotifyError {
    Internal(reqwest::Error),
    Unexpected(StatusCode),
}

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal(e) => write!(f, "{}", e),
            Self::Unexpected(status) => write!(f, "unexpected status {} from chat webhook", status),
        }
    }
}

impl error::Error for NotifyError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Internal(e) => Some(e),
            _ => None,
        }
    }
}

/// Client for a Slack incoming webhook. Alerts are a single message per run
/// with one Block Kit section per sighting; the fixed [`NO_NEWS_TEXT`] notice
/// is sent when a run finds nothing new.
#[derive(Debug)]
pub struct SlackClient {
    client: Client,
    webhook_url: Url,
}

impl SlackClient {
    pub fn new(client: Client, webhook_url: &str) -> Self {
        SlackClient {
            client,
            webhook_url: Url::parse(webhook_url).expect("invalid chat webhook URL"),
        }
    }

    /// Post one message summarizing every new sighting.
    pub async fn alert(&self, site: &Site, sightings: &[&Sighting]) -> Result<(), NotifyError> {
        self.post(&alert_payload(site, sightings)).await
    }

    /// Post the fixed no-news notice.
    pub async fn no_news(&self) -> Result<(), NotifyError> {
        self.post(&json!({ "text": NO_NEWS_TEXT })).await
    }

    async fn post(&self, payload: &Value) -> Result<(), NotifyError> {
        tracing::debug!(message = "posting chat message", url = %self.webhook_url);

        let res = self
            .client
            .post(self.webhook_url.clone())
            .json(payload)
            .send()
            .await
            .map_err(NotifyError::Internal)?;

        let status = res.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(NotifyError::Unexpected(status))
        }
    }
}

fn alert_payload(site: &Site, sightings: &[&Sighting]) -> Value {
    let blocks: Vec<Value> = sightings.iter().map(|s| sighting_block(site, s)).collect();
    json!({
        "text": fallback_text(site, sightings),
        "blocks": blocks,
    })
}

/// Plain-text summary used as the notification fallback when a client cannot
/// render blocks.
fn fallback_text(site: &Site, sightings: &[&Sighting]) -> String {
    let species: Vec<&str> = sightings.iter().map(|s| s.com_name.as_str()).collect();
    format!(
        "{} new sighting(s) near {}: {}",
        sightings.len(),
        site.name,
        species.join(", ")
    )
}

// One block per sighting so a full run of 50 stays within Slack's block
// limit for a single message.
fn sighting_block(site: &Site, sighting: &Sighting) -> Value {
    json!({
        "type": "section",
        "text": {
            "type": "mrkdwn",
            "text": format!(
                "{}\n<{}|Open map>",
                summary_line(site, sighting),
                map_link(sighting)
            ),
        },
    })
}

fn summary_line(site: &Site, sighting: &Sighting) -> String {
    let count = sighting.how_many.map(|n| format!(" ({})", n)).unwrap_or_default();
    format!(
        ":bird: *{}*{} near *{}* — {} (obs {})",
        sighting.com_name, count, site.name, sighting.loc_name, sighting.obs_dt
    )
}

fn map_link(sighting: &Sighting) -> String {
    format!("https://www.google.com/maps?q={},{}", sighting.lat, sighting.lng)
}
