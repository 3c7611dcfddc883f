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

use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::error;
use std::fmt;

#[derive(Debug)]
pub enum FetchError {
    Internal(reqwest::Error),
    Auth(Url),
    Unexpected(StatusCode, Url),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal(e) => write!(f, "{}", e),
            Self::Auth(url) => write!(f, "API token rejected for {}", url),
            Self::Unexpected(status, url) => write!(f, "unexpected status {} for {}", status, url),
        }
    }
}

impl error::Error for FetchError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Internal(e) => Some(e),
            _ => None,
        }
    }
}

/// Location that sightings are fetched for: a center point, a radius, and
/// the names used for it in chat messages and spreadsheet rows.
#[derive(Debug, Clone)]
pub struct Site {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub radius_km: u32,
}

#[derive(Debug)]
pub struct EbirdClient {
    client: Client,
    base_url: Url,
    token: String,
}

impl EbirdClient {
    const USER_AGENT: &'static str = "ebird_alerter (https://github.com/56quarters/ebird_alerter)";
    const JSON_RESPONSE: &'static str = "application/json";
    const TOKEN_HEADER: &'static str = "X-eBirdApiToken";

    pub fn new(client: Client, base_url: &str, token: &str) -> Self {
        EbirdClient {
            client,
            base_url: Url::parse(base_url).expect("invalid eBird API base URL"),
            token: token.to_owned(),
        }
    }

    /// Fetch all observations reported within `site.radius_km` of the site
    /// center over the last `back_days` days. An empty list is a normal
    /// result, not an error.
    pub async fn recent_nearby(&self, site: &Site, back_days: u32) -> Result<Vec<Sighting>, FetchError> {
        let request_url = self.recent_nearby_url(site, back_days);
        tracing::debug!(message = "making recent observations request", url = %request_url);

        let res = self.make_request(request_url).await?;
        res.json::<Vec<Sighting>>().await.map_err(FetchError::Internal)
    }

    async fn make_request(&self, url: Url) -> Result<Response, FetchError> {
        let res = self
            .client
            .get(url.clone())
            .header(USER_AGENT, Self::USER_AGENT)
            .header(ACCEPT, Self::JSON_RESPONSE)
            .header(Self::TOKEN_HEADER, self.token.as_str())
            .send()
            .await
            .map_err(FetchError::Internal)?;

        let status = res.status();
        if status == StatusCode::OK {
            Ok(res)
        } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            Err(FetchError::Auth(url))
        } else {
            Err(FetchError::Unexpected(status, url))
        }
    }

    fn recent_nearby_url(&self, site: &Site, back_days: u32) -> Url {
        let mut url = self.base_url.clone();
        {
            url.path_segments_mut()
                .map(|mut p| {
                    p.clear().push("v2").push("data").push("obs").push("geo").push("recent");
                })
                .expect("unable to modify observations URL path segments");
        }

        url.query_pairs_mut()
            .append_pair("lat", &site.lat.to_string())
            .append_pair("lng", &site.lon.to_string())
            .append_pair("dist", &site.radius_km.to_string())
            .append_pair("back", &back_days.to_string());

        url
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Sighting {
    #[serde(alias = "speciesCode")]
    pub species_code: String,
    #[serde(alias = "comName")]
    pub com_name: String,
    #[serde(alias = "sciName")]
    pub sci_name: String,
    #[serde(alias = "locId")]
    pub loc_id: String,
    #[serde(alias = "locName")]
    pub loc_name: String,
    #[serde(alias = "obsDt")]
    pub obs_dt: String,
    #[serde(alias = "howMany")]
    pub how_many: Option<u32>,
    #[serde(alias = "lat")]
    pub lat: f64,
    #[serde(alias = "lng")]
    pub lng: f64,
    #[serde(alias = "obsValid")]
    pub obs_valid: bool,
    #[serde(alias = "obsReviewed")]
    pub obs_reviewed: bool,
    #[serde(alias = "locationPrivate")]
    pub location_private: bool,
    #[serde(alias = "subId")]
    pub sub_id: String,
}

impl Sighting {
    /// Stable identity of this sighting for suppressing repeat alerts.
    ///
    /// The API issues no per-observation ID (`sub_id` is a checklist that
    /// covers many species at once) so species, observation time, and
    /// coordinates are used instead. Keys are scoped by site so the same
    /// bird seen from two configured sites alerts for each.
    pub fn key(&self, site_id: &str) -> String {
        format!(
            "{}|{}|{}|{}|{}",
            site_id, self.species_code, self.obs_dt, self.lat, self.lng
        )
    }
}
