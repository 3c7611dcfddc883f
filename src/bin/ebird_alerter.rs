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

use clap::Parser;
use ebird_alerter::client::{EbirdClient, Site};
use ebird_alerter::notify::SlackClient;
use ebird_alerter::pipeline;
use ebird_alerter::record::SheetClient;
use ebird_alerter::watch::{SeenCache, WatchList};
use reqwest::Client;
use std::error::Error;
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tracing::Level;

const DEFAULT_LOG_LEVEL: Level = Level::INFO;
const DEFAULT_API_URL: &str = "https://api.ebird.org/";
const DEFAULT_SITE_ID: &str = "home";
const DEFAULT_SITE_NAME: &str = "Home";
const DEFAULT_RADIUS_KM: u32 = 15;
const DEFAULT_BACK_DAYS: u32 = 1;
const DEFAULT_SEEN_PATH: &str = "seen.json";
const DEFAULT_TIMEOUT_MILLIS: u64 = 20000;

#[derive(Debug, Parser)]
#[clap(name = "ebird_alerter", version = clap::crate_version!())]
struct EbirdAlerterApplication {
    /// Short site identifier, used in sighting keys and spreadsheet rows
    #[clap(long, default_value = DEFAULT_SITE_ID)]
    site_id: String,

    /// Human-readable site name, used in chat messages and spreadsheet rows
    #[clap(long, default_value = DEFAULT_SITE_NAME)]
    site_name: String,

    /// Latitude of the site center, in decimal degrees
    #[clap(long, allow_negative_numbers = true)]
    lat: f64,

    /// Longitude of the site center, in decimal degrees
    #[clap(long, allow_negative_numbers = true)]
    lon: f64,

    /// Search radius around the site center, in kilometers (at most 15)
    #[clap(long, default_value_t = DEFAULT_RADIUS_KM, value_parser = clap::value_parser!(u32).range(1..=15))]
    radius_km: u32,

    /// How many days back to ask the API for observations (1 to 30). Overlap
    /// between runs is absorbed by the seen cache
    #[clap(long, default_value_t = DEFAULT_BACK_DAYS, value_parser = clap::value_parser!(u32).range(1..=30))]
    back_days: u32,

    /// Pipe-separated species to alert on, by common name or species code
    #[clap(long, env = "WATCHLIST")]
    watchlist: String,

    /// eBird API token, issued at https://ebird.org/api/keygen
    #[clap(long, env = "EBIRD_TOKEN", hide_env_values = true)]
    ebird_token: String,

    /// Slack incoming-webhook URL that alerts are posted to
    #[clap(long, env = "SLACK_WEBHOOK_URL", hide_env_values = true)]
    slack_webhook_url: String,

    /// Google Apps Script webhook URL that spreadsheet rows are posted to
    #[clap(long, env = "WEBHOOK_LOG_URL", hide_env_values = true)]
    sheet_webhook_url: String,

    /// Path of the JSON file that remembers already-alerted sightings
    #[clap(long, default_value = DEFAULT_SEEN_PATH)]
    seen_path: PathBuf,

    /// Also append alerted sightings to this local CSV file
    #[clap(long)]
    csv_path: Option<PathBuf>,

    /// Base URL for the eBird API
    #[clap(long, default_value_t = DEFAULT_API_URL.into())]
    api_url: String,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case insensitive)
    #[clap(long, default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: Level,

    /// Timeout for requests to the eBird API and the webhooks, in milliseconds
    #[clap(long, default_value_t = DEFAULT_TIMEOUT_MILLIS)]
    timeout_millis: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let opts = EbirdAlerterApplication::parse();
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(opts.log_level)
            .finish(),
    )
    .expect("failed to set tracing subscriber");

    let watchlist = WatchList::parse(&opts.watchlist);
    if watchlist.is_empty() {
        tracing::error!(message = "watch-list has no species, nothing would ever be alerted");
        process::exit(1);
    }

    let timeout = Duration::from_millis(opts.timeout_millis);
    let http_client = Client::builder().timeout(timeout).build().unwrap_or_else(|e| {
        tracing::error!(message = "unable to initialize HTTP client", error = %e);
        process::exit(1)
    });

    let site = Site {
        id: opts.site_id,
        name: opts.site_name,
        lat: opts.lat,
        lon: opts.lon,
        radius_km: opts.radius_km,
    };

    let ebird = EbirdClient::new(http_client.clone(), &opts.api_url, &opts.ebird_token);
    let slack = SlackClient::new(http_client.clone(), &opts.slack_webhook_url);
    let sheet = SheetClient::new(http_client, &opts.sheet_webhook_url);
    let mut seen = SeenCache::load(&opts.seen_path);

    tracing::info!(
        message = "starting run",
        site = %site.id,
        api_url = %opts.api_url,
        watched_species = watchlist.len(),
        previously_alerted = seen.len(),
    );

    match pipeline::run_once(
        &ebird,
        &slack,
        &sheet,
        &site,
        &watchlist,
        opts.back_days,
        opts.csv_path.as_deref(),
        &mut seen,
    )
    .await
    {
        Ok(summary) => {
            tracing::info!(
                message = "run complete",
                fetched = summary.fetched,
                matched = summary.matched,
                alerted = summary.alerted,
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!(message = "run failed", error = %e);
            process::exit(1)
        }
    }
}
