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

//! Slack alerts for new eBird sightings near a site
//!
//! ## Features
//!
//! `ebird_alerter` polls the [api.ebird.org] "recent nearby observations" API for a single
//! site (a center point and a radius of up to 15 km), keeps the observations whose species
//! is on a configured watch-list, and alerts a Slack channel about the ones it has not
//! alerted before. Alerted sightings are appended as rows to a Google Sheet through an
//! Apps Script webhook and remembered in a local JSON file (`seen.json` by default) so a
//! sighting is only ever announced once. When a run turns up nothing new it posts a fixed
//! "No new sightings" notice instead.
//!
//! The binary runs the pipeline exactly once and exits: zero after a completed run
//! (including the no-news path), non-zero when the fetch, the chat post, or the
//! spreadsheet append fails. Scheduling is left to cron or a systemd timer. There is no
//! retry logic inside a run; a failed run leaves its sightings unmarked so the next
//! scheduled run picks them up again.
//!
//! [api.ebird.org]: https://documenter.getpostman.com/view/664302/S1ENwy59
//!
//! ## Build
//!
//! `ebird_alerter` is a Rust program and must be built from source using a
//! [Rust toolchain](https://rustup.rs/).
//!
//! ```text
//! git clone git@github.com:56quarters/ebird_alerter.git && cd ebird_alerter
//! cargo build --release
//! ```
//!
//! ## Usage
//!
//! Three external pieces are needed before the first run:
//!
//! * An eBird API token, issued at <https://ebird.org/api/keygen>.
//! * A Slack incoming-webhook URL for the channel that should get alerts.
//! * Optionally, a Google Apps Script "web app" URL that appends posted JSON
//!   to a sheet, one row per request.
//!
//! Credentials and the watch-list can be given as flags or environment variables
//! (`EBIRD_TOKEN`, `SLACK_WEBHOOK_URL`, `WEBHOOK_LOG_URL`, `WATCHLIST`). The watch-list
//! is a pipe-separated list of common names or eBird species codes, matched exactly and
//! case-insensitively.
//!
//! ```text
//! ./ebird_alerter \
//!     --site-id jp --site-name "Jamaica Pond" \
//!     --lat 42.3188 --lon -71.1208 \
//!     --watchlist 'Green Heron|merlin|Belted Kingfisher'
//! ```
//!
//! ### Scheduling
//!
//! Run it every 15 minutes from cron:
//!
//! ```text
//! */15 * * * * cd /var/lib/ebird_alerter && /usr/local/bin/ebird_alerter >> alerter.log 2>&1
//! ```
//!
//! Or use the provided Systemd units ([ext/ebird_alerter.service](ext/ebird_alerter.service)
//! and [ext/ebird_alerter.timer](ext/ebird_alerter.timer)), which assume the binary has been
//! copied to `/usr/local/bin/ebird_alerter`.
//!
//! ```text
//! sudo cp target/release/ebird_alerter /usr/local/bin/ebird_alerter
//! sudo cp ext/ebird_alerter.service /etc/systemd/system/ebird_alerter.service
//! sudo cp ext/ebird_alerter.timer /etc/systemd/system/ebird_alerter.timer
//! sudo systemctl daemon-reload
//! sudo systemctl enable --now ebird_alerter.timer
//! ```
//!
//! Runs do not coordinate with each other: the scheduler is what keeps them from
//! overlapping. Two concurrent runs against the same seen cache can double-alert.
//!

pub mod client;
pub mod notify;
pub mod pipeline;
pub mod record;
pub mod watch;
