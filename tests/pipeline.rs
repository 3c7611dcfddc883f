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

//! Full pipeline runs against throwaway local servers standing in for the
//! eBird API, the Slack webhook, and the spreadsheet webhook.

use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use ebird_alerter::client::{EbirdClient, Site};
use ebird_alerter::notify::SlackClient;
use ebird_alerter::pipeline::{self, RunError};
use ebird_alerter::record::SheetClient;
use ebird_alerter::watch::{SeenCache, WatchList};
use reqwest::Client;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};

type Posts = Arc<Mutex<Vec<Value>>>;

fn serve(app: Router) -> SocketAddr {
    let server = axum::Server::bind(&"127.0.0.1:0".parse().unwrap()).serve(app.into_make_service());
    let addr = server.local_addr();
    tokio::spawn(server);
    addr
}

fn ebird_router(observations: Value) -> Router {
    Router::new().route(
        "/v2/data/obs/geo/recent",
        get(move || async move { Json(observations) }),
    )
}

fn failing_ebird_router() -> Router {
    Router::new().route(
        "/v2/data/obs/geo/recent",
        get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
    )
}

fn webhook_router(posts: Posts, status: StatusCode) -> Router {
    Router::new().route(
        "/hook",
        post(move |Json(body): Json<Value>| async move {
            posts.lock().unwrap().push(body);
            status
        }),
    )
}

fn observations() -> Value {
    json!([
        {
            "speciesCode": "greher3",
            "comName": "Grey Heron",
            "sciName": "Ardea cinerea",
            "locId": "L901738",
            "locName": "Wimbledon Common",
            "obsDt": "2024-05-04 08:15",
            "howMany": 1,
            "lat": 51.4365,
            "lng": -0.2277,
            "obsValid": true,
            "obsReviewed": false,
            "locationPrivate": false,
            "subId": "S170000001"
        },
        {
            "speciesCode": "eurrob1",
            "comName": "European Robin",
            "sciName": "Erithacus rubecula",
            "locId": "L901738",
            "locName": "Wimbledon Common",
            "obsDt": "2024-05-04 08:20",
            "howMany": 3,
            "lat": 51.4365,
            "lng": -0.2277,
            "obsValid": true,
            "obsReviewed": false,
            "locationPrivate": false,
            "subId": "S170000001"
        }
    ])
}

fn site() -> Site {
    Site {
        id: "home".to_owned(),
        name: "Home".to_owned(),
        lat: 51.4447,
        lon: -0.2065,
        radius_km: 15,
    }
}

fn watchlist() -> WatchList {
    WatchList::parse("Grey Heron")
}

struct Fixture {
    ebird: EbirdClient,
    slack: SlackClient,
    sheet: SheetClient,
    slack_posts: Posts,
    sheet_posts: Posts,
}

fn fixture(ebird_app: Router, slack_status: StatusCode, sheet_status: StatusCode) -> Fixture {
    let slack_posts = Posts::default();
    let sheet_posts = Posts::default();

    let ebird_addr = serve(ebird_app);
    let slack_addr = serve(webhook_router(slack_posts.clone(), slack_status));
    let sheet_addr = serve(webhook_router(sheet_posts.clone(), sheet_status));

    let http = Client::new();
    Fixture {
        ebird: EbirdClient::new(http.clone(), &format!("http://{}/", ebird_addr), "test-token"),
        slack: SlackClient::new(http.clone(), &format!("http://{}/hook", slack_addr)),
        sheet: SheetClient::new(http, &format!("http://{}/hook", sheet_addr)),
        slack_posts,
        sheet_posts,
    }
}

async fn run(f: &Fixture, csv_path: Option<&Path>, seen: &mut SeenCache) -> Result<pipeline::RunSummary, RunError> {
    pipeline::run_once(
        &f.ebird,
        &f.slack,
        &f.sheet,
        &site(),
        &watchlist(),
        1,
        csv_path,
        seen,
    )
    .await
}

#[tokio::test]
async fn test_new_sighting_is_alerted_and_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let seen_path = dir.path().join("seen.json");
    let csv_path = dir.path().join("alerts.csv");

    let f = fixture(ebird_router(observations()), StatusCode::OK, StatusCode::OK);
    let mut seen = SeenCache::load(&seen_path);
    let summary = run(&f, Some(&csv_path), &mut seen).await.unwrap();

    assert_eq!(summary.fetched, 2);
    assert_eq!(summary.matched, 1);
    assert_eq!(summary.alerted, 1);

    let slack_posts = f.slack_posts.lock().unwrap();
    assert_eq!(slack_posts.len(), 1);
    let text = slack_posts[0]["text"].as_str().unwrap();
    assert!(text.contains("Grey Heron"));
    assert!(!text.contains("European Robin"));
    assert!(slack_posts[0]["blocks"].is_array());

    let sheet_posts = f.sheet_posts.lock().unwrap();
    assert_eq!(sheet_posts.len(), 1);
    assert_eq!(sheet_posts[0]["comName"], "Grey Heron");
    assert_eq!(sheet_posts[0]["siteId"], "home");
    assert_eq!(sheet_posts[0]["obsDt"], "2024-05-04 08:15");

    let csv = std::fs::read_to_string(&csv_path).unwrap();
    assert_eq!(csv.lines().count(), 2);

    let reloaded = SeenCache::load(&seen_path);
    assert_eq!(reloaded.len(), 1);
}

#[tokio::test]
async fn test_second_run_appends_nothing_and_posts_no_news() {
    let dir = tempfile::tempdir().unwrap();
    let seen_path = dir.path().join("seen.json");

    let f = fixture(ebird_router(observations()), StatusCode::OK, StatusCode::OK);

    let mut seen = SeenCache::load(&seen_path);
    run(&f, None, &mut seen).await.unwrap();

    // Same source data, fresh process
    let mut seen = SeenCache::load(&seen_path);
    let summary = run(&f, None, &mut seen).await.unwrap();

    assert_eq!(summary.matched, 1);
    assert_eq!(summary.alerted, 0);

    let slack_posts = f.slack_posts.lock().unwrap();
    assert_eq!(slack_posts.len(), 2);
    assert_eq!(slack_posts[1]["text"], "No new sightings");

    // The sheet only gained rows on the first run
    assert_eq!(f.sheet_posts.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_no_matches_posts_no_news() {
    let dir = tempfile::tempdir().unwrap();
    let seen_path = dir.path().join("seen.json");

    let robin_only = json!([observations()[1].clone()]);
    let f = fixture(ebird_router(robin_only), StatusCode::OK, StatusCode::OK);

    let mut seen = SeenCache::load(&seen_path);
    let summary = run(&f, None, &mut seen).await.unwrap();

    assert_eq!(summary.matched, 0);
    assert_eq!(summary.alerted, 0);

    let slack_posts = f.slack_posts.lock().unwrap();
    assert_eq!(slack_posts.len(), 1);
    assert_eq!(slack_posts[0]["text"], "No new sightings");
    assert!(f.sheet_posts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_notify_failure_leaves_cache_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let seen_path = dir.path().join("seen.json");

    let f = fixture(
        ebird_router(observations()),
        StatusCode::INTERNAL_SERVER_ERROR,
        StatusCode::OK,
    );

    let mut seen = SeenCache::load(&seen_path);
    let err = run(&f, None, &mut seen).await.unwrap_err();

    assert!(matches!(err, RunError::Notify(_)));
    assert!(f.sheet_posts.lock().unwrap().is_empty());
    assert!(!seen_path.exists());
}

#[tokio::test]
async fn test_record_failure_leaves_cache_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let seen_path = dir.path().join("seen.json");

    let f = fixture(
        ebird_router(observations()),
        StatusCode::OK,
        StatusCode::INTERNAL_SERVER_ERROR,
    );

    let mut seen = SeenCache::load(&seen_path);
    let err = run(&f, None, &mut seen).await.unwrap_err();

    assert!(matches!(err, RunError::Record(_)));
    // The alert went out before the append failed; the sighting stays a
    // candidate for the next run
    assert_eq!(f.slack_posts.lock().unwrap().len(), 1);
    assert!(!seen_path.exists());
}

#[tokio::test]
async fn test_fetch_failure_aborts_before_notify() {
    let dir = tempfile::tempdir().unwrap();
    let seen_path = dir.path().join("seen.json");

    let f = fixture(failing_ebird_router(), StatusCode::OK, StatusCode::OK);

    let mut seen = SeenCache::load(&seen_path);
    let err = run(&f, None, &mut seen).await.unwrap_err();

    assert!(matches!(err, RunError::Fetch(_)));
    assert!(f.slack_posts.lock().unwrap().is_empty());
    assert!(f.sheet_posts.lock().unwrap().is_empty());
    assert!(!seen_path.exists());
}
