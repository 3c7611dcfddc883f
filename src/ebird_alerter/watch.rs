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

use crate::client::Sighting;
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Cache entries kept when writing the seen cache back to disk. Oldest keys
/// (in sorted order) are dropped first, matching per-run volumes of at most
/// a few dozen sightings.
const MAX_SEEN_KEYS: usize = 5000;

/// Species the operator wants alerts for, matched by common name or eBird
/// species code. Matching is an exact, case-insensitive comparison.
#[derive(Debug, Clone)]
pub struct WatchList {
    species: Vec<String>,
}

impl WatchList {
    /// Parse a pipe-separated list of species names or codes, e.g.
    /// `"Green Heron|merlin|Belted Kingfisher"`. Entries are trimmed and
    /// lowercased; empty entries are dropped.
    pub fn parse(raw: &str) -> Self {
        WatchList {
            species: raw
                .split('|')
                .map(|w| w.trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.species.is_empty()
    }

    pub fn len(&self) -> usize {
        self.species.len()
    }

    pub fn matches(&self, sighting: &Sighting) -> bool {
        let name = sighting.com_name.to_lowercase();
        let code = sighting.species_code.to_lowercase();
        self.species.iter().any(|w| *w == name || *w == code)
    }

    /// Keep only the sightings on the watch-list. Pure, order preserving.
    pub fn filter<'a>(&self, sightings: &'a [Sighting]) -> Vec<&'a Sighting> {
        sightings.iter().filter(|s| self.matches(s)).collect()
    }
}

/// Sighting keys that have already been alerted, persisted between runs as
/// a JSON array of strings.
///
/// The cache is loaded at the start of a run and written back only after a
/// successful notify and record, so a failed run leaves its sightings as
/// candidates for the next one. A missing or unreadable file loads as an
/// empty cache, which at worst re-alerts recent sightings once.
#[derive(Debug)]
pub struct SeenCache {
    path: PathBuf,
    keys: BTreeSet<String>,
}

impl SeenCache {
    pub fn load(path: &Path) -> Self {
        let keys = match fs::read(path) {
            Ok(bytes) => match serde_json::from_slice::<Vec<String>>(&bytes) {
                Ok(keys) => keys.into_iter().collect(),
                Err(e) => {
                    tracing::warn!(message = "ignoring malformed seen cache", path = %path.display(), error = %e);
                    BTreeSet::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeSet::new(),
            Err(e) => {
                tracing::warn!(message = "unable to read seen cache", path = %path.display(), error = %e);
                BTreeSet::new()
            }
        };

        SeenCache {
            path: path.to_path_buf(),
            keys,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Subset of `sightings` that has not been alerted yet, with duplicate
    /// keys within the batch collapsed to their first occurrence. Does not
    /// change the cache.
    pub fn novel<'a>(&self, site_id: &str, sightings: &[&'a Sighting]) -> Vec<&'a Sighting> {
        let mut batch = HashSet::new();
        sightings
            .iter()
            .copied()
            .filter(|s| {
                let key = s.key(site_id);
                !self.keys.contains(&key) && batch.insert(key)
            })
            .collect()
    }

    /// Remember these sightings as alerted. Callers persist with [`save`].
    ///
    /// [`save`]: SeenCache::save
    pub fn mark(&mut self, site_id: &str, sightings: &[&Sighting]) {
        for s in sightings {
            self.keys.insert(s.key(site_id));
        }
    }

    pub fn save(&self) -> io::Result<()> {
        let skip = self.keys.len().saturating_sub(MAX_SEEN_KEYS);
        let keys: Vec<&String> = self.keys.iter().skip(skip).collect();
        fs::write(&self.path, serde_json::to_vec(&keys)?)
    }
}
