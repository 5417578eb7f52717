// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::atomic_write::write_atomic;
use crate::config::{Selectors, SiteConfig};
use crate::error::StoreError;

use super::{Episode, EpisodeStore};

/// Format version of the saved state
pub const STATE_VERSION: u32 = 1;

// Only the episodes are saved; the change flag is recomputed every run.
#[derive(Serialize)]
struct SavedStateRef<'a> {
    version: u32,
    episodes: &'a [Episode],
}

#[derive(Deserialize)]
struct SavedState {
    version: u32,
    episodes: Vec<Episode>,
}

/// How the store was obtained at the start of a run
#[derive(Debug)]
pub enum Restored {
    /// Saved state was read successfully
    Loaded(EpisodeStore),
    /// No saved state exists yet
    Fresh(EpisodeStore),
    /// Saved state exists but could not be used; starting empty
    Recovered {
        store: EpisodeStore,
        error: StoreError,
    },
}

impl Restored {
    pub fn into_store(self) -> EpisodeStore {
        match self {
            Self::Loaded(store) | Self::Fresh(store) => store,
            Self::Recovered { store, .. } => store,
        }
    }
}

impl EpisodeStore {
    /// Serialize the episodes, in order, to an opaque blob
    pub fn save(&self) -> Result<Vec<u8>, StoreError> {
        let state = SavedStateRef {
            version: STATE_VERSION,
            episodes: &self.episodes,
        };
        Ok(serde_json::to_vec_pretty(&state)?)
    }

    /// Rebuild a store from a blob produced by [`EpisodeStore::save`]
    pub fn load(blob: &[u8], site: SiteConfig, selectors: Selectors) -> Result<Self, StoreError> {
        let state: SavedState = serde_json::from_slice(blob).map_err(StoreError::JsonParseFailed)?;

        if state.version != STATE_VERSION {
            return Err(StoreError::UnsupportedVersion {
                found: state.version,
                expected: STATE_VERSION,
            });
        }

        Ok(Self::with_episodes(state.episodes, site, selectors))
    }

    /// Restore the store saved at `path`
    ///
    /// A missing file yields an empty store; an unreadable or corrupt one is logged and
    /// also yields an empty store.
    pub fn restore(path: &Path, site: SiteConfig, selectors: Selectors) -> Restored {
        let blob = match std::fs::read(path) {
            Ok(blob) => blob,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No saved state, starting fresh");
                return Restored::Fresh(Self::new(site, selectors));
            }
            Err(e) => {
                let error = StoreError::ReadFailed {
                    path: path.to_path_buf(),
                    source: e,
                };
                warn!(path = %path.display(), %error, "Could not read saved state, starting fresh");
                return Restored::Recovered {
                    store: Self::new(site, selectors),
                    error,
                };
            }
        };

        match Self::load(&blob, site.clone(), selectors.clone()) {
            Ok(store) => {
                info!(path = %path.display(), episodes = store.len(), "Restored saved state");
                Restored::Loaded(store)
            }
            Err(error) => {
                warn!(path = %path.display(), %error, "Saved state is unusable, starting fresh");
                Restored::Recovered {
                    store: Self::new(site, selectors),
                    error,
                }
            }
        }
    }

    /// Save the store to `path`, replacing any previous state
    pub fn persist(&self, path: &Path) -> Result<(), StoreError> {
        let blob = self.save()?;
        write_atomic(path, &blob).map_err(|e| StoreError::WriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

        debug!(path = %path.display(), episodes = self.len(), "Saved state");
        Ok(())
    }
}
