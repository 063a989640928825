//! Configuration for the review module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Review section of the configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// Root of the per-worker directories holding checked-out batches.
    #[serde(default = "default_fetched_dir")]
    pub fetched_dir: PathBuf,

    /// Where edit logs are kept, one file per checked-out batch.
    #[serde(default = "default_edit_state_dir")]
    pub edit_state_dir: PathBuf,
}

fn default_fetched_dir() -> PathBuf {
    PathBuf::from("fetched_data")
}

fn default_edit_state_dir() -> PathBuf {
    PathBuf::from("edit_states")
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            fetched_dir: default_fetched_dir(),
            edit_state_dir: default_edit_state_dir(),
        }
    }
}
