pub mod inspect;
pub mod run;

use anyhow::Result;
use std::path::Path;

use slotroster::config::Config;

// Re-export command functions for convenience
pub use inspect::{active, check_config, plans, teams};
pub use run::run;

/// Load configuration from `path`, or from the environment when absent
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path),
        None => Config::from_env(),
    }
}
