//! Subcommand implementations.

pub mod config;
pub mod run;
pub mod steps;

use std::path::Path;

use inkprep_core::Config;

/// Load the config named on the command line, or the default one.
///
/// An explicit file must load cleanly. A broken default file only warns and
/// falls back to defaults so `inkprep config` can still be used to fix it.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    if let Some(path) = path {
        return Config::load_from(path)
            .map_err(|e| anyhow::anyhow!("Failed to load config {}: {e}", path.display()));
    }
    match Config::load() {
        Ok(config) => Ok(config),
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `inkprep config path`."
            );
            Ok(Config::default())
        }
    }
}
