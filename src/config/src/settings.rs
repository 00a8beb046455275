// Copyright 2024 Zinc Labs Inc.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use std::sync::Arc;

use arc_swap::ArcSwap;
use dotenv_config::EnvConfig;
use once_cell::sync::Lazy;

static SETTINGS: Lazy<ArcSwap<Settings>> = Lazy::new(|| ArcSwap::from(Arc::new(init())));

#[derive(EnvConfig, Debug, Clone)]
pub struct Settings {
    pub loader: Loader,
    pub log: Log,
}

/// Knobs named directly in the specification's "Configuration" external
/// interface (`spec.md` §6): how many `LoaderTask`s run concurrently, and
/// whether directories are walked recursively.
#[derive(EnvConfig, Debug, Clone)]
pub struct Loader {
    #[env_config(name = "SPLIT_LOADER_CONCURRENCY", default = 16)]
    pub loader_concurrency: usize,
    #[env_config(name = "SPLIT_LOADER_RECURSIVE_DIR_WALKER_ENABLED", default = true)]
    pub recursive_dir_walker_enabled: bool,
    #[env_config(name = "SPLIT_LOADER_FORCE_LOCAL_SCHEDULING", default = false)]
    pub force_local_scheduling: bool,
}

#[derive(EnvConfig, Debug, Clone)]
pub struct Log {
    #[env_config(name = "SPLIT_LOADER_LOG_LEVEL", default = "info")]
    pub level: String,
    #[env_config(name = "SPLIT_LOADER_LOG_JSON", default = false)]
    pub json_format: bool,
}

fn init() -> Settings {
    dotenvy::dotenv_override().ok();
    Settings::init().expect("settings must parse from env")
}

pub fn get_config() -> Arc<Settings> {
    SETTINGS.load().clone()
}

pub fn refresh_config() -> Result<(), anyhow::Error> {
    SETTINGS.store(Arc::new(init()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let settings = init();
        assert!(settings.loader.loader_concurrency > 0);
        assert!(settings.loader.recursive_dir_walker_enabled);
        assert!(!settings.loader.force_local_scheduling);
    }
}
