use std::{env, path::PathBuf};

use crate::constants::{defaults, envvars};

/// Settings home: `IOTR_HOME` if set, else the working directory
pub fn home_dir() -> PathBuf {
    if let Ok(home) = env::var(envvars::IOTR_HOME) {
        return home.into();
    }
    PathBuf::from(defaults::HOME_DIR)
}
