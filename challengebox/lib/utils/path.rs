use std::path::PathBuf;

use crate::config::DEFAULT_CHALLENGEBOX_HOME;

use super::CHALLENGEBOX_HOME_ENV_VAR;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The directory under the user's home where challengebox keeps its state.
pub const CHALLENGEBOX_HOME_DIR: &str = ".challengebox";

/// The settings file name.
pub const CHALLENGEBOX_CONFIG_FILENAME: &str = "challengebox.toml";

/// The database file name.
pub const CHALLENGEBOX_DB_FILENAME: &str = "challengebox.db";

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Returns the challengebox home directory, honoring `CHALLENGEBOX_HOME` when set.
pub fn challengebox_home_path() -> PathBuf {
    match std::env::var(CHALLENGEBOX_HOME_ENV_VAR) {
        Ok(path) if !path.is_empty() => PathBuf::from(path),
        _ => DEFAULT_CHALLENGEBOX_HOME.to_path_buf(),
    }
}
