use std::path::PathBuf;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Environment variable overriding the challengebox home directory.
pub const CHALLENGEBOX_HOME_ENV_VAR: &str = "CHALLENGEBOX_HOME";

/// Environment variable naming the settings file.
pub const CHALLENGEBOX_CONFIG_ENV_VAR: &str = "CHALLENGEBOX_CONFIG";

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Loads a `.env` file from the working directory or one of its parents, if there is one.
///
/// Returns the path that was loaded, for the caller to log. A missing file is not an error.
pub fn load_dotenv() -> Result<Option<PathBuf>, dotenvy::Error> {
    dotenv_outcome(dotenvy::dotenv())
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

fn dotenv_outcome(result: dotenvy::Result<PathBuf>) -> Result<Option<PathBuf>, dotenvy::Error> {
    match result {
        Ok(path) => Ok(Some(path)),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn test_dotenv_outcome() {
        let loaded = dotenv_outcome(Ok(PathBuf::from("/srv/ctf/.env")));
        assert_eq!(loaded.ok().flatten(), Some(PathBuf::from("/srv/ctf/.env")));

        let missing = dotenv_outcome(Err(dotenvy::Error::Io(io::Error::from(
            io::ErrorKind::NotFound,
        ))));
        assert!(matches!(missing, Ok(None)));

        let malformed = dotenv_outcome(Err(dotenvy::Error::LineParse("=oops".into(), 0)));
        assert!(malformed.is_err());
    }
}
