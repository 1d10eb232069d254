use std::{net::SocketAddr, path::PathBuf, sync::LazyLock};

use crate::utils::CHALLENGEBOX_HOME_DIR;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Instances at least this old (in seconds) are reclaimed by the next sweep.
pub const DEFAULT_STALE_AFTER_SECS: i64 = 7200;

/// Minimum age (in seconds) of an instance before its owner may revert it.
pub const DEFAULT_REVERT_AFTER_SECS: i64 = 300;

/// Lowest host port handed out to challenge containers.
pub const DEFAULT_PORT_RANGE_START: u16 = 30000;

/// Highest host port handed out to challenge containers.
pub const DEFAULT_PORT_RANGE_END: u16 = 60000;

/// Random draws allowed per required port before allocation gives up.
pub const DEFAULT_MAX_PORT_ATTEMPTS: usize = 500;

/// Timeout for a single container engine call.
pub const DEFAULT_ENGINE_TIMEOUT_SECS: u64 = 30;

/// Default port for the HTTP server.
pub const DEFAULT_SERVER_PORT: u16 = 4242;

/// Default address the HTTP server listens on.
pub static DEFAULT_LISTEN_ADDR: LazyLock<SocketAddr> =
    LazyLock::new(|| SocketAddr::from(([127, 0, 0, 1], DEFAULT_SERVER_PORT)));

/// The path where all challengebox global data is stored.
pub static DEFAULT_CHALLENGEBOX_HOME: LazyLock<PathBuf> = LazyLock::new(|| {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CHALLENGEBOX_HOME_DIR)
});
