use std::{
    net::SocketAddr,
    ops::RangeInclusive,
    path::{Path, PathBuf},
    time::Duration,
};

use getset::Getters;
use serde::{Deserialize, Serialize};
use tokio::fs;
use typed_builder::TypedBuilder;

use crate::{
    models::OwnerKind,
    utils::{self, CHALLENGEBOX_CONFIG_FILENAME, CHALLENGEBOX_DB_FILENAME},
    ChallengeboxError, ChallengeboxResult,
};

use super::{
    DEFAULT_ENGINE_TIMEOUT_SECS, DEFAULT_LISTEN_ADDR, DEFAULT_MAX_PORT_ATTEMPTS,
    DEFAULT_PORT_RANGE_END, DEFAULT_PORT_RANGE_START, DEFAULT_REVERT_AFTER_SECS,
    DEFAULT_STALE_AFTER_SECS,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Deployment settings, normally read from `challengebox.toml`.
///
/// ```toml
/// listen_addr = "0.0.0.0:4242"
/// owner_kind = "teams"
/// engine_timeout_secs = 20
/// sweep_interval_secs = 600
///
/// [policy]
/// revert_after_secs = 300
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder, Getters)]
#[getset(get = "pub with_prefix")]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Address the HTTP server binds to.
    #[builder(default = *DEFAULT_LISTEN_ADDR)]
    listen_addr: SocketAddr,

    /// Path of the SQLite database. Defaults to `$CHALLENGEBOX_HOME/challengebox.db`.
    #[builder(default, setter(strip_option, into))]
    database_path: Option<PathBuf>,

    /// Whether instances belong to teams or to users. Fixed for a deployment.
    #[builder(default)]
    owner_kind: OwnerKind,

    /// Timeout applied to every container engine call.
    #[builder(default = DEFAULT_ENGINE_TIMEOUT_SECS)]
    engine_timeout_secs: u64,

    /// When set, stale instances of every owner are also swept on this interval.
    #[builder(default, setter(strip_option))]
    sweep_interval_secs: Option<u64>,

    /// Expiry and port policy.
    #[builder(default)]
    policy: LifecyclePolicy,
}

/// The expiry and allocation policy applied by the lifecycle manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder, Getters)]
#[getset(get = "pub with_prefix")]
#[serde(default, deny_unknown_fields)]
pub struct LifecyclePolicy {
    /// Age at which an instance is reclaimed by a sweep.
    #[builder(default = DEFAULT_STALE_AFTER_SECS)]
    stale_after_secs: i64,

    /// Age an instance must reach before its owner may revert it.
    #[builder(default = DEFAULT_REVERT_AFTER_SECS)]
    revert_after_secs: i64,

    /// First host port of the allocation range.
    #[builder(default = DEFAULT_PORT_RANGE_START)]
    port_range_start: u16,

    /// Last host port of the allocation range, inclusive.
    #[builder(default = DEFAULT_PORT_RANGE_END)]
    port_range_end: u16,

    /// Random draws allowed per required port.
    #[builder(default = DEFAULT_MAX_PORT_ATTEMPTS)]
    max_port_attempts: usize,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Settings {
    /// Loads settings from `path`, or from `$CHALLENGEBOX_HOME/challengebox.toml` when `path` is
    /// `None`. A missing default file yields the default settings; a missing explicit file is an
    /// error.
    pub async fn load(path: Option<&Path>) -> ChallengeboxResult<Self> {
        let settings = match path {
            Some(path) => Self::parse(&fs::read_to_string(path).await?)?,
            None => {
                let default_path = utils::challengebox_home_path().join(CHALLENGEBOX_CONFIG_FILENAME);
                if fs::try_exists(&default_path).await? {
                    tracing::debug!("loading settings from {}", default_path.display());
                    Self::parse(&fs::read_to_string(&default_path).await?)?
                } else {
                    tracing::debug!("no settings file found, using defaults");
                    Self::default()
                }
            }
        };

        settings.policy.validate()?;
        Ok(settings)
    }

    /// Parses settings from TOML text.
    pub fn parse(text: &str) -> ChallengeboxResult<Self> {
        let settings: Self = toml::from_str(text)?;
        settings.policy.validate()?;
        Ok(settings)
    }

    /// The database path, falling back to the home directory default.
    pub fn resolved_database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| utils::challengebox_home_path().join(CHALLENGEBOX_DB_FILENAME))
    }

    /// The engine call timeout.
    pub fn engine_timeout(&self) -> Duration {
        Duration::from_secs(self.engine_timeout_secs)
    }

    /// The periodic sweep interval, if enabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        self.sweep_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

impl LifecyclePolicy {
    /// The inclusive host port range.
    pub fn port_range(&self) -> RangeInclusive<u16> {
        self.port_range_start..=self.port_range_end
    }

    /// Checks that the policy is internally consistent.
    pub fn validate(&self) -> ChallengeboxResult<()> {
        if self.port_range_start == 0 || self.port_range_start > self.port_range_end {
            return Err(ChallengeboxError::custom(anyhow::anyhow!(
                "invalid port range {}..={}",
                self.port_range_start,
                self.port_range_end
            )));
        }

        if self.max_port_attempts == 0 {
            return Err(ChallengeboxError::custom(anyhow::anyhow!(
                "max_port_attempts must be positive"
            )));
        }

        if self.revert_after_secs < 0 || self.stale_after_secs < 0 {
            return Err(ChallengeboxError::custom(anyhow::anyhow!(
                "policy windows must not be negative"
            )));
        }

        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for Settings {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::default();
        assert_eq!(*settings.get_listen_addr(), *DEFAULT_LISTEN_ADDR);
        assert_eq!(*settings.get_owner_kind(), OwnerKind::User);
        assert_eq!(settings.sweep_interval(), None);

        let policy = settings.get_policy();
        assert_eq!(*policy.get_stale_after_secs(), 7200);
        assert_eq!(*policy.get_revert_after_secs(), 300);
        assert_eq!(policy.port_range(), 30000..=60000);
        assert_eq!(*policy.get_max_port_attempts(), 500);
    }

    #[test]
    fn test_settings_parse_partial_toml() -> anyhow::Result<()> {
        let settings = Settings::parse(
            r#"
            owner_kind = "teams"
            engine_timeout_secs = 5
            sweep_interval_secs = 60

            [policy]
            revert_after_secs = 120
            "#,
        )?;

        assert_eq!(*settings.get_owner_kind(), OwnerKind::Team);
        assert_eq!(settings.engine_timeout(), Duration::from_secs(5));
        assert_eq!(settings.sweep_interval(), Some(Duration::from_secs(60)));
        assert_eq!(*settings.get_policy().get_revert_after_secs(), 120);
        assert_eq!(*settings.get_policy().get_stale_after_secs(), 7200);
        Ok(())
    }

    #[test]
    fn test_settings_rejects_bad_policy() {
        assert!(Settings::parse("[policy]\nport_range_start = 500\nport_range_end = 100").is_err());
        assert!(Settings::parse("[policy]\nmax_port_attempts = 0").is_err());
        assert!(Settings::parse("unknown_key = 1").is_err());
    }

    #[tokio::test]
    async fn test_settings_load_explicit_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("challengebox.toml");
        fs::write(&path, "listen_addr = \"0.0.0.0:9000\"\n").await?;

        let settings = Settings::load(Some(&path)).await?;
        assert_eq!(settings.get_listen_addr().port(), 9000);

        assert!(Settings::load(Some(&dir.path().join("missing.toml")))
            .await
            .is_err());
        Ok(())
    }
}
