//! Data models shared by the tracker, the lifecycle manager and the HTTP surface.

use std::{collections::BTreeSet, fmt, str::FromStr};

use getset::Getters;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use zeroize::Zeroizing;

use crate::{ChallengeboxError, ChallengeboxResult};

//--------------------------------------------------------------------------------------------------
// Types: Owners
//--------------------------------------------------------------------------------------------------

/// Whether instances belong to teams or to individual users.
///
/// This is decided once per deployment and never per request.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OwnerKind {
    /// Instances are owned by teams.
    #[serde(rename = "team", alias = "teams")]
    Team,

    /// Instances are owned by users.
    #[default]
    #[serde(rename = "user", alias = "users")]
    User,
}

/// The identity an instance is provisioned for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Getters)]
#[getset(get = "pub with_prefix")]
pub struct Owner {
    /// Team or user.
    kind: OwnerKind,

    /// The platform's id for the team or user.
    id: String,

    /// Display name, used to derive container names.
    name: String,
}

//--------------------------------------------------------------------------------------------------
// Types: Hosts
//--------------------------------------------------------------------------------------------------

/// PEM material for mutual-TLS with an engine host. Buffers are zeroed on drop.
#[derive(Clone)]
pub struct TlsMaterial {
    ca_cert: Zeroizing<Vec<u8>>,
    client_cert: Zeroizing<Vec<u8>>,
    client_key: Zeroizing<Vec<u8>>,
}

/// Connection profile for one container engine host.
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub with_prefix")]
pub struct HostConfig {
    /// Row id.
    id: i64,

    /// The owner this host serves. Unique across configs.
    owner_id: String,

    /// `host:port` of the engine control API.
    hostname: String,

    /// Present iff TLS is enabled.
    tls: Option<TlsMaterial>,

    /// Bare repository names owners may run. Empty means every image is allowed.
    allowed_repositories: BTreeSet<String>,
}

/// The fields an administrator may set on a host configuration.
///
/// Certificates are PEM text. They are discarded when `tls_enabled` is false.
#[derive(Clone, Default, Deserialize, TypedBuilder)]
pub struct HostConfigUpdate {
    /// The owner the host serves.
    #[builder(setter(into))]
    pub owner_id: String,

    /// `host:port` of the engine control API.
    #[builder(setter(into))]
    pub hostname: String,

    /// Whether to use mutual-TLS.
    #[serde(default)]
    #[builder(default)]
    pub tls_enabled: bool,

    /// CA certificate PEM.
    #[serde(default)]
    #[builder(default, setter(strip_option, into))]
    pub ca_cert: Option<String>,

    /// Client certificate PEM.
    #[serde(default)]
    #[builder(default, setter(strip_option, into))]
    pub client_cert: Option<String>,

    /// Client private key PEM.
    #[serde(default)]
    #[builder(default, setter(strip_option, into))]
    pub client_key: Option<String>,

    /// Allowed repositories.
    #[serde(default)]
    #[builder(default)]
    pub allowed_repositories: Vec<String>,
}

//--------------------------------------------------------------------------------------------------
// Types: Instances
//--------------------------------------------------------------------------------------------------

/// One running challenge container and who owns it.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
#[getset(get = "pub with_prefix")]
pub struct InstanceRecord {
    /// Row id.
    id: i64,

    /// Team or user.
    owner_kind: OwnerKind,

    /// Owner id.
    owner_id: String,

    /// Bare repository name. Together with the owner this is the slot key.
    image: String,

    /// The full `repository:tag` that was started.
    reference: String,

    /// Creation time, unix seconds.
    created_at: i64,

    /// Earliest time the owner may revert the instance, unix seconds.
    revertible_after: i64,

    /// The container id returned by the engine.
    engine_instance_id: String,

    /// Host ports, aligned with the image's exposed ports.
    allocated_ports: Vec<u16>,

    /// Host name shown to the owner for connecting.
    host: String,
}

/// An instance about to be inserted into the tracker.
#[derive(Debug, Clone, TypedBuilder)]
pub struct NewInstance {
    /// Team or user.
    pub owner_kind: OwnerKind,

    /// Owner id.
    #[builder(setter(into))]
    pub owner_id: String,

    /// Bare repository name.
    #[builder(setter(into))]
    pub image: String,

    /// Full reference that was started.
    #[builder(setter(into))]
    pub reference: String,

    /// Creation time, unix seconds.
    pub created_at: i64,

    /// Earliest revert time, unix seconds.
    pub revertible_after: i64,

    /// Engine container id.
    #[builder(setter(into))]
    pub engine_instance_id: String,

    /// Host ports.
    #[builder(default)]
    pub allocated_ports: Vec<u16>,

    /// Connection host.
    #[builder(setter(into))]
    pub host: String,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl OwnerKind {
    /// The string stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Team => "team",
            Self::User => "user",
        }
    }
}

impl Owner {
    /// Creates an owner.
    pub fn new(kind: OwnerKind, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            name: name.into(),
        }
    }
}

impl TlsMaterial {
    /// Wraps PEM blobs.
    pub fn new(ca_cert: Vec<u8>, client_cert: Vec<u8>, client_key: Vec<u8>) -> Self {
        Self {
            ca_cert: Zeroizing::new(ca_cert),
            client_cert: Zeroizing::new(client_cert),
            client_key: Zeroizing::new(client_key),
        }
    }

    /// CA certificate PEM.
    pub fn ca_cert(&self) -> &[u8] {
        &self.ca_cert
    }

    /// Client certificate PEM.
    pub fn client_cert(&self) -> &[u8] {
        &self.client_cert
    }

    /// Client private key PEM.
    pub fn client_key(&self) -> &[u8] {
        &self.client_key
    }
}

impl HostConfig {
    /// Assembles a host config from its parts.
    pub fn from_parts(
        id: i64,
        owner_id: String,
        hostname: String,
        tls: Option<TlsMaterial>,
        allowed_repositories: BTreeSet<String>,
    ) -> Self {
        Self {
            id,
            owner_id,
            hostname,
            tls,
            allowed_repositories,
        }
    }

    /// Whether mutual-TLS is enabled.
    pub fn tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    /// The URL scheme for the control API.
    pub fn scheme(&self) -> &'static str {
        if self.tls_enabled() {
            "https"
        } else {
            "http"
        }
    }

    /// The base URL of the control API.
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.scheme(), self.hostname)
    }

    /// The host name without its port, as shown to owners.
    pub fn public_host(&self) -> &str {
        let hostname = self.hostname.as_str();
        if let Some(rest) = hostname.strip_prefix('[') {
            return rest.split(']').next().unwrap_or(rest);
        }
        hostname.split(':').next().unwrap_or(hostname)
    }

    /// Whether `repository` passes the allow-list.
    pub fn allows(&self, repository: &str) -> bool {
        self.allowed_repositories.is_empty() || self.allowed_repositories.contains(repository)
    }
}

impl HostConfigUpdate {
    /// Validates the update and splits it into TLS material and the allow-list.
    ///
    /// Submitted certificates are dropped when TLS is disabled. When TLS is enabled all three
    /// certificates must be present.
    pub fn validate(self) -> ChallengeboxResult<ValidatedHostUpdate> {
        let owner_id = self.owner_id.trim().to_string();
        let hostname = self.hostname.trim().to_string();

        if owner_id.is_empty() {
            return Err(ChallengeboxError::InvalidHostConfig(
                "owner id is required".to_string(),
            ));
        }

        if hostname.is_empty() || hostname.contains("://") || hostname.contains('/') {
            return Err(ChallengeboxError::InvalidHostConfig(format!(
                "hostname must be host:port, got {:?}",
                hostname
            )));
        }

        let tls = if self.tls_enabled {
            let non_empty = |pem: Option<String>, what: &str| match pem {
                Some(pem) if !pem.trim().is_empty() => Ok(pem.into_bytes()),
                _ => Err(ChallengeboxError::InvalidHostConfig(format!(
                    "{what} is required when tls is enabled"
                ))),
            };
            Some(TlsMaterial::new(
                non_empty(self.ca_cert, "ca cert")?,
                non_empty(self.client_cert, "client cert")?,
                non_empty(self.client_key, "client key")?,
            ))
        } else {
            None
        };

        let allowed_repositories = self
            .allowed_repositories
            .iter()
            .map(|r| r.trim())
            .filter(|r| !r.is_empty())
            .map(String::from)
            .collect();

        Ok(ValidatedHostUpdate {
            owner_id,
            hostname,
            tls,
            allowed_repositories,
        })
    }
}

/// A host update that passed validation.
#[derive(Debug, Clone)]
pub struct ValidatedHostUpdate {
    /// The owner the host serves.
    pub owner_id: String,

    /// `host:port`.
    pub hostname: String,

    /// TLS material, present iff TLS is enabled.
    pub tls: Option<TlsMaterial>,

    /// Allowed repositories.
    pub allowed_repositories: BTreeSet<String>,
}

impl InstanceRecord {
    /// Assembles a record from a stored row and its id.
    pub(crate) fn from_new(id: i64, new: NewInstance) -> Self {
        Self {
            id,
            owner_kind: new.owner_kind,
            owner_id: new.owner_id,
            image: new.image,
            reference: new.reference,
            created_at: new.created_at,
            revertible_after: new.revertible_after,
            engine_instance_id: new.engine_instance_id,
            allocated_ports: new.allocated_ports,
            host: new.host,
        }
    }

    /// Seconds since the instance was created.
    pub fn age(&self, now: i64) -> i64 {
        now - self.created_at
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OwnerKind {
    type Err = ChallengeboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "team" | "teams" => Ok(Self::Team),
            "user" | "users" => Ok(Self::User),
            _ => Err(ChallengeboxError::InvalidOwnerKind(s.to_string())),
        }
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

impl fmt::Debug for HostConfigUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostConfigUpdate")
            .field("owner_id", &self.owner_id)
            .field("hostname", &self.hostname)
            .field("tls_enabled", &self.tls_enabled)
            .field("allowed_repositories", &self.allowed_repositories)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("ca_cert", &format_args!("<{} bytes>", self.ca_cert.len()))
            .field("client_cert", &format_args!("<{} bytes>", self.client_cert.len()))
            .field("client_key", &"<redacted>")
            .finish()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn update(tls_enabled: bool) -> HostConfigUpdate {
        HostConfigUpdate::builder()
            .owner_id("1")
            .hostname("10.0.0.5:2376")
            .tls_enabled(tls_enabled)
            .ca_cert("CA")
            .client_cert("CERT")
            .client_key("KEY")
            .build()
    }

    #[test]
    fn test_tls_disabled_drops_certificates() -> anyhow::Result<()> {
        let validated = update(false).validate()?;
        assert!(validated.tls.is_none());
        Ok(())
    }

    #[test]
    fn test_tls_enabled_requires_every_certificate() -> anyhow::Result<()> {
        let validated = update(true).validate()?;
        let tls = validated.tls.expect("tls material");
        assert_eq!(tls.ca_cert(), b"CA");
        assert_eq!(tls.client_key(), b"KEY");

        let mut missing = update(true);
        missing.client_key = Some("   ".to_string());
        assert!(matches!(
            missing.validate(),
            Err(ChallengeboxError::InvalidHostConfig(_))
        ));
        Ok(())
    }

    #[test]
    fn test_hostname_validation() {
        let mut bad = update(false);
        bad.hostname = "http://10.0.0.5:2375".to_string();
        assert!(bad.validate().is_err());

        let mut empty = update(false);
        empty.hostname = " ".to_string();
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_public_host_and_allow_list() {
        let host = HostConfig::from_parts(
            1,
            "1".into(),
            "ctf.example.org:2375".into(),
            None,
            ["web".to_string()].into_iter().collect(),
        );
        assert_eq!(host.public_host(), "ctf.example.org");
        assert_eq!(host.base_url(), "http://ctf.example.org:2375");
        assert!(host.allows("web"));
        assert!(!host.allows("pwn"));

        let v6 = HostConfig::from_parts(2, "2".into(), "[::1]:2376".into(), None, BTreeSet::new());
        assert_eq!(v6.public_host(), "::1");
        assert!(v6.allows("anything"));
    }

    #[test]
    fn test_owner_kind_parsing() {
        assert_eq!("teams".parse::<OwnerKind>().unwrap(), OwnerKind::Team);
        assert_eq!("User".parse::<OwnerKind>().unwrap(), OwnerKind::User);
        assert!("org".parse::<OwnerKind>().is_err());
    }

    #[test]
    fn test_tls_material_debug_redacts_key() {
        let tls = TlsMaterial::new(b"CA".to_vec(), b"CERT".to_vec(), b"SECRET KEY".to_vec());
        let printed = format!("{:?}", tls);
        assert!(!printed.contains("SECRET"));
    }
}
