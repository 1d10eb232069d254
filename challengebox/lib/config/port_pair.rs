use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::ChallengeboxError;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A port an image declares as exposed, in the engine's `port/protocol` notation.
///
/// ## Format
/// - `80/tcp` - port 80 over TCP
/// - `53/udp` - port 53 over UDP
/// - `8080` - port 8080, protocol defaults to `tcp`
///
/// ## Examples
///
/// ```
/// use challengebox::config::ContainerPort;
///
/// let port = "8080/udp".parse::<ContainerPort>().unwrap();
/// assert_eq!(port.get_port(), 8080);
/// assert_eq!(port.get_protocol(), "udp");
/// assert_eq!(port.to_string(), "8080/udp");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerPort {
    port: u16,
    protocol: String,
}

/// Binds a port inside the container to a port on the engine host.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortPair {
    /// The host port.
    host: u16,

    /// The container port.
    container: ContainerPort,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ContainerPort {
    /// Creates a TCP container port.
    pub fn tcp(port: u16) -> Self {
        Self {
            port,
            protocol: "tcp".to_string(),
        }
    }

    /// Returns the port number.
    pub fn get_port(&self) -> u16 {
        self.port
    }

    /// Returns the protocol.
    pub fn get_protocol(&self) -> &str {
        &self.protocol
    }
}

impl PortPair {
    /// Creates a binding of `container` to `host`.
    pub fn new(host: u16, container: ContainerPort) -> Self {
        Self { host, container }
    }

    /// Returns the host port.
    pub fn get_host(&self) -> u16 {
        self.host
    }

    /// Returns the container port.
    pub fn get_container(&self) -> &ContainerPort {
        &self.container
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl FromStr for ContainerPort {
    type Err = ChallengeboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ChallengeboxError::EngineProtocolError(format!("invalid port: {s:?}"));
        let (port, protocol) = match s.split_once('/') {
            Some((port, protocol)) => (port, protocol),
            None => (s, "tcp"),
        };

        if protocol.is_empty() || !protocol.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(invalid());
        }

        Ok(Self {
            port: port.parse().map_err(|_| invalid())?,
            protocol: protocol.to_ascii_lowercase(),
        })
    }
}

impl fmt::Display for ContainerPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.port, self.protocol)
    }
}

impl fmt::Display for PortPair {
    /// Formats the port pair following the format "host:container/protocol".
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.container)
    }
}

impl Serialize for ContainerPort {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ContainerPort {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_port_from_str() {
        assert_eq!("80/tcp".parse::<ContainerPort>().unwrap(), ContainerPort::tcp(80));
        assert_eq!("80".parse::<ContainerPort>().unwrap(), ContainerPort::tcp(80));

        let udp = "53/UDP".parse::<ContainerPort>().unwrap();
        assert_eq!(udp.get_port(), 53);
        assert_eq!(udp.get_protocol(), "udp");

        assert!("".parse::<ContainerPort>().is_err());
        assert!("/tcp".parse::<ContainerPort>().is_err());
        assert!("80/".parse::<ContainerPort>().is_err());
        assert!("http/tcp".parse::<ContainerPort>().is_err());
        assert!("70000/tcp".parse::<ContainerPort>().is_err());
    }

    #[test]
    fn test_container_port_ordering_is_numeric() {
        let mut ports: Vec<ContainerPort> = ["8080/tcp", "22/tcp", "443/tcp"]
            .iter()
            .map(|p| p.parse().unwrap())
            .collect();
        ports.sort();
        assert_eq!(
            ports.iter().map(|p| p.get_port()).collect::<Vec<_>>(),
            vec![22, 443, 8080]
        );
    }

    #[test]
    fn test_port_pair_display() {
        let pair = PortPair::new(31337, ContainerPort::tcp(80));
        assert_eq!(pair.to_string(), "31337:80/tcp");
        assert_eq!(pair.get_host(), 31337);
        assert_eq!(pair.get_container().get_port(), 80);
    }
}
