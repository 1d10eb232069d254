//! Wire types for the subset of the container engine API that challengebox uses.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

//--------------------------------------------------------------------------------------------------
// Types: Responses
//--------------------------------------------------------------------------------------------------

/// An entry of `GET /images/json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageSummary {
    /// Image id.
    #[serde(rename = "Id", default)]
    pub id: String,

    /// `repository:tag` names. `null` or `["<none>:<none>"]` for untagged images.
    #[serde(rename = "RepoTags", default)]
    pub repo_tags: Option<Vec<String>>,
}

/// The result of `GET /images/{name}/json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageInspect {
    /// Image id.
    #[serde(rename = "Id", default)]
    pub id: String,

    /// The image's runtime configuration.
    #[serde(rename = "Config", default)]
    pub config: Option<ImageConfig>,

    /// Legacy location of the configuration, still filled by older engines.
    #[serde(rename = "ContainerConfig", default)]
    pub container_config: Option<ImageConfig>,
}

/// The part of an image's configuration challengebox reads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Exposed ports keyed by `port/protocol`.
    #[serde(rename = "ExposedPorts", default)]
    pub exposed_ports: Option<HashMap<String, serde_json::Value>>,
}

/// An entry of `GET /containers/json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerSummary {
    /// Container id.
    #[serde(rename = "Id", default)]
    pub id: String,

    /// Container names, each prefixed with `/`.
    #[serde(rename = "Names", default)]
    pub names: Option<Vec<String>>,

    /// Port mappings.
    #[serde(rename = "Ports", default)]
    pub ports: Option<Vec<PortSummary>>,
}

/// A port mapping of a listed container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortSummary {
    /// Port inside the container.
    #[serde(rename = "PrivatePort", default)]
    pub private_port: u16,

    /// Port published on the host, absent when unpublished.
    #[serde(rename = "PublicPort", default)]
    pub public_port: Option<u16>,

    /// `tcp`, `udp` or `sctp`.
    #[serde(rename = "Type", default)]
    pub protocol: String,
}

/// The result of `POST /containers/create`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateContainerResponse {
    /// Id of the created container.
    #[serde(rename = "Id")]
    pub id: String,

    /// Warnings raised while creating the container.
    #[serde(rename = "Warnings", default)]
    pub warnings: Option<Vec<String>>,
}

//--------------------------------------------------------------------------------------------------
// Types: Requests
//--------------------------------------------------------------------------------------------------

/// Body of `POST /containers/create`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateContainerRequest {
    /// Image reference to run.
    #[serde(rename = "Image")]
    pub image: String,

    /// Exposed ports keyed by `port/protocol`.
    #[serde(rename = "ExposedPorts", default)]
    pub exposed_ports: BTreeMap<String, EmptyObject>,

    /// Labels attached to the container.
    #[serde(rename = "Labels", default)]
    pub labels: BTreeMap<String, String>,

    /// Host-side settings.
    #[serde(rename = "HostConfig", default)]
    pub host_config: ContainerHostConfig,
}

/// Host-side settings of a container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerHostConfig {
    /// Container port to host port bindings.
    #[serde(rename = "PortBindings", default)]
    pub port_bindings: BTreeMap<String, Vec<HostPortBinding>>,
}

/// One host binding of a container port.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostPortBinding {
    /// Host port, as a string per the engine API.
    #[serde(rename = "HostPort")]
    pub host_port: String,
}

/// Serializes as `{}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptyObject {}

/// The raw outcome of an engine call.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineResponse {
    /// HTTP status code.
    pub status: u16,

    /// Parsed body, `Null` when the body was empty.
    pub body: serde_json::Value,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ImageInspect {
    /// Exposed port keys, preferring `Config` over the legacy `ContainerConfig`.
    pub fn exposed_port_keys(&self) -> Vec<&str> {
        [&self.config, &self.container_config]
            .into_iter()
            .flatten()
            .find_map(|c| c.exposed_ports.as_ref().filter(|p| !p.is_empty()))
            .map(|ports| ports.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }
}

impl ContainerSummary {
    /// Host ports published by this container.
    pub fn public_ports(&self) -> impl Iterator<Item = u16> + '_ {
        self.ports
            .iter()
            .flatten()
            .filter_map(|port| port.public_port)
    }
}

impl EngineResponse {
    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The engine's error message, if the body carries one.
    pub fn message(&self) -> String {
        self.body
            .get("message")
            .and_then(|m| m.as_str())
            .map(String::from)
            .unwrap_or_else(|| self.body.to_string())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_image_inspect_prefers_config() -> anyhow::Result<()> {
        let inspect: ImageInspect = serde_json::from_value(json!({
            "Id": "sha256:abc",
            "Config": { "ExposedPorts": { "80/tcp": {} } },
            "ContainerConfig": { "ExposedPorts": { "22/tcp": {} } }
        }))?;
        assert_eq!(inspect.exposed_port_keys(), vec!["80/tcp"]);

        let legacy: ImageInspect = serde_json::from_value(json!({
            "Config": { "ExposedPorts": null },
            "ContainerConfig": { "ExposedPorts": { "22/tcp": {} } }
        }))?;
        assert_eq!(legacy.exposed_port_keys(), vec!["22/tcp"]);

        let none: ImageInspect = serde_json::from_value(json!({ "Config": {} }))?;
        assert!(none.exposed_port_keys().is_empty());
        Ok(())
    }

    #[test]
    fn test_create_request_wire_shape() {
        let mut request = CreateContainerRequest {
            image: "web:latest".to_string(),
            ..Default::default()
        };
        request.exposed_ports.insert("80/tcp".to_string(), EmptyObject {});
        request.host_config.port_bindings.insert(
            "80/tcp".to_string(),
            vec![HostPortBinding {
                host_port: "31337".to_string(),
            }],
        );

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["Image"], "web:latest");
        assert_eq!(value["ExposedPorts"]["80/tcp"], json!({}));
        assert_eq!(
            value["HostConfig"]["PortBindings"]["80/tcp"][0]["HostPort"],
            "31337"
        );
    }

    #[test]
    fn test_public_ports_skip_unpublished() -> anyhow::Result<()> {
        let container: ContainerSummary = serde_json::from_value(json!({
            "Id": "c1",
            "Ports": [
                { "PrivatePort": 80, "PublicPort": 31000, "Type": "tcp" },
                { "PrivatePort": 22, "Type": "tcp" }
            ]
        }))?;
        assert_eq!(container.public_ports().collect::<Vec<_>>(), vec![31000]);
        Ok(())
    }
}
