use serde::{Deserialize, Serialize};

use crate::models::{HostConfig, InstanceRecord, OwnerKind};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Placeholder entry returned by `/docker` when the reference host has no catalog.
pub const EMPTY_CATALOG_PLACEHOLDER: &str = "Error in Docker Config!";

//--------------------------------------------------------------------------------------------------
// Types: Requests
//--------------------------------------------------------------------------------------------------

/// Query of `/container`.
#[derive(Debug, Deserialize)]
pub struct ContainerQuery {
    /// The `repository[:tag]` to provision.
    pub name: Option<String>,
}

/// Query of `/nuke`.
#[derive(Debug, Deserialize)]
pub struct NukeQuery {
    /// Engine id of the container to remove. The literal `null` means none.
    pub container: Option<String>,

    /// Owner whose host the container runs on.
    pub owner_id: Option<String>,

    /// `true` to remove every tracked container.
    pub all: Option<String>,
}

//--------------------------------------------------------------------------------------------------
// Types: Responses
//--------------------------------------------------------------------------------------------------

/// The `{success, data}` envelope of the platform API.
#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    /// Whether the call succeeded.
    pub success: bool,

    /// Payload.
    pub data: T,
}

/// An image offered by the reference host.
#[derive(Debug, Serialize)]
pub struct ImageEntry {
    /// `repository:tag`.
    pub name: String,
}

/// A tracked instance as shown to its owner and to administrators.
#[derive(Debug, Serialize)]
pub struct InstanceView {
    /// Record id.
    pub id: i64,

    /// Owning team, in team mode.
    pub team_id: Option<String>,

    /// Owning user, in user mode.
    pub user_id: Option<String>,

    /// The `repository:tag` that was started.
    pub docker_image: String,

    /// Creation time, unix seconds.
    pub timestamp: i64,

    /// Earliest revert time, unix seconds.
    pub revert_time: i64,

    /// Engine container id.
    pub instance_id: String,

    /// Host ports, aligned with the image's exposed ports.
    pub ports: Vec<String>,

    /// Host to connect to.
    pub host: String,
}

/// A host configuration without its certificate material.
#[derive(Debug, Serialize)]
pub struct HostConfigView {
    /// Row id.
    pub id: i64,

    /// The owner the host serves.
    pub owner_id: String,

    /// `host:port` of the engine control API.
    pub hostname: String,

    /// Whether mutual-TLS is enabled.
    pub tls_enabled: bool,

    /// Whether a CA certificate is stored.
    pub has_ca_cert: bool,

    /// Whether a client certificate is stored.
    pub has_client_cert: bool,

    /// Whether a client key is stored.
    pub has_client_key: bool,

    /// Allowed repositories; empty allows every image.
    pub repositories: Vec<String>,
}

/// Payload of `GET /admin/docker_config`.
#[derive(Debug, Serialize)]
pub struct DockerConfigPage {
    /// Every host configuration.
    pub configs: Vec<HostConfigView>,

    /// Bare repositories available on the reference host, to pick an allow-list from.
    pub available_repositories: Vec<String>,
}

//--------------------------------------------------------------------------------------------------
// Types: Error Response
//--------------------------------------------------------------------------------------------------

/// Standard error response format
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// HTTP status code
    pub code: u16,

    /// Error message
    pub message: String,

    /// Error type for categorizing errors
    pub error_type: ErrorType,

    /// Optional additional details about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Types of errors that can occur
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    /// Invalid request parameters or body
    ValidationError,

    /// Missing or unrecognized caller
    AuthenticationError,

    /// Caller may not do this
    Forbidden,

    /// Resource not found
    NotFound,

    /// Container could not be provisioned
    ProvisioningError,

    /// Internal server errors
    InternalError,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl<T> DataResponse<T> {
    /// A successful envelope.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }

    /// A failed envelope.
    pub fn failed(data: T) -> Self {
        Self {
            success: false,
            data,
        }
    }
}

impl InstanceView {
    /// The view of `record`. The owner id lands in `team_id` or `user_id` by owner kind.
    pub fn new(record: &InstanceRecord) -> Self {
        let owner_id = Some(record.get_owner_id().clone());
        let (team_id, user_id) = match record.get_owner_kind() {
            OwnerKind::Team => (owner_id, None),
            OwnerKind::User => (None, owner_id),
        };

        Self {
            id: *record.get_id(),
            team_id,
            user_id,
            docker_image: record.get_reference().clone(),
            timestamp: *record.get_created_at(),
            revert_time: *record.get_revertible_after(),
            instance_id: record.get_engine_instance_id().clone(),
            ports: record
                .get_allocated_ports()
                .iter()
                .map(u16::to_string)
                .collect(),
            host: record.get_host().clone(),
        }
    }
}

impl HostConfigView {
    /// The view of `host`.
    pub fn new(host: &HostConfig) -> Self {
        let tls = host.get_tls().as_ref();
        Self {
            id: *host.get_id(),
            owner_id: host.get_owner_id().clone(),
            hostname: host.get_hostname().clone(),
            tls_enabled: host.tls_enabled(),
            has_ca_cert: tls.is_some_and(|t| !t.ca_cert().is_empty()),
            has_client_cert: tls.is_some_and(|t| !t.client_cert().is_empty()),
            has_client_key: tls.is_some_and(|t| !t.client_key().is_empty()),
            repositories: host.get_allowed_repositories().iter().cloned().collect(),
        }
    }
}

impl ErrorResponse {
    /// Create a new error response
    pub fn new(code: u16, message: String, error_type: ErrorType) -> Self {
        Self {
            code,
            message,
            error_type,
            details: None,
        }
    }

    /// Add details to the error response, ignoring details for 500-level errors
    pub fn with_details(mut self, details: String) -> Self {
        if self.code < 500 {
            self.details = Some(details);
        }
        self
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
