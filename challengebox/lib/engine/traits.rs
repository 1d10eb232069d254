use crate::{models::HostConfig, ChallengeboxResult};

use super::{ContainerSummary, CreateContainerRequest, ImageInspect, ImageSummary};

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// The container engine operations the lifecycle manager depends on.
///
/// Every call targets the host described by `host`. Implementations never retry; retry policy
/// belongs to the caller.
#[async_trait::async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Lists every image on the host, tagged or not.
    async fn list_images(&self, host: &HostConfig) -> ChallengeboxResult<Vec<ImageSummary>>;

    /// Inspects one image by reference.
    async fn inspect_image(
        &self,
        host: &HostConfig,
        reference: &str,
    ) -> ChallengeboxResult<ImageInspect>;

    /// Lists every container on the host, running or stopped.
    async fn list_containers(&self, host: &HostConfig)
        -> ChallengeboxResult<Vec<ContainerSummary>>;

    /// Creates a container named `name` and returns its id.
    async fn create_container(
        &self,
        host: &HostConfig,
        name: &str,
        request: &CreateContainerRequest,
    ) -> ChallengeboxResult<String>;

    /// Starts a created container.
    async fn start_container(&self, host: &HostConfig, id: &str) -> ChallengeboxResult<()>;

    /// Force-removes a container. Removing a container that no longer exists succeeds.
    async fn remove_container(&self, host: &HostConfig, id: &str) -> ChallengeboxResult<()>;

    /// Forgets anything cached for host config `host_id`, such as a TLS session built from its
    /// old certificates.
    fn invalidate_host(&self, _host_id: i64) {}
}
