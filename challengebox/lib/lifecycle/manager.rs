use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use getset::Getters;
use tokio::sync::OwnedMutexGuard;
use typed_builder::TypedBuilder;

use crate::{
    catalog,
    config::{ContainerPort, ImageRef, LifecyclePolicy},
    engine::{
        ContainerEngine, ContainerHostConfig, CreateContainerRequest, EmptyObject,
        HostPortBinding,
    },
    models::{HostConfig, HostConfigUpdate, InstanceRecord, NewInstance, Owner, OwnerKind},
    ports,
    store::{HostStore, InstanceTracker},
    utils, ChallengeboxError, ChallengeboxResult,
};

use super::{Clock, KeyedLocks, SlotKey, SystemClock};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Label carrying `kind:id` of the owner a container was created for.
pub const OWNER_LABEL: &str = "challengebox.owner";

/// Label carrying the bare repository a container was created from.
pub const IMAGE_LABEL: &str = "challengebox.image";

/// Hex characters of the owner name digest used in container names.
const NAME_DIGEST_LEN: usize = 10;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Provisions, reverts and reclaims challenge containers.
///
/// Every slot is an (owner, image) pair holding at most one instance. Operations on one slot are
/// serialized by a per-slot lock; operations on different slots run in parallel. Port selection on
/// a host is serialized by a per-host lock that is released before the container is created.
///
/// ## Examples
///
/// ```no_run
/// use std::{sync::Arc, time::Duration};
///
/// use challengebox::{
///     engine::HttpEngine,
///     lifecycle::LifecycleManager,
///     store::{self, HostStore, InstanceTracker},
/// };
///
/// # async fn example() -> anyhow::Result<()> {
/// let pool = store::init_db("challengebox.db", &store::CHALLENGEBOX_DB_MIGRATOR).await?;
/// let manager = LifecycleManager::builder()
///     .engine(Arc::new(HttpEngine::new(Duration::from_secs(30))?))
///     .hosts(HostStore::new(pool.clone()))
///     .tracker(InstanceTracker::new(pool))
///     .build();
///
/// let owner = manager.owner("42", "rocket");
/// let record = manager.request_container(&owner, "web:latest").await?;
/// println!("ports: {:?}", record.get_allocated_ports());
/// # Ok(())
/// # }
/// ```
#[derive(TypedBuilder, Getters)]
pub struct LifecycleManager {
    /// The engine every host is reached through.
    #[getset(get = "pub with_prefix")]
    engine: Arc<dyn ContainerEngine>,

    /// Host configurations.
    #[getset(get = "pub with_prefix")]
    hosts: HostStore,

    /// Tracked instances.
    #[getset(get = "pub with_prefix")]
    tracker: InstanceTracker,

    /// Expiry and port policy.
    #[builder(default)]
    #[getset(get = "pub with_prefix")]
    policy: LifecyclePolicy,

    /// Whether owners are teams or users in this deployment.
    #[builder(default)]
    #[getset(get = "pub with_prefix")]
    owner_kind: OwnerKind,

    /// Time source.
    #[builder(default = Arc::new(SystemClock) as Arc<dyn Clock>)]
    clock: Arc<dyn Clock>,

    #[builder(default = KeyedLocks::new(), setter(skip))]
    slot_locks: KeyedLocks<SlotKey>,

    #[builder(default = KeyedLocks::new(), setter(skip))]
    host_locks: KeyedLocks<i64>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl LifecycleManager {
    /// An owner of this deployment's owner kind.
    pub fn owner(&self, id: impl Into<String>, name: impl Into<String>) -> Owner {
        Owner::new(self.owner_kind, id, name)
    }

    /// The current time according to the manager's clock.
    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    /// Provisions `owner`'s instance of `image`, reverting an existing one if it is old enough.
    ///
    /// Before touching the slot, every instance of `owner` older than the stale threshold is
    /// reclaimed. An existing instance younger than its revert time fails the request with
    /// [`ChallengeboxError::TooSoon`]; an older one is torn down before the new one is created.
    /// A failure while creating leaves no record behind.
    pub async fn request_container(
        &self,
        owner: &Owner,
        image: &str,
    ) -> ChallengeboxResult<InstanceRecord> {
        let image: ImageRef = image.parse()?;
        let host = self.host_for(owner.get_id()).await?;

        if !catalog::is_offered(self.engine.as_ref(), &host, &image).await {
            return Err(ChallengeboxError::ImageNotOffered(image.to_string()));
        }

        let swept = self.sweep(owner).await?;
        if swept > 0 {
            tracing::info!("reclaimed {} stale instance(s) of {}", swept, owner);
        }

        let slot = SlotKey::new(owner, image.get_repository());
        let _slot_guard = self.lock_slot(&slot).await;

        let existing = self
            .tracker
            .find(*owner.get_kind(), owner.get_id(), image.get_repository())
            .await?;

        if let Some(existing) = existing {
            let now = self.clock.now();
            if now < *existing.get_revertible_after() {
                return Err(ChallengeboxError::TooSoon {
                    image: image.get_repository().to_string(),
                    age: existing.age(now),
                    window: existing.get_revertible_after() - existing.get_created_at(),
                });
            }

            tracing::info!(
                "reverting {} of {} (container {})",
                existing.get_reference(),
                owner,
                existing.get_engine_instance_id()
            );
            self.teardown(&host, &existing).await?;
        }

        self.create(&host, owner, &image).await
    }

    /// Reclaims every instance of `owner` that reached the stale threshold. Returns how many were
    /// reclaimed.
    ///
    /// Instances whose slot is busy, or whose container could not be removed, are left for a later
    /// sweep.
    pub async fn sweep(&self, owner: &Owner) -> ChallengeboxResult<usize> {
        let cutoff = self.clock.now() - self.policy.get_stale_after_secs();
        let stale = self
            .tracker
            .find_all_for_owner(owner)
            .await?
            .into_iter()
            .filter(|record| *record.get_created_at() <= cutoff)
            .collect();

        Ok(self.reclaim_stale(stale).await)
    }

    /// Reclaims stale instances of every owner.
    pub async fn sweep_all(&self) -> ChallengeboxResult<usize> {
        let cutoff = self.clock.now() - self.policy.get_stale_after_secs();
        let stale = self.tracker.stale(cutoff).await?;
        Ok(self.reclaim_stale(stale).await)
    }

    /// Tears down `owner`'s instance of `image` after a solve, regardless of its age.
    ///
    /// Returns whether an instance existed. A missing instance is not an error.
    pub async fn reclaim_on_solve(&self, owner: &Owner, image: &str) -> ChallengeboxResult<bool> {
        let image: ImageRef = image.parse()?;
        let slot = SlotKey::new(owner, image.get_repository());
        let _slot_guard = self.lock_slot(&slot).await;

        let Some(record) = self
            .tracker
            .find(*owner.get_kind(), owner.get_id(), image.get_repository())
            .await?
        else {
            tracing::debug!("{} solved {} without a running instance", owner, image);
            return Ok(false);
        };

        let host = self.host_for(owner.get_id()).await?;
        self.teardown(&host, &record).await?;
        tracing::info!(
            "reclaimed {} of {} after solve (container {})",
            record.get_reference(),
            owner,
            record.get_engine_instance_id()
        );

        Ok(true)
    }

    /// Instances held by `owner`.
    pub async fn instances_for(&self, owner: &Owner) -> ChallengeboxResult<Vec<InstanceRecord>> {
        self.tracker.find_all_for_owner(owner).await
    }

    /// Every tracked instance.
    pub async fn all_instances(&self) -> ChallengeboxResult<Vec<InstanceRecord>> {
        self.tracker.all().await
    }

    /// Creates or replaces a host configuration and drops anything the engine cached for it.
    pub async fn save_host(&self, update: HostConfigUpdate) -> ChallengeboxResult<HostConfig> {
        let host = self.hosts.upsert(update).await?;
        self.engine.invalidate_host(*host.get_id());
        Ok(host)
    }

    /// The host configured for `owner_id`.
    pub(super) async fn host_for(&self, owner_id: &str) -> ChallengeboxResult<HostConfig> {
        self.hosts
            .get_by_owner(owner_id)
            .await?
            .ok_or_else(|| ChallengeboxError::NoHostConfig(owner_id.to_string()))
    }

    pub(super) async fn lock_slot(&self, slot: &SlotKey) -> OwnedMutexGuard<()> {
        self.slot_locks.lock(slot).await
    }

    /// Removes the container of `record` and then the record. The record stays when the engine
    /// call fails.
    pub(super) async fn teardown(
        &self,
        host: &HostConfig,
        record: &InstanceRecord,
    ) -> ChallengeboxResult<()> {
        self.engine
            .remove_container(host, record.get_engine_instance_id())
            .await?;
        self.tracker.remove(*record.get_id()).await?;
        Ok(())
    }

    async fn reclaim_stale(&self, records: Vec<InstanceRecord>) -> usize {
        let mut hosts: HashMap<String, Option<HostConfig>> = HashMap::new();
        let mut reclaimed = 0;

        for record in records {
            let slot = SlotKey::from_parts(
                *record.get_owner_kind(),
                record.get_owner_id().as_str(),
                record.get_image().as_str(),
            );

            let Some(_slot_guard) = self.slot_locks.try_lock(&slot) else {
                tracing::debug!("slot of instance {} is busy, skipping", record.get_id());
                continue;
            };

            // Replaced or removed while the slot was unlocked.
            match self.tracker.get(*record.get_id()).await {
                Ok(Some(current)) if current == record => {}
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!("could not re-read instance {}: {}", record.get_id(), e);
                    continue;
                }
            }

            let owner_id = record.get_owner_id();
            if !hosts.contains_key(owner_id) {
                match self.hosts.get_by_owner(owner_id).await {
                    Ok(host) => {
                        hosts.insert(owner_id.clone(), host);
                    }
                    Err(e) => {
                        tracing::warn!("could not load host config of {}: {}", owner_id, e);
                        continue;
                    }
                }
            }

            let Some(Some(host)) = hosts.get(owner_id) else {
                tracing::warn!(
                    "no host config for owner {}, leaving stale instance {}",
                    owner_id,
                    record.get_id()
                );
                continue;
            };

            match self.teardown(host, &record).await {
                Ok(()) => {
                    reclaimed += 1;
                    tracing::info!(
                        "reclaimed stale {} of {}:{} (container {})",
                        record.get_reference(),
                        record.get_owner_kind(),
                        owner_id,
                        record.get_engine_instance_id()
                    );
                }
                Err(e) => tracing::warn!(
                    "could not reclaim stale instance {}, keeping it: {}",
                    record.get_id(),
                    e
                ),
            }
        }

        reclaimed
    }

    async fn create(
        &self,
        host: &HostConfig,
        owner: &Owner,
        image: &ImageRef,
    ) -> ChallengeboxResult<InstanceRecord> {
        let reference = image.to_string();

        let (container_ports, host_ports) = {
            let _allocation_guard = self.host_locks.lock(host.get_id()).await;
            let excluded = ports::unavailable_ports(self.engine.as_ref(), host).await?;
            let required = ports::required_ports(self.engine.as_ref(), host, &reference).await?;
            let allocated = ports::allocate(
                required.len(),
                &excluded,
                self.policy.port_range(),
                *self.policy.get_max_port_attempts(),
                &mut rand::rng(),
            )?;
            (required, allocated)
        };

        let request = create_request(&reference, owner, image, &container_ports, &host_ports);
        let name = container_name(image.get_repository(), owner.get_name());

        let id = self.engine.create_container(host, &name, &request).await?;
        if let Err(e) = self.engine.start_container(host, &id).await {
            self.discard(host, &id).await;
            return Err(e);
        }

        let now = self.clock.now();
        let new = NewInstance::builder()
            .owner_kind(*owner.get_kind())
            .owner_id(owner.get_id().as_str())
            .image(image.get_repository())
            .reference(reference.as_str())
            .created_at(now)
            .revertible_after(now + self.policy.get_revert_after_secs())
            .engine_instance_id(id.as_str())
            .allocated_ports(host_ports)
            .host(host.public_host())
            .build();

        match self.tracker.insert(new).await {
            Ok(record) => {
                tracing::info!(
                    "started {} for {} as {} on {} (ports {:?})",
                    reference,
                    owner,
                    id,
                    host.get_hostname(),
                    record.get_allocated_ports()
                );
                Ok(record)
            }
            Err(e) => {
                self.discard(host, &id).await;
                Err(e)
            }
        }
    }

    /// Best-effort removal of a container that will not be tracked.
    async fn discard(&self, host: &HostConfig, id: &str) {
        if let Err(e) = self.engine.remove_container(host, id).await {
            tracing::error!("could not remove untracked container {}: {}", id, e);
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

/// The engine name of `owner_name`'s container for `repository`.
///
/// The repository is mapped onto the engine's name alphabet `[a-zA-Z0-9_.-]` and suffixed with a
/// digest of the owner name.
fn container_name(repository: &str, owner_name: &str) -> String {
    let sanitized: String = repository
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let sanitized = sanitized.trim_start_matches(|c: char| !c.is_ascii_alphanumeric());
    let digest = utils::short_digest(owner_name, NAME_DIGEST_LEN);
    if sanitized.is_empty() {
        return format!("challenge_{digest}");
    }

    format!("{sanitized}_{digest}")
}

fn create_request(
    reference: &str,
    owner: &Owner,
    image: &ImageRef,
    container_ports: &[ContainerPort],
    host_ports: &[u16],
) -> CreateContainerRequest {
    let port_bindings = ports::bind(container_ports, host_ports)
        .into_iter()
        .map(|pair| {
            (
                pair.get_container().to_string(),
                vec![HostPortBinding {
                    host_port: pair.get_host().to_string(),
                }],
            )
        })
        .collect();

    CreateContainerRequest {
        image: reference.to_string(),
        exposed_ports: container_ports
            .iter()
            .map(|port| (port.to_string(), EmptyObject {}))
            .collect(),
        labels: BTreeMap::from([
            (OWNER_LABEL.to_string(), owner.to_string()),
            (IMAGE_LABEL.to_string(), image.get_repository().to_string()),
        ]),
        host_config: ContainerHostConfig { port_bindings },
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_name_is_engine_safe() {
        let name = container_name("registry.local:5000/ctf/web", "Team Rocket");
        assert!(name.starts_with("registry.local_5000_ctf_web_"));
        assert_eq!(name.len(), "registry.local_5000_ctf_web_".len() + NAME_DIGEST_LEN);

        assert_eq!(
            container_name("web", "alice"),
            format!("web_{}", utils::short_digest("alice", NAME_DIGEST_LEN))
        );
        assert!(container_name("__", "alice").starts_with("challenge_"));
    }

    #[test]
    fn test_create_request_binds_ports_in_order() -> anyhow::Result<()> {
        let owner = Owner::new(OwnerKind::Team, "7", "rocket");
        let image: ImageRef = "web:v2".parse()?;
        let container_ports = vec![ContainerPort::tcp(22), "53/udp".parse()?];

        let request = create_request("web:v2", &owner, &image, &container_ports, &[41000, 42000]);
        let body = serde_json::to_value(&request)?;

        assert_eq!(body["Image"], "web:v2");
        assert_eq!(body["ExposedPorts"]["22/tcp"], serde_json::json!({}));
        assert_eq!(
            body["HostConfig"]["PortBindings"]["22/tcp"][0]["HostPort"],
            "41000"
        );
        assert_eq!(
            body["HostConfig"]["PortBindings"]["53/udp"][0]["HostPort"],
            "42000"
        );
        assert_eq!(body["Labels"][OWNER_LABEL], "team:7");
        assert_eq!(body["Labels"][IMAGE_LABEL], "web");
        Ok(())
    }
}
