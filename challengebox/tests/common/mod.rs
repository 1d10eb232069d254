//! Shared fixtures: an in-process container engine and a manager wired to it.

#![allow(dead_code)]

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{Arc, Mutex},
    time::Duration,
};

use challengebox::{
    config::LifecyclePolicy,
    engine::{
        ContainerEngine, ContainerSummary, CreateContainerRequest, ImageConfig, ImageInspect,
        ImageSummary, PortSummary,
    },
    lifecycle::{LifecycleManager, ManualClock},
    models::{HostConfig, HostConfigUpdate},
    store::{self, HostStore, InstanceTracker},
    ChallengeboxError, ChallengeboxResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// An engine call, as recorded by [`FakeEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create { name: String, image: String },
    Start(String),
    Remove(String),
}

/// A container engine that keeps its containers in memory.
#[derive(Default)]
pub struct FakeEngine {
    state: Mutex<FakeState>,
}

#[derive(Default)]
struct FakeState {
    images: Vec<ImageSummary>,
    exposed: HashMap<String, Vec<String>>,
    containers: BTreeMap<String, ContainerSummary>,
    calls: Vec<Call>,
    failing_removals: HashSet<String>,
    fail_next_start: bool,
    create_delay: Option<Duration>,
    invalidated: Vec<i64>,
    next_id: u64,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl FakeEngine {
    /// Adds a tagged image exposing `ports` (`"80/tcp"` style).
    pub fn with_image(self, reference: &str, ports: &[&str]) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.images.push(ImageSummary {
                id: format!("sha256:{}", reference),
                repo_tags: Some(vec![reference.to_string()]),
            });
            state.exposed.insert(
                reference.to_string(),
                ports.iter().map(|p| p.to_string()).collect(),
            );
        }
        self
    }

    /// Makes container creation take `delay`.
    pub fn with_create_delay(self, delay: Duration) -> Self {
        self.state.lock().unwrap().create_delay = Some(delay);
        self
    }

    /// Adds a container that challengebox did not create, publishing `ports`.
    pub fn add_foreign_container(&self, ports: &[u16]) {
        let mut state = self.state.lock().unwrap();
        let id = format!("foreign{}", state.containers.len());
        state.containers.insert(
            id.clone(),
            ContainerSummary {
                id,
                names: None,
                ports: Some(
                    ports
                        .iter()
                        .map(|port| PortSummary {
                            private_port: 1,
                            public_port: Some(*port),
                            protocol: "tcp".into(),
                        })
                        .collect(),
                ),
            },
        );
    }

    /// Makes every removal of `id` fail.
    pub fn fail_removal_of(&self, id: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_removals
            .insert(id.to_string());
    }

    /// Makes the next start fail.
    pub fn fail_next_start(&self) {
        self.state.lock().unwrap().fail_next_start = true;
    }

    /// Every call so far.
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Calls after the first `skip`.
    pub fn calls_since(&self, skip: usize) -> Vec<Call> {
        self.calls().into_iter().skip(skip).collect()
    }

    /// Ids of the containers currently on the engine.
    pub fn container_ids(&self) -> Vec<String> {
        self.state.lock().unwrap().containers.keys().cloned().collect()
    }

    /// Host config ids whose cached clients were dropped, in order.
    pub fn invalidated(&self) -> Vec<i64> {
        self.state.lock().unwrap().invalidated.clone()
    }

    /// Number of create calls so far.
    pub fn creates(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::Create { .. }))
            .count()
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait::async_trait]
impl ContainerEngine for FakeEngine {
    async fn list_images(&self, _host: &HostConfig) -> ChallengeboxResult<Vec<ImageSummary>> {
        Ok(self.state.lock().unwrap().images.clone())
    }

    async fn inspect_image(
        &self,
        _host: &HostConfig,
        reference: &str,
    ) -> ChallengeboxResult<ImageInspect> {
        let state = self.state.lock().unwrap();
        let Some(ports) = state.exposed.get(reference) else {
            return Err(ChallengeboxError::EngineRejected {
                status: 404,
                message: format!("No such image: {reference}"),
            });
        };

        Ok(ImageInspect {
            id: format!("sha256:{reference}"),
            config: Some(ImageConfig {
                exposed_ports: Some(
                    ports
                        .iter()
                        .map(|p| (p.clone(), serde_json::json!({})))
                        .collect(),
                ),
            }),
            container_config: None,
        })
    }

    async fn list_containers(
        &self,
        _host: &HostConfig,
    ) -> ChallengeboxResult<Vec<ContainerSummary>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .containers
            .values()
            .cloned()
            .collect())
    }

    async fn create_container(
        &self,
        _host: &HostConfig,
        name: &str,
        request: &CreateContainerRequest,
    ) -> ChallengeboxResult<String> {
        let delay = self.state.lock().unwrap().create_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("c{:04}", state.next_id);

        let ports = request
            .host_config
            .port_bindings
            .iter()
            .flat_map(|(container_port, bindings)| {
                let (private, protocol) = container_port
                    .split_once('/')
                    .unwrap_or((container_port.as_str(), "tcp"));
                bindings.iter().map(move |binding| PortSummary {
                    private_port: private.parse().unwrap_or_default(),
                    public_port: binding.host_port.parse().ok(),
                    protocol: protocol.to_string(),
                })
            })
            .collect();

        state.containers.insert(
            id.clone(),
            ContainerSummary {
                id: id.clone(),
                names: Some(vec![format!("/{name}")]),
                ports: Some(ports),
            },
        );
        state.calls.push(Call::Create {
            name: name.to_string(),
            image: request.image.clone(),
        });

        Ok(id)
    }

    async fn start_container(&self, _host: &HostConfig, id: &str) -> ChallengeboxResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Start(id.to_string()));
        if std::mem::take(&mut state.fail_next_start) {
            return Err(ChallengeboxError::EngineRejected {
                status: 500,
                message: "cannot start container".into(),
            });
        }

        Ok(())
    }

    async fn remove_container(&self, _host: &HostConfig, id: &str) -> ChallengeboxResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Remove(id.to_string()));
        if state.failing_removals.contains(id) {
            return Err(ChallengeboxError::EngineUnreachable(format!(
                "connection refused while removing {id}"
            )));
        }

        state.containers.remove(id);
        Ok(())
    }

    fn invalidate_host(&self, host_id: i64) {
        self.state.lock().unwrap().invalidated.push(host_id);
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// A manager over a fresh in-memory database, with default policy.
pub async fn manager(
    engine: Arc<FakeEngine>,
    clock: ManualClock,
) -> anyhow::Result<LifecycleManager> {
    manager_with_policy(engine, clock, LifecyclePolicy::default()).await
}

/// A manager over a fresh in-memory database.
pub async fn manager_with_policy(
    engine: Arc<FakeEngine>,
    clock: ManualClock,
    policy: LifecyclePolicy,
) -> anyhow::Result<LifecycleManager> {
    let pool = store::memory_db().await?;
    Ok(LifecycleManager::builder()
        .engine(engine)
        .hosts(HostStore::new(pool.clone()))
        .tracker(InstanceTracker::new(pool))
        .policy(policy)
        .clock(Arc::new(clock))
        .build())
}

/// Registers a plain-HTTP host for `owner_id`.
pub async fn register_host(
    manager: &LifecycleManager,
    owner_id: &str,
    hostname: &str,
) -> anyhow::Result<HostConfig> {
    Ok(manager
        .save_host(
            HostConfigUpdate::builder()
                .owner_id(owner_id)
                .hostname(hostname)
                .build(),
        )
        .await?)
}
