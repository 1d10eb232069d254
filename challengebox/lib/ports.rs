//! Host port allocation for challenge containers.
//!
//! There is no reservation table: the exclusion set is read from the engine on every allocation,
//! so the engine's own listing of published ports is the source of truth.

use std::{
    collections::{BTreeSet, HashSet},
    ops::RangeInclusive,
};

use rand::Rng;

use crate::{
    config::{ContainerPort, PortPair},
    engine::ContainerEngine,
    models::HostConfig,
    ChallengeboxError, ChallengeboxResult,
};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// The ports `reference` declares as exposed, in ascending order.
pub async fn required_ports(
    engine: &dyn ContainerEngine,
    host: &HostConfig,
    reference: &str,
) -> ChallengeboxResult<Vec<ContainerPort>> {
    let inspect = engine.inspect_image(host, reference).await?;
    let ports = inspect
        .exposed_port_keys()
        .into_iter()
        .map(str::parse)
        .collect::<ChallengeboxResult<BTreeSet<ContainerPort>>>()?;

    Ok(ports.into_iter().collect())
}

/// Every host port published by any container on `host`, running or stopped.
pub async fn unavailable_ports(
    engine: &dyn ContainerEngine,
    host: &HostConfig,
) -> ChallengeboxResult<HashSet<u16>> {
    let containers = engine.list_containers(host).await?;
    Ok(containers
        .iter()
        .flat_map(|container| container.public_ports())
        .collect())
}

/// Draws `needed` distinct ports from `range`, none of them in `excluded`.
///
/// Each required port gets `max_attempts` random draws; running out yields
/// [`ChallengeboxError::PortExhausted`].
pub fn allocate(
    needed: usize,
    excluded: &HashSet<u16>,
    range: RangeInclusive<u16>,
    max_attempts: usize,
    rng: &mut impl Rng,
) -> ChallengeboxResult<Vec<u16>> {
    let mut allocated = Vec::with_capacity(needed);
    let mut attempts = 0;
    let budget = max_attempts.saturating_mul(needed);

    while allocated.len() < needed {
        if attempts >= budget || range.is_empty() {
            return Err(ChallengeboxError::PortExhausted { needed, attempts });
        }

        attempts += 1;
        let candidate = rng.random_range(range.clone());
        if !excluded.contains(&candidate) && !allocated.contains(&candidate) {
            allocated.push(candidate);
        }
    }

    Ok(allocated)
}

/// Pairs container ports with host ports positionally.
pub fn bind(container_ports: &[ContainerPort], host_ports: &[u16]) -> Vec<PortPair> {
    container_ports
        .iter()
        .zip(host_ports)
        .map(|(container, host)| PortPair::new(*host, container.clone()))
        .collect()
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
