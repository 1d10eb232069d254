use serde::Serialize;

use crate::{models::InstanceRecord, ChallengeboxError, ChallengeboxResult};

use super::{LifecycleManager, SlotKey};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// What an administrator wants torn down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReclaimTarget {
    /// One tracked instance, by engine container id.
    Instance {
        /// The engine's container id.
        engine_instance_id: String,

        /// Owner whose host config should be used. Defaults to the record's owner.
        owner_id: Option<String>,
    },

    /// Every tracked instance on every host.
    All,
}

/// Outcome of a forced teardown.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ReclaimReport {
    /// Engine ids of the instances whose records were removed.
    pub removed: Vec<String>,

    /// Instances that could not be torn down cleanly.
    pub failures: Vec<ReclaimFailure>,
}

/// A failed teardown of one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReclaimFailure {
    /// The engine's container id.
    pub engine_instance_id: String,

    /// The instance owner.
    pub owner_id: String,

    /// What went wrong.
    pub error: String,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ReclaimReport {
    /// Whether every teardown succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn fail(&mut self, record: &InstanceRecord, owner_id: &str, error: &ChallengeboxError) {
        self.failures.push(ReclaimFailure {
            engine_instance_id: record.get_engine_instance_id().clone(),
            owner_id: owner_id.to_string(),
            error: error.to_string(),
        });
    }
}

impl LifecycleManager {
    /// Tears down instances regardless of ownership and age.
    ///
    /// A single instance keeps its record when the engine refuses to remove its container. For
    /// [`ReclaimTarget::All`] every record is removed whatever the engine says, and engine
    /// failures are collected in the report instead of aborting the batch.
    pub async fn admin_force_delete(
        &self,
        target: ReclaimTarget,
    ) -> ChallengeboxResult<ReclaimReport> {
        match target {
            ReclaimTarget::Instance {
                engine_instance_id,
                owner_id,
            } => self.force_delete_one(&engine_instance_id, owner_id).await,
            ReclaimTarget::All => self.force_delete_all().await,
        }
    }

    async fn force_delete_one(
        &self,
        engine_instance_id: &str,
        owner_id: Option<String>,
    ) -> ChallengeboxResult<ReclaimReport> {
        let record = self
            .get_tracker()
            .find_by_engine_id(engine_instance_id)
            .await?
            .ok_or_else(|| ChallengeboxError::InstanceNotFound(engine_instance_id.to_string()))?;

        let owner_id = owner_id.unwrap_or_else(|| record.get_owner_id().clone());
        let _slot_guard = self.lock_slot(&slot_of(&record)).await;

        let mut report = ReclaimReport::default();
        let result = match self.host_for(&owner_id).await {
            Ok(host) => self.teardown(&host, &record).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                tracing::info!(
                    "admin removed instance {} of {}",
                    engine_instance_id,
                    record.get_owner_id()
                );
                report.removed.push(engine_instance_id.to_string());
            }
            Err(e) => {
                tracing::warn!("admin removal of {} failed: {}", engine_instance_id, e);
                report.fail(&record, &owner_id, &e);
            }
        }

        Ok(report)
    }

    async fn force_delete_all(&self) -> ChallengeboxResult<ReclaimReport> {
        let records = self.get_tracker().all().await?;
        let mut report = ReclaimReport::default();
        tracing::info!("admin removing all {} tracked instance(s)", records.len());

        for record in records {
            let owner_id = record.get_owner_id();
            let _slot_guard = self.lock_slot(&slot_of(&record)).await;

            let engine_result = match self.host_for(owner_id).await {
                Ok(host) => {
                    self.get_engine()
                        .remove_container(&host, record.get_engine_instance_id())
                        .await
                }
                Err(e) => Err(e),
            };

            if let Err(e) = engine_result {
                tracing::warn!(
                    "could not remove container {} of {}: {}",
                    record.get_engine_instance_id(),
                    owner_id,
                    e
                );
                report.fail(&record, owner_id, &e);
            }

            match self.get_tracker().remove(*record.get_id()).await {
                Ok(_) => report
                    .removed
                    .push(record.get_engine_instance_id().clone()),
                Err(e) => {
                    tracing::error!("could not remove record {}: {}", record.get_id(), e);
                    report.fail(&record, owner_id, &e);
                }
            }
        }

        Ok(report)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

fn slot_of(record: &InstanceRecord) -> SlotKey {
    SlotKey::from_parts(
        *record.get_owner_kind(),
        record.get_owner_id().as_str(),
        record.get_image().as_str(),
    )
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_is_clean_without_failures() {
        let mut report = ReclaimReport::default();
        report.removed.push("abc".into());
        assert!(report.is_clean());

        report.failures.push(ReclaimFailure {
            engine_instance_id: "def".into(),
            owner_id: "1".into(),
            error: "engine down".into(),
        });
        assert!(!report.is_clean());
    }
}
