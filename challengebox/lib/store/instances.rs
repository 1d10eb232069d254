use sqlx::{sqlite::SqliteRow, Pool, Row, Sqlite};

use crate::{
    models::{InstanceRecord, NewInstance, Owner, OwnerKind},
    ChallengeboxError, ChallengeboxResult,
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

const INSTANCE_COLUMNS: &str = "instances.id, instances.owner_kind, instances.owner_id, \
     instances.image, instances.reference, instances.created_at, instances.revertible_after, \
     instances.engine_instance_id, instances.ports, instances.host";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Durable record of which owner holds which challenge container.
///
/// The tracker is pure persistence. It enforces one record per (owner, image) slot through a
/// unique index and leaves every engine interaction to the lifecycle manager.
#[derive(Debug, Clone)]
pub struct InstanceTracker {
    pool: Pool<Sqlite>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl InstanceTracker {
    /// Creates a tracker over `pool`.
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// The record occupying the slot of `owner_kind`/`owner_id` and `image`, if any.
    pub async fn find(
        &self,
        owner_kind: OwnerKind,
        owner_id: &str,
        image: &str,
    ) -> ChallengeboxResult<Option<InstanceRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {INSTANCE_COLUMNS} FROM instances \
             WHERE owner_kind = ? AND owner_id = ? AND image = ?"
        ))
        .bind(owner_kind.as_str())
        .bind(owner_id)
        .bind(image)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    /// The record with row id `id`.
    pub async fn get(&self, id: i64) -> ChallengeboxResult<Option<InstanceRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {INSTANCE_COLUMNS} FROM instances WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    /// The record backed by engine container `engine_instance_id`.
    pub async fn find_by_engine_id(
        &self,
        engine_instance_id: &str,
    ) -> ChallengeboxResult<Option<InstanceRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {INSTANCE_COLUMNS} FROM instances WHERE engine_instance_id = ?"
        ))
        .bind(engine_instance_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    /// Every record held by `owner`, oldest first.
    pub async fn find_all_for_owner(&self, owner: &Owner) -> ChallengeboxResult<Vec<InstanceRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {INSTANCE_COLUMNS} FROM instances \
             WHERE owner_kind = ? AND owner_id = ? ORDER BY id"
        ))
        .bind(owner.get_kind().as_str())
        .bind(owner.get_id())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    /// Every record whose owner is served by the engine at `hostname`.
    pub async fn find_all_for_host(&self, hostname: &str) -> ChallengeboxResult<Vec<InstanceRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {INSTANCE_COLUMNS} FROM instances \
             JOIN host_configs ON host_configs.owner_id = instances.owner_id \
             WHERE host_configs.hostname = ? ORDER BY instances.id"
        ))
        .bind(hostname)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    /// Every tracked record, oldest first.
    pub async fn all(&self) -> ChallengeboxResult<Vec<InstanceRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {INSTANCE_COLUMNS} FROM instances ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    /// Every record created at or before `cutoff`, oldest first.
    pub async fn stale(&self, cutoff: i64) -> ChallengeboxResult<Vec<InstanceRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {INSTANCE_COLUMNS} FROM instances WHERE created_at <= ? ORDER BY id"
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    /// Inserts a record into an empty slot.
    ///
    /// Fails with [`ChallengeboxError::DuplicateSlot`] when the slot is taken; callers remove the
    /// previous record first.
    pub async fn insert(&self, new: NewInstance) -> ChallengeboxResult<InstanceRecord> {
        let ports = new
            .allocated_ports
            .iter()
            .map(u16::to_string)
            .collect::<Vec<_>>()
            .join(",");

        let result = sqlx::query(
            r#"
            INSERT INTO instances (
                owner_kind, owner_id, image, reference, created_at,
                revertible_after, engine_instance_id, ports, host
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(new.owner_kind.as_str())
        .bind(&new.owner_id)
        .bind(&new.image)
        .bind(&new.reference)
        .bind(new.created_at)
        .bind(new.revertible_after)
        .bind(&new.engine_instance_id)
        .bind(ports)
        .bind(&new.host)
        .fetch_one(&self.pool)
        .await;

        let row = match result {
            Ok(row) => row,
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(ChallengeboxError::DuplicateSlot {
                    owner: format!("{}:{}", new.owner_kind, new.owner_id),
                    image: new.image,
                });
            }
            Err(e) => return Err(e.into()),
        };

        let id = row.try_get::<i64, _>("id")?;
        tracing::debug!(
            "tracked instance {} ({}) for {}:{}",
            id,
            new.engine_instance_id,
            new.owner_kind,
            new.owner_id
        );

        Ok(InstanceRecord::from_new(id, new))
    }

    /// Removes a record. Returns whether a record was removed; a missing id is not an error.
    pub async fn remove(&self, id: i64) -> ChallengeboxResult<bool> {
        let result = sqlx::query("DELETE FROM instances WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

fn record_from_row(row: &SqliteRow) -> ChallengeboxResult<InstanceRecord> {
    let owner_kind: String = row.try_get("owner_kind")?;
    let ports: String = row.try_get("ports")?;
    let allocated_ports = ports
        .split(',')
        .filter(|p| !p.is_empty())
        .map(|p| {
            p.parse::<u16>().map_err(|e| {
                ChallengeboxError::custom(anyhow::anyhow!("corrupt port list {ports:?}: {e}"))
            })
        })
        .collect::<ChallengeboxResult<Vec<_>>>()?;

    let new = NewInstance {
        owner_kind: owner_kind.parse()?,
        owner_id: row.try_get("owner_id")?,
        image: row.try_get("image")?,
        reference: row.try_get("reference")?,
        created_at: row.try_get("created_at")?,
        revertible_after: row.try_get("revertible_after")?,
        engine_instance_id: row.try_get("engine_instance_id")?,
        allocated_ports,
        host: row.try_get("host")?,
    };

    Ok(InstanceRecord::from_new(row.try_get("id")?, new))
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::HostConfigUpdate,
        store::{memory_db, HostStore},
    };

    fn new_instance(owner_id: &str, image: &str, created_at: i64) -> NewInstance {
        NewInstance::builder()
            .owner_kind(OwnerKind::User)
            .owner_id(owner_id)
            .image(image)
            .reference(format!("{image}:latest"))
            .created_at(created_at)
            .revertible_after(created_at + 300)
            .engine_instance_id(format!("c-{owner_id}-{image}"))
            .allocated_ports(vec![31000, 31001])
            .host("10.0.0.1")
            .build()
    }

    #[tokio::test]
    async fn test_insert_and_find() -> anyhow::Result<()> {
        let tracker = InstanceTracker::new(memory_db().await?);

        let inserted = tracker.insert(new_instance("1", "web", 10)).await?;
        let found = tracker
            .find(OwnerKind::User, "1", "web")
            .await?
            .expect("record for slot");

        assert_eq!(inserted, found);
        assert_eq!(found.get_allocated_ports(), &vec![31000, 31001]);
        assert_eq!(found.get_reference(), "web:latest");
        assert!(tracker.find(OwnerKind::Team, "1", "web").await?.is_none());

        let by_engine = tracker.find_by_engine_id("c-1-web").await?;
        assert_eq!(by_engine.map(|r| *r.get_id()), Some(*inserted.get_id()));
        Ok(())
    }

    #[tokio::test]
    async fn test_insert_into_taken_slot_fails() -> anyhow::Result<()> {
        let tracker = InstanceTracker::new(memory_db().await?);
        tracker.insert(new_instance("1", "web", 10)).await?;

        let result = tracker.insert(new_instance("1", "web", 20)).await;
        assert!(matches!(
            result,
            Err(ChallengeboxError::DuplicateSlot { .. })
        ));

        // Another image or owner is a different slot.
        tracker.insert(new_instance("1", "pwn", 20)).await?;
        tracker.insert(new_instance("2", "web", 20)).await?;
        assert_eq!(tracker.all().await?.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() -> anyhow::Result<()> {
        let tracker = InstanceTracker::new(memory_db().await?);
        let record = tracker.insert(new_instance("1", "web", 10)).await?;

        assert!(tracker.remove(*record.get_id()).await?);
        assert!(!tracker.remove(*record.get_id()).await?);
        assert!(!tracker.remove(9999).await?);

        // The slot is free again.
        tracker.insert(new_instance("1", "web", 30)).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_owner_host_and_stale_queries() -> anyhow::Result<()> {
        let pool = memory_db().await?;
        let tracker = InstanceTracker::new(pool.clone());
        let hosts = HostStore::new(pool);

        hosts
            .upsert(
                HostConfigUpdate::builder()
                    .owner_id("1")
                    .hostname("10.0.0.1:2375")
                    .build(),
            )
            .await?;
        hosts
            .upsert(
                HostConfigUpdate::builder()
                    .owner_id("2")
                    .hostname("10.0.0.2:2375")
                    .build(),
            )
            .await?;

        tracker.insert(new_instance("1", "web", 0)).await?;
        tracker.insert(new_instance("1", "pwn", 5000)).await?;
        tracker.insert(new_instance("2", "web", 100)).await?;

        let owner = Owner::new(OwnerKind::User, "1", "alice");
        assert_eq!(tracker.find_all_for_owner(&owner).await?.len(), 2);

        let on_first = tracker.find_all_for_host("10.0.0.1:2375").await?;
        assert_eq!(on_first.len(), 2);
        assert!(on_first.iter().all(|r| r.get_owner_id() == "1"));
        assert!(tracker.find_all_for_host("10.0.0.9:2375").await?.is_empty());

        let stale = tracker.stale(100).await?;
        assert_eq!(
            stale.iter().map(|r| r.get_image().as_str()).collect::<Vec<_>>(),
            vec!["web", "web"]
        );
        Ok(())
    }
}
