use std::collections::BTreeSet;

use sqlx::{sqlite::SqliteRow, Pool, Row, Sqlite};

use crate::{
    models::{HostConfig, HostConfigUpdate, TlsMaterial},
    ChallengeboxResult,
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

const HOST_COLUMNS: &str =
    "id, owner_id, hostname, tls_enabled, ca_cert, client_cert, client_key, repositories";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Host configurations, one per owner.
#[derive(Debug, Clone)]
pub struct HostStore {
    pool: Pool<Sqlite>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl HostStore {
    /// Creates a store over `pool`.
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// The host configured for `owner_id`.
    pub async fn get_by_owner(&self, owner_id: &str) -> ChallengeboxResult<Option<HostConfig>> {
        let row = sqlx::query(&format!(
            "SELECT {HOST_COLUMNS} FROM host_configs WHERE owner_id = ?"
        ))
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(host_from_row).transpose()
    }

    /// The host config with row id `id`.
    pub async fn get(&self, id: i64) -> ChallengeboxResult<Option<HostConfig>> {
        let row = sqlx::query(&format!("SELECT {HOST_COLUMNS} FROM host_configs WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(host_from_row).transpose()
    }

    /// Every host config, oldest first.
    pub async fn list(&self) -> ChallengeboxResult<Vec<HostConfig>> {
        let rows = sqlx::query(&format!("SELECT {HOST_COLUMNS} FROM host_configs ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(host_from_row).collect()
    }

    /// The reference host: the first one configured. Admin catalog listings read from it.
    pub async fn reference(&self) -> ChallengeboxResult<Option<HostConfig>> {
        let row = sqlx::query(&format!(
            "SELECT {HOST_COLUMNS} FROM host_configs ORDER BY id LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(host_from_row).transpose()
    }

    /// Creates or replaces the config of the update's owner.
    pub async fn upsert(&self, update: HostConfigUpdate) -> ChallengeboxResult<HostConfig> {
        let update = update.validate()?;
        let repositories = update
            .allowed_repositories
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(",");

        let tls = update.tls.as_ref();
        let row = sqlx::query(
            r#"
            INSERT INTO host_configs (
                owner_id, hostname, tls_enabled,
                ca_cert, client_cert, client_key, repositories
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (owner_id) DO UPDATE SET
                hostname = excluded.hostname,
                tls_enabled = excluded.tls_enabled,
                ca_cert = excluded.ca_cert,
                client_cert = excluded.client_cert,
                client_key = excluded.client_key,
                repositories = excluded.repositories,
                updated_at = CURRENT_TIMESTAMP
            RETURNING id
            "#,
        )
        .bind(&update.owner_id)
        .bind(&update.hostname)
        .bind(tls.is_some())
        .bind(tls.map(|t| t.ca_cert()))
        .bind(tls.map(|t| t.client_cert()))
        .bind(tls.map(|t| t.client_key()))
        .bind(repositories)
        .fetch_one(&self.pool)
        .await?;

        let id = row.get::<i64, _>("id");
        tracing::info!(
            "saved host config {} for owner {} ({}, tls: {})",
            id,
            update.owner_id,
            update.hostname,
            update.tls.is_some()
        );

        Ok(HostConfig::from_parts(
            id,
            update.owner_id,
            update.hostname,
            update.tls,
            update.allowed_repositories,
        ))
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

fn host_from_row(row: &SqliteRow) -> ChallengeboxResult<HostConfig> {
    let tls_enabled: bool = row.try_get("tls_enabled")?;
    let tls = if tls_enabled {
        let ca_cert: Option<Vec<u8>> = row.try_get("ca_cert")?;
        let client_cert: Option<Vec<u8>> = row.try_get("client_cert")?;
        let client_key: Option<Vec<u8>> = row.try_get("client_key")?;
        match (ca_cert, client_cert, client_key) {
            (Some(ca), Some(cert), Some(key)) => Some(TlsMaterial::new(ca, cert, key)),
            _ => {
                tracing::warn!("host config with tls enabled is missing certificates");
                None
            }
        }
    } else {
        None
    };

    let repositories: String = row.try_get("repositories")?;
    let allowed_repositories: BTreeSet<String> = repositories
        .split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(String::from)
        .collect();

    Ok(HostConfig::from_parts(
        row.try_get("id")?,
        row.try_get("owner_id")?,
        row.try_get("hostname")?,
        tls,
        allowed_repositories,
    ))
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
