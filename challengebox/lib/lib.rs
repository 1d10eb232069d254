//! `challengebox` provisions and reclaims per-owner challenge containers on remote container
//! engines.
//!
//! # Overview
//!
//! A CTF platform offers challenges that each run in their own container. challengebox gives every
//! owner (a team or a user, fixed per deployment) at most one instance of each challenge image and
//! handles:
//! - Container creation on the owner's configured engine host
//! - Host port allocation that avoids ports already in use
//! - Reverting an instance once it is old enough
//! - Reclaiming stale instances, solved challenges and administrator-selected instances
//!
//! # Architecture
//!
//! - **Engine**: an HTTP client for the Docker Engine API, with per-host mutual-TLS
//! - **Store**: SQLite tables of host configurations and tracked instances
//! - **Lifecycle**: the manager that ties the engine and the store together under per-slot locks
//! - **Server**: the JSON API the challenge platform and its administrators call
//! - **Challenge**: the glue a platform uses to expose a "docker" challenge type
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use challengebox::{
//!     engine::HttpEngine,
//!     lifecycle::LifecycleManager,
//!     models::HostConfigUpdate,
//!     store::{self, HostStore, InstanceTracker},
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pool = store::memory_db().await?;
//!     let manager = LifecycleManager::builder()
//!         .engine(Arc::new(HttpEngine::new(std::time::Duration::from_secs(30))?))
//!         .hosts(HostStore::new(pool.clone()))
//!         .tracker(InstanceTracker::new(pool))
//!         .build();
//!
//!     manager
//!         .save_host(
//!             HostConfigUpdate::builder()
//!                 .owner_id("42")
//!                 .hostname("10.0.0.5:2375")
//!                 .build(),
//!         )
//!         .await?;
//!
//!     let owner = manager.owner("42", "rocket");
//!     let record = manager.request_container(&owner, "web:latest").await?;
//!     println!("{} -> {:?}", record.get_host(), record.get_allocated_ports());
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`catalog`] - Images offered by a host
//! - [`challenge`] - The docker challenge type
//! - [`cli`] - Command-line interface and argument parsing
//! - [`config`] - Settings, image references and port pairs
//! - [`engine`] - Container engine client
//! - [`lifecycle`] - Provisioning, revert and reclamation
//! - [`models`] - Owners, host configurations and instance records
//! - [`platform`] - What challengebox needs from the hosting platform
//! - [`ports`] - Host port allocation
//! - [`server`] - REST API server implementation
//! - [`store`] - SQLite persistence
//! - [`utils`] - Common utilities and helpers

#![warn(missing_docs)]

mod error;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub mod catalog;
pub mod challenge;
pub mod cli;
pub mod config;
pub mod engine;
pub mod lifecycle;
pub mod models;
pub mod platform;
pub mod ports;
pub mod server;
pub mod store;
pub mod utils;

pub use error::*;
