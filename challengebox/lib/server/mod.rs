//! The HTTP surface challengebox exposes to the challenge platform.
//!
//! Player endpoints live under `/api/v1`:
//! - `GET /api/v1/container?name=<image>` provisions or reverts the caller's instance
//! - `GET /api/v1/docker_status` lists the caller's instances
//!
//! Administrator endpoints:
//! - `GET /api/v1/docker` lists the images of the reference host
//! - `GET /api/v1/nuke?container=<id>&owner_id=<id>` or `?all=true` tears instances down
//! - `GET|POST /admin/docker_config` reads and writes host configurations
//! - `GET /admin/docker_status` lists every tracked instance

mod api;
mod data;
mod state;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use api::*;
pub use data::*;
pub use state::*;
