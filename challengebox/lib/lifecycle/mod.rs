//! The container lifecycle: provisioning, revert, stale sweeps, solve reclamation and admin
//! teardown.

mod admin;
mod clock;
mod locks;
mod manager;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use admin::*;
pub use clock::*;
pub(crate) use locks::KeyedLocks;
pub use locks::SlotKey;
pub use manager::*;
