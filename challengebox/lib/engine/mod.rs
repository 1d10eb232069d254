//! Container engine access: the HTTP client, the wire types, and the trait the lifecycle
//! manager is written against.

mod client;
mod traits;
mod types;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use client::*;
pub use traits::*;
pub use types::*;
