//! Utility functions and types.

mod env;
mod hash;
mod path;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use env::*;
pub use hash::*;
pub use path::*;
