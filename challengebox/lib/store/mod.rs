//! SQLite persistence for host configurations and tracked instances.

mod db;
mod hosts;
mod instances;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use db::*;
pub use hosts::*;
pub use instances::*;
