//! Configuration types and helpers.

mod defaults;
mod image_ref;
mod port_pair;
mod settings;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use defaults::*;
pub use image_ref::*;
pub use port_pair::*;
pub use settings::*;
