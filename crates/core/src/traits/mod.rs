pub mod coordination_store;
pub mod plugin;

pub use coordination_store::*;
pub use plugin::*;
