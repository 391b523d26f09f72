pub mod dataset;
pub mod memory;

pub use dataset::*;
pub use memory::*;
