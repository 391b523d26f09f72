pub mod config;
pub mod entity;
pub mod error;
pub mod propagation;
pub mod registry;
pub mod resolver;
pub mod traits;
pub mod types;

#[cfg(test)]
mod test_support;

pub use config::{ConfigError, ConfigManager, LoggingConfig, PropagationConfig, RippleConfig};
pub use entity::*;
pub use error::*;
pub use propagation::*;
pub use registry::*;
pub use resolver::*;
pub use traits::*;
pub use types::*;
