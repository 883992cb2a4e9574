//! flowkeep core library: domain types, configuration, errors.
//!
//! - [`types`]: newtypes and the remote [`Flow`] record
//! - [`config`]: YAML configuration loading and validation
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, GitIdentity, InstanceConfig};
pub use error::ConfigError;
pub use types::{Flow, FlowId, InstanceName, UNCATEGORIZED};
