//! KDL configuration parsing for hostkit.
//!
//! This crate handles parsing of:
//! - Stack definitions (hostkit.kdl)
//! - Variable interpolation for per-environment values

pub mod error;
pub mod stack;
pub mod variables;

pub use error::{ConfigError, ConfigResult};
pub use stack::{StackDefinition, load_stack_config, parse_stack_config};
pub use variables::{StackContext, VariableContext, VariableContextBuilder, parse_assignment};
