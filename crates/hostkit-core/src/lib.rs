//! Core domain types for hostkit provisioning stacks.
//!
//! This crate contains:
//! - Deferred values that the reconciler resolves after apply
//! - Logical identifiers and construct paths
//! - IAM principals, roles and policies
//! - Build specification encoding
//! - Hosted application and branch resources
//! - The stack scope tree and template rendering
//! - Assembly of the hosted application stack

pub mod application;
pub mod buildspec;
pub mod error;
pub mod hosting;
pub mod iam;
pub mod id;
pub mod secret;
pub mod stack;
pub mod token;

pub use error::{Error, Result};
pub use hosting::{HostingConfig, build};
pub use id::{ConstructPath, LogicalId};
pub use stack::{App, Stack, StackOptions, TemplateFormat};
pub use token::{Expr, Resolver, StaticResolver};
