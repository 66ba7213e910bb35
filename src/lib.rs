//! Cloud Sweeper - account-wide cloud resource cleanup
//!
//! This crate provides functionality for:
//! - Registering resource types with their dependencies
//! - Enumerating every resource of an account across regions
//! - Deciding per resource whether it is kept or removed
//! - Removing resources in dependency order with retries and cancellation

pub mod cancel;
pub mod cli;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod inventory;
pub mod resources;
pub mod signals;

// Re-export commonly used types
pub use cancel::CancelToken;
pub use config::Config;
pub use engine::{ExecutionPlan, FilterEngine, RunReport, ScanTarget, Sweeper, SweeperOptions};
pub use error::{Result, SweeperError};
pub use resources::{ResourceHandle, ResourceTypeDescriptor, ResourceTypeRegistry, Scope};
