//! Resource type plugins.
//!
//! This module provides:
//! - The handle trait implemented by resource-type adapters
//! - Type descriptors with scope, lister and dependency edges
//! - The registry the engine reads type information from

mod descriptor;
mod handle;
mod properties;
mod registry;

pub use descriptor::{Lister, ResourceTypeDescriptor, ScanContext, Scope};
pub use handle::{ExecContext, KeepReason, ResourceHandle};
pub use properties::{Properties, TAG_PREFIX};
pub use registry::{ResourceTypeRegistry, ScopeFilter};
