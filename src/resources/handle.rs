//! Core trait for a single enumerated resource.

use crate::cancel::CancelToken;
use crate::error::RemovalError;
use crate::resources::Properties;
use thiserror::Error;

/// Reason given by a handle's own filter for keeping the resource.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct KeepReason(pub String);

impl KeepReason {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Context passed to every remove call.
#[derive(Debug, Clone)]
pub struct ExecContext {
    /// Run-scoped cancellation signal.
    pub cancel: CancelToken,
}

impl ExecContext {
    pub fn new(cancel: CancelToken) -> Self {
        Self { cancel }
    }
}

impl Default for ExecContext {
    fn default() -> Self {
        Self::new(CancelToken::new())
    }
}

/// One concrete resource instance produced by a lister.
///
/// Implement this trait in a resource-type adapter. The handle is responsible
/// for:
/// - Naming the resource for logs and reports
/// - Describing it with properties that filter rules can match on
/// - Refusing removal of resources its provider must never lose
/// - Removing it, as one logical operation
pub trait ResourceHandle: Send + Sync {
    /// Display identity (e.g., "subnet-0abc", a user name).
    fn identity(&self) -> String;

    /// Structured properties; tag-derived keys use the `tag:` prefix.
    fn properties(&self) -> Properties {
        Properties::new()
    }

    /// Adapter-level keep rule.
    ///
    /// Must be pure. Returning `Err` keeps the resource with that reason.
    fn filter(&self) -> Result<(), KeepReason> {
        Ok(())
    }

    /// Remove the resource.
    ///
    /// Removing an already absent resource should report
    /// [`RemovalError::NotFound`].
    fn remove(&self, ctx: &ExecContext) -> Result<(), RemovalError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MainRouteTable;

    impl ResourceHandle for MainRouteTable {
        fn identity(&self) -> String {
            "rtb-main".to_string()
        }

        fn filter(&self) -> Result<(), KeepReason> {
            Err(KeepReason::new("main route tables cannot be deleted"))
        }

        fn remove(&self, _ctx: &ExecContext) -> Result<(), RemovalError> {
            Err(RemovalError::other("should never be called"))
        }
    }

    struct PlainSubnet;

    impl ResourceHandle for PlainSubnet {
        fn identity(&self) -> String {
            "subnet-1".to_string()
        }

        fn remove(&self, _ctx: &ExecContext) -> Result<(), RemovalError> {
            Ok(())
        }
    }

    #[test]
    fn default_filter_allows_removal() {
        let handle = PlainSubnet;
        assert!(handle.filter().is_ok());
        assert!(handle.properties().is_empty());
        assert!(handle.remove(&ExecContext::default()).is_ok());
    }

    #[test]
    fn custom_filter_reports_reason() {
        let handle = MainRouteTable;
        let reason = handle.filter().unwrap_err();
        assert_eq!(reason.to_string(), "main route tables cannot be deleted");
    }
}
