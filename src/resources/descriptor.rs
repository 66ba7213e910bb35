//! Resource type descriptors and the lister contract.

use crate::cancel::CancelToken;
use crate::error::ListError;
use crate::resources::ResourceHandle;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Boundary within which a resource type is enumerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Enumerated once for the whole account.
    Account,
    /// Enumerated once per targeted region.
    Region,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Account => write!(f, "account"),
            Scope::Region => write!(f, "region"),
        }
    }
}

/// Context handed to a lister.
#[derive(Debug, Clone)]
pub struct ScanContext {
    pub account_id: String,
    /// `None` for account-scoped types.
    pub region: Option<String>,
    /// Cancelled on run cancellation or when the scan deadline passes.
    pub cancel: CancelToken,
}

/// Enumerates existing instances of one resource type.
///
/// Pagination and provider rate limiting are the lister's own concern.
pub trait Lister: Send + Sync {
    fn list(&self, ctx: &ScanContext) -> Result<Vec<Box<dyn ResourceHandle>>, ListError>;
}

impl<F> Lister for F
where
    F: Fn(&ScanContext) -> Result<Vec<Box<dyn ResourceHandle>>, ListError> + Send + Sync,
{
    fn list(&self, ctx: &ScanContext) -> Result<Vec<Box<dyn ResourceHandle>>, ListError> {
        self(ctx)
    }
}

/// Static description of one resource type.
#[derive(Clone)]
pub struct ResourceTypeDescriptor {
    name: String,
    scope: Scope,
    lister: Arc<dyn Lister>,
    depends_on: Vec<String>,
    deprecated_aliases: Vec<String>,
}

impl ResourceTypeDescriptor {
    pub fn new(name: impl Into<String>, scope: Scope, lister: impl Lister + 'static) -> Self {
        Self::with_shared_lister(name, scope, Arc::new(lister))
    }

    pub fn with_shared_lister(
        name: impl Into<String>,
        scope: Scope,
        lister: Arc<dyn Lister>,
    ) -> Self {
        Self {
            name: name.into(),
            scope,
            lister,
            depends_on: Vec::new(),
            deprecated_aliases: Vec::new(),
        }
    }

    /// Declare types whose resources must be removed before this type's.
    pub fn depends_on<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            push_unique(&mut self.depends_on, name.into());
        }
        self
    }

    /// Declare former names still accepted in configuration.
    pub fn deprecated_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for alias in aliases {
            push_unique(&mut self.deprecated_aliases, alias.into());
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn lister(&self) -> &Arc<dyn Lister> {
        &self.lister
    }

    pub fn dependencies(&self) -> &[String] {
        &self.depends_on
    }

    pub fn aliases(&self) -> &[String] {
        &self.deprecated_aliases
    }
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

impl fmt::Debug for ResourceTypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceTypeDescriptor")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .field("depends_on", &self.depends_on)
            .field("deprecated_aliases", &self.deprecated_aliases)
            .finish_non_exhaustive()
    }
}
