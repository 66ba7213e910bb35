//! Registry of resource type descriptors.

use crate::error::{ConfigError, RegistryError};
use crate::resources::{ResourceTypeDescriptor, Scope};
use std::collections::{HashMap, HashSet};

/// Which descriptors [`ResourceTypeRegistry::list_all`] returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeFilter {
    Any,
    Only(Scope),
}

impl ScopeFilter {
    fn matches(self, scope: Scope) -> bool {
        match self {
            ScopeFilter::Any => true,
            ScopeFilter::Only(wanted) => wanted == scope,
        }
    }
}

/// Catalog of every known resource type.
///
/// Populated once by the process entry point; afterwards it is only read,
/// usually behind an `Arc` shared by scanner and scheduler.
#[derive(Debug, Default)]
pub struct ResourceTypeRegistry {
    descriptors: Vec<ResourceTypeDescriptor>,
    by_name: HashMap<String, usize>,
    by_alias: HashMap<String, usize>,
}

impl ResourceTypeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry from an explicit list of descriptors.
    ///
    /// # Example
    /// ```
    /// use cloud_sweeper::error::ListError;
    /// use cloud_sweeper::resources::{
    ///     ResourceHandle, ResourceTypeDescriptor, ResourceTypeRegistry, ScanContext, Scope,
    /// };
    ///
    /// fn none(_: &ScanContext) -> Result<Vec<Box<dyn ResourceHandle>>, ListError> {
    ///     Ok(Vec::new())
    /// }
    ///
    /// let registry = ResourceTypeRegistry::from_descriptors([
    ///     ResourceTypeDescriptor::new("EC2Subnet", Scope::Region, none),
    ///     ResourceTypeDescriptor::new("EC2RouteTable", Scope::Region, none)
    ///         .depends_on(["EC2Subnet"]),
    /// ])
    /// .unwrap();
    /// assert_eq!(registry.len(), 2);
    /// ```
    pub fn from_descriptors<I>(descriptors: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = ResourceTypeDescriptor>,
    {
        let mut registry = Self::new();
        for descriptor in descriptors {
            registry.register(descriptor)?;
        }
        Ok(registry)
    }

    /// Register a descriptor.
    ///
    /// Fails if its name or one of its aliases is already taken by another
    /// type's name or alias.
    pub fn register(&mut self, descriptor: ResourceTypeDescriptor) -> Result<(), RegistryError> {
        let mut claimed: HashSet<&str> = HashSet::new();
        let names =
            std::iter::once(descriptor.name()).chain(descriptor.aliases().iter().map(String::as_str));

        for name in names {
            if self.is_taken(name) || !claimed.insert(name) {
                return Err(RegistryError::DuplicateName {
                    name: name.to_string(),
                });
            }
        }

        let index = self.descriptors.len();
        self.by_name.insert(descriptor.name().to_string(), index);
        for alias in descriptor.aliases() {
            self.by_alias.insert(alias.clone(), index);
        }

        tracing::trace!(
            name = descriptor.name(),
            scope = %descriptor.scope(),
            "Registered resource type"
        );
        self.descriptors.push(descriptor);
        Ok(())
    }

    fn is_taken(&self, name: &str) -> bool {
        self.by_name.contains_key(name) || self.by_alias.contains_key(name)
    }

    /// Look up a descriptor by canonical name or deprecated alias.
    pub fn resolve(&self, name: &str) -> Option<&ResourceTypeDescriptor> {
        self.index_of(name).map(|i| &self.descriptors[i])
    }

    /// Registration index of a canonical name or alias.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name
            .get(name)
            .or_else(|| {
                let index = self.by_alias.get(name);
                if index.is_some() {
                    tracing::warn!(alias = name, "Resource type referenced by deprecated alias");
                }
                index
            })
            .copied()
    }

    /// Resolve a list of configured names to canonical names.
    pub fn canonical_names(&self, names: &[String]) -> Result<Vec<String>, ConfigError> {
        names
            .iter()
            .map(|n| {
                self.resolve(n)
                    .map(|d| d.name().to_string())
                    .ok_or_else(|| ConfigError::UnknownResourceType(n.clone()))
            })
            .collect()
    }

    /// Descriptors matching `filter`, in registration order.
    pub fn list_all(&self, filter: ScopeFilter) -> Vec<&ResourceTypeDescriptor> {
        self.descriptors
            .iter()
            .filter(|d| filter.matches(d.scope()))
            .collect()
    }

    /// All descriptors in registration order.
    pub fn descriptors(&self) -> &[ResourceTypeDescriptor] {
        &self.descriptors
    }

    /// List all canonical names.
    pub fn names(&self) -> Vec<&str> {
        self.descriptors.iter().map(|d| d.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ListError;
    use crate::resources::{ResourceHandle, ScanContext};

    fn none(_: &ScanContext) -> Result<Vec<Box<dyn ResourceHandle>>, ListError> {
        Ok(Vec::new())
    }

    fn sample_registry() -> ResourceTypeRegistry {
        ResourceTypeRegistry::from_descriptors([
            ResourceTypeDescriptor::new("IAMUserAccessKey", Scope::Account, none),
            ResourceTypeDescriptor::new("IAMUser", Scope::Account, none)
                .depends_on(["IAMUserAccessKey"])
                .deprecated_aliases(["IamUser"]),
            ResourceTypeDescriptor::new("EC2Subnet", Scope::Region, none),
            ResourceTypeDescriptor::new("EC2InternetGatewayAttachment", Scope::Region, none)
                .deprecated_aliases(["EC2InternetGatewayAttachement"]),
        ])
        .unwrap()
    }

    #[test]
    fn test_registry_names_in_registration_order() {
        let registry = sample_registry();
        assert_eq!(
            registry.names(),
            vec![
                "IAMUserAccessKey",
                "IAMUser",
                "EC2Subnet",
                "EC2InternetGatewayAttachment"
            ]
        );
        assert_eq!(registry.len(), 4);
        assert!(!registry.is_empty());
    }

    #[test]
    fn test_resolve_canonical_and_alias() {
        let registry = sample_registry();

        assert_eq!(registry.resolve("IAMUser").unwrap().name(), "IAMUser");
        assert_eq!(registry.resolve("IamUser").unwrap().name(), "IAMUser");
        assert_eq!(
            registry
                .resolve("EC2InternetGatewayAttachement")
                .unwrap()
                .name(),
            "EC2InternetGatewayAttachment"
        );
        assert!(registry.resolve("S3Bucket").is_none());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = sample_registry();
        let err = registry
            .register(ResourceTypeDescriptor::new("EC2Subnet", Scope::Region, none))
            .unwrap_err();

        assert_eq!(
            err,
            RegistryError::DuplicateName {
                name: "EC2Subnet".into()
            }
        );
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn test_name_colliding_with_alias_rejected() {
        let mut registry = sample_registry();
        let err = registry
            .register(ResourceTypeDescriptor::new("IamUser", Scope::Account, none))
            .unwrap_err();

        assert!(matches!(err, RegistryError::DuplicateName { name } if name == "IamUser"));
    }

    #[test]
    fn test_alias_colliding_with_name_rejected() {
        let mut registry = sample_registry();
        let err = registry
            .register(
                ResourceTypeDescriptor::new("EC2SubnetV2", Scope::Region, none)
                    .deprecated_aliases(["EC2Subnet"]),
            )
            .unwrap_err();

        assert!(matches!(err, RegistryError::DuplicateName { name } if name == "EC2Subnet"));
        assert!(registry.resolve("EC2SubnetV2").is_none());
    }

    #[test]
    fn test_alias_equal_to_own_name_rejected() {
        let mut registry = ResourceTypeRegistry::new();
        let err = registry
            .register(
                ResourceTypeDescriptor::new("EC2Image", Scope::Region, none)
                    .deprecated_aliases(["EC2Image"]),
            )
            .unwrap_err();

        assert!(matches!(err, RegistryError::DuplicateName { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_list_all_by_scope() {
        let registry = sample_registry();

        let account: Vec<&str> = registry
            .list_all(ScopeFilter::Only(Scope::Account))
            .iter()
            .map(|d| d.name())
            .collect();
        assert_eq!(account, vec!["IAMUserAccessKey", "IAMUser"]);

        let regional = registry.list_all(ScopeFilter::Only(Scope::Region));
        assert_eq!(regional.len(), 2);

        assert_eq!(registry.list_all(ScopeFilter::Any).len(), 4);
    }

    #[test]
    fn test_canonical_names() {
        let registry = sample_registry();

        let names = registry
            .canonical_names(&["IamUser".to_string(), "EC2Subnet".to_string()])
            .unwrap();
        assert_eq!(names, vec!["IAMUser", "EC2Subnet"]);

        let err = registry
            .canonical_names(&["Nope".to_string()])
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownResourceType(n) if n == "Nope"));
    }

    #[test]
    fn test_registry_default_is_empty() {
        let registry = ResourceTypeRegistry::default();
        assert!(registry.is_empty());
        assert!(registry.list_all(ScopeFilter::Any).is_empty());
    }
}
