//! Inventory-backed resource types.

use crate::engine::ScanTarget;
use crate::error::{ListError, RemovalError, Result};
use crate::inventory::{Inventory, InventoryResource};
use crate::resources::{
    ExecContext, KeepReason, Lister, Properties, ResourceHandle, ResourceTypeDescriptor,
    ResourceTypeRegistry, ScanContext, Scope,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Shared, mutable view of an inventory.
///
/// Listers read from it and handles delete from it, so a run against the
/// store behaves like a run against a live account.
#[derive(Clone, Default)]
pub struct InventoryStore {
    inner: Arc<Mutex<Inventory>>,
}

impl InventoryStore {
    pub fn new(inventory: Inventory) -> Self {
        Self {
            inner: Arc::new(Mutex::new(inventory)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inventory> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> Inventory {
        self.lock().clone()
    }

    /// Account and regions the inventory describes.
    pub fn target(&self) -> ScanTarget {
        let inventory = self.lock();
        ScanTarget::new(inventory.account_id.clone(), inventory.regions.clone())
    }

    /// Number of resources still present.
    pub fn resource_count(&self) -> usize {
        self.lock().resources.len()
    }

    /// Build a registry whose listers read from this store.
    pub fn registry(&self) -> Result<ResourceTypeRegistry> {
        let inventory = self.lock();
        inventory.validate()?;

        let mut registry = ResourceTypeRegistry::new();
        for declared in &inventory.types {
            let mut names = vec![declared.name.clone()];
            names.extend(declared.aliases.iter().cloned());

            let lister = InventoryLister {
                store: self.clone(),
                type_name: declared.name.clone(),
                names,
                scope: declared.scope,
            };
            registry.register(
                ResourceTypeDescriptor::new(declared.name.clone(), declared.scope, lister)
                    .depends_on(declared.depends_on.iter().cloned())
                    .deprecated_aliases(declared.aliases.iter().cloned()),
            )?;
        }
        Ok(registry)
    }
}

struct InventoryLister {
    store: InventoryStore,
    type_name: String,
    /// Canonical name first, then aliases.
    names: Vec<String>,
    scope: Scope,
}

impl InventoryLister {
    fn matches(&self, resource: &InventoryResource, region: Option<&str>) -> bool {
        self.names.contains(&resource.type_name)
            && match self.scope {
                Scope::Account => true,
                Scope::Region => resource.region.as_deref() == region,
            }
    }
}

impl Lister for InventoryLister {
    fn list(&self, ctx: &ScanContext) -> std::result::Result<Vec<Box<dyn ResourceHandle>>, ListError> {
        let inventory = self.store.lock();
        if inventory.account_id != ctx.account_id {
            return Err(ListError::new(format!(
                "inventory describes account '{}', not '{}'",
                inventory.account_id, ctx.account_id
            )));
        }

        let handles = inventory
            .resources
            .iter()
            .filter(|r| self.matches(r, ctx.region.as_deref()))
            .map(|r| {
                Box::new(InventoryHandle::new(self.store.clone(), &self.names, r))
                    as Box<dyn ResourceHandle>
            })
            .collect::<Vec<_>>();

        tracing::trace!(
            type_name = %self.type_name,
            region = ?ctx.region,
            count = handles.len(),
            "Listed inventory resources"
        );
        Ok(handles)
    }
}

/// A resource held in an [`InventoryStore`].
pub struct InventoryHandle {
    store: InventoryStore,
    type_names: Vec<String>,
    region: Option<String>,
    id: String,
    properties: Properties,
    protected: Option<String>,
}

impl InventoryHandle {
    fn new(store: InventoryStore, type_names: &[String], resource: &InventoryResource) -> Self {
        let mut properties = Properties::new();
        for (key, value) in &resource.properties {
            properties.set(key.clone(), value);
        }
        for (key, value) in &resource.tags {
            properties.set_tag(key, value);
        }
        if let Some(region) = &resource.region {
            properties.set("Region", region);
        }

        Self {
            store,
            type_names: type_names.to_vec(),
            region: resource.region.clone(),
            id: resource.id.clone(),
            properties,
            protected: resource.protected.clone(),
        }
    }

    fn is_same(&self, resource: &InventoryResource) -> bool {
        resource.id == self.id
            && resource.region == self.region
            && self.type_names.contains(&resource.type_name)
    }
}

impl ResourceHandle for InventoryHandle {
    fn identity(&self) -> String {
        self.id.clone()
    }

    fn properties(&self) -> Properties {
        self.properties.clone()
    }

    fn filter(&self) -> std::result::Result<(), KeepReason> {
        match &self.protected {
            Some(reason) => Err(KeepReason::new(reason.clone())),
            None => Ok(()),
        }
    }

    fn remove(&self, _ctx: &ExecContext) -> std::result::Result<(), RemovalError> {
        let mut inventory = self.store.lock();
        let Some(index) = inventory.resources.iter().position(|r| self.is_same(r)) else {
            return Err(RemovalError::NotFound(self.id.clone()));
        };

        if let Some(error) = &mut inventory.resources[index].remove_error {
            let fail = match &mut error.times {
                None => true,
                Some(0) => false,
                Some(n) => {
                    *n -= 1;
                    true
                }
            };
            if fail {
                return Err(RemovalError::from_code(
                    error.code.as_deref(),
                    error.message.clone(),
                ));
            }
        }

        inventory.resources.remove(index);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::inventory::ProviderError;

    fn store() -> InventoryStore {
        InventoryStore::new(
            Inventory::from_json(
                r#"{
                    "account_id": "123456789012",
                    "regions": ["us-east-1", "eu-west-1"],
                    "types": [
                        {"name": "EC2Subnet", "scope": "region"},
                        {"name": "EC2SecurityGroup", "scope": "region", "depends_on": ["EC2Subnet"]}
                    ],
                    "resources": [
                        {"type": "EC2Subnet", "region": "us-east-1", "id": "subnet-1",
                         "tags": {"Name": "web"}},
                        {"type": "EC2Subnet", "region": "eu-west-1", "id": "subnet-2"},
                        {"type": "EC2SecurityGroup", "region": "us-east-1", "id": "sg-default",
                         "protected": "cannot delete default group"}
                    ]
                }"#,
            )
            .unwrap(),
        )
    }

    fn scan_context(region: &str) -> ScanContext {
        ScanContext {
            account_id: "123456789012".into(),
            region: Some(region.into()),
            cancel: CancelToken::new(),
        }
    }

    #[test]
    fn test_registry_from_inventory() {
        let registry = store().registry().unwrap();
        assert_eq!(registry.names(), vec!["EC2Subnet", "EC2SecurityGroup"]);
        assert_eq!(
            registry.resolve("EC2SecurityGroup").unwrap().dependencies(),
            ["EC2Subnet".to_string()]
        );
    }

    #[test]
    fn test_lister_filters_by_region() {
        let registry = store().registry().unwrap();
        let subnets = registry.resolve("EC2Subnet").unwrap();

        let handles = subnets.lister().list(&scan_context("us-east-1")).unwrap();
        assert_eq!(handles.len(), 1);
        assert_eq!(handles[0].identity(), "subnet-1");
        assert_eq!(handles[0].properties().tag("Name"), Some("web"));
        assert_eq!(handles[0].properties().get("Region"), Some("us-east-1"));
    }

    #[test]
    fn test_lister_rejects_other_account() {
        let registry = store().registry().unwrap();
        let ctx = ScanContext {
            account_id: "999999999999".into(),
            region: Some("us-east-1".into()),
            cancel: CancelToken::new(),
        };
        assert!(registry
            .resolve("EC2Subnet")
            .unwrap()
            .lister()
            .list(&ctx)
            .is_err());
    }

    #[test]
    fn test_protected_resource_filters_itself() {
        let registry = store().registry().unwrap();
        let groups = registry
            .resolve("EC2SecurityGroup")
            .unwrap()
            .lister()
            .list(&scan_context("us-east-1"))
            .unwrap();
        assert_eq!(
            groups[0].filter(),
            Err(KeepReason::new("cannot delete default group"))
        );
    }

    #[test]
    fn test_remove_deletes_then_reports_not_found() {
        let store = store();
        let registry = store.registry().unwrap();
        let handles = registry
            .resolve("EC2Subnet")
            .unwrap()
            .lister()
            .list(&scan_context("eu-west-1"))
            .unwrap();

        let ctx = ExecContext::default();
        assert_eq!(handles[0].remove(&ctx), Ok(()));
        assert_eq!(store.resource_count(), 2);
        assert!(handles[0].remove(&ctx).unwrap_err().is_not_found());
    }

    #[test]
    fn test_replayed_error_clears_after_times() {
        let mut inventory = store().snapshot();
        inventory.resources[0].remove_error = Some(ProviderError {
            code: Some("Throttling".into()),
            message: "Rate exceeded".into(),
            times: Some(1),
        });
        let store = InventoryStore::new(inventory);
        let registry = store.registry().unwrap();
        let handles = registry
            .resolve("EC2Subnet")
            .unwrap()
            .lister()
            .list(&scan_context("us-east-1"))
            .unwrap();

        let ctx = ExecContext::default();
        assert!(handles[0].remove(&ctx).unwrap_err().is_transient());
        assert_eq!(handles[0].remove(&ctx), Ok(()));
    }

    #[test]
    fn test_target_from_inventory() {
        let target = store().target();
        assert_eq!(target.account_id, "123456789012");
        assert_eq!(target.regions.len(), 2);
    }
}
