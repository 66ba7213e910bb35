//! Offline inventory snapshots.
//!
//! An inventory is a JSON document describing an account: its regions, the
//! resource types it knows with their dependencies, and the resources that
//! currently exist. It backs the command line tool and makes whole runs
//! reproducible without a live provider.

mod store;

pub use store::{InventoryHandle, InventoryStore};

use crate::error::InventoryError;
use crate::resources::Scope;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// Snapshot of one account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Inventory {
    pub account_id: String,
    pub regions: Vec<String>,
    pub types: Vec<TypeDeclaration>,
    pub resources: Vec<InventoryResource>,
}

/// Declaration of a resource type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDeclaration {
    pub name: String,
    pub scope: Scope,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

/// One existing resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryResource {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub id: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    /// The provider refuses to delete this resource; the value is the reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protected: Option<String>,
    /// Error the provider answers remove calls with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_error: Option<ProviderError>,
}

/// Provider error replayed on removal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderError {
    /// Provider error code, e.g. `Throttling` or `AccessDenied`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
    /// Number of remove calls that fail before one succeeds; unset means
    /// every call fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub times: Option<u32>,
}

impl Inventory {
    /// Read an inventory file.
    pub fn load(path: &Path) -> Result<Self, InventoryError> {
        let content = std::fs::read_to_string(path).map_err(|source| InventoryError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let inventory = Self::parse(&content, path)?;
        tracing::debug!(
            path = %path.display(),
            types = inventory.types.len(),
            resources = inventory.resources.len(),
            "Loaded inventory"
        );
        Ok(inventory)
    }

    /// Parse an inventory from JSON text.
    pub fn from_json(content: &str) -> Result<Self, InventoryError> {
        Self::parse(content, Path::new(""))
    }

    fn parse(content: &str, path: &Path) -> Result<Self, InventoryError> {
        let inventory: Inventory =
            serde_json::from_str(content).map_err(|source| InventoryError::Parse {
                path: PathBuf::from(path),
                source,
            })?;
        inventory.validate()?;
        Ok(inventory)
    }

    /// Every resource must belong to a declared type (name or alias).
    pub fn validate(&self) -> Result<(), InventoryError> {
        let known: HashSet<&str> = self
            .types
            .iter()
            .flat_map(|t| std::iter::once(t.name.as_str()).chain(t.aliases.iter().map(String::as_str)))
            .collect();

        match self
            .resources
            .iter()
            .find(|r| !known.contains(r.type_name.as_str()))
        {
            Some(r) => Err(InventoryError::UnknownType {
                type_name: r.type_name.clone(),
                identity: r.id.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Write the inventory as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<(), InventoryError> {
        let json =
            serde_json::to_string_pretty(self).map_err(|source| InventoryError::Serialize {
                path: path.to_path_buf(),
                source,
            })?;
        std::fs::write(path, json).map_err(|source| InventoryError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}
