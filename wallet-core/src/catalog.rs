//! Shop catalog
//!
//! Static reference data: item name to price. Lookups distinguish an absent
//! item (`Ok(None)`) from a failed lookup (`Err`), because the purchase engine
//! reports them differently.

use crate::{types::CatalogItem, Config, Result};
use std::collections::HashMap;

/// Item lookup by name
pub trait Catalog: Send + Sync {
    /// `Ok(None)` when no item has this name
    fn find_by_name(&self, name: &str) -> Result<Option<CatalogItem>>;
}

/// Catalog held in memory, built once from configuration
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    items: HashMap<String, CatalogItem>,
}

impl StaticCatalog {
    /// Build from a list of items. A later item replaces an earlier one with
    /// the same name; [`Config::validate`] rejects such lists up front.
    pub fn new(items: impl IntoIterator<Item = CatalogItem>) -> Self {
        Self {
            items: items
                .into_iter()
                .map(|item| (item.name.clone(), item))
                .collect(),
        }
    }

    /// Build from the configured price list
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.catalog.iter().cloned())
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when the shop sells nothing
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Catalog for StaticCatalog {
    fn find_by_name(&self, name: &str) -> Result<Option<CatalogItem>> {
        Ok(self.items.get(name).cloned())
    }
}
