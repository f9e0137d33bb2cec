//! Products and the filter used to look them up.

use common::ProductId;
use serde::{Deserialize, Serialize};

/// A product that owns one or more variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub category: Option<String>,
    pub active: bool,
}

impl Product {
    /// Creates a new active product.
    pub fn new(name: impl Into<String>, category: Option<String>) -> Self {
        Self {
            id: ProductId::new(),
            name: name.into(),
            category,
            active: true,
        }
    }
}

/// Criteria for listing products. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductFilter {
    /// Exact, case-insensitive product name.
    pub name: Option<String>,
    pub category: Option<String>,
    pub active_only: bool,
}

impl ProductFilter {
    /// Matches active products with the given name.
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            category: None,
            active_only: true,
        }
    }

    /// Returns true if `product` satisfies every set criterion.
    pub fn matches(&self, product: &Product) -> bool {
        if self.active_only && !product.active {
            return false;
        }
        if let Some(name) = &self.name
            && !product.name.eq_ignore_ascii_case(name)
        {
            return false;
        }
        if let Some(category) = &self.category
            && product.category.as_ref() != Some(category)
        {
            return false;
        }
        true
    }
}
