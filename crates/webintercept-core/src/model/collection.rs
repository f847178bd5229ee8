//! Operator collections: named, ordered groupings of captured exchanges

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named grouping of exchanges
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Hex display colour, e.g. `#ff8800`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Collection {
    /// Create an empty collection
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            color: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Membership of one exchange in a collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionItem {
    pub id: Uuid,
    pub collection_id: Uuid,
    pub exchange_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Display order within the collection
    pub order: u32,
    pub added_at: DateTime<Utc>,
}

impl CollectionItem {
    /// Add an exchange to a collection at the given order
    pub fn new(collection_id: Uuid, exchange_id: Uuid, order: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            collection_id,
            exchange_id,
            notes: None,
            order,
            added_at: Utc::now(),
        }
    }
}
