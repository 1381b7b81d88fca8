//! In-memory item storage.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

/// A stored catalogue item.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub user_id: Option<String>,
    pub title: String,
    pub price: u64,
    pub created_at: DateTime<Utc>,
}

/// Items indexed by insertion position.
#[derive(Debug, Default)]
pub struct ItemStore {
    items: RwLock<Vec<Item>>,
}

impl ItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an item and returns its id.
    pub fn add(&self, user_id: Option<String>, title: String, price: u64) -> usize {
        let mut items = self.items.write();
        items.push(Item {
            user_id,
            title,
            price,
            created_at: Utc::now(),
        });
        items.len() - 1
    }

    pub fn get(&self, id: usize) -> Option<Item> {
        self.items.read().get(id).cloned()
    }

    pub fn list(&self) -> Vec<Item> {
        self.items.read().clone()
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_insertion_positions() {
        let store = ItemStore::new();
        assert_eq!(store.add(None, "lamp".into(), 30), 0);
        assert_eq!(store.add(Some("keel".into()), "desk".into(), 120), 1);

        assert_eq!(store.get(1).unwrap().title, "desk");
        assert!(store.get(2).is_none());
        assert_eq!(store.len(), 2);
    }
}
