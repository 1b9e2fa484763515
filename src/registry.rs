//! Item registry - which entities are logged, and what they are
//!
//! Replaces a process-wide actor mapping table: the session owns one
//! registry and hands it to whatever needs id -> class/label lookups.
//! Interested parties subscribe to removals and unsubscribe by handle.

use bevy::log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::events::ParticipantId;

/// A registered entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredItem {
    pub id: ParticipantId,
    /// Ontology class (e.g. "Cup", "Drawer")
    pub class: String,
    /// Human readable label in the level (defaults to the id)
    pub label: String,
    /// Bone name -> bone class, for skeletal entities
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub bones: BTreeMap<String, String>,
}

impl RegisteredItem {
    pub fn new(id: impl Into<String>, class: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id: ParticipantId(id),
            class: class.into(),
            bones: BTreeMap::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_bone(mut self, bone: impl Into<String>, class: impl Into<String>) -> Self {
        self.bones.insert(bone.into(), class.into());
        self
    }

    /// `Class:label`, as sent to the knowledge base
    pub fn class_and_label(&self) -> String {
        format!("{}:{}", self.class, self.label)
    }
}

/// Handle returned by [`ItemRegistry::subscribe_removed`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type RemovalObserver = Box<dyn FnMut(&RegisteredItem) + Send + Sync>;

/// Registered items by id, plus removal observers
#[derive(Default)]
pub struct ItemRegistry {
    items: BTreeMap<ParticipantId, RegisteredItem>,
    observers: Vec<(ObserverId, RemovalObserver)>,
    next_observer: u64,
}

impl ItemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) an item. Returns false if the id was already known.
    pub fn register(&mut self, item: RegisteredItem) -> bool {
        if item.id.as_str().is_empty() {
            warn!("Ignoring item with empty id (class {})", item.class);
            return false;
        }
        let replaced = self.items.insert(item.id.clone(), item);
        if let Some(old) = &replaced {
            debug!("Item {} re-registered, replacing previous entry", old.id);
        }
        replaced.is_none()
    }

    /// Remove an item and notify observers. Returns the removed item.
    pub fn remove(&mut self, id: &ParticipantId) -> Option<RegisteredItem> {
        let item = self.items.remove(id)?;
        for (_, observer) in self.observers.iter_mut() {
            observer(&item);
        }
        Some(item)
    }

    pub fn get(&self, id: &ParticipantId) -> Option<&RegisteredItem> {
        self.items.get(id)
    }

    pub fn contains(&self, id: &ParticipantId) -> bool {
        self.items.contains_key(id)
    }

    /// Class of an item, or `"Thing"` when unknown
    pub fn class_of(&self, id: &ParticipantId) -> &str {
        self.items.get(id).map(|i| i.class.as_str()).unwrap_or("Thing")
    }

    /// Call `observer` synchronously every time an item is removed
    pub fn subscribe_removed(
        &mut self,
        observer: impl FnMut(&RegisteredItem) + Send + Sync + 'static,
    ) -> ObserverId {
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(observer_id, _)| *observer_id != id);
        self.observers.len() != before
    }

    /// Drop every observer (session teardown)
    pub fn clear_observers(&mut self) {
        self.observers.clear();
    }
}

impl std::fmt::Debug for ItemRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemRegistry")
            .field("items", &self.items)
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ItemRegistry::new();
        assert!(registry.register(RegisteredItem::new("cup1", "Cup").with_label("RedCup")));
        assert!(!registry.register(RegisteredItem::new("cup1", "Mug")));
        assert_eq!(registry.class_of(&"cup1".into()), "Mug");
        assert_eq!(registry.class_of(&"ghost".into()), "Thing");
        let cup = registry.get(&"cup1".into()).unwrap();
        assert_eq!(cup.class_and_label(), "Mug:cup1");
        assert!(!registry.register(RegisteredItem::new("", "Cup")));
    }

    #[test]
    fn test_removal_observers() {
        let mut registry = ItemRegistry::new();
        registry.register(RegisteredItem::new("cup1", "Cup"));
        registry.register(RegisteredItem::new("cup2", "Cup"));

        let removed = Arc::new(Mutex::new(Vec::new()));
        let sink = removed.clone();
        let handle = registry.subscribe_removed(move |item| {
            sink.lock().unwrap().push(item.id.to_string());
        });

        assert!(registry.remove(&"cup1".into()).is_some());
        assert!(registry.remove(&"cup1".into()).is_none());
        assert!(registry.unsubscribe(handle));
        assert!(!registry.unsubscribe(handle));
        registry.remove(&"cup2".into());

        assert_eq!(*removed.lock().unwrap(), vec!["cup1".to_string()]);
        assert!(!registry.contains(&"cup2".into()));
    }
}
