//! Spawned object registry, owned by the tick driver.
//!
//! Ids start at 0 and only ever increase, across scene changes too, so a
//! client never sees an id reused for a different object.

use crate::core::adapter::ObjectHandle;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnedObject {
    /// Spawnable type name
    pub kind: String,
    pub handle: ObjectHandle,
}

#[derive(Debug, Default)]
pub struct ObjectRegistry {
    objects: BTreeMap<i32, SpawnedObject>,
    next_id: i32,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an object and return its id
    pub fn insert(&mut self, kind: impl Into<String>, handle: ObjectHandle) -> i32 {
        let id = self.next_id;
        self.next_id += 1;
        self.objects.insert(
            id,
            SpawnedObject {
                kind: kind.into(),
                handle,
            },
        );
        id
    }

    pub fn remove(&mut self, id: i32) -> Option<SpawnedObject> {
        self.objects.remove(&id)
    }

    /// Remove every entry, returning them for engine-side cleanup
    pub fn take_all(&mut self) -> Vec<SpawnedObject> {
        std::mem::take(&mut self.objects).into_values().collect()
    }

    /// Entries in id order
    pub fn iter(&self) -> impl Iterator<Item = (i32, &SpawnedObject)> {
        self.objects.iter().map(|(id, obj)| (*id, obj))
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_monotonic() {
        let mut reg = ObjectRegistry::new();
        assert_eq!(reg.insert("cube", 10), 0);
        assert_eq!(reg.insert("cone", 11), 1);
        assert!(reg.remove(0).is_some());
        assert_eq!(reg.insert("cube", 12), 2);
        let ids: Vec<i32> = reg.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_take_all_empties_but_keeps_counter() {
        let mut reg = ObjectRegistry::new();
        reg.insert("cube", 1);
        reg.insert("cube", 2);
        let removed = reg.take_all();
        assert_eq!(removed.len(), 2);
        assert!(reg.is_empty());
        assert_eq!(reg.insert("sphere", 3), 2);
    }

    #[test]
    fn test_remove_unknown_id() {
        let mut reg = ObjectRegistry::new();
        assert!(reg.remove(42).is_none());
    }
}
