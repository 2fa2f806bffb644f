//! Named slot storage for simulation objects
//!
//! Every dynamically created object (population, synapse group, network) is
//! addressed two ways: by a caller-chosen string id, and by a generational
//! key into a [`SlotMap`]. The arena keeps the id ↔ key mapping next to the
//! slot map so both directions stay in step.
//!
//! Released slots are recycled by the slot map, but a key from before the
//! release carries the old version and no longer resolves. Resolving it
//! fails with [`RuntimeError::StaleHandle`] instead of silently aliasing
//! whatever object was allocated into the slot next.

use crate::error::{Result, RuntimeError};
use slotmap::{new_key_type, Key, SecondaryMap, SlotMap};
use std::collections::HashMap;
use std::fmt;

new_key_type! {
    /// Handle to a neuron population
    pub struct PopulationId;

    /// Handle to a synapse group
    pub struct GroupId;

    /// Handle to a network
    pub struct NetworkId;
}

impl fmt::Display for PopulationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "population#{:?}", self.data())
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "synapse group#{:?}", self.data())
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "network#{:?}", self.data())
    }
}

/// Object kinds that live in an [`Arena`]
pub trait SlotKind {
    /// Human-readable kind name used in errors and logs
    const KIND: &'static str;

    /// Key type handed out for this kind
    type Key: Key;
}

/// Generational slot map with a string id index
///
/// `allocate` is idempotent per id; released ids stop resolving, and so do
/// keys issued before the release. Single-writer; no internal locking.
#[derive(Clone)]
pub struct Arena<T: SlotKind> {
    slots: SlotMap<T::Key, T>,
    ids: SecondaryMap<T::Key, String>,
    names: HashMap<String, T::Key>,
}

impl<T: SlotKind> Arena<T> {
    /// Create an empty arena
    pub fn new() -> Self {
        Self {
            slots: SlotMap::with_key(),
            ids: SecondaryMap::new(),
            names: HashMap::new(),
        }
    }

    /// Insert a value under `id`, building it only if `id` is new
    ///
    /// The boolean is `true` when a new slot was filled. A failing `make`
    /// leaves the arena untouched.
    pub fn insert_with<F>(&mut self, id: &str, make: F) -> Result<(T::Key, bool)>
    where
        F: FnOnce() -> Result<T>,
    {
        if let Some(&key) = self.names.get(id) {
            return Ok((key, false));
        }

        let key = self.slots.insert(make()?);
        self.ids.insert(key, id.to_owned());
        self.names.insert(id.to_owned(), key);
        Ok((key, true))
    }

    /// Shared access to a live slot
    pub fn get(&self, key: T::Key) -> Result<&T> {
        self.slots.get(key).ok_or_else(|| stale::<T>(key))
    }

    /// Mutable access to a live slot
    pub fn get_mut(&mut self, key: T::Key) -> Result<&mut T> {
        self.slots.get_mut(key).ok_or_else(|| stale::<T>(key))
    }

    /// Release `id`, dropping its value and returning the key it held
    pub fn remove(&mut self, id: &str) -> Option<T::Key> {
        let key = self.names.remove(id)?;
        self.ids.remove(key);
        self.slots.remove(key);
        Some(key)
    }

    /// Key currently registered for `id`
    pub fn handle_of(&self, id: &str) -> Option<T::Key> {
        self.names.get(id).copied()
    }

    /// Whether `id` is currently registered
    pub fn contains(&self, id: &str) -> bool {
        self.names.contains_key(id)
    }

    /// Whether `key` still refers to a live slot
    pub fn is_live(&self, key: T::Key) -> bool {
        self.slots.contains_key(key)
    }

    /// The id registered for a live key
    pub fn id_of(&self, key: T::Key) -> Option<&str> {
        self.ids.get(key).map(String::as_str)
    }

    /// Number of live slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the arena holds no live slots
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Live `(key, value)` pairs in slot order
    pub fn iter(&self) -> impl Iterator<Item = (T::Key, &T)> + '_ {
        self.slots.iter()
    }

    /// Mutable live `(key, value)` pairs in slot order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (T::Key, &mut T)> + '_ {
        self.slots.iter_mut()
    }

    /// Live `(id, key)` pairs in slot order
    pub fn names(&self) -> impl Iterator<Item = (&str, T::Key)> + '_ {
        self.ids.iter().map(|(key, id)| (id.as_str(), key))
    }
}

impl<T: SlotKind> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: SlotKind> fmt::Debug for Arena<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("kind", &T::KIND)
            .field("live", &self.slots.len())
            .field("capacity", &self.slots.capacity())
            .finish()
    }
}

fn stale<T: SlotKind>(key: T::Key) -> RuntimeError {
    RuntimeError::stale_handle(T::KIND, key)
}

#[cfg(test)]
mod tests {
    use super::*;

    new_key_type! {
        struct WidgetId;
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Widget {
        value: u32,
    }

    impl SlotKind for Widget {
        const KIND: &'static str = "widget";
        type Key = WidgetId;
    }

    fn widget(value: u32) -> impl FnOnce() -> Result<Widget> {
        move || Ok(Widget { value })
    }

    #[test]
    fn test_insert_is_idempotent() {
        let mut arena = Arena::<Widget>::new();
        let (first, fresh) = arena.insert_with("x", widget(7)).unwrap();
        assert!(fresh);

        let (second, fresh) = arena.insert_with("x", widget(99)).unwrap();
        assert!(!fresh);
        assert_eq!(first, second);
        assert_eq!(arena.len(), 1);
        assert_eq!(arena.get(first).unwrap().value, 7);
    }

    #[test]
    fn test_remove_then_lookup_fails() {
        let mut arena = Arena::<Widget>::new();
        let (x, _) = arena.insert_with("x", widget(1)).unwrap();

        assert_eq!(arena.remove("x"), Some(x));
        assert!(arena.handle_of("x").is_none());
        assert!(!arena.contains("x"));
        assert!(arena.remove("x").is_none());
        assert!(arena.is_empty());
    }

    #[test]
    fn test_stale_key_fails_loudly() {
        let mut arena = Arena::<Widget>::new();
        let (x, _) = arena.insert_with("x", widget(1)).unwrap();
        arena.remove("x");
        let (y, _) = arena.insert_with("y", widget(2)).unwrap();

        assert_ne!(x, y);
        assert!(!arena.is_live(x));
        assert!(arena.is_live(y));
        assert!(matches!(
            arena.get(x),
            Err(RuntimeError::StaleHandle { kind: "widget", .. })
        ));
        assert_eq!(arena.get(y).unwrap().value, 2);
        assert_eq!(arena.id_of(y), Some("y"));
        assert_eq!(arena.id_of(x), None);
    }

    #[test]
    fn test_released_slot_is_recycled() {
        let mut arena = Arena::<Widget>::new();
        arena.insert_with("a", widget(1)).unwrap();
        arena.insert_with("b", widget(2)).unwrap();
        arena.remove("a");
        arena.insert_with("c", widget(3)).unwrap();

        assert_eq!(arena.len(), 2);
        let ids: Vec<&str> = arena.names().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["c", "b"]);
    }

    #[test]
    fn test_failed_build_leaves_arena_untouched() {
        let mut arena = Arena::<Widget>::new();
        let result = arena.insert_with("w", || Err(RuntimeError::invalid_config("nope")));

        assert!(result.is_err());
        assert!(arena.is_empty());
        assert!(arena.handle_of("w").is_none());
    }

    #[test]
    fn test_null_key_never_resolves() {
        let mut arena = Arena::<Widget>::new();
        arena.insert_with("w", widget(1)).unwrap();
        assert!(arena.get(WidgetId::default()).is_err());
    }

    #[test]
    fn test_handle_display_names_kind() {
        let mut keys = SlotMap::<PopulationId, ()>::with_key();
        let key = keys.insert(());
        assert!(key.to_string().starts_with("population#"));
    }
}
