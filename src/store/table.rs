//! Concurrent in-memory table keyed by record id.

use dashmap::DashMap;
use uuid::Uuid;

/// A single entity table.
///
/// Reads clone rows out so that no shard lock is held across calls into other
/// tables.
#[derive(Debug)]
pub struct Table<T> {
    rows: DashMap<Uuid, T>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: DashMap::new(),
        }
    }
}

impl<T: Clone> Table<T> {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a row.
    pub fn insert(&self, id: Uuid, row: T) {
        self.rows.insert(id, row);
    }

    /// Returns a copy of the row with the given id.
    #[must_use]
    pub fn get(&self, id: &Uuid) -> Option<T> {
        self.rows.get(id).map(|entry| entry.value().clone())
    }

    /// Whether a row with the given id exists.
    #[must_use]
    pub fn contains(&self, id: &Uuid) -> bool {
        self.rows.contains_key(id)
    }

    /// Mutates a row in place, returning the updated copy.
    pub fn update<F>(&self, id: &Uuid, f: F) -> Option<T>
    where
        F: FnOnce(&mut T),
    {
        let mut entry = self.rows.get_mut(id)?;
        f(entry.value_mut());
        Some(entry.value().clone())
    }

    /// Removes a row, returning it.
    pub fn remove(&self, id: &Uuid) -> Option<T> {
        self.rows.remove(id).map(|(_, row)| row)
    }

    /// Returns copies of all rows.
    #[must_use]
    pub fn values(&self) -> Vec<T> {
        self.rows.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Returns the first row matching the predicate.
    pub fn find<P>(&self, predicate: P) -> Option<T>
    where
        P: Fn(&T) -> bool,
    {
        self.rows
            .iter()
            .find(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
    }

    /// Returns all rows matching the predicate.
    pub fn filter<P>(&self, predicate: P) -> Vec<T>
    where
        P: Fn(&T) -> bool,
    {
        self.rows
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Whether any row matches the predicate.
    pub fn any<P>(&self, predicate: P) -> bool
    where
        P: Fn(&T) -> bool,
    {
        self.rows.iter().any(|entry| predicate(entry.value()))
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_update_remove() {
        let table: Table<u32> = Table::new();
        let id = Uuid::new_v4();

        table.insert(id, 1);
        assert_eq!(table.get(&id), Some(1));

        let updated = table.update(&id, |v| *v += 41);
        assert_eq!(updated, Some(42));

        assert_eq!(table.remove(&id), Some(42));
        assert!(table.is_empty());
        assert!(table.update(&id, |v| *v += 1).is_none());
    }

    #[test]
    fn test_find_and_filter() {
        let table: Table<u32> = Table::new();
        for v in 0..10 {
            table.insert(Uuid::new_v4(), v);
        }

        assert_eq!(table.find(|v| *v == 7), Some(7));
        assert_eq!(table.filter(|v| v % 2 == 0).len(), 5);
        assert!(table.any(|v| *v == 9));
        assert!(!table.any(|v| *v == 10));
    }
}
