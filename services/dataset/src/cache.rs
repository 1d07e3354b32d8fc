//! Single-slot memoization of loaded tables.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

use crate::join::DenormalizedTable;
use crate::tables::{CategoryTable, FactTable, RegionTable, Snapshot};

/// Identity of a cached table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableId {
    Facts,
    Categories,
    Regions,
    Denormalized,
}

impl TableId {
    pub const ALL: [TableId; 4] = [
        TableId::Facts,
        TableId::Categories,
        TableId::Regions,
        TableId::Denormalized,
    ];
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TableId::Facts => "facts",
            TableId::Categories => "categories",
            TableId::Regions => "regions",
            TableId::Denormalized => "denormalized",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
struct SlotState<T> {
    generation: u64,
    value: Option<Arc<T>>,
}

/// One cached value. Loads run without the lock held; racing loaders each do
/// the work and the last one to finish is kept, unless the slot was
/// invalidated after it started.
#[derive(Debug)]
pub struct Slot<T> {
    state: RwLock<SlotState<T>>,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            state: RwLock::new(SlotState {
                generation: 0,
                value: None,
            }),
        }
    }
}

impl<T> Slot<T> {
    pub fn get(&self) -> Option<Arc<T>> {
        self.state.read().value.clone()
    }

    pub fn get_or_load<E>(&self, load: impl FnOnce() -> Result<T, E>) -> Result<Arc<T>, E> {
        let generation = {
            let state = self.state.read();
            if let Some(value) = &state.value {
                return Ok(Arc::clone(value));
            }
            state.generation
        };

        let value = Arc::new(load()?);

        let mut state = self.state.write();
        if state.generation == generation {
            state.value = Some(Arc::clone(&value));
        }
        Ok(value)
    }

    pub fn invalidate(&self) {
        let mut state = self.state.write();
        state.generation += 1;
        state.value = None;
    }
}

/// Per-table cache state reported by [`TableCache::status`].
#[derive(Debug, Clone, Serialize)]
pub struct TableStatus {
    pub table: TableId,
    pub loaded: bool,
    pub rows: Option<usize>,
    pub loaded_at: Option<DateTime<Utc>>,
}

fn status_of<T: Snapshot>(table: TableId, slot: &Slot<T>) -> TableStatus {
    match slot.get() {
        Some(value) => TableStatus {
            table,
            loaded: true,
            rows: Some(value.row_count()),
            loaded_at: Some(value.loaded_at()),
        },
        None => TableStatus {
            table,
            loaded: false,
            rows: None,
            loaded_at: None,
        },
    }
}

/// Independent slots for the three source tables and their join.
#[derive(Debug, Default)]
pub struct TableCache {
    pub facts: Slot<FactTable>,
    pub categories: Slot<CategoryTable>,
    pub regions: Slot<RegionTable>,
    pub denormalized: Slot<DenormalizedTable>,
}

impl TableCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidate(&self, table: TableId) {
        debug!(%table, "invalidating cache slot");
        match table {
            TableId::Facts => self.facts.invalidate(),
            TableId::Categories => self.categories.invalidate(),
            TableId::Regions => self.regions.invalidate(),
            TableId::Denormalized => self.denormalized.invalidate(),
        }
    }

    pub fn is_loaded(&self, table: TableId) -> bool {
        match table {
            TableId::Facts => self.facts.get().is_some(),
            TableId::Categories => self.categories.get().is_some(),
            TableId::Regions => self.regions.get().is_some(),
            TableId::Denormalized => self.denormalized.get().is_some(),
        }
    }

    pub fn status(&self) -> Vec<TableStatus> {
        vec![
            status_of(TableId::Facts, &self.facts),
            status_of(TableId::Categories, &self.categories),
            status_of(TableId::Regions, &self.regions),
            status_of(TableId::Denormalized, &self.denormalized),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_slot_loads_once() {
        let slot: Slot<u32> = Slot::default();
        let calls = AtomicUsize::new(0);
        let load = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ()>(7)
        };

        let a = slot.get_or_load(load).unwrap();
        let b = slot.get_or_load(load).unwrap();
        assert_eq!(*a, 7);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_load_is_not_cached() {
        let slot: Slot<u32> = Slot::default();
        assert!(slot.get_or_load(|| Err::<u32, _>("boom")).is_err());
        assert!(slot.get().is_none());
        assert_eq!(*slot.get_or_load(|| Ok::<_, &str>(1)).unwrap(), 1);
    }

    #[test]
    fn test_invalidate_forces_reload() {
        let slot: Slot<u32> = Slot::default();
        slot.get_or_load(|| Ok::<_, ()>(1)).unwrap();
        slot.invalidate();
        assert!(slot.get().is_none());
        assert_eq!(*slot.get_or_load(|| Ok::<_, ()>(2)).unwrap(), 2);
    }

    #[test]
    fn test_load_started_before_invalidation_is_not_stored() {
        let slot: Slot<u32> = Slot::default();
        let value = slot
            .get_or_load(|| {
                slot.invalidate();
                Ok::<_, ()>(1)
            })
            .unwrap();
        assert_eq!(*value, 1);
        assert!(slot.get().is_none());
    }

    #[test]
    fn test_concurrent_first_access() {
        let slot: Arc<Slot<Vec<u32>>> = Arc::new(Slot::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let slot = Arc::clone(&slot);
                std::thread::spawn(move || slot.get_or_load(|| Ok::<_, ()>(vec![1, 2, 3])).unwrap())
            })
            .collect();
        for h in handles {
            assert_eq!(*h.join().unwrap(), vec![1, 2, 3]);
        }
        assert_eq!(slot.get().map(|v| v.len()), Some(3));
    }

    #[test]
    fn test_cache_invalidation_is_per_table() {
        let cache = TableCache::new();
        cache
            .facts
            .get_or_load(|| Ok::<_, ()>(FactTable::new(Vec::new())))
            .unwrap();
        cache
            .regions
            .get_or_load(|| Ok::<_, ()>(RegionTable::new(Vec::new())))
            .unwrap();

        cache.invalidate(TableId::Facts);
        assert!(!cache.is_loaded(TableId::Facts));
        assert!(cache.is_loaded(TableId::Regions));

        let status = cache.status();
        assert_eq!(status.len(), TableId::ALL.len());
        assert!(status[2].loaded);
        assert_eq!(status[2].rows, Some(0));
    }
}
