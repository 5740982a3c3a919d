//! The macro cache: one cache node per installed analysis, addressed by result key.
//!
//! The slot table maps every result key to the slot that answers it. Several keys may
//! point at one slot (an analysis and its aliases), so each slot carries a reference
//! count. Installing an analysis that takes over every key of an older one leaves the
//! older slot unreferenced; such slots are reclaimed immediately, either by moving the
//! last slot into the hole or, when several slots died at once, by compacting the whole
//! table. Tables are never edited in place: every change builds a new table and swaps it
//! in, so readers only ever hold a consistent snapshot.

use std::{
    any::type_name,
    sync::{Arc, RwLock},
};

use imbl::HashMap as ImHashMap;
use tracing::trace;

use crate::{
    analysis::{
        cache::{
            key::ResultKey,
            node::{AnalysisCacheNode, CacheSlot},
            registry::AnalysisRegistry,
        },
        traits::FlowGraphAnalysis,
    },
    ir::{FlowGraph, FlowGraphUpdate},
    Error, Result,
};

#[derive(Clone, Default)]
struct SlotTable {
    slots: Vec<Arc<dyn CacheSlot>>,
    ref_counts: Vec<usize>,
    indices: ImHashMap<ResultKey, usize>,
}

impl SlotTable {
    fn slot(&self, key: ResultKey) -> Option<Arc<dyn CacheSlot>> {
        self.indices
            .get(&key)
            .and_then(|&index| self.slots.get(index))
            .cloned()
    }

    /// Builds a table with `slot` installed. Keys already present are taken over when
    /// `overwrite` is set and left alone otherwise. Returns `None` if `slot` would not
    /// answer any key.
    fn with_slot(&self, slot: Arc<dyn CacheSlot>, overwrite: bool) -> Option<SlotTable> {
        let mut table = self.clone();
        let index = table.slots.len();
        let mut claimed: Vec<ResultKey> = Vec::new();

        for key in slot.keys() {
            if claimed.contains(&key) {
                continue;
            }
            if let Some(&previous) = table.indices.get(&key) {
                if !overwrite {
                    continue;
                }
                table.ref_counts[previous] -= 1;
            }
            table.indices.insert(key, index);
            claimed.push(key);
        }

        if claimed.is_empty() {
            return None;
        }

        table.slots.push(slot);
        table.ref_counts.push(claimed.len());
        table.reclaim();
        Some(table)
    }

    fn reclaim(&mut self) {
        let dangling: Vec<usize> = self
            .ref_counts
            .iter()
            .enumerate()
            .filter(|&(_, &count)| count == 0)
            .map(|(index, _)| index)
            .collect();

        match dangling.as_slice() {
            [] => {}
            [hole] => {
                let hole = *hole;
                let last = self.slots.len() - 1;
                self.slots.swap_remove(hole);
                self.ref_counts.swap_remove(hole);
                if hole != last {
                    self.indices = self
                        .indices
                        .iter()
                        .map(|(key, &index)| (*key, if index == last { hole } else { index }))
                        .collect();
                }
                trace!(slot = hole, "reused dangling analysis slot");
            }
            _ => {
                let mut remap = vec![usize::MAX; self.slots.len()];
                let mut slots = Vec::with_capacity(self.slots.len() - dangling.len());
                let mut ref_counts = Vec::with_capacity(slots.capacity());
                for (index, (slot, &count)) in self.slots.iter().zip(&self.ref_counts).enumerate() {
                    if count > 0 {
                        remap[index] = slots.len();
                        slots.push(Arc::clone(slot));
                        ref_counts.push(count);
                    }
                }
                self.indices = self
                    .indices
                    .iter()
                    .map(|(key, &index)| (*key, remap[index]))
                    .collect();
                self.slots = slots;
                self.ref_counts = ref_counts;
                trace!(reclaimed = dangling.len(), "compacted analysis slots");
            }
        }
    }
}

/// The analysis cache attached to a [`FlowGraph`].
pub(crate) struct MacroAnalysisCache {
    registry: Arc<AnalysisRegistry>,
    table: RwLock<Arc<SlotTable>>,
}

impl MacroAnalysisCache {
    /// Creates an empty cache that falls back on `registry`.
    pub(crate) fn new(registry: Arc<AnalysisRegistry>) -> Self {
        Self {
            registry,
            table: RwLock::new(Arc::new(SlotTable::default())),
        }
    }

    pub(crate) fn registry(&self) -> &Arc<AnalysisRegistry> {
        &self.registry
    }

    fn snapshot(&self) -> Result<Arc<SlotTable>> {
        Ok(Arc::clone(&*read_lock!(self.table)?))
    }

    /// Derives the cache for the graph revision produced by `update`.
    pub(crate) fn update(&self, update: &FlowGraphUpdate) -> Result<Self> {
        let table = self.snapshot()?;
        let slots = table
            .slots
            .iter()
            .map(|slot| Arc::clone(slot).derive(update))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            registry: Arc::clone(&self.registry),
            table: RwLock::new(Arc::new(SlotTable {
                slots,
                ref_counts: table.ref_counts.clone(),
                indices: table.indices.clone(),
            })),
        })
    }

    /// Creates a cache for the same graph revision with `analysis` installed, replacing
    /// whatever previously answered its keys.
    pub(crate) fn with_analysis<A: FlowGraphAnalysis>(&self, analysis: A) -> Result<Self> {
        let table = self.snapshot()?;
        let slot: Arc<dyn CacheSlot> = Arc::new(AnalysisCacheNode::new(Arc::new(analysis)));
        let table = match table.with_slot(slot, true) {
            Some(next) => Arc::new(next),
            None => table,
        };

        Ok(Self {
            registry: Arc::clone(&self.registry),
            table: RwLock::new(table),
        })
    }

    /// Returns `true` if a result of type `key` is installed or registrable.
    pub(crate) fn has_analysis_for(&self, key: ResultKey) -> Result<bool> {
        Ok(self.snapshot()?.indices.contains_key(&key) || self.registry.contains(key))
    }

    fn slot_for(&self, key: ResultKey, graph: &FlowGraph) -> Result<Option<Arc<dyn CacheSlot>>> {
        if let Some(slot) = self.snapshot()?.slot(key) {
            return Ok(Some(slot));
        }

        let Some(slot) = self.registry.create(key, graph) else {
            return Ok(None);
        };

        let mut table = write_lock!(self.table)?;
        if let Some(existing) = table.slot(key) {
            return Ok(Some(existing));
        }
        if let Some(next) = table.with_slot(slot, false) {
            *table = Arc::new(next);
        }
        trace!(result = key.name(), "registered default analysis");
        Ok(table.slot(key))
    }

    /// Returns the result of type `T`, or `None` if no analysis produces one.
    pub(crate) fn try_get_result<T: Send + Sync + 'static>(
        &self,
        graph: &FlowGraph,
    ) -> Result<Option<Arc<T>>> {
        let key = ResultKey::of::<T>();
        let Some(slot) = self.slot_for(key, graph)? else {
            return Ok(None);
        };

        slot.result_for(key, graph)?
            .downcast::<T>()
            .map(Some)
            .map_err(|_| Error::AnalysisMismatch {
                expected: key.name(),
                found: slot.primary_key().name(),
            })
    }

    /// Returns the result of type `T`.
    pub(crate) fn get_result<T: Send + Sync + 'static>(&self, graph: &FlowGraph) -> Result<Arc<T>> {
        self.try_get_result(graph)?
            .ok_or(Error::AnalysisNotRegistered {
                result_type: type_name::<T>(),
            })
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.snapshot().map(|t| t.slots.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{cache::key::ResultAlias, traits::ConstantAnalysis};

    #[derive(Debug, Clone, PartialEq)]
    struct Base(u32);

    #[derive(Debug, Clone, PartialEq)]
    struct Derived(u32);

    #[derive(Debug, Clone, PartialEq)]
    struct Other(u32);

    /// Produces `Derived` and also answers `Base` and `Other`.
    struct Overlapping(u32);

    impl FlowGraphAnalysis for Overlapping {
        type Output = Derived;

        fn analyze(&self, _graph: &FlowGraph) -> Result<Derived> {
            Ok(Derived(self.0))
        }

        fn aliases(&self) -> Vec<ResultAlias<Derived>> {
            vec![
                ResultAlias::new(|d: &Derived| Base(d.0)),
                ResultAlias::new(|d: &Derived| Other(d.0)),
            ]
        }
    }

    fn empty_cache() -> MacroAnalysisCache {
        MacroAnalysisCache::new(Arc::new(AnalysisRegistry::empty()))
    }

    #[test]
    fn test_missing_analysis_is_reported() {
        let graph = FlowGraph::with_registry(Arc::new(AnalysisRegistry::empty()));
        let cache = empty_cache();
        assert!(matches!(
            cache.get_result::<Base>(&graph),
            Err(Error::AnalysisNotRegistered { .. })
        ));
        assert!(cache.try_get_result::<Base>(&graph).unwrap().is_none());
    }

    #[test]
    fn test_reregistration_replaces_slot() {
        let graph = FlowGraph::new();
        let cache = empty_cache()
            .with_analysis(ConstantAnalysis::new(Base(1)))
            .unwrap()
            .with_analysis(ConstantAnalysis::new(Base(2)))
            .unwrap();
        assert_eq!(*cache.get_result::<Base>(&graph).unwrap(), Base(2));
        assert_eq!(cache.slot_count(), 1);
    }

    #[test]
    fn test_overlapping_types_share_a_slot() {
        let graph = FlowGraph::new();
        let cache = empty_cache().with_analysis(Overlapping(3)).unwrap();
        assert_eq!(cache.slot_count(), 1);
        assert_eq!(*cache.get_result::<Base>(&graph).unwrap(), Base(3));
        assert_eq!(*cache.get_result::<Derived>(&graph).unwrap(), Derived(3));
        assert_eq!(*cache.get_result::<Other>(&graph).unwrap(), Other(3));

        // Taking over one key keeps the overlapping slot alive for the others.
        let cache = cache.with_analysis(ConstantAnalysis::new(Base(9))).unwrap();
        assert_eq!(cache.slot_count(), 2);
        assert_eq!(*cache.get_result::<Base>(&graph).unwrap(), Base(9));
        assert_eq!(*cache.get_result::<Other>(&graph).unwrap(), Other(3));
    }

    #[test]
    fn test_multiple_reregistration_compacts() {
        let graph = FlowGraph::new();
        let cache = empty_cache()
            .with_analysis(ConstantAnalysis::new(Base(1)))
            .unwrap()
            .with_analysis(ConstantAnalysis::new(Other(1)))
            .unwrap()
            .with_analysis(ConstantAnalysis::new(Derived(1)))
            .unwrap();
        assert_eq!(cache.slot_count(), 3);

        // One analysis now answers all three keys; the three old slots all die at once.
        let cache = cache.with_analysis(Overlapping(5)).unwrap();
        assert_eq!(cache.slot_count(), 1);
        assert_eq!(*cache.get_result::<Base>(&graph).unwrap(), Base(5));
        assert_eq!(*cache.get_result::<Other>(&graph).unwrap(), Other(5));

        let cache = cache
            .with_analysis(ConstantAnalysis::new(Derived(6)))
            .unwrap()
            .with_analysis(ConstantAnalysis::new(Base(7)))
            .unwrap();
        assert_eq!(cache.slot_count(), 3);
        assert_eq!(*cache.get_result::<Derived>(&graph).unwrap(), Derived(6));
        assert_eq!(*cache.get_result::<Base>(&graph).unwrap(), Base(7));
        assert_eq!(*cache.get_result::<Other>(&graph).unwrap(), Other(5));

        let cache = cache.with_analysis(ConstantAnalysis::new(Other(8))).unwrap();
        assert_eq!(cache.slot_count(), 3);
        assert_eq!(*cache.get_result::<Other>(&graph).unwrap(), Other(8));
        assert_eq!(*cache.get_result::<Derived>(&graph).unwrap(), Derived(6));
    }

    #[test]
    fn test_update_preserves_installed_analyses() {
        let graph = FlowGraph::new();
        let cache = empty_cache()
            .with_analysis(ConstantAnalysis::new(Base(4)))
            .unwrap();
        let derived = cache
            .update(&FlowGraphUpdate::AddBlock {
                tag: crate::ir::BasicBlockTag::new("b"),
            })
            .unwrap();
        assert_eq!(*derived.get_result::<Base>(&graph).unwrap(), Base(4));
    }
}
