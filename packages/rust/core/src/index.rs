//! In-memory entry index: id → entry and path → id, kept in lockstep.
//!
//! All mutations take one exclusive write lock and update both maps before
//! releasing it, so readers observe either the state before an add or the
//! state after it. Change events are broadcast from inside the lock, so
//! subscribers see them in mutation order.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use docpipe_shared::{DocpipeError, Entry, EntryId, Result, VERSION_SEPARATOR};

use crate::version::{Version, normalize};

/// Default capacity of the change-event channel.
const EVENT_CAPACITY: usize = 1024;

/// A change to the index.
#[derive(Debug, Clone)]
pub enum IndexEvent {
    /// A new id was indexed.
    Added(Arc<Entry>),
    /// An existing id was replaced.
    Updated(Arc<Entry>),
    /// An entry left the index (explicit removal or superseded by another id
    /// taking over its path).
    Removed(Arc<Entry>),
}

/// What an [`EntryIndex::add`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// The id was not indexed before.
    Inserted,
    /// The id was indexed before and its entry was replaced.
    Replaced,
    /// The path belonged to another id, whose entry was removed.
    Superseded(EntryId),
}

#[derive(Debug, Default)]
struct IndexState {
    by_id: HashMap<EntryId, Arc<Entry>>,
    by_path: HashMap<String, EntryId>,
}

/// Thread-safe entry index. Share it behind an `Arc`.
pub struct EntryIndex {
    state: RwLock<IndexState>,
    events: broadcast::Sender<IndexEvent>,
}

impl Default for EntryIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EntryIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryIndex")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl EntryIndex {
    /// An empty index.
    pub fn new() -> Self {
        Self::with_event_capacity(EVENT_CAPACITY)
    }

    /// An empty index whose event channel buffers `capacity` events per
    /// subscriber before it starts lagging.
    pub fn with_event_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            state: RwLock::new(IndexState::default()),
            events,
        }
    }

    /// Subscribe to change events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<IndexEvent> {
        self.events.subscribe()
    }

    /// Insert or replace `entry` atomically.
    ///
    /// Replacing an id moves it to the new path and frees the old one. If the
    /// path is owned by a different id, that entry is removed in the same
    /// step.
    pub fn add(&self, entry: Entry) -> Result<AddOutcome> {
        if entry.path.is_empty() {
            return Err(DocpipeError::validation(format!(
                "entry {} has an empty path",
                entry.id
            )));
        }

        let mut state = self.state.write();

        // Check before touching anything so a violation leaves both maps as
        // they were.
        let owner = state.by_path.get(&entry.path).copied();
        let superseded = match owner {
            Some(other) if other != entry.id => {
                if !state.by_id.contains_key(&other) {
                    return Err(DocpipeError::IndexInvariant(format!(
                        "path {} maps to unknown id {other}",
                        entry.path
                    )));
                }
                Some(other)
            }
            _ => None,
        };
        let previous = state.by_id.get(&entry.id).cloned();
        if let Some(prev) = &previous {
            if state.by_path.get(&prev.path) != Some(&prev.id) {
                return Err(DocpipeError::IndexInvariant(format!(
                    "entry {} is not mapped from its path {}",
                    prev.id, prev.path
                )));
            }
        }

        let entry = Arc::new(entry);

        if let Some(other) = superseded {
            if let Some(old) = state.by_id.remove(&other) {
                debug!(old = %other, new = %entry.id, path = %entry.path, "entry superseded");
                let _ = self.events.send(IndexEvent::Removed(old));
            }
        }
        if let Some(prev) = &previous {
            if prev.path != entry.path {
                state.by_path.remove(&prev.path);
            }
        }
        state.by_path.insert(entry.path.clone(), entry.id);
        state.by_id.insert(entry.id, Arc::clone(&entry));

        let outcome = match (superseded, &previous) {
            (Some(other), _) => AddOutcome::Superseded(other),
            (None, Some(_)) => AddOutcome::Replaced,
            (None, None) => AddOutcome::Inserted,
        };

        let event = if previous.is_some() {
            IndexEvent::Updated(entry)
        } else {
            IndexEvent::Added(entry)
        };
        // No subscribers is fine.
        let _ = self.events.send(event);

        Ok(outcome)
    }

    /// Remove an entry by id. Unknown ids are a no-op.
    pub fn remove(&self, id: EntryId) -> Option<Arc<Entry>> {
        let mut state = self.state.write();
        let entry = state.by_id.remove(&id)?;
        if state.by_path.get(&entry.path) == Some(&id) {
            state.by_path.remove(&entry.path);
        } else {
            warn!(%id, path = %entry.path, "removed entry was not mapped from its path");
        }
        let _ = self.events.send(IndexEvent::Removed(Arc::clone(&entry)));
        Some(entry)
    }

    pub fn find_by_id(&self, id: EntryId) -> Option<Arc<Entry>> {
        self.state.read().by_id.get(&id).cloned()
    }

    pub fn find_by_path(&self, path: &str) -> Option<Arc<Entry>> {
        let state = self.state.read();
        let id = state.by_path.get(path)?;
        state.by_id.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().by_id.is_empty()
    }

    /// Snapshot of all entries, sorted by path.
    pub fn entries(&self) -> Vec<Arc<Entry>> {
        let mut entries: Vec<Arc<Entry>> = self.state.read().by_id.values().cloned().collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries
    }

    /// Versions indexed under `base`, i.e. every path `base~<version>`, sorted.
    pub fn versions_under(&self, base: &str) -> Vec<Version> {
        let state = self.state.read();
        let mut versions: Vec<Version> = state
            .by_path
            .keys()
            .filter_map(|path| {
                let (prefix, version) = path.rsplit_once(VERSION_SEPARATOR)?;
                (prefix == base && !version.is_empty()).then(|| normalize(version))
            })
            .collect();
        versions.sort();
        versions
    }

    /// Check that the two maps describe the same set of entries.
    pub fn verify(&self) -> Result<()> {
        let state = self.state.read();

        if state.by_id.len() != state.by_path.len() {
            return Err(DocpipeError::IndexInvariant(format!(
                "{} ids but {} paths",
                state.by_id.len(),
                state.by_path.len()
            )));
        }
        for (id, entry) in &state.by_id {
            if entry.id != *id {
                return Err(DocpipeError::IndexInvariant(format!(
                    "entry {} stored under id {id}",
                    entry.id
                )));
            }
            if state.by_path.get(&entry.path) != Some(id) {
                return Err(DocpipeError::IndexInvariant(format!(
                    "path {} does not map back to {id}",
                    entry.path
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn entry(path: &str) -> Entry {
        Entry::new(EntryId::new(), path, format!("content of {path}"))
    }

    #[test]
    fn add_and_find() {
        let index = EntryIndex::new();
        let e = entry("docs://api/endpoint~1.2.0");
        let id = e.id;

        assert_eq!(index.add(e).expect("add"), AddOutcome::Inserted);
        assert_eq!(index.len(), 1);
        assert_eq!(index.find_by_id(id).unwrap().path, "docs://api/endpoint~1.2.0");
        assert_eq!(index.find_by_path("docs://api/endpoint~1.2.0").unwrap().id, id);
        assert!(index.find_by_path("docs://api/other").is_none());
    }

    #[test]
    fn replace_same_id_moves_path() {
        let index = EntryIndex::new();
        let mut e = entry("docs://guide/intro~1.0.0");
        index.add(e.clone()).unwrap();

        e.path = "docs://guide/intro~1.1.0".into();
        e.content = "updated".into();
        assert_eq!(index.add(e.clone()).unwrap(), AddOutcome::Replaced);

        assert_eq!(index.len(), 1);
        assert!(index.find_by_path("docs://guide/intro~1.0.0").is_none());
        assert_eq!(index.find_by_id(e.id).unwrap().content, "updated");
        index.verify().expect("consistent");
    }

    #[test]
    fn new_id_at_taken_path_supersedes() {
        let index = EntryIndex::new();
        let first = entry("docs://guide/intro");
        let second = entry("docs://guide/intro");
        index.add(first.clone()).unwrap();

        assert_eq!(
            index.add(second.clone()).unwrap(),
            AddOutcome::Superseded(first.id)
        );
        assert_eq!(index.len(), 1);
        assert!(index.find_by_id(first.id).is_none());
        assert_eq!(index.find_by_path("docs://guide/intro").unwrap().id, second.id);
        index.verify().expect("consistent");
    }

    #[test]
    fn remove_is_noop_for_unknown_id() {
        let index = EntryIndex::new();
        let e = entry("docs://guide/intro");
        let id = e.id;
        index.add(e).unwrap();

        assert!(index.remove(EntryId::new()).is_none());
        assert_eq!(index.remove(id).unwrap().id, id);
        assert!(index.remove(id).is_none());
        assert!(index.is_empty());
        assert!(index.find_by_path("docs://guide/intro").is_none());
    }

    #[test]
    fn rejects_empty_path() {
        let index = EntryIndex::new();
        assert!(index.add(entry("")).is_err());
        assert!(index.is_empty());
    }

    #[test]
    fn versions_under_base() {
        let index = EntryIndex::new();
        for path in [
            "docs://api/endpoint~1.2.0",
            "docs://api/endpoint~1.0.0",
            "docs://api/endpoint~2024-01-01",
            "docs://api/other~9.0.0",
            "docs://api/endpoint",
        ] {
            index.add(entry(path)).unwrap();
        }

        let versions: Vec<String> = index
            .versions_under("docs://api/endpoint")
            .iter()
            .map(|v| v.canonical().to_string())
            .collect();
        assert_eq!(versions, vec!["1.0.0", "1.2.0", "2024-01-01"]);
    }

    #[test]
    fn entries_sorted_by_path() {
        let index = EntryIndex::new();
        for path in ["docs://c", "docs://a", "docs://b"] {
            index.add(entry(path)).unwrap();
        }
        let paths: Vec<String> = index.entries().iter().map(|e| e.path.clone()).collect();
        assert_eq!(paths, vec!["docs://a", "docs://b", "docs://c"]);
    }

    #[tokio::test]
    async fn events_follow_mutation_order() {
        let index = EntryIndex::new();
        let mut rx = index.subscribe();

        let first = entry("docs://guide/intro");
        let second = entry("docs://guide/intro");
        index.add(first.clone()).unwrap();
        index.add(first.clone()).unwrap();
        index.add(second.clone()).unwrap();
        index.remove(second.id);

        assert!(matches!(rx.recv().await.unwrap(), IndexEvent::Added(e) if e.id == first.id));
        assert!(matches!(rx.recv().await.unwrap(), IndexEvent::Updated(e) if e.id == first.id));
        assert!(matches!(rx.recv().await.unwrap(), IndexEvent::Removed(e) if e.id == first.id));
        assert!(matches!(rx.recv().await.unwrap(), IndexEvent::Added(e) if e.id == second.id));
        assert!(matches!(rx.recv().await.unwrap(), IndexEvent::Removed(e) if e.id == second.id));
    }

    #[test]
    fn concurrent_readers_and_writers() {
        let index = Arc::new(EntryIndex::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let index = Arc::clone(&index);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let path = format!("docs://t{}/p{}", t % 2, i % 10);
                        index.add(entry(&path)).unwrap();
                        let _ = index.find_by_path(&path);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().expect("thread");
        }

        index.verify().expect("consistent");
        assert_eq!(index.len(), 20);
    }

    const PATHS: [&str; 5] = ["docs://a~1", "docs://b~1", "docs://c~2", "docs://a~2", "docs://d"];

    #[derive(Debug, Clone)]
    enum Op {
        Insert(usize),
        Move(prop::sample::Index, usize),
        Remove(prop::sample::Index),
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        prop_oneof![
            2 => (0..PATHS.len()).prop_map(Op::Insert),
            1 => (any::<prop::sample::Index>(), 0..PATHS.len()).prop_map(|(i, p)| Op::Move(i, p)),
            1 => any::<prop::sample::Index>().prop_map(Op::Remove),
        ]
    }

    proptest! {
        #[test]
        fn stays_consistent_under_mixed_operations(ops in prop::collection::vec(arb_op(), 1..80)) {
            let index = EntryIndex::new();
            let mut model: BTreeMap<String, EntryId> = BTreeMap::new();
            let mut ids: Vec<EntryId> = Vec::new();

            for op in ops {
                match op {
                    Op::Insert(p) => {
                        let e = entry(PATHS[p]);
                        ids.push(e.id);
                        model.insert(PATHS[p].to_string(), e.id);
                        index.add(e).expect("add");
                    }
                    Op::Move(i, p) if !ids.is_empty() => {
                        let id = ids[i.index(ids.len())];
                        if let Some(existing) = index.find_by_id(id) {
                            let mut moved = (*existing).clone();
                            moved.path = PATHS[p].to_string();
                            model.retain(|_, owner| *owner != id);
                            model.insert(moved.path.clone(), id);
                            index.add(moved).expect("move");
                        }
                    }
                    Op::Remove(i) if !ids.is_empty() => {
                        let id = ids[i.index(ids.len())];
                        model.retain(|_, owner| *owner != id);
                        index.remove(id);
                    }
                    _ => {}
                }

                prop_assert!(index.verify().is_ok());
                prop_assert_eq!(index.len(), model.len());
                for (path, id) in &model {
                    prop_assert_eq!(index.find_by_path(path).map(|e| e.id), Some(*id));
                    let by_id = index.find_by_id(*id).map(|e| e.path.clone());
                    prop_assert_eq!(by_id.as_deref(), Some(path.as_str()));
                }
            }
        }
    }
}
