// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Host-side object table with per-context retain counts.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::ids::{ContextId, ObjectId};

/// Objects the host has handed to clients, keyed by a host-unique id.
///
/// Handing out the same `Arc` twice yields the same id. Every hand-out
/// retains the object once for the receiving context; an object is freed
/// when no context retains it.
pub struct ObjectRegistry<T> {
    inner: Arc<RwLock<RegistryState<T>>>,
}

struct RegistryState<T> {
    next_id: u64,
    entries: HashMap<ObjectId, Entry<T>>,
    by_identity: HashMap<usize, ObjectId>,
}

struct Entry<T> {
    object: Arc<T>,
    retains: HashMap<ContextId, u32>,
}

impl<T> Clone for ObjectRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for ObjectRegistry<T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(RwLock::new(RegistryState {
                next_id: 0,
                entries: HashMap::new(),
                by_identity: HashMap::new(),
            })),
        }
    }
}

fn identity<T>(object: &Arc<T>) -> usize {
    Arc::as_ptr(object) as *const () as usize
}

impl<T> ObjectRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id for `object`, retained once more for `context`.
    pub fn add(&self, context: &ContextId, object: &Arc<T>) -> ObjectId {
        let mut state = self.inner.write();
        let id = match state.by_identity.get(&identity(object)) {
            Some(id) => *id,
            None => {
                state.next_id += 1;
                let id = ObjectId(state.next_id);
                state.by_identity.insert(identity(object), id);
                state.entries.insert(
                    id,
                    Entry {
                        object: Arc::clone(object),
                        retains: HashMap::new(),
                    },
                );
                id
            }
        };
        if let Some(entry) = state.entries.get_mut(&id) {
            *entry.retains.entry(context.clone()).or_insert(0) += 1;
        }
        id
    }

    pub fn get(&self, id: ObjectId) -> Option<Arc<T>> {
        self.inner.read().entries.get(&id).map(|e| Arc::clone(&e.object))
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.inner.read().entries.contains_key(&id)
    }

    /// Release `delta` retains held by `context`; `0` releases all of them.
    /// Returns `true` if the object was freed.
    pub fn remove(&self, context: &ContextId, id: ObjectId, delta: u32) -> bool {
        let mut state = self.inner.write();
        let Some(entry) = state.entries.get_mut(&id) else {
            tracing::debug!("ObjectRegistry: dereference of unknown object {}", id);
            return false;
        };

        if let Some(count) = entry.retains.get_mut(context) {
            *count = if delta == 0 { 0 } else { count.saturating_sub(delta) };
            if *count == 0 {
                entry.retains.remove(context);
            }
        }

        if entry.retains.is_empty() {
            Self::free(&mut state, id);
            true
        } else {
            false
        }
    }

    /// Drop every retain held by `context`. Returns how many objects were freed.
    pub fn clear(&self, context: &ContextId) -> usize {
        let mut state = self.inner.write();
        let mut freed = Vec::new();
        for (id, entry) in state.entries.iter_mut() {
            if entry.retains.remove(context).is_some() && entry.retains.is_empty() {
                freed.push(*id);
            }
        }
        for id in &freed {
            Self::free(&mut state, *id);
        }
        freed.len()
    }

    pub fn retain_count(&self, context: &ContextId, id: ObjectId) -> u32 {
        self.inner
            .read()
            .entries
            .get(&id)
            .and_then(|e| e.retains.get(context).copied())
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn free(state: &mut RegistryState<T>, id: ObjectId) {
        if let Some(entry) = state.entries.remove(&id) {
            state.by_identity.remove(&identity(&entry.object));
            tracing::debug!("ObjectRegistry: freed object {}", id);
        }
    }
}
