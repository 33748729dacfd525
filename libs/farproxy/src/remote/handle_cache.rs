// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Weak `ObjectId -> RemoteObject` map for one context.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::{RemoteObject, RemoteObjectInner};
use crate::ids::ObjectId;

/// Holds at most one live handle per host object id.
///
/// Slots are weak: the cache never keeps a handle alive. A handle removes
/// its own slot when dropped (see [`HandleCache::reclaim`]).
#[derive(Default)]
pub struct HandleCache {
    slots: Mutex<HashMap<ObjectId, Weak<RemoteObjectInner>>>,
}

impl HandleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The live handle for `id`, if any. A dead slot is cleared on the way.
    pub fn get_or_null(&self, id: ObjectId) -> Option<RemoteObject> {
        let mut slots = self.slots.lock();
        let live = slots.get(&id).and_then(Weak::upgrade);
        match live {
            Some(inner) => Some(RemoteObject { inner }),
            None => {
                slots.remove(&id);
                None
            }
        }
    }

    /// Return the live handle for `id`, counting one more receipt of it, or
    /// build and cache a new one. Lookup and insert happen under one lock so
    /// two decoders racing on the same id agree on a single handle.
    pub(crate) fn get_or_insert_with<F>(&self, id: ObjectId, build: F) -> RemoteObject
    where
        F: FnOnce() -> RemoteObject,
    {
        let mut slots = self.slots.lock();
        if let Some(inner) = slots.get(&id).and_then(Weak::upgrade) {
            let handle = RemoteObject { inner };
            handle.note_received();
            tracing::trace!("HandleCache: hit for object {}", id);
            return handle;
        }

        let handle = build();
        slots.insert(id, Arc::downgrade(&handle.inner));
        handle
    }

    /// Called from a handle's destructor. Removes the slot only if it still
    /// points at the dropping handle; a newer handle for the same id may
    /// already have replaced it.
    pub(crate) fn reclaim(&self, id: ObjectId, dropping: *const RemoteObjectInner) -> bool {
        let mut slots = self.slots.lock();
        match slots.get(&id) {
            Some(slot) if std::ptr::eq(slot.as_ptr(), dropping) => {
                slots.remove(&id);
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.get_or_null(id).is_some()
    }

    /// Number of slots, including any not yet cleared.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.slots.lock().clear();
    }
}
