// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Client functions handed to the host, addressable by [`CallbackId`].

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::error::Result;
use crate::ids::CallbackId;
use crate::value::{ClientFunction, Value};

/// A registered function and the label it was registered under.
#[derive(Debug, Clone)]
pub struct CallbackRecord {
    pub id: CallbackId,
    pub function: ClientFunction,
    /// Where the function was created, for leak reports.
    pub label: String,
}

#[derive(Default)]
struct RegistryState {
    next_id: u64,
    by_id: HashMap<CallbackId, CallbackRecord>,
    by_function: HashMap<usize, CallbackId>,
}

/// Bidirectional map between client functions and callback ids.
///
/// Registering the same function twice yields the same id. Ids are never
/// reused within one registry.
#[derive(Default)]
pub struct CallbackRegistry {
    state: Mutex<RegistryState>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, function: &ClientFunction) -> CallbackId {
        let mut state = self.state.lock();
        if let Some(id) = state.by_function.get(&function.identity()) {
            return *id;
        }

        state.next_id += 1;
        let id = CallbackId(state.next_id);
        state.by_function.insert(function.identity(), id);
        state.by_id.insert(
            id,
            CallbackRecord {
                id,
                function: function.clone(),
                label: function.location(),
            },
        );
        tracing::trace!("CallbackRegistry: registered {} at {}", id, function.location());
        id
    }

    /// The function for `id`, or a no-op if the id is unknown or released.
    pub fn resolve(&self, id: CallbackId) -> ClientFunction {
        match self.lookup(id) {
            Some(function) => function,
            None => ClientFunction::noop(),
        }
    }

    pub fn lookup(&self, id: CallbackId) -> Option<ClientFunction> {
        self.state.lock().by_id.get(&id).map(|r| r.function.clone())
    }

    pub fn id_of(&self, function: &ClientFunction) -> Option<CallbackId> {
        self.state.lock().by_function.get(&function.identity()).copied()
    }

    /// Returns `false` if `id` was not registered.
    pub fn unregister(&self, id: CallbackId) -> bool {
        let mut state = self.state.lock();
        match state.by_id.remove(&id) {
            Some(record) => {
                state.by_function.remove(&record.function.identity());
                tracing::trace!("CallbackRegistry: released {}", id);
                true
            }
            None => false,
        }
    }

    /// Invoke the callback for `id`. Unknown ids are a silent no-op.
    pub fn invoke(&self, id: CallbackId, args: Vec<Value>) -> Result<Value> {
        // Resolve under the lock, call outside it: the body may register more callbacks.
        let function = self.lookup(id);
        match function {
            Some(function) => function.call(args),
            None => {
                tracing::debug!("CallbackRegistry: ignoring call to unknown callback {}", id);
                Ok(Value::Undefined)
            }
        }
    }

    /// `(id, label)` for every live callback, ordered by id.
    pub fn records(&self) -> Vec<(CallbackId, String)> {
        let state = self.state.lock();
        let mut records: Vec<_> = state
            .by_id
            .values()
            .map(|r| (r.id, r.label.clone()))
            .collect();
        records.sort_by_key(|(id, _)| *id);
        records
    }

    pub fn len(&self) -> usize {
        self.state.lock().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.by_id.clear();
        state.by_function.clear();
    }
}
