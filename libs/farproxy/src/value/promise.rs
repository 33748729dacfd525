// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::Value;

/// Settlement state of a [`Promise`].
#[derive(Debug, Clone, PartialEq)]
pub enum PromiseState {
    Pending,
    Fulfilled(Value),
    Rejected(Value),
}

type Reaction = Box<dyn FnOnce(Result<Value, Value>) + Send>;

/// A single-assignment continuation shared between the code that settles it
/// and the code waiting on it. The first settlement wins.
#[derive(Clone)]
pub struct Promise {
    inner: Arc<Mutex<PromiseInner>>,
}

struct PromiseInner {
    state: PromiseState,
    reactions: Vec<Reaction>,
}

impl Promise {
    pub fn pending() -> Self {
        Self {
            inner: Arc::new(Mutex::new(PromiseInner {
                state: PromiseState::Pending,
                reactions: Vec::new(),
            })),
        }
    }

    pub fn resolved(value: Value) -> Self {
        let promise = Self::pending();
        promise.resolve(value);
        promise
    }

    pub fn rejected(reason: Value) -> Self {
        let promise = Self::pending();
        promise.reject(reason);
        promise
    }

    /// Returns `false` if the promise was already settled.
    pub fn resolve(&self, value: Value) -> bool {
        self.settle(Ok(value))
    }

    /// Returns `false` if the promise was already settled.
    pub fn reject(&self, reason: Value) -> bool {
        self.settle(Err(reason))
    }

    pub fn state(&self) -> PromiseState {
        self.inner.lock().state.clone()
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.inner.lock().state, PromiseState::Pending)
    }

    /// Register settlement reactions. Runs immediately if already settled.
    pub fn then<F, R>(&self, on_fulfilled: F, on_rejected: R)
    where
        F: FnOnce(Value) + Send + 'static,
        R: FnOnce(Value) + Send + 'static,
    {
        let reaction: Reaction = Box::new(move |outcome| match outcome {
            Ok(value) => on_fulfilled(value),
            Err(reason) => on_rejected(reason),
        });

        let settled = {
            let mut inner = self.inner.lock();
            match &inner.state {
                PromiseState::Pending => {
                    inner.reactions.push(reaction);
                    return;
                }
                PromiseState::Fulfilled(value) => Ok(value.clone()),
                PromiseState::Rejected(reason) => Err(reason.clone()),
            }
        };
        reaction(settled);
    }

    pub fn ptr_eq(&self, other: &Promise) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn settle(&self, outcome: Result<Value, Value>) -> bool {
        // Reactions run outside the lock; they may settle or observe other promises.
        let reactions = {
            let mut inner = self.inner.lock();
            if !matches!(inner.state, PromiseState::Pending) {
                return false;
            }
            inner.state = match &outcome {
                Ok(value) => PromiseState::Fulfilled(value.clone()),
                Err(reason) => PromiseState::Rejected(reason.clone()),
            };
            std::mem::take(&mut inner.reactions)
        };
        for reaction in reactions {
            reaction(outcome.clone());
        }
        true
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_lock() {
            Some(inner) => f.debug_tuple("Promise").field(&inner.state).finish(),
            None => write!(f, "Promise(<locked>)"),
        }
    }
}
