// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use super::Value;
use crate::error::Result;

/// Signature of a client-owned function body.
pub type CallbackFn = dyn Fn(Vec<Value>) -> Result<Value> + Send + Sync;

/// A function owned by this process that the host may be handed and call back.
///
/// Identity is the shared allocation: clones are the same function, two
/// separately constructed functions are never the same function even if
/// their bodies are identical.
#[derive(Clone)]
pub struct ClientFunction {
    inner: Arc<FunctionInner>,
}

struct FunctionInner {
    body: Box<CallbackFn>,
    arity: u32,
    location: &'static Location<'static>,
    returns_value: bool,
}

impl ClientFunction {
    /// Wrap a closure. `arity` is the declared parameter count reported to the host.
    ///
    /// The caller's source location is kept as the call-site label used for
    /// leak diagnostics.
    #[track_caller]
    pub fn new<F>(arity: u32, body: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Value> + Send + Sync + 'static,
    {
        Self::with_location(arity, Location::caller(), body)
    }

    /// Like [`ClientFunction::new`] but labelled with an explicit location,
    /// for functions built on a user's behalf deep inside the library.
    pub fn with_location<F>(arity: u32, location: &'static Location<'static>, body: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(FunctionInner {
                body: Box::new(body),
                arity,
                location,
                returns_value: false,
            }),
        }
    }

    /// A thunk that returns `value` when called. Marshaled as
    /// `function-with-return-value`, so the host never calls back for it.
    #[track_caller]
    pub fn returning(value: Value) -> Self {
        Self {
            inner: Arc::new(FunctionInner {
                body: Box::new(move |_| Ok(value.clone())),
                arity: 0,
                location: Location::caller(),
                returns_value: true,
            }),
        }
    }

    /// Does nothing and returns `undefined`.
    #[track_caller]
    pub fn noop() -> Self {
        Self::new(0, |_| Ok(Value::Undefined))
    }

    pub fn call(&self, args: Vec<Value>) -> Result<Value> {
        (self.inner.body)(args)
    }

    pub fn arity(&self) -> u32 {
        self.inner.arity
    }

    /// `file:line:column` where this function was constructed.
    pub fn location(&self) -> String {
        let location = self.inner.location;
        format!(
            "{}:{}:{}",
            location.file(),
            location.line(),
            location.column()
        )
    }

    pub fn returns_value(&self) -> bool {
        self.inner.returns_value
    }

    pub fn ptr_eq(&self, other: &ClientFunction) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn identity(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }
}

impl fmt::Debug for ClientFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientFunction")
            .field("arity", &self.inner.arity)
            .field("location", &self.location())
            .field("returns_value", &self.inner.returns_value)
            .finish()
    }
}
