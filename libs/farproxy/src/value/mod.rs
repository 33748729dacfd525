// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Client-side values.
//!
//! Arrays and plain objects are shared (`Arc`) so that the same array can be
//! reachable from two places, or from itself. Identity of those containers is
//! what the marshaler's cycle detection keys on.

mod function;
mod image;
mod promise;

pub use function::{CallbackFn, ClientFunction};
pub use image::{ImageRepresentation, NativeImage};
pub use promise::{Promise, PromiseState};

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;

use crate::error::{FarProxyError, Result};
use crate::remote::{RemoteMethod, RemoteObject};

/// A value on the client side of the boundary.
#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    /// Milliseconds since the Unix epoch.
    Date(f64),
    RegExp {
        source: String,
        flags: String,
    },
    /// Raw binary payload, copied by value across the boundary.
    Buffer(Bytes),
    Array(ArrayRef),
    Object(ObjectRef),
    Image(NativeImage),
    Error(ErrorValue),
    /// A function owned by this process.
    Function(ClientFunction),
    Promise(Promise),
    /// Proxy for a host-resident object or function.
    Remote(RemoteObject),
    /// A method member of a proxy, resolved on first access.
    Method(RemoteMethod),
    /// Opaque structured payload passed through as-is.
    Structured(serde_json::Value),
}

impl Value {
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayRef> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_remote(&self) -> Option<&RemoteObject> {
        match self {
            Value::Remote(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_method(&self) -> Option<&RemoteMethod> {
        match self {
            Value::Method(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&ClientFunction> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_promise(&self) -> Option<&Promise> {
        match self {
            Value::Promise(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&ErrorValue> {
        match self {
            Value::Error(e) => Some(e),
            _ => None,
        }
    }

    /// Whether [`Value::invoke`] can do anything with this value.
    pub fn is_callable(&self) -> bool {
        match self {
            Value::Function(_) | Value::Method(_) => true,
            Value::Remote(r) => r.is_function(),
            _ => false,
        }
    }

    /// Call this value as a function, local or remote.
    #[track_caller]
    pub fn invoke(&self, args: Vec<Value>) -> Result<Value> {
        match self {
            Value::Function(f) => f.call(args),
            Value::Remote(r) => r.call(args),
            Value::Method(m) => m.call(args),
            other => Err(FarProxyError::TypeError(format!(
                "value of type '{}' is not callable",
                other.type_name()
            ))),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::RegExp { .. } => "regexp",
            Value::Buffer(_) => "buffer",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Image(_) => "image",
            Value::Error(_) => "error",
            Value::Function(_) => "function",
            Value::Promise(_) => "promise",
            Value::Remote(_) => "remote",
            Value::Method(_) => "method",
            Value::Structured(_) => "structured",
        }
    }
}

/// Deep equality for data, identity for functions, promises and proxies.
///
/// Cyclic arrays or objects compare forever; only compare acyclic values.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (
                Value::RegExp { source, flags },
                Value::RegExp {
                    source: other_source,
                    flags: other_flags,
                },
            ) => source == other_source && flags == other_flags,
            (Value::Buffer(a), Value::Buffer(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b) || a.to_vec() == b.to_vec(),
            (Value::Object(a), Value::Object(b)) => {
                a.ptr_eq(b) || (a.class_name() == b.class_name() && a.entries() == b.entries())
            }
            (Value::Image(a), Value::Image(b)) => a == b,
            (Value::Error(a), Value::Error(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            (Value::Promise(a), Value::Promise(b)) => a.ptr_eq(b),
            (Value::Remote(a), Value::Remote(b)) => a.ptr_eq(b),
            (Value::Method(a), Value::Method(b)) => a.ptr_eq(b),
            (Value::Structured(a), Value::Structured(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Date(ms) => write!(f, "Date({ms})"),
            Value::RegExp { source, flags } => write!(f, "/{source}/{flags}"),
            Value::Buffer(b) => write!(f, "Buffer({} bytes)", b.len()),
            Value::Array(a) => fmt::Debug::fmt(a, f),
            Value::Object(o) => fmt::Debug::fmt(o, f),
            Value::Image(i) => fmt::Debug::fmt(i, f),
            Value::Error(e) => fmt::Debug::fmt(e, f),
            Value::Function(func) => fmt::Debug::fmt(func, f),
            Value::Promise(p) => fmt::Debug::fmt(p, f),
            Value::Remote(r) => fmt::Debug::fmt(r, f),
            Value::Method(m) => fmt::Debug::fmt(m, f),
            Value::Structured(v) => write!(f, "Structured({v})"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Value::Buffer(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Value::Array(ArrayRef::new(values))
    }
}

impl From<ArrayRef> for Value {
    fn from(a: ArrayRef) -> Self {
        Value::Array(a)
    }
}

impl From<ObjectRef> for Value {
    fn from(o: ObjectRef) -> Self {
        Value::Object(o)
    }
}

impl From<ClientFunction> for Value {
    fn from(f: ClientFunction) -> Self {
        Value::Function(f)
    }
}

impl From<Promise> for Value {
    fn from(p: Promise) -> Self {
        Value::Promise(p)
    }
}

impl From<NativeImage> for Value {
    fn from(i: NativeImage) -> Self {
        Value::Image(i)
    }
}

impl From<ErrorValue> for Value {
    fn from(e: ErrorValue) -> Self {
        Value::Error(e)
    }
}

impl From<RemoteObject> for Value {
    fn from(r: RemoteObject) -> Self {
        Value::Remote(r)
    }
}

/// Shared, mutable array. Clones share storage.
#[derive(Clone, Default)]
pub struct ArrayRef(Arc<RwLock<Vec<Value>>>);

impl ArrayRef {
    pub fn new(values: Vec<Value>) -> Self {
        Self(Arc::new(RwLock::new(values)))
    }

    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.read().get(index).cloned()
    }

    pub fn push(&self, value: Value) {
        self.0.write().push(value);
    }

    pub fn set(&self, index: usize, value: Value) -> bool {
        match self.0.write().get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Snapshot of the current elements.
    pub fn to_vec(&self) -> Vec<Value> {
        self.0.read().clone()
    }

    pub fn ptr_eq(&self, other: &ArrayRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl fmt::Debug for ArrayRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.read().iter()).finish()
    }
}

/// Plain object: a class name plus ordered own-enumerable properties.
#[derive(Clone, Default)]
pub struct ObjectRef(Arc<RwLock<PlainObject>>);

#[derive(Clone, Default)]
struct PlainObject {
    class_name: String,
    properties: Vec<(String, Value)>,
}

impl ObjectRef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_class_name(class_name: impl Into<String>) -> Self {
        Self(Arc::new(RwLock::new(PlainObject {
            class_name: class_name.into(),
            properties: Vec::new(),
        })))
    }

    /// Build an object from `(key, value)` pairs, keeping their order.
    pub fn from_entries<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        let object = Self::new();
        for (key, value) in entries {
            object.set(key, value);
        }
        object
    }

    pub fn class_name(&self) -> String {
        self.0.read().class_name.clone()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.0
            .read()
            .properties
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    /// Insert or replace a property. New keys keep insertion order.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        let mut object = self.0.write();
        match object.properties.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => object.properties.push((key, value)),
        }
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        let mut object = self.0.write();
        let index = object.properties.iter().position(|(k, _)| k == key)?;
        Some(object.properties.remove(index).1)
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.read().properties.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn entries(&self) -> Vec<(String, Value)> {
        self.0.read().properties.clone()
    }

    pub fn len(&self) -> usize {
        self.0.read().properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.read().properties.is_empty()
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let object = self.0.read();
        let mut map = f.debug_map();
        for (key, value) in &object.properties {
            map.entry(key, value);
        }
        map.finish()
    }
}

/// An error value, either local or reconstructed from the host.
#[derive(Clone, Debug, PartialEq)]
pub struct ErrorValue {
    pub name: String,
    pub message: String,
    pub stack: Option<String>,
    /// Extra own-properties carried alongside the error.
    pub properties: Vec<(String, Value)>,
}

impl ErrorValue {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            name: "Error".to_string(),
            message: message.into(),
            stack: None,
            properties: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.push((key.into(), value));
        self
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}
