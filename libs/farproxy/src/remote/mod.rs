// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Client-side proxies for host-resident objects.
//!
//! A [`RemoteObject`] is built eagerly from a [`ProxyDescriptor`]: one member
//! table per prototype level, all sharing the object's id. Accessor members
//! are read from the host on every access. Method members are resolved on
//! first access with a single `MEMBER_GET` and cached on the slot, so a proxy
//! that is only navigated never pulls the function objects behind its methods.
//!
//! Dropping the last clone of a handle sends `DEREFERENCE` for every time the
//! host handed this object out while the handle was alive.

pub mod handle_cache;

pub use handle_cache::HandleCache;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::context::ContextShared;
use crate::error::{FarProxyError, Result};
use crate::ids::{ContextId, ObjectId};
use crate::marshal;
use crate::value::Value;
use crate::wire::{MemberDescriptor, MemberKind, Notice, ProtoDescriptor, ProxyDescriptor, ProxyKind, Request};

/// Handle to a host object or function. Clones are the same handle.
#[derive(Clone)]
pub struct RemoteObject {
    pub(crate) inner: Arc<RemoteObjectInner>,
}

pub(crate) struct RemoteObjectInner {
    id: ObjectId,
    name: String,
    kind: ProxyKind,
    /// Own members first, then one entry per prototype level.
    levels: Vec<PrototypeLevel>,
    /// Descriptors for this id received while this handle was alive.
    received: AtomicU32,
    context: Arc<ContextShared>,
}

struct PrototypeLevel {
    members: Vec<MemberSlot>,
}

struct MemberSlot {
    descriptor: MemberDescriptor,
    state: Mutex<MethodState>,
}

enum MethodState {
    Unresolved,
    /// The host function behind the method, fetched on first access.
    Resolved(RemoteObject),
    /// Replaced locally by assignment.
    Overridden(Value),
}

impl PrototypeLevel {
    fn new(members: Vec<MemberDescriptor>) -> Self {
        Self {
            members: members
                .into_iter()
                .map(|descriptor| MemberSlot {
                    descriptor,
                    state: Mutex::new(MethodState::Unresolved),
                })
                .collect(),
        }
    }

    fn slot(&self, name: &str) -> Option<&MemberSlot> {
        self.members.iter().find(|m| m.descriptor.name == name)
    }
}

impl RemoteObject {
    pub(crate) fn from_descriptor(context: &Arc<ContextShared>, descriptor: ProxyDescriptor) -> Self {
        let mut levels = vec![PrototypeLevel::new(descriptor.members)];
        let mut proto: Option<Box<ProtoDescriptor>> = descriptor.proto;
        while let Some(level) = proto {
            let ProtoDescriptor { members, proto: next } = *level;
            levels.push(PrototypeLevel::new(members));
            proto = next;
        }

        tracing::debug!(
            "RemoteObject: constructed proxy for object {} ({}, {} prototype levels)",
            descriptor.id,
            descriptor.name,
            levels.len() - 1
        );

        Self {
            inner: Arc::new(RemoteObjectInner {
                id: descriptor.id,
                name: descriptor.name,
                kind: descriptor.kind,
                levels,
                received: AtomicU32::new(1),
                context: Arc::clone(context),
            }),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.inner.id
    }

    /// Constructor name the host reported for the object.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn kind(&self) -> ProxyKind {
        self.inner.kind
    }

    pub fn is_function(&self) -> bool {
        self.inner.kind == ProxyKind::Function
    }

    pub fn context_id(&self) -> &ContextId {
        &self.inner.context.id
    }

    /// Number of prototype levels above the object's own members.
    pub fn prototype_depth(&self) -> usize {
        self.inner.levels.len() - 1
    }

    pub fn has_member(&self, name: &str) -> bool {
        self.slot(name).is_some()
    }

    /// Descriptor of the nearest member called `name`, own level first.
    pub fn member(&self, name: &str) -> Option<MemberDescriptor> {
        self.slot(name).map(|s| s.descriptor.clone())
    }

    /// Enumerable member names, own level first, shadowed names once.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = Vec::new();
        for level in &self.inner.levels {
            for slot in &level.members {
                let name = &slot.descriptor.name;
                if slot.descriptor.enumerable && !keys.iter().any(|k| k == name) {
                    keys.push(name.clone());
                }
            }
        }
        keys
    }

    /// Read a member.
    ///
    /// Accessors are read from the host every time. Methods cost one round
    /// trip on first access and none after.
    #[track_caller]
    pub fn get(&self, name: &str) -> Result<Value> {
        let slot = self.require_slot(name)?;
        match slot.descriptor.kind {
            MemberKind::Accessor => self.inner.context.request(Request::MemberGet {
                context_id: self.inner.context.id.clone(),
                object_id: self.inner.id,
                name: name.to_string(),
            }),
            MemberKind::Method => self.resolve_method(slot),
        }
    }

    /// Write a member. Methods are replaced locally; writable accessors are
    /// written on the host.
    #[track_caller]
    pub fn set(&self, name: &str, value: Value) -> Result<()> {
        let slot = self.require_slot(name)?;
        match slot.descriptor.kind {
            MemberKind::Method => {
                *slot.state.lock() = MethodState::Overridden(value);
                tracing::trace!("RemoteObject: overrode method {} on object {}", name, self.inner.id);
                Ok(())
            }
            MemberKind::Accessor if !slot.descriptor.writable => {
                Err(FarProxyError::ReadOnlyMember(name.to_string()))
            }
            MemberKind::Accessor => {
                let context = &self.inner.context;
                let value = marshal::marshal_value(&context.callbacks, &value)?;
                context.request(Request::MemberSet {
                    context_id: context.id.clone(),
                    object_id: self.inner.id,
                    name: name.to_string(),
                    value,
                })?;
                Ok(())
            }
        }
    }

    /// Call a member with this object as the receiver.
    #[track_caller]
    pub fn call_method(&self, name: &str, args: Vec<Value>) -> Result<Value> {
        let slot = self.require_slot(name)?;
        if slot.descriptor.kind == MemberKind::Accessor {
            return self.get(name)?.invoke(args);
        }

        let overridden = match &*slot.state.lock() {
            MethodState::Overridden(value) => Some(value.clone()),
            _ => None,
        };
        match overridden {
            Some(value) => value.invoke(args),
            None => self.member_call(name, args),
        }
    }

    /// Call a member as a constructor.
    #[track_caller]
    pub fn construct_method(&self, name: &str, args: Vec<Value>) -> Result<Value> {
        self.require_slot(name)?;
        let context = &self.inner.context;
        let args = marshal::marshal_args(&context.callbacks, &args)?;
        context.request(Request::MemberConstructor {
            context_id: context.id.clone(),
            object_id: self.inner.id,
            name: name.to_string(),
            args,
        })
    }

    /// Invoke a remote function.
    #[track_caller]
    pub fn call(&self, args: Vec<Value>) -> Result<Value> {
        self.ensure_callable()?;
        let context = &self.inner.context;
        let args = marshal::marshal_args(&context.callbacks, &args)?;
        context.request(Request::FunctionCall {
            context_id: context.id.clone(),
            object_id: self.inner.id,
            args,
        })
    }

    /// Invoke a remote function as a constructor.
    #[track_caller]
    pub fn construct(&self, args: Vec<Value>) -> Result<Value> {
        self.ensure_callable()?;
        let context = &self.inner.context;
        let args = marshal::marshal_args(&context.callbacks, &args)?;
        context.request(Request::Constructor {
            context_id: context.id.clone(),
            object_id: self.inner.id,
            args,
        })
    }

    pub fn ptr_eq(&self, other: &RemoteObject) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn note_received(&self) {
        self.inner.received.fetch_add(1, Ordering::Relaxed);
    }

    /// How many times the host has sent this object while this handle lived.
    pub fn received(&self) -> u32 {
        self.inner.received.load(Ordering::Relaxed)
    }

    fn slot(&self, name: &str) -> Option<&MemberSlot> {
        self.inner.levels.iter().find_map(|level| level.slot(name))
    }

    fn require_slot(&self, name: &str) -> Result<&MemberSlot> {
        self.slot(name).ok_or_else(|| FarProxyError::NoSuchMember {
            object_id: self.inner.id,
            name: name.to_string(),
        })
    }

    fn ensure_callable(&self) -> Result<()> {
        if self.is_function() {
            Ok(())
        } else {
            Err(FarProxyError::NotCallable(self.inner.id))
        }
    }

    #[track_caller]
    fn member_call(&self, name: &str, args: Vec<Value>) -> Result<Value> {
        let context = &self.inner.context;
        let args = marshal::marshal_args(&context.callbacks, &args)?;
        context.request(Request::MemberCall {
            context_id: context.id.clone(),
            object_id: self.inner.id,
            name: name.to_string(),
            args,
        })
    }

    #[track_caller]
    fn resolve_method(&self, slot: &MemberSlot) -> Result<Value> {
        let name = slot.descriptor.name.as_str();
        if let Some(value) = self.cached_method(slot) {
            return Ok(value);
        }

        // No lock is held across the round trip; decoding may re-enter this proxy.
        let fetched = self.inner.context.request(Request::MemberGet {
            context_id: self.inner.context.id.clone(),
            object_id: self.inner.id,
            name: name.to_string(),
        })?;
        tracing::debug!("RemoteObject: resolved method {} on object {}", name, self.inner.id);

        let function = match fetched {
            Value::Remote(function) => function,
            // The host replaced the method with plain data; nothing to cache.
            other => return Ok(other),
        };

        {
            let mut state = slot.state.lock();
            if matches!(*state, MethodState::Unresolved) {
                *state = MethodState::Resolved(function);
            }
        }
        Ok(self.cached_method(slot).unwrap_or(Value::Undefined))
    }

    fn cached_method(&self, slot: &MemberSlot) -> Option<Value> {
        match &*slot.state.lock() {
            MethodState::Unresolved => None,
            MethodState::Resolved(function) => Some(Value::Method(RemoteMethod {
                owner: self.clone(),
                name: slot.descriptor.name.clone(),
                function: function.clone(),
            })),
            MethodState::Overridden(value) => Some(value.clone()),
        }
    }
}

impl Drop for RemoteObjectInner {
    fn drop(&mut self) {
        self.context.handles.reclaim(self.id, self as *const RemoteObjectInner);
        if self.context.is_released() {
            return;
        }

        let delta = self.received.load(Ordering::Relaxed);
        tracing::debug!(
            "RemoteObject: dereferencing object {} (delta {})",
            self.id,
            delta
        );
        self.context.notify(Notice::Dereference {
            context_id: self.context.id.clone(),
            object_id: self.id,
            ref_count_delta: delta,
        });
    }
}

impl fmt::Debug for RemoteObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteObject")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("kind", &self.inner.kind)
            .finish()
    }
}

/// A method member of a [`RemoteObject`] after first access.
///
/// Calling it sends `MEMBER_CALL` against the owner, so the host sees the
/// owner as the receiver. Its own properties are those of the host function.
#[derive(Clone)]
pub struct RemoteMethod {
    owner: RemoteObject,
    name: String,
    function: RemoteObject,
}

impl RemoteMethod {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> &RemoteObject {
        &self.owner
    }

    /// The host function object backing this method.
    pub fn function(&self) -> &RemoteObject {
        &self.function
    }

    #[track_caller]
    pub fn call(&self, args: Vec<Value>) -> Result<Value> {
        self.owner.member_call(&self.name, args)
    }

    #[track_caller]
    pub fn construct(&self, args: Vec<Value>) -> Result<Value> {
        self.owner.construct_method(&self.name, args)
    }

    /// Read a property of the method's function object.
    #[track_caller]
    pub fn get(&self, name: &str) -> Result<Value> {
        self.function.get(name)
    }

    pub fn keys(&self) -> Vec<String> {
        self.function.keys()
    }

    pub fn ptr_eq(&self, other: &RemoteMethod) -> bool {
        self.owner.ptr_eq(&other.owner) && self.name == other.name && self.function.ptr_eq(&other.function)
    }
}

impl fmt::Debug for RemoteMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteMethod")
            .field("owner", &self.owner.inner.id)
            .field("name", &self.name)
            .field("function", &self.function.inner.id)
            .finish()
    }
}
