// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Cross-process remote objects.
//!
//! A [`ClientContext`] talks to a host over a [`Transport`]. Host objects
//! arrive as [`RemoteObject`] proxies whose members are read, written and
//! called through blocking requests; client functions passed as arguments are
//! registered as callbacks the host invokes through pushes. Dropping a proxy
//! tells the host to release it; dropping the context releases everything.

pub mod callbacks;
pub mod config;
pub mod context;
mod decode;
pub mod error;
pub mod host;
pub mod ids;
pub mod marshal;
pub mod remote;
pub mod transport;
pub mod value;
pub mod wire;

pub use callbacks::{CallbackRecord, CallbackRegistry};
pub use config::ContextConfig;
pub use context::ClientContext;
pub use error::{FarProxyError, Result};
pub use host::{HostEndpoint, HostHandler, HostPusher, HostSession, ObjectRegistry};
pub use ids::{CallbackId, ContextId, ObjectId, RequestId};
pub use remote::{HandleCache, RemoteMethod, RemoteObject};
pub use transport::{ChannelTransport, HostLink, Transport};
pub use value::{
    ArrayRef, ClientFunction, ErrorValue, ImageRepresentation, NativeImage, ObjectRef, Promise,
    PromiseState, Value,
};
pub use wire::{MemberDescriptor, MemberKind, ProxyKind, WireValue};
