// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Wire values: the only thing that crosses the process boundary.

pub mod codec;
pub mod messages;

pub use messages::{ClientMessage, HostMessage, Notice, Push, Request};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::ids::{CallbackId, ObjectId};

/// Tagged serialized form of any value crossing the boundary.
///
/// `object`, `remote-object`, `function` and `function-with-return-value`
/// are produced by the client; `proxy` is produced by the host. Everything
/// else travels both ways.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WireValue {
    /// Structurally cloneable scalar, copied by value.
    Value { value: PlainValue },
    Array { members: Vec<WireValue> },
    Buffer { value: Bytes },
    Image { value: ImageWire },
    /// Plain object argument. Identity is not preserved.
    Object { name: String, members: Vec<WireMember> },
    /// A proxy the client previously received, passed back by id.
    RemoteObject { id: ObjectId },
    /// A client function the host may call back.
    Function {
        id: CallbackId,
        location: Option<String>,
        length: u32,
    },
    /// A thunk whose result is sent instead of a callback.
    FunctionWithReturnValue { value: Box<WireValue> },
    /// `then` is the settlement continuation: call it with `(onFulfilled, onRejected)`.
    Promise { then: Box<WireValue> },
    /// An error as data.
    Error {
        value: ErrorPayload,
        members: Vec<WireMember>,
    },
    /// An error to be raised on the receiving side.
    Exception { value: Box<WireValue> },
    /// A host object or function the client should proxy.
    ///
    /// Travels as `proxy` with `kind: object|function` rather than reusing the
    /// `object` and `function` tags, which already mean a client plain object
    /// and a client callback. A host emitting `object`/`function` for proxies
    /// is never read as a proxy here.
    Proxy(ProxyDescriptor),
}

impl WireValue {
    pub fn plain(value: PlainValue) -> Self {
        WireValue::Value { value }
    }

    pub fn null() -> Self {
        Self::plain(PlainValue::Null)
    }

    pub fn undefined() -> Self {
        Self::plain(PlainValue::Undefined)
    }

    pub fn number(n: f64) -> Self {
        Self::plain(PlainValue::Number(n))
    }

    pub fn string(s: impl Into<String>) -> Self {
        Self::plain(PlainValue::String(s.into()))
    }

    pub fn array(members: Vec<WireValue>) -> Self {
        WireValue::Array { members }
    }

    /// An `exception` wrapping an `error` with the given name and message.
    pub fn exception(name: impl Into<String>, message: impl Into<String>) -> Self {
        WireValue::Exception {
            value: Box::new(WireValue::Error {
                value: ErrorPayload {
                    name: name.into(),
                    message: message.into(),
                    stack: None,
                },
                members: Vec::new(),
            }),
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            WireValue::Value { .. } => "value",
            WireValue::Array { .. } => "array",
            WireValue::Buffer { .. } => "buffer",
            WireValue::Image { .. } => "image",
            WireValue::Object { .. } => "object",
            WireValue::RemoteObject { .. } => "remote-object",
            WireValue::Function { .. } => "function",
            WireValue::FunctionWithReturnValue { .. } => "function-with-return-value",
            WireValue::Promise { .. } => "promise",
            WireValue::Error { .. } => "error",
            WireValue::Exception { .. } => "exception",
            WireValue::Proxy(_) => "proxy",
        }
    }
}

/// Payload of a `value` wire value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "kebab-case")]
pub enum PlainValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    /// Milliseconds since the Unix epoch.
    Date(f64),
    RegExp { source: String, flags: String },
    Error(ErrorPayload),
    Binary(Bytes),
    Json(serde_json::Value),
}

/// The reconstructible core of an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub name: String,
    pub message: String,
    #[serde(default)]
    pub stack: Option<String>,
}

/// A named nested wire value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMember {
    pub name: String,
    pub value: WireValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "form", rename_all = "kebab-case")]
pub enum ImageWire {
    Bitmap {
        scale_factor: f32,
        width: u32,
        height: u32,
        data: Bytes,
    },
    Encoded {
        representations: Vec<EncodedRepresentation>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedRepresentation {
    pub scale_factor: f32,
    pub width: u32,
    pub height: u32,
    pub png: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProxyKind {
    Object,
    Function,
}

/// Shape of a host object: its own members and its prototype chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyDescriptor {
    pub kind: ProxyKind,
    pub id: ObjectId,
    pub name: String,
    pub members: Vec<MemberDescriptor>,
    #[serde(default)]
    pub proto: Option<Box<ProtoDescriptor>>,
}

/// One prototype level. Members resolve against the owning object's id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtoDescriptor {
    pub members: Vec<MemberDescriptor>,
    #[serde(default)]
    pub proto: Option<Box<ProtoDescriptor>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MemberKind {
    Method,
    Accessor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberDescriptor {
    pub name: String,
    pub enumerable: bool,
    #[serde(default)]
    pub writable: bool,
    pub kind: MemberKind,
}

impl MemberDescriptor {
    pub fn method(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enumerable: true,
            writable: false,
            kind: MemberKind::Method,
        }
    }

    pub fn accessor(name: impl Into<String>, writable: bool) -> Self {
        Self {
            name: name.into(),
            enumerable: true,
            writable,
            kind: MemberKind::Accessor,
        }
    }
}
