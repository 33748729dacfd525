// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! The host verb set and the frames that carry it.

use serde::{Deserialize, Serialize};

use super::WireValue;
use crate::ids::{CallbackId, ContextId, ObjectId, RequestId};

/// Blocking requests. Every one is answered by exactly one [`HostMessage::Response`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verb", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    Require {
        context_id: ContextId,
        module: String,
        call_site: Option<String>,
    },
    GetBuiltin {
        context_id: ContextId,
        name: String,
        call_site: Option<String>,
    },
    Global {
        context_id: ContextId,
        name: String,
        call_site: Option<String>,
    },
    CurrentWindow {
        context_id: ContextId,
        call_site: Option<String>,
    },
    CurrentContextOwner {
        context_id: ContextId,
        call_site: Option<String>,
    },
    MemberGet {
        context_id: ContextId,
        object_id: ObjectId,
        name: String,
    },
    MemberSet {
        context_id: ContextId,
        object_id: ObjectId,
        name: String,
        value: WireValue,
    },
    MemberCall {
        context_id: ContextId,
        object_id: ObjectId,
        name: String,
        args: Vec<WireValue>,
    },
    MemberConstructor {
        context_id: ContextId,
        object_id: ObjectId,
        name: String,
        args: Vec<WireValue>,
    },
    FunctionCall {
        context_id: ContextId,
        object_id: ObjectId,
        args: Vec<WireValue>,
    },
    Constructor {
        context_id: ContextId,
        object_id: ObjectId,
        args: Vec<WireValue>,
    },
}

impl Request {
    pub fn context_id(&self) -> &ContextId {
        match self {
            Request::Require { context_id, .. }
            | Request::GetBuiltin { context_id, .. }
            | Request::Global { context_id, .. }
            | Request::CurrentWindow { context_id, .. }
            | Request::CurrentContextOwner { context_id, .. }
            | Request::MemberGet { context_id, .. }
            | Request::MemberSet { context_id, .. }
            | Request::MemberCall { context_id, .. }
            | Request::MemberConstructor { context_id, .. }
            | Request::FunctionCall { context_id, .. }
            | Request::Constructor { context_id, .. } => context_id,
        }
    }

    pub fn verb(&self) -> &'static str {
        match self {
            Request::Require { .. } => "REQUIRE",
            Request::GetBuiltin { .. } => "GET_BUILTIN",
            Request::Global { .. } => "GLOBAL",
            Request::CurrentWindow { .. } => "CURRENT_WINDOW",
            Request::CurrentContextOwner { .. } => "CURRENT_CONTEXT_OWNER",
            Request::MemberGet { .. } => "MEMBER_GET",
            Request::MemberSet { .. } => "MEMBER_SET",
            Request::MemberCall { .. } => "MEMBER_CALL",
            Request::MemberConstructor { .. } => "MEMBER_CONSTRUCTOR",
            Request::FunctionCall { .. } => "FUNCTION_CALL",
            Request::Constructor { .. } => "CONSTRUCTOR",
        }
    }
}

/// Fire-and-forget messages from client to host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verb", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Notice {
    /// The client dropped its handle; release `ref_count_delta` references.
    Dereference {
        context_id: ContextId,
        object_id: ObjectId,
        ref_count_delta: u32,
    },
    /// The whole context is going away; free everything tied to it.
    ContextRelease { context_id: ContextId },
    /// A push arrived for a context this client does not own.
    /// `request_id` is the id the misaddressed push carried.
    WrongContextError {
        context_id: ContextId,
        offending_context_id: ContextId,
        request_id: u64,
    },
}

/// Asynchronous host-to-client deliveries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verb", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Push {
    /// Invoke a registered callback. `args` is an `array` wire value.
    Callback {
        context_id: ContextId,
        callback_id: CallbackId,
        args: WireValue,
    },
    /// The host will never invoke this callback again.
    ReleaseCallback {
        context_id: ContextId,
        callback_id: CallbackId,
    },
}

impl Push {
    pub fn context_id(&self) -> &ContextId {
        match self {
            Push::Callback { context_id, .. } | Push::ReleaseCallback { context_id, .. } => {
                context_id
            }
        }
    }

    pub fn callback_id(&self) -> CallbackId {
        match self {
            Push::Callback { callback_id, .. } | Push::ReleaseCallback { callback_id, .. } => {
                *callback_id
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message", rename_all = "kebab-case")]
pub enum ClientMessage {
    Request {
        request_id: RequestId,
        request: Request,
    },
    Notice {
        notice: Notice,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message", rename_all = "kebab-case")]
pub enum HostMessage {
    /// Correlated by `request_id`, never by arrival order.
    Response {
        request_id: RequestId,
        value: WireValue,
    },
    Push {
        push: Push,
    },
}
