// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! In-memory transport for unit tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::Transport;
use crate::error::Result;
use crate::ids::ObjectId;
use crate::wire::{
    MemberDescriptor, Notice, ProtoDescriptor, ProxyDescriptor, ProxyKind, Push, Request,
    WireValue,
};

type Responder = dyn Fn(&Request) -> WireValue + Send + Sync;

/// Answers every request from a closure and records all traffic.
pub(crate) struct ScriptedTransport {
    responder: Box<Responder>,
    requests: Mutex<Vec<Request>>,
    notices: Mutex<Vec<Notice>>,
    pushes: Mutex<VecDeque<Push>>,
}

impl ScriptedTransport {
    pub(crate) fn new<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&Request) -> WireValue + Send + Sync + 'static,
    {
        Arc::new(Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
            notices: Mutex::new(Vec::new()),
            pushes: Mutex::new(VecDeque::new()),
        })
    }

    /// Answers every request with an exception.
    pub(crate) fn unanswered() -> Arc<Self> {
        Self::new(|request| WireValue::exception("Error", format!("unexpected {}", request.verb())))
    }

    pub(crate) fn requests(&self) -> Vec<Request> {
        self.requests.lock().clone()
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub(crate) fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }

    pub(crate) fn queue_push(&self, push: Push) {
        self.pushes.lock().push_back(push);
    }
}

impl Transport for ScriptedTransport {
    fn request(&self, request: Request) -> Result<WireValue> {
        let response = (self.responder)(&request);
        self.requests.lock().push(request);
        Ok(response)
    }

    fn notify(&self, notice: Notice) -> Result<()> {
        self.notices.lock().push(notice);
        Ok(())
    }

    fn next_push(&self, _timeout: Duration) -> Result<Option<Push>> {
        Ok(self.pushes.lock().pop_front())
    }
}

/// An object-kind proxy descriptor with no prototype.
pub(crate) fn proxy(id: u64, name: &str, members: Vec<MemberDescriptor>) -> WireValue {
    WireValue::Proxy(ProxyDescriptor {
        kind: ProxyKind::Object,
        id: ObjectId(id),
        name: name.to_string(),
        members,
        proto: None,
    })
}

pub(crate) fn proxy_with_proto(
    id: u64,
    name: &str,
    members: Vec<MemberDescriptor>,
    proto_members: Vec<MemberDescriptor>,
) -> WireValue {
    WireValue::Proxy(ProxyDescriptor {
        kind: ProxyKind::Object,
        id: ObjectId(id),
        name: name.to_string(),
        members,
        proto: Some(Box::new(ProtoDescriptor {
            members: proto_members,
            proto: None,
        })),
    })
}
