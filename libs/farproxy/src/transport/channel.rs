// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;

use super::Transport;
use crate::error::{FarProxyError, Result};
use crate::ids::{ContextId, ObjectId, RequestId};
use crate::wire::codec;
use crate::wire::{ClientMessage, HostMessage, Notice, Push, Request, WireValue};

/// Host side of a [`ChannelTransport`]: frames from the client and a sender
/// for frames back to it.
pub struct HostLink {
    pub from_client: Receiver<Vec<u8>>,
    pub to_client: Sender<Vec<u8>>,
}

/// [`Transport`] over a pair of crossbeam byte channels carrying
/// MessagePack frames.
pub struct ChannelTransport {
    to_host: Sender<Vec<u8>>,
    from_host: Receiver<Vec<u8>>,
    next_request_id: AtomicU64,
    request_timeout: Option<Duration>,
    /// Serializes readers of `from_host`.
    reader: Mutex<()>,
    outstanding: Mutex<HashSet<RequestId>>,
    /// Responses read by one waiter on behalf of another.
    parked: Mutex<HashMap<RequestId, WireValue>>,
    /// Requests that timed out, with the context a late response belongs to.
    abandoned: Mutex<HashMap<RequestId, ContextId>>,
    pushes: Mutex<VecDeque<Push>>,
}

impl ChannelTransport {
    pub fn new(to_host: Sender<Vec<u8>>, from_host: Receiver<Vec<u8>>) -> Self {
        Self {
            to_host,
            from_host,
            next_request_id: AtomicU64::new(0),
            request_timeout: None,
            reader: Mutex::new(()),
            outstanding: Mutex::new(HashSet::new()),
            parked: Mutex::new(HashMap::new()),
            abandoned: Mutex::new(HashMap::new()),
            pushes: Mutex::new(VecDeque::new()),
        }
    }

    /// A connected client transport and the host's end of it.
    pub fn pair() -> (Self, HostLink) {
        let (to_host, from_client) = crossbeam_channel::unbounded();
        let (to_client, from_host) = crossbeam_channel::unbounded();
        (
            Self::new(to_host, from_host),
            HostLink {
                from_client,
                to_client,
            },
        )
    }

    /// Bound how long a blocking request waits. `None` waits forever.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn send(&self, message: &ClientMessage) -> Result<()> {
        let frame = codec::encode(message)?;
        self.to_host
            .send(frame)
            .map_err(|_| FarProxyError::TransportClosed)
    }

    /// Route one frame. Returns the response if it belongs to `waiting_for`.
    fn route(&self, frame: &[u8], waiting_for: Option<RequestId>) -> Result<Option<WireValue>> {
        match codec::decode::<HostMessage>(frame)? {
            HostMessage::Response { request_id, value } => {
                if Some(request_id) == waiting_for {
                    return Ok(Some(value));
                }
                if self.outstanding.lock().contains(&request_id) {
                    tracing::trace!("ChannelTransport: parking response for request {}", request_id);
                    self.parked.lock().insert(request_id, value);
                } else if let Some(context_id) = self.abandoned.lock().remove(&request_id) {
                    self.release_late_response(request_id, context_id, &value);
                } else {
                    tracing::warn!(
                        "ChannelTransport: dropping stray {} response for request {}",
                        value.tag(),
                        request_id
                    );
                }
                Ok(None)
            }
            HostMessage::Push { push } => {
                self.pushes.lock().push_back(push);
                Ok(None)
            }
        }
    }

    /// The host retained every proxy in a response nobody will decode; give
    /// those references back.
    fn release_late_response(&self, request_id: RequestId, context_id: ContextId, value: &WireValue) {
        let mut proxies = BTreeMap::new();
        count_proxies(value, &mut proxies);
        tracing::warn!(
            "ChannelTransport: late {} response for request {}, releasing {} objects",
            value.tag(),
            request_id,
            proxies.len()
        );
        for (object_id, ref_count_delta) in proxies {
            let notice = Notice::Dereference {
                context_id: context_id.clone(),
                object_id,
                ref_count_delta,
            };
            if let Err(e) = self.send(&ClientMessage::Notice { notice }) {
                tracing::warn!("ChannelTransport: could not release object {}: {}", object_id, e);
            }
        }
    }

    fn await_response(&self, request_id: RequestId) -> Result<WireValue> {
        let deadline = self.request_timeout.map(|t| Instant::now() + t);
        loop {
            if let Some(value) = self.parked.lock().remove(&request_id) {
                return Ok(value);
            }

            let _reader = self.reader.lock();
            // Another waiter may have parked ours while we queued for the reader.
            if let Some(value) = self.parked.lock().remove(&request_id) {
                return Ok(value);
            }

            let frame = match deadline {
                Some(deadline) => match self.from_host.recv_deadline(deadline) {
                    Ok(frame) => frame,
                    Err(RecvTimeoutError::Timeout) => return Err(FarProxyError::Timeout(request_id)),
                    Err(RecvTimeoutError::Disconnected) => return Err(FarProxyError::TransportClosed),
                },
                None => self
                    .from_host
                    .recv()
                    .map_err(|_| FarProxyError::TransportClosed)?,
            };

            if let Some(value) = self.route(&frame, Some(request_id))? {
                return Ok(value);
            }
        }
    }
}

impl Transport for ChannelTransport {
    fn request(&self, request: Request) -> Result<WireValue> {
        let request_id = RequestId(self.next_request_id.fetch_add(1, Ordering::Relaxed) + 1);
        tracing::trace!("ChannelTransport: request {} {}", request_id, request.verb());

        let context_id = request.context_id().clone();
        self.outstanding.lock().insert(request_id);
        let result = self
            .send(&ClientMessage::Request {
                request_id,
                request,
            })
            .and_then(|()| self.await_response(request_id));
        self.outstanding.lock().remove(&request_id);
        if matches!(result, Err(FarProxyError::Timeout(_))) {
            self.abandoned.lock().insert(request_id, context_id);
        }
        result
    }

    fn notify(&self, notice: Notice) -> Result<()> {
        self.send(&ClientMessage::Notice { notice })
    }

    fn next_push(&self, timeout: Duration) -> Result<Option<Push>> {
        if let Some(push) = self.pushes.lock().pop_front() {
            return Ok(Some(push));
        }

        let deadline = Instant::now() + timeout;
        loop {
            // Released every frame so a waiting request can read its own response.
            let _reader = self.reader.lock();
            if let Some(push) = self.pushes.lock().pop_front() {
                return Ok(Some(push));
            }

            let frame = if timeout.is_zero() {
                match self.from_host.try_recv() {
                    Ok(frame) => frame,
                    Err(TryRecvError::Empty) => return Ok(None),
                    Err(TryRecvError::Disconnected) => return Err(FarProxyError::TransportClosed),
                }
            } else {
                match self.from_host.recv_deadline(deadline) {
                    Ok(frame) => frame,
                    Err(RecvTimeoutError::Timeout) => return Ok(None),
                    Err(RecvTimeoutError::Disconnected) => return Err(FarProxyError::TransportClosed),
                }
            };
            self.route(&frame, None)?;
        }
    }
}

fn count_proxies(value: &WireValue, counts: &mut BTreeMap<ObjectId, u32>) {
    match value {
        WireValue::Proxy(descriptor) => *counts.entry(descriptor.id).or_insert(0) += 1,
        WireValue::Array { members } => {
            for member in members {
                count_proxies(member, counts);
            }
        }
        WireValue::Object { members, .. } | WireValue::Error { members, .. } => {
            for member in members {
                count_proxies(&member.value, counts);
            }
        }
        WireValue::FunctionWithReturnValue { value } | WireValue::Exception { value } => {
            count_proxies(value, counts)
        }
        WireValue::Promise { then } => count_proxies(then, counts),
        _ => {}
    }
}
