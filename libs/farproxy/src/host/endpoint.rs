// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Serve loop for the host end of a [`ChannelTransport`](crate::ChannelTransport).

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};

use super::registry::ObjectRegistry;
use crate::error::{FarProxyError, Result};
use crate::ids::{CallbackId, ContextId, ObjectId};
use crate::transport::HostLink;
use crate::wire::codec;
use crate::wire::{
    ClientMessage, HostMessage, MemberDescriptor, Notice, ProtoDescriptor, ProxyDescriptor,
    ProxyKind, Push, Request, WireValue,
};

/// Answers client requests. Errors become `exception` wire values.
pub trait HostHandler: Send {
    type Object: Send + Sync + 'static;

    fn handle(
        &mut self,
        session: &HostSession<'_, Self::Object>,
        request: Request,
    ) -> anyhow::Result<WireValue>;

    /// Called after the registry dropped everything the context retained.
    fn on_context_release(&mut self, _context_id: &ContextId) {}

    fn on_wrong_context(&mut self, context_id: &ContextId, offending: &ContextId, request_id: u64) {
        tracing::warn!(
            "HostEndpoint: context {} received push {} addressed to {}",
            context_id,
            request_id,
            offending
        );
    }
}

/// What a handler sees while answering one request.
pub struct HostSession<'a, T> {
    pub registry: &'a ObjectRegistry<T>,
    pub pusher: &'a HostPusher,
    pub context_id: &'a ContextId,
}

impl<T> HostSession<'_, T> {
    /// Retain `object` for the requesting context and describe it.
    pub fn proxy(
        &self,
        object: &Arc<T>,
        kind: ProxyKind,
        name: &str,
        members: Vec<MemberDescriptor>,
        proto: Option<ProtoDescriptor>,
    ) -> WireValue {
        let id = self.registry.add(self.context_id, object);
        WireValue::Proxy(ProxyDescriptor {
            kind,
            id,
            name: name.to_string(),
            members,
            proto: proto.map(Box::new),
        })
    }

    /// The live object for `id`, or an error naming the missing id.
    pub fn lookup(&self, id: ObjectId) -> anyhow::Result<Arc<T>> {
        self.registry
            .get(id)
            .ok_or_else(|| anyhow::anyhow!("Cannot find object with id {}", id))
    }
}

/// Sends pushes to the client. Cheap to clone.
#[derive(Clone)]
pub struct HostPusher {
    to_client: Sender<Vec<u8>>,
}

impl HostPusher {
    pub fn push(&self, push: Push) -> Result<()> {
        self.send(&HostMessage::Push { push })
    }

    pub fn callback(
        &self,
        context_id: &ContextId,
        callback_id: CallbackId,
        args: Vec<WireValue>,
    ) -> Result<()> {
        self.push(Push::Callback {
            context_id: context_id.clone(),
            callback_id,
            args: WireValue::array(args),
        })
    }

    pub fn release_callback(&self, context_id: &ContextId, callback_id: CallbackId) -> Result<()> {
        self.push(Push::ReleaseCallback {
            context_id: context_id.clone(),
            callback_id,
        })
    }

    fn send(&self, message: &HostMessage) -> Result<()> {
        let frame = codec::encode(message)?;
        self.to_client
            .send(frame)
            .map_err(|_| FarProxyError::TransportClosed)
    }
}

/// The host end of one client connection.
pub struct HostEndpoint<H: HostHandler> {
    from_client: Receiver<Vec<u8>>,
    pusher: HostPusher,
    registry: ObjectRegistry<H::Object>,
    handler: H,
}

impl<H: HostHandler> HostEndpoint<H> {
    pub fn new(link: HostLink, handler: H) -> Self {
        Self {
            from_client: link.from_client,
            pusher: HostPusher {
                to_client: link.to_client,
            },
            registry: ObjectRegistry::new(),
            handler,
        }
    }

    /// Shares the registry this endpoint retains objects in.
    pub fn with_registry(mut self, registry: ObjectRegistry<H::Object>) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> &ObjectRegistry<H::Object> {
        &self.registry
    }

    pub fn pusher(&self) -> HostPusher {
        self.pusher.clone()
    }

    /// Serve until the client disconnects, then hand the handler back.
    pub fn serve(mut self) -> H {
        tracing::debug!("HostEndpoint: serving");
        while let Ok(frame) = self.from_client.recv() {
            if let Err(e) = self.serve_frame(&frame) {
                match e {
                    FarProxyError::TransportClosed => break,
                    other => tracing::warn!("HostEndpoint: {}", other),
                }
            }
        }
        tracing::debug!("HostEndpoint: client disconnected");
        self.handler
    }

    /// Handle one client frame.
    pub fn serve_frame(&mut self, frame: &[u8]) -> Result<()> {
        match codec::decode::<ClientMessage>(frame)? {
            ClientMessage::Request {
                request_id,
                request,
            } => {
                let context_id = request.context_id().clone();
                let verb = request.verb();
                let session = HostSession {
                    registry: &self.registry,
                    pusher: &self.pusher,
                    context_id: &context_id,
                };
                let value = match self.handler.handle(&session, request) {
                    Ok(value) => value,
                    Err(e) => {
                        tracing::debug!("HostEndpoint: {} failed: {}", verb, e);
                        WireValue::exception("Error", e.to_string())
                    }
                };
                self.pusher
                    .send(&HostMessage::Response { request_id, value })
            }
            ClientMessage::Notice { notice } => {
                self.apply_notice(notice);
                Ok(())
            }
        }
    }

    fn apply_notice(&mut self, notice: Notice) {
        match notice {
            Notice::Dereference {
                context_id,
                object_id,
                ref_count_delta,
            } => {
                let freed = self.registry.remove(&context_id, object_id, ref_count_delta);
                tracing::debug!(
                    "HostEndpoint: context {} dereferenced object {} by {} (freed: {})",
                    context_id,
                    object_id,
                    ref_count_delta,
                    freed
                );
            }
            Notice::ContextRelease { context_id } => {
                let freed = self.registry.clear(&context_id);
                tracing::info!("HostEndpoint: context {} released, freed {} objects", context_id, freed);
                self.handler.on_context_release(&context_id);
            }
            Notice::WrongContextError {
                context_id,
                offending_context_id,
                request_id,
            } => self
                .handler
                .on_wrong_context(&context_id, &offending_context_id, request_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ChannelTransport;
    use crate::transport::Transport;

    struct Echo;

    impl HostHandler for Echo {
        type Object = String;

        fn handle(
            &mut self,
            session: &HostSession<'_, String>,
            request: Request,
        ) -> anyhow::Result<WireValue> {
            match request {
                Request::Global { name, .. } if name == "title" => Ok(session.proxy(
                    &Arc::new(name),
                    ProxyKind::Object,
                    "Title",
                    vec![],
                    None,
                )),
                Request::MemberGet { object_id, .. } => {
                    let object = session.lookup(object_id)?;
                    Ok(WireValue::string(object.as_str()))
                }
                other => anyhow::bail!("unsupported {}", other.verb()),
            }
        }
    }

    #[test]
    fn handler_errors_become_exceptions() {
        let (transport, link) = ChannelTransport::pair();
        let mut endpoint = HostEndpoint::new(link, Echo);

        let response = std::thread::spawn(move || {
            transport.request(Request::CurrentWindow {
                context_id: ContextId::from("C1"),
                call_site: None,
            })
        });
        let request_frame = endpoint.from_client.recv().unwrap();
        endpoint.serve_frame(&request_frame).unwrap();
        let value = response.join().unwrap().unwrap();
        assert_eq!(value, WireValue::exception("Error", "unsupported CURRENT_WINDOW"));
    }

    #[test]
    fn dereference_notice_releases_registry_entry() {
        let (_transport, link) = ChannelTransport::pair();
        let mut endpoint = HostEndpoint::new(link, Echo);
        let context = ContextId::from("C1");
        let id = endpoint.registry().add(&context, &Arc::new("x".to_string()));

        let frame = codec::encode(&ClientMessage::Notice {
            notice: Notice::Dereference {
                context_id: context,
                object_id: id,
                ref_count_delta: 1,
            },
        })
        .unwrap();
        endpoint.serve_frame(&frame).unwrap();
        assert!(endpoint.registry().is_empty());
    }
}
