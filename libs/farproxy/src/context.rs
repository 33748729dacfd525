// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! One client execution environment: its transport, handle cache and
//! callback registry, and the entry points into the host.

use std::panic::Location;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::callbacks::CallbackRegistry;
use crate::config::ContextConfig;
use crate::decode;
use crate::error::{FarProxyError, Result};
use crate::ids::{CallbackId, ContextId};
use crate::marshal;
use crate::remote::HandleCache;
use crate::transport::{ChannelTransport, HostLink, Transport};
use crate::value::Value;
use crate::wire::{Notice, Push, Request, WireValue};

/// State shared by a context and every handle it has produced.
pub(crate) struct ContextShared {
    pub(crate) id: ContextId,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) callbacks: CallbackRegistry,
    pub(crate) handles: HandleCache,
    pub(crate) config: ContextConfig,
    released: AtomicBool,
}

impl ContextShared {
    pub(crate) fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Blocking round trip; the response is decoded in this context.
    #[track_caller]
    pub(crate) fn request(self: &Arc<Self>, request: Request) -> Result<Value> {
        if self.is_released() {
            return Err(FarProxyError::ContextReleased(self.id.clone()));
        }
        let wire = self.transport.request(request)?;
        decode::decode(self, wire)
    }

    /// Best-effort notice, also used after release. Failures are logged,
    /// never raised.
    pub(crate) fn notify(&self, notice: Notice) {
        if let Err(e) = self.transport.notify(notice) {
            tracing::warn!("ClientContext {}: dropped notice: {}", self.id, e);
        }
    }
}

/// A client context. Dropping it releases the context on the host.
pub struct ClientContext {
    shared: Arc<ContextShared>,
}

impl ClientContext {
    pub fn new(transport: Arc<dyn Transport>, config: ContextConfig) -> Self {
        let id = config.context_id();
        tracing::info!("ClientContext {}: created", id);
        Self {
            shared: Arc::new(ContextShared {
                id,
                transport,
                callbacks: CallbackRegistry::new(),
                handles: HandleCache::new(),
                config,
                released: AtomicBool::new(false),
            }),
        }
    }

    /// A context over a fresh [`ChannelTransport`], bounded by the configured
    /// request timeout, and the link the host serves on.
    pub fn over_channel(config: ContextConfig) -> (Self, HostLink) {
        let (transport, link) = ChannelTransport::pair();
        let transport = transport.with_timeout(config.request_timeout());
        (Self::new(Arc::new(transport), config), link)
    }

    pub fn id(&self) -> &ContextId {
        &self.shared.id
    }

    pub fn config(&self) -> &ContextConfig {
        &self.shared.config
    }

    pub fn callbacks(&self) -> &CallbackRegistry {
        &self.shared.callbacks
    }

    pub fn handles(&self) -> &HandleCache {
        &self.shared.handles
    }

    pub fn is_released(&self) -> bool {
        self.shared.is_released()
    }

    /// Load a module in the host.
    #[track_caller]
    pub fn require(&self, module: &str) -> Result<Value> {
        let call_site = self.call_site(Location::caller());
        self.shared.request(Request::Require {
            context_id: self.shared.id.clone(),
            module: module.to_string(),
            call_site,
        })
    }

    #[track_caller]
    pub fn get_builtin(&self, name: &str) -> Result<Value> {
        let call_site = self.call_site(Location::caller());
        self.shared.request(Request::GetBuiltin {
            context_id: self.shared.id.clone(),
            name: name.to_string(),
            call_site,
        })
    }

    /// Read a host global.
    #[track_caller]
    pub fn get_global(&self, name: &str) -> Result<Value> {
        let call_site = self.call_site(Location::caller());
        self.shared.request(Request::Global {
            context_id: self.shared.id.clone(),
            name: name.to_string(),
            call_site,
        })
    }

    /// The host window this context renders into.
    #[track_caller]
    pub fn current_window(&self) -> Result<Value> {
        let call_site = self.call_site(Location::caller());
        self.shared.request(Request::CurrentWindow {
            context_id: self.shared.id.clone(),
            call_site,
        })
    }

    /// The host object that owns this context.
    #[track_caller]
    pub fn current_context_owner(&self) -> Result<Value> {
        let call_site = self.call_site(Location::caller());
        self.shared.request(Request::CurrentContextOwner {
            context_id: self.shared.id.clone(),
            call_site,
        })
    }

    #[track_caller]
    pub fn marshal_args(&self, args: &[Value]) -> Result<Vec<WireValue>> {
        marshal::marshal_args(&self.shared.callbacks, args)
    }

    #[track_caller]
    pub fn decode(&self, wire: WireValue) -> Result<Value> {
        decode::decode(&self.shared, wire)
    }

    /// `(id, label)` of every callback the host can still invoke.
    pub fn live_callbacks(&self) -> Vec<(CallbackId, String)> {
        self.shared.callbacks.records()
    }

    /// Apply one host push.
    ///
    /// Pushes addressed to another context, or arriving after release, are
    /// answered with `WRONG_CONTEXT_ERROR`. A failing callback is logged; there
    /// is no caller to hand the error to.
    pub fn handle_push(&self, push: Push) {
        let target = push.context_id();
        if *target != self.shared.id || self.is_released() {
            tracing::warn!(
                "ClientContext {}: push for context {} (callback {})",
                self.shared.id,
                target,
                push.callback_id()
            );
            self.shared.notify(Notice::WrongContextError {
                context_id: self.shared.id.clone(),
                offending_context_id: target.clone(),
                request_id: push.callback_id().raw(),
            });
            return;
        }

        match push {
            Push::Callback {
                callback_id, args, ..
            } => {
                let args = match self.decode(args) {
                    Ok(Value::Array(array)) => array.to_vec(),
                    Ok(other) => vec![other],
                    Err(e) => {
                        tracing::warn!(
                            "ClientContext {}: undecodable arguments for callback {}: {}",
                            self.shared.id,
                            callback_id,
                            e
                        );
                        return;
                    }
                };
                if let Err(e) = self.shared.callbacks.invoke(callback_id, args) {
                    tracing::warn!(
                        "ClientContext {}: callback {} failed: {}",
                        self.shared.id,
                        callback_id,
                        e
                    );
                }
            }
            Push::ReleaseCallback { callback_id, .. } => {
                if self.shared.callbacks.unregister(callback_id) {
                    tracing::debug!("ClientContext {}: released callback {}", self.shared.id, callback_id);
                }
            }
        }
    }

    /// Apply every push already received. Returns how many were handled.
    pub fn dispatch_pending(&self) -> Result<usize> {
        let mut handled = 0;
        while let Some(push) = self.shared.transport.next_push(Duration::ZERO)? {
            self.handle_push(push);
            handled += 1;
        }
        Ok(handled)
    }

    /// Wait up to `timeout` for one push, then drain whatever else is queued.
    pub fn wait_and_dispatch(&self, timeout: Duration) -> Result<usize> {
        match self.shared.transport.next_push(timeout)? {
            Some(push) => {
                self.handle_push(push);
                Ok(1 + self.dispatch_pending()?)
            }
            None => Ok(0),
        }
    }

    /// Release the context on the host. Idempotent.
    ///
    /// Handles that outlive the context drop without sending notices; the
    /// host frees everything for the context on `CONTEXT_RELEASE`.
    pub fn release(&self) {
        if self.shared.released.swap(true, Ordering::AcqRel) {
            return;
        }

        if self.shared.config.report_leaked_callbacks {
            for (id, label) in self.shared.callbacks.records() {
                tracing::warn!(
                    "ClientContext {}: callback {} created at {} was never released",
                    self.shared.id,
                    id,
                    label
                );
            }
        }

        self.shared.notify(Notice::ContextRelease {
            context_id: self.shared.id.clone(),
        });
        self.shared.callbacks.clear();
        self.shared.handles.clear();
        tracing::info!("ClientContext {}: released", self.shared.id);
    }

    fn call_site(&self, location: &'static Location<'static>) -> Option<String> {
        self.shared.config.capture_call_sites.then(|| {
            format!("{}:{}:{}", location.file(), location.line(), location.column())
        })
    }
}

impl Drop for ClientContext {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for ClientContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientContext")
            .field("id", &self.shared.id)
            .field("released", &self.is_released())
            .finish()
    }
}
