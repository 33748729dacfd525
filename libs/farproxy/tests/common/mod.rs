// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! A small host world served over real byte channels.

#![allow(dead_code)]

use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{Context as _, anyhow, bail};
use farproxy::wire::{PlainValue, ProtoDescriptor, Request};
use farproxy::{
    CallbackId, ClientContext, ContextConfig, ContextId, HostEndpoint,
    HostHandler, HostSession, MemberDescriptor, ObjectRegistry, ProxyKind, WireValue,
};
use parking_lot::Mutex;

pub enum TestObject {
    Counter(Mutex<f64>),
    Events(Mutex<Vec<CallbackId>>),
    Window,
    /// Host function object; `name` is what it does.
    Function(&'static str),
}

/// Host-side handler. Every request verb is appended to `log`.
pub struct World {
    log: Arc<Mutex<Vec<String>>>,
    call_sites: Arc<Mutex<Vec<String>>>,
    window: Arc<TestObject>,
    adder: Arc<TestObject>,
    increment: Arc<TestObject>,
    describe: Arc<TestObject>,
}

impl World {
    fn new(log: Arc<Mutex<Vec<String>>>, call_sites: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            log,
            call_sites,
            window: Arc::new(TestObject::Window),
            adder: Arc::new(TestObject::Function("add")),
            increment: Arc::new(TestObject::Function("increment")),
            describe: Arc::new(TestObject::Function("describe")),
        }
    }

    fn counter(session: &HostSession<'_, TestObject>, start: f64) -> WireValue {
        session.proxy(
            &Arc::new(TestObject::Counter(Mutex::new(start))),
            ProxyKind::Object,
            "Counter",
            vec![
                MemberDescriptor::accessor("value", true),
                MemberDescriptor::method("increment"),
            ],
            Some(ProtoDescriptor {
                members: vec![MemberDescriptor::method("describe")],
                proto: None,
            }),
        )
    }

    fn function(session: &HostSession<'_, TestObject>, object: &Arc<TestObject>) -> WireValue {
        session.proxy(
            object,
            ProxyKind::Function,
            "Function",
            vec![MemberDescriptor::accessor("length", false)],
            None,
        )
    }

    fn get(
        &self,
        session: &HostSession<'_, TestObject>,
        object: &TestObject,
        name: &str,
    ) -> anyhow::Result<WireValue> {
        match (object, name) {
            (TestObject::Counter(value), "value") => Ok(WireValue::number(*value.lock())),
            (TestObject::Counter(_), "increment") => Ok(Self::function(session, &self.increment)),
            (TestObject::Counter(_), "describe") => Ok(Self::function(session, &self.describe)),
            (TestObject::Function(_), "length") => Ok(WireValue::number(0.0)),
            (TestObject::Window, "id") => Ok(WireValue::number(1.0)),
            _ => bail!("no member '{}'", name),
        }
    }

    fn call(
        &self,
        session: &HostSession<'_, TestObject>,
        object: &TestObject,
        name: &str,
        args: Vec<WireValue>,
    ) -> anyhow::Result<WireValue> {
        match (object, name) {
            (TestObject::Counter(value), "increment") => {
                let mut value = value.lock();
                *value += 1.0;
                Ok(WireValue::number(*value))
            }
            (TestObject::Counter(value), "describe") => {
                Ok(WireValue::string(format!("Counter({})", *value.lock())))
            }
            (TestObject::Events(listeners), "on") => {
                listeners.lock().push(callback_arg(&args)?);
                Ok(WireValue::undefined())
            }
            (TestObject::Events(listeners), "off") => {
                let id = callback_arg(&args)?;
                listeners.lock().retain(|l| *l != id);
                session.pusher.release_callback(session.context_id, id)?;
                Ok(WireValue::undefined())
            }
            (TestObject::Events(listeners), "emit") => {
                let listeners = listeners.lock().clone();
                for id in listeners {
                    session.pusher.callback(session.context_id, id, args.clone())?;
                }
                Ok(WireValue::undefined())
            }
            _ => bail!("cannot call '{}'", name),
        }
    }
}

fn callback_arg(args: &[WireValue]) -> anyhow::Result<CallbackId> {
    match args.first() {
        Some(WireValue::Function { id, .. }) => Ok(*id),
        other => Err(anyhow!("expected a function argument, got {:?}", other)),
    }
}

fn sum(args: &[WireValue]) -> anyhow::Result<f64> {
    args.iter()
        .map(|arg| match arg {
            WireValue::Value {
                value: PlainValue::Number(n),
            } => Ok(*n),
            other => Err(anyhow!("expected a number, got {}", other.tag())),
        })
        .sum()
}

impl HostHandler for World {
    type Object = TestObject;

    fn handle(
        &mut self,
        session: &HostSession<'_, TestObject>,
        request: Request,
    ) -> anyhow::Result<WireValue> {
        self.log.lock().push(request.verb().to_string());
        if let Request::Require { call_site: Some(site), .. }
        | Request::GetBuiltin { call_site: Some(site), .. }
        | Request::Global { call_site: Some(site), .. }
        | Request::CurrentWindow { call_site: Some(site), .. }
        | Request::CurrentContextOwner { call_site: Some(site), .. } = &request
        {
            self.call_sites.lock().push(site.clone());
        }
        match request {
            Request::Require { module, .. } => match module.as_str() {
                "counter" => Ok(Self::counter(session, 0.0)),
                "events" => Ok(session.proxy(
                    &Arc::new(TestObject::Events(Mutex::new(Vec::new()))),
                    ProxyKind::Object,
                    "EventEmitter",
                    vec![
                        MemberDescriptor::method("on"),
                        MemberDescriptor::method("off"),
                        MemberDescriptor::method("emit"),
                    ],
                    None,
                )),
                other => bail!("Cannot find module '{}'", other),
            },
            Request::GetBuiltin { name, .. } => bail!("builtin '{}' exploded", name),
            Request::Global { name, .. } => match name.as_str() {
                "ping" => Ok(WireValue::string("pong")),
                "adder" => Ok(Self::function(session, &self.adder)),
                "window" => Ok(session.proxy(
                    &self.window,
                    ProxyKind::Object,
                    "BrowserWindow",
                    vec![MemberDescriptor::accessor("id", false)],
                    None,
                )),
                other => bail!("{} is not defined", other),
            },
            Request::CurrentWindow { .. } | Request::CurrentContextOwner { .. } => Ok(session.proxy(
                &self.window,
                ProxyKind::Object,
                "BrowserWindow",
                vec![MemberDescriptor::accessor("id", false)],
                None,
            )),
            Request::MemberGet {
                object_id, name, ..
            } => {
                let object = session.lookup(object_id)?;
                self.get(session, &object, &name)
            }
            Request::MemberSet {
                object_id,
                name,
                value,
                ..
            } => {
                let object = session.lookup(object_id)?;
                match (&*object, name.as_str()) {
                    (TestObject::Counter(current), "value") => {
                        *current.lock() = sum(&[value]).context("setting value")?;
                        Ok(WireValue::null())
                    }
                    _ => bail!("cannot set '{}'", name),
                }
            }
            Request::MemberCall {
                object_id,
                name,
                args,
                ..
            } => {
                let object = session.lookup(object_id)?;
                self.call(session, &object, &name, args)
            }
            Request::FunctionCall {
                object_id, args, ..
            } => match &*session.lookup(object_id)? {
                TestObject::Function("add") => Ok(WireValue::number(sum(&args)?)),
                _ => bail!("object {} is not a function", object_id),
            },
            Request::Constructor {
                object_id, args, ..
            } => match &*session.lookup(object_id)? {
                TestObject::Function("add") => Ok(Self::counter(session, sum(&args)?)),
                _ => bail!("object {} is not a constructor", object_id),
            },
            Request::MemberConstructor { name, .. } => bail!("'{}' is not a constructor", name),
        }
    }
}

/// A client context wired to a [`World`] served on its own thread.
pub struct Harness {
    pub ctx: ClientContext,
    pub registry: ObjectRegistry<TestObject>,
    log: Arc<Mutex<Vec<String>>>,
    call_sites: Arc<Mutex<Vec<String>>>,
    host: JoinHandle<World>,
}

impl Harness {
    pub fn start() -> Self {
        Self::start_with(ContextConfig::default())
    }

    pub fn start_with(mut config: ContextConfig) -> Self {
        if config.request_timeout_ms.is_none() {
            config.request_timeout_ms = Some(5_000);
        }
        let log = Arc::new(Mutex::new(Vec::new()));
        let call_sites = Arc::new(Mutex::new(Vec::new()));
        let (ctx, link) = ClientContext::over_channel(config);
        let world = World::new(Arc::clone(&log), Arc::clone(&call_sites));
        let endpoint = HostEndpoint::new(link, world);
        let registry = endpoint.registry().clone();
        let host = std::thread::spawn(move || endpoint.serve());

        Self {
            ctx,
            registry,
            log,
            call_sites,
            host,
        }
    }

    pub fn context_id(&self) -> ContextId {
        self.ctx.id().clone()
    }

    /// Round trip once so every earlier notice has been applied by the host.
    pub fn sync(&self) {
        let pong = self.ctx.get_global("ping").unwrap();
        assert_eq!(pong.as_str(), Some("pong"));
    }

    /// Request verbs the host has seen, oldest first.
    pub fn verbs(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    /// Call sites the host received with entry requests.
    pub fn call_sites(&self) -> Vec<String> {
        self.call_sites.lock().clone()
    }

    pub fn clear_log(&self) {
        self.log.lock().clear();
    }

    /// Drop the context and wait for the host loop to see the disconnect.
    /// Every client value must already be dropped.
    pub fn shutdown(self) -> ObjectRegistry<TestObject> {
        let Harness {
            ctx,
            registry,
            host,
            ..
        } = self;
        drop(ctx);
        host.join().unwrap();
        registry
    }
}
