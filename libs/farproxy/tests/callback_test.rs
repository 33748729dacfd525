// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Client functions invoked by the host through pushes.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::Harness;
use farproxy::wire::Push;
use farproxy::{ClientFunction, ContextId, Promise, Value};
use parking_lot::Mutex;

fn recording_listener() -> (ClientFunction, Arc<Mutex<Vec<Value>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let listener = ClientFunction::new(1, move |args| {
        sink.lock().extend(args);
        Ok(Value::Undefined)
    });
    (listener, seen)
}

#[test]
fn emitted_events_reach_the_listener() {
    let h = Harness::start();
    let events = h.ctx.require("events").unwrap().as_remote().unwrap().clone();
    let (listener, seen) = recording_listener();

    events
        .call_method("on", vec![Value::from(listener.clone())])
        .unwrap();
    assert_eq!(h.ctx.live_callbacks().len(), 1);

    events
        .call_method("emit", vec![Value::from("hello"), Value::from(7)])
        .unwrap();
    assert_eq!(h.ctx.dispatch_pending().unwrap(), 1);
    assert_eq!(*seen.lock(), vec![Value::from("hello"), Value::from(7)]);

    drop(events);
    h.shutdown();
}

#[test]
fn listener_removal_releases_the_callback() {
    let h = Harness::start();
    let events = h.ctx.require("events").unwrap().as_remote().unwrap().clone();
    let (listener, seen) = recording_listener();

    events
        .call_method("on", vec![Value::from(listener.clone())])
        .unwrap();
    // The same function marshals to the same id, so the host can find it.
    events
        .call_method("off", vec![Value::from(listener.clone())])
        .unwrap();
    assert_eq!(h.ctx.dispatch_pending().unwrap(), 1);
    assert!(h.ctx.live_callbacks().is_empty());

    events.call_method("emit", vec![Value::from(1)]).unwrap();
    assert_eq!(h.ctx.dispatch_pending().unwrap(), 0);
    assert!(seen.lock().is_empty());

    drop(events);
    h.shutdown();
}

#[test]
fn promise_argument_is_labelled_at_the_call_site() {
    let h = Harness::start();
    let events = h.ctx.require("events").unwrap().as_remote().unwrap().clone();

    events
        .call_method("emit", vec![Value::from(Promise::pending())])
        .unwrap();
    let live = h.ctx.live_callbacks();
    assert_eq!(live.len(), 1);
    assert!(live[0].1.contains("callback_test.rs"), "{}", live[0].1);

    drop(events);
    h.shutdown();
}

#[test]
fn wait_and_dispatch_times_out_quietly() {
    let h = Harness::start();
    assert_eq!(h.ctx.wait_and_dispatch(Duration::from_millis(10)).unwrap(), 0);
    h.shutdown();
}

#[test]
fn push_for_another_context_is_reported_not_run() {
    let (transport, link) = farproxy::ChannelTransport::pair();
    let ctx = farproxy::ClientContext::new(Arc::new(transport), farproxy::ContextConfig::default());
    let (listener, seen) = recording_listener();
    let id = ctx.callbacks().register(&listener);

    ctx.handle_push(Push::Callback {
        context_id: ContextId::from("C-stale"),
        callback_id: id,
        args: farproxy::WireValue::array(vec![]),
    });
    assert!(seen.lock().is_empty());

    let frame = link.from_client.recv_timeout(Duration::from_secs(1)).unwrap();
    let message: farproxy::wire::ClientMessage = farproxy::wire::codec::decode(&frame).unwrap();
    match message {
        farproxy::wire::ClientMessage::Notice {
            notice:
                farproxy::wire::Notice::WrongContextError {
                    offending_context_id,
                    request_id,
                    ..
                },
        } => {
            assert_eq!(offending_context_id, ContextId::from("C-stale"));
            assert_eq!(request_id, id.raw());
        }
        other => panic!("unexpected {:?}", other),
    }
}
