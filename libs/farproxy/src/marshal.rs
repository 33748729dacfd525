// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Client values to wire values.

use std::collections::HashSet;
use std::panic::Location;

use crate::callbacks::CallbackRegistry;
use crate::error::Result;
use crate::value::{ClientFunction, ErrorValue, Promise, Value};
use crate::wire::{ErrorPayload, PlainValue, WireMember, WireValue};

/// Marshal call arguments. Functions are registered with `callbacks`.
///
/// A container already being marshaled further up the same path is sent as
/// `null`; the same container reached along two separate paths is sent twice.
/// Functions created here on the caller's behalf are labelled with the
/// caller's location.
#[track_caller]
pub fn marshal_args(callbacks: &CallbackRegistry, args: &[Value]) -> Result<Vec<WireValue>> {
    let mut marshaler = Marshaler::new(callbacks, Location::caller());
    let marshaled = args
        .iter()
        .map(|arg| marshaler.marshal(arg))
        .collect::<Result<Vec<_>>>()?;
    tracing::trace!("Marshaler: marshaled {} arguments", marshaled.len());
    Ok(marshaled)
}

#[track_caller]
pub fn marshal_value(callbacks: &CallbackRegistry, value: &Value) -> Result<WireValue> {
    Marshaler::new(callbacks, Location::caller()).marshal(value)
}

struct Marshaler<'a> {
    callbacks: &'a CallbackRegistry,
    location: &'static Location<'static>,
    visited: HashSet<usize>,
}

impl<'a> Marshaler<'a> {
    fn new(callbacks: &'a CallbackRegistry, location: &'static Location<'static>) -> Self {
        Self {
            callbacks,
            location,
            visited: HashSet::new(),
        }
    }

    fn marshal(&mut self, value: &Value) -> Result<WireValue> {
        let wire = match value {
            Value::Image(image) => WireValue::Image {
                value: image.to_wire()?,
            },
            Value::Array(array) => {
                if !self.visited.insert(array.identity()) {
                    return Ok(WireValue::null());
                }
                let members = array
                    .to_vec()
                    .iter()
                    .map(|element| self.marshal(element))
                    .collect::<Result<Vec<_>>>();
                self.visited.remove(&array.identity());
                WireValue::Array { members: members? }
            }
            Value::Buffer(bytes) => WireValue::Buffer {
                value: bytes.clone(),
            },
            Value::Undefined => WireValue::plain(PlainValue::Undefined),
            Value::Null => WireValue::plain(PlainValue::Null),
            Value::Bool(b) => WireValue::plain(PlainValue::Bool(*b)),
            Value::Number(n) => WireValue::plain(PlainValue::Number(*n)),
            Value::String(s) => WireValue::plain(PlainValue::String(s.clone())),
            Value::Date(ms) => WireValue::plain(PlainValue::Date(*ms)),
            Value::RegExp { source, flags } => WireValue::plain(PlainValue::RegExp {
                source: source.clone(),
                flags: flags.clone(),
            }),
            Value::Error(error) => self.marshal_error(error)?,
            Value::Structured(json) => WireValue::plain(PlainValue::Json(json.clone())),
            Value::Promise(promise) => self.marshal_promise(promise),
            Value::Remote(remote) => WireValue::RemoteObject { id: remote.id() },
            Value::Method(method) => WireValue::RemoteObject {
                id: method.function().id(),
            },
            Value::Object(object) => {
                if !self.visited.insert(object.identity()) {
                    return Ok(WireValue::null());
                }
                let members = object
                    .entries()
                    .into_iter()
                    .map(|(name, value)| -> Result<WireMember> {
                        Ok(WireMember {
                            value: self.marshal(&value)?,
                            name,
                        })
                    })
                    .collect::<Result<Vec<_>>>();
                self.visited.remove(&object.identity());
                WireValue::Object {
                    name: object.class_name(),
                    members: members?,
                }
            }
            Value::Function(function) if function.returns_value() => {
                let result = match function.call(Vec::new()) {
                    Ok(result) => result,
                    Err(e) => {
                        tracing::warn!("Marshaler: value thunk at {} failed: {}", function.location(), e);
                        Value::Undefined
                    }
                };
                WireValue::FunctionWithReturnValue {
                    value: Box::new(self.marshal(&result)?),
                }
            }
            Value::Function(function) => self.marshal_function(function),
        };
        Ok(wire)
    }

    fn marshal_function(&self, function: &ClientFunction) -> WireValue {
        WireValue::Function {
            id: self.callbacks.register(function),
            location: Some(function.location()),
            length: function.arity(),
        }
    }

    fn marshal_error(&mut self, error: &ErrorValue) -> Result<WireValue> {
        let payload = ErrorPayload {
            name: error.name.clone(),
            message: error.message.clone(),
            stack: error.stack.clone(),
        };
        if error.properties.is_empty() {
            return Ok(WireValue::plain(PlainValue::Error(payload)));
        }
        let members = error
            .properties
            .iter()
            .map(|(name, value)| -> Result<WireMember> {
                Ok(WireMember {
                    name: name.clone(),
                    value: self.marshal(value)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(WireValue::Error {
            value: payload,
            members,
        })
    }

    /// The host settles on the promise by calling `then(onFulfilled, onRejected)`.
    fn marshal_promise(&self, promise: &Promise) -> WireValue {
        let target = promise.clone();
        let then = ClientFunction::with_location(2, self.location, move |args| {
            let mut args = args.into_iter();
            let on_fulfilled = args.next().unwrap_or(Value::Undefined);
            let on_rejected = args.next().unwrap_or(Value::Undefined);
            target.then(
                move |value| settle("fulfillment", &on_fulfilled, value),
                move |reason| settle("rejection", &on_rejected, reason),
            );
            Ok(Value::Undefined)
        });
        WireValue::Promise {
            then: Box::new(self.marshal_function(&then)),
        }
    }
}

fn settle(outcome: &str, handler: &Value, value: Value) {
    if !handler.is_callable() {
        return;
    }
    if let Err(e) = handler.invoke(vec![value]) {
        tracing::warn!("Marshaler: delivering promise {} to host failed: {}", outcome, e);
    }
}
