// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Wire values to client values.

use std::panic::Location;
use std::sync::Arc;

use crate::context::ContextShared;
use crate::error::{FarProxyError, Result};
use crate::remote::RemoteObject;
use crate::value::{ClientFunction, ErrorValue, NativeImage, ObjectRef, Promise, Value};
use crate::wire::{ErrorPayload, PlainValue, WireMember, WireValue};

/// Decode a wire value received in `context`.
///
/// An `exception` anywhere in the value fails the whole decode with
/// [`FarProxyError::Exception`]. Callbacks created while adopting a host
/// promise are labelled with the caller's location.
#[track_caller]
pub(crate) fn decode(context: &Arc<ContextShared>, wire: WireValue) -> Result<Value> {
    Decoder {
        context,
        location: Location::caller(),
    }
    .decode(wire)
}

struct Decoder<'a> {
    context: &'a Arc<ContextShared>,
    location: &'static Location<'static>,
}

impl Decoder<'_> {
    fn decode(&self, wire: WireValue) -> Result<Value> {
        let context = self.context;
        match wire {
            WireValue::Value { value } => Ok(decode_plain(value)),
            WireValue::Array { members } => {
                let values = members
                    .into_iter()
                    .map(|member| self.decode(member))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::from(values))
            }
            WireValue::Buffer { value } => Ok(Value::Buffer(value)),
            WireValue::Image { value } => Ok(Value::Image(NativeImage::from_wire(value)?)),
            WireValue::Object { name, members } => {
                let object = ObjectRef::with_class_name(name);
                for WireMember { name, value } in members {
                    object.set(name, self.decode(value)?);
                }
                Ok(Value::Object(object))
            }
            WireValue::RemoteObject { id } => match context.handles.get_or_null(id) {
                Some(handle) => Ok(Value::Remote(handle)),
                None => Err(FarProxyError::MalformedWire(format!(
                    "remote-object {} is not held by context {}",
                    id, context.id
                ))),
            },
            WireValue::Function { id, .. } => Ok(Value::Function(context.callbacks.resolve(id))),
            WireValue::FunctionWithReturnValue { value } => {
                Ok(Value::Function(ClientFunction::returning(self.decode(*value)?)))
            }
            WireValue::Promise { then } => self.decode_promise(*then),
            WireValue::Error { value, members } => Ok(Value::Error(self.decode_error(value, members)?)),
            WireValue::Exception { value } => match self.decode(*value)? {
                Value::Error(error) => Err(FarProxyError::Exception(error)),
                other => Err(FarProxyError::MalformedWire(format!(
                    "Unexpected value type in exception: {}",
                    other.type_name()
                ))),
            },
            WireValue::Proxy(descriptor) => {
                let id = descriptor.id;
                let handle = context
                    .handles
                    .get_or_insert_with(id, || RemoteObject::from_descriptor(context, descriptor));
                Ok(Value::Remote(handle))
            }
        }
    }

    fn decode_error(&self, payload: ErrorPayload, members: Vec<WireMember>) -> Result<ErrorValue> {
        let mut error = error_from_payload(payload);
        for WireMember { name, value } in members {
            error = error.with_property(name, self.decode(value)?);
        }
        Ok(error)
    }

    /// Adopt a host promise: call its `then` with resolve/reject callbacks.
    fn decode_promise(&self, then: WireValue) -> Result<Value> {
        let then = self.decode(then)?;
        let promise = Promise::pending();

        let on_fulfilled = {
            let promise = promise.clone();
            ClientFunction::with_location(1, self.location, move |args| {
                promise.resolve(args.into_iter().next().unwrap_or(Value::Undefined));
                Ok(Value::Undefined)
            })
        };
        let on_rejected = {
            let promise = promise.clone();
            ClientFunction::with_location(1, self.location, move |args| {
                promise.reject(args.into_iter().next().unwrap_or(Value::Undefined));
                Ok(Value::Undefined)
            })
        };

        if let Err(e) = then.invoke(vec![Value::from(on_fulfilled), Value::from(on_rejected)]) {
            let reason = match e {
                FarProxyError::Exception(error) => error,
                other => ErrorValue::new(other.to_string()),
            };
            promise.reject(Value::Error(reason));
        }
        Ok(Value::Promise(promise))
    }
}

fn decode_plain(value: PlainValue) -> Value {
    match value {
        PlainValue::Undefined => Value::Undefined,
        PlainValue::Null => Value::Null,
        PlainValue::Bool(b) => Value::Bool(b),
        PlainValue::Number(n) => Value::Number(n),
        PlainValue::String(s) => Value::String(s),
        PlainValue::Date(ms) => Value::Date(ms),
        PlainValue::RegExp { source, flags } => Value::RegExp { source, flags },
        PlainValue::Error(payload) => Value::Error(error_from_payload(payload)),
        PlainValue::Binary(bytes) => Value::Buffer(bytes),
        PlainValue::Json(json) => Value::Structured(json),
    }
}

fn error_from_payload(payload: ErrorPayload) -> ErrorValue {
    ErrorValue {
        name: payload.name,
        message: payload.message,
        stack: payload.stack,
        properties: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marshal;
    use crate::transport::testing::{ScriptedTransport, proxy};
    use crate::value::{ImageRepresentation, PromiseState};
    use crate::wire::{MemberDescriptor, ProxyKind, Request};
    use crate::{ClientContext, ContextConfig};
    use bytes::Bytes;

    fn context() -> (std::sync::Arc<ScriptedTransport>, ClientContext) {
        let transport = ScriptedTransport::unanswered();
        let ctx = ClientContext::new(transport.clone(), ContextConfig::default());
        (transport, ctx)
    }

    #[test]
    fn same_id_decodes_to_same_handle() {
        let (_transport, ctx) = context();
        let pair = WireValue::array(vec![proxy(7, "Thing", vec![]), proxy(7, "Thing", vec![])]);

        let decoded = ctx.decode(pair).unwrap();
        let both = decoded.as_array().unwrap().to_vec();
        assert!(both[0].as_remote().unwrap().ptr_eq(both[1].as_remote().unwrap()));

        let later = ctx.decode(proxy(7, "Thing", vec![])).unwrap();
        assert!(later.as_remote().unwrap().ptr_eq(both[0].as_remote().unwrap()));
        assert_eq!(later.as_remote().unwrap().received(), 3);
    }

    #[test]
    fn marshaled_scalars_decode_to_equal_values() {
        let (_transport, ctx) = context();
        let object = ObjectRef::from_entries([("x", Value::from(true))]);
        let input = vec![
            Value::from(1),
            Value::from("a"),
            Value::Object(object),
            Value::Null,
            Value::Bool(false),
            Value::from(vec![Value::from(1), Value::from("a"), Value::Null]),
            Value::from(Bytes::from_static(&[0, 1, 2])),
        ];

        let wire = ctx.marshal_args(&input).unwrap();
        let output = wire
            .into_iter()
            .map(|w| ctx.decode(w).unwrap())
            .collect::<Vec<_>>();
        assert_eq!(output, input);
    }

    #[test]
    fn self_referencing_array_decodes() {
        let (_transport, ctx) = context();
        let array = crate::value::ArrayRef::new(vec![]);
        array.push(Value::Array(array.clone()));

        let wire = ctx.marshal_args(&[Value::Array(array.clone())]).unwrap();
        let decoded = ctx.decode(wire.into_iter().next().unwrap()).unwrap();
        assert_eq!(decoded, Value::from(vec![Value::Null]));
        array.set(0, Value::Null);
    }

    #[test]
    fn exception_preserves_message_and_properties() {
        let (_transport, ctx) = context();
        let wire = WireValue::Exception {
            value: Box::new(WireValue::Error {
                value: ErrorPayload {
                    name: "TypeError".to_string(),
                    message: "window is destroyed".to_string(),
                    stack: None,
                },
                members: vec![WireMember {
                    name: "code".to_string(),
                    value: WireValue::string("E_DESTROYED"),
                }],
            }),
        };

        let err = ctx.decode(wire).unwrap_err();
        assert_eq!(err.to_string(), "window is destroyed");
        let error = err.as_exception().unwrap();
        assert_eq!(error.name, "TypeError");
        assert_eq!(error.property("code"), Some(&Value::from("E_DESTROYED")));
    }

    #[test]
    fn exception_around_non_error_is_malformed() {
        let (_transport, ctx) = context();
        let err = ctx
            .decode(WireValue::Exception {
                value: Box::new(WireValue::number(3.0)),
            })
            .unwrap_err();
        assert!(matches!(err, FarProxyError::MalformedWire(_)));
    }

    #[test]
    fn unknown_remote_object_id_is_malformed() {
        let (_transport, ctx) = context();
        let err = ctx
            .decode(WireValue::RemoteObject {
                id: crate::ids::ObjectId(404),
            })
            .unwrap_err();
        assert!(matches!(err, FarProxyError::MalformedWire(_)));
    }

    #[test]
    fn passed_back_handle_round_trips_to_itself() {
        let (_transport, ctx) = context();
        let handle = ctx.decode(proxy(9, "Thing", vec![])).unwrap();

        let wire = ctx.marshal_args(&[handle.clone()]).unwrap();
        assert_eq!(
            wire,
            vec![WireValue::RemoteObject {
                id: crate::ids::ObjectId(9)
            }]
        );
        let back = ctx.decode(wire.into_iter().next().unwrap()).unwrap();
        assert_eq!(back, handle);
    }

    #[test]
    fn multi_scale_image_decodes_every_scale() {
        let (_transport, ctx) = context();
        let mut image = NativeImage::from_rgba(1.0, 1, 1, vec![1, 2, 3, 255]).unwrap();
        image
            .add_representation(ImageRepresentation::new(2.0, 2, 2, vec![4u8; 16]).unwrap())
            .unwrap();

        let wire = marshal::marshal_value(ctx.callbacks(), &Value::from(image.clone())).unwrap();
        assert_eq!(ctx.decode(wire).unwrap(), Value::from(image));
    }

    #[test]
    fn oversized_bitmap_is_malformed() {
        let (_transport, ctx) = context();
        let err = ctx
            .decode(WireValue::Image {
                value: crate::wire::ImageWire::Bitmap {
                    scale_factor: 1.0,
                    width: u32::MAX,
                    height: u32::MAX,
                    data: Bytes::from_static(&[0; 4]),
                },
            })
            .unwrap_err();
        assert!(matches!(err, FarProxyError::MalformedWire(_)), "{:?}", err);
    }

    #[test]
    fn promise_callbacks_are_labelled_at_the_decode_call() {
        let (_transport, ctx) = context();
        let then = WireValue::Proxy(crate::wire::ProxyDescriptor {
            kind: ProxyKind::Function,
            id: crate::ids::ObjectId(52),
            name: "then".to_string(),
            members: vec![],
            proto: None,
        });

        let line = line!() + 1;
        ctx.decode(WireValue::Promise { then: Box::new(then) }).unwrap();

        let records = ctx.callbacks().records();
        assert_eq!(records.len(), 2);
        for (_, label) in records {
            assert!(label.contains(&format!("decode.rs:{}:", line)), "{}", label);
        }
    }

    #[test]
    fn host_promise_settles_through_then() {
        let transport = ScriptedTransport::new(|request| match request {
            Request::FunctionCall { args, .. } => match &args[0] {
                // The host calls onFulfilled back; here it answers with the fulfilled value.
                WireValue::Function { .. } => WireValue::undefined(),
                _ => WireValue::exception("Error", "bad then args"),
            },
            other => WireValue::exception("Error", format!("unexpected {}", other.verb())),
        });
        let ctx = ClientContext::new(transport.clone(), ContextConfig::default());

        let then = WireValue::Proxy(crate::wire::ProxyDescriptor {
            kind: ProxyKind::Function,
            id: crate::ids::ObjectId(50),
            name: "then".to_string(),
            members: vec![MemberDescriptor::accessor("length", false)],
            proto: None,
        });
        let decoded = ctx
            .decode(WireValue::Promise {
                then: Box::new(then),
            })
            .unwrap();
        let promise = decoded.as_promise().unwrap();
        assert!(promise.is_pending());

        // The host later fires the onFulfilled callback it was handed.
        let sent = transport.requests();
        let on_fulfilled = match &sent[0] {
            Request::FunctionCall { args, .. } => match &args[0] {
                WireValue::Function { id, .. } => *id,
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        };
        ctx.callbacks()
            .invoke(on_fulfilled, vec![Value::from("done")])
            .unwrap();
        assert_eq!(promise.state(), PromiseState::Fulfilled(Value::from("done")));
    }

    #[test]
    fn failing_then_rejects_promise() {
        let transport = ScriptedTransport::new(|_| WireValue::exception("Error", "then exploded"));
        let ctx = ClientContext::new(transport.clone(), ContextConfig::default());
        let then = WireValue::Proxy(crate::wire::ProxyDescriptor {
            kind: ProxyKind::Function,
            id: crate::ids::ObjectId(51),
            name: "then".to_string(),
            members: vec![],
            proto: None,
        });

        let decoded = ctx
            .decode(WireValue::Promise {
                then: Box::new(then),
            })
            .unwrap();
        match decoded.as_promise().unwrap().state() {
            PromiseState::Rejected(Value::Error(error)) => assert_eq!(error.message, "then exploded"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
