// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use thiserror::Error;

use crate::ids::{ContextId, ObjectId, RequestId};
use crate::value::ErrorValue;

#[derive(Error, Debug)]
pub enum FarProxyError {
    /// The host's call threw; the message is the host's, verbatim.
    #[error("{0}")]
    Exception(ErrorValue),

    #[error("Malformed wire value: {0}")]
    MalformedWire(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Remote object {object_id} has no member '{name}'")]
    NoSuchMember { object_id: ObjectId, name: String },

    #[error("Member '{0}' is read-only")]
    ReadOnlyMember(String),

    #[error("Type error: {0}")]
    TypeError(String),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Remote object {0} is not callable")]
    NotCallable(ObjectId),

    #[error("Context {0} has been released")]
    ContextReleased(ContextId),

    #[error("Transport closed")]
    TransportClosed,

    #[error("Request {0} timed out")]
    Timeout(RequestId),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FarProxyError {
    /// The remote error carried by an [`FarProxyError::Exception`], if any.
    pub fn as_exception(&self) -> Option<&ErrorValue> {
        match self {
            Self::Exception(error) => Some(error),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, FarProxyError>;
