// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! MessagePack framing for wire messages.
//!
//! Structs are encoded as maps (`to_vec_named`) because every tagged enum on
//! the wire is internally tagged and needs field names to find its tag.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{FarProxyError, Result};

pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    rmp_serde::to_vec_named(message).map_err(|e| FarProxyError::Codec(e.to_string()))
}

pub fn decode<T: DeserializeOwned>(frame: &[u8]) -> Result<T> {
    rmp_serde::from_slice(frame).map_err(|e| FarProxyError::Codec(e.to_string()))
}
