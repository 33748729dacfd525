// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Host side of the protocol: object retention and the verb serve loop.

pub mod endpoint;
pub mod registry;

pub use endpoint::{HostEndpoint, HostHandler, HostPusher, HostSession};
pub use registry::ObjectRegistry;
