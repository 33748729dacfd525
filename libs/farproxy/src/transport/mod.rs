// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! The shared channel between a client context and the host.

mod channel;
#[cfg(test)]
pub(crate) mod testing;

pub use channel::{ChannelTransport, HostLink};

use std::time::Duration;

use crate::error::Result;
use crate::wire::{Notice, Push, Request, WireValue};

/// One client's view of the shared channel.
///
/// Blocking requests are correlated by id, not arrival order. Pushes that
/// arrive while a request is outstanding are queued for [`Transport::next_push`].
pub trait Transport: Send + Sync {
    /// Send a request and wait for its response.
    fn request(&self, request: Request) -> Result<WireValue>;

    /// Fire-and-forget.
    fn notify(&self, notice: Notice) -> Result<()>;

    /// Next host push, waiting up to `timeout`. `Duration::ZERO` never blocks.
    fn next_push(&self, timeout: Duration) -> Result<Option<Push>>;
}
