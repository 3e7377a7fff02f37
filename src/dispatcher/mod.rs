//! # Dispatcher Module
//!
//! Coroutine-based request dispatch. Each mounted route gets a dedicated
//! handler coroutine on the `may` runtime; the dispatcher owns the sending
//! side of every handler's request channel and forwards matched requests to
//! it, waiting on a per-request reply channel.
//!
//! Handlers are plain function pointers over a shared [`ResourceContext`],
//! so resources generated at runtime register and deregister without any
//! recompilation: regeneration simply replaces the channel senders.
//!
//! ## Request Flow
//!
//! 1. The router matches the request path to a handler name
//! 2. The dispatcher looks up the handler's channel by that name
//! 3. Middleware `before` hooks run; an early response skips the handler
//! 4. The request is sent to the handler coroutine and the reply awaited
//! 5. Middleware `after` hooks run on the response
//!
//! ## Error Handling
//!
//! - A matched route with no registered handler returns `None` (the service
//!   answers 500)
//! - Handler panics are caught in the coroutine and become 500 responses
//! - A closed handler channel becomes a 503 instead of a hung connection
//!
//! Per-handler stack size comes from `PANELFORGE_STACK_SIZE` (hex with a
//! `0x` prefix or decimal bytes).
//!
//! [`ResourceContext`]: crate::resources::ResourceContext

mod core;

pub use core::{Dispatcher, HandlerSender};
