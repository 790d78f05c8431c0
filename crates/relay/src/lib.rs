// Path: crates/relay/src/lib.rs
#![forbid(unsafe_code)]
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::unimplemented,
        clippy::todo,
        clippy::indexing_slicing
    )
)]

//! # Sensei Relay Pool
//!
//! The relay adapter: publish to a set of relays in parallel, subscribe with
//! a filter across all of them with event-id deduplication, one-shot historic
//! fetch, and wait-for-single-event. The pool is the only process-wide
//! resource; it is cheaply cloneable and shared by every client and expert
//! task, and disposed only by the owner that created it.
//!
//! Failures at this layer are logged and surface to callers only as "nothing
//! arrived"; the state machines time out.

pub mod pool;
pub mod subscription;

pub use pool::RelayPool;
pub use subscription::Subscription;
