// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Single-owner actor execution without per-actor locks.
//!
//! - [`Actor`]: private state plus a job queue; at most one thread runs its
//!   jobs at any instant
//! - [`ThreadContext`]: per-thread drain ownership, deferred actors and timer
//! - [`TimerQueue`]: per-thread delayed submission at millisecond resolution
//! - [`Dispatcher`]: fixed pool of worker threads, each polling a [`Runnable`]
//!
//! The library logs through `tracing` and never installs a subscriber.

pub mod actor;
pub mod dispatcher;
pub mod error;

pub use actor::{
	Actor, ActorConfig, ActorId, BoxedJob, CancellationToken, DisposeGuard, FaultHandler, Job, ThreadContext,
	TimerConfig, TimerQueue,
};
pub use dispatcher::{Dispatcher, DispatcherConfig, Runnable};
pub use error::{Error, JobFault, Result};
