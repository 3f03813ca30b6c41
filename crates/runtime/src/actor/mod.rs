// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Actors: single-owner execution over private state.
//!
//! - [`Actor`]: handle to state plus a job queue
//! - [`Job`]: a unit of work run against that state
//! - [`ThreadContext`]: per-thread ownership and timer state
//! - [`TimerQueue`]: per-thread delayed submission

pub mod context;
pub mod executable;
pub mod timers;
pub mod traits;

pub use context::{CancellationToken, ThreadContext};
pub use executable::{Actor, ActorId, DisposeGuard};
pub use timers::{TimerConfig, TimerQueue};
pub use traits::{ActorConfig, BoxedJob, FaultHandler, Job};
