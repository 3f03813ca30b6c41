// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Per-thread timer queues for delayed jobs.
//!
//! Every thread owns at most one [`TimerQueue`], created on demand by its
//! [`ThreadContext`](crate::actor::ThreadContext). A background thread wakes at a
//! fixed resolution and resubmits due jobs into their actors through the normal
//! ownership protocol.
//!
//! # Timing
//!
//! Ticks are whole milliseconds since the queue was created. A job delayed by
//! `d` never fires before `d` has elapsed; it may fire up to one resolution
//! period (plus lock contention) later.

use std::time::Duration;

mod scheduler;

pub use scheduler::TimerQueue;
pub(crate) use scheduler::TimerTask;

/// Configuration for a timer queue.
#[derive(Debug, Clone)]
pub struct TimerConfig {
	/// How often the background thread wakes to fire due entries.
	///
	/// Default: 1ms
	pub resolution: Duration,

	/// Name of the background thread.
	///
	/// Default: `timer-queue`
	pub thread_name: String,
}

impl Default for TimerConfig {
	fn default() -> Self {
		Self {
			resolution: Duration::from_millis(1),
			thread_name: "timer-queue".to_string(),
		}
	}
}

impl TimerConfig {
	/// Create a new config with default values.
	pub fn new() -> Self {
		Self::default()
	}

	/// Set the wake resolution.
	pub fn resolution(mut self, resolution: Duration) -> Self {
		self.resolution = resolution;
		self
	}

	/// Set the background thread name.
	pub fn thread_name(mut self, name: impl Into<String>) -> Self {
		self.thread_name = name.into();
		self
	}
}
