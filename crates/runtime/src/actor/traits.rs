// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Core job trait and actor configuration.
//!
//! This module defines the units an actor executes and how an actor behaves:
//! - [`Job`]: Work run exactly once against an actor's state
//! - [`ActorConfig`]: Configuration for actor behavior

use std::{fmt, sync::Arc, time::Duration};

use crate::error::JobFault;

/// A unit of work executed against an actor's private state.
///
/// Jobs run synchronously on whichever thread currently owns the actor, one at
/// a time. Any closure `FnOnce(&mut S)` is a job. For work whose captured data
/// should stay auditable, implement the trait for a plain data type instead:
///
/// ```ignore
/// enum CounterOp {
///     Add(i64),
///     Reset,
/// }
///
/// impl Job<i64> for CounterOp {
///     fn execute(self: Box<Self>, state: &mut i64) {
///         match *self {
///             CounterOp::Add(n) => *state += n,
///             CounterOp::Reset => *state = 0,
///         }
///     }
/// }
/// ```
pub trait Job<S>: Send + 'static {
	/// Run the job. Called exactly once.
	fn execute(self: Box<Self>, state: &mut S);
}

impl<S, F> Job<S> for F
where
	F: FnOnce(&mut S) + Send + 'static,
{
	fn execute(self: Box<Self>, state: &mut S) {
		(*self)(state)
	}
}

/// A type-erased job as it sits in an actor's queue.
pub type BoxedJob<S> = Box<dyn Job<S>>;

/// Callback invoked once for every job that panicked.
pub type FaultHandler = Arc<dyn Fn(&JobFault) + Send + Sync>;

/// Configuration for actor behavior.
#[derive(Clone)]
pub struct ActorConfig {
	/// Name used in logs and errors. `None` = `actor-{id}`.
	pub name: Option<String>,

	/// How often `dispose` re-checks whether the actor has drained.
	///
	/// Default: 1ms
	pub dispose_poll_interval: Duration,

	/// Sink for job faults, called in addition to the error log.
	pub on_fault: Option<FaultHandler>,
}

impl Default for ActorConfig {
	fn default() -> Self {
		Self {
			name: None,
			dispose_poll_interval: Duration::from_millis(1),
			on_fault: None,
		}
	}
}

impl ActorConfig {
	/// Create a new config with default values.
	pub fn new() -> Self {
		Self::default()
	}

	/// Set the actor name.
	pub fn name(mut self, name: impl Into<String>) -> Self {
		self.name = Some(name.into());
		self
	}

	/// Set the dispose poll interval.
	pub fn dispose_poll_interval(mut self, interval: Duration) -> Self {
		self.dispose_poll_interval = interval;
		self
	}

	/// Install a fault sink.
	pub fn on_fault<F>(mut self, handler: F) -> Self
	where
		F: Fn(&JobFault) + Send + Sync + 'static,
	{
		self.on_fault = Some(Arc::new(handler));
		self
	}
}

impl fmt::Debug for ActorConfig {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ActorConfig")
			.field("name", &self.name)
			.field("dispose_poll_interval", &self.dispose_poll_interval)
			.field("on_fault", &self.on_fault.is_some())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	enum CounterOp {
		Add(i64),
		Reset,
	}

	impl Job<i64> for CounterOp {
		fn execute(self: Box<Self>, state: &mut i64) {
			match *self {
				CounterOp::Add(n) => *state += n,
				CounterOp::Reset => *state = 0,
			}
		}
	}

	#[test]
	fn test_closure_job() {
		let mut state = 1;
		let job: BoxedJob<i32> = Box::new(|s: &mut i32| *s += 41);
		job.execute(&mut state);
		assert_eq!(state, 42);
	}

	#[test]
	fn test_tagged_job() {
		let mut state = 0;
		let jobs: Vec<BoxedJob<i64>> =
			vec![Box::new(CounterOp::Add(5)), Box::new(CounterOp::Reset), Box::new(CounterOp::Add(3))];
		for job in jobs {
			job.execute(&mut state);
		}
		assert_eq!(state, 3);
	}

	#[test]
	fn test_config_builder() {
		let config = ActorConfig::new()
			.name("room")
			.dispose_poll_interval(Duration::from_millis(10))
			.on_fault(|_fault| {});
		assert_eq!(config.name.as_deref(), Some("room"));
		assert_eq!(config.dispose_poll_interval, Duration::from_millis(10));
		assert!(config.on_fault.is_some());
	}
}
