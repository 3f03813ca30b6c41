// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Polling for state that other threads settle.
//!
//! Actor tests mostly wait for a counter to land on a value: a hold count
//! dropping to zero, a fire count reaching its target, a worker pool winding
//! down. [`wait_for_value`] reports the last value it saw when it gives up,
//! which is usually the first thing needed to debug a stuck drain.

use std::{
	fmt::Debug,
	thread,
	time::{Duration, Instant},
};

/// How long the `wait_for*` helpers poll before failing the test.
pub const PATIENCE: Duration = Duration::from_secs(5);

/// Pause between two polls.
pub const POLL: Duration = Duration::from_millis(1);

/// Poll `condition` every `poll` until it holds; panic once `patience` ran out.
pub fn wait_for_condition<F>(condition: F, patience: Duration, poll: Duration, what: &str)
where
	F: Fn() -> bool,
{
	let deadline = Instant::now() + patience;
	while !condition() {
		if Instant::now() >= deadline {
			panic!("gave up after {patience:?}: {what}");
		}
		thread::sleep(poll);
	}
}

/// [`wait_for_condition`] with the default patience and poll interval.
pub fn wait_for<F>(condition: F, what: &str)
where
	F: Fn() -> bool,
{
	wait_for_condition(condition, PATIENCE, POLL, what);
}

/// Poll `read` until it returns `expected`.
///
/// On timeout the panic message carries the last observed value.
pub fn wait_for_value<T, F>(read: F, expected: T, what: &str)
where
	T: PartialEq + Debug,
	F: Fn() -> T,
{
	let deadline = Instant::now() + PATIENCE;
	loop {
		let observed = read();
		if observed == expected {
			return;
		}
		if Instant::now() >= deadline {
			panic!("gave up after {PATIENCE:?}: {what} (expected {expected:?}, last observed {observed:?})");
		}
		thread::sleep(POLL);
	}
}
