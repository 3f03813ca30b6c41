// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Worker loop.
//!
//! Drives one [`Runnable`] on a dedicated OS thread until it asks to stop or
//! the dispatcher is cancelled.

use std::{
	panic::{AssertUnwindSafe, catch_unwind, resume_unwind},
	sync::Arc,
	thread,
	time::Duration,
};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error};

use super::{Factory, Runnable};
use crate::{
	actor::{CancellationToken, ThreadContext},
	error::panic_message,
};

/// Number of worker loops still running.
pub(crate) struct Live {
	count: Mutex<usize>,
	cond: Condvar,
}

impl Live {
	pub(crate) fn new() -> Self {
		Self {
			count: Mutex::new(0),
			cond: Condvar::new(),
		}
	}

	pub(crate) fn count(&self) -> usize {
		*self.count.lock()
	}

	pub(crate) fn add(&self, n: usize) {
		*self.count.lock() += n;
	}

	pub(crate) fn done(&self) {
		let mut count = self.count.lock();
		*count = count.saturating_sub(1);
		self.cond.notify_all();
	}

	/// Block until every worker loop has exited.
	pub(crate) fn wait(&self) {
		let mut count = self.count.lock();
		while *count > 0 {
			self.cond.wait(&mut count);
		}
	}
}

/// Marks a worker as finished when dropped, also while unwinding.
pub(crate) struct LiveGuard(pub(crate) Arc<Live>);

impl Drop for LiveGuard {
	fn drop(&mut self) {
		self.0.done();
	}
}

/// Run worker `index` to completion on the current thread.
///
/// 1. Build the runnable on this thread
/// 2. Loop: check cancellation, refresh the tick, run one slice, yield
/// 3. Call `shutdown` (always called, even on panic)
///
/// A panic escaping `run` resumes after `shutdown`, ending this worker only.
pub(crate) fn run_worker(index: usize, factory: Factory, cancel: CancellationToken, yield_interval: Duration) {
	let mut runnable = factory(index);
	debug!(worker = index, "Worker starting");

	let outcome = catch_unwind(AssertUnwindSafe(|| run_loop(index, runnable.as_mut(), &cancel, yield_interval)));

	runnable.shutdown();

	match outcome {
		Ok(()) => debug!(worker = index, "Worker stopped"),
		Err(payload) => {
			error!(worker = index, error = %panic_message(payload.as_ref()), "Worker panicked");
			resume_unwind(payload);
		}
	}
}

fn run_loop(index: usize, runnable: &mut dyn Runnable, cancel: &CancellationToken, yield_interval: Duration) {
	loop {
		if cancel.is_cancelled() {
			debug!(worker = index, "Worker cancelled, stopping");
			return;
		}

		ThreadContext::with(|ctx| ctx.refresh_tick());

		if !runnable.run(cancel) {
			debug!(worker = index, "Runnable returned false, stopping");
			return;
		}

		if cancel.is_cancelled() {
			debug!(worker = index, "Worker cancelled, stopping");
			return;
		}

		// Give timers and other producers a window.
		thread::sleep(yield_interval);
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};

	use super::*;

	struct CountDown {
		remaining: usize,
		runs: Arc<AtomicUsize>,
		shutdowns: Arc<AtomicUsize>,
	}

	impl Runnable for CountDown {
		fn run(&mut self, _cancel: &CancellationToken) -> bool {
			self.runs.fetch_add(1, Ordering::SeqCst);
			self.remaining -= 1;
			self.remaining > 0
		}

		fn shutdown(&mut self) {
			self.shutdowns.fetch_add(1, Ordering::SeqCst);
		}
	}

	#[test]
	fn test_run_worker_stops_when_runnable_returns_false() {
		let runs = Arc::new(AtomicUsize::new(0));
		let shutdowns = Arc::new(AtomicUsize::new(0));
		let (runs_clone, shutdowns_clone) = (runs.clone(), shutdowns.clone());
		let factory: Factory = Arc::new(move |_index: usize| -> Box<dyn Runnable> {
			Box::new(CountDown {
				remaining: 3,
				runs: runs_clone.clone(),
				shutdowns: shutdowns_clone.clone(),
			})
		});

		run_worker(0, factory, CancellationToken::new(), Duration::from_millis(1));

		assert_eq!(runs.load(Ordering::SeqCst), 3);
		assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn test_run_worker_skips_run_when_already_cancelled() {
		let runs = Arc::new(AtomicUsize::new(0));
		let shutdowns = Arc::new(AtomicUsize::new(0));
		let (runs_clone, shutdowns_clone) = (runs.clone(), shutdowns.clone());
		let factory: Factory = Arc::new(move |_index: usize| -> Box<dyn Runnable> {
			Box::new(CountDown {
				remaining: 100,
				runs: runs_clone.clone(),
				shutdowns: shutdowns_clone.clone(),
			})
		});

		let cancel = CancellationToken::new();
		cancel.cancel();
		run_worker(0, factory, cancel, Duration::from_millis(1));

		assert_eq!(runs.load(Ordering::SeqCst), 0);
		assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn test_live_guard_counts_down() {
		let live = Arc::new(Live::new());
		live.add(2);
		drop(LiveGuard(live.clone()));
		assert_eq!(live.count(), 1);
		let guard = LiveGuard(live.clone());
		thread::spawn(move || drop(guard)).join().unwrap();
		live.wait();
		assert_eq!(live.count(), 0);
	}
}
