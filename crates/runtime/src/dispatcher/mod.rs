// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Worker pool.
//!
//! A [`Dispatcher`] owns a fixed number of OS threads. Each thread builds its
//! own [`Runnable`] through the factory given to the dispatcher and polls it
//! until it returns `false` or the dispatcher is cancelled. Runnables are never
//! shared between threads, so they need not be `Send`.

mod runner;

use std::{
	sync::{
		Arc,
		atomic::{AtomicBool, Ordering},
	},
	thread::{self, JoinHandle},
	time::Duration,
};

use parking_lot::Mutex;
use tracing::debug;

use crate::{
	actor::CancellationToken,
	error::{Error, Result, panic_message},
};
use runner::{Live, LiveGuard, run_worker};

/// A unit of repeated work hosted by one worker thread for its whole lifetime.
pub trait Runnable {
	/// Perform one slice of work. Return `false` to end this worker.
	///
	/// Long-running slices should check `cancel` themselves; the worker loop
	/// only checks it between calls.
	fn run(&mut self, cancel: &CancellationToken) -> bool;

	/// Called exactly once when the worker loop ends, even if `run` panicked.
	fn shutdown(&mut self) {}
}

pub(crate) type Factory = Arc<dyn Fn(usize) -> Box<dyn Runnable> + Send + Sync>;

/// Configuration for a dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
	/// Number of worker threads. At least one is started.
	///
	/// Default: number of logical CPUs
	pub worker_count: usize,

	/// Pause between two `run` calls of the same worker.
	///
	/// Default: 1ms
	pub yield_interval: Duration,

	/// Prefix of worker thread names (`{thread_name}-{index}`).
	///
	/// Default: `worker`
	pub thread_name: String,
}

impl Default for DispatcherConfig {
	fn default() -> Self {
		Self {
			worker_count: num_cpus::get(),
			yield_interval: Duration::from_millis(1),
			thread_name: "worker".to_string(),
		}
	}
}

impl DispatcherConfig {
	/// Create a config with `worker_count` workers and default values otherwise.
	pub fn new(worker_count: usize) -> Self {
		Self::default().worker_count(worker_count)
	}

	pub fn worker_count(mut self, count: usize) -> Self {
		self.worker_count = count;
		self
	}

	pub fn yield_interval(mut self, interval: Duration) -> Self {
		self.yield_interval = interval;
		self
	}

	pub fn thread_name(mut self, name: impl Into<String>) -> Self {
		self.thread_name = name.into();
		self
	}
}

/// Fixed pool of worker threads, each polling its own [`Runnable`].
///
/// # Example
///
/// ```ignore
/// let dispatcher = Arc::new(Dispatcher::new(DispatcherConfig::new(4), |index| Worker::new(index)));
///
/// let pool = dispatcher.clone();
/// let handle = std::thread::spawn(move || pool.run_workers());
///
/// // ... later
/// dispatcher.dispose()?;
/// handle.join().unwrap()?;
/// ```
pub struct Dispatcher {
	config: DispatcherConfig,
	factory: Factory,
	cancel: CancellationToken,
	started: AtomicBool,
	live: Arc<Live>,
	handles: Mutex<Vec<(usize, JoinHandle<()>)>>,
}

impl Dispatcher {
	/// Create a dispatcher. `factory` is called once per worker, on that
	/// worker's thread, with the worker index.
	pub fn new<F, R>(config: DispatcherConfig, factory: F) -> Self
	where
		F: Fn(usize) -> R + Send + Sync + 'static,
		R: Runnable + 'static,
	{
		let config = DispatcherConfig {
			worker_count: config.worker_count.max(1),
			..config
		};

		Self {
			config,
			factory: Arc::new(move |index: usize| Box::new(factory(index)) as Box<dyn Runnable>),
			cancel: CancellationToken::new(),
			started: AtomicBool::new(false),
			live: Arc::new(Live::new()),
			handles: Mutex::new(Vec::new()),
		}
	}

	pub fn worker_count(&self) -> usize {
		self.config.worker_count
	}

	/// Worker loops that have not exited yet.
	pub fn active_workers(&self) -> usize {
		self.live.count()
	}

	/// The token observed by every worker loop.
	pub fn cancellation_token(&self) -> CancellationToken {
		self.cancel.clone()
	}

	/// Spawn the worker threads. Subsequent calls do nothing.
	pub fn start(&self) -> Result<()> {
		if self.started.swap(true, Ordering::SeqCst) {
			return Ok(());
		}

		// Held while spawning so `wait` never joins a partial set.
		let mut handles = self.handles.lock();
		let count = self.config.worker_count;
		self.live.add(count);

		for index in 0..count {
			let name = format!("{}-{}", self.config.thread_name, index);
			let factory = self.factory.clone();
			let cancel = self.cancel.clone();
			let yield_interval = self.config.yield_interval;
			let guard = LiveGuard(self.live.clone());

			let spawned = thread::Builder::new().name(name.clone()).spawn(move || {
				let _guard = guard;
				run_worker(index, factory, cancel, yield_interval);
			});

			match spawned {
				Ok(handle) => handles.push((index, handle)),
				Err(err) => {
					// The failed closure dropped its guard; release the rest.
					for _ in index + 1..count {
						self.live.done();
					}
					self.cancel.cancel();
					return Err(Error::Spawn {
						name,
						reason: err.to_string(),
					});
				}
			}
		}

		debug!(workers = count, "Dispatcher started");
		Ok(())
	}

	/// Start the workers and block until every worker loop has exited.
	pub fn run_workers(&self) -> Result<()> {
		self.start()?;
		self.wait()
	}

	/// Block until every worker loop has exited.
	///
	/// Reports the first worker whose loop ended in a panic. Workers that
	/// panicked are not restarted.
	pub fn wait(&self) -> Result<()> {
		self.live.wait();

		let handles = std::mem::take(&mut *self.handles.lock());
		let mut first_error = None;
		for (index, handle) in handles {
			if let Err(payload) = handle.join() {
				first_error.get_or_insert(Error::WorkerPanicked {
					worker: index,
					message: panic_message(payload.as_ref()),
				});
			}
		}

		match first_error {
			Some(err) => Err(err),
			None => Ok(()),
		}
	}

	/// Cancel every worker loop and wait for them to exit.
	pub fn dispose(&self) -> Result<()> {
		debug!("Disposing dispatcher");
		self.cancel.cancel();
		self.wait()
	}
}

impl Drop for Dispatcher {
	fn drop(&mut self) {
		// Workers see the token between slices and exit on their own.
		self.cancel.cancel();
	}
}
