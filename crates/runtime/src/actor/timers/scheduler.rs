// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::{
	cmp::Ordering as CmpOrdering,
	collections::BinaryHeap,
	fmt,
	sync::{
		Arc,
		atomic::{AtomicU64, Ordering},
	},
	thread::{self, JoinHandle},
	time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::TimerConfig;
use crate::{
	actor::{context::ThreadContext, executable::Executable},
	error::{Error, Result},
};

/// Work run by the timer thread when an entry comes due.
pub(crate) type TimerTask = Box<dyn FnOnce(&ThreadContext) + Send>;

struct TimerEntry {
	/// Tick at which the entry fires.
	due: u64,
	/// Insertion sequence, keeps ordering total.
	seq: u64,
	/// Actor kept alive until the entry fires.
	owner: Arc<dyn Executable>,
	task: TimerTask,
}

impl Eq for TimerEntry {}

impl PartialEq for TimerEntry {
	fn eq(&self, other: &Self) -> bool {
		self.due == other.due && self.seq == other.seq
	}
}

impl Ord for TimerEntry {
	// BinaryHeap is a max-heap, so we reverse the ordering to get a min-heap by due tick.
	fn cmp(&self, other: &Self) -> CmpOrdering {
		other.due.cmp(&self.due).then_with(|| other.seq.cmp(&self.seq))
	}
}

impl PartialOrd for TimerEntry {
	fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
		Some(self.cmp(other))
	}
}

struct Shared {
	heap: Mutex<BinaryHeap<TimerEntry>>,
	start: Instant,
	next_seq: AtomicU64,
	last_tick: AtomicU64,
}

impl Shared {
	fn current_tick(&self) -> u64 {
		millis_floor(self.start.elapsed())
	}

	/// Pop every entry with `due <= tick`, lowest due first.
	fn take_due(&self, tick: u64) -> Vec<TimerEntry> {
		let mut heap = self.heap.lock();
		let mut due = Vec::new();
		while heap.peek().is_some_and(|entry| entry.due <= tick) {
			if let Some(entry) = heap.pop() {
				due.push(entry);
			}
		}
		due
	}
}

/// A thread's private queue of delayed jobs.
///
/// Scheduling may happen from any thread; the heap is guarded by a lock that
/// is only contended by schedulers targeting this queue and its own background
/// thread.
///
/// The queue returned by [`TimerQueue::new`] owns the background thread. That
/// thread's own context holds a borrowed handle over the same heap, so delayed
/// jobs submitted from fired jobs land back in this queue.
pub struct TimerQueue {
	shared: Arc<Shared>,
	driver: Option<Driver>,
}

/// Ownership of the background thread.
struct Driver {
	shutdown_tx: Sender<()>,
	join_handle: JoinHandle<()>,
}

impl TimerQueue {
	/// Create the queue and start its background thread.
	pub fn new(config: TimerConfig) -> Result<Self> {
		let (shutdown_tx, shutdown_rx) = bounded(1);

		let shared = Arc::new(Shared {
			heap: Mutex::new(BinaryHeap::new()),
			start: Instant::now(),
			next_seq: AtomicU64::new(0),
			last_tick: AtomicU64::new(0),
		});

		let loop_shared = shared.clone();
		let resolution = config.resolution;
		let join_handle = thread::Builder::new()
			.name(config.thread_name.clone())
			.spawn(move || {
				timer_loop(loop_shared, shutdown_rx, resolution);
			})
			.map_err(|err| Error::Spawn {
				name: config.thread_name.clone(),
				reason: err.to_string(),
			})?;

		debug!(thread = %config.thread_name, ?resolution, "Timer queue started");

		Ok(Self {
			shared,
			driver: Some(Driver {
				shutdown_tx,
				join_handle,
			}),
		})
	}

	/// A handle over `shared` that does not own the background thread.
	fn borrowed(shared: Arc<Shared>) -> Self {
		Self {
			shared,
			driver: None,
		}
	}

	/// Whether both handles schedule into the same heap.
	pub fn same_queue(&self, other: &TimerQueue) -> bool {
		Arc::ptr_eq(&self.shared, &other.shared)
	}

	/// Milliseconds elapsed since this queue was created.
	pub fn current_tick(&self) -> u64 {
		self.shared.current_tick()
	}

	/// Tick observed by the background thread on its latest wake.
	pub fn last_tick(&self) -> u64 {
		self.shared.last_tick.load(Ordering::Relaxed)
	}

	/// Number of entries waiting to fire.
	pub fn len(&self) -> usize {
		self.shared.heap.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Queue `task` to run once `delay` has elapsed.
	///
	/// `owner` is held until the entry fires or the queue is torn down.
	pub(crate) fn schedule(&self, owner: Arc<dyn Executable>, delay: Duration, task: TimerTask) {
		let due = millis_ceil(self.shared.start.elapsed().saturating_add(delay));
		owner.acquire();

		let seq = self.shared.next_seq.fetch_add(1, Ordering::Relaxed);
		self.shared.heap.lock().push(TimerEntry {
			due,
			seq,
			owner,
			task,
		});
	}
}

impl Drop for TimerQueue {
	fn drop(&mut self) {
		// Borrowed handles leave the heap to the owning queue.
		let Some(driver) = self.driver.take() else {
			return;
		};

		// Dropping the sender disconnects the loop's receiver.
		drop(driver.shutdown_tx);
		if driver.join_handle.thread().id() != thread::current().id() {
			let _ = driver.join_handle.join();
		}

		let abandoned: Vec<TimerEntry> = self.shared.heap.lock().drain().collect();
		if !abandoned.is_empty() {
			warn!(count = abandoned.len(), "Timer queue dropped with pending entries");
		}
		for entry in abandoned {
			let TimerEntry {
				owner,
				task,
				..
			} = entry;
			drop(task);
			owner.release();
		}
	}
}

impl fmt::Debug for TimerQueue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TimerQueue")
			.field("current_tick", &self.current_tick())
			.field("pending", &self.len())
			.field("owner", &self.driver.is_some())
			.finish()
	}
}

/// The loop running on the timer's background thread.
fn timer_loop(shared: Arc<Shared>, shutdown_rx: Receiver<()>, resolution: Duration) {
	ThreadContext::with(|ctx| ctx.adopt_timer(TimerQueue::borrowed(shared.clone())));

	loop {
		match shutdown_rx.recv_timeout(resolution) {
			Err(RecvTimeoutError::Timeout) => {}
			Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
		}

		let tick = shared.current_tick();
		shared.last_tick.store(tick, Ordering::Relaxed);

		let due = shared.take_due(tick);

		ThreadContext::with(|ctx| {
			ctx.set_tick(tick);
			for entry in due {
				(entry.task)(ctx);
				entry.owner.release();
			}
		});
	}

	debug!("Timer queue stopped");
}

fn millis_floor(elapsed: Duration) -> u64 {
	u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

fn millis_ceil(elapsed: Duration) -> u64 {
	u64::try_from(elapsed.as_nanos().div_ceil(1_000_000)).unwrap_or(u64::MAX)
}
