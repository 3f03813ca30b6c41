// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Per-thread execution context.
//!
//! Each thread that submits to actors carries a [`ThreadContext`]:
//! - The actor whose drain currently owns the thread
//! - Actors activated while the thread was owned, drained afterwards in order
//! - The thread's private timer queue, created on first use
//! - A cached tick value
//!
//! The ambient instance lives in a thread local and is reached through
//! [`ThreadContext::with`]. Contexts can also be constructed explicitly and
//! passed to the `*_in` operations of [`Actor`](crate::actor::Actor), which is
//! how a single-threaded event loop would drive the runtime.

use std::{
	cell::{Cell, OnceCell, RefCell},
	collections::VecDeque,
	fmt,
	sync::{
		Arc,
		atomic::{AtomicBool, Ordering},
	},
};

use crate::{
	actor::{
		executable::{ActorId, Executable},
		timers::{TimerConfig, TimerQueue},
	},
	error::Result,
};

thread_local! {
	static CURRENT: ThreadContext = ThreadContext::new();
}

/// A cancellation token for signaling shutdown.
///
/// This is a simple atomic boolean that can be shared across workers.
#[derive(Clone)]
pub struct CancellationToken {
	cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
	/// Create a new cancellation token.
	pub fn new() -> Self {
		Self {
			cancelled: Arc::new(AtomicBool::new(false)),
		}
	}

	/// Signal cancellation.
	pub fn cancel(&self) {
		self.cancelled.store(true, Ordering::SeqCst);
	}

	/// Check if cancellation was requested.
	pub fn is_cancelled(&self) -> bool {
		self.cancelled.load(Ordering::SeqCst)
	}
}

impl Default for CancellationToken {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Debug for CancellationToken {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CancellationToken").field("cancelled", &self.is_cancelled()).finish()
	}
}

/// Execution state of one thread.
///
/// Not `Sync`: a context is only ever touched by the thread it belongs to.
pub struct ThreadContext {
	owner: RefCell<Option<Arc<dyn Executable>>>,
	deferred: RefCell<VecDeque<Arc<dyn Executable>>>,
	timer: OnceCell<TimerQueue>,
	timer_config: TimerConfig,
	tick: Cell<u64>,
}

impl ThreadContext {
	/// Create a context whose timer queue uses the default configuration.
	pub fn new() -> Self {
		Self::with_config(TimerConfig::default())
	}

	/// Create a context whose timer queue, once created, uses `timer_config`.
	pub fn with_config(timer_config: TimerConfig) -> Self {
		Self {
			owner: RefCell::new(None),
			deferred: RefCell::new(VecDeque::new()),
			timer: OnceCell::new(),
			timer_config,
			tick: Cell::new(0),
		}
	}

	/// Run `f` with the calling thread's ambient context.
	pub fn with<R>(f: impl FnOnce(&ThreadContext) -> R) -> R {
		CURRENT.with(f)
	}

	/// The actor whose drain owns this thread, if any.
	pub fn current_owner(&self) -> Option<ActorId> {
		self.owner.borrow().as_ref().map(|owner| owner.id())
	}

	/// Whether this thread is in the middle of draining actors.
	pub fn is_draining(&self) -> bool {
		self.owner.borrow().is_some()
	}

	/// Number of actors waiting for the current drain to finish.
	pub fn deferred_len(&self) -> usize {
		self.deferred.borrow().len()
	}

	/// This thread's timer queue, started on first use.
	pub fn timer(&self) -> Result<&TimerQueue> {
		if let Some(timer) = self.timer.get() {
			return Ok(timer);
		}
		let timer = TimerQueue::new(self.timer_config.clone())?;
		Ok(self.timer.get_or_init(|| timer))
	}

	/// The most recently observed tick.
	pub fn tick(&self) -> u64 {
		self.tick.get()
	}

	/// Re-read the tick from this thread's timer queue.
	///
	/// Leaves the cached value alone if no timer queue was started yet.
	pub fn refresh_tick(&self) -> u64 {
		if let Some(timer) = self.timer.get() {
			self.tick.set(timer.current_tick());
		}
		self.tick.get()
	}

	/// Use `timer` as this thread's timer queue instead of starting one.
	pub(crate) fn adopt_timer(&self, timer: TimerQueue) {
		let _ = self.timer.set(timer);
	}

	pub(crate) fn set_tick(&self, tick: u64) {
		self.tick.set(tick);
	}

	/// Make `owner` the owner of this thread until the guard drops.
	pub(crate) fn acquire(&self, owner: Arc<dyn Executable>) -> OwnerGuard<'_> {
		let previous = self.owner.borrow_mut().replace(owner);
		debug_assert!(previous.is_none(), "thread context acquired twice");
		OwnerGuard {
			ctx: self,
		}
	}

	pub(crate) fn defer(&self, actor: Arc<dyn Executable>) {
		self.deferred.borrow_mut().push_back(actor);
	}

	pub(crate) fn next_deferred(&self) -> Option<Arc<dyn Executable>> {
		self.deferred.borrow_mut().pop_front()
	}
}

impl Default for ThreadContext {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Debug for ThreadContext {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ThreadContext")
			.field("owner", &self.current_owner())
			.field("deferred", &self.deferred_len())
			.field("timer", &self.timer.get().is_some())
			.field("tick", &self.tick.get())
			.finish()
	}
}

/// Clears the owner of a [`ThreadContext`] when dropped.
pub(crate) struct OwnerGuard<'a> {
	ctx: &'a ThreadContext,
}

impl Drop for OwnerGuard<'_> {
	fn drop(&mut self) {
		self.ctx.owner.borrow_mut().take();
	}
}
