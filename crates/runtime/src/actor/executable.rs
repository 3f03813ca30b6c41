// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Single-owner job execution.
//!
//! An [`Actor`] wraps private state and a queue of jobs. Any thread may submit;
//! the thread whose submission moves the actor from idle to active becomes its
//! owner and drains the queue. While a thread owns a drain, actors it activates
//! are deferred onto its [`ThreadContext`] and drained afterwards in a loop, so
//! cascades between actors never grow the stack.
//!
//! The pending counter is the only coordination: it is incremented before a job
//! is enqueued and decremented after it ran, so exactly one thread observes the
//! idle to active transition and exactly one observes the return to idle.

use std::{
	cell::UnsafeCell,
	fmt,
	hint,
	panic::{AssertUnwindSafe, catch_unwind},
	sync::{
		Arc,
		atomic::{AtomicU8, AtomicU64, AtomicUsize, Ordering},
	},
	thread,
	time::Duration,
};

use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::{debug, error, trace, warn};

use crate::{
	actor::{
		context::ThreadContext,
		traits::{ActorConfig, BoxedJob, Job},
	},
	error::{Error, JobFault, Result, panic_message},
};

/// Process-unique identity of an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(pub(crate) u64);

impl ActorId {
	pub fn as_u64(&self) -> u64 {
		self.0
	}
}

impl fmt::Display for ActorId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Counter for generating unique actor IDs.
static ACTOR_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_actor_id() -> ActorId {
	ActorId(ACTOR_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// Type-erased view of an actor used by thread contexts and timer queues.
pub(crate) trait Executable: Send + Sync {
	fn id(&self) -> ActorId;

	fn name(&self) -> &str;

	/// Run queued jobs until the actor is idle. Owner thread only.
	fn flush(&self);

	fn acquire(&self);

	fn release(&self);
}

const ACTIVE: u8 = 0;
const DISPOSING: u8 = 1;
const DISPOSED: u8 = 2;

struct Shared<S> {
	id: ActorId,
	name: String,
	config: ActorConfig,
	state: UnsafeCell<S>,
	tx: Sender<BoxedJob<S>>,
	rx: Receiver<BoxedJob<S>>,
	/// Jobs enqueued but not yet executed.
	pending: AtomicUsize,
	/// Outstanding holds: drains, timer entries and in-flight submitters.
	refs: AtomicUsize,
	lifecycle: AtomicU8,
}

// SAFETY: `state` is only dereferenced inside `flush`, and `flush` only runs on
// the thread that observed the pending counter leave zero. The counter cannot
// return to zero while that thread is still executing jobs, so no two threads
// touch the state at once. After disposal completes nothing can flush again and
// `inspect` only hands out shared references.
unsafe impl<S: Send> Sync for Shared<S> {}

impl<S: Send + 'static> Shared<S> {
	fn lifecycle(&self) -> u8 {
		self.lifecycle.load(Ordering::SeqCst)
	}

	/// Run `f` while holding a reference, failing if disposal has begun.
	///
	/// The hold makes a submitter that passed the check visible to `dispose`
	/// until its job is counted in `pending`.
	fn admit<R>(&self, f: impl FnOnce() -> R) -> Result<R> {
		self.acquire();
		if self.lifecycle() != ACTIVE {
			self.release();
			return Err(Error::Disposed {
				name: self.name.clone(),
			});
		}
		let result = f();
		self.release();
		Ok(result)
	}

	/// Count and enqueue `job`, draining on this thread if it activated the actor.
	fn post(self: &Arc<Self>, ctx: &ThreadContext, job: BoxedJob<S>) {
		if self.pending.fetch_add(1, Ordering::SeqCst) > 0 {
			self.enqueue(job);
			return;
		}

		self.enqueue(job);
		self.acquire();
		trampoline(ctx, self.clone());
	}

	fn enqueue(&self, job: BoxedJob<S>) {
		// The receiver lives in `self`, so the channel never disconnects.
		let _ = self.tx.send(job);
	}

	fn next_job(&self) -> BoxedJob<S> {
		loop {
			match self.rx.try_recv() {
				Ok(job) => return job,
				// A producer has counted its job but not enqueued it yet.
				Err(_) => hint::spin_loop(),
			}
		}
	}

	fn report_fault(&self, message: String) {
		let fault = JobFault {
			actor_id: self.id,
			actor: self.name.clone(),
			message,
		};
		error!(actor = %self.name, actor_id = %self.id, error = %fault.message, "Job panicked");
		if let Some(handler) = &self.config.on_fault {
			// The hook runs mid-drain; it must not unwind past the pending count.
			if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler(&fault))) {
				error!(
					actor = %self.name,
					actor_id = %self.id,
					error = %panic_message(payload.as_ref()),
					"Fault handler panicked"
				);
			}
		}
	}
}

impl<S: Send + 'static> Executable for Shared<S> {
	fn id(&self) -> ActorId {
		self.id
	}

	fn name(&self) -> &str {
		&self.name
	}

	fn flush(&self) {
		trace!(actor = %self.name, "Draining actor");
		loop {
			let job = self.next_job();

			// SAFETY: see the `Sync` impl; this thread owns the actor until
			// the pending counter returns to zero below.
			let state = unsafe { &mut *self.state.get() };
			if let Err(payload) = catch_unwind(AssertUnwindSafe(|| job.execute(state))) {
				self.report_fault(panic_message(payload.as_ref()));
			}

			if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
				break;
			}
		}
	}

	fn acquire(&self) {
		self.refs.fetch_add(1, Ordering::SeqCst);
	}

	fn release(&self) {
		self.refs.fetch_sub(1, Ordering::SeqCst);
	}
}

/// Drain `actor` on this thread, or defer it if the thread is already draining.
///
/// The caller has acquired a hold on `actor`; it is released once the actor
/// has been drained.
fn trampoline(ctx: &ThreadContext, actor: Arc<dyn Executable>) {
	if ctx.is_draining() {
		ctx.defer(actor);
		return;
	}

	{
		let _owner = ctx.acquire(actor.clone());

		actor.flush();

		while let Some(next) = ctx.next_deferred() {
			next.flush();
			next.release();
		}
	}

	actor.release();
}

/// Handle to an asynchronously executable object.
///
/// Cloning the handle is cheap; all clones address the same state and queue.
///
/// # Example
///
/// ```ignore
/// let counter = Actor::new(0u64);
/// counter.submit(|n: &mut u64| *n += 1)?;
/// counter.submit_after(Duration::from_millis(50), |n: &mut u64| *n *= 2)?;
/// counter.dispose()?;
/// assert_eq!(counter.inspect(|n| *n)?, 2);
/// ```
pub struct Actor<S> {
	inner: Arc<Shared<S>>,
}

impl<S> Clone for Actor<S> {
	fn clone(&self) -> Self {
		Self {
			inner: self.inner.clone(),
		}
	}
}

impl<S: Send + 'static> Actor<S> {
	/// Create an actor with default configuration.
	pub fn new(state: S) -> Self {
		Self::with_config(state, ActorConfig::default())
	}

	/// Create an actor with custom configuration.
	pub fn with_config(state: S, config: ActorConfig) -> Self {
		let id = next_actor_id();
		let name = config.name.clone().unwrap_or_else(|| format!("actor-{}", id));
		let (tx, rx) = unbounded();

		Self {
			inner: Arc::new(Shared {
				id,
				name,
				config,
				state: UnsafeCell::new(state),
				tx,
				rx,
				pending: AtomicUsize::new(0),
				refs: AtomicUsize::new(0),
				lifecycle: AtomicU8::new(ACTIVE),
			}),
		}
	}

	pub fn id(&self) -> ActorId {
		self.inner.id
	}

	pub fn name(&self) -> &str {
		&self.inner.name
	}

	/// Jobs submitted but not yet executed.
	pub fn pending(&self) -> usize {
		self.inner.pending.load(Ordering::SeqCst)
	}

	/// Outstanding holds (active drains, timer entries, in-flight submitters).
	pub fn refs(&self) -> usize {
		self.inner.refs.load(Ordering::SeqCst)
	}

	pub fn is_disposed(&self) -> bool {
		self.inner.lifecycle() == DISPOSED
	}

	/// Submit `job` using the calling thread's context.
	///
	/// May drain this actor (and any actor it activates) on the calling thread
	/// before returning.
	pub fn submit(&self, job: impl Job<S>) -> Result<()> {
		ThreadContext::with(|ctx| self.submit_in(ctx, job))
	}

	/// Submit `job` using an explicit context.
	pub fn submit_in(&self, ctx: &ThreadContext, job: impl Job<S>) -> Result<()> {
		let job: BoxedJob<S> = Box::new(job);
		self.inner.admit(|| self.inner.post(ctx, job))
	}

	/// Submit `job` once `delay` has elapsed, via the calling thread's timer queue.
	pub fn submit_after(&self, delay: Duration, job: impl Job<S>) -> Result<()> {
		ThreadContext::with(|ctx| self.submit_after_in(ctx, delay, job))
	}

	/// Submit `job` once `delay` has elapsed, via `ctx`'s timer queue.
	///
	/// The actor is held until the job fires, so disposal waits for it.
	pub fn submit_after_in(&self, ctx: &ThreadContext, delay: Duration, job: impl Job<S>) -> Result<()> {
		let job: BoxedJob<S> = Box::new(job);
		self.inner.admit(|| {
			let timer = ctx.timer()?;
			let shared = self.inner.clone();
			let owner: Arc<dyn Executable> = self.inner.clone();
			// Timer fires bypass the lifecycle gate: the entry's hold keeps
			// disposal waiting until it has run.
			timer.schedule(owner, delay, Box::new(move |ctx: &ThreadContext| shared.post(ctx, job)));
			Ok(())
		})?
	}

	/// Stop accepting jobs and block until every queued and delayed job has run.
	///
	/// Safe to call more than once and from several threads; every caller
	/// returns once the actor is disposed. Fails without waiting when called
	/// from a thread that is currently draining actors, since the drain this
	/// call would wait for may be the caller's own.
	pub fn dispose(&self) -> Result<()> {
		if ThreadContext::with(|ctx| ctx.is_draining()) {
			return Err(Error::DisposeWhileDraining {
				name: self.inner.name.clone(),
			});
		}

		let initiated = self
			.inner
			.lifecycle
			.compare_exchange(ACTIVE, DISPOSING, Ordering::SeqCst, Ordering::SeqCst)
			.is_ok();

		if initiated {
			debug!(actor = %self.inner.name, pending = self.pending(), refs = self.refs(), "Disposing actor");
		}

		let interval = self.inner.config.dispose_poll_interval;
		loop {
			if self.inner.lifecycle() == DISPOSED {
				return Ok(());
			}
			// Holds first: a submitter releases its hold only after its job
			// is counted in `pending`.
			if self.refs() == 0 && self.pending() == 0 {
				break;
			}
			thread::sleep(interval);
		}

		if self.inner.lifecycle.swap(DISPOSED, Ordering::SeqCst) != DISPOSED {
			debug!(actor = %self.inner.name, "Actor disposed");
		}
		Ok(())
	}

	/// Dispose this actor when the returned guard is dropped.
	pub fn guard(&self) -> DisposeGuard<S> {
		DisposeGuard {
			actor: self.clone(),
		}
	}

	/// Read the final state of a disposed actor.
	pub fn inspect<R>(&self, f: impl FnOnce(&S) -> R) -> Result<R> {
		if !self.is_disposed() {
			return Err(Error::NotDisposed {
				name: self.inner.name.clone(),
			});
		}
		// SAFETY: a disposed actor has no pending jobs, no holds and rejects
		// submissions, so no thread can be flushing it.
		let state = unsafe { &*self.inner.state.get() };
		Ok(f(state))
	}
}

impl<S> fmt::Debug for Actor<S> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Actor")
			.field("id", &self.inner.id)
			.field("name", &self.inner.name)
			.field("pending", &self.inner.pending.load(Ordering::SeqCst))
			.field("refs", &self.inner.refs.load(Ordering::SeqCst))
			.finish()
	}
}

/// Scoped disposal of an [`Actor`]; see [`Actor::guard`].
pub struct DisposeGuard<S: Send + 'static> {
	actor: Actor<S>,
}

impl<S: Send + 'static> DisposeGuard<S> {
	pub fn actor(&self) -> &Actor<S> {
		&self.actor
	}
}

impl<S: Send + 'static> Drop for DisposeGuard<S> {
	fn drop(&mut self) {
		if let Err(err) = self.actor.dispose() {
			warn!(actor = %self.actor.name(), error = %err, "Failed to dispose actor");
		}
	}
}
