// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! A data-processing service driven by a dispatcher.
//!
//! Each worker feeds items into one shared processor actor. Processing an item
//! schedules a follow-up: immediately for high priority items, after a delay
//! for medium priority ones.

use std::{
	collections::HashMap,
	sync::{
		Arc, Mutex,
		atomic::{AtomicUsize, Ordering},
	},
	thread,
	time::Duration,
};

use jobdispatch_runtime::{
	Actor, ActorConfig, CancellationToken, Dispatcher, DispatcherConfig, Job, JobFault, Runnable, ThreadContext,
};
use jobdispatch_testing::{init_tracing, wait_for, wait_for_value};

const WORKERS: usize = 4;
const ITEMS_PER_WORKER: usize = 25;

#[derive(Debug, Default)]
struct ProcessorState {
	processed: HashMap<String, u32>,
	high_follow_ups: Vec<String>,
	medium_follow_ups: Vec<String>,
}

enum FollowUp {
	High(String),
	Medium(String),
}

impl Job<ProcessorState> for FollowUp {
	fn execute(self: Box<Self>, state: &mut ProcessorState) {
		match *self {
			FollowUp::High(item) => state.high_follow_ups.push(item),
			FollowUp::Medium(item) => state.medium_follow_ups.push(item),
		}
	}
}

struct ProcessItem {
	processor: Actor<ProcessorState>,
	item: String,
	priority: u8,
}

impl Job<ProcessorState> for ProcessItem {
	fn execute(self: Box<Self>, state: &mut ProcessorState) {
		let ProcessItem {
			processor,
			item,
			priority,
		} = *self;

		if item.starts_with("poison") {
			panic!("cannot process {item}");
		}

		*state.processed.entry(item.clone()).or_insert(0) += 1;

		if priority > 5 {
			processor.submit(FollowUp::High(item)).unwrap();
		} else if priority > 2 {
			processor.submit_after(Duration::from_millis(20), FollowUp::Medium(item)).unwrap();
		}
	}
}

struct ProcessingWorker {
	index: usize,
	processor: Actor<ProcessorState>,
	next: usize,
	submitted: Arc<AtomicUsize>,
	shutdowns: Arc<AtomicUsize>,
}

impl Runnable for ProcessingWorker {
	fn run(&mut self, _cancel: &CancellationToken) -> bool {
		if self.next < ITEMS_PER_WORKER {
			let item = if self.index == 0 && self.next == 0 {
				"poison-0".to_string()
			} else {
				format!("item-{}-{}", self.index, self.next)
			};
			let job = ProcessItem {
				processor: self.processor.clone(),
				item,
				priority: (self.next % 10) as u8,
			};
			self.processor.submit(job).unwrap();
			self.next += 1;
			self.submitted.fetch_add(1, Ordering::SeqCst);
		}

		// Keep polling so this thread's timer queue stays alive.
		true
	}

	fn shutdown(&mut self) {
		self.shutdowns.fetch_add(1, Ordering::SeqCst);
	}
}

fn expected_follow_ups(range: impl Fn(usize) -> bool) -> usize {
	// Worker 0 replaces its first item, priority 0, with the poison item.
	WORKERS * (0..ITEMS_PER_WORKER).filter(|next| range(next % 10)).count()
}

#[test]
fn test_processing_service() {
	init_tracing();

	let faults: Arc<Mutex<Vec<JobFault>>> = Arc::new(Mutex::new(Vec::new()));
	let faults_clone = faults.clone();
	let processor = Actor::with_config(
		ProcessorState::default(),
		ActorConfig::new().name("data-processor").on_fault(move |fault| {
			faults_clone.lock().unwrap().push(fault.clone());
		}),
	);

	let submitted = Arc::new(AtomicUsize::new(0));
	let shutdowns = Arc::new(AtomicUsize::new(0));
	let worker_processor = processor.clone();
	let (worker_submitted, worker_shutdowns) = (submitted.clone(), shutdowns.clone());
	let dispatcher = Arc::new(Dispatcher::new(
		DispatcherConfig::new(WORKERS).thread_name("processing"),
		move |index| ProcessingWorker {
			index,
			processor: worker_processor.clone(),
			next: 0,
			submitted: worker_submitted.clone(),
			shutdowns: worker_shutdowns.clone(),
		},
	));

	let pool = dispatcher.clone();
	let running = thread::spawn(move || pool.run_workers());

	wait_for_value(|| submitted.load(Ordering::SeqCst), WORKERS * ITEMS_PER_WORKER, "workers should submit every item");

	// Follow-ups are submitted from inside jobs, which a disposing actor would
	// refuse; let the delayed ones held by the workers' timers fire first.
	wait_for(|| processor.refs() == 0 && processor.pending() == 0, "processor should go idle");
	processor.dispose().unwrap();
	dispatcher.dispose().unwrap();
	running.join().unwrap().unwrap();

	assert_eq!(shutdowns.load(Ordering::SeqCst), WORKERS);
	assert_eq!(dispatcher.active_workers(), 0);

	let faults = faults.lock().unwrap();
	assert_eq!(faults.len(), 1);
	assert_eq!(faults[0].actor, "data-processor");
	assert_eq!(faults[0].message, "cannot process poison-0");

	processor
		.inspect(|state| {
			assert_eq!(state.processed.len(), WORKERS * ITEMS_PER_WORKER - 1);
			assert!(state.processed.values().all(|count| *count == 1));
			assert!(!state.processed.contains_key("poison-0"));
			assert_eq!(state.high_follow_ups.len(), expected_follow_ups(|p| p > 5));
			assert_eq!(state.medium_follow_ups.len(), expected_follow_ups(|p| p > 2 && p <= 5));
		})
		.unwrap();
}

#[test]
fn test_worker_threads_advance_their_tick() {
	init_tracing();

	struct TickWatcher {
		ticks: Arc<Mutex<Vec<u64>>>,
	}

	impl Runnable for TickWatcher {
		fn run(&mut self, _cancel: &CancellationToken) -> bool {
			ThreadContext::with(|ctx| {
				// Start this thread's timer so the worker loop refreshes the tick.
				ctx.timer().unwrap();
				self.ticks.lock().unwrap().push(ctx.tick());
			});
			self.ticks.lock().unwrap().len() < 20
		}
	}

	let ticks = Arc::new(Mutex::new(Vec::new()));
	let worker_ticks = ticks.clone();
	let dispatcher = Dispatcher::new(DispatcherConfig::new(1).yield_interval(Duration::from_millis(2)), move |_index| {
		TickWatcher {
			ticks: worker_ticks.clone(),
		}
	});

	dispatcher.run_workers().unwrap();

	let ticks = ticks.lock().unwrap();
	assert!(ticks.windows(2).all(|pair| pair[0] <= pair[1]), "ticks went backwards: {:?}", *ticks);
	assert!(ticks.last() > ticks.first(), "tick never advanced: {:?}", *ticks);
}
