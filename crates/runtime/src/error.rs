// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::any::Any;

use crate::actor::ActorId;

/// Errors returned by actor, timer and dispatcher operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
	#[error("actor `{name}` is disposed")]
	Disposed {
		name: String,
	},

	#[error("actor `{name}` has not been disposed")]
	NotDisposed {
		name: String,
	},

	#[error("actor `{name}` cannot be disposed from a thread that is draining actors")]
	DisposeWhileDraining {
		name: String,
	},

	#[error("worker {worker} panicked: {message}")]
	WorkerPanicked {
		worker: usize,
		message: String,
	},

	#[error("failed to spawn thread `{name}`: {reason}")]
	Spawn {
		name: String,
		reason: String,
	},
}

pub type Result<T> = std::result::Result<T, Error>;

/// A panic raised by a job while its actor was draining.
///
/// The fault never reaches the submitter; it is logged and handed to the
/// actor's fault hook, if one is configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFault {
	pub actor_id: ActorId,
	pub actor: String,
	pub message: String,
}

impl std::fmt::Display for JobFault {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "job on actor `{}` panicked: {}", self.actor, self.message)
	}
}

/// Render a panic payload as text.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
	if let Some(msg) = payload.downcast_ref::<&'static str>() {
		(*msg).to_string()
	} else if let Some(msg) = payload.downcast_ref::<String>() {
		msg.clone()
	} else {
		"non-string panic payload".to_string()
	}
}

#[cfg(test)]
mod tests {
	use std::panic::catch_unwind;

	use super::*;

	fn boom() {
		panic!("boom");
	}

	fn formatted(value: i32) {
		panic!("value was {value}");
	}

	fn opaque() {
		std::panic::panic_any(7u32);
	}

	#[test]
	fn test_panic_message_str() {
		let payload = catch_unwind(boom).unwrap_err();
		assert_eq!(panic_message(payload.as_ref()), "boom");
	}

	#[test]
	fn test_panic_message_formatted() {
		let payload = catch_unwind(|| formatted(42)).unwrap_err();
		assert_eq!(panic_message(payload.as_ref()), "value was 42");
	}

	#[test]
	fn test_panic_message_other_payload() {
		let payload = catch_unwind(opaque).unwrap_err();
		assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
	}

	#[test]
	fn test_error_display() {
		let err = Error::Disposed {
			name: "room".to_string(),
		};
		assert_eq!(err.to_string(), "actor `room` is disposed");
	}
}
