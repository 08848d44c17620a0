//! Per-subject debounce timers.
//!
//! Each subject (an open document, the share link, ...) owns one
//! [`Debouncer`]. Triggering it again before the quiet interval elapses
//! replaces the pending action and restarts the interval; disposing it
//! guarantees the pending action never runs.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::TaskClass;

/// Single pending timer owned by one subject.
///
/// Dropping the debouncer disposes it.
#[derive(Debug)]
pub struct Debouncer {
	class: TaskClass,
	/// Parent of every armed timer; cancelled exactly once on dispose.
	subject: CancellationToken,
	armed: Option<CancellationToken>,
	generation: u64,
}

impl Debouncer {
	/// Creates an idle debouncer whose actions run as `class` tasks.
	pub fn new(class: TaskClass) -> Self {
		Self {
			class,
			subject: CancellationToken::new(),
			armed: None,
			generation: 0,
		}
	}

	/// Schedules `action` to run after `delay` of quiescence.
	///
	/// Any action still waiting from an earlier call is cancelled. Once the
	/// timer has fired the action runs to completion; only the waiting phase
	/// is cancellable. Triggering a disposed debouncer does nothing.
	pub fn trigger<F>(&mut self, delay: Duration, action: F)
	where
		F: Future<Output = ()> + Send + 'static,
	{
		if self.subject.is_cancelled() {
			tracing::trace!(generation = self.generation, "debounce.trigger_after_dispose");
			return;
		}

		self.cancel();
		self.generation = self.generation.wrapping_add(1);
		let timer = self.subject.child_token();
		self.armed = Some(timer.clone());

		let generation = self.generation;
		crate::spawn(self.class, async move {
			tokio::select! {
				biased;
				_ = timer.cancelled() => {
					tracing::trace!(generation, "debounce.cancelled");
					return;
				}
				_ = tokio::time::sleep(delay) => {}
			}
			// Fired: the timer is spent, later cancels must not look pending.
			timer.cancel();
			tracing::trace!(generation, "debounce.fire");
			action.await;
		});
	}

	/// Cancels the pending action, if any, without disposing the subject.
	pub fn cancel(&mut self) {
		if let Some(timer) = self.armed.take() {
			timer.cancel();
		}
	}

	/// Returns true while an action is waiting for its quiet interval.
	pub fn is_pending(&self) -> bool {
		self.armed.as_ref().is_some_and(|timer| !timer.is_cancelled())
	}

	/// Cancels the pending action and refuses all later triggers.
	///
	/// Idempotent.
	pub fn dispose(&mut self) {
		self.armed = None;
		self.subject.cancel();
	}

	/// Returns true once [`Self::dispose`] has been called.
	pub fn is_disposed(&self) -> bool {
		self.subject.is_cancelled()
	}
}

impl Drop for Debouncer {
	fn drop(&mut self) {
		self.subject.cancel();
	}
}
