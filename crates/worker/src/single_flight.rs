//! Single-flight request scheduler with latest-wins coalescing.
//!
//! At most one request is dispatched at a time. Submissions that arrive
//! while a request is in flight wait in a one-slot queue; a newer submission
//! replaces (and rejects) the queued one. The in-flight request always runs
//! to completion and its outcome always reaches the caller that submitted it.
//!
//! ```text
//! Idle ──submit──▶ InFlight ──submit──▶ InFlightQueued ──submit──▶ InFlightQueued
//!  ▲                 │   ▲                    │           (old queued rejected)
//!  └────complete─────┘   └──complete/promote──┘
//! ```

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::TaskClass;

/// Error delivered to a caller of [`RequestScheduler::submit`].
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError<E> {
	/// A newer submission replaced this request before it was dispatched.
	#[error("request superseded by a newer submission")]
	Superseded,
	/// The dispatched request failed.
	#[error("{0}")]
	Dispatch(E),
	/// The dispatch ended without producing an outcome (it panicked).
	#[error("request dispatch ended without a result")]
	Dropped,
}

impl<E> ScheduleError<E> {
	/// Returns true for the cancellation outcome of a superseded request.
	pub fn is_superseded(&self) -> bool {
		matches!(self, Self::Superseded)
	}
}

/// Observable scheduler phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
	Idle,
	InFlight,
	InFlightQueued,
}

type Outcome<R, E> = Result<R, ScheduleError<E>>;
type DispatchFn<S, R, E> = dyn Fn(S) -> BoxFuture<'static, Result<R, E>> + Send + Sync;

/// One unit of work plus the channel its outcome is delivered on.
struct PendingRequest<S, R, E> {
	seq: u64,
	snapshot: S,
	reply: oneshot::Sender<Outcome<R, E>>,
}

impl<S, R, E> PendingRequest<S, R, E> {
	fn reject(self, err: ScheduleError<E>) {
		// The caller may have stopped waiting.
		let _ = self.reply.send(Err(err));
	}
}

/// Scheduler state value. Only the queued request is stored; the in-flight
/// request is owned by the driver task.
enum SchedulerState<S, R, E> {
	Idle,
	InFlight,
	InFlightQueued { queued: PendingRequest<S, R, E> },
}

impl<S, R, E> SchedulerState<S, R, E> {
	fn phase(&self) -> SchedulerPhase {
		match self {
			Self::Idle => SchedulerPhase::Idle,
			Self::InFlight => SchedulerPhase::InFlight,
			Self::InFlightQueued { .. } => SchedulerPhase::InFlightQueued,
		}
	}
}

struct Inner<S, R, E> {
	name: String,
	class: TaskClass,
	next_seq: AtomicU64,
	state: Mutex<SchedulerState<S, R, E>>,
	dispatch: Box<DispatchFn<S, R, E>>,
}

/// Coalescing single-flight scheduler.
///
/// Cloning yields another handle to the same scheduler.
pub struct RequestScheduler<S, R, E> {
	inner: Arc<Inner<S, R, E>>,
}

impl<S, R, E> Clone for RequestScheduler<S, R, E> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<S, R, E> RequestScheduler<S, R, E> {
	/// Returns the current phase.
	pub fn phase(&self) -> SchedulerPhase {
		self.inner.state.lock().phase()
	}

	/// Scheduler name used in logs.
	pub fn name(&self) -> &str {
		&self.inner.name
	}
}

impl<S, R, E> std::fmt::Debug for RequestScheduler<S, R, E> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RequestScheduler")
			.field("name", &self.inner.name)
			.field("phase", &self.phase())
			.finish()
	}
}

impl<S, R, E> RequestScheduler<S, R, E>
where
	S: Send + 'static,
	R: Send + 'static,
	E: Send + 'static,
{
	/// Creates an idle scheduler dispatching through `dispatch`.
	pub fn new<F, Fut>(name: impl Into<String>, class: TaskClass, dispatch: F) -> Self
	where
		F: Fn(S) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<R, E>> + Send + 'static,
	{
		Self {
			inner: Arc::new(Inner {
				name: name.into(),
				class,
				next_seq: AtomicU64::new(0),
				state: Mutex::new(SchedulerState::Idle),
				dispatch: Box::new(move |snapshot| dispatch(snapshot).boxed()),
			}),
		}
	}

	/// Submits a snapshot for dispatch.
	///
	/// The state transition happens synchronously inside this call; the
	/// returned future only waits for the outcome. Dropping it does not
	/// cancel anything.
	pub fn submit(&self, snapshot: S) -> impl Future<Output = Result<R, ScheduleError<E>>> + Send + 'static {
		let (reply, outcome) = oneshot::channel();
		let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
		let request = PendingRequest { seq, snapshot, reply };

		let dispatch_now = {
			let mut state = self.inner.state.lock();
			match std::mem::replace(&mut *state, SchedulerState::Idle) {
				SchedulerState::Idle => {
					*state = SchedulerState::InFlight;
					Some(request)
				}
				SchedulerState::InFlight => {
					tracing::trace!(scheduler = %self.inner.name, seq, "scheduler.queue");
					*state = SchedulerState::InFlightQueued { queued: request };
					None
				}
				SchedulerState::InFlightQueued { queued } => {
					tracing::debug!(scheduler = %self.inner.name, superseded = queued.seq, seq, "scheduler.supersede");
					queued.reject(ScheduleError::Superseded);
					*state = SchedulerState::InFlightQueued { queued: request };
					None
				}
			}
		};

		if let Some(request) = dispatch_now {
			crate::spawn(self.inner.class, drive(Arc::clone(&self.inner), request));
		}

		async move { outcome.await.unwrap_or(Err(ScheduleError::Dropped)) }
	}
}

/// Runs the in-flight request, then keeps promoting queued requests until
/// the queue is empty.
async fn drive<S, R, E>(inner: Arc<Inner<S, R, E>>, mut request: PendingRequest<S, R, E>)
where
	S: Send + 'static,
	R: Send + 'static,
	E: Send + 'static,
{
	loop {
		let PendingRequest { seq, snapshot, reply } = request;
		tracing::trace!(scheduler = %inner.name, seq, "scheduler.dispatch");

		// Building the future may panic too, so it happens inside the guard.
		let dispatch = async { (inner.dispatch)(snapshot).await };
		let outcome = match AssertUnwindSafe(dispatch).catch_unwind().await {
			Ok(Ok(result)) => Ok(result),
			Ok(Err(err)) => Err(ScheduleError::Dispatch(err)),
			Err(_) => {
				tracing::warn!(scheduler = %inner.name, seq, "scheduler.dispatch_panicked");
				Err(ScheduleError::Dropped)
			}
		};
		if reply.send(outcome).is_err() {
			tracing::trace!(scheduler = %inner.name, seq, "scheduler.caller_gone");
		}

		let next = {
			let mut state = inner.state.lock();
			match std::mem::replace(&mut *state, SchedulerState::Idle) {
				SchedulerState::InFlightQueued { queued } => {
					*state = SchedulerState::InFlight;
					Some(queued)
				}
				SchedulerState::InFlight | SchedulerState::Idle => None,
			}
		};

		match next {
			Some(queued) => request = queued,
			None => {
				tracing::trace!(scheduler = %inner.name, "scheduler.idle");
				break;
			}
		}
	}
}
