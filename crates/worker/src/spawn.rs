use std::future::Future;

use tokio::task::JoinHandle;

use crate::TaskClass;

/// Starts a debounce timer, scheduler driver or relay task on the current
/// runtime. `class` only labels the `worker.spawn` trace.
///
/// # Panics
///
/// Panics when called outside a Tokio runtime.
pub fn spawn<F>(class: TaskClass, fut: F) -> JoinHandle<F::Output>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	tracing::trace!(worker_class = class.as_str(), "worker.spawn");
	tokio::spawn(fut)
}

/// Starts a long-lived named thread, such as the one an in-process engine
/// runs its blocking analyses on.
///
/// Thread creation failures are returned rather than panicking, so a host
/// that cannot start reports it to its caller.
pub fn spawn_named_thread<F, R>(class: TaskClass, name: impl Into<String>, f: F) -> std::io::Result<std::thread::JoinHandle<R>>
where
	F: FnOnce() -> R + Send + 'static,
	R: Send + 'static,
{
	let name = name.into();
	tracing::trace!(worker_class = class.as_str(), thread = %name, "worker.spawn_named_thread");
	std::thread::Builder::new().name(name).spawn(f)
}
