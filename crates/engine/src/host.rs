//! In-process engine host.
//!
//! The engine lives on one dedicated OS thread. Its loader runs there first
//! (slow initialization), then requests are served strictly one at a time
//! in arrival order. Requests sent during initialization simply wait.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, oneshot};
use typepad_state::{DocumentId, OptionSet};
use typepad_worker::TaskClass;

use crate::protocol::{EngineMessage, EngineRequest};
use crate::types::strip_ansi;
use crate::{Diagnostic, EngineProxy, FlagCatalog, Result, TransportError, Versions};

const STATUS_BUFFER: usize = 64;

/// Analysis engine driven by [`EngineHost`].
///
/// Methods run on the engine thread and may block.
pub trait AnalysisEngine: Send + 'static {
	fn versions(&self) -> Versions;

	fn flags(&self) -> FlagCatalog;

	/// Analyzes `text`. An `Err` (or a panic) is reported to the caller as a
	/// single synthetic diagnostic.
	fn check(&mut self, text: &str, options: &OptionSet) -> std::result::Result<Vec<Diagnostic>, AnalysisError>;
}

/// Failure raised by the engine while loading or analyzing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct AnalysisError(pub String);

impl From<String> for AnalysisError {
	fn from(message: String) -> Self {
		Self(message)
	}
}

impl From<&str> for AnalysisError {
	fn from(message: &str) -> Self {
		Self(message.to_string())
	}
}

/// Publishes status text to every status subscriber of the host.
#[derive(Debug, Clone)]
pub struct StatusNotifier {
	tx: broadcast::Sender<String>,
}

impl StatusNotifier {
	pub fn notify(&self, text: impl AsRef<str>) {
		let text = strip_ansi(text.as_ref());
		tracing::debug!(status = %text, "engine.status");
		// No subscribers is fine.
		let _ = self.tx.send(text);
	}
}

struct Job {
	request: EngineRequest,
	reply: oneshot::Sender<EngineMessage>,
}

/// Handle to an engine running on its own thread.
///
/// Dropping the handle lets the thread finish once queued jobs are served.
#[derive(Debug)]
pub struct EngineHost {
	name: String,
	jobs: mpsc::UnboundedSender<Job>,
	status: broadcast::Sender<String>,
}

impl EngineHost {
	/// Starts the engine thread and runs `loader` on it.
	///
	/// A loader error (or panic) leaves the host answering every request
	/// with an `error` response.
	pub fn spawn<E, L>(name: impl Into<String>, loader: L) -> Result<Self>
	where
		E: AnalysisEngine,
		L: FnOnce(&StatusNotifier) -> std::result::Result<E, AnalysisError> + Send + 'static,
	{
		let name = name.into();
		let (jobs, rx) = mpsc::unbounded_channel();
		let (status, _) = broadcast::channel(STATUS_BUFFER);
		let notifier = StatusNotifier { tx: status.clone() };

		let thread_name = name.clone();
		typepad_worker::spawn_named_thread(TaskClass::CpuBlocking, name.clone(), move || run_engine(&thread_name, loader, notifier, rx))?;

		Ok(Self { name, jobs, status })
	}

	pub fn name(&self) -> &str {
		&self.name
	}
}

#[async_trait]
impl EngineProxy for EngineHost {
	async fn call(&self, request: EngineRequest) -> Result<EngineMessage> {
		let op = request.op();
		let (reply, response) = oneshot::channel();
		self.jobs.send(Job { request, reply }).map_err(|_| TransportError::Closed)?;
		tracing::trace!(engine = %self.name, op, "engine.request");
		response.await.map_err(|_| TransportError::Closed)
	}

	fn subscribe_status(&self) -> broadcast::Receiver<String> {
		self.status.subscribe()
	}
}

enum HostState<E> {
	Ready(LoadedEngine<E>),
	Failed(String),
}

struct LoadedEngine<E> {
	engine: E,
	documents: HashMap<DocumentId, String>,
}

fn run_engine<E, L>(name: &str, loader: L, notifier: StatusNotifier, mut jobs: mpsc::UnboundedReceiver<Job>)
where
	E: AnalysisEngine,
	L: FnOnce(&StatusNotifier) -> std::result::Result<E, AnalysisError>,
{
	let started = Instant::now();
	let mut state = match catch_unwind(AssertUnwindSafe(|| loader(&notifier))) {
		Ok(Ok(engine)) => {
			tracing::info!(engine = name, elapsed_ms = started.elapsed().as_millis() as u64, "engine.ready");
			notifier.notify("Ready");
			HostState::Ready(LoadedEngine {
				engine,
				documents: HashMap::new(),
			})
		}
		Ok(Err(err)) => {
			tracing::error!(engine = name, error = %err, "engine.load_failed");
			notifier.notify(format!("Engine failed to load: {err}"));
			HostState::Failed(err.0)
		}
		Err(payload) => {
			let message = panic_message(payload.as_ref());
			tracing::error!(engine = name, panic = %message, "engine.load_panicked");
			notifier.notify(format!("Engine failed to load: {message}"));
			HostState::Failed(message)
		}
	};

	while let Some(Job { request, reply }) = jobs.blocking_recv() {
		let response = match &mut state {
			HostState::Ready(loaded) => loaded.handle(request),
			HostState::Failed(message) => EngineMessage::Error {
				message: format!("engine failed to initialize: {message}"),
			},
		};
		// The caller may have stopped waiting.
		let _ = reply.send(response);
	}
	tracing::debug!(engine = name, "engine.thread_exit");
}

impl<E: AnalysisEngine> LoadedEngine<E> {
	fn handle(&mut self, request: EngineRequest) -> EngineMessage {
		match request {
			EngineRequest::GetVersions => EngineMessage::Versions(self.engine.versions()),
			EngineRequest::GetFlags => EngineMessage::Flags(self.engine.flags()),
			EngineRequest::SyncDocument { document_id, text } => {
				self.documents.insert(document_id, text);
				EngineMessage::Ack
			}
			EngineRequest::RemoveDocument { document_id } => {
				self.documents.remove(&document_id);
				EngineMessage::Ack
			}
			EngineRequest::GetDiagnostics { document_id, options } => EngineMessage::Result {
				diagnostics: self.check(&document_id, &options),
			},
		}
	}

	fn check(&mut self, document_id: &DocumentId, options: &OptionSet) -> Option<Vec<Diagnostic>> {
		let Some(text) = self.documents.get(document_id) else {
			tracing::debug!(document = %document_id, "engine.document_missing");
			return None;
		};

		let started = Instant::now();
		let diagnostics = match catch_unwind(AssertUnwindSafe(|| self.engine.check(text, options))) {
			Ok(Ok(diagnostics)) => diagnostics.into_iter().map(Diagnostic::without_ansi).collect(),
			Ok(Err(err)) => {
				tracing::warn!(document = %document_id, error = %err, "engine.analysis_failed");
				vec![Diagnostic::engine_failure(err.0)]
			}
			Err(payload) => {
				let message = panic_message(payload.as_ref());
				tracing::warn!(document = %document_id, panic = %message, "engine.analysis_panicked");
				vec![Diagnostic::engine_failure(message)]
			}
		};
		tracing::debug!(
			document = %document_id,
			count = diagnostics.len(),
			elapsed_ms = started.elapsed().as_millis() as u64,
			"engine.analyzed"
		);
		Some(diagnostics)
	}
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
	if let Some(message) = payload.downcast_ref::<&str>() {
		(*message).to_string()
	} else if let Some(message) = payload.downcast_ref::<String>() {
		message.clone()
	} else {
		"engine panicked".to_string()
	}
}
