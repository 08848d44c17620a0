//! Validation pipeline.
//!
//! Every open document is a subject owning two debouncers: one for
//! validation and one for the share link. Settled edits are submitted to a
//! single session-wide [`RequestScheduler`], so the engine sees at most one
//! request at a time and only the newest pending snapshot survives.
//!
//! Results are published only when the document is still open and still at
//! the version the request was built from. A document whose newest snapshot
//! was superseded by another document's request is resubmitted once the
//! scheduler finishes its current request.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use typepad_engine::{Diagnostic, EngineProxy, FlagCatalog, TransportError};
use typepad_state::{DocumentId, EditSnapshot, OptionSet, UrlState};
use typepad_worker::{Debouncer, RequestScheduler, ScheduleError, SchedulerPhase, TaskClass};

use crate::markers::markers_from;
use crate::{FragmentStore, MarkerSink, SessionConfig, StatusLine};

type Validation = Option<Vec<Diagnostic>>;

/// Text and options a session starts from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialState {
	pub text: String,
	pub options: OptionSet,
	/// True when the text came from the fragment rather than the default.
	pub shared: bool,
}

/// Reads the initial text and options from a share link fragment.
///
/// Falls back to the configured default source when the fragment has no
/// usable `code`.
pub fn load_initial(fragment: &str, config: &SessionConfig) -> InitialState {
	let url = UrlState::from_fragment(fragment);
	match url.source() {
		Some(text) => InitialState {
			text,
			options: url.options,
			shared: true,
		},
		None => {
			if url.code.is_some() {
				tracing::warn!("session.undecodable_link");
			}
			InitialState {
				text: config.default_source.clone(),
				options: url.options,
				shared: false,
			}
		}
	}
}

struct Document {
	/// Open order; the earliest open document backs the share link.
	order: u64,
	version: u64,
	text: Arc<str>,
	/// Newest snapshot lost its queue slot to another document.
	resubmit: bool,
	validation: Debouncer,
	share: Debouncer,
}

impl Document {
	fn new(order: u64, version: u64, text: Arc<str>) -> Self {
		Self {
			order,
			version,
			text,
			resubmit: false,
			validation: Debouncer::new(TaskClass::Interactive),
			share: Debouncer::new(TaskClass::Background),
		}
	}

	fn dispose(&mut self) {
		self.validation.dispose();
		self.share.dispose();
	}
}

#[derive(Default)]
struct SessionState {
	documents: HashMap<DocumentId, Document>,
	options: OptionSet,
	defaults: OptionSet,
	/// Document whose text goes into the share link.
	primary: Option<DocumentId>,
	next_order: u64,
}

impl SessionState {
	/// Earliest opened document, if any is open.
	fn first_open(&self) -> Option<DocumentId> {
		self.documents.iter().min_by_key(|(_, doc)| doc.order).map(|(id, _)| id.clone())
	}
}

struct SessionInner<P> {
	engine: Arc<P>,
	sink: Arc<dyn MarkerSink>,
	config: SessionConfig,
	fragment: FragmentStore,
	scheduler: RequestScheduler<EditSnapshot, Validation, TransportError>,
	state: Mutex<SessionState>,
}

/// Editing session bound to one engine.
///
/// Must be created inside a Tokio runtime.
pub struct Session<P> {
	inner: Arc<SessionInner<P>>,
}

impl<P: EngineProxy + 'static> Session<P> {
	pub fn new(engine: Arc<P>, sink: Arc<dyn MarkerSink>, config: SessionConfig) -> Self {
		let inner = Arc::new_cyclic(|weak: &Weak<SessionInner<P>>| {
			let weak = weak.clone();
			let scheduler = RequestScheduler::new("validation", TaskClass::Interactive, move |snapshot: EditSnapshot| {
				let weak = weak.clone();
				async move {
					match weak.upgrade() {
						Some(inner) => inner.analyze(snapshot).await,
						None => Ok(None),
					}
				}
			});
			SessionInner {
				engine,
				sink,
				config,
				fragment: FragmentStore::default(),
				scheduler,
				state: Mutex::new(SessionState::default()),
			}
		});
		forward_status(&inner);
		Self { inner }
	}

	pub fn engine(&self) -> &Arc<P> {
		&self.inner.engine
	}

	pub fn config(&self) -> &SessionConfig {
		&self.inner.config
	}

	/// Share link fragment kept up to date by the session.
	pub fn fragment(&self) -> FragmentStore {
		self.inner.fragment.clone()
	}

	pub fn options(&self) -> OptionSet {
		self.inner.state.lock().options.clone()
	}

	pub fn is_open(&self, id: &DocumentId) -> bool {
		self.inner.is_open(id)
	}

	/// Current version of an open document.
	pub fn version(&self, id: &DocumentId) -> Option<u64> {
		self.inner.state.lock().documents.get(id).map(|doc| doc.version)
	}

	/// Fetches the engine's flag catalog, drops options it does not know
	/// and adopts its defaults for every option not set yet.
	pub async fn load_flags(&self) -> Result<FlagCatalog, TransportError> {
		let catalog = self.inner.engine.flags().await?;
		let defaults = catalog.defaults();

		let mut state = self.inner.state.lock();
		state.options.retain_known(&defaults);
		for (name, value) in defaults.iter() {
			if !state.options.contains(name) {
				state.options.set(name, value);
			}
		}
		tracing::debug!(count = defaults.len(), "session.flags_loaded");
		state.defaults = defaults;
		Ok(catalog)
	}

	/// Adopts `fragment` as the current share link and applies its options.
	///
	/// Once flags are loaded, options the engine does not know are ignored.
	pub fn restore(&self, fragment: &str) -> InitialState {
		let mut initial = load_initial(fragment, &self.inner.config);
		self.inner.fragment.set(fragment.strip_prefix('#').unwrap_or(fragment).to_string());

		let mut state = self.inner.state.lock();
		if !state.defaults.is_empty() {
			initial.options.retain_known(&state.defaults);
		}
		state.options.extend_from(&initial.options);
		tracing::debug!(shared = initial.shared, options = initial.options.len(), "session.restore");
		initial
	}

	/// Opens a document, validates it right away and writes the share link.
	///
	/// Reopening an open document replaces it.
	pub fn open(&self, id: impl Into<DocumentId>, text: impl Into<Arc<str>>) {
		let id = id.into();
		{
			let mut state = self.inner.state.lock();
			let (order, version) = match state.documents.remove(&id) {
				Some(mut previous) => {
					previous.dispose();
					(previous.order, previous.version + 1)
				}
				None => {
					state.next_order += 1;
					(state.next_order, 1)
				}
			};
			state.documents.insert(id.clone(), Document::new(order, version, text.into()));
			if state.primary.is_none() {
				state.primary = Some(id.clone());
			}
		}
		tracing::debug!(document = %id, "session.open");
		self.inner.validate(&id);
		self.inner.write_share_link();
	}

	/// Records new text and re-arms validation and the share link.
	pub fn edit(&self, id: &DocumentId, text: impl Into<Arc<str>>) {
		let mut state = self.inner.state.lock();
		let Some(doc) = state.documents.get_mut(id) else {
			tracing::debug!(document = %id, "session.edit_closed");
			return;
		};
		doc.version += 1;
		doc.text = text.into();
		tracing::trace!(document = %id, version = doc.version, "session.edit");
		self.inner.arm_validation(id, doc);
		self.inner.arm_share(doc);
	}

	/// Changes one option and revalidates every open document.
	pub fn set_option(&self, name: &str, value: bool) {
		let mut state = self.inner.state.lock();
		if state.options.set(name, value) == Some(value) {
			return;
		}
		tracing::debug!(option = name, value, "session.set_option");

		let SessionState { documents, primary, .. } = &mut *state;
		for (id, doc) in documents.iter_mut() {
			doc.version += 1;
			self.inner.arm_validation(id, doc);
		}
		if let Some(doc) = primary.as_ref().and_then(|id| documents.get_mut(id)) {
			self.inner.arm_share(doc);
		}
	}

	/// Closes a document: pending timers never fire, its markers are
	/// cleared, late results are ignored and the engine forgets it.
	///
	/// Closing the share link's document hands the link to the earliest
	/// opened document still open.
	pub fn close(&self, id: &DocumentId) {
		let promoted = {
			let mut state = self.inner.state.lock();
			let Some(mut doc) = state.documents.remove(id) else {
				return;
			};
			doc.dispose();
			self.inner.sink.clear_markers(id);
			if state.primary.as_ref() == Some(id) {
				state.primary = state.first_open();
				state.primary.clone()
			} else {
				None
			}
		};
		tracing::debug!(document = %id, "session.close");
		if let Some(primary) = promoted {
			tracing::debug!(document = %primary, "session.share_primary");
			self.inner.write_share_link();
		}

		let engine = Arc::clone(&self.inner.engine);
		let id = id.clone();
		typepad_worker::spawn(TaskClass::Background, async move {
			if let Err(err) = engine.remove_document(&id).await {
				tracing::debug!(document = %id, error = %err, "session.remove_failed");
			}
		});
	}
}

impl<P: EngineProxy + 'static> SessionInner<P> {
	fn is_open(&self, id: &DocumentId) -> bool {
		self.state.lock().documents.contains_key(id)
	}

	/// Scheduler dispatch: sync the snapshot's text, then analyze it.
	async fn analyze(&self, snapshot: EditSnapshot) -> Result<Validation, TransportError> {
		if !self.is_open(&snapshot.document_id) {
			tracing::debug!(document = %snapshot.document_id, "session.skip_closed");
			return Ok(None);
		}
		self.engine.sync_document(&snapshot.document_id, &snapshot.text).await?;
		self.engine.diagnostics(&snapshot.document_id, &snapshot.options).await
	}

	fn arm_validation(self: &Arc<Self>, id: &DocumentId, doc: &mut Document) {
		let weak = Arc::downgrade(self);
		let id = id.clone();
		doc.validation.trigger(self.config.validate_delay(), async move {
			if let Some(inner) = weak.upgrade() {
				inner.validate(&id);
			}
		});
	}

	fn arm_share(self: &Arc<Self>, doc: &mut Document) {
		let weak = Arc::downgrade(self);
		doc.share.trigger(self.config.share_delay(), async move {
			if let Some(inner) = weak.upgrade() {
				inner.write_share_link();
			}
		});
	}

	/// Submits the document's current snapshot and publishes the outcome
	/// when it arrives.
	fn validate(self: &Arc<Self>, id: &DocumentId) {
		let snapshot = {
			let mut state = self.state.lock();
			let options = state.options.clone();
			let Some(doc) = state.documents.get_mut(id) else {
				return;
			};
			doc.resubmit = false;
			EditSnapshot::new(id.clone(), doc.version, Arc::clone(&doc.text), options)
		};
		let version = snapshot.version;
		tracing::debug!(document = %id, version, "session.validate");

		let outcome = self.scheduler.submit(snapshot);
		let weak = Arc::downgrade(self);
		let id = id.clone();
		typepad_worker::spawn(TaskClass::Interactive, async move {
			let outcome = outcome.await;
			if let Some(inner) = weak.upgrade() {
				inner.publish(&id, version, outcome);
			}
		});
	}

	fn publish(self: &Arc<Self>, id: &DocumentId, version: u64, outcome: Result<Validation, ScheduleError<TransportError>>) {
		if matches!(&outcome, Err(err) if err.is_superseded()) {
			self.mark_superseded(id, version);
		} else {
			self.show(id, version, outcome);
			self.resubmit_next();
		}
	}

	/// Flags the document for resubmission when the superseded snapshot
	/// was its newest one. An older snapshot is covered by the newer one.
	fn mark_superseded(self: &Arc<Self>, id: &DocumentId, version: u64) {
		{
			let mut state = self.state.lock();
			let Some(doc) = state.documents.get_mut(id).filter(|doc| doc.version == version) else {
				tracing::debug!(document = %id, version, "session.superseded");
				return;
			};
			tracing::debug!(document = %id, version, "session.superseded_by_other");
			doc.resubmit = true;
		}
		if self.scheduler.phase() == SchedulerPhase::Idle {
			self.resubmit_next();
		}
	}

	/// Resubmits the earliest opened document that lost its slot.
	fn resubmit_next(self: &Arc<Self>) {
		let next = {
			let state = self.state.lock();
			state
				.documents
				.iter()
				.filter(|(_, doc)| doc.resubmit)
				.min_by_key(|(_, doc)| doc.order)
				.map(|(id, _)| id.clone())
		};
		if let Some(id) = next {
			self.validate(&id);
		}
	}

	fn show(&self, id: &DocumentId, version: u64, outcome: Result<Validation, ScheduleError<TransportError>>) {
		let diagnostics = match outcome {
			Ok(Some(diagnostics)) => diagnostics,
			Ok(None) => {
				tracing::debug!(document = %id, version, "session.no_result");
				return;
			}
			Err(err) => {
				let state = self.state.lock();
				if state.documents.contains_key(id) {
					tracing::warn!(document = %id, version, error = %err, "session.validation_failed");
					self.sink.show_failure(id, &err);
					self.sink.show_status(StatusLine::failed(&err));
				}
				return;
			}
		};

		let markers = markers_from(&diagnostics);
		let state = self.state.lock();
		match state.documents.get(id) {
			Some(doc) if doc.version == version => {
				tracing::debug!(document = %id, version, count = markers.len(), "session.publish");
				self.sink.show_status(StatusLine::found(&markers));
				self.sink.set_markers(id, markers);
			}
			Some(doc) => tracing::debug!(document = %id, version, current = doc.version, "session.stale_result"),
			None => tracing::debug!(document = %id, version, "session.closed_result"),
		}
	}

	/// Merges the primary document and the options that differ from their
	/// defaults into the fragment store.
	fn write_share_link(&self) {
		let state = self.state.lock();
		let Some(doc) = state.primary.as_ref().and_then(|id| state.documents.get(id)) else {
			return;
		};
		let url = UrlState::capture(&doc.text, state.options.overrides(&state.defaults));
		let fragment = url.merge_into(&self.fragment.get(), state.options.names().chain(state.defaults.names()));
		tracing::trace!(len = fragment.len(), "session.share_link");
		self.fragment.set(fragment);
	}
}

/// Relays engine status notifications to the sink until the engine's
/// status channel closes.
fn forward_status<P: EngineProxy + 'static>(inner: &Arc<SessionInner<P>>) {
	let mut status = inner.engine.subscribe_status();
	let sink = Arc::clone(&inner.sink);
	typepad_worker::spawn(TaskClass::Background, async move {
		loop {
			match status.recv().await {
				Ok(text) => sink.show_status(StatusLine::new(text)),
				Err(RecvError::Lagged(skipped)) => tracing::debug!(skipped, "session.status_lagged"),
				Err(RecvError::Closed) => break,
			}
		}
	});
}

#[cfg(test)]
mod tests;
