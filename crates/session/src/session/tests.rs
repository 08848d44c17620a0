use std::collections::HashMap;
use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use tokio::sync::broadcast;
use typepad_engine::protocol::{EngineMessage, EngineRequest};
use typepad_engine::{FlagDescriptor, Versions};

use super::*;
use crate::{Marker, Severity};

const ANALYSIS_TIME: Duration = Duration::from_millis(100);

/// Engine stand-in: reports every line containing `bad`, taking
/// [`ANALYSIS_TIME`] per analysis.
struct ScriptedEngine {
	requests: Mutex<Vec<EngineRequest>>,
	documents: Mutex<HashMap<DocumentId, String>>,
	status: broadcast::Sender<String>,
	unreachable: AtomicBool,
}

impl ScriptedEngine {
	fn new() -> Arc<Self> {
		Arc::new(Self {
			requests: Mutex::new(Vec::new()),
			documents: Mutex::new(HashMap::new()),
			status: broadcast::channel(16).0,
			unreachable: AtomicBool::new(false),
		})
	}

	/// Texts of the `syncDocument` requests seen, in order.
	fn analyzed(&self) -> Vec<String> {
		self.requests
			.lock()
			.iter()
			.filter_map(|request| match request {
				EngineRequest::SyncDocument { text, .. } => Some(text.clone()),
				_ => None,
			})
			.collect()
	}

	fn removed(&self) -> Vec<DocumentId> {
		self.requests
			.lock()
			.iter()
			.filter_map(|request| match request {
				EngineRequest::RemoveDocument { document_id } => Some(document_id.clone()),
				_ => None,
			})
			.collect()
	}

	fn analyze(text: &str, options: &OptionSet) -> Vec<Diagnostic> {
		let severity = if options.is_enabled("lenient") { 1 } else { 2 };
		text.lines()
			.enumerate()
			.filter_map(|(idx, line)| {
				let col = line.find("bad")? as u32;
				Some(Diagnostic {
					severity,
					line: idx as u32 + 1,
					col,
					end_line: idx as u32 + 1,
					end_col: col + 3,
					message: "bad thing".to_string(),
					details: None,
					name: "bad-thing".to_string(),
					method_name: None,
				})
			})
			.collect()
	}
}

#[async_trait]
impl EngineProxy for ScriptedEngine {
	async fn call(&self, request: EngineRequest) -> typepad_engine::Result<EngineMessage> {
		self.requests.lock().push(request.clone());
		match request {
			EngineRequest::GetVersions => Ok(EngineMessage::Versions(Versions {
				engine_runtime_version: "3.11".to_string(),
				analysis_engine_version: "1.0".to_string(),
			})),
			EngineRequest::GetFlags => Ok(EngineMessage::Flags(FlagCatalog {
				feature: vec![
					FlagDescriptor {
						name: "lenient".to_string(),
						flag: "--lenient".to_string(),
						default: false,
						description: String::new(),
					},
					FlagDescriptor {
						name: "strict-none".to_string(),
						flag: "--strict-none".to_string(),
						default: true,
						description: String::new(),
					},
				],
				experimental: Vec::new(),
			})),
			EngineRequest::SyncDocument { document_id, text } => {
				self.documents.lock().insert(document_id, text);
				Ok(EngineMessage::Ack)
			}
			EngineRequest::RemoveDocument { document_id } => {
				self.documents.lock().remove(&document_id);
				Ok(EngineMessage::Ack)
			}
			EngineRequest::GetDiagnostics { document_id, options } => {
				tokio::time::sleep(ANALYSIS_TIME).await;
				if self.unreachable.load(Ordering::SeqCst) {
					return Err(TransportError::Closed);
				}
				let text = self.documents.lock().get(&document_id).cloned();
				Ok(EngineMessage::Result {
					diagnostics: text.map(|text| Self::analyze(&text, &options)),
				})
			}
		}
	}

	fn subscribe_status(&self) -> broadcast::Receiver<String> {
		self.status.subscribe()
	}
}

#[derive(Debug, Clone, PartialEq)]
enum Shown {
	Markers(DocumentId, Vec<Marker>),
	Cleared(DocumentId),
	Failure(DocumentId, String),
	Status(String),
}

#[derive(Default)]
struct RecordingSink {
	shown: Mutex<Vec<Shown>>,
}

impl RecordingSink {
	fn take(&self) -> Vec<Shown> {
		std::mem::take(&mut *self.shown.lock())
	}

	/// Everything except status lines.
	fn take_markers(&self) -> Vec<Shown> {
		self.take().into_iter().filter(|shown| !matches!(shown, Shown::Status(_))).collect()
	}
}

impl MarkerSink for RecordingSink {
	fn set_markers(&self, document: &DocumentId, markers: Vec<Marker>) {
		self.shown.lock().push(Shown::Markers(document.clone(), markers));
	}

	fn clear_markers(&self, document: &DocumentId) {
		self.shown.lock().push(Shown::Cleared(document.clone()));
	}

	fn show_failure(&self, document: &DocumentId, error: &dyn Error) {
		self.shown.lock().push(Shown::Failure(document.clone(), error.to_string()));
	}

	fn show_status(&self, status: StatusLine) {
		self.shown.lock().push(Shown::Status(status.text().to_string()));
	}
}

fn session() -> (Session<ScriptedEngine>, Arc<ScriptedEngine>, Arc<RecordingSink>) {
	let engine = ScriptedEngine::new();
	let sink = Arc::new(RecordingSink::default());
	let session = Session::new(Arc::clone(&engine), sink.clone(), SessionConfig::default());
	(session, engine, sink)
}

fn main_doc() -> DocumentId {
	DocumentId::new("file:///main.py")
}

async fn settle(ms: u64) {
	tokio::time::sleep(Duration::from_millis(ms)).await;
}

fn lines(shown: &[Shown]) -> Vec<Vec<u32>> {
	shown
		.iter()
		.filter_map(|shown| match shown {
			Shown::Markers(_, markers) => Some(markers.iter().map(|marker| marker.line).collect()),
			_ => None,
		})
		.collect()
}

#[tokio::test(start_paused = true)]
async fn open_validates_immediately_and_writes_link() {
	let (session, engine, sink) = session();
	session.open(main_doc(), "x = 1\ny = bad\n");

	let fragment = session.fragment().get();
	assert!(fragment.starts_with("code="), "{fragment}");
	let restored = load_initial(&fragment, &SessionConfig::default());
	assert_eq!(restored.text, "x = 1\ny = bad\n");

	settle(150).await;
	let shown = sink.take();
	assert_eq!(lines(&shown), vec![vec![2]]);
	assert!(shown.contains(&Shown::Status("Type checking found 1 issue:\n2:5: error: bad thing [bad-thing]".to_string())));
	assert_eq!(engine.analyzed(), vec!["x = 1\ny = bad\n".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn edit_burst_validates_once_with_final_text() {
	let (session, engine, sink) = session();
	let doc = main_doc();
	session.open(doc.clone(), "");
	settle(150).await;
	sink.take();

	session.edit(&doc, "bad");
	settle(100).await;
	session.edit(&doc, "ok\nbad");
	settle(100).await;
	session.edit(&doc, "ok\nok\nbad");
	settle(250).await;
	session.edit(&doc, "ok\nok\nok\nbad");

	// 450ms after the first edit; the last edit re-armed the timer.
	settle(499).await;
	assert_eq!(engine.analyzed().len(), 1);

	settle(ANALYSIS_TIME.as_millis() as u64 + 10).await;
	assert_eq!(engine.analyzed().last().map(String::as_str), Some("ok\nok\nok\nbad"));
	assert_eq!(engine.analyzed().len(), 2);
	assert_eq!(lines(&sink.take()), vec![vec![4]]);
}

#[tokio::test(start_paused = true)]
async fn stale_result_is_dropped() {
	let (session, _engine, sink) = session();
	let doc = main_doc();
	session.open(doc.clone(), "bad");

	// The first analysis is in flight when the edit lands.
	settle(50).await;
	session.edit(&doc, "ok\nbad");
	settle(50 + 500 + 100 + 10).await;

	assert_eq!(lines(&sink.take()), vec![vec![2]]);
}

#[tokio::test(start_paused = true)]
async fn close_clears_markers_and_ignores_late_results() {
	let (session, engine, sink) = session();
	let doc = main_doc();
	session.open(doc.clone(), "bad");
	settle(50).await;

	session.close(&doc);
	assert!(!session.is_open(&doc));
	settle(1000).await;

	assert_eq!(sink.take_markers(), vec![Shown::Cleared(doc.clone())]);
	assert_eq!(engine.removed(), vec![doc.clone()]);

	// Closing twice is harmless.
	session.close(&doc);
	assert_eq!(sink.take_markers(), Vec::new());
}

#[tokio::test(start_paused = true)]
async fn pending_validation_never_fires_after_close() {
	let (session, engine, sink) = session();
	let doc = main_doc();
	session.open(doc.clone(), "ok");
	settle(150).await;
	sink.take();

	session.edit(&doc, "bad");
	session.close(&doc);
	settle(2000).await;

	assert_eq!(engine.analyzed(), vec!["ok".to_string()]);
	assert_eq!(sink.take_markers(), vec![Shown::Cleared(doc)]);
}

#[tokio::test(start_paused = true)]
async fn transport_failure_is_shown_and_pipeline_recovers() {
	let (session, engine, sink) = session();
	let doc = main_doc();
	engine.unreachable.store(true, Ordering::SeqCst);
	session.open(doc.clone(), "bad");
	settle(150).await;

	let shown = sink.take();
	assert!(shown.contains(&Shown::Failure(doc.clone(), "engine connection closed".to_string())), "{shown:?}");
	assert!(shown.contains(&Shown::Status("Type checking failed: engine connection closed".to_string())));

	engine.unreachable.store(false, Ordering::SeqCst);
	session.edit(&doc, "bad");
	settle(700).await;
	assert_eq!(lines(&sink.take()), vec![vec![1]]);
}

fn published(shown: &[Shown]) -> Vec<&DocumentId> {
	shown
		.iter()
		.filter_map(|shown| match shown {
			Shown::Markers(id, _) => Some(id),
			_ => None,
		})
		.collect()
}

/// Marker lines of the last update shown for `id`.
fn last_lines(shown: &[Shown], id: &DocumentId) -> Option<Vec<u32>> {
	shown.iter().rev().find_map(|shown| match shown {
		Shown::Markers(shown_id, markers) if shown_id == id => Some(markers.iter().map(|marker| marker.line).collect()),
		_ => None,
	})
}

#[tokio::test(start_paused = true)]
async fn document_losing_its_queue_slot_is_validated_later() {
	let (session, engine, sink) = session();
	let a = DocumentId::new("a");
	let b = DocumentId::new("b");
	let c = DocumentId::new("c");

	session.open(a.clone(), "bad a");
	session.open(b.clone(), "bad b");
	session.open(c.clone(), "bad c");
	settle(500).await;

	let shown = sink.take_markers();
	assert!(!shown.iter().any(|shown| matches!(shown, Shown::Failure(..))), "{shown:?}");
	assert_eq!(published(&shown), vec![&a, &c, &b]);
	assert_eq!(engine.analyzed(), vec!["bad a".to_string(), "bad c".to_string(), "bad b".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn every_document_ends_at_its_latest_text() {
	let (session, _engine, sink) = session();
	let a = DocumentId::new("a");
	let b = DocumentId::new("b");
	let c = DocumentId::new("c");
	session.open(a.clone(), "ok");
	session.open(b.clone(), "bad");
	session.open(c.clone(), "ok");
	settle(500).await;
	assert_eq!(last_lines(&sink.take(), &b), Some(vec![1]));

	session.edit(&a, "ok
ok");
	settle(10).await;
	session.edit(&b, "ok
bad");
	settle(10).await;
	session.edit(&c, "ok
ok");
	settle(1000).await;

	let shown = sink.take();
	assert_eq!(last_lines(&shown, &a), Some(vec![]));
	assert_eq!(last_lines(&shown, &b), Some(vec![2]));
	assert_eq!(last_lines(&shown, &c), Some(vec![]));
}

#[tokio::test(start_paused = true)]
async fn option_change_revalidates_every_open_document() {
	let (session, _engine, sink) = session();
	session.load_flags().await.unwrap();
	let ids: Vec<DocumentId> = ["a", "b", "c", "d"].into_iter().map(DocumentId::new).collect();
	for id in &ids {
		session.open(id.clone(), "bad");
	}
	settle(1000).await;
	sink.take();

	session.set_option("lenient", true);
	settle(2000).await;

	let shown = sink.take();
	for id in &ids {
		let severity = shown.iter().rev().find_map(|shown| match shown {
			Shown::Markers(shown_id, markers) if shown_id == id => Some(markers[0].severity),
			_ => None,
		});
		assert_eq!(severity, Some(Severity::Warning), "{id}");
	}
}

#[tokio::test(start_paused = true)]
async fn option_change_revalidates_with_new_options() {
	let (session, _engine, sink) = session();
	session.load_flags().await.unwrap();
	session.open(main_doc(), "bad");
	settle(150).await;
	sink.take();

	session.set_option("lenient", true);
	settle(700).await;

	let shown = sink.take_markers();
	match shown.as_slice() {
		[Shown::Markers(_, markers)] => assert_eq!(markers[0].severity, Severity::Warning),
		other => panic!("expected one marker update, got {other:?}"),
	}
	let fragment = session.fragment().get();
	assert!(fragment.contains("&lenient=true&"), "{fragment}");
}

#[tokio::test(start_paused = true)]
async fn unchanged_option_does_nothing() {
	let (session, engine, _sink) = session();
	session.load_flags().await.unwrap();
	session.open(main_doc(), "bad");
	settle(150).await;

	session.set_option("lenient", false);
	settle(1000).await;
	assert_eq!(engine.analyzed().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn share_link_keeps_foreign_keys_and_default_overrides() {
	let (session, _engine, _sink) = session();
	session.load_flags().await.unwrap();
	session.restore("#theme=dark&strict-none=false&bogus=true");
	assert_eq!(session.options().get("strict-none"), Some(false));
	assert_eq!(session.options().get("bogus"), None);

	session.open(main_doc(), "print(1)");
	let fragment = session.fragment().get();
	let code = typepad_state::encode("print(1)");
	assert_eq!(fragment, format!("theme=dark&bogus=true&code={code}&strict-none=false"));
}

#[tokio::test(start_paused = true)]
async fn share_link_is_debounced() {
	let (session, _engine, _sink) = session();
	let doc = main_doc();
	session.open(doc.clone(), "a");
	let opened = session.fragment().get();

	session.edit(&doc, "ab");
	settle(100).await;
	session.edit(&doc, "abc");
	settle(400).await;
	assert_eq!(session.fragment().get(), opened);

	settle(200).await;
	assert_eq!(load_initial(&session.fragment().get(), session.config()).text, "abc");
}

#[tokio::test(start_paused = true)]
async fn closing_the_linked_document_hands_the_link_on() {
	let (session, _engine, _sink) = session();
	let first = DocumentId::new("first");
	let second = DocumentId::new("second");
	let third = DocumentId::new("third");
	session.open(first.clone(), "first");
	session.open(second.clone(), "second");
	session.open(third.clone(), "third");

	session.close(&first);
	let linked = || load_initial(&session.fragment().get(), session.config()).text;
	assert_eq!(linked(), "second");

	session.edit(&second, "second, edited");
	session.edit(&third, "third, edited");
	settle(600).await;
	assert_eq!(linked(), "second, edited");

	session.close(&third);
	session.close(&second);
	assert_eq!(linked(), "second, edited");
}

#[tokio::test(start_paused = true)]
async fn unknown_link_options_are_dropped_once_flags_load() {
	let (session, engine, _sink) = session();
	session.restore("#bogus=true&lenient=true");
	assert_eq!(session.options().get("bogus"), Some(true));

	session.load_flags().await.unwrap();
	assert_eq!(session.options().get("bogus"), None);
	assert_eq!(session.options().get("lenient"), Some(true));

	session.open(main_doc(), "bad");
	settle(150).await;
	let sent: Vec<OptionSet> = engine
		.requests
		.lock()
		.iter()
		.filter_map(|request| match request {
			EngineRequest::GetDiagnostics { options, .. } => Some(options.clone()),
			_ => None,
		})
		.collect();
	assert_eq!(sent.len(), 1);
	assert_eq!(sent[0].get("bogus"), None);
	assert!(session.fragment().get().starts_with("bogus=true&"));
}

#[tokio::test(start_paused = true)]
async fn engine_status_reaches_the_sink() {
	let (_session, engine, sink) = session();
	engine.status.send("Preparing engine...".to_string()).unwrap();
	settle(1).await;
	assert_eq!(sink.take(), vec![Shown::Status("Preparing engine...".to_string())]);
}

#[test]
fn initial_state_falls_back_to_default_source() {
	let config = SessionConfig::default();

	let empty = load_initial("", &config);
	assert_eq!((empty.text.as_str(), empty.shared), (config.default_source.as_str(), false));

	let corrupt = load_initial("#code=%21%21corrupt&lenient=true", &config);
	assert_eq!(corrupt.text, config.default_source);
	assert_eq!(corrupt.options.get("lenient"), Some(true));

	let shared = load_initial(&format!("#code={}", typepad_state::encode("x=1")), &config);
	assert_eq!((shared.text.as_str(), shared.shared), ("x=1", true));
}
