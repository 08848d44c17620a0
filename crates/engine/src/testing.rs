//! Deterministic engine used by this crate's tests.

use std::sync::mpsc;

use typepad_state::OptionSet;

use crate::{AnalysisEngine, AnalysisError, Diagnostic, ERROR_SEVERITY, EngineHost, FlagCatalog, FlagDescriptor, StatusNotifier, Versions};

/// Reports every line containing `bad` (an error, or a warning when the
/// `lenient` option is on). Text containing `crash` fails analysis and text
/// containing `panic` panics.
pub(crate) struct FakeEngine;

impl AnalysisEngine for FakeEngine {
	fn versions(&self) -> Versions {
		Versions {
			engine_runtime_version: "3.11.4".to_string(),
			analysis_engine_version: "2024.4.11".to_string(),
		}
	}

	fn flags(&self) -> FlagCatalog {
		FlagCatalog {
			feature: vec![FlagDescriptor {
				name: "lenient".to_string(),
				flag: "--lenient".to_string(),
				default: false,
				description: "Report findings as warnings".to_string(),
			}],
			experimental: Vec::new(),
		}
	}

	fn check(&mut self, text: &str, options: &OptionSet) -> Result<Vec<Diagnostic>, AnalysisError> {
		if text.contains("crash") {
			return Err("\u{1b}[31manalyzer crashed\u{1b}[0m".into());
		}
		if text.contains("panic") {
			panic!("analyzer panicked");
		}
		let severity = if options.is_enabled("lenient") { 1 } else { ERROR_SEVERITY };
		Ok(text
			.lines()
			.enumerate()
			.filter_map(|(idx, line)| {
				let col = line.find("bad")? as u32;
				Some(Diagnostic {
					severity,
					line: idx as u32 + 1,
					col,
					end_line: idx as u32 + 1,
					end_col: col + 3,
					message: "\u{1b}[1mbad\u{1b}[0m thing".to_string(),
					details: None,
					name: "bad-thing".to_string(),
					method_name: None,
				})
			})
			.collect())
	}
}

/// Host whose loader blocks until the returned sender fires (or is dropped).
pub(crate) fn gated_host() -> (EngineHost, mpsc::Sender<()>) {
	let (release, gate) = mpsc::channel::<()>();
	let host = EngineHost::spawn("fake-engine", move |status: &StatusNotifier| {
		let _ = gate.recv();
		status.notify("Preparing engine...");
		Ok(FakeEngine)
	})
	.unwrap();
	(host, release)
}

/// Host that loads immediately.
pub(crate) fn ready_host() -> EngineHost {
	EngineHost::spawn("fake-engine", |_: &StatusNotifier| Ok(FakeEngine)).unwrap()
}
