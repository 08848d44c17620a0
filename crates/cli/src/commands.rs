use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, bail};
use tokio::sync::mpsc;
use typepad_engine::{EngineProxy, ProcessClient};
use typepad_session::{Marker, MarkerSink, Session, SessionConfig, Severity, StatusLine, load_initial};
use typepad_state::{DocumentId, OptionSet, UrlState};

/// `#code=...` fragment for a file, or stdin when no file is given.
pub fn encode(file: Option<&Path>, options: &[(String, bool)]) -> anyhow::Result<String> {
	let text = match file {
		Some(path) => std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?,
		None => std::io::read_to_string(std::io::stdin()).context("reading stdin")?,
	};
	Ok(fragment_for(&text, options))
}

pub fn fragment_for(text: &str, options: &[(String, bool)]) -> String {
	let options: OptionSet = options.iter().map(|(name, value)| (name.as_str(), *value)).collect();
	format!("#{}", UrlState::capture(text, options).to_fragment())
}

/// Text carried by `fragment` (or the default source), followed by the
/// options found in it.
pub fn decode(fragment: &str, config: &SessionConfig) -> String {
	let initial = load_initial(fragment, config);
	let mut out = initial.text;
	if !out.ends_with('\n') {
		out.push('\n');
	}
	if !initial.shared {
		tracing::info!("link carries no usable code, showing the default source");
	}
	if !initial.options.is_empty() {
		out.push_str("--- options\n");
		for (name, value) in initial.options.iter() {
			out.push_str(&format!("{name}={value}\n"));
		}
	}
	out
}

fn engine_command(cli: &[String], config: &SessionConfig) -> anyhow::Result<Vec<String>> {
	if !cli.is_empty() {
		return Ok(cli.to_vec());
	}
	match &config.engine_command {
		Some(command) if !command.is_empty() => Ok(command.clone()),
		_ => bail!("no engine command: pass one after `--` or set `engine_command` in the config"),
	}
}

fn start_engine(cli: &[String], config: &SessionConfig) -> anyhow::Result<ProcessClient> {
	let command = engine_command(cli, config)?;
	ProcessClient::spawn(&command).with_context(|| format!("starting engine `{}`", command.join(" ")))
}

enum Report {
	Markers(Vec<Marker>),
	Failure(String),
}

/// Prints status lines to stderr and hands the first validation outcome
/// back to [`check`].
struct ReportSink {
	reports: mpsc::UnboundedSender<Report>,
}

impl MarkerSink for ReportSink {
	fn set_markers(&self, _document: &DocumentId, markers: Vec<Marker>) {
		let _ = self.reports.send(Report::Markers(markers));
	}

	fn clear_markers(&self, _document: &DocumentId) {}

	fn show_failure(&self, _document: &DocumentId, error: &dyn std::error::Error) {
		let _ = self.reports.send(Report::Failure(error.to_string()));
	}

	fn show_status(&self, status: StatusLine) {
		eprintln!("{status}");
	}
}

/// Validates `file` once through a full session. Exits with status 1 when
/// any error is reported.
pub async fn check(file: &Path, options: &[(String, bool)], engine: &[String], config: SessionConfig) -> anyhow::Result<ExitCode> {
	let text = std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
	let engine = Arc::new(start_engine(engine, &config)?);

	let (reports, mut outcome) = mpsc::unbounded_channel();
	let session = Session::new(Arc::clone(&engine), Arc::new(ReportSink { reports }), config);

	let versions = engine.versions().await.context("engine did not initialize")?;
	eprintln!("engine {} on runtime {}", versions.analysis_engine_version, versions.engine_runtime_version);
	session.load_flags().await.context("fetching engine flags")?;
	for (name, value) in options {
		session.set_option(name, *value);
	}

	let id = DocumentId::new(file.display().to_string());
	session.open(id.clone(), text);
	let report = outcome.recv().await.context("session ended without a result")?;
	session.close(&id);

	match report {
		Report::Markers(markers) => {
			for marker in &markers {
				println!("{}:{}", file.display(), marker.render());
			}
			let failed = markers.iter().any(|marker| marker.severity == Severity::Error);
			Ok(if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS })
		}
		Report::Failure(message) => bail!("type checking failed: {message}"),
	}
}

pub async fn flags(engine: &[String], config: &SessionConfig) -> anyhow::Result<()> {
	let engine = start_engine(engine, config)?;
	let catalog = engine.flags().await.context("fetching engine flags")?;

	for (title, flags) in [("feature", &catalog.feature), ("experimental", &catalog.experimental)] {
		println!("{title} flags:");
		for flag in flags {
			println!("  {} ({}, default {}): {}", flag.flag, flag.name, flag.default, flag.description);
		}
	}
	Ok(())
}
