//! Wire protocol between the orchestration layer and the engine.
//!
//! Frames are single-line JSON objects terminated by `\n`. Requests are
//! tagged by `op`, responses by `kind`. Every request receives exactly one
//! terminal response; any number of `notify` frames may precede it.

use serde::{Deserialize, Serialize};
use typepad_state::{DocumentId, OptionSet};

use crate::{Diagnostic, FlagCatalog, Versions};

/// Request sent to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum EngineRequest {
	GetVersions,
	GetFlags,
	#[serde(rename_all = "camelCase")]
	GetDiagnostics { document_id: DocumentId, options: OptionSet },
	/// Replaces the engine's copy of a document.
	#[serde(rename_all = "camelCase")]
	SyncDocument { document_id: DocumentId, text: String },
	/// Forgets a document; later `getDiagnostics` for it yield no result.
	#[serde(rename_all = "camelCase")]
	RemoveDocument { document_id: DocumentId },
}

impl EngineRequest {
	/// Wire name of this request.
	pub const fn op(&self) -> &'static str {
		match self {
			Self::GetVersions => "getVersions",
			Self::GetFlags => "getFlags",
			Self::GetDiagnostics { .. } => "getDiagnostics",
			Self::SyncDocument { .. } => "syncDocument",
			Self::RemoveDocument { .. } => "removeDocument",
		}
	}
}

/// Message received from the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum EngineMessage {
	/// Informational status text (loading progress). Never terminal.
	Notify { text: String },
	Versions(Versions),
	Flags(FlagCatalog),
	/// Diagnostics for a document; `None` when the document no longer exists.
	Result {
		#[serde(default)]
		diagnostics: Option<Vec<Diagnostic>>,
	},
	/// The request could not be served.
	Error { message: String },
	/// Acknowledges `syncDocument` and `removeDocument`.
	Ack,
}

impl EngineMessage {
	/// Wire name of this message.
	pub const fn kind(&self) -> &'static str {
		match self {
			Self::Notify { .. } => "notify",
			Self::Versions(_) => "versions",
			Self::Flags(_) => "flags",
			Self::Result { .. } => "result",
			Self::Error { .. } => "error",
			Self::Ack => "ack",
		}
	}

	pub const fn is_terminal(&self) -> bool {
		!matches!(self, Self::Notify { .. })
	}
}

/// Serializes one frame, including its trailing newline.
pub fn encode_frame<T: Serialize>(frame: &T) -> serde_json::Result<String> {
	let mut line = serde_json::to_string(frame)?;
	line.push('\n');
	Ok(line)
}

/// Parses one response line.
pub fn decode_message(line: &str) -> serde_json::Result<EngineMessage> {
	serde_json::from_str(line.trim())
}

/// Parses one request line.
pub fn decode_request(line: &str) -> serde_json::Result<EngineRequest> {
	serde_json::from_str(line.trim())
}
