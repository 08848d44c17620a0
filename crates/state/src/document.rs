use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::OptionSet;

/// Identity of one editable document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(Arc<str>);

impl DocumentId {
	pub fn new(id: impl AsRef<str>) -> Self {
		Self(Arc::from(id.as_ref()))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for DocumentId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for DocumentId {
	fn from(id: &str) -> Self {
		Self::new(id)
	}
}

/// Immutable capture of a document's analysis inputs.
///
/// `version` increases on every edit to the document and on every option
/// change, so a result computed from an older snapshot can be recognized
/// as stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditSnapshot {
	pub document_id: DocumentId,
	pub version: u64,
	pub text: Arc<str>,
	pub options: OptionSet,
}

impl EditSnapshot {
	pub fn new(document_id: DocumentId, version: u64, text: Arc<str>, options: OptionSet) -> Self {
		Self {
			document_id,
			version,
			text,
			options,
		}
	}
}
