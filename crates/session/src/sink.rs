use std::error::Error;
use std::sync::Arc;

use parking_lot::RwLock;
use typepad_state::DocumentId;

use crate::{Marker, StatusLine};

/// Receives everything the session wants to show.
///
/// Called from session tasks, sometimes while session state is locked:
/// implementations must not call back into the [`Session`](crate::Session).
pub trait MarkerSink: Send + Sync {
	/// Replaces the markers of `document`. An empty list clears them.
	fn set_markers(&self, document: &DocumentId, markers: Vec<Marker>);

	fn clear_markers(&self, document: &DocumentId);

	/// Validation of `document` could not complete.
	fn show_failure(&self, document: &DocumentId, error: &dyn Error);

	fn show_status(&self, status: StatusLine);
}

/// In-memory URL fragment, shared between the session and its host.
///
/// Stored without the leading `#`.
#[derive(Debug, Clone, Default)]
pub struct FragmentStore(Arc<RwLock<String>>);

impl FragmentStore {
	pub fn new(fragment: &str) -> Self {
		Self(Arc::new(RwLock::new(fragment.strip_prefix('#').unwrap_or(fragment).to_string())))
	}

	pub fn get(&self) -> String {
		self.0.read().clone()
	}

	pub fn set(&self, fragment: String) {
		*self.0.write() = fragment;
	}
}
