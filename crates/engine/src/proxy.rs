use async_trait::async_trait;
use tokio::sync::broadcast;
use typepad_state::{DocumentId, OptionSet};

use crate::protocol::{EngineMessage, EngineRequest};
use crate::{Diagnostic, FlagCatalog, Result, TransportError, Versions};

/// Remote-object view of the analysis engine.
///
/// Implementors provide [`Self::call`]; the typed operations are built on
/// top of it and map `error` responses and mismatched kinds to
/// [`TransportError`].
#[async_trait]
pub trait EngineProxy: Send + Sync {
	/// Sends one request and waits for its terminal response.
	async fn call(&self, request: EngineRequest) -> Result<EngineMessage>;

	/// Subscribes to status notifications (loading progress).
	fn subscribe_status(&self) -> broadcast::Receiver<String>;

	/// Engine versions; resolves once initialization has completed.
	async fn versions(&self) -> Result<Versions> {
		match self.call(EngineRequest::GetVersions).await? {
			EngineMessage::Versions(versions) => Ok(versions),
			other => Err(reject("getVersions", other)),
		}
	}

	async fn flags(&self) -> Result<FlagCatalog> {
		match self.call(EngineRequest::GetFlags).await? {
			EngineMessage::Flags(catalog) => Ok(catalog),
			other => Err(reject("getFlags", other)),
		}
	}

	/// Diagnostics for a synced document.
	///
	/// `Ok(None)` means the document was gone when the engine looked for it;
	/// the result should be dropped rather than shown as "no issues".
	async fn diagnostics(&self, document_id: &DocumentId, options: &OptionSet) -> Result<Option<Vec<Diagnostic>>> {
		let request = EngineRequest::GetDiagnostics {
			document_id: document_id.clone(),
			options: options.clone(),
		};
		match self.call(request).await? {
			EngineMessage::Result { diagnostics } => Ok(diagnostics),
			other => Err(reject("getDiagnostics", other)),
		}
	}

	async fn sync_document(&self, document_id: &DocumentId, text: &str) -> Result<()> {
		let request = EngineRequest::SyncDocument {
			document_id: document_id.clone(),
			text: text.to_string(),
		};
		match self.call(request).await? {
			EngineMessage::Ack => Ok(()),
			other => Err(reject("syncDocument", other)),
		}
	}

	async fn remove_document(&self, document_id: &DocumentId) -> Result<()> {
		let request = EngineRequest::RemoveDocument {
			document_id: document_id.clone(),
		};
		match self.call(request).await? {
			EngineMessage::Ack => Ok(()),
			other => Err(reject("removeDocument", other)),
		}
	}
}

fn reject(request: &'static str, response: EngineMessage) -> TransportError {
	match response {
		EngineMessage::Error { message } => TransportError::Engine(message),
		other => TransportError::Unexpected { request, got: other.kind() },
	}
}
