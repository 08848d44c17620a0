use std::io;

/// Failure to get an answer from the engine at all.
///
/// Analysis failures are not transport failures: they arrive as
/// diagnostics.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TransportError {
	/// The engine answered with an `error` frame or failed to initialize.
	#[error("engine error: {0}")]
	Engine(String),
	/// The engine hung up.
	#[error("engine connection closed")]
	Closed,
	#[error("engine i/o failed: {0}")]
	Io(#[from] io::Error),
	#[error("malformed engine frame: {0}")]
	Frame(#[from] serde_json::Error),
	/// A terminal response of the wrong kind.
	#[error("unexpected `{got}` response to `{request}`")]
	Unexpected { request: &'static str, got: &'static str },
	/// An earlier request was abandoned mid-exchange; the response stream
	/// can no longer be matched to requests.
	#[error("engine stream desynchronized by an abandoned request")]
	Desynchronized,
	#[error("engine command is empty")]
	EmptyCommand,
}

/// Result type for engine calls.
pub type Result<T, E = TransportError> = std::result::Result<T, E>;
