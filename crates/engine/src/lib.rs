//! Contract between the orchestration layer and the external analysis engine.
//!
//! The engine is slow to initialize and analyzes one request at a time. It is
//! reached through [`EngineProxy`], which has two implementations:
//!
//! * [`EngineHost`] runs an [`AnalysisEngine`] on one dedicated thread inside
//!   this process.
//! * [`LineClient`] speaks the newline-delimited JSON [`protocol`] to an
//!   engine on the other end of a pipe, usually a child process started with
//!   [`ProcessClient::spawn`]. [`serve_lines`] is the matching server side.
//!
//! Analysis failures come back as diagnostics; only transport problems are
//! errors ([`TransportError`]).

mod error;
mod host;
mod lines;
pub mod protocol;
mod proxy;
mod types;

#[cfg(test)]
mod testing;

pub use error::{Result, TransportError};
pub use host::{AnalysisEngine, AnalysisError, EngineHost, StatusNotifier};
pub use lines::{LineClient, ProcessClient, serve_lines};
pub use protocol::{EngineMessage, EngineRequest};
pub use proxy::EngineProxy;
pub use types::{Diagnostic, ERROR_SEVERITY, FlagCatalog, FlagDescriptor, Versions};
