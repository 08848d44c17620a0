//! Editing session orchestration.
//!
//! Turns edit events into debounced validation requests against a single
//! analysis engine, publishes the resulting markers, and keeps a share link
//! (URL fragment) in step with the primary document.

mod config;
mod error;
pub mod markers;
mod session;
mod sink;
mod status;

pub use config::SessionConfig;
pub use error::{ConfigError, Result};
pub use markers::{Marker, Severity};
pub use session::{InitialState, Session, load_initial};
pub use sink::{FragmentStore, MarkerSink};
pub use status::StatusLine;
