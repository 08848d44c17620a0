//! Error types for session configuration.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur when loading a session configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error reading a configuration file.
	#[error("I/O error reading {path}: {error}")]
	Io {
		/// Path to the file that failed to read.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},

	/// The file is not a valid configuration.
	#[error("invalid configuration in {path}: {error}")]
	Parse {
		path: PathBuf,
		error: toml::de::Error,
	},
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
