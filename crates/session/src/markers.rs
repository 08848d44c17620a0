//! Conversion of engine diagnostics into editor markers.

use std::fmt;

use typepad_engine::{Diagnostic, ERROR_SEVERITY};

/// Marker severity shown by the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
	Error,
	Warning,
}

impl Severity {
	/// Maps an engine severity code. Only the error code is an error.
	pub const fn from_code(code: u8) -> Self {
		if code == ERROR_SEVERITY { Self::Error } else { Self::Warning }
	}

	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Error => "error",
			Self::Warning => "warning",
		}
	}
}

impl fmt::Display for Severity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Editor-ready diagnostic. Lines and columns are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
	pub severity: Severity,
	pub line: u32,
	pub col: u32,
	pub end_line: u32,
	pub end_col: u32,
	/// Message with any details appended as indented lines.
	pub message: String,
	pub code: String,
	/// Engine method that reported the issue.
	pub context: Option<String>,
}

impl Marker {
	pub fn from_diagnostic(diag: &Diagnostic) -> Self {
		let mut message = diag.message.clone();
		if let Some(details) = diag.details.as_deref().filter(|details| !details.is_empty()) {
			message.push_str("\n  ");
			message.push_str(&details.replace('\n', "\n  "));
		}

		Self {
			severity: Severity::from_code(diag.severity),
			line: diag.line,
			col: diag.col + 1,
			end_line: diag.end_line,
			end_col: diag.end_col + 1,
			message,
			code: diag.name.clone(),
			context: diag.method_name.clone(),
		}
	}

	/// Compiler-style one-liner: `line:col: severity: message [code]`.
	pub fn render(&self) -> String {
		let mut out = format!("{}:{}: {}: {self}", self.line, self.col, self.severity);
		if !self.code.is_empty() {
			out.push_str(&format!(" [{}]", self.code));
		}
		out
	}
}

/// Writes the message, prefixed with `in <context>: ` when a context is set.
impl fmt::Display for Marker {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if let Some(context) = &self.context {
			write!(f, "in {context}: ")?;
		}
		f.write_str(&self.message)
	}
}

pub fn markers_from(diagnostics: &[Diagnostic]) -> Vec<Marker> {
	diagnostics.iter().map(Marker::from_diagnostic).collect()
}
