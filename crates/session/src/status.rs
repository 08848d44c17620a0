use std::fmt;

use chrono::{DateTime, Local};

use crate::Marker;

/// One line of user-facing status output, stamped with local time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
	at: DateTime<Local>,
	text: String,
}

impl StatusLine {
	pub fn new(text: impl Into<String>) -> Self {
		Self::at(Local::now(), text)
	}

	pub fn at(at: DateTime<Local>, text: impl Into<String>) -> Self {
		Self { at, text: text.into() }
	}

	/// Summary of a completed validation.
	pub fn found(markers: &[Marker]) -> Self {
		match markers.len() {
			0 => Self::new("Type checking found no issues."),
			count => {
				let noun = if count == 1 { "issue" } else { "issues" };
				let mut text = format!("Type checking found {count} {noun}:");
				for marker in markers {
					text.push('\n');
					text.push_str(&marker.render());
				}
				Self::new(text)
			}
		}
	}

	pub fn failed(error: &dyn fmt::Display) -> Self {
		Self::new(format!("Type checking failed: {error}"))
	}

	pub fn text(&self) -> &str {
		&self.text
	}

	pub fn timestamp(&self) -> DateTime<Local> {
		self.at
	}
}

impl fmt::Display for StatusLine {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "[{}] {}", self.at.format("%Y-%m-%d %H:%M:%S"), self.text)
	}
}
