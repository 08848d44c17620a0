use serde::{Deserialize, Serialize};
use typepad_state::OptionSet;

/// Engine severity code reported for errors; every other code is a warning.
pub const ERROR_SEVERITY: u8 = 2;

/// Diagnostic as reported by the engine.
///
/// Lines are 1-based, columns 0-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
	pub severity: u8,
	pub line: u32,
	pub col: u32,
	pub end_line: u32,
	pub end_col: u32,
	pub message: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub details: Option<String>,
	#[serde(default)]
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub method_name: Option<String>,
}

impl Diagnostic {
	/// Name carried by diagnostics synthesized from engine failures.
	pub const ENGINE_FAILURE: &'static str = "engine-failure";

	/// Synthetic error at the start of the document, reporting that the
	/// engine itself failed while analyzing.
	pub fn engine_failure(message: impl Into<String>) -> Self {
		Self {
			severity: ERROR_SEVERITY,
			line: 1,
			col: 0,
			end_line: 1,
			end_col: 0,
			message: strip_ansi(&message.into()),
			details: None,
			name: Self::ENGINE_FAILURE.to_string(),
			method_name: None,
		}
	}

	/// Removes terminal escape sequences from the human-readable fields.
	pub(crate) fn without_ansi(mut self) -> Self {
		self.message = strip_ansi(&self.message);
		self.details = self.details.as_deref().map(strip_ansi);
		self
	}
}

/// Versions reported once the engine has initialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Versions {
	pub engine_runtime_version: String,
	pub analysis_engine_version: String,
}

/// One engine option as presented to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagDescriptor {
	/// Option name used in [`OptionSet`] and share links.
	pub name: String,
	/// Command-line spelling of the flag, for display.
	pub flag: String,
	pub default: bool,
	pub description: String,
}

/// Options the engine understands, split by stability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagCatalog {
	pub feature: Vec<FlagDescriptor>,
	pub experimental: Vec<FlagDescriptor>,
}

impl FlagCatalog {
	pub fn iter(&self) -> impl Iterator<Item = &FlagDescriptor> {
		self.feature.iter().chain(&self.experimental)
	}

	/// Every known option at its default value.
	pub fn defaults(&self) -> OptionSet {
		self.iter().map(|flag| (flag.name.as_str(), flag.default)).collect()
	}
}

pub(crate) fn strip_ansi(text: &str) -> String {
	strip_ansi_escapes::strip_str(text)
}
