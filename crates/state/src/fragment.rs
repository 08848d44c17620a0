//! URL fragment state: `code=<encoded>&<option>=<true|false>...`.

use std::collections::BTreeSet;

use url::form_urlencoded;

use crate::{OptionSet, codec};

/// Fragment key holding the encoded source text.
pub const CODE_KEY: &str = "code";

/// Editor state carried in a URL fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlState {
	/// Encoded source text, as produced by [`codec::encode`].
	pub code: Option<String>,
	/// Boolean options present in the fragment.
	pub options: OptionSet,
}

impl UrlState {
	/// Captures `source` and `options` for writing into a fragment.
	pub fn capture(source: &str, options: OptionSet) -> Self {
		Self {
			code: Some(codec::encode(source)),
			options,
		}
	}

	/// Parses a fragment, with or without its leading `#`.
	///
	/// Never fails: keys other than `code` whose value is not `true` or
	/// `false` are ignored, and an empty `code` counts as absent.
	pub fn from_fragment(fragment: &str) -> Self {
		let mut state = Self::default();
		for (key, value) in form_urlencoded::parse(strip_hash(fragment).as_bytes()) {
			if key == CODE_KEY {
				state.code = (!value.is_empty()).then(|| value.into_owned());
				continue;
			}
			match value.as_ref() {
				"true" => {
					state.options.set(key, true);
				}
				"false" => {
					state.options.set(key, false);
				}
				_ => tracing::trace!(key = %key, "fragment.ignored_key"),
			}
		}
		state
	}

	/// Decoded source text; `None` when absent or undecodable.
	pub fn source(&self) -> Option<String> {
		self.code.as_deref().and_then(codec::decode)
	}

	/// Drops options whose names are not in `known`.
	pub fn options_against(&self, known: &OptionSet) -> OptionSet {
		let mut options = self.options.clone();
		options.retain_known(known);
		options
	}

	/// Serializes this state alone, without a leading `#`.
	pub fn to_fragment(&self) -> String {
		self.merge_into("", std::iter::empty())
	}

	/// Writes this state over `existing`, returning the new fragment without
	/// a leading `#`.
	///
	/// `code`, every option in this state, and every name in `owned_options`
	/// are owned by the codec: their old entries are dropped. All other
	/// entries are kept in their original order, ahead of the owned ones.
	pub fn merge_into<'a>(&'a self, existing: &str, owned_options: impl IntoIterator<Item = &'a str>) -> String {
		let owned: BTreeSet<&str> = owned_options.into_iter().chain(self.options.names()).collect();

		let mut out = form_urlencoded::Serializer::new(String::new());
		for (key, value) in form_urlencoded::parse(strip_hash(existing).as_bytes()) {
			if key != CODE_KEY && !owned.contains(key.as_ref()) {
				out.append_pair(&key, &value);
			}
		}
		if let Some(code) = &self.code {
			out.append_pair(CODE_KEY, code);
		}
		for (name, value) in self.options.iter() {
			out.append_pair(name, if value { "true" } else { "false" });
		}
		out.finish()
	}
}

fn strip_hash(fragment: &str) -> &str {
	fragment.strip_prefix('#').unwrap_or(fragment)
}
