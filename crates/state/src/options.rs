use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Boolean analysis options keyed by name.
///
/// Backed by an ordered map so serialized forms are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionSet(BTreeMap<String, bool>);

impl OptionSet {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn get(&self, name: &str) -> Option<bool> {
		self.0.get(name).copied()
	}

	/// Returns true when `name` is set to true.
	pub fn is_enabled(&self, name: &str) -> bool {
		self.get(name).unwrap_or(false)
	}

	/// Sets `name`, returning the previous value.
	pub fn set(&mut self, name: impl Into<String>, value: bool) -> Option<bool> {
		self.0.insert(name.into(), value)
	}

	pub fn remove(&mut self, name: &str) -> Option<bool> {
		self.0.remove(name)
	}

	pub fn contains(&self, name: &str) -> bool {
		self.0.contains_key(name)
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
		self.0.iter().map(|(name, value)| (name.as_str(), *value))
	}

	pub fn names(&self) -> impl Iterator<Item = &str> {
		self.0.keys().map(String::as_str)
	}

	/// Applies every entry of `other` on top of `self`.
	pub fn extend_from(&mut self, other: &OptionSet) {
		for (name, value) in other.iter() {
			self.set(name, value);
		}
	}

	/// Entries worth recording in a share link: enabled options, and
	/// disabled ones whose default is enabled.
	pub fn overrides(&self, defaults: &OptionSet) -> OptionSet {
		self.iter()
			.filter(|(name, value)| *value || defaults.is_enabled(name))
			.map(|(name, value)| (name.to_string(), value))
			.collect()
	}

	/// Keeps only names that appear in `known`.
	pub fn retain_known(&mut self, known: &OptionSet) {
		self.0.retain(|name, _| known.contains(name));
	}
}

impl FromIterator<(String, bool)> for OptionSet {
	fn from_iter<I: IntoIterator<Item = (String, bool)>>(iter: I) -> Self {
		Self(iter.into_iter().collect())
	}
}

impl<'a> FromIterator<(&'a str, bool)> for OptionSet {
	fn from_iter<I: IntoIterator<Item = (&'a str, bool)>>(iter: I) -> Self {
		Self(iter.into_iter().map(|(name, value)| (name.to_string(), value)).collect())
	}
}
