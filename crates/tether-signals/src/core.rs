//! Core keys, payloads and the channel abstraction shared by signals and wires

use crate::error::{SignalError, SignalResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Internal storage for keys, supporting static strings, owned strings and
/// positional indices.
#[derive(Debug, Clone)]
enum KeyInner {
	/// Compile-time constant string (zero allocation)
	Static(&'static str),
	/// Dynamically created name (reference-counted)
	Owned(Arc<str>),
	/// Positional index assigned when no name was given
	Index(usize),
}

/// Lookup key for channels inside a container and containers inside a box
///
/// A key is either a name or a positional index. A static name and an owned
/// name with the same text are the same key.
///
/// # Examples
///
/// ```
/// use tether_signals::Key;
///
/// let a = Key::from("on_save");
/// let b = Key::from_string(String::from("on_save"));
/// assert_eq!(a, b);
///
/// let positional = Key::from(3usize);
/// assert_eq!(positional.as_index(), Some(3));
/// assert_eq!(positional.to_string(), "3");
/// ```
#[derive(Debug, Clone)]
pub struct Key(KeyInner);

/// Name of a [`Signal`](crate::Signal) or [`Wire`](crate::Wire) inside a container
pub type ChannelName = Key;

/// Identifier of a container inside a box
pub type ScopeId = Key;

impl Key {
	/// The scope every box creates at construction
	pub const DEFAULT: Self = Self(KeyInner::Static("default"));

	/// Create a key from a static string
	pub const fn new_static(name: &'static str) -> Self {
		Self(KeyInner::Static(name))
	}

	/// Create a key from an owned string
	pub fn from_string(name: impl Into<Arc<str>>) -> Self {
		Self(KeyInner::Owned(name.into()))
	}

	/// Create a positional key
	pub const fn index(index: usize) -> Self {
		Self(KeyInner::Index(index))
	}

	/// The textual name, if this key is not positional
	pub fn as_str(&self) -> Option<&str> {
		match &self.0 {
			KeyInner::Static(s) => Some(s),
			KeyInner::Owned(s) => Some(s),
			KeyInner::Index(_) => None,
		}
	}

	/// The positional index, if this key is positional
	pub fn as_index(&self) -> Option<usize> {
		match self.0 {
			KeyInner::Index(i) => Some(i),
			_ => None,
		}
	}

	/// Whether this is the `"default"` scope key
	pub fn is_default(&self) -> bool {
		*self == Self::DEFAULT
	}
}

impl PartialEq for Key {
	fn eq(&self, other: &Self) -> bool {
		match (self.as_index(), other.as_index()) {
			(Some(a), Some(b)) => a == b,
			(None, None) => self.as_str() == other.as_str(),
			_ => false,
		}
	}
}

impl Eq for Key {}

impl Hash for Key {
	fn hash<H: Hasher>(&self, state: &mut H) {
		match self.as_index() {
			Some(i) => {
				1u8.hash(state);
				i.hash(state);
			}
			None => {
				0u8.hash(state);
				self.as_str().hash(state);
			}
		}
	}
}

impl fmt::Display for Key {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.0 {
			KeyInner::Static(s) => f.write_str(s),
			KeyInner::Owned(s) => f.write_str(s),
			KeyInner::Index(i) => write!(f, "{}", i),
		}
	}
}

impl From<&'static str> for Key {
	fn from(name: &'static str) -> Self {
		Self::new_static(name)
	}
}

impl From<String> for Key {
	fn from(name: String) -> Self {
		Self::from_string(name)
	}
}

impl From<Arc<str>> for Key {
	fn from(name: Arc<str>) -> Self {
		Self::from_string(name)
	}
}

impl From<usize> for Key {
	fn from(index: usize) -> Self {
		Self::index(index)
	}
}

/// Identifier handed out by [`Signal::connect`](crate::Signal::connect)
///
/// Ids increase monotonically per signal and are never reused while the
/// signal lives, except after [`Signal::reset`](crate::Signal::reset).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReceiverId(pub(crate) u64);

impl ReceiverId {
	/// The raw id value
	pub fn get(self) -> u64 {
		self.0
	}
}

impl fmt::Display for ReceiverId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Open key/value bag carried by emissions and receiver metadata
///
/// Values are [`serde_json::Value`]s so any JSON-shaped data can travel
/// through a signal without the signal knowing its type.
///
/// # Examples
///
/// ```
/// use tether_signals::Payload;
///
/// let registered = Payload::new().with("priority", 1).with("a", 0);
/// let emitted = Payload::new().with("a", 5.7);
///
/// let merged = registered.merged(&emitted);
/// assert_eq!(merged.get_f64("a"), Some(5.7));
/// assert_eq!(merged.get_i64("priority"), Some(1));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Map<String, Value>);

impl Payload {
	/// Create an empty payload
	pub fn new() -> Self {
		Self(Map::new())
	}

	/// Builder-style insert
	pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.0.insert(key.into(), value.into());
		self
	}

	/// Insert a value, returning the previous one under the same key
	pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
		self.0.insert(key.into(), value.into())
	}

	/// Remove a value
	pub fn remove(&mut self, key: &str) -> Option<Value> {
		self.0.remove(key)
	}

	/// Borrow a value
	pub fn get(&self, key: &str) -> Option<&Value> {
		self.0.get(key)
	}

	/// Read a value as `f64` (integers are widened)
	pub fn get_f64(&self, key: &str) -> Option<f64> {
		self.0.get(key).and_then(Value::as_f64)
	}

	/// Read a value as `i64`
	pub fn get_i64(&self, key: &str) -> Option<i64> {
		self.0.get(key).and_then(Value::as_i64)
	}

	/// Read a value as a string slice
	pub fn get_str(&self, key: &str) -> Option<&str> {
		self.0.get(key).and_then(Value::as_str)
	}

	/// Read a value as a bool
	pub fn get_bool(&self, key: &str) -> Option<bool> {
		self.0.get(key).and_then(Value::as_bool)
	}

	/// Whether the key is present
	pub fn contains_key(&self, key: &str) -> bool {
		self.0.contains_key(key)
	}

	/// Number of entries
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Whether the payload holds no entries
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Iterate over entries
	pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
		self.0.iter()
	}

	/// Union of `self` and `overrides`; `overrides` wins on clashing keys
	pub fn merged(&self, overrides: &Payload) -> Payload {
		let mut merged = self.0.clone();
		for (key, value) in &overrides.0 {
			merged.insert(key.clone(), value.clone());
		}
		Payload(merged)
	}

	/// Consume into the underlying JSON map
	pub fn into_inner(self) -> Map<String, Value> {
		self.0
	}
}

impl From<Map<String, Value>> for Payload {
	fn from(map: Map<String, Value>) -> Self {
		Self(map)
	}
}

impl TryFrom<Value> for Payload {
	type Error = SignalError;

	fn try_from(value: Value) -> SignalResult<Self> {
		match value {
			Value::Object(map) => Ok(Self(map)),
			Value::Null => Ok(Self::new()),
			other => Err(SignalError::Precondition(format!(
				"payload must be a JSON object, got {}",
				other
			))),
		}
	}
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Payload {
	fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
		Self(
			iter.into_iter()
				.map(|(k, v)| (k.into(), v.into()))
				.collect(),
		)
	}
}

/// Common surface of the two channel kinds a [`Container`](crate::Container)
/// can hold
///
/// Handles are cheap clones sharing one underlying channel.
pub trait Channel: Clone + Send + Sync + 'static {
	/// Creation-time options (documentation, attributes, limits)
	type Options: Default;

	/// Create a channel with the given name
	fn create(name: ChannelName, options: Self::Options) -> Self;

	/// The channel name, if it has one
	fn name(&self) -> Option<&ChannelName>;

	/// Suppress emission until [`Channel::unmute`]
	fn mute(&self);

	/// Restore emission
	///
	/// # Errors
	///
	/// Returns [`SignalError::Precondition`] when the channel is not muted.
	fn unmute(&self) -> SignalResult<()>;

	/// Whether the channel is muted
	fn is_muted(&self) -> bool;

	/// Return the channel to its just-constructed state
	fn reset(&self);

	/// Whether two handles point at the same channel
	fn ptr_eq(&self, other: &Self) -> bool;
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use serde_json::json;
	use std::collections::HashSet;

	#[rstest]
	fn test_key_static_and_owned_are_equal() {
		// Arrange
		let static_key = Key::from("scope");
		let owned_key = Key::from_string(format!("sc{}", "ope"));

		// Act
		let mut set = HashSet::new();
		set.insert(static_key.clone());

		// Assert
		assert_eq!(static_key, owned_key);
		assert!(set.contains(&owned_key));
	}

	#[rstest]
	fn test_key_index_differs_from_numeric_text() {
		// Arrange
		let index = Key::index(3);
		let text = Key::from("3");

		// Act & Assert
		assert_ne!(index, text);
		assert_eq!(index.to_string(), text.to_string());
	}

	#[rstest]
	#[case(Key::DEFAULT, true)]
	#[case(Key::from_string("default"), true)]
	#[case(Key::from("other"), false)]
	#[case(Key::index(0), false)]
	fn test_key_is_default(#[case] key: Key, #[case] expected: bool) {
		assert_eq!(key.is_default(), expected);
	}

	#[rstest]
	fn test_payload_merged_prefers_overrides() {
		// Arrange
		let base = Payload::new().with("a", 1).with("b", "kept");
		let overrides = Payload::new().with("a", 2);

		// Act
		let merged = base.merged(&overrides);

		// Assert
		assert_eq!(merged.get_i64("a"), Some(2));
		assert_eq!(merged.get_str("b"), Some("kept"));
		assert_eq!(base.get_i64("a"), Some(1));
	}

	#[rstest]
	fn test_payload_try_from_object() {
		// Arrange
		let value = json!({"a": 5.7, "flag": true});

		// Act
		let payload = Payload::try_from(value).unwrap();

		// Assert
		assert_eq!(payload.get_f64("a"), Some(5.7));
		assert_eq!(payload.get_bool("flag"), Some(true));
	}

	#[rstest]
	fn test_payload_try_from_non_object_fails() {
		// Act
		let result = Payload::try_from(json!([1, 2, 3]));

		// Assert
		assert!(matches!(result, Err(SignalError::Precondition(_))));
	}

	#[rstest]
	fn test_payload_serde_is_transparent() {
		// Arrange
		let payload = Payload::new().with("a", 1);

		// Act
		let text = serde_json::to_string(&payload).unwrap();

		// Assert
		assert_eq!(text, r#"{"a":1}"#);
	}

	#[rstest]
	fn test_payload_from_iter() {
		// Act
		let payload: Payload = vec![("x", 1), ("y", 2)].into_iter().collect();

		// Assert
		assert_eq!(payload.len(), 2);
		assert_eq!(payload.get_i64("y"), Some(2));
	}
}
