//! Keyed collections of channels
//!
//! A [`Container`] maps names to signals or wires and creates them on first
//! lookup. It is generic over the channel kind; [`SignalContainer`] and
//! [`WireContainer`] name the two concrete flavours.
//!
//! ```
//! use tether_signals::SignalContainer;
//!
//! let container: SignalContainer = SignalContainer::new();
//! let first = container.get("on_save");
//! let again = container.get("on_save");
//! assert!(first.ptr_eq(&again));
//! assert_eq!(container.len(), 1);
//! ```

use crate::core::{Channel, ChannelName, Key, ScopeId};
use crate::error::{SignalError, SignalResult};
use crate::signal::Signal;
use crate::wire::Wire;
use crate::wired::Target;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Container of [`Signal`]s
pub type SignalContainer<R = ()> = Container<Signal<R>>;

/// Container of [`Wire`]s
pub type WireContainer<A = (), R = ()> = Container<Wire<A, R>>;

struct ContainerInner<C> {
	id: Option<ScopeId>,
	channels: RwLock<IndexMap<ChannelName, C>>,
}

/// Get-or-create mapping from names to channels
///
/// Handles are cheap clones sharing one mapping. Iteration order is insertion
/// order, though callers should not rely on it.
pub struct Container<C: Channel> {
	inner: Arc<ContainerInner<C>>,
}

impl<C: Channel> Container<C> {
	/// Create a standalone container with no scope id
	pub fn new() -> Self {
		Self::build(None)
	}

	/// Create a container identified by `id` within a box
	pub fn with_id(id: impl Into<ScopeId>) -> Self {
		Self::build(Some(id.into()))
	}

	fn build(id: Option<ScopeId>) -> Self {
		Self {
			inner: Arc::new(ContainerInner {
				id,
				channels: RwLock::new(IndexMap::new()),
			}),
		}
	}

	/// The container's key in its box, `None` when standalone
	pub fn id(&self) -> Option<&ScopeId> {
		self.inner.id.as_ref()
	}

	/// Get the channel called `name`, creating it with default options if absent
	pub fn get(&self, name: impl Into<ChannelName>) -> C {
		self.get_or_create_with(name, C::Options::default())
	}

	/// Get the channel called `name`, creating it from `options` if absent
	///
	/// `options` are ignored when the channel already exists.
	pub fn get_or_create_with(&self, name: impl Into<ChannelName>, options: C::Options) -> C {
		let name = name.into();
		if let Some(channel) = self.inner.channels.read().get(&name) {
			return channel.clone();
		}
		let mut channels = self.inner.channels.write();
		channels
			.entry(name)
			.or_insert_with_key(|name| {
				tracing::debug!(channel = %name, "channel created");
				C::create(name.clone(), options)
			})
			.clone()
	}

	/// Get an existing channel
	///
	/// # Errors
	///
	/// Returns [`SignalError::NotFound`] when no channel is called `name`.
	pub fn get_existing(&self, name: impl Into<ChannelName>) -> SignalResult<C> {
		let name = name.into();
		self.inner
			.channels
			.read()
			.get(&name)
			.cloned()
			.ok_or_else(|| SignalError::not_found(format!("no channel named '{}'", name)))
	}

	/// Full lookup
	///
	/// A missing `name` is replaced by the next positional index, the count of
	/// channels already present. With `must_exist` a miss fails instead of
	/// creating.
	///
	/// # Errors
	///
	/// Returns [`SignalError::NotFound`] on a miss when `must_exist` is set.
	pub fn lookup(
		&self,
		name: Option<ChannelName>,
		options: C::Options,
		must_exist: bool,
	) -> SignalResult<C> {
		let mut channels = self.inner.channels.write();
		let name = name.unwrap_or_else(|| Key::index(channels.len()));
		if let Some(channel) = channels.get(&name) {
			return Ok(channel.clone());
		}
		if must_exist {
			return Err(SignalError::not_found(format!("no channel named '{}'", name)));
		}
		tracing::debug!(channel = %name, "channel created");
		let channel = C::create(name.clone(), options);
		channels.insert(name, channel.clone());
		Ok(channel)
	}

	/// Remove a channel, returning it if it was present
	pub fn remove(&self, name: impl Into<ChannelName>) -> Option<C> {
		let name = name.into();
		let removed = self.inner.channels.write().shift_remove(&name);
		if removed.is_some() {
			tracing::debug!(channel = %name, "channel removed");
		}
		removed
	}

	/// Whether a channel called `name` exists
	pub fn contains(&self, name: impl Into<ChannelName>) -> bool {
		self.inner.channels.read().contains_key(&name.into())
	}

	/// Channel names in insertion order
	pub fn names(&self) -> Vec<ChannelName> {
		self.inner.channels.read().keys().cloned().collect()
	}

	/// Handles to every channel in insertion order
	pub fn channels(&self) -> Vec<C> {
		self.inner.channels.read().values().cloned().collect()
	}

	/// Number of channels
	pub fn len(&self) -> usize {
		self.inner.channels.read().len()
	}

	/// Whether the container holds no channels
	pub fn is_empty(&self) -> bool {
		self.inner.channels.read().is_empty()
	}

	/// Mute every channel
	pub fn mute_all(&self) {
		for channel in self.channels() {
			channel.mute();
		}
	}

	/// Unmute every muted channel; channels that are not muted are left alone
	pub fn unmute_all(&self) {
		for channel in self.channels() {
			// Another thread may unmute it between the check and the call
			if channel.is_muted()
				&& let Err(e) = channel.unmute()
			{
				tracing::trace!(
					channel = ?channel.name(),
					error = %e,
					"channel already unmuted"
				);
			}
		}
	}

	/// Reset every channel
	pub fn reset_all(&self) {
		for channel in self.channels() {
			channel.reset();
		}
	}

	/// Deferred lookup of `name`, resolved against this container on use
	pub fn target(&self, name: impl Into<ChannelName>) -> Target<C> {
		Target::in_container(self, name)
	}

	/// Whether two handles refer to the same container
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}
}

impl<C: Channel> Default for Container<C> {
	fn default() -> Self {
		Self::new()
	}
}

impl<C: Channel> Clone for Container<C> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<C: Channel> fmt::Debug for Container<C> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Container")
			.field("id", &self.inner.id)
			.field("names", &self.names())
			.finish()
	}
}
