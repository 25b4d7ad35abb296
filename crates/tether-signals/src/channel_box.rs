//! Scoped sets of containers
//!
//! A [`ChannelBox`] keeps one [`Container`] per scope id and marks one scope
//! active. Lookups without an explicit scope go to the active container, so
//! a component can create its own set of channels and have everything built
//! while that set is active connect to it.
//!
//! A scope can be tied to an owner: once the owner is dropped the scope and
//! every channel in it are discarded. Alternatively a [`ScopeGuard`] removes
//! its scope when dropped.
//!
//! ```
//! use tether_signals::{Key, SignalBox};
//!
//! let signals: SignalBox = SignalBox::new();
//! signals.add(Some("editor".into()), true);
//! let saved = signals.get("saved");
//! assert!(saved.ptr_eq(&signals.get("saved")));
//!
//! signals.remove("editor");
//! assert_eq!(signals.active(), Key::DEFAULT);
//! ```

use crate::container::Container;
use crate::core::{Channel, ChannelName, Key, ScopeId};
use crate::error::{SignalError, SignalResult};
use crate::signal::Signal;
use crate::wire::Wire;
use crate::wired::Target;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

/// Box of [`Signal`] containers
pub type SignalBox<R = ()> = ChannelBox<Signal<R>>;

/// Box of [`Wire`] containers
pub type WireBox<A = (), R = ()> = ChannelBox<Wire<A, R>>;

type OwnerRef = Weak<dyn Any + Send + Sync>;

struct Scope<C: Channel> {
	container: Container<C>,
	owner: Option<OwnerRef>,
}

impl<C: Channel> Scope<C> {
	fn is_orphaned(&self) -> bool {
		self.owner
			.as_ref()
			.is_some_and(|owner| owner.strong_count() == 0)
	}
}

struct BoxState<C: Channel> {
	scopes: IndexMap<ScopeId, Scope<C>>,
	/// Containers taken out under the lock, dropped once it is released
	retired: Vec<Container<C>>,
	active: ScopeId,
	next_id: usize,
}

impl<C: Channel> BoxState<C> {
	fn new() -> Self {
		let mut state = Self {
			scopes: IndexMap::new(),
			retired: Vec::new(),
			active: Key::DEFAULT,
			next_id: 0,
		};
		state.insert(Key::DEFAULT);
		state
	}

	/// Create a scope, replacing any scope with the same id
	fn insert(&mut self, id: ScopeId) -> Container<C> {
		let container = Container::with_id(id.clone());
		let previous = self.scopes.insert(
			id.clone(),
			Scope {
				container: container.clone(),
				owner: None,
			},
		);
		self.next_id += 1;
		match previous {
			Some(previous) => {
				tracing::debug!(scope = %id, "scope replaced");
				self.retired.push(previous.container);
			}
			None => tracing::debug!(scope = %id, "scope added"),
		}
		container
	}

	fn remove(&mut self, id: &ScopeId) -> Option<Container<C>> {
		let removed = self.scopes.shift_remove(id)?;
		if *id == self.active {
			self.active = Key::DEFAULT;
		}
		if id.is_default() {
			self.insert(Key::DEFAULT);
		}
		tracing::debug!(scope = %id, "scope removed");
		self.retired.push(removed.container.clone());
		Some(removed.container)
	}

	fn clear(&mut self) {
		let scopes = std::mem::take(&mut self.scopes);
		self.retired.extend(scopes.into_values().map(|scope| scope.container));
		self.active = Key::DEFAULT;
		self.insert(Key::DEFAULT);
	}

	fn prune(&mut self) {
		let orphaned: Vec<ScopeId> = self
			.scopes
			.iter()
			.filter(|(_, scope)| scope.is_orphaned())
			.map(|(id, _)| id.clone())
			.collect();
		for id in orphaned {
			tracing::debug!(scope = %id, "scope owner dropped");
			self.remove(&id);
		}
	}

	fn active_container(&mut self) -> Container<C> {
		match self.scopes.get(&self.active) {
			Some(scope) => scope.container.clone(),
			None => {
				// The active scope is always present; recover to default if not
				self.active = Key::DEFAULT;
				match self.scopes.get(&Key::DEFAULT) {
					Some(scope) => scope.container.clone(),
					None => self.insert(Key::DEFAULT),
				}
			}
		}
	}
}

struct BoxShared<C: Channel> {
	state: RwLock<BoxState<C>>,
}

impl<C: Channel> BoxShared<C> {
	/// Run `f` under the write lock after pruning orphaned scopes
	///
	/// Containers removed meanwhile are dropped after the lock is released,
	/// so channel teardown may call back into this box.
	fn with_state<T>(&self, f: impl FnOnce(&mut BoxState<C>) -> T) -> T {
		let (value, retired) = {
			let mut state = self.state.write();
			state.prune();
			let value = f(&mut state);
			(value, std::mem::take(&mut state.retired))
		};
		drop(retired);
		value
	}
}

/// Collection of containers keyed by scope id, one of them active
///
/// A `"default"` scope exists from construction and is recreated empty
/// whenever it is removed. Handles are cheap clones sharing one box.
pub struct ChannelBox<C: Channel> {
	shared: Arc<BoxShared<C>>,
}

impl<C: Channel> ChannelBox<C> {
	/// Create a box holding only the active `"default"` scope
	pub fn new() -> Self {
		Self {
			shared: Arc::new(BoxShared {
				state: RwLock::new(BoxState::new()),
			}),
		}
	}

	/// Add a scope and return its container
	///
	/// Without a scope id the next auto-incremented index is used. Adding an
	/// id that already exists replaces that scope with an empty one.
	pub fn add(&self, scope: Option<ScopeId>, activate: bool) -> Container<C> {
		self.shared.with_state(|state| {
			let id = scope.unwrap_or_else(|| Key::index(state.next_id));
			let container = state.insert(id.clone());
			if activate {
				state.active = id;
			}
			container
		})
	}

	/// Add a scope that is discarded once `owner` is dropped
	pub fn add_owned<O>(
		&self,
		owner: &Arc<O>,
		scope: Option<ScopeId>,
		activate: bool,
	) -> Container<C>
	where
		O: Send + Sync + 'static,
	{
		let owner = Arc::downgrade(owner) as OwnerRef;
		self.shared.with_state(|state| {
			let id = scope.unwrap_or_else(|| Key::index(state.next_id));
			let container = state.insert(id.clone());
			if let Some(slot) = state.scopes.get_mut(&id) {
				slot.owner = Some(owner);
			}
			if activate {
				state.active = id;
			}
			container
		})
	}

	/// Tie an existing scope, the active one by default, to `owner`
	///
	/// # Errors
	///
	/// Returns [`SignalError::NotFound`] when the scope does not exist.
	pub fn remove_with<O>(&self, owner: &Arc<O>, scope: Option<ScopeId>) -> SignalResult<()>
	where
		O: Send + Sync + 'static,
	{
		let owner = Arc::downgrade(owner) as OwnerRef;
		self.shared.with_state(|state| {
			let id = scope.unwrap_or_else(|| state.active.clone());
			match state.scopes.get_mut(&id) {
				Some(slot) => {
					slot.owner = Some(owner);
					tracing::debug!(scope = %id, "scope bound to owner");
					Ok(())
				}
				None => Err(SignalError::not_found(format!("no scope '{}'", id))),
			}
		})
	}

	/// Add a scope and return a guard that removes it when dropped
	pub fn scope_guard(&self, scope: impl Into<ScopeId>, activate: bool) -> ScopeGuard<C> {
		let container = self.add(Some(scope.into()), activate);
		ScopeGuard {
			container,
			owner: Arc::downgrade(&self.shared),
		}
	}

	/// Remove a scope, returning its container
	///
	/// Missing ids are ignored. Removing the active scope makes `"default"`
	/// active again; removing `"default"` replaces it with an empty one.
	pub fn remove(&self, scope: impl Into<ScopeId>) -> Option<Container<C>> {
		let id = scope.into();
		self.shared.with_state(|state| state.remove(&id))
	}

	/// Make `scope` the active scope
	///
	/// # Errors
	///
	/// Returns [`SignalError::NotFound`] when the scope does not exist.
	pub fn set_active(&self, scope: impl Into<ScopeId>) -> SignalResult<()> {
		let id = scope.into();
		self.shared.with_state(|state| {
			if !state.scopes.contains_key(&id) {
				return Err(SignalError::not_found(format!("no scope '{}'", id)));
			}
			tracing::debug!(scope = %id, "scope activated");
			state.active = id;
			Ok(())
		})
	}

	/// Make `"default"` the active scope
	pub fn deactivate(&self) {
		self.shared.with_state(|state| state.active = Key::DEFAULT);
	}

	/// The active scope id
	pub fn active(&self) -> ScopeId {
		self.shared.with_state(|state| state.active.clone())
	}

	/// The active container
	pub fn get_active(&self) -> Container<C> {
		self.shared.with_state(BoxState::active_container)
	}

	/// Get or create `name` in the active container
	pub fn get(&self, name: impl Into<ChannelName>) -> C {
		self.get_active().get(name)
	}

	/// [`Container::lookup`] on the active container
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
		self.get_active().lookup(name, options, must_exist)
	}

	/// The container for `scope`, or the active one when `None`
	///
	/// A missing scope is created without being activated.
	pub fn get_container(&self, scope: Option<ScopeId>) -> Container<C> {
		self.shared.with_state(|state| match scope {
			None => state.active_container(),
			Some(id) => match state.scopes.get(&id) {
				Some(slot) => slot.container.clone(),
				None => state.insert(id),
			},
		})
	}

	/// Scope ids in insertion order
	pub fn containers(&self) -> Vec<ScopeId> {
		self.shared
			.with_state(|state| state.scopes.keys().cloned().collect())
	}

	/// Whether `scope` exists
	pub fn contains(&self, scope: impl Into<ScopeId>) -> bool {
		let id = scope.into();
		self.shared.with_state(|state| state.scopes.contains_key(&id))
	}

	/// Number of scopes, `"default"` included
	pub fn len(&self) -> usize {
		self.shared.with_state(|state| state.scopes.len())
	}

	/// Always `false`: the default scope is never absent
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Drop every scope and start over with an empty active `"default"`
	pub fn clear(&self) {
		self.shared.with_state(BoxState::clear);
		tracing::debug!("box cleared");
	}

	fn all_containers(&self) -> Vec<Container<C>> {
		self.shared.with_state(|state| {
			state
				.scopes
				.values()
				.map(|scope| scope.container.clone())
				.collect()
		})
	}

	/// Reset every channel in every scope
	pub fn reset_all(&self) {
		for container in self.all_containers() {
			container.reset_all();
		}
	}

	/// Mute every channel in every scope
	pub fn mute_all(&self) {
		for container in self.all_containers() {
			container.mute_all();
		}
	}

	/// Unmute every muted channel in every scope
	pub fn unmute_all(&self) {
		for container in self.all_containers() {
			container.unmute_all();
		}
	}

	/// Deferred lookup of `name` in whichever scope is active when resolved
	pub fn target(&self, name: impl Into<ChannelName>) -> Target<C> {
		Target::in_box(self, name)
	}

	/// Whether two handles refer to the same box
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.shared, &other.shared)
	}
}

impl<C: Channel> Default for ChannelBox<C> {
	fn default() -> Self {
		Self::new()
	}
}

impl<C: Channel> Clone for ChannelBox<C> {
	fn clone(&self) -> Self {
		Self {
			shared: Arc::clone(&self.shared),
		}
	}
}

impl<C: Channel> fmt::Debug for ChannelBox<C> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let state = self.shared.state.read();
		f.debug_struct("ChannelBox")
			.field("scopes", &state.scopes.keys().collect::<Vec<_>>())
			.field("active", &state.active)
			.finish()
	}
}

/// Removes its scope from the box when dropped
///
/// The scope is left alone if it was replaced by a later `add` with the same
/// id, or if the box itself is gone.
#[must_use = "dropping the guard removes the scope immediately"]
pub struct ScopeGuard<C: Channel> {
	container: Container<C>,
	owner: Weak<BoxShared<C>>,
}

impl<C: Channel> ScopeGuard<C> {
	/// The guarded container
	pub fn container(&self) -> &Container<C> {
		&self.container
	}

	/// The guarded scope id
	pub fn id(&self) -> Option<&ScopeId> {
		self.container.id()
	}
}

impl<C: Channel> Drop for ScopeGuard<C> {
	fn drop(&mut self) {
		let (Some(shared), Some(id)) = (self.owner.upgrade(), self.container.id()) else {
			return;
		};
		shared.with_state(|state| {
			let current = state
				.scopes
				.get(id)
				.is_some_and(|scope| scope.container.ptr_eq(&self.container));
			if current {
				state.remove(id);
			}
		});
	}
}

impl<C: Channel> fmt::Debug for ScopeGuard<C> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ScopeGuard")
			.field("scope", &self.container.id())
			.finish()
	}
}
