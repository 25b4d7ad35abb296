//! Multi-receiver signal
//!
//! A [`Signal`] broadcasts a [`Payload`] to every connected receiver in
//! connection order. Receivers are held weakly unless connected with
//! [`Signal::connect_fn`], so subscribing never keeps a receiver's owner
//! alive. Dropped receivers are pruned the next time the receiver table is
//! read.
//!
//! # State
//!
//! ```text
//!                 add_condition
//!  Unconditional ───────────────► Conditioned
//!        ▲      remove_condition       │
//!        └───── (last one removed) ────┘
//!
//!  Active ◄──── mute / unmute ────► Muted      (orthogonal axis)
//!
//!  reset ──► (Unconditional, Active), no receivers, ids restart at 0
//! ```

use crate::condition::{self, Condition};
use crate::core::{Channel, ChannelName, Payload, ReceiverId};
use crate::error::{SignalError, SignalResult};
use crate::receiver::{Binding, MethodBinding, ReceiverFn, StaticFn, WeakFn};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::fmt;
use std::sync::{Arc, Weak};

/// Creation options for a [`Signal`]
///
/// # Examples
///
/// ```
/// use tether_signals::{Payload, Signal, SignalOptions};
///
/// let signal: Signal<f64> = Signal::with_options(
///     SignalOptions::new()
///         .with_name("price")
///         .with_doc("Supplies the current price")
///         .with_receiver_limit(1),
/// );
/// assert_eq!(signal.receiver_limit(), Some(1));
/// assert_eq!(signal.doc(), Some("Supplies the current price"));
/// ```
#[derive(Clone, Default)]
pub struct SignalOptions {
	/// Signal name
	pub name: Option<ChannelName>,
	/// Free-form documentation, never interpreted
	pub doc: Option<String>,
	/// Opaque attributes, never interpreted
	pub attrs: Payload,
	/// Maximum number of live receivers; `None` is unbounded
	pub receiver_limit: Option<usize>,
	/// Conditions installed at construction
	pub conditions: Vec<Arc<dyn Condition>>,
}

impl SignalOptions {
	/// Default options: unnamed, unbounded, unconditional
	pub fn new() -> Self {
		Self::default()
	}

	/// Set the name
	pub fn with_name(mut self, name: impl Into<ChannelName>) -> Self {
		self.name = Some(name.into());
		self
	}

	/// Set the documentation string
	pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
		self.doc = Some(doc.into());
		self
	}

	/// Set the attributes
	pub fn with_attrs(mut self, attrs: Payload) -> Self {
		self.attrs = attrs;
		self
	}

	/// Cap the number of receivers
	pub fn with_receiver_limit(mut self, limit: usize) -> Self {
		self.receiver_limit = Some(limit);
		self
	}

	/// Install a condition at construction
	pub fn with_condition<C: Condition + 'static>(mut self, condition: C) -> Self {
		self.conditions.push(Arc::new(condition));
		self
	}
}

impl fmt::Debug for SignalOptions {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let conditions: Vec<&str> = self.conditions.iter().map(|c| c.name()).collect();
		f.debug_struct("SignalOptions")
			.field("name", &self.name)
			.field("doc", &self.doc)
			.field("attrs", &self.attrs)
			.field("receiver_limit", &self.receiver_limit)
			.field("conditions", &conditions)
			.finish()
	}
}

/// One row of the receiver table; binding and metadata are removed together
struct ReceiverEntry<R> {
	id: ReceiverId,
	binding: Arc<dyn Binding<R>>,
	metadata: Arc<Payload>,
}

impl<R> Clone for ReceiverEntry<R> {
	fn clone(&self) -> Self {
		Self {
			id: self.id,
			binding: Arc::clone(&self.binding),
			metadata: Arc::clone(&self.metadata),
		}
	}
}

struct SignalState<R> {
	receivers: Vec<ReceiverEntry<R>>,
	conditions: IndexMap<String, Arc<dyn Condition>>,
	next_id: u64,
	/// Bumped by every reset so ids handed out earlier never match again
	generation: u64,
	muted: bool,
}

impl<R> SignalState<R> {
	fn new(generation: u64) -> Self {
		Self {
			receivers: Vec::new(),
			conditions: IndexMap::new(),
			next_id: 0,
			generation,
			muted: false,
		}
	}

	/// Take out receivers whose target is gone
	///
	/// The caller drops the returned entries once the lock is released.
	fn prune(&mut self) -> Vec<ReceiverEntry<R>> {
		if self.receivers.iter().all(|entry| entry.binding.is_alive()) {
			return Vec::new();
		}
		let (live, dead) = std::mem::take(&mut self.receivers)
			.into_iter()
			.partition(|entry| entry.binding.is_alive());
		self.receivers = live;
		dead
	}
}

struct SignalShared<R> {
	name: Option<ChannelName>,
	doc: Option<String>,
	attrs: Payload,
	receiver_limit: Option<usize>,
	state: RwLock<SignalState<R>>,
}

impl<R> SignalShared<R> {
	fn label(&self) -> String {
		self.name
			.as_ref()
			.map_or_else(|| "<unnamed>".to_string(), ToString::to_string)
	}

	fn prune_locked(&self, state: &mut SignalState<R>) -> Vec<ReceiverEntry<R>> {
		let pruned = state.prune();
		for entry in &pruned {
			tracing::debug!(
				channel = %self.label(),
				receiver_id = %entry.id,
				"pruned dropped receiver"
			);
		}
		pruned
	}

	/// Remove one receiver
	///
	/// With `generation` set, nothing is removed once the signal has been
	/// reset since that generation. The entry is dropped after the lock is
	/// released, so a receiver owning a handle to this signal can go away.
	fn disconnect(&self, receiver_id: ReceiverId, generation: Option<u64>) -> bool {
		let removed = {
			let mut state = self.state.write();
			if generation.is_some_and(|generation| generation != state.generation) {
				None
			} else {
				state
					.receivers
					.iter()
					.position(|entry| entry.id == receiver_id)
					.map(|index| state.receivers.remove(index))
			}
		};
		match removed {
			Some(entry) => {
				tracing::debug!(channel = %self.label(), %receiver_id, "receiver disconnected");
				drop(entry);
				true
			}
			None => false,
		}
	}
}

/// Detaches a receiver from a signal of any return type
trait Detach: Send + Sync {
	fn detach(&self, receiver_id: ReceiverId, generation: u64) -> bool;
}

impl<R: 'static> Detach for SignalShared<R> {
	fn detach(&self, receiver_id: ReceiverId, generation: u64) -> bool {
		self.disconnect(receiver_id, Some(generation))
	}
}

/// Guard that disconnects its receiver when dropped
///
/// Returned by the `subscribe*` family on [`Signal`]. Dropping the guard
/// after the signal itself is gone is a no-op, and so is dropping it after
/// the signal was reset: ids restart at zero then, and the guard must not
/// detach a receiver connected later under the same id.
#[must_use = "dropping a Subscription disconnects its receiver immediately"]
pub struct Subscription {
	id: ReceiverId,
	generation: u64,
	signal: Option<Weak<dyn Detach>>,
}

impl Subscription {
	/// The id of the guarded receiver
	pub fn id(&self) -> ReceiverId {
		self.id
	}

	/// Release the guard without disconnecting
	pub fn forget(mut self) -> ReceiverId {
		self.signal = None;
		self.id
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		if let Some(signal) = self.signal.take().and_then(|weak| weak.upgrade()) {
			signal.detach(self.id, self.generation);
		}
	}
}

impl fmt::Debug for Subscription {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Subscription")
			.field("id", &self.id)
			.field("attached", &self.signal.is_some())
			.finish()
	}
}

/// A named broadcast channel with weakly held receivers
///
/// `R` is the receivers' return type, collected by [`Signal::fetch`] and
/// [`Signal::fetch_all`] and discarded by [`Signal::emit`]. Cloning a signal
/// clones the handle; all clones share one receiver table.
///
/// # Examples
///
/// ```
/// use tether_signals::{Payload, Signal, SignalOptions};
/// use std::sync::Arc;
///
/// let supplier: Signal<f64> = Signal::with_options(SignalOptions::new().with_receiver_limit(1));
/// let receiver = Arc::new(|p: &Payload| p.get_f64("a").unwrap_or_default());
/// supplier.connect(&receiver, Payload::new()).unwrap();
///
/// assert_eq!(supplier.fetch(&Payload::new().with("a", 5.7)).unwrap(), 5.7);
/// assert!(supplier.connect(&receiver, Payload::new()).is_err());
/// ```
pub struct Signal<R = ()> {
	shared: Arc<SignalShared<R>>,
}

impl<R: 'static> Signal<R> {
	/// Create an unnamed, unbounded signal
	pub fn new() -> Self {
		Self::with_options(SignalOptions::default())
	}

	/// Create a named, unbounded signal
	pub fn named(name: impl Into<ChannelName>) -> Self {
		Self::with_options(SignalOptions::new().with_name(name))
	}

	/// Create a signal from options
	pub fn with_options(options: SignalOptions) -> Self {
		let mut state = SignalState::new(0);
		for condition in options.conditions {
			state
				.conditions
				.insert(condition.name().to_string(), condition);
		}
		Self {
			shared: Arc::new(SignalShared {
				name: options.name,
				doc: options.doc,
				attrs: options.attrs,
				receiver_limit: options.receiver_limit,
				state: RwLock::new(state),
			}),
		}
	}

	/// The signal name
	pub fn name(&self) -> Option<&ChannelName> {
		self.shared.name.as_ref()
	}

	/// The documentation string
	pub fn doc(&self) -> Option<&str> {
		self.shared.doc.as_deref()
	}

	/// The opaque attributes
	pub fn attrs(&self) -> &Payload {
		&self.shared.attrs
	}

	/// The receiver limit; `None` is unbounded
	pub fn receiver_limit(&self) -> Option<usize> {
		self.shared.receiver_limit
	}

	/// Connect a closure held weakly
	///
	/// The signal keeps only a weak reference; once every `Arc` the caller
	/// holds is dropped the receiver is pruned.
	///
	/// # Errors
	///
	/// Returns [`SignalError::Capacity`] when the receiver limit is reached.
	pub fn connect<F>(&self, receiver: &Arc<F>, metadata: Payload) -> SignalResult<ReceiverId>
	where
		F: Fn(&Payload) -> R + Send + Sync + 'static,
	{
		let erased: Arc<ReceiverFn<R>> = receiver.clone();
		let (id, _) = self.insert(Arc::new(WeakFn::new(Arc::downgrade(&erased))), metadata)?;
		Ok(id)
	}

	/// Connect a method of `owner`, holding the owner weakly
	///
	/// # Errors
	///
	/// Returns [`SignalError::Capacity`] when the receiver limit is reached.
	pub fn connect_method<O, M>(
		&self,
		owner: &Arc<O>,
		method: M,
		metadata: Payload,
	) -> SignalResult<ReceiverId>
	where
		O: Send + Sync + 'static,
		M: Fn(&O, &Payload) -> R + Send + Sync + 'static,
	{
		let (id, _) = self.insert(Arc::new(MethodBinding::new(owner, method)), metadata)?;
		Ok(id)
	}

	/// Connect a function held strongly
	///
	/// Use this for plain functions and closures that own no state whose
	/// lifetime matters; they stay connected until disconnected or reset.
	///
	/// # Errors
	///
	/// Returns [`SignalError::Capacity`] when the receiver limit is reached.
	pub fn connect_fn<F>(&self, receiver: F, metadata: Payload) -> SignalResult<ReceiverId>
	where
		F: Fn(&Payload) -> R + Send + Sync + 'static,
	{
		let (id, _) = self.insert(Arc::new(StaticFn::new(receiver)), metadata)?;
		Ok(id)
	}

	/// [`Signal::connect`] returning a guard that disconnects on drop
	///
	/// # Errors
	///
	/// Returns [`SignalError::Capacity`] when the receiver limit is reached.
	pub fn subscribe<F>(&self, receiver: &Arc<F>, metadata: Payload) -> SignalResult<Subscription>
	where
		F: Fn(&Payload) -> R + Send + Sync + 'static,
	{
		let erased: Arc<ReceiverFn<R>> = receiver.clone();
		let (id, generation) =
			self.insert(Arc::new(WeakFn::new(Arc::downgrade(&erased))), metadata)?;
		Ok(self.guard(id, generation))
	}

	/// [`Signal::connect_method`] returning a guard that disconnects on drop
	///
	/// # Errors
	///
	/// Returns [`SignalError::Capacity`] when the receiver limit is reached.
	pub fn subscribe_method<O, M>(
		&self,
		owner: &Arc<O>,
		method: M,
		metadata: Payload,
	) -> SignalResult<Subscription>
	where
		O: Send + Sync + 'static,
		M: Fn(&O, &Payload) -> R + Send + Sync + 'static,
	{
		let (id, generation) = self.insert(Arc::new(MethodBinding::new(owner, method)), metadata)?;
		Ok(self.guard(id, generation))
	}

	/// [`Signal::connect_fn`] returning a guard that disconnects on drop
	///
	/// # Errors
	///
	/// Returns [`SignalError::Capacity`] when the receiver limit is reached.
	pub fn subscribe_fn<F>(&self, receiver: F, metadata: Payload) -> SignalResult<Subscription>
	where
		F: Fn(&Payload) -> R + Send + Sync + 'static,
	{
		let (id, generation) = self.insert(Arc::new(StaticFn::new(receiver)), metadata)?;
		Ok(self.guard(id, generation))
	}

	fn guard(&self, id: ReceiverId, generation: u64) -> Subscription {
		let signal: Weak<dyn Detach> = Arc::downgrade(&self.shared) as Weak<dyn Detach>;
		Subscription {
			id,
			generation,
			signal: Some(signal),
		}
	}

	/// Append a receiver, returning its id and the generation it belongs to
	///
	/// A rejected binding and any pruned entries are dropped after the lock
	/// is released.
	fn insert(
		&self,
		binding: Arc<dyn Binding<R>>,
		metadata: Payload,
	) -> SignalResult<(ReceiverId, u64)> {
		let (inserted, _pruned) = {
			let mut state = self.shared.state.write();
			let pruned = self.shared.prune_locked(&mut state);
			let full = self
				.shared
				.receiver_limit
				.filter(|limit| state.receivers.len() >= *limit);

			let inserted = match full {
				Some(limit) => Err(SignalError::Capacity {
					channel: self.shared.label(),
					limit,
				}),
				None => {
					let id = ReceiverId(state.next_id);
					state.next_id += 1;
					tracing::debug!(
						channel = %self.shared.label(),
						receiver_id = %id,
						kind = binding.kind(),
						"receiver connected"
					);
					state.receivers.push(ReceiverEntry {
						id,
						binding,
						metadata: Arc::new(metadata),
					});
					Ok((id, state.generation))
				}
			};
			(inserted, pruned)
		};
		inserted
	}

	/// Disconnect a receiver
	///
	/// Unknown ids are ignored, so disconnecting twice is harmless. Returns
	/// whether a receiver was removed.
	pub fn disconnect(&self, receiver_id: ReceiverId) -> bool {
		self.shared.disconnect(receiver_id, None)
	}

	/// Disconnect every receiver, keeping conditions and the id counter
	pub fn disconnect_all(&self) {
		let removed = std::mem::take(&mut self.shared.state.write().receivers);
		tracing::debug!(
			channel = %self.shared.label(),
			count = removed.len(),
			"receivers disconnected"
		);
	}

	/// Remove receivers whose target has been dropped
	pub fn clear_dead_receivers(&self) {
		let pruned = self.shared.prune_locked(&mut self.shared.state.write());
		drop(pruned);
	}

	/// Snapshot of live receivers, pruning dead ones first
	fn live_receivers(&self) -> Vec<ReceiverEntry<R>> {
		let (receivers, _pruned) = {
			let mut state = self.shared.state.write();
			let pruned = self.shared.prune_locked(&mut state);
			(state.receivers.clone(), pruned)
		};
		receivers
	}

	/// Deliver `payload` to every live receiver in connection order
	///
	/// While muted this does nothing. When conditions are installed each
	/// receiver is only invoked if every condition passes for its metadata
	/// merged with `payload`. Return values are discarded. Receivers run with
	/// no lock held, so they may emit, connect or disconnect themselves.
	///
	/// Returns how many receivers were invoked.
	pub fn emit(&self, payload: &Payload) -> usize {
		let (receivers, conditions, generation, pruned) = {
			let mut state = self.shared.state.write();
			if state.muted {
				tracing::trace!(channel = %self.shared.label(), "emit suppressed while muted");
				return 0;
			}
			let pruned = self.shared.prune_locked(&mut state);
			let conditions: Vec<Arc<dyn Condition>> = state.conditions.values().cloned().collect();
			(state.receivers.clone(), conditions, state.generation, pruned)
		};
		drop(pruned);

		let mut delivered = 0;
		let mut dead = Vec::new();
		for entry in &receivers {
			if !conditions.is_empty() {
				let args = entry.metadata.merged(payload);
				if !condition::check_all(&conditions, &args) {
					tracing::trace!(
						channel = %self.shared.label(),
						receiver_id = %entry.id,
						"condition rejected delivery"
					);
					continue;
				}
			}
			match entry.binding.invoke(payload) {
				Some(_) => delivered += 1,
				None => dead.push(entry.id),
			}
		}

		for id in dead {
			self.shared.disconnect(id, Some(generation));
		}
		tracing::trace!(channel = %self.shared.label(), delivered, "signal emitted");
		delivered
	}

	/// Return the value of the single supplier
	///
	/// Mute state and conditions do not apply to fetches.
	///
	/// # Errors
	///
	/// - [`SignalError::Precondition`] unless the receiver limit is 1.
	/// - [`SignalError::NotFound`] when no receiver is connected.
	pub fn fetch(&self, payload: &Payload) -> SignalResult<R> {
		if self.shared.receiver_limit != Some(1) {
			return Err(SignalError::precondition(format!(
				"signal '{}' must have a receiver limit of 1 to fetch",
				self.shared.label()
			)));
		}
		for entry in self.live_receivers() {
			match entry.binding.invoke(payload) {
				Some(value) => return Ok(value),
				None => {
					self.shared.disconnect(entry.id, None);
				}
			}
		}
		Err(SignalError::not_found(format!(
			"no suppliers connected to signal '{}'",
			self.shared.label()
		)))
	}

	/// Return the values of every live receiver in connection order
	///
	/// # Errors
	///
	/// Returns [`SignalError::NotFound`] when no receiver is connected.
	pub fn fetch_all(&self, payload: &Payload) -> SignalResult<Vec<R>> {
		let mut values = Vec::new();
		for entry in self.live_receivers() {
			match entry.binding.invoke(payload) {
				Some(value) => values.push(value),
				None => {
					self.shared.disconnect(entry.id, None);
				}
			}
		}
		if values.is_empty() {
			return Err(SignalError::not_found(format!(
				"no suppliers connected to signal '{}'",
				self.shared.label()
			)));
		}
		Ok(values)
	}

	/// Suppress [`Signal::emit`] until [`Signal::unmute`]
	///
	/// Muting an already muted signal has no further effect.
	pub fn mute(&self) {
		self.shared.state.write().muted = true;
		tracing::debug!(channel = %self.shared.label(), "signal muted");
	}

	/// Restore delivery after [`Signal::mute`]
	///
	/// # Errors
	///
	/// Returns [`SignalError::Precondition`] when the signal is not muted.
	pub fn unmute(&self) -> SignalResult<()> {
		let mut state = self.shared.state.write();
		if !state.muted {
			return Err(SignalError::precondition(format!(
				"signal '{}' is not muted",
				self.shared.label()
			)));
		}
		state.muted = false;
		tracing::debug!(channel = %self.shared.label(), "signal unmuted");
		Ok(())
	}

	/// Whether the signal is muted
	pub fn is_muted(&self) -> bool {
		self.shared.state.read().muted
	}

	/// Install a condition, replacing any condition with the same name
	///
	/// # Errors
	///
	/// Returns [`SignalError::Precondition`] when the condition name is empty.
	pub fn add_condition<C: Condition + 'static>(&self, condition: C) -> SignalResult<()> {
		self.add_shared_condition(Arc::new(condition))
	}

	/// [`Signal::add_condition`] for a condition shared between signals
	///
	/// # Errors
	///
	/// Returns [`SignalError::Precondition`] when the condition name is empty.
	pub fn add_shared_condition(&self, condition: Arc<dyn Condition>) -> SignalResult<()> {
		let name = condition.name().to_string();
		if name.is_empty() {
			return Err(SignalError::precondition("condition name cannot be empty"));
		}
		tracing::debug!(channel = %self.shared.label(), condition = %name, "condition added");
		let replaced = self.shared.state.write().conditions.insert(name, condition);
		drop(replaced);
		Ok(())
	}

	/// Remove a condition by name
	///
	/// Removing the last condition returns the signal to unconditional
	/// delivery. Returns whether a condition was removed.
	pub fn remove_condition(&self, name: &str) -> bool {
		let removed = self.shared.state.write().conditions.shift_remove(name);
		if removed.is_some() {
			tracing::debug!(channel = %self.shared.label(), condition = %name, "condition removed");
		}
		removed.is_some()
	}

	/// Whether any condition is installed
	pub fn is_conditioned(&self) -> bool {
		!self.shared.state.read().conditions.is_empty()
	}

	/// Installed condition names in insertion order
	pub fn condition_names(&self) -> Vec<String> {
		self.shared.state.read().conditions.keys().cloned().collect()
	}

	/// Clear receivers, metadata, conditions, mute state and the id counter
	///
	/// Name, documentation, attributes and receiver limit are kept.
	pub fn reset(&self) {
		let previous = {
			let mut state = self.shared.state.write();
			let generation = state.generation.wrapping_add(1);
			std::mem::replace(&mut *state, SignalState::new(generation))
		};
		drop(previous);
		tracing::debug!(channel = %self.shared.label(), "signal reset");
	}

	/// Number of live receivers
	pub fn len(&self) -> usize {
		let (len, _pruned) = {
			let mut state = self.shared.state.write();
			let pruned = self.shared.prune_locked(&mut state);
			(state.receivers.len(), pruned)
		};
		len
	}

	/// Whether no live receiver is connected
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Whether at least one live receiver is connected
	pub fn has_receivers(&self) -> bool {
		!self.is_empty()
	}

	/// Ids of live receivers in connection order
	pub fn receiver_ids(&self) -> Vec<ReceiverId> {
		self.live_receivers().iter().map(|entry| entry.id).collect()
	}

	/// Metadata registered with a receiver
	pub fn receiver_metadata(&self, receiver_id: ReceiverId) -> Option<Payload> {
		self.shared
			.state
			.read()
			.receivers
			.iter()
			.find(|entry| entry.id == receiver_id)
			.map(|entry| (*entry.metadata).clone())
	}

	/// Whether two handles refer to the same signal
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.shared, &other.shared)
	}
}

impl<R: 'static> Default for Signal<R> {
	fn default() -> Self {
		Self::new()
	}
}

impl<R> Clone for Signal<R> {
	fn clone(&self) -> Self {
		Self {
			shared: Arc::clone(&self.shared),
		}
	}
}

impl<R> fmt::Debug for Signal<R> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let state = self.shared.state.read();
		f.debug_struct("Signal")
			.field("name", &self.shared.name)
			.field("receiver_limit", &self.shared.receiver_limit)
			.field("receiver_count", &state.receivers.len())
			.field("conditions", &state.conditions.keys().collect::<Vec<_>>())
			.field("muted", &state.muted)
			.finish()
	}
}

impl<R: 'static> Channel for Signal<R> {
	type Options = SignalOptions;

	fn create(name: ChannelName, mut options: SignalOptions) -> Self {
		options.name = Some(name);
		Self::with_options(options)
	}

	fn name(&self) -> Option<&ChannelName> {
		Signal::name(self)
	}

	fn mute(&self) {
		Signal::mute(self)
	}

	fn unmute(&self) -> SignalResult<()> {
		Signal::unmute(self)
	}

	fn is_muted(&self) -> bool {
		Signal::is_muted(self)
	}

	fn reset(&self) {
		Signal::reset(self)
	}

	fn ptr_eq(&self, other: &Self) -> bool {
		Signal::ptr_eq(self, other)
	}
}
