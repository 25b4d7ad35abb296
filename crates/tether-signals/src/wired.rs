//! Construction-time connection of methods to channels
//!
//! A type implementing [`Wired`] lists its connections once, as a table of
//! [`Connection`] rows. [`Wired::wire_up`] moves a fresh value into an `Arc`,
//! resolves every row's [`Target`] (creating channels that do not exist yet)
//! and connects the matching method before handing the instance back.
//!
//! ```
//! use tether_signals::{Connection, Payload, SignalBox, Wired};
//! use std::sync::atomic::{AtomicI64, Ordering};
//! use once_cell::sync::Lazy;
//!
//! static SIGNALS: Lazy<SignalBox> = Lazy::new(SignalBox::new);
//!
//! #[derive(Default)]
//! struct Total(AtomicI64);
//!
//! impl Total {
//!     fn add(&self, payload: &Payload) {
//!         self.0.fetch_add(payload.get_i64("a").unwrap_or(0), Ordering::SeqCst);
//!     }
//! }
//!
//! impl Wired for Total {
//!     fn connections() -> Vec<Connection<Self>> {
//!         vec![Connection::receive(SIGNALS.target("added"), Total::add)]
//!     }
//! }
//!
//! let total = Total::default().wire_up().unwrap();
//! SIGNALS.get("added").emit(&Payload::new().with("a", 3));
//! assert_eq!(total.0.load(Ordering::SeqCst), 3);
//! ```

use crate::channel_box::ChannelBox;
use crate::container::Container;
use crate::core::{Channel, ChannelName, Payload, ReceiverId};
use crate::error::{SignalError, SignalResult};
use crate::signal::Signal;
use crate::wire::Wire;
use std::fmt;
use std::sync::Arc;

/// Where a connection goes: a channel, or a name looked up when resolved
pub enum Target<C: Channel> {
	/// A channel handle
	Channel(C),
	/// A name in a specific container
	InContainer {
		/// Container the name is looked up in
		container: Container<C>,
		/// Channel name
		name: ChannelName,
	},
	/// A name in whichever container of a box is active at resolution
	InBox {
		/// Box whose active container is used
		channel_box: ChannelBox<C>,
		/// Channel name
		name: ChannelName,
	},
}

impl<C: Channel> Target<C> {
	/// Deferred lookup in `container`
	pub fn in_container(container: &Container<C>, name: impl Into<ChannelName>) -> Self {
		Self::InContainer {
			container: container.clone(),
			name: name.into(),
		}
	}

	/// Deferred lookup in the active container of `channel_box`
	pub fn in_box(channel_box: &ChannelBox<C>, name: impl Into<ChannelName>) -> Self {
		Self::InBox {
			channel_box: channel_box.clone(),
			name: name.into(),
		}
	}

	/// The channel this target designates, created if absent
	pub fn resolve(&self) -> C {
		match self {
			Self::Channel(channel) => channel.clone(),
			Self::InContainer { container, name } => container.get(name.clone()),
			Self::InBox { channel_box, name } => channel_box.get(name.clone()),
		}
	}
}

impl<C: Channel> Clone for Target<C> {
	fn clone(&self) -> Self {
		match self {
			Self::Channel(channel) => Self::Channel(channel.clone()),
			Self::InContainer { container, name } => Self::InContainer {
				container: container.clone(),
				name: name.clone(),
			},
			Self::InBox { channel_box, name } => Self::InBox {
				channel_box: channel_box.clone(),
				name: name.clone(),
			},
		}
	}
}

impl<C: Channel> From<C> for Target<C> {
	fn from(channel: C) -> Self {
		Self::Channel(channel)
	}
}

impl<C: Channel> From<&C> for Target<C> {
	fn from(channel: &C) -> Self {
		Self::Channel(channel.clone())
	}
}

impl<C: Channel> fmt::Debug for Target<C> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Channel(channel) => f.debug_tuple("Channel").field(&channel.name()).finish(),
			Self::InContainer { container, name } => f
				.debug_struct("InContainer")
				.field("container", &container.id())
				.field("name", name)
				.finish(),
			Self::InBox { name, .. } => f.debug_struct("InBox").field("name", name).finish(),
		}
	}
}

type Rollback = Box<dyn FnOnce() + Send>;

type Connector<T> = Box<dyn Fn(&Arc<T>, &Payload) -> SignalResult<Vec<Rollback>> + Send + Sync>;

fn require_supplier<R: 'static>(signal: &Signal<R>) -> SignalResult<()> {
	if signal.receiver_limit() == Some(1) {
		return Ok(());
	}
	Err(SignalError::precondition(format!(
		"signal '{}' must have a receiver limit of 1 to accept a supplier",
		signal
			.name()
			.map_or_else(|| "<unnamed>".to_string(), ToString::to_string)
	)))
}

fn undo_signal<R: 'static>(signal: Signal<R>, id: ReceiverId) -> Rollback {
	Box::new(move || {
		signal.disconnect(id);
	})
}

/// One row of a [`Wired`] type's connection table
pub struct Connection<T> {
	kind: &'static str,
	metadata: Payload,
	connector: Connector<T>,
}

impl<T: Send + Sync + 'static> Connection<T> {
	/// Connect `method` to the signal at `target`
	///
	/// The signal holds the instance weakly, so the connection ends when the
	/// instance is dropped.
	pub fn receive<R, M>(target: impl Into<Target<Signal<R>>>, method: M) -> Self
	where
		R: 'static,
		M: Fn(&T, &Payload) -> R + Send + Sync + 'static,
	{
		Self::receive_all([target.into()], method)
	}

	/// Connect `method` to every signal in `targets`
	pub fn receive_all<R, M, I>(targets: I, method: M) -> Self
	where
		R: 'static,
		M: Fn(&T, &Payload) -> R + Send + Sync + 'static,
		I: IntoIterator,
		I::Item: Into<Target<Signal<R>>>,
	{
		let targets: Vec<Target<Signal<R>>> = targets.into_iter().map(Into::into).collect();
		let method = Arc::new(method);
		Self::build("receive", move |instance, metadata| {
			let mut undo = Vec::with_capacity(targets.len());
			for target in &targets {
				let signal = target.resolve();
				let method = Arc::clone(&method);
				match signal.connect_method(
					instance,
					move |owner: &T, payload: &Payload| method(owner, payload),
					metadata.clone(),
				) {
					Ok(id) => undo.push(undo_signal(signal, id)),
					Err(e) => {
						rollback(undo);
						return Err(e);
					}
				}
			}
			Ok(undo)
		})
	}

	/// Connect `method` as the sole supplier of the signal at `target`
	///
	/// The signal must have a receiver limit of 1. This is checked when the
	/// target is resolved and fails with [`SignalError::Precondition`].
	pub fn supply<R, M>(target: impl Into<Target<Signal<R>>>, method: M) -> Self
	where
		R: 'static,
		M: Fn(&T, &Payload) -> R + Send + Sync + 'static,
	{
		let target = target.into();
		let method = Arc::new(method);
		Self::build("supply", move |instance, metadata| {
			let signal = target.resolve();
			require_supplier(&signal)?;
			let method = Arc::clone(&method);
			let id = signal.connect_method(
				instance,
				move |owner: &T, payload: &Payload| method(owner, payload),
				metadata.clone(),
			)?;
			Ok(vec![undo_signal(signal, id)])
		})
	}

	/// Connect `method` to the wire at `target`
	///
	/// Wires hold their receiver strongly: the instance stays alive until the
	/// wire is disconnected or reset.
	pub fn wire<A, R, M>(target: impl Into<Target<Wire<A, R>>>, method: M) -> Self
	where
		A: 'static,
		R: 'static,
		M: Fn(&T, A) -> R + Send + Sync + 'static,
	{
		let target = target.into();
		let method = Arc::new(method);
		Self::build("wire", move |instance, _metadata| {
			let wire = target.resolve();
			let method = Arc::clone(&method);
			wire.connect_method(Arc::clone(instance), move |owner: &T, args: A| {
				method(owner, args)
			})?;
			Ok(vec![Box::new(move || wire.disconnect()) as Rollback])
		})
	}

	fn build<F>(kind: &'static str, connector: F) -> Self
	where
		F: Fn(&Arc<T>, &Payload) -> SignalResult<Vec<Rollback>> + Send + Sync + 'static,
	{
		Self {
			kind,
			metadata: Payload::new(),
			connector: Box::new(connector),
		}
	}

	/// Attach receiver metadata, seen by the signal's conditions
	///
	/// Ignored by wire connections.
	pub fn with_metadata(mut self, metadata: Payload) -> Self {
		self.metadata = metadata;
		self
	}

	/// Connection kind: `receive`, `supply` or `wire`
	pub fn kind(&self) -> &'static str {
		self.kind
	}

	fn connect(&self, instance: &Arc<T>) -> SignalResult<Vec<Rollback>> {
		(self.connector)(instance, &self.metadata)
	}
}

impl<T> fmt::Debug for Connection<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Connection")
			.field("kind", &self.kind)
			.field("metadata", &self.metadata)
			.finish()
	}
}

fn rollback(undo: Vec<Rollback>) {
	for step in undo.into_iter().rev() {
		step();
	}
}

/// Apply a connection table to an existing instance
///
/// Either every connection is made or none is: on failure the connections
/// already made are undone.
///
/// # Errors
///
/// Returns the first error raised while connecting.
pub fn connect_all<T>(instance: &Arc<T>, connections: &[Connection<T>]) -> SignalResult<()>
where
	T: Send + Sync + 'static,
{
	let mut undo = Vec::new();
	for connection in connections {
		match connection.connect(instance) {
			Ok(steps) => undo.extend(steps),
			Err(e) => {
				tracing::debug!(
					kind = connection.kind(),
					error = %e,
					"connection failed, rolling back"
				);
				rollback(undo);
				return Err(e);
			}
		}
	}
	tracing::debug!(connections = connections.len(), "instance wired");
	Ok(())
}

/// Types whose methods are connected to channels on construction
pub trait Wired: Sized + Send + Sync + 'static {
	/// The connection table, evaluated once per [`Wired::wire_up`]
	fn connections() -> Vec<Connection<Self>>;

	/// Move `self` into an `Arc` and make every connection
	///
	/// # Errors
	///
	/// Returns the first connection error; connections made before it are
	/// undone and the instance is dropped.
	fn wire_up(self) -> SignalResult<Arc<Self>> {
		let instance = Arc::new(self);
		connect_all(&instance, &Self::connections())?;
		Ok(instance)
	}
}

/// Connect a free function to each of `signals`
///
/// The function is held strongly and stays connected until disconnected.
///
/// # Errors
///
/// Returns the first connect error; earlier connections are undone.
pub fn receive_fn<R, F, I>(
	signals: I,
	receiver: F,
	metadata: Payload,
) -> SignalResult<Vec<ReceiverId>>
where
	R: 'static,
	F: Fn(&Payload) -> R + Send + Sync + 'static,
	I: IntoIterator,
	I::Item: Into<Target<Signal<R>>>,
{
	let receiver = Arc::new(receiver);
	let mut connected: Vec<(Signal<R>, ReceiverId)> = Vec::new();
	for target in signals {
		let signal = target.into().resolve();
		let receiver = Arc::clone(&receiver);
		match signal.connect_fn(move |payload: &Payload| receiver(payload), metadata.clone()) {
			Ok(id) => connected.push((signal, id)),
			Err(e) => {
				for (signal, id) in connected.into_iter().rev() {
					signal.disconnect(id);
				}
				return Err(e);
			}
		}
	}
	Ok(connected.into_iter().map(|(_, id)| id).collect())
}

/// Connect a free function as the sole supplier of `signal`
///
/// # Errors
///
/// Returns [`SignalError::Precondition`] unless the signal's receiver limit
/// is 1, or the connect error.
pub fn supply_fn<R, F>(
	signal: impl Into<Target<Signal<R>>>,
	supplier: F,
	metadata: Payload,
) -> SignalResult<ReceiverId>
where
	R: 'static,
	F: Fn(&Payload) -> R + Send + Sync + 'static,
{
	let signal = signal.into().resolve();
	require_supplier(&signal)?;
	signal.connect_fn(supplier, metadata)
}
