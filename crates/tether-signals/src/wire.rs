//! Single-receiver wire
//!
//! A [`Wire`] connects to exactly one receiver and holds it strongly. It
//! passes its argument straight through: no metadata, no conditions. The
//! receiver stays connected until [`Wire::disconnect`] or [`Wire::reset`].

use crate::config::{self, ReconnectPolicy};
use crate::core::{Channel, ChannelName, Payload};
use crate::error::{SignalError, SignalResult};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Receiver function type for wires
pub type WireFn<A, R> = dyn Fn(A) -> R + Send + Sync;

/// Creation options for a [`Wire`]
#[derive(Debug, Clone, Default)]
pub struct WireOptions {
	/// Wire name
	pub name: Option<ChannelName>,
	/// Free-form documentation, never interpreted
	pub doc: Option<String>,
	/// Opaque attributes, never interpreted
	pub attrs: Payload,
	/// Overrides the process-wide [`ReconnectPolicy`] for this wire
	pub reconnect_policy: Option<ReconnectPolicy>,
}

impl WireOptions {
	/// Default options
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

	/// Pin the reconnect policy for this wire
	pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
		self.reconnect_policy = Some(policy);
		self
	}
}

struct WireState<A, R> {
	receiver: Option<Arc<WireFn<A, R>>>,
	muted: bool,
}

struct WireShared<A, R> {
	name: Option<ChannelName>,
	doc: Option<String>,
	attrs: Payload,
	reconnect_policy: Option<ReconnectPolicy>,
	state: RwLock<WireState<A, R>>,
}

impl<A, R> WireShared<A, R> {
	fn label(&self) -> String {
		self.name
			.as_ref()
			.map_or_else(|| "<unnamed>".to_string(), ToString::to_string)
	}
}

/// A point-to-point channel with one strongly held receiver
///
/// `A` is the argument passed on emit and fetch, `R` the receiver's return
/// value. Cloning a wire clones the handle.
///
/// # Examples
///
/// ```
/// use tether_signals::{SignalError, Wire};
///
/// let wire: Wire<i32, i32> = Wire::named("double");
/// assert!(matches!(wire.emit(5), Err(SignalError::NotConnected(_))));
///
/// wire.connect(|x| x * 2).unwrap();
/// assert_eq!(wire.fetch(5).unwrap(), 10);
/// ```
pub struct Wire<A = (), R = ()> {
	shared: Arc<WireShared<A, R>>,
}

impl<A: 'static, R: 'static> Wire<A, R> {
	/// Create an unnamed wire
	pub fn new() -> Self {
		Self::with_options(WireOptions::default())
	}

	/// Create a named wire
	pub fn named(name: impl Into<ChannelName>) -> Self {
		Self::with_options(WireOptions::new().with_name(name))
	}

	/// Create a wire from options
	pub fn with_options(options: WireOptions) -> Self {
		Self {
			shared: Arc::new(WireShared {
				name: options.name,
				doc: options.doc,
				attrs: options.attrs,
				reconnect_policy: options.reconnect_policy,
				state: RwLock::new(WireState {
					receiver: None,
					muted: false,
				}),
			}),
		}
	}

	/// The wire name
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

	/// The policy applied to this wire, falling back to the process-wide one
	pub fn reconnect_policy(&self) -> ReconnectPolicy {
		self.shared
			.reconnect_policy
			.unwrap_or_else(config::reconnect_policy)
	}

	/// Connect the receiver
	///
	/// # Errors
	///
	/// Returns [`SignalError::AlreadyConnected`] when a receiver is present
	/// and the policy is [`ReconnectPolicy::Strict`]. Under
	/// [`ReconnectPolicy::WarnAndReplace`] a warning is logged and the old
	/// receiver is replaced.
	pub fn connect<F>(&self, receiver: F) -> SignalResult<()>
	where
		F: Fn(A) -> R + Send + Sync + 'static,
	{
		let policy = self.reconnect_policy();
		let receiver: Arc<WireFn<A, R>> = Arc::new(receiver);
		let previous = {
			let mut state = self.shared.state.write();
			if state.receiver.is_some() {
				match policy {
					ReconnectPolicy::Strict => {
						return Err(SignalError::AlreadyConnected(self.shared.label()));
					}
					ReconnectPolicy::WarnAndReplace => {
						tracing::warn!(
							channel = %self.shared.label(),
							"wire already connected, replacing its receiver"
						);
					}
				}
			}
			state.receiver.replace(receiver)
		};
		drop(previous);
		tracing::debug!(channel = %self.shared.label(), "wire connected");
		Ok(())
	}

	/// Connect a method of `owner`; the wire keeps `owner` alive
	///
	/// # Errors
	///
	/// Same as [`Wire::connect`].
	pub fn connect_method<O, M>(&self, owner: Arc<O>, method: M) -> SignalResult<()>
	where
		O: Send + Sync + 'static,
		M: Fn(&O, A) -> R + Send + Sync + 'static,
	{
		self.connect(move |args| method(&owner, args))
	}

	/// Disconnect the receiver, returning the wire to its unconnected state
	pub fn disconnect(&self) {
		self.reset();
	}

	/// Call the receiver, discarding its return value
	///
	/// While muted this does nothing, connected or not.
	///
	/// # Errors
	///
	/// Returns [`SignalError::NotConnected`] when unmuted and unconnected.
	pub fn emit(&self, args: A) -> SignalResult<()> {
		let receiver = {
			let state = self.shared.state.read();
			if state.muted {
				tracing::trace!(channel = %self.shared.label(), "emit suppressed while muted");
				return Ok(());
			}
			state.receiver.clone()
		};
		match receiver {
			Some(receiver) => {
				receiver(args);
				Ok(())
			}
			None => Err(SignalError::NotConnected(self.shared.label())),
		}
	}

	/// Call the receiver and return its value
	///
	/// Mute state does not apply to fetches.
	///
	/// # Errors
	///
	/// Returns [`SignalError::NotConnected`] when unconnected.
	pub fn fetch(&self, args: A) -> SignalResult<R> {
		let receiver = self.shared.state.read().receiver.clone();
		match receiver {
			Some(receiver) => Ok(receiver(args)),
			None => Err(SignalError::NotConnected(self.shared.label())),
		}
	}

	/// Suppress [`Wire::emit`] until [`Wire::unmute`]
	pub fn mute(&self) {
		self.shared.state.write().muted = true;
		tracing::debug!(channel = %self.shared.label(), "wire muted");
	}

	/// Restore emission after [`Wire::mute`]
	///
	/// # Errors
	///
	/// Returns [`SignalError::Precondition`] when the wire is not muted.
	pub fn unmute(&self) -> SignalResult<()> {
		let mut state = self.shared.state.write();
		if !state.muted {
			return Err(SignalError::precondition(format!(
				"wire '{}' is not muted",
				self.shared.label()
			)));
		}
		state.muted = false;
		tracing::debug!(channel = %self.shared.label(), "wire unmuted");
		Ok(())
	}

	/// Whether the wire is muted
	pub fn is_muted(&self) -> bool {
		self.shared.state.read().muted
	}

	/// Whether a receiver is connected
	pub fn is_connected(&self) -> bool {
		self.shared.state.read().receiver.is_some()
	}

	/// Drop the receiver and clear the mute state
	pub fn reset(&self) {
		let previous = {
			let mut state = self.shared.state.write();
			state.muted = false;
			state.receiver.take()
		};
		drop(previous);
		tracing::debug!(channel = %self.shared.label(), "wire reset");
	}

	/// Whether two handles refer to the same wire
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.shared, &other.shared)
	}
}

impl<A: 'static, R: 'static> Default for Wire<A, R> {
	fn default() -> Self {
		Self::new()
	}
}

impl<A, R> Clone for Wire<A, R> {
	fn clone(&self) -> Self {
		Self {
			shared: Arc::clone(&self.shared),
		}
	}
}

impl<A, R> fmt::Debug for Wire<A, R> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let state = self.shared.state.read();
		f.debug_struct("Wire")
			.field("name", &self.shared.name)
			.field("connected", &state.receiver.is_some())
			.field("muted", &state.muted)
			.finish()
	}
}

impl<A: 'static, R: 'static> Channel for Wire<A, R> {
	type Options = WireOptions;

	fn create(name: ChannelName, mut options: WireOptions) -> Self {
		options.name = Some(name);
		Self::with_options(options)
	}

	fn name(&self) -> Option<&ChannelName> {
		Wire::name(self)
	}

	fn mute(&self) {
		Wire::mute(self)
	}

	fn unmute(&self) -> SignalResult<()> {
		Wire::unmute(self)
	}

	fn is_muted(&self) -> bool {
		Wire::is_muted(self)
	}

	fn reset(&self) {
		Wire::reset(self)
	}

	fn ptr_eq(&self, other: &Self) -> bool {
		Wire::ptr_eq(self, other)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use parking_lot::Mutex;
	use rstest::rstest;
	use serial_test::serial;

	fn recorder() -> (Arc<Mutex<Vec<i32>>>, impl Fn(i32) + Send + Sync + 'static) {
		let seen = Arc::new(Mutex::new(Vec::new()));
		let sink = seen.clone();
		(seen, move |x| sink.lock().push(x))
	}

	#[rstest]
	fn test_emit_before_connect_is_not_connected() {
		// Arrange
		let wire: Wire<i32> = Wire::named("out");

		// Act
		let result = wire.emit(5);

		// Assert
		assert_eq!(result, Err(SignalError::NotConnected("out".to_string())));
	}

	#[rstest]
	fn test_emit_after_connect_invokes_receiver() {
		// Arrange
		let wire: Wire<i32> = Wire::new();
		let (seen, receiver) = recorder();
		wire.connect(receiver).unwrap();

		// Act
		wire.emit(5).unwrap();

		// Assert
		assert_eq!(*seen.lock(), vec![5]);
		assert!(wire.is_connected());
	}

	#[rstest]
	#[serial(reconnect_policy)]
	fn test_connect_twice_under_strict_policy_fails() {
		// Arrange
		let wire: Wire<i32> = Wire::with_options(
			WireOptions::new()
				.with_name("w")
				.with_reconnect_policy(ReconnectPolicy::Strict),
		);
		wire.connect(|_| {}).unwrap();

		// Act
		let result = wire.connect(|_| {});

		// Assert
		assert_eq!(result, Err(SignalError::AlreadyConnected("w".to_string())));
	}

	#[rstest]
	fn test_connect_twice_under_warn_policy_replaces() {
		// Arrange
		let wire: Wire<(), i32> = Wire::with_options(
			WireOptions::new().with_reconnect_policy(ReconnectPolicy::WarnAndReplace),
		);
		wire.connect(|_| 1).unwrap();

		// Act
		let result = wire.connect(|_| 2);

		// Assert
		assert!(result.is_ok());
		assert_eq!(wire.fetch(()).unwrap(), 2);
	}

	#[rstest]
	#[serial(reconnect_policy)]
	fn test_process_wide_policy_applies_without_override() {
		// Arrange
		let previous = config::reconnect_policy();
		config::set_reconnect_policy(ReconnectPolicy::WarnAndReplace);
		let wire: Wire<(), i32> = Wire::new();
		wire.connect(|_| 1).unwrap();

		// Act
		let result = wire.connect(|_| 2);
		config::set_reconnect_policy(previous);

		// Assert
		assert!(result.is_ok());
		assert_eq!(wire.fetch(()).unwrap(), 2);
	}

	#[rstest]
	fn test_disconnect_restores_unconnected_state() {
		// Arrange
		let wire: Wire<i32> = Wire::new();
		wire.connect(|_| {}).unwrap();

		// Act
		wire.disconnect();

		// Assert
		assert!(!wire.is_connected());
		assert!(matches!(wire.emit(1), Err(SignalError::NotConnected(_))));
		assert!(matches!(wire.fetch(1), Err(SignalError::NotConnected(_))));
	}

	#[rstest]
	fn test_mute_suppresses_emit_only() {
		// Arrange
		let wire: Wire<i32, i32> = Wire::new();
		let (seen, sink) = recorder();
		wire.connect(move |x| {
			sink(x);
			x + 1
		})
		.unwrap();

		// Act
		wire.mute();
		wire.emit(1).unwrap();
		let fetched = wire.fetch(2).unwrap();
		wire.unmute().unwrap();
		wire.emit(3).unwrap();

		// Assert
		assert_eq!(fetched, 3);
		assert_eq!(*seen.lock(), vec![2, 3]);
	}

	#[rstest]
	fn test_muted_unconnected_emit_is_silent() {
		// Arrange
		let wire: Wire<i32> = Wire::new();

		// Act
		wire.mute();

		// Assert
		assert_eq!(wire.emit(1), Ok(()));
	}

	#[rstest]
	fn test_unmute_when_not_muted_is_precondition() {
		// Arrange
		let wire: Wire = Wire::new();

		// Act & Assert
		assert!(matches!(wire.unmute(), Err(SignalError::Precondition(_))));
	}

	#[rstest]
	fn test_reset_clears_mute() {
		// Arrange
		let wire: Wire = Wire::new();
		wire.mute();

		// Act
		wire.reset();

		// Assert
		assert!(!wire.is_muted());
	}

	#[rstest]
	fn test_connect_method_holds_owner_strongly() {
		// Arrange
		struct Doubler;
		impl Doubler {
			fn double(&self, x: i32) -> i32 {
				x * 2
			}
		}
		let wire: Wire<i32, i32> = Wire::new();
		let owner = Arc::new(Doubler);
		wire.connect_method(owner.clone(), Doubler::double).unwrap();

		// Act
		drop(owner);

		// Assert
		assert_eq!(wire.fetch(21).unwrap(), 42);
	}
}
